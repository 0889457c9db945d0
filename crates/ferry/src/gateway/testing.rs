//! In-memory gateway for engine tests.

use std::collections::{HashMap, VecDeque};
use std::sync::Mutex;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use tokio::time::Instant;

use super::{ChannelId, GatewayError, MessageId, RawMessage, SessionGateway};

/// Scripted result for one gateway call.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Scripted {
    Ok,
    RateLimited(u64),
    PermissionDenied,
    SessionInvalid,
    Transient,
    /// Succeed after hanging inside the gateway call for this many seconds.
    Stall(u64),
    Panic,
}

impl Scripted {
    fn into_result(self) -> Result<(), GatewayError> {
        match self {
            Scripted::Ok | Scripted::Stall(_) => Ok(()),
            Scripted::RateLimited(secs) => Err(GatewayError::RateLimited {
                wait: Duration::from_secs(secs),
            }),
            Scripted::PermissionDenied => {
                Err(GatewayError::PermissionDenied("chat write forbidden".to_string()))
            }
            Scripted::SessionInvalid => {
                Err(GatewayError::SessionInvalid("auth key unregistered".to_string()))
            }
            Scripted::Transient => Err(GatewayError::Transient("connection reset".to_string())),
            Scripted::Panic => panic!("scripted gateway panic"),
        }
    }
}

/// One recorded `forward` call.
#[derive(Debug, Clone)]
pub(crate) struct ForwardCall {
    pub from: ChannelId,
    pub to: ChannelId,
    pub ids: Vec<MessageId>,
    pub at: Instant,
    pub delivered: bool,
}

#[derive(Default)]
pub(crate) struct ScriptedGateway {
    authenticated: AtomicBool,
    channels: Mutex<HashMap<ChannelId, Vec<RawMessage>>>,
    forward_script: Mutex<HashMap<ChannelId, VecDeque<Scripted>>>,
    forward_default: Mutex<HashMap<ChannelId, Scripted>>,
    fetch_failures: Mutex<HashMap<(ChannelId, MessageId), Scripted>>,
    forwards: Mutex<Vec<ForwardCall>>,
    fetches: Mutex<Vec<(ChannelId, MessageId)>>,
}

impl ScriptedGateway {
    pub fn new() -> Self {
        let gateway = Self::default();
        gateway.authenticated.store(true, Ordering::SeqCst);
        gateway
    }

    pub fn set_authenticated(&self, value: bool) {
        self.authenticated.store(value, Ordering::SeqCst);
    }

    /// Seed a channel with `(id, group_key)` messages.
    pub fn with_messages(self, channel: ChannelId, messages: &[(MessageId, Option<i64>)]) -> Self {
        let msgs = messages
            .iter()
            .map(|&(id, group)| RawMessage::new(id, group))
            .collect();
        self.channels.lock().unwrap().insert(channel, msgs);
        self
    }

    /// Queue outcomes for successive forwards to `to`. Once drained, the
    /// destination's default applies (success unless overridden).
    pub fn script_forwards(&self, to: ChannelId, outcomes: &[Scripted]) {
        self.forward_script
            .lock()
            .unwrap()
            .entry(to)
            .or_default()
            .extend(outcomes.iter().copied());
    }

    pub fn set_forward_default(&self, to: ChannelId, outcome: Scripted) {
        self.forward_default.lock().unwrap().insert(to, outcome);
    }

    /// Fail the fetch of `channel` whose offset is exactly `after_id`.
    pub fn fail_fetch(&self, channel: ChannelId, after_id: MessageId, outcome: Scripted) {
        self.fetch_failures
            .lock()
            .unwrap()
            .insert((channel, after_id), outcome);
    }

    pub fn forwards(&self) -> Vec<ForwardCall> {
        self.forwards.lock().unwrap().clone()
    }

    pub fn forwards_to(&self, to: ChannelId) -> Vec<ForwardCall> {
        self.forwards()
            .into_iter()
            .filter(|call| call.to == to)
            .collect()
    }

    pub fn fetch_offsets(&self, channel: ChannelId) -> Vec<MessageId> {
        self.fetches
            .lock()
            .unwrap()
            .iter()
            .filter(|(c, _)| *c == channel)
            .map(|(_, offset)| *offset)
            .collect()
    }
}

#[async_trait]
impl SessionGateway for ScriptedGateway {
    async fn is_authenticated(&self) -> Result<bool, GatewayError> {
        Ok(self.authenticated.load(Ordering::SeqCst))
    }

    async fn fetch_messages(
        &self,
        channel: ChannelId,
        after_id: MessageId,
        limit: u32,
    ) -> Result<Vec<RawMessage>, GatewayError> {
        self.fetches.lock().unwrap().push((channel, after_id));
        let failure = self
            .fetch_failures
            .lock()
            .unwrap()
            .get(&(channel, after_id))
            .copied();
        if let Some(outcome) = failure {
            outcome.into_result()?;
        }

        let channels = self.channels.lock().unwrap();
        let mut page: Vec<RawMessage> = channels
            .get(&channel)
            .map(|msgs| msgs.iter().filter(|m| m.id > after_id).cloned().collect())
            .unwrap_or_default();
        page.sort_by_key(|m| m.id);
        page.truncate(limit as usize);
        Ok(page)
    }

    async fn forward(
        &self,
        from: ChannelId,
        to: ChannelId,
        messages: &[RawMessage],
    ) -> Result<(), GatewayError> {
        let outcome = self
            .forward_script
            .lock()
            .unwrap()
            .get_mut(&to)
            .and_then(|queue| queue.pop_front())
            .or_else(|| self.forward_default.lock().unwrap().get(&to).copied())
            .unwrap_or(Scripted::Ok);

        self.forwards.lock().unwrap().push(ForwardCall {
            from,
            to,
            ids: messages.iter().map(|m| m.id).collect(),
            at: Instant::now(),
            delivered: matches!(outcome, Scripted::Ok | Scripted::Stall(_)),
        });
        if let Scripted::Stall(secs) = outcome {
            tokio::time::sleep(Duration::from_secs(secs)).await;
        }
        outcome.into_result()
    }
}
