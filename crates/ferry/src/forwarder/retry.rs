//! Delivery of one unit to one destination with bounded retries.
//!
//! | Gateway answer      | Action                                              |
//! |---------------------|-----------------------------------------------------|
//! | success             | clear the destination's health record, stop         |
//! | rate limited (wait) | sleep exactly `wait` (at least 1s), retry; attempt  |
//! |                     | not consumed                                        |
//! | permission denied   | stop immediately, no health record change           |
//! | session invalid     | propagate; the run is over                          |
//! | anything else       | sleep `retry_delay`, retry; after the last attempt  |
//! |                     | bump the health record                              |

use tracing::{debug, error, warn};

use super::cycle::CycleContext;
use super::grouping::DeliveryUnit;
use crate::gateway::{ChannelId, FailureClass, GatewayError};

/// How delivery of one unit to one destination ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeliveryOutcome {
    Delivered,
    PermissionDenied,
    /// Every attempt failed with a retryable error.
    Exhausted,
    Cancelled,
}

/// Forward `unit` from `donor` to `recipient`.
///
/// Returns `Err` only for [`GatewayError::SessionInvalid`].
pub(crate) async fn deliver(
    ctx: &CycleContext,
    donor: ChannelId,
    recipient: ChannelId,
    unit: &DeliveryUnit,
) -> Result<DeliveryOutcome, GatewayError> {
    let max_attempts = ctx.tuning.max_attempts;
    let mut attempt = 0u32;

    while attempt < max_attempts {
        if ctx.is_cancelled() {
            return Ok(DeliveryOutcome::Cancelled);
        }

        let err = match ctx.gateway.forward(donor, recipient, unit.messages()).await {
            Ok(()) => {
                ctx.health.record_success(recipient);
                debug!(donor, recipient, unit = unit.key(), "Unit forwarded");
                return Ok(DeliveryOutcome::Delivered);
            }
            Err(e) => e,
        };

        match err.class() {
            FailureClass::RateLimit(wait) => {
                warn!(
                    recipient,
                    wait_ms = wait.as_millis() as u64,
                    error = %err,
                    "Rate limited, waiting before retry"
                );
                if !ctx.pause(wait).await {
                    return Ok(DeliveryOutcome::Cancelled);
                }
            }
            FailureClass::PermissionDenied => {
                error!(recipient, error = %err, "Permission error, skipping destination");
                return Ok(DeliveryOutcome::PermissionDenied);
            }
            FailureClass::SessionInvalid => return Err(err),
            FailureClass::Transient => {
                attempt += 1;
                error!(
                    recipient,
                    attempt,
                    max_attempts,
                    error = %err,
                    "Forward attempt failed"
                );
                if attempt < max_attempts && !ctx.pause(ctx.tuning.retry_delay).await {
                    return Ok(DeliveryOutcome::Cancelled);
                }
            }
        }
    }

    let record = ctx.health.record_failure(recipient);
    warn!(
        recipient,
        consecutive_failures = record.consecutive_failures,
        "Giving up on destination for this unit"
    );
    Ok(DeliveryOutcome::Exhausted)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::time::Duration;

    use tokio::time::Instant;

    use crate::forwarder::cycle::tests::context;
    use crate::gateway::RawMessage;
    use crate::gateway::testing::{Scripted, ScriptedGateway};

    fn album() -> DeliveryUnit {
        DeliveryUnit::new(
            77,
            vec![RawMessage::new(3, Some(77)), RawMessage::new(2, Some(77))],
        )
    }

    #[tokio::test(start_paused = true)]
    async fn success_clears_health_record() {
        let gateway = Arc::new(ScriptedGateway::new());
        let ctx = context(gateway.clone(), Vec::new());
        ctx.health.record_failure(200);

        let outcome = deliver(&ctx, 100, 200, &album()).await.unwrap();

        assert_eq!(outcome, DeliveryOutcome::Delivered);
        assert!(ctx.health.get(200).is_none());
        let calls = gateway.forwards_to(200);
        assert_eq!(calls.len(), 1);
        assert_eq!(calls[0].ids, vec![2, 3]);
        assert_eq!(calls[0].from, 100);
    }

    #[tokio::test(start_paused = true)]
    async fn rate_limit_waits_exactly_then_retries() {
        let gateway = Arc::new(ScriptedGateway::new());
        gateway.script_forwards(200, &[Scripted::RateLimited(7), Scripted::Ok]);
        let ctx = context(gateway.clone(), Vec::new());

        let start = Instant::now();
        let outcome = deliver(&ctx, 100, 200, &album()).await.unwrap();

        assert_eq!(outcome, DeliveryOutcome::Delivered);
        assert_eq!(start.elapsed(), Duration::from_secs(7));
        assert!(ctx.health.get(200).is_none());
        let calls = gateway.forwards_to(200);
        assert_eq!(calls.len(), 2);
        assert_eq!(calls[1].at - calls[0].at, Duration::from_secs(7));
    }

    #[tokio::test(start_paused = true)]
    async fn rate_limits_do_not_consume_attempts() {
        let gateway = Arc::new(ScriptedGateway::new());
        gateway.script_forwards(
            200,
            &[
                Scripted::Transient,
                Scripted::RateLimited(3),
                Scripted::Transient,
                Scripted::RateLimited(3),
                Scripted::Transient,
                Scripted::Transient,
                Scripted::Ok,
            ],
        );
        let ctx = context(gateway.clone(), Vec::new());

        let outcome = deliver(&ctx, 100, 200, &album()).await.unwrap();

        // Four transient failures plus two rate limits still leave the fifth attempt.
        assert_eq!(outcome, DeliveryOutcome::Delivered);
        assert_eq!(gateway.forwards_to(200).len(), 7);
        assert!(ctx.health.get(200).is_none());
    }

    #[tokio::test(start_paused = true)]
    async fn zero_rate_limit_wait_still_pauses() {
        let gateway = Arc::new(ScriptedGateway::new());
        gateway.script_forwards(
            200,
            &[Scripted::RateLimited(0), Scripted::RateLimited(0), Scripted::Ok],
        );
        let ctx = context(gateway.clone(), Vec::new());

        let start = Instant::now();
        let outcome = deliver(&ctx, 100, 200, &album()).await.unwrap();

        assert_eq!(outcome, DeliveryOutcome::Delivered);
        let calls = gateway.forwards_to(200);
        assert_eq!(calls.len(), 3);
        assert_eq!(calls[1].at - calls[0].at, Duration::from_secs(1));
        assert_eq!(start.elapsed(), Duration::from_secs(2));
    }

    #[tokio::test(start_paused = true)]
    async fn five_transient_failures_exhaust_destination() {
        let gateway = Arc::new(ScriptedGateway::new());
        gateway.set_forward_default(200, Scripted::Transient);
        let ctx = context(gateway.clone(), Vec::new());

        let start = Instant::now();
        let outcome = deliver(&ctx, 100, 200, &album()).await.unwrap();

        assert_eq!(outcome, DeliveryOutcome::Exhausted);
        assert_eq!(gateway.forwards_to(200).len(), 5);
        // Four retry delays between five attempts.
        assert_eq!(start.elapsed(), ctx.tuning.retry_delay * 4);

        let record = ctx.health.get(200).unwrap();
        assert_eq!(record.consecutive_failures, 1);
        assert!(record.last_failure_at.is_some());

        // A second exhausted unit increments by exactly one more.
        deliver(&ctx, 100, 200, &album()).await.unwrap();
        assert_eq!(ctx.health.get(200).unwrap().consecutive_failures, 2);
    }

    #[tokio::test(start_paused = true)]
    async fn permission_denied_is_not_retried() {
        let gateway = Arc::new(ScriptedGateway::new());
        gateway.set_forward_default(200, Scripted::PermissionDenied);
        let ctx = context(gateway.clone(), Vec::new());

        let outcome = deliver(&ctx, 100, 200, &album()).await.unwrap();

        assert_eq!(outcome, DeliveryOutcome::PermissionDenied);
        assert_eq!(gateway.forwards_to(200).len(), 1);
        assert!(ctx.health.get(200).is_none());
    }

    #[tokio::test(start_paused = true)]
    async fn session_invalid_propagates() {
        let gateway = Arc::new(ScriptedGateway::new());
        gateway.set_forward_default(200, Scripted::SessionInvalid);
        let ctx = context(gateway.clone(), Vec::new());

        let err = deliver(&ctx, 100, 200, &album()).await.unwrap_err();
        assert!(err.is_session_invalid());
        assert_eq!(gateway.forwards_to(200).len(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn cancellation_interrupts_rate_limit_wait() {
        let gateway = Arc::new(ScriptedGateway::new());
        gateway.set_forward_default(200, Scripted::RateLimited(3600));
        let ctx = context(gateway.clone(), Vec::new());

        let cancel = ctx.cancel.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_secs(10)).await;
            cancel.cancel();
        });

        let start = Instant::now();
        let outcome = deliver(&ctx, 100, 200, &album()).await.unwrap();

        assert_eq!(outcome, DeliveryOutcome::Cancelled);
        assert_eq!(start.elapsed(), Duration::from_secs(10));
    }
}
