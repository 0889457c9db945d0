//! The long-lived forwarding task.
//!
//! One cycle is a full pass over every configured pair. After a pass the task
//! pauses briefly and starts over from offset zero for every donor.

use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::time::Duration;

use futures::FutureExt;
use tokio_util::sync::CancellationToken;
use tracing::{error, info};

use super::health::HealthLedger;
use super::pair::ChannelPair;
use super::scheduler;
use super::status::{PhaseCell, RunPhase, StatusBoard};
use crate::gateway::{GatewayError, SessionGateway};

/// Fixed engine timings. Only the send interval is user-configurable.
#[derive(Debug, Clone)]
pub(crate) struct Tuning {
    /// Attempts per destination, not counting rate-limit waits.
    pub max_attempts: u32,
    /// Delay between failed attempts.
    pub retry_delay: Duration,
    /// Pause between two full passes.
    pub cycle_pause: Duration,
    /// Pause after an unexpected failure inside a pass.
    pub error_pause: Duration,
    /// Messages requested per gateway fetch.
    pub page_size: u32,
}

impl Default for Tuning {
    fn default() -> Self {
        Self {
            max_attempts: 5,
            retry_delay: Duration::from_secs(2),
            cycle_pause: Duration::from_secs(1),
            error_pause: Duration::from_secs(5),
            page_size: 100,
        }
    }
}

/// Everything the running cycle needs, owned by the task.
pub(crate) struct CycleContext {
    pub gateway: Arc<dyn SessionGateway>,
    pub pairs: Vec<ChannelPair>,
    pub send_interval: Duration,
    pub tuning: Tuning,
    pub health: HealthLedger,
    pub status: StatusBoard,
    pub phase: PhaseCell,
    pub cancel: CancellationToken,
}

impl CycleContext {
    pub fn is_cancelled(&self) -> bool {
        self.cancel.is_cancelled()
    }

    /// Sleep for `duration` unless the run is stopped first.
    ///
    /// Returns `false` when cancelled.
    pub async fn pause(&self, duration: Duration) -> bool {
        tokio::select! {
            biased;
            _ = self.cancel.cancelled() => false,
            _ = tokio::time::sleep(duration) => true,
        }
    }
}

/// Run passes until cancelled or until the session becomes invalid.
pub(crate) async fn run(ctx: CycleContext) {
    info!(pairs = ctx.pairs.len(), "Forwarding cycle started");

    while !ctx.is_cancelled() {
        let pass = AssertUnwindSafe(run_pass(&ctx)).catch_unwind().await;
        match pass {
            Ok(Ok(())) => {}
            Ok(Err(e)) => {
                error!(error = %e, "Session invalid, halting forwarding");
                ctx.phase.set(RunPhase::SessionExpired);
                ctx.status
                    .update("Session expired. Please log in again.");
                break;
            }
            Err(_) => {
                error!("Forwarding pass failed, resuming after a short pause");
                if !ctx.pause(ctx.tuning.error_pause).await {
                    break;
                }
                continue;
            }
        }

        if !ctx.pause(ctx.tuning.cycle_pause).await {
            break;
        }
    }

    info!("Forwarding cycle ended");
}

/// One pass over every pair. Returns `Err` only when the session is invalid.
///
/// A pair that fails unexpectedly is logged and skipped so the pairs after it
/// still get their turn.
async fn run_pass(ctx: &CycleContext) -> Result<(), GatewayError> {
    for pair in &ctx.pairs {
        if ctx.is_cancelled() {
            return Ok(());
        }

        let outcome = AssertUnwindSafe(scheduler::run_pair(ctx, pair))
            .catch_unwind()
            .await;
        match outcome {
            Ok(Ok(_)) => {}
            Ok(Err(e)) => return Err(e),
            Err(_) => {
                error!(pair = %pair.id, donor = pair.donor_id, "Failed to process channel pair, moving on");
                ctx.status
                    .update(format!("Error while processing pair '{}'", pair.id));
                if !ctx.pause(ctx.tuning.error_pause).await {
                    return Ok(());
                }
            }
        }
    }
    Ok(())
}
