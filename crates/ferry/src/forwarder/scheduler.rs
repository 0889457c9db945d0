//! Per-pair delivery loop.
//!
//! ```text
//!  bookmark = 0
//!  loop:
//!    batch = read_batch(donor, bookmark)       [reader.rs]
//!    └─ empty → pair complete
//!    units, bookmark = group_batch(batch)      [grouping.rs]
//!    for key in shuffled(units):
//!      for recipient in pair.recipients:
//!        deliver(unit, recipient)              [retry.rs]
//!      all delivered → pause send_interval
//! ```
//!
//! Units are processed in a fresh random order per batch so the relay does
//! not mirror the donor's posting rhythm. Messages inside a unit keep their
//! original order.

use std::collections::BTreeMap;

use rand::Rng;
use rand::seq::SliceRandom;
use tracing::{debug, info, warn};

use super::cycle::CycleContext;
use super::grouping::{DeliveryUnit, group_batch};
use super::pair::ChannelPair;
use super::reader;
use super::retry::{self, DeliveryOutcome};
use crate::gateway::GatewayError;

/// How processing of one pair ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PairOutcome {
    /// The donor returned an empty fetch.
    Completed,
    Cancelled,
}

/// How delivery of one unit to all of a pair's recipients ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UnitOutcome {
    /// Every recipient received the unit.
    Delivered,
    /// At least one recipient was skipped (permission) or exhausted.
    Failed,
    Cancelled,
}

/// Random processing order of unit keys.
pub fn processing_order<R: Rng + ?Sized>(
    units: &BTreeMap<i64, DeliveryUnit>,
    rng: &mut R,
) -> Vec<i64> {
    let mut keys: Vec<i64> = units.keys().copied().collect();
    keys.shuffle(rng);
    keys
}

/// Relay everything from the pair's donor, batch by batch, until exhausted.
///
/// Returns `Err` only when the session is invalid.
pub(crate) async fn run_pair(
    ctx: &CycleContext,
    pair: &ChannelPair,
) -> Result<PairOutcome, GatewayError> {
    let mut bookmark = 0;

    loop {
        if ctx.is_cancelled() {
            return Ok(PairOutcome::Cancelled);
        }

        let batch = reader::read_batch(
            ctx.gateway.as_ref(),
            pair.donor_id,
            bookmark,
            ctx.tuning.page_size,
            &ctx.cancel,
        )
        .await?;
        if batch.is_empty() {
            info!(pair = %pair.id, donor = pair.donor_id, "No new messages in channel");
            break;
        }

        let grouped = group_batch(batch, bookmark);
        if grouped.bookmark <= bookmark {
            warn!(pair = %pair.id, bookmark, "Gateway returned no messages past the bookmark");
            break;
        }
        bookmark = grouped.bookmark;
        let order = processing_order(&grouped.units, &mut rand::rng());
        debug!(
            pair = %pair.id,
            units = order.len(),
            bookmark,
            "Processing batch"
        );

        for key in order {
            let Some(unit) = grouped.units.get(&key) else {
                continue;
            };
            if deliver_unit(ctx, pair, unit).await? == UnitOutcome::Cancelled {
                return Ok(PairOutcome::Cancelled);
            }
        }
    }

    ctx.status.update(format!(
        "Cycle complete for pair '{}'. Starting a new send cycle...",
        pair.id
    ));
    Ok(PairOutcome::Completed)
}

/// Deliver `unit` to every recipient of `pair`, one after another.
///
/// A failing recipient never blocks the others. The send interval is applied
/// only when every recipient received the unit.
pub(crate) async fn deliver_unit(
    ctx: &CycleContext,
    pair: &ChannelPair,
    unit: &DeliveryUnit,
) -> Result<UnitOutcome, GatewayError> {
    let mut all_delivered = true;

    for &recipient in &pair.recipient_ids {
        match retry::deliver(ctx, pair.donor_id, recipient, unit).await? {
            DeliveryOutcome::Delivered => {}
            DeliveryOutcome::PermissionDenied | DeliveryOutcome::Exhausted => {
                all_delivered = false;
            }
            DeliveryOutcome::Cancelled => return Ok(UnitOutcome::Cancelled),
        }
    }

    if !all_delivered {
        return Ok(UnitOutcome::Failed);
    }

    ctx.status.update(format!(
        "Group of {} message(s) forwarded successfully",
        unit.len()
    ));
    if !ctx.pause(ctx.send_interval).await {
        return Ok(UnitOutcome::Cancelled);
    }
    Ok(UnitOutcome::Delivered)
}
