//! Forwarding engine.
//!
//! Relays messages from donor channels to recipient channels, continuously
//! and unattended.
//!
//! # Architecture
//!
//! ```text
//!  EngineHandle (start / stop / status)             [controller.rs]
//!       │  spawns one task per run
//!       ▼
//!  cycle::run — full passes over all pairs          [cycle.rs]
//!       │  for each pair
//!       ▼
//!  scheduler::run_pair                              [scheduler.rs]
//!       ├─ reader::read_batch (bookmark → batch)    [reader.rs]
//!       ├─ group_batch (batch → units, bookmark)    [grouping.rs]
//!       └─ shuffled units × recipients
//!             └─ retry::deliver                     [retry.rs]
//!                   └─ HealthLedger                 [health.rs]
//! ```
//!
//! Everything runs as a single task on a single gateway connection: no two
//! pairs, units or destinations are ever processed concurrently. The task
//! checks its cancellation token between fetches, per destination attempt and
//! in every sleep.
//!
//! # Error policy
//!
//! Failures never escape the task. Rate limits wait and retry, permission
//! errors skip the destination, other failures retry a bounded number of
//! times and land in the [`HealthLedger`]. Only an invalid session ends the
//! run, leaving the engine in [`RunPhase::SessionExpired`].

mod controller;
pub(crate) mod cycle;
mod grouping;
mod health;
mod pair;
pub mod reader;
mod retry;
mod scheduler;
mod status;

pub use controller::{ConfigureError, EngineHandle, StartError, StopError};
pub use grouping::{DeliveryUnit, GroupedBatch, group_batch};
pub use health::{HealthLedger, HealthRecord};
pub use pair::ChannelPair;
pub use retry::DeliveryOutcome;
pub use scheduler::{PairOutcome, UnitOutcome, processing_order};
pub use status::{EngineStatus, RunPhase, StatusBoard, StatusLine};
