//! Per-destination failure bookkeeping.

use std::collections::BTreeMap;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use dashmap::DashMap;
use serde::Serialize;

use crate::gateway::ChannelId;

/// Failure history of one destination since its last successful delivery.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct HealthRecord {
    pub consecutive_failures: u32,
    pub last_failure_at: Option<DateTime<Utc>>,
}

/// Destination id → [`HealthRecord`].
///
/// Written only by the retry controller, read by status reporting. Cleared
/// wholesale when a run starts.
#[derive(Clone, Default)]
pub struct HealthLedger {
    records: Arc<DashMap<ChannelId, HealthRecord>>,
}

impl HealthLedger {
    pub fn new() -> Self {
        Self::default()
    }

    /// Forget everything about `destination`.
    pub fn record_success(&self, destination: ChannelId) {
        self.records.remove(&destination);
    }

    /// Count one exhausted delivery against `destination`.
    pub fn record_failure(&self, destination: ChannelId) -> HealthRecord {
        let mut entry = self.records.entry(destination).or_default();
        entry.consecutive_failures += 1;
        entry.last_failure_at = Some(Utc::now());
        entry.clone()
    }

    pub fn get(&self, destination: ChannelId) -> Option<HealthRecord> {
        self.records.get(&destination).map(|r| r.clone())
    }

    pub fn snapshot(&self) -> BTreeMap<ChannelId, HealthRecord> {
        self.records
            .iter()
            .map(|e| (*e.key(), e.value().clone()))
            .collect()
    }

    pub fn clear(&self) {
        self.records.clear();
    }
}
