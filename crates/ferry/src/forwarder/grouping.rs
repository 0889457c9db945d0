//! Grouping of fetched messages into delivery units.

use std::collections::BTreeMap;

use crate::gateway::{MessageId, RawMessage};

/// Smallest atomically delivered cluster: one message or one album.
///
/// Messages are always held in ascending id order, which is the order the
/// platform originally posted them in.
#[derive(Debug, Clone, PartialEq)]
pub struct DeliveryUnit {
    key: i64,
    messages: Vec<RawMessage>,
}

impl DeliveryUnit {
    pub fn new(key: i64, mut messages: Vec<RawMessage>) -> Self {
        messages.sort_by_key(|m| m.id);
        Self { key, messages }
    }

    pub fn key(&self) -> i64 {
        self.key
    }

    pub fn messages(&self) -> &[RawMessage] {
        &self.messages
    }

    pub fn ids(&self) -> Vec<MessageId> {
        self.messages.iter().map(|m| m.id).collect()
    }

    pub fn len(&self) -> usize {
        self.messages.len()
    }

    pub fn is_empty(&self) -> bool {
        self.messages.is_empty()
    }
}

/// Units of one fetch pass plus the advanced bookmark.
#[derive(Debug, Default)]
pub struct GroupedBatch {
    pub units: BTreeMap<i64, DeliveryUnit>,
    pub bookmark: MessageId,
}

/// Partition `batch` by group key and advance `bookmark` to the highest id seen.
///
/// The bookmark moves past every fetched message whatever unit it landed in,
/// so the next fetch never re-reads this batch.
pub fn group_batch(batch: Vec<RawMessage>, bookmark: MessageId) -> GroupedBatch {
    let mut buckets: BTreeMap<i64, Vec<RawMessage>> = BTreeMap::new();
    let mut max_id = bookmark;

    for msg in batch {
        max_id = max_id.max(msg.id);
        buckets.entry(msg.unit_key()).or_default().push(msg);
    }

    GroupedBatch {
        units: buckets
            .into_iter()
            .map(|(key, msgs)| (key, DeliveryUnit::new(key, msgs)))
            .collect(),
        bookmark: max_id,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn msgs(items: &[(MessageId, Option<i64>)]) -> Vec<RawMessage> {
        items
            .iter()
            .map(|&(id, group)| RawMessage::new(id, group))
            .collect()
    }

    #[test]
    fn singleton_and_album() {
        let grouped = group_batch(msgs(&[(1, None), (2, Some(77)), (3, Some(77))]), 0);

        assert_eq!(grouped.units.len(), 2);
        assert_eq!(grouped.units[&1].ids(), vec![1]);
        assert_eq!(grouped.units[&77].ids(), vec![2, 3]);
        assert_eq!(grouped.bookmark, 3);
    }

    #[test]
    fn album_members_sorted_by_id() {
        let grouped = group_batch(msgs(&[(9, Some(5)), (7, Some(5)), (8, Some(5))]), 0);
        assert_eq!(grouped.units[&5].ids(), vec![7, 8, 9]);
    }

    #[test]
    fn bookmark_spans_non_contiguous_units() {
        let grouped = group_batch(
            msgs(&[(10, Some(1)), (11, None), (12, Some(1)), (13, Some(2))]),
            4,
        );
        assert_eq!(grouped.units[&1].ids(), vec![10, 12]);
        assert_eq!(grouped.units[&11].ids(), vec![11]);
        assert_eq!(grouped.units[&2].ids(), vec![13]);
        assert_eq!(grouped.bookmark, 13);
    }

    #[test]
    fn empty_batch_keeps_bookmark() {
        let grouped = group_batch(Vec::new(), 42);
        assert!(grouped.units.is_empty());
        assert_eq!(grouped.bookmark, 42);
    }
}
