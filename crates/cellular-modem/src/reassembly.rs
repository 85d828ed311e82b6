//! Concatenated SMS reassembly
//!
//! Segments are filed per reference until every declared slot is filled.
//! Delivery of a segment record succeeds only once its group is complete,
//! at which point the group leaves the store and its text is joined in order.

use chrono::{DateTime, Duration, Utc};
use std::collections::HashMap;
use tracing::{debug, info, warn};

use crate::errors::PduError;
use crate::types::{SegmentInfo, SmsRecord};

/// In-progress concatenated message
#[derive(Debug, Clone)]
struct SegmentGroup {
    segments: Vec<Option<String>>,
    received: usize,
    first_seen: DateTime<Utc>,
}

impl SegmentGroup {
    fn new(count: usize, now: DateTime<Utc>) -> Self {
        Self {
            segments: vec![None; count],
            received: 0,
            first_seen: now,
        }
    }

    fn is_complete(&self) -> bool {
        self.received == self.segments.len()
    }

    fn join(self) -> String {
        self.segments.into_iter().flatten().collect()
    }
}

/// Outcome of handing a record to [`SegmentStore::deliver`]
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Delivery {
    /// Ready for dispatch; segments have been joined
    Ready(SmsRecord),
    /// Group still incomplete; the store is unchanged
    Pending {
        reference: u16,
        received: usize,
        /// `None` when no segment of the group is known
        total: Option<usize>,
    },
}

/// Reference-keyed table of in-progress concatenated messages
#[derive(Debug, Default)]
pub struct SegmentStore {
    groups: HashMap<u16, SegmentGroup>,
    ttl: Option<Duration>,
}

impl SegmentStore {
    /// Store without expiry
    pub fn new() -> Self {
        Self::default()
    }

    /// Store that evicts groups whose first segment is older than `ttl`
    pub fn with_ttl(ttl: Duration) -> Self {
        Self {
            groups: HashMap::new(),
            ttl: Some(ttl),
        }
    }

    /// File one segment's text. Returns `true` when a previously empty slot
    /// was filled; redelivery of a filled slot leaves the count unchanged.
    pub fn insert(&mut self, segment: SegmentInfo, text: String) -> Result<bool, PduError> {
        self.insert_at(segment, text, Utc::now())
    }

    pub(crate) fn insert_at(
        &mut self,
        segment: SegmentInfo,
        text: String,
        now: DateTime<Utc>,
    ) -> Result<bool, PduError> {
        self.purge_expired(now);

        let count = usize::from(segment.count);
        let index = usize::from(segment.index);

        if let Some(group) = self.groups.get(&segment.reference) {
            if group.segments.len() != count {
                return Err(PduError::SegmentMismatch(format!(
                    "reference {} holds {} segments, PDU declares {}",
                    segment.reference,
                    group.segments.len(),
                    count
                )));
            }
        }
        if index >= count {
            return Err(PduError::SegmentMismatch(format!(
                "index {} out of range for {} segments of reference {}",
                index, count, segment.reference
            )));
        }

        let group = self
            .groups
            .entry(segment.reference)
            .or_insert_with(|| SegmentGroup::new(count, now));

        let slot = &mut group.segments[index];
        let filled = slot.is_none();
        if filled {
            group.received += 1;
        }
        *slot = Some(text);

        debug!(
            reference = segment.reference,
            index,
            received = group.received,
            total = count,
            duplicate = !filled,
            "Segment stored"
        );
        Ok(filled)
    }

    pub fn is_complete(&self, reference: u16) -> bool {
        self.groups
            .get(&reference)
            .map(SegmentGroup::is_complete)
            .unwrap_or(false)
    }

    /// `(received, total)` for a known reference
    pub fn received(&self, reference: u16) -> Option<(usize, usize)> {
        self.groups
            .get(&reference)
            .map(|group| (group.received, group.segments.len()))
    }

    /// Remove a complete group and return its joined text
    pub fn take_complete(&mut self, reference: u16) -> Option<String> {
        if !self.is_complete(reference) {
            return None;
        }
        self.groups.remove(&reference).map(SegmentGroup::join)
    }

    /// Decide whether a record can be dispatched.
    ///
    /// Non-segment records are always ready. A segment record is ready only
    /// when its group is complete; the group is then consumed and the record
    /// carries the full text.
    pub fn deliver(&mut self, mut record: SmsRecord) -> Delivery {
        if !record.is_segment {
            return Delivery::Ready(record);
        }

        match self.take_complete(record.reference) {
            Some(content) => {
                info!(
                    reference = record.reference,
                    sender = %record.sender,
                    "Concatenated message complete"
                );
                record.content = content;
                Delivery::Ready(record)
            }
            None => {
                let (received, total) = match self.received(record.reference) {
                    Some((received, total)) => (received, Some(total)),
                    None => (0, None),
                };
                info!(
                    reference = record.reference,
                    received,
                    total = ?total,
                    "Concatenated message incomplete, holding segments"
                );
                Delivery::Pending {
                    reference: record.reference,
                    received,
                    total,
                }
            }
        }
    }

    /// Evict groups older than the TTL. Returns the number evicted.
    pub fn purge_expired(&mut self, now: DateTime<Utc>) -> usize {
        let Some(ttl) = self.ttl else {
            return 0;
        };

        let before = self.groups.len();
        self.groups.retain(|reference, group| {
            let expired = now - group.first_seen > ttl;
            if expired {
                warn!(
                    reference = *reference,
                    received = group.received,
                    total = group.segments.len(),
                    first_seen = %group.first_seen,
                    "Evicting stale incomplete message"
                );
            }
            !expired
        });
        before - self.groups.len()
    }

    /// Number of groups held
    pub fn len(&self) -> usize {
        self.groups.len()
    }

    pub fn is_empty(&self) -> bool {
        self.groups.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn seg(reference: u16, count: u8, index: u8) -> SegmentInfo {
        SegmentInfo {
            reference,
            count,
            index,
        }
    }

    fn record(reference: u16, content: &str) -> SmsRecord {
        SmsRecord {
            smsc: None,
            sender: "10010".to_string(),
            timestamp: "25/01/17,15:20:43".to_string(),
            content: content.to_string(),
            is_segment: true,
            reference,
        }
    }

    #[test]
    fn test_complete_group_joins_in_index_order() {
        let mut store = SegmentStore::new();
        store.insert(seg(1, 3, 2), "c".into()).unwrap();
        store.insert(seg(1, 3, 0), "a".into()).unwrap();
        assert!(!store.is_complete(1));
        store.insert(seg(1, 3, 1), "b".into()).unwrap();
        assert!(store.is_complete(1));

        match store.deliver(record(1, "b")) {
            Delivery::Ready(sms) => assert_eq!(sms.content, "abc"),
            other => panic!("expected ready, got {:?}", other),
        }
        assert!(store.is_empty());
    }

    #[test]
    fn test_incomplete_delivery_leaves_group() {
        let mut store = SegmentStore::new();
        store.insert(seg(9, 2, 0), "first".into()).unwrap();

        assert_eq!(
            store.deliver(record(9, "first")),
            Delivery::Pending {
                reference: 9,
                received: 1,
                total: Some(2),
            }
        );
        assert_eq!(store.received(9), Some((1, 2)));

        store.insert(seg(9, 2, 1), "second".into()).unwrap();
        assert!(matches!(store.deliver(record(9, "second")), Delivery::Ready(_)));
    }

    #[test]
    fn test_unknown_reference_is_pending() {
        let mut store = SegmentStore::new();
        assert_eq!(
            store.deliver(record(4, "x")),
            Delivery::Pending {
                reference: 4,
                received: 0,
                total: None,
            }
        );
    }

    #[test]
    fn test_non_segment_is_ready() {
        let mut store = SegmentStore::new();
        let mut sms = record(0, "single");
        sms.is_segment = false;
        assert_eq!(store.deliver(sms.clone()), Delivery::Ready(sms));
    }

    #[test]
    fn test_duplicate_segment_is_idempotent() {
        let mut store = SegmentStore::new();
        assert!(store.insert(seg(2, 2, 0), "x".into()).unwrap());
        assert!(!store.insert(seg(2, 2, 0), "x".into()).unwrap());
        assert_eq!(store.received(2), Some((1, 2)));
    }

    #[test]
    fn test_empty_segment_text_counts() {
        let mut store = SegmentStore::new();
        store.insert(seg(3, 1, 0), String::new()).unwrap();
        assert!(store.is_complete(3));
    }

    #[test]
    fn test_index_out_of_range() {
        let mut store = SegmentStore::new();
        let err = store.insert(seg(5, 2, 2), "x".into()).unwrap_err();
        assert!(matches!(err, PduError::SegmentMismatch(_)));
        assert!(store.is_empty());

        assert!(store.insert(seg(5, 0, 0), "x".into()).is_err());
    }

    #[test]
    fn test_count_mismatch() {
        let mut store = SegmentStore::new();
        store.insert(seg(6, 2, 0), "x".into()).unwrap();
        let err = store.insert(seg(6, 3, 1), "y".into()).unwrap_err();
        assert!(err.to_string().contains("holds 2 segments, PDU declares 3"));
        assert_eq!(store.received(6), Some((1, 2)));
    }

    #[test]
    fn test_take_complete_requires_completion() {
        let mut store = SegmentStore::new();
        store.insert(seg(8, 2, 0), "x".into()).unwrap();
        assert_eq!(store.take_complete(8), None);
        assert_eq!(store.len(), 1);
    }

    #[test]
    fn test_ttl_evicts_stale_groups() {
        let mut store = SegmentStore::with_ttl(Duration::hours(1));
        let start = Utc::now();
        store.insert_at(seg(1, 2, 0), "old".into(), start).unwrap();
        store
            .insert_at(seg(2, 2, 0), "new".into(), start + Duration::minutes(50))
            .unwrap();

        assert_eq!(store.purge_expired(start + Duration::minutes(90)), 1);
        assert_eq!(store.received(1), None);
        assert_eq!(store.received(2), Some((1, 2)));
    }

    #[test]
    fn test_insert_purges_before_filing() {
        let mut store = SegmentStore::with_ttl(Duration::seconds(10));
        let start = Utc::now();
        store.insert_at(seg(1, 2, 0), "a".into(), start).unwrap();
        // Same reference reused by the network long after: a fresh group
        store
            .insert_at(seg(1, 3, 0), "z".into(), start + Duration::seconds(60))
            .unwrap();
        assert_eq!(store.received(1), Some((1, 3)));
    }

    #[test]
    fn test_no_expiry_by_default() {
        let mut store = SegmentStore::new();
        let start = Utc::now();
        store.insert_at(seg(1, 2, 0), "a".into(), start).unwrap();
        assert_eq!(store.purge_expired(start + Duration::days(365)), 0);
        assert_eq!(store.len(), 1);
    }
}
