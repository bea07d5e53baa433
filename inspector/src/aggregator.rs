//! Per-transaction aggregation of operation records.

use std::collections::{HashMap, HashSet};

use itertools::Itertools;
use log::trace;

use crate::record::{OperationKind, OperationRecord};

/// Multiset of canonicalized operation records, one bucket per
/// [`OperationKind`].
///
/// Records are keys of a count map: recording the same `(from, to,
/// value, code)` tuple twice collapses into a single record with count
/// 2. No record is ever removed individually; the buckets are dropped
/// wholesale by [`clear`](Self::clear) after a transaction flush.
///
/// Creation records are additionally accumulated for the process
/// lifetime (identity-deduplicated, first-seen order) to back the
/// created-contracts dump, which covers every creation observed since
/// startup rather than a single transaction.
#[derive(Debug, Default)]
pub struct OperationAggregator {
    buckets: [HashMap<OperationRecord, u32>; 7],
    created: Vec<OperationRecord>,
    created_seen: HashSet<OperationRecord>,
}

impl OperationAggregator {
    /// Adds one occurrence of `record` to its kind's bucket.
    pub fn record(&mut self, kind: OperationKind, record: OperationRecord) {
        trace!("recording {kind:?} operation {record:?}");
        if kind == OperationKind::Create && self.created_seen.insert(record.clone()) {
            self.created.push(record.clone());
        }
        *self.buckets[kind.code() as usize].entry(record).or_insert(0) += 1;
    }

    /// Number of non-empty buckets, i.e. the bucket count of the next
    /// transaction record.
    pub fn non_empty_buckets(&self) -> usize {
        self.buckets.iter().filter(|bucket| !bucket.is_empty()).count()
    }

    /// Records of `kind` with their counts, in serialization order:
    /// ascending by the full record key. The explicit sort keeps output
    /// independent of map iteration order.
    pub fn sorted_records(&self, kind: OperationKind) -> Vec<(&OperationRecord, u32)> {
        self.buckets[kind.code() as usize]
            .iter()
            .map(|(record, &count)| (record, count))
            .sorted_by(|lhs, rhs| lhs.0.cmp(rhs.0))
            .collect()
    }

    /// Every distinct creation record observed since process start, in
    /// first-seen order. Unaffected by [`clear`](Self::clear).
    pub fn created_contracts(&self) -> &[OperationRecord] {
        &self.created
    }

    /// Drops all per-transaction buckets. The creation accumulator
    /// survives.
    pub fn clear(&mut self) {
        for bucket in &mut self.buckets {
            bucket.clear();
        }
    }
}

#[cfg(test)]
mod tests {
    use ethereum_types::U256;

    use super::*;
    use crate::record::AddressId;

    fn record(from: u64, to: u64, value: u64) -> OperationRecord {
        OperationRecord {
            from: AddressId(from),
            to: AddressId(to),
            value: Some(U256::from(value)),
            code: None,
        }
    }

    #[test]
    fn duplicates_collapse_into_a_count() {
        let mut aggregator = OperationAggregator::default();
        for _ in 0..3 {
            aggregator.record(OperationKind::Call, record(0, 1, 5));
        }
        aggregator.record(OperationKind::Call, record(0, 1, 6));

        let records = aggregator.sorted_records(OperationKind::Call);
        assert_eq!(records.len(), 2);
        assert_eq!(records[0], (&record(0, 1, 5), 3));
        assert_eq!(records[1], (&record(0, 1, 6), 1));
    }

    #[test]
    fn kinds_never_share_a_bucket() {
        let mut aggregator = OperationAggregator::default();
        aggregator.record(OperationKind::Call, record(0, 1, 5));
        aggregator.record(OperationKind::CallCode, record(0, 1, 5));

        assert_eq!(aggregator.non_empty_buckets(), 2);
        assert_eq!(aggregator.sorted_records(OperationKind::Call).len(), 1);
        assert_eq!(aggregator.sorted_records(OperationKind::CallCode).len(), 1);
    }

    #[test]
    fn records_sort_by_from_then_to_then_value() {
        let mut aggregator = OperationAggregator::default();
        aggregator.record(OperationKind::Call, record(1, 0, 1));
        aggregator.record(OperationKind::Call, record(0, 1, 9));
        aggregator.record(OperationKind::Call, record(0, 1, 2));
        aggregator.record(OperationKind::Call, record(0, 0, 4));

        let order = aggregator
            .sorted_records(OperationKind::Call)
            .into_iter()
            .map(|(record, _)| (record.from.0, record.to.0, record.value.unwrap().as_u64()))
            .collect::<Vec<_>>();
        assert_eq!(order, vec![(0, 0, 4), (0, 1, 2), (0, 1, 9), (1, 0, 1)]);
    }

    #[test]
    fn clear_keeps_the_creation_accumulator() {
        let mut aggregator = OperationAggregator::default();
        let creation = OperationRecord {
            code: Some(vec![0x60, 0x0a]),
            ..record(0, 1, 0)
        };
        aggregator.record(OperationKind::Create, creation.clone());
        aggregator.clear();

        assert_eq!(aggregator.non_empty_buckets(), 0);
        assert_eq!(aggregator.created_contracts(), &[creation.clone()]);

        // Re-creating the same contract in a later transaction does not
        // duplicate the accumulator entry.
        aggregator.record(OperationKind::Create, creation.clone());
        assert_eq!(aggregator.created_contracts(), &[creation]);
    }
}
