use std::collections::{BTreeMap, BTreeSet};

use seal_store::{CounterStore, RecordStore};
use seal_types::SeriesKey;
use serde::{Deserialize, Serialize};
use tracing::{error, info};

use crate::entry::AuditAction;
use crate::error::LedgerError;
use crate::traits::LedgerReader;

/// Accounting of every number a series has handed out.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ContinuityReport {
    pub series_key: SeriesKey,
    pub start: u64,
    /// First number not yet handed out.
    pub next_value: u64,
    /// Numbers bound to an issued record.
    pub issued: Vec<u64>,
    /// Numbers voided by a `NumberSkipped` entry.
    pub skipped: Vec<u64>,
    /// Numbers allocated but neither issued nor voided yet.
    pub pending: Vec<u64>,
    /// Numbers below `next_value` with no trace in records or ledger.
    pub gaps: Vec<u64>,
    /// Numbers allocated or issued more than once.
    pub duplicates: Vec<u64>,
}

impl ContinuityReport {
    /// `true` if every allocated number is accounted for exactly once.
    pub fn is_continuous(&self) -> bool {
        self.gaps.is_empty() && self.duplicates.is_empty()
    }
}

/// Cross-checks a series counter against issued records and the audit trail.
pub struct SeriesContinuity;

impl SeriesContinuity {
    pub fn check(
        series: &SeriesKey,
        start: u64,
        counters: &dyn CounterStore,
        records: &dyn RecordStore,
        ledger: &dyn LedgerReader,
    ) -> Result<ContinuityReport, LedgerError> {
        let next_value = counters
            .load(series)?
            .map_or(start, |counter| counter.next_value);

        let mut issued_count: BTreeMap<u64, usize> = BTreeMap::new();
        for (number, _) in records.issued_numbers(series)? {
            *issued_count.entry(number).or_default() += 1;
        }

        let mut allocated_count: BTreeMap<u64, usize> = BTreeMap::new();
        let mut skipped = BTreeSet::new();
        for entry in ledger.read_all()? {
            match entry.action {
                AuditAction::NumberAllocated { series_key, number } if &series_key == series => {
                    *allocated_count.entry(number).or_default() += 1;
                }
                AuditAction::NumberSkipped {
                    series_key, number, ..
                } if &series_key == series => {
                    skipped.insert(number);
                }
                _ => {}
            }
        }

        let duplicates: Vec<u64> = issued_count
            .iter()
            .chain(allocated_count.iter())
            .filter(|(_, &count)| count > 1)
            .map(|(&number, _)| number)
            .collect::<BTreeSet<_>>()
            .into_iter()
            .collect();

        let pending = allocated_count
            .keys()
            .filter(|n| !issued_count.contains_key(n) && !skipped.contains(n))
            .copied()
            .collect();

        let gaps = (start..next_value)
            .filter(|n| {
                !issued_count.contains_key(n)
                    && !skipped.contains(n)
                    && !allocated_count.contains_key(n)
            })
            .collect();

        let report = ContinuityReport {
            series_key: series.clone(),
            start,
            next_value,
            issued: issued_count.into_keys().collect(),
            skipped: skipped.into_iter().collect(),
            pending,
            gaps,
            duplicates,
        };

        if report.is_continuous() {
            info!(
                series = %series,
                next_value,
                issued = report.issued.len(),
                skipped = report.skipped.len(),
                "series continuity verified"
            );
        } else {
            error!(
                target: "seal::alarm",
                series = %series,
                gaps = ?report.gaps,
                duplicates = ?report.duplicates,
                "series continuity broken"
            );
        }
        Ok(report)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::memory::InMemoryLedger;
    use crate::traits::LedgerWriter;
    use seal_store::{InMemoryCounterStore, InMemoryRecordStore};
    use seal_types::{Actor, RecordId};

    fn series() -> SeriesKey {
        SeriesKey::new("RE2025").unwrap()
    }

    fn allocate(counters: &InMemoryCounterStore, ledger: &InMemoryLedger, number: u64) {
        let expected = if number == 1 { None } else { Some(number) };
        assert!(counters
            .compare_and_swap(&series(), expected, number + 1)
            .unwrap());
        ledger
            .append(
                &RecordId::new(),
                &Actor::system(),
                AuditAction::NumberAllocated {
                    series_key: series(),
                    number,
                },
            )
            .unwrap();
    }

    #[test]
    fn empty_series_is_continuous() {
        let report = SeriesContinuity::check(
            &series(),
            1,
            &InMemoryCounterStore::new(),
            &InMemoryRecordStore::new(),
            &InMemoryLedger::new(),
        )
        .unwrap();
        assert_eq!(report.next_value, 1);
        assert!(report.is_continuous());
    }

    #[test]
    fn skipped_and_pending_numbers_are_accounted() {
        let counters = InMemoryCounterStore::new();
        let ledger = InMemoryLedger::new();
        allocate(&counters, &ledger, 1);
        allocate(&counters, &ledger, 2);
        ledger
            .append(
                &RecordId::new(),
                &Actor::system(),
                AuditAction::NumberSkipped {
                    series_key: series(),
                    number: 1,
                    reason: "render failed".into(),
                },
            )
            .unwrap();

        let report =
            SeriesContinuity::check(&series(), 1, &counters, &InMemoryRecordStore::new(), &ledger)
                .unwrap();
        assert_eq!(report.next_value, 3);
        assert_eq!(report.skipped, vec![1]);
        assert_eq!(report.pending, vec![2]);
        assert!(report.gaps.is_empty());
        assert!(report.is_continuous());
    }

    #[test]
    fn untraced_number_is_a_gap() {
        let counters = InMemoryCounterStore::new();
        let ledger = InMemoryLedger::new();
        allocate(&counters, &ledger, 1);
        assert!(counters.compare_and_swap(&series(), Some(2), 4).unwrap());
        allocate(&counters, &ledger, 4);

        let report =
            SeriesContinuity::check(&series(), 1, &counters, &InMemoryRecordStore::new(), &ledger)
                .unwrap();
        assert_eq!(report.gaps, vec![2, 3]);
        assert!(!report.is_continuous());
    }

    #[test]
    fn double_allocation_is_a_duplicate() {
        let counters = InMemoryCounterStore::new();
        let ledger = InMemoryLedger::new();
        allocate(&counters, &ledger, 1);
        ledger
            .append(
                &RecordId::new(),
                &Actor::system(),
                AuditAction::NumberAllocated {
                    series_key: series(),
                    number: 1,
                },
            )
            .unwrap();

        let report =
            SeriesContinuity::check(&series(), 1, &counters, &InMemoryRecordStore::new(), &ledger)
                .unwrap();
        assert_eq!(report.duplicates, vec![1]);
        assert!(!report.is_continuous());
    }

    #[test]
    fn other_series_are_ignored() {
        let counters = InMemoryCounterStore::new();
        let ledger = InMemoryLedger::new();
        allocate(&counters, &ledger, 1);
        ledger
            .append(
                &RecordId::new(),
                &Actor::system(),
                AuditAction::NumberAllocated {
                    series_key: SeriesKey::new("GS2025").unwrap(),
                    number: 1,
                },
            )
            .unwrap();

        let report =
            SeriesContinuity::check(&series(), 1, &counters, &InMemoryRecordStore::new(), &ledger)
                .unwrap();
        assert!(report.duplicates.is_empty());
        assert_eq!(report.pending, vec![1]);
    }
}
