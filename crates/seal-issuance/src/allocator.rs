use std::sync::Arc;

use seal_ledger::{AuditAction, AuditEntry, LedgerWriter};
use seal_store::CounterStore;
use seal_types::{Actor, RecordId, SeriesKey};
use tracing::{debug, error, warn};

use crate::error::{IssuanceError, IssuanceResult};

/// Upper bound on lost compare-and-swap races within one allocation.
const MAX_CAS_ATTEMPTS: u32 = 10_000;

/// Hands out gapless, duplicate-free sequence numbers per series.
///
/// Allocation is a compare-and-swap loop against the [`CounterStore`]: a
/// number is returned only after the increment that reserves it has been
/// persisted, and every grant is recorded in the ledger before the call
/// returns.
pub struct SequenceAllocator {
    counters: Arc<dyn CounterStore>,
    ledger: Arc<dyn LedgerWriter>,
    start: u64,
}

impl SequenceAllocator {
    pub fn new(counters: Arc<dyn CounterStore>, ledger: Arc<dyn LedgerWriter>, start: u64) -> Self {
        Self {
            counters,
            ledger,
            start: start.max(1),
        }
    }

    pub fn start(&self) -> u64 {
        self.start
    }

    /// Allocate the next number of `series` for `record_id`.
    pub fn allocate(
        &self,
        series: &SeriesKey,
        record_id: &RecordId,
        actor: &Actor,
    ) -> IssuanceResult<u64> {
        let persistence_failure = |reason: String| IssuanceError::AllocationPersistenceFailure {
            series: series.clone(),
            reason,
        };

        let mut attempts = 0;
        let number = loop {
            attempts += 1;
            if attempts > MAX_CAS_ATTEMPTS {
                return Err(persistence_failure(format!(
                    "gave up after {MAX_CAS_ATTEMPTS} contended attempts"
                )));
            }

            let current = self
                .counters
                .load(series)
                .map_err(|e| persistence_failure(e.to_string()))?;
            let (expected, candidate) = match current {
                Some(counter) => (Some(counter.next_value), counter.next_value),
                None => (None, self.start),
            };

            match self
                .counters
                .compare_and_swap(series, expected, candidate + 1)
            {
                Ok(true) => break candidate,
                Ok(false) => continue,
                Err(e) => return Err(persistence_failure(e.to_string())),
            }
        };

        if attempts > 1 {
            debug!(series = %series, number, attempts, "allocation contended");
        }

        if let Err(e) = self.ledger.append(
            record_id,
            actor,
            AuditAction::NumberAllocated {
                series_key: series.clone(),
                number,
            },
        ) {
            // The increment is durable but unlogged; continuity checks will
            // report the number as a gap.
            error!(
                target: "seal::alarm",
                series = %series,
                number,
                error = %e,
                "allocated number could not be audited"
            );
            return Err(e.into());
        }

        debug!(series = %series, number, record = %record_id.short_id(), "number allocated");
        Ok(number)
    }

    /// Allocate a number wrapped in a guard that voids it unless committed.
    pub fn reserve(
        &self,
        series: &SeriesKey,
        record_id: &RecordId,
        actor: &Actor,
    ) -> IssuanceResult<PendingNumber> {
        let number = self.allocate(series, record_id, actor)?;
        Ok(PendingNumber {
            ledger: Arc::clone(&self.ledger),
            series: series.clone(),
            number,
            record_id: record_id.clone(),
            actor: actor.clone(),
            armed: true,
        })
    }

    /// Formally abandon an allocated number. It is never handed out again.
    pub fn void(
        &self,
        series: &SeriesKey,
        number: u64,
        record_id: &RecordId,
        actor: &Actor,
        reason: &str,
    ) -> IssuanceResult<AuditEntry> {
        void_number(self.ledger.as_ref(), series, number, record_id, actor, reason)
    }
}

fn void_number(
    ledger: &dyn LedgerWriter,
    series: &SeriesKey,
    number: u64,
    record_id: &RecordId,
    actor: &Actor,
    reason: &str,
) -> IssuanceResult<AuditEntry> {
    let entry = ledger.append(
        record_id,
        actor,
        AuditAction::NumberSkipped {
            series_key: series.clone(),
            number,
            reason: reason.to_string(),
        },
    )?;
    warn!(series = %series, number, reason, "sequence number voided");
    Ok(entry)
}

/// An allocated number whose record has not been committed yet.
///
/// Dropping the guard without calling [`PendingNumber::commit`] voids the
/// number, which covers both error paths and callers abandoning an
/// in-flight issuance.
pub struct PendingNumber {
    ledger: Arc<dyn LedgerWriter>,
    series: SeriesKey,
    number: u64,
    record_id: RecordId,
    actor: Actor,
    armed: bool,
}

impl PendingNumber {
    pub fn number(&self) -> u64 {
        self.number
    }

    pub fn series(&self) -> &SeriesKey {
        &self.series
    }

    /// The record now owns the number.
    pub fn commit(mut self) -> u64 {
        self.armed = false;
        self.number
    }

    /// Void the number with an explicit reason.
    pub fn void(mut self, reason: &str) -> IssuanceResult<AuditEntry> {
        self.armed = false;
        void_number(
            self.ledger.as_ref(),
            &self.series,
            self.number,
            &self.record_id,
            &self.actor,
            reason,
        )
    }
}

impl Drop for PendingNumber {
    fn drop(&mut self) {
        if !self.armed {
            return;
        }
        if let Err(e) = void_number(
            self.ledger.as_ref(),
            &self.series,
            self.number,
            &self.record_id,
            &self.actor,
            "issuance abandoned before commit",
        ) {
            error!(
                target: "seal::alarm",
                series = %self.series,
                number = self.number,
                error = %e,
                "abandoned number could not be voided"
            );
        }
    }
}
