use std::collections::HashMap;
use std::sync::RwLock;

use chrono::{DateTime, Utc};
use seal_crypto::GENESIS_HASH;
use seal_types::{Actor, RecordId};
use tracing::debug;

use crate::entry::{AuditAction, AuditEntry};
use crate::error::LedgerError;
use crate::traits::{LedgerReader, LedgerWriter};

/// In-memory audit ledger for tests, local demos, and embedding.
pub struct InMemoryLedger {
    inner: RwLock<LedgerState>,
}

#[derive(Default)]
struct LedgerState {
    entries: Vec<AuditEntry>,
    by_record: HashMap<RecordId, Vec<usize>>,
}

impl InMemoryLedger {
    pub fn new() -> Self {
        Self {
            inner: RwLock::new(LedgerState::default()),
        }
    }

    fn read_state(&self) -> Result<std::sync::RwLockReadGuard<'_, LedgerState>, LedgerError> {
        self.inner
            .read()
            .map_err(|_| LedgerError::LockPoisoned("ledger read"))
    }
}

impl Default for InMemoryLedger {
    fn default() -> Self {
        Self::new()
    }
}

impl LedgerWriter for InMemoryLedger {
    fn append(
        &self,
        record_id: &RecordId,
        actor: &Actor,
        action: AuditAction,
    ) -> Result<AuditEntry, LedgerError> {
        let mut state = self
            .inner
            .write()
            .map_err(|_| LedgerError::LockPoisoned("ledger write"))?;

        let last = state.entries.last();
        let entry_id = last.map_or(1, |e| e.entry_id + 1);
        let prev_entry_hash = last.map_or(GENESIS_HASH, |e| e.entry_hash);
        let at = next_timestamp(last.map(|e| e.at));

        let entry = AuditEntry::seal(
            entry_id,
            record_id.clone(),
            actor.clone(),
            action,
            at,
            prev_entry_hash,
        );

        let index = state.entries.len();
        state.entries.push(entry.clone());
        state
            .by_record
            .entry(record_id.clone())
            .or_default()
            .push(index);

        debug!(entry = %entry, "audit entry appended");
        Ok(entry)
    }
}

impl LedgerReader for InMemoryLedger {
    fn head(&self) -> Result<Option<AuditEntry>, LedgerError> {
        Ok(self.read_state()?.entries.last().cloned())
    }

    fn get(&self, entry_id: u64) -> Result<Option<AuditEntry>, LedgerError> {
        if entry_id == 0 {
            return Ok(None);
        }
        Ok(self
            .read_state()?
            .entries
            .get((entry_id - 1) as usize)
            .cloned())
    }

    fn read_range(&self, from: u64, to: u64) -> Result<Vec<AuditEntry>, LedgerError> {
        let state = self.read_state()?;
        let len = state.entries.len() as u64;
        if from == 0 || from > to || to > len {
            return Err(LedgerError::InvalidRange { from, to });
        }
        Ok(state.entries[(from - 1) as usize..to as usize].to_vec())
    }

    fn read_all(&self) -> Result<Vec<AuditEntry>, LedgerError> {
        Ok(self.read_state()?.entries.clone())
    }

    fn entries_for(&self, record_id: &RecordId) -> Result<Vec<AuditEntry>, LedgerError> {
        let state = self.read_state()?;
        Ok(state
            .by_record
            .get(record_id)
            .map(|indices| {
                indices
                    .iter()
                    .filter_map(|&i| state.entries.get(i).cloned())
                    .collect()
            })
            .unwrap_or_default())
    }

    fn entry_count(&self) -> Result<u64, LedgerError> {
        Ok(self.read_state()?.entries.len() as u64)
    }
}

/// Entry timestamps never go backwards, even if the wall clock does.
fn next_timestamp(last: Option<DateTime<Utc>>) -> DateTime<Utc> {
    let now = Utc::now();
    match last {
        Some(prev) if prev >= now => prev + chrono::Duration::nanoseconds(1),
        _ => now,
    }
}
