use seal_crypto::{HashChainVerifier, GENESIS_HASH};
use seal_types::{Actor, RecordId};
use tracing::error;

use crate::entry::{AuditAction, AuditEntry};
use crate::error::LedgerError;

/// Write boundary of the audit ledger.
///
/// Appends are serialized per ledger: entry ids are assigned in append order
/// and every entry links to the hash of the one before it.
pub trait LedgerWriter: Send + Sync {
    fn append(
        &self,
        record_id: &RecordId,
        actor: &Actor,
        action: AuditAction,
    ) -> Result<AuditEntry, LedgerError>;
}

/// Read and verification boundary of the audit ledger.
pub trait LedgerReader: Send + Sync {
    /// The most recent entry.
    fn head(&self) -> Result<Option<AuditEntry>, LedgerError>;

    fn get(&self, entry_id: u64) -> Result<Option<AuditEntry>, LedgerError>;

    /// Entries `from..=to`. Both bounds must lie within the ledger.
    fn read_range(&self, from: u64, to: u64) -> Result<Vec<AuditEntry>, LedgerError>;

    fn read_all(&self) -> Result<Vec<AuditEntry>, LedgerError>;

    /// Entries about one record, in append order.
    fn entries_for(&self, record_id: &RecordId) -> Result<Vec<AuditEntry>, LedgerError>;

    fn entry_count(&self) -> Result<u64, LedgerError>;

    /// Re-verify entries `from..=to`, returning the first break as
    /// [`LedgerError::ChainIntegrityFailure`].
    ///
    /// A break is logged on the `seal::alarm` target. It is never repaired.
    fn check_chain(&self, from: u64, to: u64) -> Result<(), LedgerError> {
        let entries = self.read_range(from, to)?;
        let anchor = if from == 1 {
            GENESIS_HASH
        } else {
            self.get(from - 1)?
                .map(|prev| prev.entry_hash)
                .ok_or(LedgerError::InvalidRange { from, to })?
        };

        HashChainVerifier::verify_chain(&entries, anchor).map_err(|e| {
            error!(
                target: "seal::alarm",
                entry_id = e.entry_id(),
                from,
                to,
                error = %e,
                "audit chain integrity failure"
            );
            LedgerError::ChainIntegrityFailure {
                entry_id: e.entry_id(),
                reason: e.to_string(),
            }
        })
    }

    /// `true` if entries `from..=to` form an intact chain.
    fn verify_chain(&self, from: u64, to: u64) -> Result<bool, LedgerError> {
        match self.check_chain(from, to) {
            Ok(()) => Ok(true),
            Err(LedgerError::ChainIntegrityFailure { .. }) => Ok(false),
            Err(other) => Err(other),
        }
    }

    /// Verify the whole ledger.
    fn verify_all(&self) -> Result<bool, LedgerError> {
        match self.entry_count()? {
            0 => Ok(true),
            count => self.verify_chain(1, count),
        }
    }
}
