use std::path::PathBuf;
use std::time::Duration;

use seal_ledger::LedgerError;
use seal_store::StoreError;
use seal_types::{RecordId, RecordStatus, SeriesKey, TypeError};

use crate::collaborators::FieldError;

/// Errors surfaced by the issuance pipeline.
#[derive(Debug, thiserror::Error)]
pub enum IssuanceError {
    /// The counter increment could not be durably committed; no number was
    /// granted.
    #[error("allocation for series {series} not persisted: {reason}")]
    AllocationPersistenceFailure { series: SeriesKey, reason: String },

    /// Every attempt to reach the timestamp authority failed.
    #[error("timestamp authority unavailable after {attempts} attempt(s): {reason}")]
    TimestampUnavailable { attempts: u32, reason: String },

    /// The authority answered but refused to issue a token.
    #[error("timestamp request rejected: {0}")]
    TimestampRejected(String),

    /// A proof is bound to a different digest than the artifact it covers.
    #[error("digest mismatch: expected {expected}, found {found}")]
    DigestMismatch { expected: String, found: String },

    /// Attempt to alter a record that has left Draft.
    #[error("record {record_id} is {status} and cannot be modified")]
    ImmutabilityViolation {
        record_id: RecordId,
        status: RecordStatus,
    },

    /// The audit chain does not verify.
    #[error("audit chain integrity failure at entry {entry_id}: {reason}")]
    ChainIntegrityFailure { entry_id: u64, reason: String },

    #[error("validation failed: {}", join_fields(.0))]
    ValidationFailed(Vec<FieldError>),

    /// The operation is not allowed in the record's current status.
    #[error("cannot {operation} record {record_id} in status {status}")]
    InvalidTransition {
        record_id: RecordId,
        status: RecordStatus,
        operation: &'static str,
    },

    #[error("record {original} is already cancelled by {by}")]
    AlreadyCancelled { original: RecordId, by: RecordId },

    #[error("record not found: {0}")]
    RecordNotFound(RecordId),

    #[error("rendering failed: {0}")]
    RenderFailed(String),

    #[error("rendering timed out after {0:?}")]
    RenderTimeout(Duration),

    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error("type error: {0}")]
    Type(TypeError),

    #[error("store error: {0}")]
    Store(StoreError),

    #[error("ledger error: {0}")]
    Ledger(LedgerError),
}

impl IssuanceError {
    /// Integrity alarms require manual investigation and are never retried
    /// or repaired automatically.
    pub fn is_integrity_alarm(&self) -> bool {
        matches!(
            self,
            Self::DigestMismatch { .. } | Self::ChainIntegrityFailure { .. }
        )
    }
}

fn join_fields(errors: &[FieldError]) -> String {
    errors
        .iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join("; ")
}

impl From<StoreError> for IssuanceError {
    fn from(error: StoreError) -> Self {
        match error {
            StoreError::ImmutabilityViolation { record_id, status } => {
                Self::ImmutabilityViolation { record_id, status }
            }
            StoreError::AlreadyCancelled { original, by } => Self::AlreadyCancelled { original, by },
            StoreError::HashMismatch {
                expected, computed, ..
            } => Self::DigestMismatch {
                expected,
                found: computed,
            },
            other => Self::Store(other),
        }
    }
}

impl From<LedgerError> for IssuanceError {
    fn from(error: LedgerError) -> Self {
        match error {
            LedgerError::ChainIntegrityFailure { entry_id, reason } => {
                Self::ChainIntegrityFailure { entry_id, reason }
            }
            other => Self::Ledger(other),
        }
    }
}

impl From<TypeError> for IssuanceError {
    fn from(error: TypeError) -> Self {
        match error {
            TypeError::ImmutabilityViolation { record_id, status } => {
                Self::ImmutabilityViolation { record_id, status }
            }
            TypeError::DigestMismatch { expected, bound } => Self::DigestMismatch {
                expected,
                found: bound,
            },
            other => Self::Type(other),
        }
    }
}

/// Errors loading or validating [`crate::IssuanceConfig`].
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("cannot read config {path}: {source}")]
    Read {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("invalid config syntax: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("cannot serialize config: {0}")]
    Serialize(#[from] toml::ser::Error),

    #[error("invalid configuration: {0}")]
    Invalid(String),
}

/// Result alias for issuance operations.
pub type IssuanceResult<T> = Result<T, IssuanceError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn alarms_are_classified() {
        assert!(IssuanceError::DigestMismatch {
            expected: "aa".into(),
            found: "bb".into()
        }
        .is_integrity_alarm());
        assert!(IssuanceError::ChainIntegrityFailure {
            entry_id: 3,
            reason: "hash mismatch".into()
        }
        .is_integrity_alarm());
        assert!(!IssuanceError::TimestampRejected("policy".into()).is_integrity_alarm());
    }

    #[test]
    fn store_immutability_maps_to_issuance_kind() {
        let record_id = RecordId::new();
        let err: IssuanceError = StoreError::ImmutabilityViolation {
            record_id: record_id.clone(),
            status: RecordStatus::Issued,
        }
        .into();
        assert!(matches!(
            err,
            IssuanceError::ImmutabilityViolation { record_id: id, status: RecordStatus::Issued } if id == record_id
        ));
    }

    #[test]
    fn ledger_break_maps_to_alarm() {
        let err: IssuanceError = LedgerError::ChainIntegrityFailure {
            entry_id: 7,
            reason: "broken link".into(),
        }
        .into();
        assert!(err.is_integrity_alarm());
    }

    #[test]
    fn validation_message_lists_fields() {
        let err = IssuanceError::ValidationFailed(vec![
            FieldError::new("seller.name", "must not be empty"),
            FieldError::new("currency", "must be a three-letter code"),
        ]);
        assert_eq!(
            err.to_string(),
            "validation failed: seller.name: must not be empty; currency: must be a three-letter code"
        );
    }
}
