use thiserror::Error;

use crate::identity::RecordId;
use crate::record::RecordStatus;

/// Errors produced by type operations.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum TypeError {
    #[error("invalid hex string: {0}")]
    InvalidHex(String),

    #[error("invalid byte length: expected {expected}, got {actual}")]
    InvalidLength { expected: usize, actual: usize },

    #[error("invalid series key {0:?}: must be 1-32 ASCII alphanumerics, '-' or '_'")]
    InvalidSeriesKey(String),

    #[error("record {record_id} is {status} and can no longer be modified")]
    ImmutabilityViolation {
        record_id: RecordId,
        status: RecordStatus,
    },

    #[error("proof is bound to digest {bound}, record content digest is {expected}")]
    DigestMismatch { expected: String, bound: String },

    /// `line` is the offending line item, `None` when only the document
    /// sum overflows.
    #[error("amount out of range in {}", overflow_location(.line))]
    AmountOverflow { line: Option<usize> },

    #[error("serialization error: {0}")]
    Serialization(String),
}

fn overflow_location(line: &Option<usize>) -> String {
    match line {
        Some(i) => format!("line item {i}"),
        None => "document totals".to_string(),
    }
}
