use seal_types::{RecordId, RecordStatus, SeriesKey};

/// Errors from storage operations.
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    /// The requested key or record was not found.
    #[error("not found: {0}")]
    NotFound(String),

    /// A write-once key was written a second time.
    #[error("archive key already written: {0}")]
    AlreadyExists(String),

    /// Content hash mismatch on read (data corruption or tampering).
    #[error("hash mismatch for {key}: expected {expected}, computed {computed}")]
    HashMismatch {
        key: String,
        expected: String,
        computed: String,
    },

    /// Attempt to replace a record that has left Draft.
    #[error("record {record_id} is {status} and cannot be replaced")]
    ImmutabilityViolation {
        record_id: RecordId,
        status: RecordStatus,
    },

    /// A second compensating record for the same original.
    #[error("record {original} is already cancelled by {by}")]
    AlreadyCancelled { original: RecordId, by: RecordId },

    /// The sequence number is already bound to another record.
    #[error("sequence number {number} of series {series} is already issued")]
    DuplicateNumber { series: SeriesKey, number: u64 },

    /// A counter update that would not move the counter forward.
    #[error("counter for {series} must increase: current {current:?}, proposed {proposed}")]
    NonMonotonic {
        series: SeriesKey,
        current: Option<u64>,
        proposed: u64,
    },

    /// The record is not in the state the operation requires.
    #[error("invalid record {record_id}: {reason}")]
    InvalidRecord { record_id: RecordId, reason: String },

    /// The key cannot be used by this backend.
    #[error("invalid archive key: {0}")]
    InvalidKey(String),

    /// Serialization or deserialization failure.
    #[error("serialization error: {0}")]
    Serialization(String),

    /// I/O error from the underlying storage backend.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// A lock guarding in-memory state was poisoned.
    #[error("{0} lock poisoned")]
    LockPoisoned(&'static str),

    /// The backend could not durably persist the write.
    #[error("storage unavailable: {0}")]
    Unavailable(String),
}

/// Result alias for store operations.
pub type StoreResult<T> = Result<T, StoreError>;
