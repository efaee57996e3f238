/// Errors produced by ledger operations.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum LedgerError {
    #[error("chain integrity failure at entry {entry_id}: {reason}")]
    ChainIntegrityFailure { entry_id: u64, reason: String },

    #[error("invalid entry range: from={from}, to={to}")]
    InvalidRange { from: u64, to: u64 },

    #[error("{0} lock poisoned")]
    LockPoisoned(&'static str),

    #[error("ledger unavailable: {0}")]
    Unavailable(String),

    #[error("store error: {0}")]
    Store(String),
}

impl From<seal_store::StoreError> for LedgerError {
    fn from(error: seal_store::StoreError) -> Self {
        Self::Store(error.to_string())
    }
}
