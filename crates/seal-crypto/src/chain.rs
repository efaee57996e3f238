use sha2::{Digest, Sha256};

/// `prev_entry_hash` of the first entry in a chain.
pub const GENESIS_HASH: [u8; 32] = [0; 32];

/// An element of an append-only hash chain.
pub trait ChainLink {
    /// Strictly increasing position in the chain (1-based).
    fn entry_id(&self) -> u64;
    /// The stored hash of this entry.
    fn entry_hash(&self) -> [u8; 32];
    /// The stored hash of the previous entry ([`GENESIS_HASH`] for the first).
    fn prev_entry_hash(&self) -> [u8; 32];
    /// Canonical bytes of every hashed field except the previous hash.
    fn payload_bytes(&self) -> Vec<u8>;
}

/// Hash chain integrity verifier.
///
/// A chain is valid when entry ids are contiguous, each entry links to the
/// hash of its predecessor, and each stored hash equals
/// `SHA-256(payload ‖ prev_entry_hash)`.
pub struct HashChainVerifier;

impl HashChainVerifier {
    /// Verify `entries`, the first of which must link to `anchor`.
    ///
    /// `anchor` is [`GENESIS_HASH`] when verifying from the first entry, or
    /// the stored hash of the entry preceding the range otherwise.
    pub fn verify_chain(entries: &[impl ChainLink], anchor: [u8; 32]) -> Result<(), ChainError> {
        let mut expected_prev = anchor;
        let mut expected_id = match entries.first() {
            Some(first) => first.entry_id(),
            None => return Ok(()),
        };

        for entry in entries {
            if entry.entry_id() != expected_id {
                return Err(ChainError::NonContiguous {
                    expected: expected_id,
                    found: entry.entry_id(),
                });
            }
            if entry.prev_entry_hash() != expected_prev {
                return Err(ChainError::BrokenLink {
                    entry_id: entry.entry_id(),
                });
            }
            let computed = Self::compute_hash(&entry.payload_bytes(), &entry.prev_entry_hash());
            if computed != entry.entry_hash() {
                return Err(ChainError::HashMismatch {
                    entry_id: entry.entry_id(),
                });
            }
            expected_prev = entry.entry_hash();
            expected_id += 1;
        }

        Ok(())
    }

    /// Compute the hash for an entry payload and the previous entry hash.
    pub fn compute_hash(payload: &[u8], prev_entry_hash: &[u8; 32]) -> [u8; 32] {
        let mut hasher = Sha256::new();
        hasher.update(payload);
        hasher.update(prev_entry_hash);
        hasher.finalize().into()
    }
}

/// Append a length-prefixed field to a canonical payload.
///
/// Length prefixes keep `("ab", "c")` and `("a", "bc")` distinct.
pub fn push_field(payload: &mut Vec<u8>, field: &[u8]) {
    payload.extend_from_slice(&(field.len() as u64).to_be_bytes());
    payload.extend_from_slice(field);
}

/// Errors from chain verification.
#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum ChainError {
    #[error("entry ids not contiguous: expected {expected}, found {found}")]
    NonContiguous { expected: u64, found: u64 },

    #[error("broken link at entry {entry_id}: prev_entry_hash does not match")]
    BrokenLink { entry_id: u64 },

    #[error("hash mismatch at entry {entry_id}: computed hash differs from stored")]
    HashMismatch { entry_id: u64 },
}

impl ChainError {
    /// The entry at which verification failed.
    pub fn entry_id(&self) -> u64 {
        match self {
            Self::NonContiguous { found, .. } => *found,
            Self::BrokenLink { entry_id } | Self::HashMismatch { entry_id } => *entry_id,
        }
    }
}
