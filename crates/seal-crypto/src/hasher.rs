use seal_types::ContentDigest;
use sha2::{Digest, Sha256};

/// SHA-256 content hasher.
///
/// Artifact digests are plain `SHA-256(bytes)` so any third party can
/// recompute them with standard tooling. Internal structures (proof payloads,
/// manifests) use a domain tag to keep their hashes apart from artifacts.
pub struct ContentHasher {
    domain: Option<&'static str>,
}

impl ContentHasher {
    /// Hasher for rendered artifacts: no domain tag.
    pub const ARTIFACT: Self = Self { domain: None };
    /// Hasher for locally signed fallback proof payloads.
    pub const FALLBACK_PROOF: Self = Self {
        domain: Some("seal-fallback-proof-v1"),
    };
    /// Hasher for export manifests.
    pub const MANIFEST: Self = Self {
        domain: Some("seal-manifest-v1"),
    };

    /// Create a hasher with a custom domain tag.
    pub const fn new(domain: &'static str) -> Self {
        Self {
            domain: Some(domain),
        }
    }

    /// Hash raw bytes.
    pub fn hash(&self, data: &[u8]) -> ContentDigest {
        let mut hasher = Sha256::new();
        if let Some(domain) = self.domain {
            hasher.update(domain.as_bytes());
            hasher.update(b":");
        }
        hasher.update(data);
        ContentDigest::from_hash(hasher.finalize().into())
    }

    /// Hash a serializable value as JSON.
    pub fn hash_json<T: serde::Serialize>(&self, value: &T) -> Result<ContentDigest, HasherError> {
        let data =
            serde_json::to_vec(value).map_err(|e| HasherError::Serialization(e.to_string()))?;
        Ok(self.hash(&data))
    }

    /// Verify that data produces the expected digest.
    pub fn verify(&self, data: &[u8], expected: &ContentDigest) -> bool {
        self.hash(data) == *expected
    }

    /// The domain tag used by this hasher, if any.
    pub fn domain(&self) -> Option<&str> {
        self.domain
    }
}

/// Errors from hashing operations.
#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum HasherError {
    #[error("serialization error: {0}")]
    Serialization(String),
}
