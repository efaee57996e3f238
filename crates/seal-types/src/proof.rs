use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::digest::ContentDigest;

/// How far a proof can be trusted.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TrustStatus {
    /// Issued by the external timestamp authority.
    Verified,
    /// Generated locally because the authority could not be reached.
    /// Only permitted outside production and flagged in every export.
    UnreachableFallback,
    /// The token failed verification.
    Invalid,
}

impl TrustStatus {
    pub fn is_verified(&self) -> bool {
        matches!(self, Self::Verified)
    }
}

impl fmt::Display for TrustStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Verified => write!(f, "verified"),
            Self::UnreachableFallback => write!(f, "unreachable-fallback"),
            Self::Invalid => write!(f, "invalid"),
        }
    }
}

/// A trusted-timestamp token bound to a content digest.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Proof {
    /// Must equal the `content_digest` of the record carrying this proof.
    pub digest_bound: ContentDigest,
    /// Which authority (or local key) produced the token.
    pub issuer_reference: String,
    /// The time the issuer attests the digest existed.
    pub issued_at: DateTime<Utc>,
    pub raw_token_bytes: Vec<u8>,
    pub trust_status: TrustStatus,
}

impl Proof {
    /// Returns `true` if this proof is bound to `digest`.
    pub fn binds(&self, digest: &ContentDigest) -> bool {
        self.digest_bound == *digest
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn trust_status_serializes_snake_case() {
        let json = serde_json::to_string(&TrustStatus::UnreachableFallback).unwrap();
        assert_eq!(json, "\"unreachable_fallback\"");
    }

    #[test]
    fn binds_compares_digest() {
        let digest = ContentDigest::of(b"artifact");
        let proof = Proof {
            digest_bound: digest,
            issuer_reference: "tsa".into(),
            issued_at: Utc::now(),
            raw_token_bytes: vec![1, 2, 3],
            trust_status: TrustStatus::Verified,
        };
        assert!(proof.binds(&digest));
        assert!(!proof.binds(&ContentDigest::of(b"other")));
    }
}
