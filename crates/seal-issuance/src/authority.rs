use async_trait::async_trait;
use chrono::{DateTime, SecondsFormat, Utc};
use seal_crypto::{ContentHasher, Signature, SigningKey, VerifyingKey};
use seal_types::ContentDigest;
use serde::{Deserialize, Serialize};

/// Token returned by a timestamp authority.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct TimestampToken {
    pub token_bytes: Vec<u8>,
    pub issued_at: DateTime<Utc>,
    pub issuer_reference: String,
    /// The digest the authority says it stamped.
    pub message_imprint: ContentDigest,
}

/// Failure of a single timestamp request.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum AuthorityError {
    /// Network or service failure; worth retrying.
    #[error("authority unavailable: {0}")]
    Transient(String),
    /// The authority refused the request; retrying will not help.
    #[error("request rejected: {0}")]
    Rejected(String),
}

/// External trusted-timestamp service.
#[async_trait]
pub trait TimestampAuthority: Send + Sync {
    async fn request_timestamp(
        &self,
        digest: &ContentDigest,
    ) -> Result<TimestampToken, AuthorityError>;

    /// Check a token this authority issued earlier against `digest`.
    fn verify_token(&self, token_bytes: &[u8], digest: &ContentDigest) -> bool;
}

// ---------------------------------------------------------------------------
// Locally signed tokens
// ---------------------------------------------------------------------------

/// Ed25519-signed timestamp used by [`LocalAuthority`] and by fallback
/// proofs.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct LocalTimestamp {
    pub digest: ContentDigest,
    pub issued_at: DateTime<Utc>,
    /// Hex-encoded Ed25519 public key.
    pub public_key: String,
    /// Hex-encoded Ed25519 signature over the stamped message.
    pub signature: String,
}

impl LocalTimestamp {
    pub fn sign(key: &SigningKey, digest: ContentDigest, issued_at: DateTime<Utc>) -> Self {
        let message = stamped_message(&digest, issued_at);
        Self {
            digest,
            issued_at,
            public_key: hex::encode(key.verifying_key().as_bytes()),
            signature: hex::encode(key.sign(message.as_bytes()).to_bytes()),
        }
    }

    /// Returns `true` if the signature is valid and covers `digest`.
    pub fn verify(&self, digest: &ContentDigest) -> bool {
        if self.digest != *digest {
            return false;
        }
        let Some(key) = self.verifying_key() else {
            return false;
        };
        let Some(signature) = hex::decode(&self.signature)
            .ok()
            .and_then(|bytes| Signature::from_slice(&bytes).ok())
        else {
            return false;
        };
        let message = stamped_message(&self.digest, self.issued_at);
        key.verify(message.as_bytes(), &signature).is_ok()
    }

    pub fn verifying_key(&self) -> Option<VerifyingKey> {
        let bytes: [u8; 32] = hex::decode(&self.public_key).ok()?.try_into().ok()?;
        VerifyingKey::from_bytes(bytes).ok()
    }

    pub fn to_bytes(&self) -> Vec<u8> {
        // A struct of strings and a digest always serializes.
        serde_json::to_vec(self).unwrap_or_default()
    }

    pub fn from_bytes(bytes: &[u8]) -> Option<Self> {
        serde_json::from_slice(bytes).ok()
    }
}

fn stamped_message(digest: &ContentDigest, issued_at: DateTime<Utc>) -> ContentDigest {
    let mut payload = digest.as_bytes().to_vec();
    payload.extend_from_slice(
        issued_at
            .to_rfc3339_opts(SecondsFormat::Nanos, true)
            .as_bytes(),
    );
    ContentHasher::FALLBACK_PROOF.hash(&payload)
}

/// Issuer reference for tokens signed with `key`.
pub fn local_issuer(key: &VerifyingKey) -> String {
    format!("local:{}", key.fingerprint())
}

/// In-process authority signing digests with its own Ed25519 key.
///
/// Stands in for a real TSA in demos and tests; its tokens are treated as
/// verified.
pub struct LocalAuthority {
    key: SigningKey,
}

impl LocalAuthority {
    pub fn new(key: SigningKey) -> Self {
        Self { key }
    }

    pub fn generate() -> Self {
        Self::new(SigningKey::generate())
    }

    pub fn issuer_reference(&self) -> String {
        local_issuer(&self.key.verifying_key())
    }
}

#[async_trait]
impl TimestampAuthority for LocalAuthority {
    async fn request_timestamp(
        &self,
        digest: &ContentDigest,
    ) -> Result<TimestampToken, AuthorityError> {
        let issued_at = Utc::now();
        let stamp = LocalTimestamp::sign(&self.key, *digest, issued_at);
        Ok(TimestampToken {
            token_bytes: stamp.to_bytes(),
            issued_at,
            issuer_reference: self.issuer_reference(),
            message_imprint: *digest,
        })
    }

    fn verify_token(&self, token_bytes: &[u8], digest: &ContentDigest) -> bool {
        LocalTimestamp::from_bytes(token_bytes).is_some_and(|stamp| {
            stamp.public_key == hex::encode(self.key.verifying_key().as_bytes())
                && stamp.verify(digest)
        })
    }
}

/// An authority that never answers.
#[derive(Debug, Clone, Copy, Default)]
pub struct UnreachableAuthority;

#[async_trait]
impl TimestampAuthority for UnreachableAuthority {
    async fn request_timestamp(
        &self,
        _digest: &ContentDigest,
    ) -> Result<TimestampToken, AuthorityError> {
        Err(AuthorityError::Transient("authority unreachable".into()))
    }

    fn verify_token(&self, _token_bytes: &[u8], _digest: &ContentDigest) -> bool {
        false
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn local_authority_tokens_verify() {
        let authority = LocalAuthority::generate();
        let digest = ContentDigest::of(b"artifact");
        let token = authority.request_timestamp(&digest).await.unwrap();
        assert_eq!(token.message_imprint, digest);
        assert!(token.issuer_reference.starts_with("local:"));
        assert!(authority.verify_token(&token.token_bytes, &digest));
        assert!(!authority.verify_token(&token.token_bytes, &ContentDigest::of(b"other")));
    }

    #[tokio::test]
    async fn foreign_key_is_not_accepted() {
        let a = LocalAuthority::generate();
        let b = LocalAuthority::generate();
        let digest = ContentDigest::of(b"artifact");
        let token = a.request_timestamp(&digest).await.unwrap();
        assert!(!b.verify_token(&token.token_bytes, &digest));
    }

    #[test]
    fn tampered_stamp_fails() {
        let key = SigningKey::generate();
        let digest = ContentDigest::of(b"artifact");
        let mut stamp = LocalTimestamp::sign(&key, digest, Utc::now());
        assert!(stamp.verify(&digest));
        stamp.issued_at += chrono::Duration::seconds(1);
        assert!(!stamp.verify(&digest));
        assert!(LocalTimestamp::from_bytes(b"not json").is_none());
    }

    #[tokio::test]
    async fn unreachable_is_transient() {
        let err = UnreachableAuthority
            .request_timestamp(&ContentDigest::of(b"x"))
            .await
            .unwrap_err();
        assert!(matches!(err, AuthorityError::Transient(_)));
    }
}
