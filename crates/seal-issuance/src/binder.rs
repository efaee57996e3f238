use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use rand::Rng;
use seal_crypto::{ContentHasher, SigningKey};
use seal_ledger::{AuditAction, LedgerWriter};
use seal_types::{Actor, ContentDigest, Proof, RecordId, TrustStatus};
use tracing::{debug, error, warn};

use crate::authority::{local_issuer, AuthorityError, LocalTimestamp, TimestampAuthority};
use crate::config::{Environment, TimestampConfig};
use crate::error::{IssuanceError, IssuanceResult};

/// Binds rendered artifacts to trusted timestamps.
///
/// Each call to [`ContentBinder::bind`] produces exactly one audit entry:
/// `ProofBound` on success or `BindFailed` when no proof could be obtained.
pub struct ContentBinder {
    authority: Arc<dyn TimestampAuthority>,
    ledger: Arc<dyn LedgerWriter>,
    config: TimestampConfig,
    environment: Environment,
    fallback_key: SigningKey,
}

impl ContentBinder {
    pub fn new(
        authority: Arc<dyn TimestampAuthority>,
        ledger: Arc<dyn LedgerWriter>,
        config: TimestampConfig,
        environment: Environment,
    ) -> Self {
        Self {
            authority,
            ledger,
            config,
            environment,
            fallback_key: SigningKey::generate(),
        }
    }

    /// Use a fixed key for fallback proofs instead of a per-process one.
    pub fn with_fallback_key(mut self, key: SigningKey) -> Self {
        self.fallback_key = key;
        self
    }

    /// `SHA-256(artifact)`, the digest every proof is bound to.
    pub fn digest(artifact: &[u8]) -> ContentDigest {
        ContentHasher::ARTIFACT.hash(artifact)
    }

    /// Hash `artifact` and obtain a timestamp proof for the digest.
    pub async fn bind(
        &self,
        record_id: &RecordId,
        artifact: &[u8],
        actor: &Actor,
    ) -> IssuanceResult<Proof> {
        let digest = Self::digest(artifact);
        let max_attempts = self.config.max_attempts.max(1);
        let mut last_error = String::new();

        for attempt in 1..=max_attempts {
            let outcome = tokio::time::timeout(
                self.config.timeout(),
                self.authority.request_timestamp(&digest),
            )
            .await;

            match outcome {
                Ok(Ok(token)) => {
                    if token.message_imprint != digest {
                        error!(
                            target: "seal::alarm",
                            record = %record_id.short_id(),
                            expected = %digest,
                            found = %token.message_imprint,
                            "timestamp token is bound to a different digest"
                        );
                        self.record_failure(record_id, actor, digest, "token digest mismatch")?;
                        return Err(IssuanceError::DigestMismatch {
                            expected: digest.to_hex(),
                            found: token.message_imprint.to_hex(),
                        });
                    }
                    let proof = Proof {
                        digest_bound: digest,
                        issuer_reference: token.issuer_reference,
                        issued_at: token.issued_at,
                        raw_token_bytes: token.token_bytes,
                        trust_status: TrustStatus::Verified,
                    };
                    return self.record_bound(record_id, actor, proof);
                }
                Ok(Err(AuthorityError::Rejected(reason))) => {
                    warn!(record = %record_id.short_id(), %reason, "timestamp request rejected");
                    self.record_failure(record_id, actor, digest, &reason)?;
                    return Err(IssuanceError::TimestampRejected(reason));
                }
                Ok(Err(AuthorityError::Transient(reason))) => last_error = reason,
                Err(_) => {
                    last_error = format!("no answer within {:?}", self.config.timeout());
                }
            }

            if attempt < max_attempts {
                let delay = jittered(self.config.backoff(attempt));
                warn!(
                    record = %record_id.short_id(),
                    attempt,
                    max_attempts,
                    error = %last_error,
                    delay_ms = delay.as_millis() as u64,
                    "timestamp attempt failed, retrying"
                );
                tokio::time::sleep(delay).await;
            }
        }

        if self.config.allows_fallback(self.environment) {
            warn!(
                record = %record_id.short_id(),
                digest = %digest.short_hex(),
                "timestamp authority unreachable, issuing unverified local proof"
            );
            let proof = self.fallback_proof(digest);
            return self.record_bound(record_id, actor, proof);
        }

        self.record_failure(record_id, actor, digest, &last_error)?;
        Err(IssuanceError::TimestampUnavailable {
            attempts: max_attempts,
            reason: last_error,
        })
    }

    fn fallback_proof(&self, digest: ContentDigest) -> Proof {
        let issued_at = Utc::now();
        let stamp = LocalTimestamp::sign(&self.fallback_key, digest, issued_at);
        Proof {
            digest_bound: digest,
            issuer_reference: local_issuer(&self.fallback_key.verifying_key()),
            issued_at,
            raw_token_bytes: stamp.to_bytes(),
            trust_status: TrustStatus::UnreachableFallback,
        }
    }

    fn record_bound(&self, record_id: &RecordId, actor: &Actor, proof: Proof) -> IssuanceResult<Proof> {
        self.ledger.append(
            record_id,
            actor,
            AuditAction::ProofBound {
                digest: proof.digest_bound,
                trust_status: proof.trust_status,
            },
        )?;
        debug!(
            record = %record_id.short_id(),
            digest = %proof.digest_bound.short_hex(),
            trust = %proof.trust_status,
            issuer = %proof.issuer_reference,
            "proof bound"
        );
        Ok(proof)
    }

    fn record_failure(
        &self,
        record_id: &RecordId,
        actor: &Actor,
        digest: ContentDigest,
        reason: &str,
    ) -> IssuanceResult<()> {
        self.ledger.append(
            record_id,
            actor,
            AuditAction::BindFailed {
                digest,
                reason: reason.to_string(),
            },
        )?;
        Ok(())
    }

    /// Re-check a stored proof against the digest of its artifact.
    ///
    /// A proof bound to another digest is an integrity alarm. Otherwise the
    /// token itself is checked: the authority's tokens through
    /// [`TimestampAuthority::verify_token`], fallback proofs through their
    /// local signature. A token that fails the check is reported `Invalid`.
    pub fn verify_proof(&self, proof: &Proof, digest: &ContentDigest) -> IssuanceResult<TrustStatus> {
        if !proof.binds(digest) {
            error!(
                target: "seal::alarm",
                expected = %digest,
                bound = %proof.digest_bound,
                "proof is bound to a different digest"
            );
            return Err(IssuanceError::DigestMismatch {
                expected: digest.to_hex(),
                found: proof.digest_bound.to_hex(),
            });
        }

        let status = match proof.trust_status {
            TrustStatus::Verified => {
                if self.authority.verify_token(&proof.raw_token_bytes, digest) {
                    TrustStatus::Verified
                } else {
                    TrustStatus::Invalid
                }
            }
            TrustStatus::UnreachableFallback => {
                let valid = LocalTimestamp::from_bytes(&proof.raw_token_bytes).is_some_and(|stamp| {
                    stamp
                        .verifying_key()
                        .is_some_and(|key| local_issuer(&key) == proof.issuer_reference)
                        && stamp.verify(digest)
                });
                if valid {
                    TrustStatus::UnreachableFallback
                } else {
                    TrustStatus::Invalid
                }
            }
            TrustStatus::Invalid => TrustStatus::Invalid,
        };

        if status == TrustStatus::Invalid {
            warn!(
                digest = %digest.short_hex(),
                issuer = %proof.issuer_reference,
                "proof token failed verification"
            );
        }
        Ok(status)
    }
}

/// Add up to 25 % random jitter so concurrent retries spread out.
fn jittered(base: Duration) -> Duration {
    let spread = (base.as_millis() as u64) / 4;
    if spread == 0 {
        return base;
    }
    base + Duration::from_millis(rand::thread_rng().gen_range(0..=spread))
}
