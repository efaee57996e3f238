use std::fmt;

use chrono::{DateTime, SecondsFormat, Utc};
use seal_crypto::{push_field, ChainLink, HashChainVerifier};
use seal_types::{Actor, ContentDigest, RecordId, SeriesKey, TrustStatus};
use serde::{Deserialize, Serialize};

/// What happened to a record.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "action", rename_all = "snake_case")]
pub enum AuditAction {
    /// A draft was stored for the first time.
    DraftSaved,
    /// The content of a stored draft was replaced.
    DraftAmended,
    /// A sequence number was durably allocated to the record.
    NumberAllocated { series_key: SeriesKey, number: u64 },
    /// An allocated number was abandoned before issuance completed.
    NumberSkipped {
        series_key: SeriesKey,
        number: u64,
        reason: String,
    },
    /// A timestamp proof was bound to the rendered artifact.
    ProofBound {
        digest: ContentDigest,
        trust_status: TrustStatus,
    },
    /// No proof could be obtained for the artifact.
    BindFailed { digest: ContentDigest, reason: String },
    /// The record was committed as issued.
    Issued {
        series_key: SeriesKey,
        number: u64,
        digest: ContentDigest,
    },
    /// A compensating record referencing this record was issued.
    Cancelled { cancelled_by: RecordId, reason: String },
    /// A change to an issued record was refused.
    ModificationRejected { status: String },
    /// The record was read.
    Accessed,
    /// An export bundle was produced.
    Exported { trust_status: TrustStatus },
    /// The archived artifact was re-verified against digest and proof.
    Verified { trust_status: TrustStatus },
}

impl AuditAction {
    /// Stable action name.
    pub fn name(&self) -> &'static str {
        match self {
            Self::DraftSaved => "draft_saved",
            Self::DraftAmended => "draft_amended",
            Self::NumberAllocated { .. } => "number_allocated",
            Self::NumberSkipped { .. } => "number_skipped",
            Self::ProofBound { .. } => "proof_bound",
            Self::BindFailed { .. } => "bind_failed",
            Self::Issued { .. } => "issued",
            Self::Cancelled { .. } => "cancelled",
            Self::ModificationRejected { .. } => "modification_rejected",
            Self::Accessed => "accessed",
            Self::Exported { .. } => "exported",
            Self::Verified { .. } => "verified",
        }
    }

    /// Every field of the action in a fixed order, name first.
    fn canonical_fields(&self) -> Vec<String> {
        let mut fields = vec![self.name().to_string()];
        match self {
            Self::DraftSaved | Self::DraftAmended | Self::Accessed => {}
            Self::NumberAllocated { series_key, number } => {
                fields.extend([series_key.to_string(), number.to_string()]);
            }
            Self::NumberSkipped {
                series_key,
                number,
                reason,
            } => {
                fields.extend([series_key.to_string(), number.to_string(), reason.clone()]);
            }
            Self::ProofBound {
                digest,
                trust_status,
            } => {
                fields.extend([digest.to_hex(), trust_status.to_string()]);
            }
            Self::BindFailed { digest, reason } => {
                fields.extend([digest.to_hex(), reason.clone()]);
            }
            Self::Issued {
                series_key,
                number,
                digest,
            } => {
                fields.extend([series_key.to_string(), number.to_string(), digest.to_hex()]);
            }
            Self::Cancelled {
                cancelled_by,
                reason,
            } => {
                fields.extend([cancelled_by.to_string(), reason.clone()]);
            }
            Self::ModificationRejected { status } => fields.push(status.clone()),
            Self::Exported { trust_status } | Self::Verified { trust_status } => {
                fields.push(trust_status.to_string());
            }
        }
        fields
    }
}

impl fmt::Display for AuditAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.canonical_fields().join(" "))
    }
}

/// One immutable line of the audit trail.
///
/// `entry_hash = SHA-256(entry_id ‖ record_id ‖ action ‖ actor ‖ at ‖ prev_entry_hash)`
/// with every field length-prefixed.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct AuditEntry {
    pub entry_id: u64,
    pub record_id: RecordId,
    pub actor: Actor,
    pub action: AuditAction,
    pub at: DateTime<Utc>,
    pub prev_entry_hash: [u8; 32],
    pub entry_hash: [u8; 32],
}

impl AuditEntry {
    /// Build an entry and compute its hash.
    pub fn seal(
        entry_id: u64,
        record_id: RecordId,
        actor: Actor,
        action: AuditAction,
        at: DateTime<Utc>,
        prev_entry_hash: [u8; 32],
    ) -> Self {
        let mut entry = Self {
            entry_id,
            record_id,
            actor,
            action,
            at,
            prev_entry_hash,
            entry_hash: [0; 32],
        };
        entry.entry_hash = entry.compute_hash();
        entry
    }

    /// Recompute the hash from the stored fields.
    pub fn compute_hash(&self) -> [u8; 32] {
        HashChainVerifier::compute_hash(&self.payload_bytes(), &self.prev_entry_hash)
    }

    /// Returns `true` if the stored hash matches the stored fields.
    pub fn is_intact(&self) -> bool {
        self.compute_hash() == self.entry_hash
    }

    pub fn short_hash(&self) -> String {
        hex::encode(&self.entry_hash[..4])
    }
}

impl ChainLink for AuditEntry {
    fn entry_id(&self) -> u64 {
        self.entry_id
    }

    fn entry_hash(&self) -> [u8; 32] {
        self.entry_hash
    }

    fn prev_entry_hash(&self) -> [u8; 32] {
        self.prev_entry_hash
    }

    fn payload_bytes(&self) -> Vec<u8> {
        let mut payload = Vec::with_capacity(256);
        push_field(&mut payload, &self.entry_id.to_be_bytes());
        push_field(&mut payload, self.record_id.to_string().as_bytes());
        for field in self.action.canonical_fields() {
            push_field(&mut payload, field.as_bytes());
        }
        push_field(&mut payload, self.actor.as_str().as_bytes());
        push_field(
            &mut payload,
            self.at
                .to_rfc3339_opts(SecondsFormat::Nanos, true)
                .as_bytes(),
        );
        payload
    }
}

impl fmt::Display for AuditEntry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "#{} [{}] {} {} by {}",
            self.entry_id,
            self.short_hash(),
            self.record_id.short_id(),
            self.action,
            self.actor
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use seal_crypto::GENESIS_HASH;

    fn entry(action: AuditAction) -> AuditEntry {
        AuditEntry::seal(
            1,
            RecordId::new(),
            Actor::new("alice"),
            action,
            Utc::now(),
            GENESIS_HASH,
        )
    }

    #[test]
    fn sealed_entry_is_intact() {
        assert!(entry(AuditAction::Accessed).is_intact());
    }

    #[test]
    fn changing_action_breaks_hash() {
        let mut e = entry(AuditAction::DraftSaved);
        e.action = AuditAction::DraftAmended;
        assert!(!e.is_intact());
    }

    #[test]
    fn changing_actor_or_time_breaks_hash() {
        let mut e = entry(AuditAction::Accessed);
        e.actor = Actor::new("mallory");
        assert!(!e.is_intact());

        let mut e = entry(AuditAction::Accessed);
        e.at += chrono::Duration::nanoseconds(1);
        assert!(!e.is_intact());
    }

    #[test]
    fn action_fields_are_hashed() {
        let series = SeriesKey::new("RE2025").unwrap();
        let mut e = entry(AuditAction::NumberAllocated {
            series_key: series.clone(),
            number: 4,
        });
        e.action = AuditAction::NumberAllocated {
            series_key: series,
            number: 5,
        };
        assert!(!e.is_intact());
    }

    #[test]
    fn display_names_action() {
        let e = entry(AuditAction::NumberSkipped {
            series_key: SeriesKey::new("RE2025").unwrap(),
            number: 9,
            reason: "render failed".into(),
        });
        let text = e.to_string();
        assert!(text.starts_with("#1 ["));
        assert!(text.contains("number_skipped RE2025 9"));
    }

    #[test]
    fn serde_uses_action_tag() {
        let json = serde_json::to_value(AuditAction::Exported {
            trust_status: TrustStatus::Verified,
        })
        .unwrap();
        assert_eq!(json["action"], "exported");
        assert_eq!(json["trust_status"], "verified");
    }
}
