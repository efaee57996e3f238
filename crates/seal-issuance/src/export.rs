use chrono::{DateTime, Utc};
use seal_crypto::ContentHasher;
use seal_types::{
    Actor, ContentDigest, Proof, Record, RecordId, RecordKind, RecordStatus, SeriesKey, Totals,
    TrustStatus,
};
use serde::{Deserialize, Serialize};

/// Proof details repeated in the manifest.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProofSummary {
    pub issuer_reference: String,
    pub issued_at: DateTime<Utc>,
    pub trust_status: TrustStatus,
    pub token_sha256: String,
}

/// Metadata describing an exported record.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExportManifest {
    pub record_id: RecordId,
    pub series_key: SeriesKey,
    pub sequence_number: u64,
    pub document_number: String,
    pub version: u32,
    pub kind: RecordKind,
    pub status: RecordStatus,
    /// Compensating record issued for this one, if any.
    pub cancelled_by: Option<RecordId>,
    pub content_type: String,
    pub content_sha256: String,
    pub artifact_size: u64,
    pub totals: Totals,
    pub currency: String,
    pub proof: ProofSummary,
    pub issued_at: Option<DateTime<Utc>>,
    pub exported_at: DateTime<Utc>,
    pub exported_by: Actor,
    /// Present whenever the proof is not an authority-verified timestamp.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub trust_warning: Option<String>,
}

/// Download package of an issued record: artifact, proof and manifest.
#[derive(Clone, Debug)]
pub struct ExportBundle {
    pub manifest: ExportManifest,
    pub artifact: Vec<u8>,
    pub proof: Proof,
}

/// Warning text for a proof of the given trust status.
pub fn trust_warning(status: TrustStatus) -> Option<String> {
    match status {
        TrustStatus::Verified => None,
        TrustStatus::UnreachableFallback => Some(
            "UNVERIFIED: the timestamp authority was unreachable; this proof was signed \
             locally and carries no third-party attestation"
                .into(),
        ),
        TrustStatus::Invalid => {
            Some("INVALID: the timestamp proof failed verification".into())
        }
    }
}

impl ExportBundle {
    /// Assemble a bundle for an issued record.
    ///
    /// `trust_status` is the status established by re-verifying the proof,
    /// which may be weaker than the one stored in the record.
    #[allow(clippy::too_many_arguments)]
    pub(crate) fn assemble(
        record: &Record,
        number_width: usize,
        totals: Totals,
        status: RecordStatus,
        cancelled_by: Option<RecordId>,
        content_type: String,
        artifact: Vec<u8>,
        trust_status: TrustStatus,
        exported_by: &Actor,
    ) -> Option<Self> {
        let sequence_number = record.sequence_number()?;
        let digest = record.content_digest()?;
        let proof = record.proof()?;
        let manifest = ExportManifest {
            record_id: record.record_id().clone(),
            series_key: record.series_key().clone(),
            sequence_number,
            document_number: record.series_key().document_number(sequence_number, number_width),
            version: record.version(),
            kind: record.kind().clone(),
            status,
            cancelled_by,
            content_type,
            content_sha256: digest.to_hex(),
            artifact_size: artifact.len() as u64,
            totals,
            currency: record.content().currency.clone(),
            proof: ProofSummary {
                issuer_reference: proof.issuer_reference.clone(),
                issued_at: proof.issued_at,
                trust_status,
                token_sha256: ContentDigest::of(&proof.raw_token_bytes).to_hex(),
            },
            issued_at: record.issued_at(),
            exported_at: Utc::now(),
            exported_by: exported_by.clone(),
            trust_warning: trust_warning(trust_status),
        };
        Some(Self {
            manifest,
            artifact,
            proof: proof.clone(),
        })
    }

    pub fn is_trusted(&self) -> bool {
        self.manifest.trust_warning.is_none()
    }

    pub fn manifest_json(&self) -> Result<Vec<u8>, serde_json::Error> {
        serde_json::to_vec_pretty(&self.manifest)
    }

    /// Domain-separated digest of the manifest.
    pub fn manifest_digest(&self) -> Result<ContentDigest, seal_crypto::HasherError> {
        ContentHasher::MANIFEST.hash_json(&self.manifest)
    }

    /// Named files of the bundle, ready to be written or zipped.
    pub fn files(&self) -> Result<Vec<(String, Vec<u8>)>, serde_json::Error> {
        let stem = &self.manifest.document_number;
        Ok(vec![
            (format!("{stem}.bin"), self.artifact.clone()),
            (format!("{stem}.proof.json"), serde_json::to_vec_pretty(&self.proof)?),
            (format!("{stem}.manifest.json"), self.manifest_json()?),
        ])
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn only_verified_proofs_have_no_warning() {
        assert!(trust_warning(TrustStatus::Verified).is_none());
        assert!(trust_warning(TrustStatus::UnreachableFallback)
            .unwrap()
            .starts_with("UNVERIFIED"));
        assert!(trust_warning(TrustStatus::Invalid)
            .unwrap()
            .starts_with("INVALID"));
    }
}
