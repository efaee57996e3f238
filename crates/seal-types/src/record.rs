use std::fmt;

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};

use crate::content::{RecordContent, Totals};
use crate::digest::ContentDigest;
use crate::error::TypeError;
use crate::identity::{Actor, RecordId, SeriesKey};
use crate::proof::Proof;

/// Lifecycle state of a record.
///
/// `Draft → Issued` is the only stored transition. `Cancelled` is never
/// written over an issued record: it is the effective status reported for an
/// issued record once a compensating record referencing it has been issued.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RecordStatus {
    Draft,
    Issued,
    Cancelled,
}

impl fmt::Display for RecordStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Draft => write!(f, "draft"),
            Self::Issued => write!(f, "issued"),
            Self::Cancelled => write!(f, "cancelled"),
        }
    }
}

/// What a record is: a regular document or a compensating cancellation.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum RecordKind {
    Original,
    Cancellation { original: RecordId, reason: String },
}

/// Everything the issuance pipeline binds to a record in one atomic step.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct IssuanceSeal {
    pub sequence_number: u64,
    pub content_digest: ContentDigest,
    pub proof: Proof,
    pub proof_obtained_at: DateTime<Utc>,
    pub archive_locator: Option<String>,
    pub issued_at: DateTime<Utc>,
}

/// A business document moving from Draft to Issued.
///
/// Fields are private: the only mutation is [`Record::amend`], which is
/// refused once the record has left Draft, and the only transition is
/// [`Record::issue`], which consumes the draft.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Record {
    record_id: RecordId,
    series_key: SeriesKey,
    kind: RecordKind,
    version: u32,
    content: RecordContent,
    status: RecordStatus,
    sequence_number: Option<u64>,
    content_digest: Option<ContentDigest>,
    proof: Option<Proof>,
    proof_obtained_at: Option<DateTime<Utc>>,
    archive_locator: Option<String>,
    created_by: Actor,
    created_at: DateTime<Utc>,
    issued_at: Option<DateTime<Utc>>,
}

impl Record {
    /// A new draft. No number is allocated and nothing is persisted.
    pub fn draft(series_key: SeriesKey, content: RecordContent, created_by: Actor) -> Self {
        Self {
            record_id: RecordId::new(),
            series_key,
            kind: RecordKind::Original,
            version: 1,
            content,
            status: RecordStatus::Draft,
            sequence_number: None,
            content_digest: None,
            proof: None,
            proof_obtained_at: None,
            archive_locator: None,
            created_by,
            created_at: Utc::now(),
            issued_at: None,
        }
    }

    /// Draft of a compensating record that negates `original`.
    ///
    /// The draft lives in the original's series and carries the next version.
    pub fn compensating(
        original: &Record,
        issue_date: NaiveDate,
        reason: &str,
        created_by: Actor,
    ) -> Self {
        Self {
            kind: RecordKind::Cancellation {
                original: original.record_id.clone(),
                reason: reason.to_string(),
            },
            version: original.version + 1,
            ..Self::draft(
                original.series_key.clone(),
                original.content.negated(issue_date, reason),
                created_by,
            )
        }
    }

    pub fn record_id(&self) -> &RecordId {
        &self.record_id
    }

    pub fn series_key(&self) -> &SeriesKey {
        &self.series_key
    }

    pub fn kind(&self) -> &RecordKind {
        &self.kind
    }

    pub fn version(&self) -> u32 {
        self.version
    }

    pub fn content(&self) -> &RecordContent {
        &self.content
    }

    pub fn status(&self) -> RecordStatus {
        self.status
    }

    pub fn sequence_number(&self) -> Option<u64> {
        self.sequence_number
    }

    pub fn content_digest(&self) -> Option<&ContentDigest> {
        self.content_digest.as_ref()
    }

    pub fn proof(&self) -> Option<&Proof> {
        self.proof.as_ref()
    }

    pub fn proof_obtained_at(&self) -> Option<DateTime<Utc>> {
        self.proof_obtained_at
    }

    pub fn archive_locator(&self) -> Option<&str> {
        self.archive_locator.as_deref()
    }

    pub fn created_by(&self) -> &Actor {
        &self.created_by
    }

    pub fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }

    pub fn issued_at(&self) -> Option<DateTime<Utc>> {
        self.issued_at
    }

    pub fn is_draft(&self) -> bool {
        self.status == RecordStatus::Draft
    }

    /// The record this one compensates, if it is a cancellation.
    pub fn supersedes(&self) -> Option<&RecordId> {
        match &self.kind {
            RecordKind::Cancellation { original, .. } => Some(original),
            RecordKind::Original => None,
        }
    }

    pub fn document_number(&self, width: usize) -> Option<String> {
        self.sequence_number
            .map(|n| self.series_key.document_number(n, width))
    }

    /// Replace the content of a draft.
    pub fn amend(&mut self, content: RecordContent) -> Result<(), TypeError> {
        self.ensure_draft()?;
        self.content = content;
        Ok(())
    }

    /// Returns an error unless the record is still a draft.
    pub fn ensure_draft(&self) -> Result<(), TypeError> {
        if self.status != RecordStatus::Draft {
            return Err(TypeError::ImmutabilityViolation {
                record_id: self.record_id.clone(),
                status: self.status,
            });
        }
        Ok(())
    }

    /// Deep copy of the record as it will be rendered under `sequence_number`.
    pub fn snapshot(&self, sequence_number: u64, width: usize) -> Result<RecordSnapshot, TypeError> {
        Ok(RecordSnapshot {
            record_id: self.record_id.clone(),
            series_key: self.series_key.clone(),
            sequence_number,
            document_number: self.series_key.document_number(sequence_number, width),
            kind: self.kind.clone(),
            version: self.version,
            totals: self.content.totals()?,
            content: self.content.clone(),
        })
    }

    /// Transition Draft → Issued, binding number, digest and proof at once.
    pub fn issue(mut self, seal: IssuanceSeal) -> Result<Record, TypeError> {
        self.ensure_draft()?;
        if !seal.proof.binds(&seal.content_digest) {
            return Err(TypeError::DigestMismatch {
                expected: seal.content_digest.to_hex(),
                bound: seal.proof.digest_bound.to_hex(),
            });
        }
        self.status = RecordStatus::Issued;
        self.sequence_number = Some(seal.sequence_number);
        self.content_digest = Some(seal.content_digest);
        self.proof = Some(seal.proof);
        self.proof_obtained_at = Some(seal.proof_obtained_at);
        self.archive_locator = seal.archive_locator;
        self.issued_at = Some(seal.issued_at);
        Ok(self)
    }
}

/// Frozen, numbered view of a record handed to the renderer.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct RecordSnapshot {
    pub record_id: RecordId,
    pub series_key: SeriesKey,
    pub sequence_number: u64,
    pub document_number: String,
    pub kind: RecordKind,
    pub version: u32,
    pub content: RecordContent,
    pub totals: Totals,
}
