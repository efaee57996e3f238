use std::sync::Arc;

use chrono::Utc;
use seal_ledger::{AuditAction, LedgerWriter};
use seal_store::{ArchiveMetadata, ArchiveStore, Locator, RecordFilter, RecordStore, StoreError};
use seal_types::{
    Actor, ContentDigest, IssuanceSeal, Record, RecordContent, RecordId, RecordKind,
    RecordSnapshot, RecordStatus, SeriesKey, TrustStatus,
};
use tracing::{debug, error, info, warn};

use crate::allocator::SequenceAllocator;
use crate::binder::ContentBinder;
use crate::collaborators::{Renderer, Validator};
use crate::config::IssuanceConfig;
use crate::error::{IssuanceError, IssuanceResult};
use crate::export::ExportBundle;

/// The record state machine: `Draft → Issued`, with cancellation by
/// compensating records.
///
/// Issuance runs validate → allocate → render → bind → archive → commit.
/// The record becomes visible as Issued only through the store's single
/// atomic commit; any failure between allocation and commit voids the
/// allocated number, as does dropping the `issue` future before it
/// completes.
pub struct RecordLifecycle {
    pub(crate) config: IssuanceConfig,
    pub(crate) allocator: SequenceAllocator,
    pub(crate) binder: ContentBinder,
    pub(crate) renderer: Arc<dyn Renderer>,
    pub(crate) validator: Arc<dyn Validator>,
    pub(crate) records: Arc<dyn RecordStore>,
    pub(crate) archive: Arc<dyn ArchiveStore>,
    pub(crate) ledger: Arc<dyn LedgerWriter>,
}

impl RecordLifecycle {
    pub fn config(&self) -> &IssuanceConfig {
        &self.config
    }

    pub fn binder(&self) -> &ContentBinder {
        &self.binder
    }

    pub fn allocator(&self) -> &SequenceAllocator {
        &self.allocator
    }

    /// A new, unsaved draft. No number is allocated and nothing is written.
    pub fn create_draft(
        &self,
        series: SeriesKey,
        content: RecordContent,
        actor: &Actor,
    ) -> Record {
        Record::draft(series, content, actor.clone())
    }

    /// Store a draft, inserting or replacing the stored copy.
    pub fn save_draft(&self, record: &Record, actor: &Actor) -> IssuanceResult<()> {
        if !record.is_draft() {
            return Err(self.reject_modification(record.record_id(), record.status(), actor));
        }
        let existed = self.records.get(record.record_id())?.is_some();
        match self.records.put_draft(record) {
            Ok(()) => {}
            Err(StoreError::ImmutabilityViolation { record_id, status }) => {
                return Err(self.reject_modification(&record_id, status, actor));
            }
            Err(e) => return Err(e.into()),
        }
        let action = if existed {
            AuditAction::DraftAmended
        } else {
            AuditAction::DraftSaved
        };
        self.ledger.append(record.record_id(), actor, action)?;
        debug!(record = %record.record_id().short_id(), existed, "draft saved");
        Ok(())
    }

    /// Replace the content of a stored draft.
    pub fn amend_draft(
        &self,
        record_id: &RecordId,
        content: RecordContent,
        actor: &Actor,
    ) -> IssuanceResult<Record> {
        let mut record = self.load(record_id)?;
        if !record.is_draft() {
            let status = self.effective_status(&record)?;
            return Err(self.reject_modification(record_id, status, actor));
        }
        record.amend(content)?;
        match self.records.put_draft(&record) {
            Ok(()) => {}
            Err(StoreError::ImmutabilityViolation { record_id, status }) => {
                return Err(self.reject_modification(&record_id, status, actor));
            }
            Err(e) => return Err(e.into()),
        }
        self.ledger
            .append(record_id, actor, AuditAction::DraftAmended)?;
        Ok(record)
    }

    /// Issue a draft: number it, render it, timestamp it and commit it.
    pub async fn issue(&self, record: Record, actor: &Actor) -> IssuanceResult<Record> {
        if !record.is_draft() {
            return Err(self.reject_modification(record.record_id(), record.status(), actor));
        }
        if let Some(stored) = self.records.get(record.record_id())? {
            if !stored.is_draft() {
                let status = self.effective_status(&stored)?;
                return Err(self.reject_modification(record.record_id(), status, actor));
            }
        }
        if let Some(original) = record.supersedes() {
            self.ensure_cancellable(original)?;
        }
        self.validator
            .validate(&record)
            .map_err(IssuanceError::ValidationFailed)?;

        let record_id = record.record_id().clone();
        let series = record.series_key().clone();
        let pending = self.allocator.reserve(&series, &record_id, actor)?;
        let number = pending.number();

        let (issued, digest) = match self.seal_and_commit(record, number, actor).await {
            Ok(sealed) => sealed,
            Err(e) => {
                if e.is_integrity_alarm() {
                    error!(target: "seal::alarm", record = %record_id, error = %e, "issuance aborted");
                }
                if let Err(void_error) = pending.void(&e.to_string()) {
                    error!(
                        target: "seal::alarm",
                        series = %series,
                        number,
                        error = %void_error,
                        "failed number could not be voided"
                    );
                }
                return Err(e);
            }
        };
        pending.commit();

        self.ledger.append(
            &record_id,
            actor,
            AuditAction::Issued {
                series_key: series.clone(),
                number,
                digest,
            },
        )?;
        if let RecordKind::Cancellation { original, reason } = issued.kind() {
            self.ledger.append(
                original,
                actor,
                AuditAction::Cancelled {
                    cancelled_by: record_id.clone(),
                    reason: reason.clone(),
                },
            )?;
        }

        info!(
            record = %record_id.short_id(),
            document_number = %series.document_number(number, self.config.number_width),
            digest = %digest.short_hex(),
            trust = %issued.proof().map(|p| p.trust_status.to_string()).unwrap_or_default(),
            "record issued"
        );
        Ok(issued)
    }

    /// Steps between allocation and the atomic commit.
    async fn seal_and_commit(
        &self,
        record: Record,
        number: u64,
        actor: &Actor,
    ) -> IssuanceResult<(Record, ContentDigest)> {
        let record_id = record.record_id().clone();
        let width = self.config.number_width;
        let snapshot = record.snapshot(number, width)?;
        let document_number = snapshot.document_number.clone();

        let artifact = self.render(&snapshot).await?;

        let proof = self.binder.bind(&record_id, &artifact, actor).await?;
        let proof_obtained_at = Utc::now();
        let digest = ContentBinder::digest(&artifact);

        let base_key = format!("records/{}/{}", record.series_key(), document_number);
        let metadata = ArchiveMetadata::new(self.renderer.content_type())
            .with("record_id", record_id.to_string())
            .with("document_number", document_number.as_str())
            .with("sha256", digest.to_hex())
            .with("size", artifact.len().to_string())
            .with("trust_status", proof.trust_status.to_string());
        let locator = self
            .archive
            .put(&format!("{base_key}.bin"), &artifact, &metadata)?;
        let proof_json = serde_json::to_vec_pretty(&proof)
            .map_err(|e| StoreError::Serialization(e.to_string()))?;
        self.archive.put(
            &format!("{base_key}.proof.json"),
            &proof_json,
            &ArchiveMetadata::new("application/json")
                .with("record_id", record_id.to_string())
                .with("document_number", document_number.as_str()),
        )?;

        let issued = record.issue(IssuanceSeal {
            sequence_number: number,
            content_digest: digest,
            proof,
            proof_obtained_at,
            archive_locator: Some(locator.key),
            issued_at: Utc::now(),
        })?;
        self.records.commit_issued(&issued)?;
        Ok((issued, digest))
    }

    /// Render under the render timeout. Timed-out attempts are retried with
    /// backoff; a renderer error is final.
    async fn render(&self, snapshot: &RecordSnapshot) -> IssuanceResult<Vec<u8>> {
        let timeout = self.config.render_timeout();
        let max_attempts = self.config.render_max_attempts.max(1);
        let mut attempt = 1;
        loop {
            match tokio::time::timeout(timeout, self.renderer.render(snapshot)).await {
                Ok(Ok(bytes)) => return Ok(bytes),
                Ok(Err(e)) => return Err(IssuanceError::RenderFailed(e.to_string())),
                Err(_) if attempt >= max_attempts => {
                    return Err(IssuanceError::RenderTimeout(timeout))
                }
                Err(_) => {
                    let delay = self.config.timestamp.backoff(attempt);
                    warn!(
                        document_number = %snapshot.document_number,
                        attempt,
                        ?delay,
                        "render timed out, retrying"
                    );
                    tokio::time::sleep(delay).await;
                    attempt += 1;
                }
            }
        }
    }

    /// Cancel an issued record by issuing a compensating record.
    ///
    /// The original is never touched; its effective status becomes
    /// `Cancelled` once the compensating record commits.
    pub async fn cancel(
        &self,
        original_id: &RecordId,
        reason: &str,
        actor: &Actor,
    ) -> IssuanceResult<Record> {
        let original = self.ensure_cancellable(original_id)?;
        let draft = Record::compensating(&original, Utc::now().date_naive(), reason, actor.clone());
        let cancellation = self.issue(draft, actor).await?;
        info!(
            original = %original_id.short_id(),
            cancellation = %cancellation.record_id().short_id(),
            reason,
            "record cancelled"
        );
        Ok(cancellation)
    }

    fn ensure_cancellable(&self, original_id: &RecordId) -> IssuanceResult<Record> {
        let original = self.load(original_id)?;
        if matches!(original.kind(), RecordKind::Cancellation { .. }) {
            return Err(IssuanceError::InvalidTransition {
                record_id: original_id.clone(),
                status: original.status(),
                operation: "cancel a cancellation",
            });
        }
        match self.effective_status(&original)? {
            RecordStatus::Issued => Ok(original),
            RecordStatus::Cancelled => {
                let by = self
                    .records
                    .cancellation_of(original_id)?
                    .ok_or_else(|| IssuanceError::RecordNotFound(original_id.clone()))?;
                Err(IssuanceError::AlreadyCancelled {
                    original: original_id.clone(),
                    by,
                })
            }
            status @ RecordStatus::Draft => Err(IssuanceError::InvalidTransition {
                record_id: original_id.clone(),
                status,
                operation: "cancel",
            }),
        }
    }

    /// Read a record, auditing the access.
    pub fn get(&self, record_id: &RecordId, actor: &Actor) -> IssuanceResult<Record> {
        let record = self.load(record_id)?;
        self.ledger.append(record_id, actor, AuditAction::Accessed)?;
        Ok(record)
    }

    /// Effective status: `Cancelled` once a compensating record exists.
    pub fn status_of(&self, record_id: &RecordId) -> IssuanceResult<RecordStatus> {
        self.records
            .effective_status(record_id)?
            .ok_or_else(|| IssuanceError::RecordNotFound(record_id.clone()))
    }

    /// Records matching `filter`. Text queries match document numbers in
    /// the configured width unless the filter names another.
    pub fn list(&self, filter: &RecordFilter) -> IssuanceResult<Vec<Record>> {
        let mut filter = filter.clone();
        filter.number_width.get_or_insert(self.config.number_width);
        Ok(self.records.list(&filter)?)
    }

    /// Re-read the archived artifact and check it against the stored digest
    /// and proof.
    pub fn verify_record(&self, record_id: &RecordId, actor: &Actor) -> IssuanceResult<TrustStatus> {
        let record = self.load_issued(record_id, "verify")?;
        let (_, trust_status) = self.check_artifact(&record)?;
        self.ledger
            .append(record_id, actor, AuditAction::Verified { trust_status })?;
        Ok(trust_status)
    }

    /// Build the download bundle of an issued record.
    pub fn export(&self, record_id: &RecordId, actor: &Actor) -> IssuanceResult<ExportBundle> {
        let record = self.load_issued(record_id, "export")?;
        let (artifact, trust_status) = self.check_artifact(&record)?;
        let status = self.effective_status(&record)?;
        let cancelled_by = self.records.cancellation_of(record_id)?;
        let content_type = record
            .archive_locator()
            .and_then(|key| self.archive.metadata(key).transpose())
            .transpose()?
            .map(|meta| meta.content_type)
            .unwrap_or_else(|| self.renderer.content_type().to_string());

        let totals = record.content().totals()?;
        let bundle = ExportBundle::assemble(
            &record,
            self.config.number_width,
            totals,
            status,
            cancelled_by,
            content_type,
            artifact,
            trust_status,
            actor,
        )
        .ok_or_else(|| IssuanceError::InvalidTransition {
            record_id: record_id.clone(),
            status: record.status(),
            operation: "export",
        })?;

        self.ledger
            .append(record_id, actor, AuditAction::Exported { trust_status })?;
        if let Some(warning) = &bundle.manifest.trust_warning {
            warn!(record = %record_id.short_id(), %warning, "exporting record without verified proof");
        }
        Ok(bundle)
    }

    /// Load the artifact, recompute its digest and re-verify the proof.
    fn check_artifact(&self, record: &Record) -> IssuanceResult<(Vec<u8>, TrustStatus)> {
        let missing = |what: &str| IssuanceError::Store(StoreError::InvalidRecord {
            record_id: record.record_id().clone(),
            reason: format!("issued record has no {what}"),
        });
        let key = record.archive_locator().ok_or_else(|| missing("archive locator"))?;
        let stored_digest = *record.content_digest().ok_or_else(|| missing("content digest"))?;
        let proof = record.proof().ok_or_else(|| missing("proof"))?;

        let size = self
            .archive
            .metadata(key)?
            .and_then(|meta| meta.attributes.get("size").and_then(|s| s.parse().ok()))
            .unwrap_or_default();
        let artifact = match self.archive.get(&Locator::new(key, stored_digest, size)) {
            Ok(bytes) => bytes,
            Err(e @ StoreError::HashMismatch { .. }) => {
                error!(
                    target: "seal::alarm",
                    record = %record.record_id(),
                    key,
                    error = %e,
                    "archived artifact does not match its recorded digest"
                );
                return Err(e.into());
            }
            Err(e) => return Err(e.into()),
        };

        let digest = ContentBinder::digest(&artifact);
        if digest != stored_digest {
            error!(
                target: "seal::alarm",
                record = %record.record_id(),
                expected = %stored_digest,
                found = %digest,
                "archived artifact does not match its recorded digest"
            );
            return Err(IssuanceError::DigestMismatch {
                expected: stored_digest.to_hex(),
                found: digest.to_hex(),
            });
        }

        let trust_status = self.binder.verify_proof(proof, &digest)?;
        Ok((artifact, trust_status))
    }

    fn load(&self, record_id: &RecordId) -> IssuanceResult<Record> {
        self.records
            .get(record_id)?
            .ok_or_else(|| IssuanceError::RecordNotFound(record_id.clone()))
    }

    fn load_issued(&self, record_id: &RecordId, operation: &'static str) -> IssuanceResult<Record> {
        let record = self.load(record_id)?;
        if record.is_draft() {
            return Err(IssuanceError::InvalidTransition {
                record_id: record_id.clone(),
                status: RecordStatus::Draft,
                operation,
            });
        }
        Ok(record)
    }

    fn effective_status(&self, record: &Record) -> IssuanceResult<RecordStatus> {
        Ok(self
            .records
            .effective_status(record.record_id())?
            .unwrap_or(record.status()))
    }

    /// Audit a refused modification and build the error for it.
    fn reject_modification(
        &self,
        record_id: &RecordId,
        status: RecordStatus,
        actor: &Actor,
    ) -> IssuanceError {
        warn!(record = %record_id.short_id(), %status, actor = %actor, "modification of sealed record rejected");
        if let Err(e) = self.ledger.append(
            record_id,
            actor,
            AuditAction::ModificationRejected {
                status: status.to_string(),
            },
        ) {
            return e.into();
        }
        IssuanceError::ImmutabilityViolation {
            record_id: record_id.clone(),
            status,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::authority::{LocalAuthority, UnreachableAuthority};
    use crate::collaborators::{CanonicalJsonRenderer, FieldError, RenderError};
    use crate::config::FallbackMode;
    use crate::pipeline::Pipeline;
    use crate::testing::sample_content;
    use async_trait::async_trait;
    use seal_ledger::LedgerReader;
    use std::sync::atomic::{AtomicU32, Ordering};
    use std::time::Duration;

    fn series() -> SeriesKey {
        SeriesKey::new("RE2025").unwrap()
    }

    fn pipeline() -> Pipeline {
        Pipeline::builder(IssuanceConfig::default(), Arc::new(LocalAuthority::generate()))
            .build()
            .unwrap()
    }

    fn actions(pipeline: &Pipeline, record_id: &RecordId) -> Vec<&'static str> {
        pipeline
            .ledger()
            .entries_for(record_id)
            .unwrap()
            .iter()
            .map(|e| e.action.name())
            .collect()
    }

    struct BrokenRenderer;

    #[async_trait]
    impl Renderer for BrokenRenderer {
        async fn render(&self, _snapshot: &RecordSnapshot) -> Result<Vec<u8>, RenderError> {
            Err(RenderError("template missing".into()))
        }
    }

    #[test]
    fn create_draft_has_no_side_effects() {
        let p = pipeline();
        let draft = p
            .lifecycle()
            .create_draft(series(), sample_content(), &Actor::new("alice"));
        assert!(draft.is_draft());
        assert_eq!(draft.sequence_number(), None);
        assert_eq!(p.ledger().entry_count().unwrap(), 0);
        assert!(p.records().get(draft.record_id()).unwrap().is_none());
    }

    #[test]
    fn drafts_can_be_saved_and_amended() {
        let p = pipeline();
        let actor = Actor::new("alice");
        let draft = p.lifecycle().create_draft(series(), sample_content(), &actor);
        p.lifecycle().save_draft(&draft, &actor).unwrap();

        let mut content = sample_content();
        content.notes = Some("second thoughts".into());
        let amended = p
            .lifecycle()
            .amend_draft(draft.record_id(), content, &actor)
            .unwrap();
        assert_eq!(amended.content().notes.as_deref(), Some("second thoughts"));
        assert_eq!(
            actions(&p, draft.record_id()),
            vec!["draft_saved", "draft_amended"]
        );
    }

    #[tokio::test]
    async fn issued_record_is_immutable() {
        let p = pipeline();
        let actor = Actor::new("alice");
        let draft = p.lifecycle().create_draft(series(), sample_content(), &actor);
        p.lifecycle().save_draft(&draft, &actor).unwrap();
        let issued = p.lifecycle().issue(draft.clone(), &actor).await.unwrap();
        assert_eq!(issued.status(), RecordStatus::Issued);
        assert_eq!(issued.sequence_number(), Some(1));

        let err = p
            .lifecycle()
            .amend_draft(issued.record_id(), sample_content(), &actor)
            .unwrap_err();
        assert!(matches!(err, IssuanceError::ImmutabilityViolation { .. }));

        let err = p.lifecycle().save_draft(&draft, &actor).unwrap_err();
        assert!(matches!(err, IssuanceError::ImmutabilityViolation { .. }));

        let err = p.lifecycle().issue(draft, &actor).await.unwrap_err();
        assert!(matches!(err, IssuanceError::ImmutabilityViolation { .. }));

        let mut copy = issued.clone();
        assert!(copy.amend(sample_content()).is_err());

        let stored = p.records().get(issued.record_id()).unwrap().unwrap();
        assert_eq!(stored, issued);
        let rejected = actions(&p, issued.record_id())
            .into_iter()
            .filter(|a| *a == "modification_rejected")
            .count();
        assert_eq!(rejected, 3);
    }

    #[tokio::test]
    async fn issuance_audits_each_step() {
        let p = pipeline();
        let actor = Actor::new("alice");
        let draft = p.lifecycle().create_draft(series(), sample_content(), &actor);
        let issued = p.lifecycle().issue(draft, &actor).await.unwrap();
        assert_eq!(
            actions(&p, issued.record_id()),
            vec!["number_allocated", "proof_bound", "issued"]
        );
        assert!(p.archive().exists("records/RE2025/RE2025000001.bin").unwrap());
        assert!(p
            .archive()
            .exists("records/RE2025/RE2025000001.proof.json")
            .unwrap());
        assert_eq!(
            issued.archive_locator(),
            Some("records/RE2025/RE2025000001.bin")
        );
    }

    #[tokio::test]
    async fn invalid_draft_consumes_no_number() {
        let p = pipeline();
        let actor = Actor::new("alice");
        let mut content = sample_content();
        content.line_items.clear();
        let draft = p.lifecycle().create_draft(series(), content, &actor);
        let err = p.lifecycle().issue(draft, &actor).await.unwrap_err();
        assert!(matches!(err, IssuanceError::ValidationFailed(_)));
        assert!(p.counters().load(&series()).unwrap().is_none());
        assert_eq!(p.ledger().entry_count().unwrap(), 0);
    }

    struct AcceptAll;

    impl Validator for AcceptAll {
        fn validate(&self, _record: &Record) -> Result<(), Vec<FieldError>> {
            Ok(())
        }
    }

    fn overflowing_content() -> RecordContent {
        let mut content = sample_content();
        content.line_items[0].quantity = 1;
        content.line_items[0].unit_price = i64::MAX;
        content
    }

    #[tokio::test]
    async fn overflowing_totals_fail_before_allocation() {
        let p = pipeline();
        let actor = Actor::new("alice");
        let draft = p.lifecycle().create_draft(series(), overflowing_content(), &actor);
        let err = p.lifecycle().issue(draft, &actor).await.unwrap_err();
        match err {
            IssuanceError::ValidationFailed(errors) => {
                assert_eq!(errors[0].field, "line_items[0].unit_price");
            }
            other => panic!("expected validation failure, got {other:?}"),
        }
        assert!(p.counters().load(&series()).unwrap().is_none());
        assert_eq!(p.ledger().entry_count().unwrap(), 0);
    }

    #[tokio::test]
    async fn overflowing_totals_never_seal_when_validation_is_lax() {
        let p = Pipeline::builder(IssuanceConfig::default(), Arc::new(LocalAuthority::generate()))
            .validator(Arc::new(AcceptAll))
            .build()
            .unwrap();
        let actor = Actor::new("alice");
        let draft = p.lifecycle().create_draft(series(), overflowing_content(), &actor);
        let record_id = draft.record_id().clone();
        let err = p.lifecycle().issue(draft, &actor).await.unwrap_err();
        assert!(matches!(
            err,
            IssuanceError::Type(seal_types::TypeError::AmountOverflow { line: Some(0) })
        ));
        assert_eq!(
            actions(&p, &record_id),
            vec!["number_allocated", "number_skipped"]
        );
        assert!(p.records().get(&record_id).unwrap().is_none());
    }

    #[tokio::test]
    async fn render_failure_voids_number() {
        let p = Pipeline::builder(IssuanceConfig::default(), Arc::new(LocalAuthority::generate()))
            .renderer(Arc::new(BrokenRenderer))
            .build()
            .unwrap();
        let actor = Actor::new("alice");
        let draft = p.lifecycle().create_draft(series(), sample_content(), &actor);
        let record_id = draft.record_id().clone();
        let err = p.lifecycle().issue(draft, &actor).await.unwrap_err();
        assert!(matches!(err, IssuanceError::RenderFailed(_)));
        assert_eq!(
            actions(&p, &record_id),
            vec!["number_allocated", "number_skipped"]
        );
        let report = p.continuity(&series()).unwrap();
        assert_eq!(report.skipped, vec![1]);
        assert!(report.is_continuous());
    }

    /// Hangs on its first `stalls` calls, then renders normally.
    struct StallingRenderer {
        stalls: u32,
        calls: AtomicU32,
    }

    #[async_trait]
    impl Renderer for StallingRenderer {
        async fn render(&self, snapshot: &RecordSnapshot) -> Result<Vec<u8>, RenderError> {
            if self.calls.fetch_add(1, Ordering::SeqCst) < self.stalls {
                tokio::time::sleep(Duration::from_secs(5)).await;
            }
            CanonicalJsonRenderer.render(snapshot).await
        }
    }

    fn stalling_pipeline(stalls: u32) -> (Pipeline, Arc<StallingRenderer>) {
        let mut config = IssuanceConfig::default();
        config.render_timeout_ms = 20;
        config.render_max_attempts = 2;
        config.timestamp.initial_backoff_ms = 1;
        let renderer = Arc::new(StallingRenderer {
            stalls,
            calls: AtomicU32::new(0),
        });
        let p = Pipeline::builder(config, Arc::new(LocalAuthority::generate()))
            .renderer(renderer.clone())
            .build()
            .unwrap();
        (p, renderer)
    }

    #[tokio::test]
    async fn render_timeout_is_retried() {
        let (p, renderer) = stalling_pipeline(1);
        let actor = Actor::new("alice");
        let draft = p.lifecycle().create_draft(series(), sample_content(), &actor);
        let issued = p.lifecycle().issue(draft, &actor).await.unwrap();
        assert_eq!(issued.sequence_number(), Some(1));
        assert_eq!(renderer.calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn exhausted_render_timeouts_void_the_number() {
        let (p, renderer) = stalling_pipeline(u32::MAX);
        let actor = Actor::new("alice");
        let draft = p.lifecycle().create_draft(series(), sample_content(), &actor);
        p.lifecycle().save_draft(&draft, &actor).unwrap();

        let err = p.lifecycle().issue(draft.clone(), &actor).await.unwrap_err();
        assert!(matches!(err, IssuanceError::RenderTimeout(t) if t == Duration::from_millis(20)));
        assert_eq!(renderer.calls.load(Ordering::SeqCst), 2);
        assert_eq!(
            actions(&p, draft.record_id()),
            vec!["draft_saved", "number_allocated", "number_skipped"]
        );
        assert_eq!(
            p.lifecycle().status_of(draft.record_id()).unwrap(),
            RecordStatus::Draft
        );
    }

    #[tokio::test]
    async fn strict_mode_leaves_record_in_draft() {
        let mut config = IssuanceConfig::default();
        config.timestamp.max_attempts = 2;
        config.timestamp.initial_backoff_ms = 1;
        config.timestamp.timeout_ms = 50;
        let p = Pipeline::builder(config, Arc::new(UnreachableAuthority))
            .build()
            .unwrap();
        let actor = Actor::new("alice");
        let draft = p.lifecycle().create_draft(series(), sample_content(), &actor);
        p.lifecycle().save_draft(&draft, &actor).unwrap();

        let err = p.lifecycle().issue(draft.clone(), &actor).await.unwrap_err();
        assert!(matches!(err, IssuanceError::TimestampUnavailable { .. }));
        assert_eq!(
            p.lifecycle().status_of(draft.record_id()).unwrap(),
            RecordStatus::Draft
        );
        assert_eq!(
            actions(&p, draft.record_id()),
            vec!["draft_saved", "number_allocated", "bind_failed", "number_skipped"]
        );
    }

    #[tokio::test]
    async fn cancellation_rules() {
        let p = pipeline();
        let actor = Actor::new("alice");

        let draft = p.lifecycle().create_draft(series(), sample_content(), &actor);
        p.lifecycle().save_draft(&draft, &actor).unwrap();
        let err = p
            .lifecycle()
            .cancel(draft.record_id(), "typo", &actor)
            .await
            .unwrap_err();
        assert!(matches!(err, IssuanceError::InvalidTransition { .. }));

        let issued = p.lifecycle().issue(draft, &actor).await.unwrap();
        let cancellation = p
            .lifecycle()
            .cancel(issued.record_id(), "typo", &actor)
            .await
            .unwrap();
        assert_eq!(cancellation.supersedes(), Some(issued.record_id()));
        assert_eq!(cancellation.version(), issued.version() + 1);
        assert_eq!(cancellation.sequence_number(), Some(2));
        assert_eq!(
            cancellation.content().totals().unwrap().gross,
            -issued.content().totals().unwrap().gross
        );

        let err = p
            .lifecycle()
            .cancel(issued.record_id(), "again", &actor)
            .await
            .unwrap_err();
        assert!(matches!(err, IssuanceError::AlreadyCancelled { .. }));

        let err = p
            .lifecycle()
            .cancel(cancellation.record_id(), "undo", &actor)
            .await
            .unwrap_err();
        assert!(matches!(err, IssuanceError::InvalidTransition { .. }));

        assert_eq!(
            p.lifecycle().status_of(issued.record_id()).unwrap(),
            RecordStatus::Cancelled
        );
        assert_eq!(actions(&p, issued.record_id()).last(), Some(&"cancelled"));
    }

    #[tokio::test]
    async fn get_and_list() {
        let p = pipeline();
        let actor = Actor::new("alice");
        let draft = p.lifecycle().create_draft(series(), sample_content(), &actor);
        p.lifecycle().save_draft(&draft, &actor).unwrap();
        let other = p.lifecycle().create_draft(series(), sample_content(), &actor);
        let issued = p.lifecycle().issue(other, &actor).await.unwrap();

        let read = p.lifecycle().get(issued.record_id(), &Actor::new("bob")).unwrap();
        assert_eq!(read, issued);
        let last = p.ledger().head().unwrap().unwrap();
        assert_eq!(last.action, AuditAction::Accessed);
        assert_eq!(last.actor, Actor::new("bob"));

        let drafts = p
            .lifecycle()
            .list(&RecordFilter::all().status(RecordStatus::Draft))
            .unwrap();
        assert_eq!(drafts.len(), 1);
        assert_eq!(drafts[0].record_id(), draft.record_id());
        assert_eq!(
            p.lifecycle()
                .list(&RecordFilter::all().series(series()))
                .unwrap()
                .len(),
            2
        );

        let number = issued.document_number(6).unwrap();
        let found = p
            .lifecycle()
            .list(&RecordFilter::all().query(number.to_lowercase()))
            .unwrap();
        assert_eq!(found.len(), 1);
        assert_eq!(found[0].record_id(), issued.record_id());
        assert_eq!(
            p.lifecycle()
                .list(&RecordFilter::all().issue_year(2025).query("beispiel"))
                .unwrap()
                .len(),
            2
        );

        let err = p.lifecycle().get(&RecordId::new(), &actor).unwrap_err();
        assert!(matches!(err, IssuanceError::RecordNotFound(_)));
    }

    #[tokio::test]
    async fn verify_and_export() {
        let p = pipeline();
        let actor = Actor::new("alice");
        let draft = p.lifecycle().create_draft(series(), sample_content(), &actor);
        let issued = p.lifecycle().issue(draft, &actor).await.unwrap();

        assert_eq!(
            p.lifecycle().verify_record(issued.record_id(), &actor).unwrap(),
            TrustStatus::Verified
        );
        let bundle = p.lifecycle().export(issued.record_id(), &actor).unwrap();
        assert!(bundle.is_trusted());
        assert_eq!(bundle.manifest.document_number, "RE2025000001");
        assert_eq!(bundle.manifest.content_type, "application/json");
        assert_eq!(
            bundle.manifest.content_sha256,
            ContentDigest::of(&bundle.artifact).to_hex()
        );
        let names: Vec<String> = bundle.files().unwrap().into_iter().map(|(n, _)| n).collect();
        assert_eq!(
            names,
            vec![
                "RE2025000001.bin",
                "RE2025000001.proof.json",
                "RE2025000001.manifest.json"
            ]
        );
    }

    #[tokio::test]
    async fn fallback_export_is_flagged() {
        let mut config = IssuanceConfig::default();
        config.timestamp.fallback = FallbackMode::LocalUnverified;
        config.timestamp.max_attempts = 1;
        let p = Pipeline::builder(config, Arc::new(UnreachableAuthority))
            .build()
            .unwrap();
        let actor = Actor::new("alice");
        let draft = p.lifecycle().create_draft(series(), sample_content(), &actor);
        let issued = p.lifecycle().issue(draft, &actor).await.unwrap();
        assert_eq!(
            issued.proof().unwrap().trust_status,
            TrustStatus::UnreachableFallback
        );

        let bundle = p.lifecycle().export(issued.record_id(), &actor).unwrap();
        assert!(!bundle.is_trusted());
        let manifest = String::from_utf8(bundle.manifest_json().unwrap()).unwrap();
        assert!(manifest.contains("trust_warning"));
        assert!(manifest.contains("UNVERIFIED"));
    }
}
