use std::sync::Arc;

use seal_ledger::{ContinuityReport, InMemoryLedger, LedgerReader, LedgerWriter, SeriesContinuity};
use seal_store::{
    ArchiveStore, CounterStore, InMemoryArchiveStore, InMemoryCounterStore, InMemoryRecordStore,
    RecordStore,
};
use seal_types::SeriesKey;

use crate::allocator::SequenceAllocator;
use crate::authority::TimestampAuthority;
use crate::binder::ContentBinder;
use crate::collaborators::{CanonicalJsonRenderer, Renderer, RequiredFieldsValidator, Validator};
use crate::config::IssuanceConfig;
use crate::error::IssuanceResult;
use crate::lifecycle::RecordLifecycle;

/// A wired issuance pipeline and the stores behind it.
pub struct Pipeline {
    lifecycle: RecordLifecycle,
    ledger: Arc<InMemoryLedger>,
    counters: Arc<dyn CounterStore>,
    records: Arc<dyn RecordStore>,
    archive: Arc<dyn ArchiveStore>,
}

impl Pipeline {
    pub fn builder(config: IssuanceConfig, authority: Arc<dyn TimestampAuthority>) -> PipelineBuilder {
        PipelineBuilder::new(config, authority)
    }

    pub fn lifecycle(&self) -> &RecordLifecycle {
        &self.lifecycle
    }

    pub fn ledger(&self) -> &InMemoryLedger {
        &self.ledger
    }

    pub fn counters(&self) -> &dyn CounterStore {
        self.counters.as_ref()
    }

    pub fn records(&self) -> &dyn RecordStore {
        self.records.as_ref()
    }

    pub fn archive(&self) -> &dyn ArchiveStore {
        self.archive.as_ref()
    }

    /// Verify the whole audit chain, failing with `ChainIntegrityFailure` on
    /// the first broken entry.
    pub fn verify_audit_chain(&self) -> IssuanceResult<u64> {
        let count = self.ledger.entry_count()?;
        if count > 0 {
            self.ledger.check_chain(1, count)?;
        }
        Ok(count)
    }

    /// Account for every number of `series`.
    pub fn continuity(&self, series: &SeriesKey) -> IssuanceResult<ContinuityReport> {
        Ok(SeriesContinuity::check(
            series,
            self.lifecycle.config.number_start,
            self.counters.as_ref(),
            self.records.as_ref(),
            self.ledger.as_ref(),
        )?)
    }
}

/// Builds a [`Pipeline`], defaulting every store to its in-memory backend.
pub struct PipelineBuilder {
    config: IssuanceConfig,
    authority: Arc<dyn TimestampAuthority>,
    renderer: Arc<dyn Renderer>,
    validator: Arc<dyn Validator>,
    counters: Option<Arc<dyn CounterStore>>,
    records: Option<Arc<dyn RecordStore>>,
    archive: Option<Arc<dyn ArchiveStore>>,
    ledger: Option<Arc<InMemoryLedger>>,
}

impl PipelineBuilder {
    pub fn new(config: IssuanceConfig, authority: Arc<dyn TimestampAuthority>) -> Self {
        Self {
            config,
            authority,
            renderer: Arc::new(CanonicalJsonRenderer),
            validator: Arc::new(RequiredFieldsValidator),
            counters: None,
            records: None,
            archive: None,
            ledger: None,
        }
    }

    pub fn renderer(mut self, renderer: Arc<dyn Renderer>) -> Self {
        self.renderer = renderer;
        self
    }

    pub fn validator(mut self, validator: Arc<dyn Validator>) -> Self {
        self.validator = validator;
        self
    }

    pub fn counters(mut self, counters: Arc<dyn CounterStore>) -> Self {
        self.counters = Some(counters);
        self
    }

    pub fn records(mut self, records: Arc<dyn RecordStore>) -> Self {
        self.records = Some(records);
        self
    }

    pub fn archive(mut self, archive: Arc<dyn ArchiveStore>) -> Self {
        self.archive = Some(archive);
        self
    }

    pub fn ledger(mut self, ledger: Arc<InMemoryLedger>) -> Self {
        self.ledger = Some(ledger);
        self
    }

    /// Validate the configuration and wire the components.
    pub fn build(self) -> IssuanceResult<Pipeline> {
        self.config.validate()?;

        let counters: Arc<dyn CounterStore> = match self.counters {
            Some(counters) => counters,
            None => Arc::new(InMemoryCounterStore::new()),
        };
        let records: Arc<dyn RecordStore> = match self.records {
            Some(records) => records,
            None => Arc::new(InMemoryRecordStore::new()),
        };
        let archive: Arc<dyn ArchiveStore> = match self.archive {
            Some(archive) => archive,
            None => Arc::new(InMemoryArchiveStore::new()),
        };
        let ledger = self.ledger.unwrap_or_default();
        let writer: Arc<dyn LedgerWriter> = ledger.clone();

        let lifecycle = RecordLifecycle {
            allocator: SequenceAllocator::new(
                Arc::clone(&counters),
                Arc::clone(&writer),
                self.config.number_start,
            ),
            binder: ContentBinder::new(
                self.authority,
                Arc::clone(&writer),
                self.config.timestamp.clone(),
                self.config.environment,
            ),
            renderer: self.renderer,
            validator: self.validator,
            records: Arc::clone(&records),
            archive: Arc::clone(&archive),
            ledger: writer,
            config: self.config,
        };

        Ok(Pipeline {
            lifecycle,
            ledger,
            counters,
            records,
            archive,
        })
    }
}
