use std::collections::{BTreeMap, HashMap};
use std::sync::{Arc, Mutex, RwLock};

use chrono::Utc;
use seal_crypto::ContentHasher;
use seal_types::{Record, RecordId, RecordStatus, SeriesKey};
use tracing::debug;

use crate::error::{StoreError, StoreResult};
use crate::model::{ArchiveMetadata, Locator, RecordFilter, SeriesCounter};
use crate::traits::{ArchiveStore, CounterStore, RecordStore};

// ---------------------------------------------------------------------------
// Archive
// ---------------------------------------------------------------------------

struct ArchivedBlob {
    bytes: Vec<u8>,
    metadata: ArchiveMetadata,
}

/// In-memory, write-once blob store.
pub struct InMemoryArchiveStore {
    blobs: RwLock<HashMap<String, ArchivedBlob>>,
}

impl InMemoryArchiveStore {
    pub fn new() -> Self {
        Self {
            blobs: RwLock::new(HashMap::new()),
        }
    }

    /// Number of stored blobs.
    pub fn len(&self) -> StoreResult<usize> {
        Ok(self
            .blobs
            .read()
            .map_err(|_| StoreError::LockPoisoned("archive"))?
            .len())
    }

    pub fn is_empty(&self) -> StoreResult<bool> {
        Ok(self.len()? == 0)
    }

    /// Every stored key, sorted.
    pub fn keys(&self) -> StoreResult<Vec<String>> {
        let blobs = self
            .blobs
            .read()
            .map_err(|_| StoreError::LockPoisoned("archive"))?;
        let mut keys: Vec<String> = blobs.keys().cloned().collect();
        keys.sort();
        Ok(keys)
    }
}

impl Default for InMemoryArchiveStore {
    fn default() -> Self {
        Self::new()
    }
}

impl ArchiveStore for InMemoryArchiveStore {
    fn put(&self, key: &str, bytes: &[u8], metadata: &ArchiveMetadata) -> StoreResult<Locator> {
        validate_key(key)?;
        let digest = ContentHasher::ARTIFACT.hash(bytes);
        let mut blobs = self
            .blobs
            .write()
            .map_err(|_| StoreError::LockPoisoned("archive"))?;
        if blobs.contains_key(key) {
            return Err(StoreError::AlreadyExists(key.to_string()));
        }
        blobs.insert(
            key.to_string(),
            ArchivedBlob {
                bytes: bytes.to_vec(),
                metadata: metadata.clone(),
            },
        );
        debug!(key, digest = %digest.short_hex(), "archived blob");
        Ok(Locator::new(key, digest, bytes.len() as u64))
    }

    fn get(&self, locator: &Locator) -> StoreResult<Vec<u8>> {
        let blobs = self
            .blobs
            .read()
            .map_err(|_| StoreError::LockPoisoned("archive"))?;
        let blob = blobs
            .get(&locator.key)
            .ok_or_else(|| StoreError::NotFound(locator.key.clone()))?;
        verify_blob(locator, &blob.bytes)?;
        Ok(blob.bytes.clone())
    }

    fn exists(&self, key: &str) -> StoreResult<bool> {
        Ok(self
            .blobs
            .read()
            .map_err(|_| StoreError::LockPoisoned("archive"))?
            .contains_key(key))
    }

    fn metadata(&self, key: &str) -> StoreResult<Option<ArchiveMetadata>> {
        Ok(self
            .blobs
            .read()
            .map_err(|_| StoreError::LockPoisoned("archive"))?
            .get(key)
            .map(|blob| blob.metadata.clone()))
    }
}

impl std::fmt::Debug for InMemoryArchiveStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let count = self.len().unwrap_or_default();
        f.debug_struct("InMemoryArchiveStore")
            .field("blob_count", &count)
            .finish()
    }
}

/// Archive keys are relative, `/`-separated paths without `.` or `..` parts.
pub(crate) fn validate_key(key: &str) -> StoreResult<()> {
    let valid = !key.is_empty()
        && !key.starts_with('/')
        && key
            .split('/')
            .all(|part| !part.is_empty() && part != "." && part != "..")
        && key
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || matches!(c, '/' | '-' | '_' | '.'));
    if valid {
        Ok(())
    } else {
        Err(StoreError::InvalidKey(key.to_string()))
    }
}

pub(crate) fn verify_blob(locator: &Locator, bytes: &[u8]) -> StoreResult<()> {
    let computed = ContentHasher::ARTIFACT.hash(bytes);
    if computed != locator.digest {
        return Err(StoreError::HashMismatch {
            key: locator.key.clone(),
            expected: locator.digest.to_hex(),
            computed: computed.to_hex(),
        });
    }
    Ok(())
}

// ---------------------------------------------------------------------------
// Counters
// ---------------------------------------------------------------------------

/// In-memory series counters.
///
/// Each series has its own mutex, so compare-and-swap on one series never
/// waits for another.
pub struct InMemoryCounterStore {
    counters: RwLock<HashMap<SeriesKey, Arc<Mutex<SeriesCounter>>>>,
}

impl InMemoryCounterStore {
    pub fn new() -> Self {
        Self {
            counters: RwLock::new(HashMap::new()),
        }
    }

    fn slot(&self, series: &SeriesKey) -> StoreResult<Option<Arc<Mutex<SeriesCounter>>>> {
        Ok(self
            .counters
            .read()
            .map_err(|_| StoreError::LockPoisoned("counter table"))?
            .get(series)
            .cloned())
    }
}

impl Default for InMemoryCounterStore {
    fn default() -> Self {
        Self::new()
    }
}

impl CounterStore for InMemoryCounterStore {
    fn load(&self, series: &SeriesKey) -> StoreResult<Option<SeriesCounter>> {
        let Some(slot) = self.slot(series)? else {
            return Ok(None);
        };
        let counter = slot
            .lock()
            .map_err(|_| StoreError::LockPoisoned("series counter"))?;
        Ok(Some(counter.clone()))
    }

    fn compare_and_swap(
        &self,
        series: &SeriesKey,
        expected: Option<u64>,
        new: u64,
    ) -> StoreResult<bool> {
        if expected.map_or(new == 0, |current| new <= current) {
            return Err(StoreError::NonMonotonic {
                series: series.clone(),
                current: expected,
                proposed: new,
            });
        }

        match expected {
            None => {
                let mut table = self
                    .counters
                    .write()
                    .map_err(|_| StoreError::LockPoisoned("counter table"))?;
                if table.contains_key(series) {
                    return Ok(false);
                }
                table.insert(
                    series.clone(),
                    Arc::new(Mutex::new(SeriesCounter {
                        series_key: series.clone(),
                        next_value: new,
                        updated_at: Utc::now(),
                    })),
                );
                Ok(true)
            }
            Some(current) => {
                let Some(slot) = self.slot(series)? else {
                    return Ok(false);
                };
                let mut counter = slot
                    .lock()
                    .map_err(|_| StoreError::LockPoisoned("series counter"))?;
                if counter.next_value != current {
                    return Ok(false);
                }
                counter.next_value = new;
                counter.updated_at = Utc::now();
                Ok(true)
            }
        }
    }

    fn counters(&self) -> StoreResult<Vec<SeriesCounter>> {
        let slots: Vec<_> = self
            .counters
            .read()
            .map_err(|_| StoreError::LockPoisoned("counter table"))?
            .values()
            .cloned()
            .collect();
        let mut counters = slots
            .iter()
            .map(|slot| {
                slot.lock()
                    .map(|c| c.clone())
                    .map_err(|_| StoreError::LockPoisoned("series counter"))
            })
            .collect::<StoreResult<Vec<_>>>()?;
        counters.sort_by(|a, b| a.series_key.cmp(&b.series_key));
        Ok(counters)
    }
}

// ---------------------------------------------------------------------------
// Records
// ---------------------------------------------------------------------------

#[derive(Default)]
struct RecordTable {
    records: HashMap<RecordId, Record>,
    numbers: BTreeMap<(SeriesKey, u64), RecordId>,
    cancellations: HashMap<RecordId, RecordId>,
}

impl RecordTable {
    fn effective_status(&self, record: &Record) -> RecordStatus {
        if record.status() == RecordStatus::Issued
            && self.cancellations.contains_key(record.record_id())
        {
            RecordStatus::Cancelled
        } else {
            record.status()
        }
    }
}

/// In-memory record table. Every write happens under one write lock, so
/// readers observe a record either entirely before or entirely after its
/// issuance commit.
pub struct InMemoryRecordStore {
    table: RwLock<RecordTable>,
}

impl InMemoryRecordStore {
    pub fn new() -> Self {
        Self {
            table: RwLock::new(RecordTable::default()),
        }
    }
}

impl Default for InMemoryRecordStore {
    fn default() -> Self {
        Self::new()
    }
}

impl RecordStore for InMemoryRecordStore {
    fn get(&self, record_id: &RecordId) -> StoreResult<Option<Record>> {
        Ok(self
            .table
            .read()
            .map_err(|_| StoreError::LockPoisoned("record table"))?
            .records
            .get(record_id)
            .cloned())
    }

    fn put_draft(&self, record: &Record) -> StoreResult<()> {
        if !record.is_draft() {
            return Err(StoreError::InvalidRecord {
                record_id: record.record_id().clone(),
                reason: format!("put_draft called with a {} record", record.status()),
            });
        }
        let mut table = self
            .table
            .write()
            .map_err(|_| StoreError::LockPoisoned("record table"))?;
        if let Some(existing) = table.records.get(record.record_id()) {
            if !existing.is_draft() {
                return Err(StoreError::ImmutabilityViolation {
                    record_id: record.record_id().clone(),
                    status: table.effective_status(existing),
                });
            }
        }
        table
            .records
            .insert(record.record_id().clone(), record.clone());
        Ok(())
    }

    fn commit_issued(&self, record: &Record) -> StoreResult<()> {
        let record_id = record.record_id();
        let number = match (record.status(), record.sequence_number()) {
            (RecordStatus::Issued, Some(number)) => number,
            _ => {
                return Err(StoreError::InvalidRecord {
                    record_id: record_id.clone(),
                    reason: "commit_issued requires an issued, numbered record".into(),
                })
            }
        };

        let mut table = self
            .table
            .write()
            .map_err(|_| StoreError::LockPoisoned("record table"))?;

        if let Some(existing) = table.records.get(record_id) {
            if !existing.is_draft() {
                return Err(StoreError::ImmutabilityViolation {
                    record_id: record_id.clone(),
                    status: table.effective_status(existing),
                });
            }
        }

        let number_key = (record.series_key().clone(), number);
        if table.numbers.contains_key(&number_key) {
            return Err(StoreError::DuplicateNumber {
                series: record.series_key().clone(),
                number,
            });
        }

        if let Some(original) = record.supersedes() {
            if let Some(by) = table.cancellations.get(original) {
                return Err(StoreError::AlreadyCancelled {
                    original: original.clone(),
                    by: by.clone(),
                });
            }
            table
                .cancellations
                .insert(original.clone(), record_id.clone());
        }

        table.numbers.insert(number_key, record_id.clone());
        table.records.insert(record_id.clone(), record.clone());
        Ok(())
    }

    fn cancellation_of(&self, original: &RecordId) -> StoreResult<Option<RecordId>> {
        Ok(self
            .table
            .read()
            .map_err(|_| StoreError::LockPoisoned("record table"))?
            .cancellations
            .get(original)
            .cloned())
    }

    fn effective_status(&self, record_id: &RecordId) -> StoreResult<Option<RecordStatus>> {
        let table = self
            .table
            .read()
            .map_err(|_| StoreError::LockPoisoned("record table"))?;
        Ok(table
            .records
            .get(record_id)
            .map(|record| table.effective_status(record)))
    }

    fn list(&self, filter: &RecordFilter) -> StoreResult<Vec<Record>> {
        let table = self
            .table
            .read()
            .map_err(|_| StoreError::LockPoisoned("record table"))?;
        let mut records: Vec<Record> = table
            .records
            .values()
            .filter(|record| filter.matches(record, table.effective_status(record)))
            .cloned()
            .collect();
        records.sort_by(|a, b| {
            b.content()
                .issue_date
                .cmp(&a.content().issue_date)
                .then(a.series_key().cmp(b.series_key()))
                .then(a.sequence_number().is_none().cmp(&b.sequence_number().is_none()))
                .then(a.sequence_number().cmp(&b.sequence_number()))
                .then(a.created_at().cmp(&b.created_at()))
        });
        let page = records.into_iter().skip(filter.offset);
        Ok(match filter.page_size() {
            Some(limit) => page.take(limit).collect(),
            None => page.collect(),
        })
    }

    fn issued_numbers(&self, series: &SeriesKey) -> StoreResult<Vec<(u64, RecordId)>> {
        let table = self
            .table
            .read()
            .map_err(|_| StoreError::LockPoisoned("record table"))?;
        Ok(table
            .numbers
            .iter()
            .filter(|((key, _), _)| key == series)
            .map(|((_, number), id)| (*number, id.clone()))
            .collect())
    }
}
