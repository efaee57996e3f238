use seal_types::{Record, RecordId, RecordStatus, SeriesKey};

use crate::error::StoreResult;
use crate::model::{ArchiveMetadata, Locator, RecordFilter, SeriesCounter};

/// Write-once blob store for issued artifacts.
///
/// All implementations must satisfy these invariants:
/// - A `put` to a key that already holds a blob fails with
///   [`crate::StoreError::AlreadyExists`]; nothing is ever overwritten.
/// - `get` returns exactly the bytes that were put, verified against the
///   locator's digest.
/// - There is no delete.
pub trait ArchiveStore: Send + Sync {
    /// Durably store `bytes` under `key` and return a locator for them.
    fn put(&self, key: &str, bytes: &[u8], metadata: &ArchiveMetadata) -> StoreResult<Locator>;

    /// Read the blob a locator refers to.
    fn get(&self, locator: &Locator) -> StoreResult<Vec<u8>>;

    /// Check whether a key has been written.
    fn exists(&self, key: &str) -> StoreResult<bool>;

    /// Metadata stored with a key, if the key exists.
    fn metadata(&self, key: &str) -> StoreResult<Option<ArchiveMetadata>>;
}

/// Persistent series counters.
///
/// The store provides a single atomic primitive; allocation policy (start
/// value, retry on contention) lives in the allocator.
pub trait CounterStore: Send + Sync {
    /// Current state of a series, or `None` before its first allocation.
    fn load(&self, series: &SeriesKey) -> StoreResult<Option<SeriesCounter>>;

    /// Atomically set the series' `next_value` to `new` if it currently
    /// equals `expected` (`None`: the counter does not exist yet).
    ///
    /// Returns `Ok(false)` when another writer got there first. Returns `Ok(true)`
    /// only once the new value is durably persisted.
    fn compare_and_swap(
        &self,
        series: &SeriesKey,
        expected: Option<u64>,
        new: u64,
    ) -> StoreResult<bool>;

    /// Every counter, ordered by series key.
    fn counters(&self) -> StoreResult<Vec<SeriesCounter>>;
}

/// The record table.
pub trait RecordStore: Send + Sync {
    fn get(&self, record_id: &RecordId) -> StoreResult<Option<Record>>;

    /// Insert or replace a draft. Fails with
    /// [`crate::StoreError::ImmutabilityViolation`] if the stored record has
    /// already been issued.
    fn put_draft(&self, record: &Record) -> StoreResult<()>;

    /// Commit an issued record in one step.
    ///
    /// Fails without side effects if the stored version is already issued,
    /// if the sequence number is already bound, or if the record is a
    /// cancellation of an original that already has one.
    fn commit_issued(&self, record: &Record) -> StoreResult<()>;

    /// The compensating record issued for `original`, if any.
    fn cancellation_of(&self, original: &RecordId) -> StoreResult<Option<RecordId>>;

    /// Stored status, with `Cancelled` reported for issued records that a
    /// compensating record refers to.
    fn effective_status(&self, record_id: &RecordId) -> StoreResult<Option<RecordStatus>>;

    /// Records matching `filter`, ordered by series and sequence number;
    /// drafts last, by creation time.
    fn list(&self, filter: &RecordFilter) -> StoreResult<Vec<Record>>;

    /// Issued sequence numbers of a series, ascending.
    fn issued_numbers(&self, series: &SeriesKey) -> StoreResult<Vec<(u64, RecordId)>>;
}
