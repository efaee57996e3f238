//! Storage boundaries for sealed record issuance.
//!
//! Three logical tables back the issuance pipeline:
//!
//! - [`ArchiveStore`] -- write-once blobs (rendered artifacts, proof tokens)
//! - [`CounterStore`] -- one [`SeriesCounter`] per series key
//! - [`RecordStore`] -- records keyed by id, with an atomic issuance commit
//!
//! # Storage Backends
//!
//! - [`InMemoryArchiveStore`], [`InMemoryCounterStore`], [`InMemoryRecordStore`]
//!   -- lock-guarded maps for tests and embedding
//! - [`FsArchiveStore`] -- one file per key under a root directory
//!
//! # Design Rules
//!
//! 1. Archive keys are written once. A second `put` to the same key fails.
//! 2. Counters only move forward and are never deleted.
//! 3. An issued record is never replaced; readers see Draft or Issued, never
//!    a partially issued record.
//! 4. All I/O errors are propagated, never silently ignored.

pub mod error;
pub mod fs;
pub mod memory;
pub mod model;
pub mod traits;

pub use error::{StoreError, StoreResult};
pub use fs::FsArchiveStore;
pub use memory::{InMemoryArchiveStore, InMemoryCounterStore, InMemoryRecordStore};
pub use model::{
    ArchiveMetadata, Locator, RecordFilter, SeriesCounter, DEFAULT_NUMBER_WIDTH, MAX_LIST_LIMIT,
};
pub use traits::{ArchiveStore, CounterStore, RecordStore};
