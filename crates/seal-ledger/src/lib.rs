//! Append-only audit ledger for sealed record issuance.
//!
//! Every lifecycle transition and access event becomes an [`AuditEntry`]
//! whose hash covers its own fields and the hash of its predecessor. This
//! crate provides:
//! - [`AuditEntry`] / [`AuditAction`] with canonical hash payloads
//! - `LedgerWriter` / `LedgerReader` trait boundaries
//! - [`InMemoryLedger`] for tests and embedding
//! - Range chain verification that raises integrity alarms
//! - [`SeriesContinuity`] reports over counters, records and skipped numbers

pub mod continuity;
pub mod entry;
pub mod error;
pub mod memory;
pub mod traits;

pub use continuity::{ContinuityReport, SeriesContinuity};
pub use entry::{AuditAction, AuditEntry};
pub use error::LedgerError;
pub use memory::InMemoryLedger;
pub use traits::{LedgerReader, LedgerWriter};
