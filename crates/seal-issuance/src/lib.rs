//! Sealed record issuance.
//!
//! Turns drafts into immutable, gaplessly numbered, timestamp-bound records:
//!
//! - [`SequenceAllocator`] — per-series numbers via compare-and-swap,
//!   with explicit voiding of abandoned numbers
//! - [`ContentBinder`] — SHA-256 of the rendered artifact plus a proof from
//!   a [`TimestampAuthority`], retried with bounded exponential backoff
//! - [`RecordLifecycle`] — the Draft → Issued state machine, cancellation by
//!   compensating records, verification and export
//! - [`Pipeline`] — wires the above to stores and an audit ledger
//!
//! # Issuance Flow
//!
//! ```text
//! validate → allocate → render → bind → archive → commit → audit
//!               │                                   │
//!               └──── failure or abandonment ───────┴─→ NumberSkipped
//! ```
//!
//! Every step that changes state appends to the audit ledger before it
//! returns. Integrity alarms (`DigestMismatch`, `ChainIntegrityFailure`) are
//! logged on the `seal::alarm` target and never repaired.

pub mod allocator;
pub mod authority;
pub mod binder;
pub mod collaborators;
pub mod config;
pub mod error;
pub mod export;
pub mod lifecycle;
pub mod pipeline;

pub use allocator::{PendingNumber, SequenceAllocator};
pub use authority::{
    AuthorityError, LocalAuthority, LocalTimestamp, TimestampAuthority, TimestampToken,
    UnreachableAuthority,
};
pub use binder::ContentBinder;
pub use collaborators::{
    CanonicalJsonRenderer, FieldError, RenderError, Renderer, RequiredFieldsValidator, Validator,
};
pub use config::{Environment, FallbackMode, IssuanceConfig, TimestampConfig};
pub use error::{ConfigError, IssuanceError, IssuanceResult};
pub use export::{ExportBundle, ExportManifest, ProofSummary};
pub use lifecycle::RecordLifecycle;
pub use pipeline::{Pipeline, PipelineBuilder};
