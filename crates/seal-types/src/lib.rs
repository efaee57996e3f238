//! Foundation types for sealed record issuance.
//!
//! This crate provides the identity, content, and integrity types shared by
//! every other `seal-*` crate.
//!
//! # Key Types
//!
//! - [`RecordId`] — UUID v7 record identifier
//! - [`SeriesKey`] — grouping under which document numbers are gapless
//! - [`ContentDigest`] — SHA-256 digest of a rendered artifact
//! - [`Record`] — a document moving from Draft to Issued
//! - [`RecordContent`] — caller-supplied semantic fields, frozen at issuance
//! - [`Proof`] — trusted-timestamp token bound to a content digest

pub mod content;
pub mod digest;
pub mod error;
pub mod identity;
pub mod proof;
pub mod record;

pub use content::{LineItem, LineTotals, Party, RecordContent, Totals};
pub use digest::ContentDigest;
pub use error::TypeError;
pub use identity::{Actor, RecordId, SeriesKey};
pub use proof::{Proof, TrustStatus};
pub use record::{IssuanceSeal, Record, RecordKind, RecordSnapshot, RecordStatus};
