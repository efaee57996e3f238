use std::collections::BTreeMap;
use std::fmt;

use chrono::{DateTime, Datelike, Utc};
use seal_types::{ContentDigest, Record, RecordStatus, SeriesKey};
use serde::{Deserialize, Serialize};

/// Stable reference to an archived blob.
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Locator {
    pub key: String,
    pub digest: ContentDigest,
    pub size: u64,
}

impl Locator {
    pub fn new(key: impl Into<String>, digest: ContentDigest, size: u64) -> Self {
        Self {
            key: key.into(),
            digest,
            size,
        }
    }
}

impl fmt::Display for Locator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}#{}", self.key, self.digest.short_hex())
    }
}

/// Descriptive metadata stored next to an archived blob.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ArchiveMetadata {
    pub content_type: String,
    pub attributes: BTreeMap<String, String>,
}

impl ArchiveMetadata {
    pub fn new(content_type: impl Into<String>) -> Self {
        Self {
            content_type: content_type.into(),
            attributes: BTreeMap::new(),
        }
    }

    pub fn with(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.attributes.insert(key.into(), value.into());
        self
    }
}

/// Persisted allocation state of one series.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct SeriesCounter {
    pub series_key: SeriesKey,
    /// The value the next allocation will return.
    pub next_value: u64,
    pub updated_at: DateTime<Utc>,
}

/// Largest page a single `list` call returns.
pub const MAX_LIST_LIMIT: usize = 100;

/// Zero-padded width used to format document numbers for `query` matching
/// when the filter does not name one.
pub const DEFAULT_NUMBER_WIDTH: usize = 6;

/// Selection criteria for listing records.
///
/// Results are ordered by issue date, newest first, then by series and
/// number; `offset` and `limit` page through that order.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct RecordFilter {
    pub series_key: Option<SeriesKey>,
    /// Matched against the effective status, so `Cancelled` selects issued
    /// records that a compensating record refers to.
    pub status: Option<RecordStatus>,
    /// Calendar year of the content's issue date.
    pub issue_year: Option<i32>,
    /// Case-insensitive substring of the document number, buyer name or
    /// buyer tax id.
    pub query: Option<String>,
    pub number_width: Option<usize>,
    pub offset: usize,
    /// Capped at [`MAX_LIST_LIMIT`]; `None` returns every match.
    pub limit: Option<usize>,
}

impl RecordFilter {
    pub fn all() -> Self {
        Self::default()
    }

    pub fn series(mut self, key: SeriesKey) -> Self {
        self.series_key = Some(key);
        self
    }

    pub fn status(mut self, status: RecordStatus) -> Self {
        self.status = Some(status);
        self
    }

    pub fn issue_year(mut self, year: i32) -> Self {
        self.issue_year = Some(year);
        self
    }

    pub fn query(mut self, text: impl Into<String>) -> Self {
        self.query = Some(text.into());
        self
    }

    pub fn number_width(mut self, width: usize) -> Self {
        self.number_width = Some(width);
        self
    }

    /// Select page `page` (1-based) of `limit` records.
    pub fn page(mut self, page: usize, limit: usize) -> Self {
        let limit = limit.clamp(1, MAX_LIST_LIMIT);
        self.offset = page.saturating_sub(1).saturating_mul(limit);
        self.limit = Some(limit);
        self
    }

    /// Effective page size.
    pub fn page_size(&self) -> Option<usize> {
        self.limit.map(|limit| limit.clamp(1, MAX_LIST_LIMIT))
    }

    pub fn matches(&self, record: &Record, effective: RecordStatus) -> bool {
        self.series_key
            .as_ref()
            .map_or(true, |key| key == record.series_key())
            && self.status.map_or(true, |status| status == effective)
            && self
                .issue_year
                .map_or(true, |year| record.content().issue_date.year() == year)
            && self.query.as_deref().map_or(true, |q| self.matches_text(record, q))
    }

    fn matches_text(&self, record: &Record, query: &str) -> bool {
        let needle = query.trim().to_lowercase();
        if needle.is_empty() {
            return true;
        }
        let width = self.number_width.unwrap_or(DEFAULT_NUMBER_WIDTH);
        let buyer = &record.content().buyer;
        record
            .document_number(width)
            .into_iter()
            .chain(std::iter::once(buyer.name.clone()))
            .chain(buyer.tax_id.clone())
            .any(|haystack| haystack.to_lowercase().contains(&needle))
    }
}
