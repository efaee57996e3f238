use std::fmt;

use serde::{Deserialize, Serialize};

use crate::error::TypeError;

/// Unique identifier for a record (UUID v7 for time-ordering).
#[derive(Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct RecordId(uuid::Uuid);

impl RecordId {
    /// Generate a new time-ordered record ID.
    pub fn new() -> Self {
        Self(uuid::Uuid::now_v7())
    }

    /// Create from an existing UUID.
    pub fn from_uuid(uuid: uuid::Uuid) -> Self {
        Self(uuid)
    }

    /// The underlying UUID.
    pub fn as_uuid(&self) -> &uuid::Uuid {
        &self.0
    }

    /// Short representation (first 8 characters of the UUID).
    pub fn short_id(&self) -> String {
        self.0.to_string()[..8].to_string()
    }
}

impl Default for RecordId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for RecordId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "RecordId({})", self.short_id())
    }
}

impl fmt::Display for RecordId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// The grouping (e.g. year + prefix, `RE2025`) under which numbers are gapless.
///
/// Keys are restricted to ASCII alphanumerics, `-` and `_` so they can be used
/// verbatim as archive path segments.
#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct SeriesKey(String);

impl SeriesKey {
    pub const MAX_LEN: usize = 32;

    pub fn new(key: impl Into<String>) -> Result<Self, TypeError> {
        let key = key.into();
        let valid = !key.is_empty()
            && key.len() <= Self::MAX_LEN
            && key
                .chars()
                .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_');
        if !valid {
            return Err(TypeError::InvalidSeriesKey(key));
        }
        Ok(Self(key))
    }

    /// Series key for a yearly prefix, e.g. `("RE", 2025)` → `RE2025`.
    pub fn yearly(prefix: &str, year: i32) -> Result<Self, TypeError> {
        Self::new(format!("{prefix}{year}"))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Human-facing document number, zero padded to `width` digits.
    pub fn document_number(&self, sequence_number: u64, width: usize) -> String {
        format!("{}{:0width$}", self.0, sequence_number, width = width)
    }
}

impl fmt::Display for SeriesKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl TryFrom<String> for SeriesKey {
    type Error = TypeError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::new(value)
    }
}

impl From<SeriesKey> for String {
    fn from(key: SeriesKey) -> Self {
        key.0
    }
}

/// The principal on whose behalf an operation runs (user name, service name).
#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct Actor(String);

impl Actor {
    pub fn new(name: impl Into<String>) -> Self {
        Self(name.into())
    }

    /// The actor used for events the pipeline raises on its own behalf.
    pub fn system() -> Self {
        Self("system".into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for Actor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for Actor {
    fn from(name: &str) -> Self {
        Self::new(name)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn record_ids_are_unique_and_time_ordered() {
        let a = RecordId::new();
        let b = RecordId::new();
        assert_ne!(a, b);
        assert!(a < b);
    }

    #[test]
    fn short_id_is_8_chars() {
        assert_eq!(RecordId::new().short_id().len(), 8);
    }

    #[test]
    fn series_key_validation() {
        assert!(SeriesKey::new("RE2025").is_ok());
        assert!(SeriesKey::new("GS-2025_b").is_ok());
        assert!(SeriesKey::new("").is_err());
        assert!(SeriesKey::new("RE/2025").is_err());
        assert!(SeriesKey::new("x".repeat(33)).is_err());
    }

    #[test]
    fn yearly_series_key() {
        let key = SeriesKey::yearly("RE", 2025).unwrap();
        assert_eq!(key.as_str(), "RE2025");
    }

    #[test]
    fn document_number_is_zero_padded() {
        let key = SeriesKey::new("RE2025").unwrap();
        assert_eq!(key.document_number(42, 6), "RE2025000042");
        assert_eq!(key.document_number(1_234_567, 6), "RE20251234567");
    }

    #[test]
    fn series_key_serde_rejects_invalid() {
        let parsed: Result<SeriesKey, _> = serde_json::from_str("\"bad key\"");
        assert!(parsed.is_err());
        let parsed: SeriesKey = serde_json::from_str("\"RE2025\"").unwrap();
        assert_eq!(parsed.as_str(), "RE2025");
    }
}
