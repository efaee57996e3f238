use std::fmt;

use async_trait::async_trait;
use seal_types::{Party, Record, RecordKind, RecordSnapshot};
use serde::{Deserialize, Serialize};

// ---------------------------------------------------------------------------
// Renderer
// ---------------------------------------------------------------------------

/// Error reported by a renderer.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("{0}")]
pub struct RenderError(pub String);

/// Produces the artifact bytes of a numbered record.
///
/// Rendering the same snapshot twice must yield identical bytes; anything
/// wall-clock dependent belongs outside the artifact.
#[async_trait]
pub trait Renderer: Send + Sync {
    async fn render(&self, snapshot: &RecordSnapshot) -> Result<Vec<u8>, RenderError>;

    /// MIME type stored with the archived artifact.
    fn content_type(&self) -> &str {
        "application/octet-stream"
    }
}

/// Renders a snapshot as compact JSON in declaration order.
#[derive(Debug, Clone, Copy, Default)]
pub struct CanonicalJsonRenderer;

#[async_trait]
impl Renderer for CanonicalJsonRenderer {
    async fn render(&self, snapshot: &RecordSnapshot) -> Result<Vec<u8>, RenderError> {
        serde_json::to_vec(snapshot).map_err(|e| RenderError(e.to_string()))
    }

    fn content_type(&self) -> &str {
        "application/json"
    }
}

// ---------------------------------------------------------------------------
// Validator
// ---------------------------------------------------------------------------

/// A single rejected field.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FieldError {
    pub field: String,
    pub message: String,
}

impl FieldError {
    pub fn new(field: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            field: field.into(),
            message: message.into(),
        }
    }
}

impl fmt::Display for FieldError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.field, self.message)
    }
}

/// Checks a draft before any number is allocated for it.
pub trait Validator: Send + Sync {
    fn validate(&self, record: &Record) -> Result<(), Vec<FieldError>>;
}

/// Mandatory-field rules for invoices and their cancellations.
#[derive(Debug, Clone, Copy, Default)]
pub struct RequiredFieldsValidator;

impl Validator for RequiredFieldsValidator {
    fn validate(&self, record: &Record) -> Result<(), Vec<FieldError>> {
        let content = record.content();
        let mut errors = Vec::new();

        check_party(&mut errors, "seller", &content.seller);
        check_party(&mut errors, "buyer", &content.buyer);
        if content
            .seller
            .tax_id
            .as_deref()
            .map_or(true, |id| id.trim().is_empty())
        {
            errors.push(FieldError::new("seller.tax_id", "must not be empty"));
        }

        if !is_code(&content.currency, 3) {
            errors.push(FieldError::new("currency", "must be a three-letter code"));
        }
        if content.tax_exempt
            && content
                .tax_exempt_reason
                .as_deref()
                .map_or(true, |reason| reason.trim().is_empty())
        {
            errors.push(FieldError::new(
                "tax_exempt_reason",
                "required when the record is tax exempt",
            ));
        }
        if let (Some(start), Some(end)) = (content.delivery_start, content.delivery_end) {
            if end < start {
                errors.push(FieldError::new("delivery_end", "must not precede delivery_start"));
            }
        }

        if content.line_items.is_empty() {
            errors.push(FieldError::new("line_items", "at least one line item is required"));
        }
        let cancellation = matches!(record.kind(), RecordKind::Cancellation { .. });
        for (i, item) in content.line_items.iter().enumerate() {
            let field = |name: &str| format!("line_items[{i}].{name}");
            if item.description.trim().is_empty() {
                errors.push(FieldError::new(field("description"), "must not be empty"));
            }
            match (cancellation, item.quantity) {
                (false, q) if q <= 0 => {
                    errors.push(FieldError::new(field("quantity"), "must be positive"))
                }
                (true, q) if q >= 0 => errors.push(FieldError::new(
                    field("quantity"),
                    "must be negative on a cancellation",
                )),
                _ => {}
            }
            if item.unit_price < 0 {
                errors.push(FieldError::new(field("unit_price"), "must not be negative"));
            }
            if item.tax_rate_bp > 10_000 {
                errors.push(FieldError::new(field("tax_rate_bp"), "must be at most 10000"));
            } else if item.totals().is_none() {
                errors.push(FieldError::new(
                    field("unit_price"),
                    "quantity times unit price is out of range",
                ));
            }
        }
        if errors.is_empty() && content.totals().is_err() {
            errors.push(FieldError::new("line_items", "document totals are out of range"));
        }

        if errors.is_empty() {
            Ok(())
        } else {
            Err(errors)
        }
    }
}

fn check_party(errors: &mut Vec<FieldError>, role: &str, party: &Party) {
    for (name, value) in [
        ("name", &party.name),
        ("street", &party.street),
        ("zip", &party.zip),
        ("city", &party.city),
    ] {
        if value.trim().is_empty() {
            errors.push(FieldError::new(format!("{role}.{name}"), "must not be empty"));
        }
    }
    if !is_code(&party.country, 2) {
        errors.push(FieldError::new(
            format!("{role}.country"),
            "must be a two-letter code",
        ));
    }
}

fn is_code(value: &str, len: usize) -> bool {
    value.len() == len && value.chars().all(|c| c.is_ascii_uppercase())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::sample_content;
    use chrono::NaiveDate;
    use seal_types::{Actor, SeriesKey};

    fn draft() -> Record {
        Record::draft(
            SeriesKey::new("RE2025").unwrap(),
            sample_content(),
            Actor::new("alice"),
        )
    }

    fn fields(record: &Record) -> Vec<String> {
        RequiredFieldsValidator
            .validate(record)
            .unwrap_err()
            .into_iter()
            .map(|e| e.field)
            .collect()
    }

    #[test]
    fn complete_draft_passes() {
        RequiredFieldsValidator.validate(&draft()).unwrap();
    }

    #[test]
    fn missing_party_fields_are_reported() {
        let mut content = sample_content();
        content.seller.name = " ".into();
        content.seller.tax_id = None;
        content.buyer.country = "Germany".into();
        let mut record = draft();
        record.amend(content).unwrap();

        assert_eq!(
            fields(&record),
            vec!["seller.name", "buyer.country", "seller.tax_id"]
        );
    }

    #[test]
    fn line_items_are_checked() {
        let mut content = sample_content();
        content.line_items[0].quantity = 0;
        content.line_items[1].tax_rate_bp = 12_000;
        let mut record = draft();
        record.amend(content).unwrap();

        assert_eq!(
            fields(&record),
            vec!["line_items[0].quantity", "line_items[1].tax_rate_bp"]
        );

        let mut content = sample_content();
        content.line_items.clear();
        record.amend(content).unwrap();
        assert_eq!(fields(&record), vec!["line_items"]);
    }

    #[test]
    fn overflowing_amounts_are_rejected() {
        let mut content = sample_content();
        content.line_items[0].quantity = 1;
        content.line_items[0].unit_price = i64::MAX;
        content.line_items[1].quantity = 4_000_000_000;
        content.line_items[1].unit_price = 3_000_000_000;
        let mut record = draft();
        record.amend(content).unwrap();
        assert_eq!(
            fields(&record),
            vec!["line_items[0].unit_price", "line_items[1].unit_price"]
        );

        let mut content = sample_content();
        for item in &mut content.line_items {
            item.quantity = 1;
            item.unit_price = i64::MAX / 2;
            item.tax_rate_bp = 0;
        }
        content.line_items.push(content.line_items[0].clone());
        record.amend(content).unwrap();
        assert_eq!(fields(&record), vec!["line_items"]);
    }

    #[test]
    fn tax_exempt_needs_reason() {
        let mut content = sample_content();
        content.tax_exempt = true;
        let mut record = draft();
        record.amend(content).unwrap();
        assert_eq!(fields(&record), vec!["tax_exempt_reason"]);
    }

    #[test]
    fn cancellation_requires_negative_quantities() {
        let original = draft();
        let cancellation = Record::compensating(
            &original,
            NaiveDate::from_ymd_opt(2025, 4, 1).unwrap(),
            "wrong buyer",
            Actor::new("alice"),
        );
        RequiredFieldsValidator.validate(&cancellation).unwrap();

        let mut positive = cancellation.clone();
        positive.amend(sample_content()).unwrap();
        assert_eq!(
            fields(&positive),
            vec!["line_items[0].quantity", "line_items[1].quantity"]
        );
    }

    #[tokio::test]
    async fn json_rendering_is_deterministic() {
        let snapshot = draft().snapshot(7, 6).unwrap();
        let a = CanonicalJsonRenderer.render(&snapshot).await.unwrap();
        let b = CanonicalJsonRenderer.render(&snapshot).await.unwrap();
        assert_eq!(a, b);
        let text = String::from_utf8(a).unwrap();
        assert!(text.contains("\"document_number\":\"RE2025000007\""));
        assert_eq!(CanonicalJsonRenderer.content_type(), "application/json");
    }
}
