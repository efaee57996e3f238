#![allow(dead_code)]

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chrono::NaiveDate;
use seal_issuance::{
    IssuanceConfig, LocalAuthority, Pipeline, RenderError, Renderer, TimestampAuthority,
};
use seal_store::{CounterStore, SeriesCounter, StoreError, StoreResult};
use seal_types::{LineItem, Party, RecordContent, RecordSnapshot, SeriesKey};

pub fn series() -> SeriesKey {
    SeriesKey::new("RE2025").unwrap()
}

pub fn party(name: &str, tax_id: Option<&str>) -> Party {
    Party {
        name: name.into(),
        street: "Musterstraße 1".into(),
        zip: "10115".into(),
        city: "Berlin".into(),
        country: "DE".into(),
        tax_id: tax_id.map(Into::into),
        email: None,
        phone: None,
    }
}

pub fn content(description: &str) -> RecordContent {
    RecordContent {
        issue_date: NaiveDate::from_ymd_opt(2025, 6, 30).unwrap(),
        delivery_start: NaiveDate::from_ymd_opt(2025, 6, 1),
        delivery_end: NaiveDate::from_ymd_opt(2025, 6, 30),
        seller: party("Muster GmbH", Some("DE123456789")),
        buyer: party("Beispiel AG", None),
        currency: "EUR".into(),
        line_items: vec![LineItem {
            description: description.into(),
            quantity: 2,
            unit: "pc".into(),
            unit_price: 25_000,
            tax_rate_bp: 1900,
        }],
        tax_exempt: false,
        tax_exempt_reason: None,
        notes: None,
        payment_terms: None,
    }
}

/// Default pipeline against a local authority.
pub fn pipeline() -> Pipeline {
    pipeline_with(IssuanceConfig::default(), Arc::new(LocalAuthority::generate()))
}

pub fn pipeline_with(config: IssuanceConfig, authority: Arc<dyn TimestampAuthority>) -> Pipeline {
    Pipeline::builder(config, authority).build().unwrap()
}

/// Timestamp settings that fail fast.
pub fn fast_config() -> IssuanceConfig {
    let mut config = IssuanceConfig::default();
    config.timestamp.timeout_ms = 50;
    config.timestamp.max_attempts = 2;
    config.timestamp.initial_backoff_ms = 1;
    config.timestamp.max_backoff_ms = 2;
    config
}

/// Renderer that takes a while, so callers can be abandoned mid-flight.
pub struct SlowRenderer(pub Duration);

#[async_trait]
impl Renderer for SlowRenderer {
    async fn render(&self, snapshot: &RecordSnapshot) -> Result<Vec<u8>, RenderError> {
        tokio::time::sleep(self.0).await;
        serde_json::to_vec(snapshot).map_err(|e| RenderError(e.to_string()))
    }
}

/// Counter store whose writes never persist.
pub struct UnavailableCounters;

impl CounterStore for UnavailableCounters {
    fn load(&self, _series: &SeriesKey) -> StoreResult<Option<SeriesCounter>> {
        Ok(None)
    }

    fn compare_and_swap(
        &self,
        _series: &SeriesKey,
        _expected: Option<u64>,
        _new: u64,
    ) -> StoreResult<bool> {
        Err(StoreError::Unavailable("fsync failed".into()))
    }

    fn counters(&self) -> StoreResult<Vec<SeriesCounter>> {
        Ok(Vec::new())
    }
}
