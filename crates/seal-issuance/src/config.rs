use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::ConfigError;

/// Deployment environment. Unverified fallback proofs are refused in
/// production.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Environment {
    Production,
    #[default]
    Development,
}

/// What to do once every timestamp attempt has failed.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FallbackMode {
    /// Fail the issuance with `TimestampUnavailable`.
    #[default]
    Strict,
    /// Sign the digest locally and mark the proof `UnreachableFallback`.
    LocalUnverified,
}

/// Timestamp authority call policy.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct TimestampConfig {
    /// Bound on a single authority request.
    pub timeout_ms: u64,
    pub max_attempts: u32,
    pub initial_backoff_ms: u64,
    pub max_backoff_ms: u64,
    pub fallback: FallbackMode,
}

impl Default for TimestampConfig {
    fn default() -> Self {
        Self {
            timeout_ms: 10_000,
            max_attempts: 3,
            initial_backoff_ms: 200,
            max_backoff_ms: 5_000,
            fallback: FallbackMode::Strict,
        }
    }
}

impl TimestampConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }

    /// Whether an unreachable authority may be replaced by a local proof.
    pub fn allows_fallback(&self, environment: Environment) -> bool {
        self.fallback == FallbackMode::LocalUnverified && environment != Environment::Production
    }

    /// Delay before retrying after failed attempt `attempt` (1-based):
    /// doubles every attempt, capped at `max_backoff_ms`.
    pub fn backoff(&self, attempt: u32) -> Duration {
        let factor = 1u64 << attempt.saturating_sub(1).min(32);
        let millis = self
            .initial_backoff_ms
            .saturating_mul(factor)
            .min(self.max_backoff_ms);
        Duration::from_millis(millis)
    }
}

/// Configuration of the issuance pipeline.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct IssuanceConfig {
    pub environment: Environment,
    /// First value of a lazily created series counter.
    pub number_start: u64,
    /// Zero-padded width of formatted document numbers.
    pub number_width: usize,
    pub render_timeout_ms: u64,
    /// Render attempts before issuance fails with `RenderTimeout`; only
    /// timed-out attempts are retried, on the `timestamp` backoff schedule.
    pub render_max_attempts: u32,
    pub timestamp: TimestampConfig,
}

impl Default for IssuanceConfig {
    fn default() -> Self {
        Self {
            environment: Environment::Development,
            number_start: 1,
            number_width: 6,
            render_timeout_ms: 30_000,
            render_max_attempts: 2,
            timestamp: TimestampConfig::default(),
        }
    }
}

impl IssuanceConfig {
    /// Parse and validate a TOML document.
    pub fn from_toml_str(input: &str) -> Result<Self, ConfigError> {
        let config: Self = toml::from_str(input)?;
        config.validate()?;
        Ok(config)
    }

    /// Load and validate a TOML file.
    pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let input = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_toml_str(&input)
    }

    pub fn to_toml_string(&self) -> Result<String, ConfigError> {
        Ok(toml::to_string_pretty(self)?)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.environment == Environment::Production
            && self.timestamp.fallback == FallbackMode::LocalUnverified
        {
            return Err(ConfigError::Invalid(
                "local_unverified timestamp fallback is not allowed in production".into(),
            ));
        }
        if self.render_max_attempts == 0 {
            return Err(ConfigError::Invalid(
                "render_max_attempts must be at least 1".into(),
            ));
        }
        if self.timestamp.max_attempts == 0 {
            return Err(ConfigError::Invalid(
                "timestamp.max_attempts must be at least 1".into(),
            ));
        }
        if self.timestamp.timeout_ms == 0 || self.render_timeout_ms == 0 {
            return Err(ConfigError::Invalid("timeouts must be non-zero".into()));
        }
        if self.number_start == 0 {
            return Err(ConfigError::Invalid("number_start must be at least 1".into()));
        }
        if !(1..=18).contains(&self.number_width) {
            return Err(ConfigError::Invalid(format!(
                "number_width must be within 1..=18, got {}",
                self.number_width
            )));
        }
        Ok(())
    }

    pub fn render_timeout(&self) -> Duration {
        Duration::from_millis(self.render_timeout_ms)
    }
}
