//! Configuration loading and management.

use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;

use crate::error::{BenchError, Result};
use crate::executor::{ExpectedStatus, RetryPolicy};

/// Resolved benchmark configuration, loaded from YAML or assembled from CLI flags.
///
/// Immutable for the lifetime of a run; every batch derives its own pool size,
/// request total and failure threshold from it.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BenchConfig {
    pub base_url: String,
    /// Number of pooled clients, which is also the concurrency level.
    pub pool_size: usize,
    pub requests_per_client: u64,
    pub max_failures_per_client: u64,
    #[serde(default)]
    pub retry: RetryConfig,
    #[serde(default = "default_request_timeout_secs")]
    pub request_timeout_secs: u64,
    /// Exact status to accept; any 2xx when absent.
    #[serde(default)]
    pub expected_status: Option<u16>,
    #[serde(default)]
    pub unexpected_status: UnexpectedStatusPolicy,
    /// Cooldown before a geo-workload client goes back to the pool.
    #[serde(default = "default_geo_release_delay_ms")]
    pub geo_release_delay_ms: u64,
    /// Sub-requests issued per logical client-request by the image workload.
    #[serde(default = "default_image_expansion")]
    pub image_expansion: u64,
    #[serde(default = "default_max_idle_per_host")]
    pub max_idle_per_host: usize,
    #[serde(default)]
    pub seed: Option<u64>, // Optional RNG seed for reproducible geo workloads
}

/// Constant-backoff retry settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RetryConfig {
    /// Retries after the first attempt
    pub max_retries: u32,
    pub delay_ms: u64,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_retries: 5,
            delay_ms: 50,
        }
    }
}

/// What a response with an unaccepted status does to the batch.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum UnexpectedStatusPolicy {
    /// Abort the whole batch on the first unexpected status
    #[default]
    Fatal,
    /// Count it like an exhausted retry and keep going
    Count,
}

fn default_request_timeout_secs() -> u64 {
    5
}

fn default_geo_release_delay_ms() -> u64 {
    100
}

fn default_image_expansion() -> u64 {
    32
}

fn default_max_idle_per_host() -> usize {
    100
}

/// Command-line or environment values layered over a config file.
#[derive(Debug, Clone, Default)]
pub struct ConfigOverrides {
    pub base_url: Option<String>,
    pub pool_size: Option<usize>,
    pub requests_per_client: Option<u64>,
    pub max_failures_per_client: Option<u64>,
    pub seed: Option<u64>,
}

impl BenchConfig {
    /// Build a configuration from the four required scalars, using defaults for every policy knob.
    pub fn new(
        base_url: impl Into<String>,
        pool_size: usize,
        requests_per_client: u64,
        max_failures_per_client: u64,
    ) -> Self {
        Self {
            base_url: base_url.into(),
            pool_size,
            requests_per_client,
            max_failures_per_client,
            retry: RetryConfig::default(),
            request_timeout_secs: default_request_timeout_secs(),
            expected_status: None,
            unexpected_status: UnexpectedStatusPolicy::default(),
            geo_release_delay_ms: default_geo_release_delay_ms(),
            image_expansion: default_image_expansion(),
            max_idle_per_host: default_max_idle_per_host(),
            seed: None,
        }
    }

    /// Load configuration from YAML file.
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        let content = std::fs::read_to_string(path)?;
        let config: BenchConfig = serde_yaml::from_str(&content)?;
        Ok(config)
    }

    /// Resolve a configuration from an optional file plus overrides.
    ///
    /// Without a file every one of the four required values must come from the overrides.
    pub fn resolve(path: Option<&Path>, overrides: ConfigOverrides) -> Result<Self> {
        let mut config = match path {
            Some(path) => Self::from_file(path)?,
            None => {
                let missing = |name: &str| {
                    BenchError::InvalidConfig(format!("{} is required without a config file", name))
                };
                Self::new(
                    overrides.base_url.clone().ok_or_else(|| missing("base URL"))?,
                    overrides.pool_size.ok_or_else(|| missing("pool size"))?,
                    overrides
                        .requests_per_client
                        .ok_or_else(|| missing("requests per client"))?,
                    overrides
                        .max_failures_per_client
                        .ok_or_else(|| missing("max failures per client"))?,
                )
            }
        };
        config.apply(overrides);
        config.validate()?;
        Ok(config)
    }

    fn apply(&mut self, overrides: ConfigOverrides) {
        if let Some(url) = overrides.base_url {
            self.base_url = url;
        }
        if let Some(p) = overrides.pool_size {
            self.pool_size = p;
        }
        if let Some(r) = overrides.requests_per_client {
            self.requests_per_client = r;
        }
        if let Some(f) = overrides.max_failures_per_client {
            self.max_failures_per_client = f;
        }
        if overrides.seed.is_some() {
            self.seed = overrides.seed;
        }
    }

    /// Validate configuration.
    pub fn validate(&self) -> Result<()> {
        let invalid = |msg: &str| Err(BenchError::InvalidConfig(msg.to_string()));

        if !(self.base_url.starts_with("http://") || self.base_url.starts_with("https://")) {
            return invalid("base_url must be an http(s) URL");
        }
        if self.pool_size == 0 {
            return invalid("pool_size must be > 0");
        }
        if self.requests_per_client == 0 {
            return invalid("requests_per_client must be > 0");
        }
        if self.request_timeout_secs == 0 {
            return invalid("request_timeout_secs must be > 0");
        }
        if self.image_expansion == 0 {
            return invalid("image_expansion must be > 0");
        }
        if self.checked_total(self.image_expansion).is_none() {
            return invalid("total request count overflows");
        }
        if (self.pool_size as u64)
            .checked_mul(self.max_failures_per_client)
            .is_none()
        {
            return invalid("failure threshold overflows");
        }
        Ok(())
    }

    fn checked_total(&self, expansion: u64) -> Option<u64> {
        (self.pool_size as u64)
            .checked_mul(self.requests_per_client)?
            .checked_mul(expansion)
    }

    /// Logical requests issued by a batch whose producer expands each client-request `expansion` times.
    pub fn total_requests(&self, expansion: u64) -> u64 {
        self.checked_total(expansion).unwrap_or(u64::MAX)
    }

    /// Failures tolerated by a batch before it aborts.
    pub fn failure_threshold(&self) -> u64 {
        (self.pool_size as u64).saturating_mul(self.max_failures_per_client)
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }

    pub fn retry_policy(&self) -> RetryPolicy {
        RetryPolicy::constant(
            self.retry.max_retries,
            Duration::from_millis(self.retry.delay_ms),
        )
    }

    pub fn expected_status(&self) -> ExpectedStatus {
        match self.expected_status {
            Some(code) => ExpectedStatus::Exact(code),
            None => ExpectedStatus::AnySuccess,
        }
    }

    /// Base URL with any trailing slash removed, ready for path joining.
    pub fn trimmed_base_url(&self) -> &str {
        self.base_url.trim_end_matches('/')
    }
}
