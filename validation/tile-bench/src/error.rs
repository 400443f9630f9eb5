//! Error types for the tile-bench crate.

use thiserror::Error;

use crate::transport::TransportError;

/// Errors that can occur while configuring or running a benchmark batch.
#[derive(Error, Debug)]
pub enum BenchError {
    #[error("Failed to read configuration: {0}")]
    ConfigRead(#[from] std::io::Error),

    #[error("Failed to parse configuration: {0}")]
    ConfigParse(#[from] serde_yaml::Error),

    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("Failed to build transport client: {0}")]
    Transport(#[from] TransportError),

    #[error("Client pool closed while acquiring a client")]
    PoolClosed,

    /// Cumulative transport failures exceeded the configured tolerance.
    #[error("Failed over {threshold} requests, aborting ({failures} failures after {dispatched} dispatched)")]
    ThresholdExceeded {
        failures: u64,
        threshold: u64,
        dispatched: u64,
    },

    /// A response came back with a status the run does not accept.
    #[error("Fatal code: {status}. Body: {body}")]
    UnexpectedStatus { status: u16, body: String },
}

impl BenchError {
    /// Whether this error is a batch abort rather than a setup failure.
    pub fn is_abort(&self) -> bool {
        matches!(
            self,
            BenchError::ThresholdExceeded { .. } | BenchError::UnexpectedStatus { .. }
        )
    }
}

/// Result type for tile-bench operations.
pub type Result<T> = std::result::Result<T, BenchError>;
