//! Concurrent load generator for map tile servers.
//!
//! This crate provides tools to:
//! - Generate geo and fixed-tile request workloads
//! - Lend a bounded pool of HTTP clients to concurrent requests
//! - Retry transient transport failures with constant backoff
//! - Abort a batch once failures exceed a tolerance
//! - Report total and mean latency per batch

pub mod config;
pub mod coordinator;
pub mod error;
pub mod executor;
pub mod pool;
pub mod report;
pub mod transport;
pub mod workload;

pub use config::{BenchConfig, ConfigOverrides, RetryConfig, UnexpectedStatusPolicy};
pub use coordinator::{BatchCoordinator, BatchPlan, BatchState};
pub use error::{BenchError, Result};
pub use executor::{ExpectedStatus, Outcome, ResilientExecutor, RetryPolicy};
pub use pool::{ClientPool, PoolStats, PooledClient};
pub use report::{ReportRecord, ResultsReport, RunReport};
pub use transport::{HttpTransport, RequestDescriptor, Transport, TransportError, TransportResponse};
pub use workload::{FixedImageTile, GeoBounds, GeoSpot, RandomGeoTile, Workload};
