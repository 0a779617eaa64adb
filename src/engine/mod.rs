//! Load-generation engine interface
//!
//! The orchestrator drives load generation only through the [`LoadEngine`]
//! trait: one call per route, options in, aggregate statistics out. The
//! default HTTP implementation lives in [`HttpLoadEngine`]; tests swap in
//! mock engines behind the same trait.

mod http;

pub use http::HttpLoadEngine;
pub(crate) use http::cancel_requested;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use thiserror::Error;
use tokio::sync::broadcast;

use crate::options::LoadOptions;

/// Latency percentiles in milliseconds
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct LatencyPercentiles {
    /// 50th percentile (median)
    pub p50: f64,
    /// 90th percentile
    pub p90: f64,
    /// 95th percentile
    pub p95: f64,
    /// 99th percentile
    pub p99: f64,
}

/// Aggregate statistics for one completed load job
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct LoadStats {
    /// Requests completed, successes and errors alike
    pub total_requests: u64,
    /// Requests that failed in transport or returned an error status
    pub total_errors: u64,
    /// Achieved requests per second
    pub rps: f64,
    /// Measured job duration in seconds
    pub total_time_seconds: f64,
    /// Fastest observed latency in milliseconds
    pub min_latency_ms: f64,
    /// Slowest observed latency in milliseconds
    pub max_latency_ms: f64,
    /// Mean latency in milliseconds
    pub mean_latency_ms: f64,
    /// Latency distribution cut points
    pub percentiles: LatencyPercentiles,
    /// Error count per status code or transport failure kind
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub error_codes: BTreeMap<String, u64>,
}

/// Errors a load engine can fail a job with
#[derive(Debug, Error)]
pub enum EngineError {
    /// The resolved options could not be turned into a request template
    #[error("invalid request options: {0}")]
    InvalidOptions(String),

    /// The HTTP client could not be constructed
    #[error("HTTP client error: {0}")]
    Client(#[from] reqwest::Error),

    /// A worker task ended abnormally
    #[error("worker error: {0}")]
    Worker(String),

    /// Statistics aggregation failed
    #[error("metrics error: {0}")]
    Metrics(String),
}

/// Executes one load job for a set of resolved options.
///
/// Implementations enforce the concurrency, rate, volume, and timeout
/// limits carried in the options. A message on `shutdown` stops the job
/// cooperatively; statistics accumulated up to that point are still
/// returned as a normal result.
#[async_trait]
pub trait LoadEngine: Send + Sync {
    /// Runs the job to completion or cooperative cancellation
    async fn execute(
        &self,
        options: &LoadOptions,
        shutdown: broadcast::Receiver<()>,
    ) -> Result<LoadStats, EngineError>;
}
