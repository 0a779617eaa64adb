//! Single-job execution wrapper

use chrono::Utc;
use std::fmt;
use std::sync::Arc;
use tokio::sync::broadcast;

use crate::engine::LoadEngine;
use crate::options::LoadOptions;
use crate::report::{JobFailure, Report};

/// Runs exactly one load job and normalizes its outcome into a [`Report`].
///
/// Stateless across calls: wall-clock timestamps are taken immediately
/// around the engine call and the report is sealed as soon as it returns,
/// whether the engine succeeded or failed.
#[derive(Clone)]
pub struct LoadJobRunner {
    engine: Arc<dyn LoadEngine>,
}

impl LoadJobRunner {
    /// Creates a runner delegating to the given engine
    pub fn new(engine: Arc<dyn LoadEngine>) -> Self {
        Self { engine }
    }

    /// Executes one job and seals its report
    pub async fn run(&self, options: LoadOptions, shutdown: broadcast::Receiver<()>) -> Report {
        let start_at = Utc::now();
        let outcome = self.engine.execute(&options, shutdown).await;
        let end_at = Utc::now();

        match outcome {
            Ok(stats) => {
                tracing::info!(
                    url = %options.url,
                    total_requests = stats.total_requests,
                    total_errors = stats.total_errors,
                    rps = stats.rps,
                    mean_latency_ms = stats.mean_latency_ms,
                    "load job finished"
                );
                Report::success(options, start_at, end_at, stats)
            }
            Err(err) => {
                tracing::error!(url = %options.url, error = %err, "load job failed");
                Report::failure(options, start_at, end_at, JobFailure::from(&err))
            }
        }
    }
}

impl fmt::Debug for LoadJobRunner {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("LoadJobRunner")
            .field("engine", &"Arc<dyn LoadEngine>")
            .finish()
    }
}
