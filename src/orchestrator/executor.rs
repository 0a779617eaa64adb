//! Run execution: mode strategies and lifecycle

use chrono::Utc;
use std::fmt;
use std::sync::Arc;
use tokio::sync::{broadcast, mpsc};

use crate::config::{ExecutionMode, TestPlan};
use crate::engine::{cancel_requested, LoadEngine};
use crate::error::RunError;
use crate::options::build_options;
use crate::report::{FailureKind, JobFailure, Report, ReportSet};
use crate::token::{TokenClient, TokenRefresher};

use super::runner::LoadJobRunner;

/// Cloneable handle requesting cooperative cancellation of a running
/// orchestration
#[derive(Debug, Clone)]
pub struct ShutdownHandle {
    shutdown_tx: broadcast::Sender<()>,
}

impl ShutdownHandle {
    /// Requests cancellation: no new route jobs are issued, the token
    /// refresher stops, and in-flight jobs wind down cooperatively
    pub fn shutdown(&self) {
        let _ = self.shutdown_tx.send(());
    }
}

/// Drives one test plan to a terminal outcome.
///
/// `run` consumes the orchestrator, so a finished run (completed or
/// failed) cannot be restarted; build a fresh instance through
/// `OrchestratorBuilder` for the next run.
pub struct Orchestrator {
    pub(crate) engine: Arc<dyn LoadEngine>,
    pub(crate) token_client: Arc<dyn TokenClient>,
    pub(crate) shutdown_tx: broadcast::Sender<()>,
}

impl Orchestrator {
    /// Handle for cancelling the run from another task
    pub fn shutdown_handle(&self) -> ShutdownHandle {
        ShutdownHandle {
            shutdown_tx: self.shutdown_tx.clone(),
        }
    }

    /// Executes every enabled route of the plan in its configured mode.
    ///
    /// Resolves with the complete [`ReportSet`], or with the first failing
    /// job's error carrying the partial set. The token refresher is
    /// started before the first job and stopped on every exit path.
    pub async fn run(self, plan: TestPlan) -> Result<ReportSet, RunError> {
        tracing::info!(
            mode = ?plan.execution_mode,
            routes = plan.routes.len(),
            api = %plan.api_base_url,
            "starting run"
        );

        let mut refresher = TokenRefresher::new(
            plan.token_policy.clone(),
            &plan.api_base_url,
            Arc::clone(&self.token_client),
        );
        refresher.start();

        let runner = LoadJobRunner::new(Arc::clone(&self.engine));
        let result = match plan.execution_mode {
            ExecutionMode::Sequential => self.run_sequential(&plan, &runner, &refresher).await,
            ExecutionMode::Concurrent => self.run_concurrent(&plan, &runner, &refresher).await,
        };
        refresher.stop();

        match &result {
            Ok(reports) => {
                tracing::info!(reports = reports.len(), "run completed");
            }
            Err(err) => {
                tracing::error!(error = %err, reports = err.reports().len(), "run failed");
            }
        }
        result
    }

    /// One job at a time, plan order, stopping at the first failure
    async fn run_sequential(
        &self,
        plan: &TestPlan,
        runner: &LoadJobRunner,
        refresher: &TokenRefresher,
    ) -> Result<ReportSet, RunError> {
        let mut reports = ReportSet::new();
        let mut cancel_rx = self.shutdown_tx.subscribe();

        for route in &plan.routes {
            if cancel_requested(&mut cancel_rx) {
                tracing::warn!("cancellation requested, no further routes will run");
                return Err(RunError::Cancelled { reports });
            }
            if !route.enabled {
                tracing::info!(path = %route.path, "route disabled, skipping");
                continue;
            }

            tracing::info!(path = %route.path, method = %route.method, "starting route job");
            let options = build_options(route, &plan.api_base_url, refresher.token().as_deref());
            let report = runner.run(options, self.shutdown_tx.subscribe()).await;
            let failure = report.error().cloned();
            let url = report.url().to_string();
            reports.push(report);

            if let Some(failure) = failure {
                return Err(RunError::Route {
                    url,
                    failure,
                    reports,
                });
            }
        }

        if cancel_requested(&mut cancel_rx) {
            tracing::warn!("cancellation requested during the final route job");
            return Err(RunError::Cancelled { reports });
        }

        Ok(reports)
    }

    /// All enabled routes at once; reports collected in completion order
    /// and every launched job settles before a failure is surfaced
    async fn run_concurrent(
        &self,
        plan: &TestPlan,
        runner: &LoadJobRunner,
        refresher: &TokenRefresher,
    ) -> Result<ReportSet, RunError> {
        let mut cancel_rx = self.shutdown_tx.subscribe();
        let (report_tx, mut report_rx) = mpsc::unbounded_channel();
        let mut jobs = Vec::new();

        for route in &plan.routes {
            if !route.enabled {
                tracing::info!(path = %route.path, "route disabled, skipping");
                continue;
            }

            tracing::info!(path = %route.path, method = %route.method, "launching route job");
            let options = build_options(route, &plan.api_base_url, refresher.token().as_deref());
            let job_runner = runner.clone();
            let shutdown_rx = self.shutdown_tx.subscribe();
            let report_tx = report_tx.clone();

            let task_options = options.clone();
            let handle = tokio::spawn(async move {
                let report = job_runner.run(task_options, shutdown_rx).await;
                let _ = report_tx.send(report);
            });
            jobs.push((options, handle));
        }
        drop(report_tx);

        let mut reports = ReportSet::new();
        let mut first_failure: Option<(String, JobFailure)> = None;
        while let Some(report) = report_rx.recv().await {
            if first_failure.is_none() {
                if let Some(failure) = report.error() {
                    first_failure = Some((report.url().to_string(), failure.clone()));
                }
            }
            reports.push(report);
        }

        // A panicked job never sends its report; synthesize a failed one so
        // every launched route stays in the set.
        for (options, handle) in jobs {
            if handle.await.is_err() {
                tracing::error!(url = %options.url, "route job panicked");
                let failure = JobFailure::new(FailureKind::Worker, "route job panicked");
                if first_failure.is_none() {
                    first_failure = Some((options.url.clone(), failure.clone()));
                }
                let now = Utc::now();
                reports.push(Report::failure(options, now, now, failure));
            }
        }

        if let Some((url, failure)) = first_failure {
            return Err(RunError::Route {
                url,
                failure,
                reports,
            });
        }
        if cancel_requested(&mut cancel_rx) {
            return Err(RunError::Cancelled { reports });
        }
        Ok(reports)
    }
}

impl fmt::Debug for Orchestrator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Orchestrator")
            .field("engine", &"Arc<dyn LoadEngine>")
            .field("token_client", &"Arc<dyn TokenClient>")
            .finish()
    }
}
