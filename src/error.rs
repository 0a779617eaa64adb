//! Run-level error types

use thiserror::Error;

use crate::report::{JobFailure, ReportSet};

/// Terminal failure of an orchestrated run.
///
/// Both variants carry the reports accumulated before the run stopped, so
/// callers keep partial results for diagnostics.
#[derive(Debug, Error)]
pub enum RunError {
    /// A route's load job failed
    #[error("load job for {url} failed: {failure}")]
    Route {
        /// URL of the failing job
        url: String,
        /// Failure details, as embedded in the route's report
        failure: JobFailure,
        /// Reports accumulated up to and including the failed job
        reports: ReportSet,
    },

    /// The run was cancelled before every enabled route was attempted
    #[error("run cancelled after {} report(s)", .reports.len())]
    Cancelled {
        /// Reports accumulated before cancellation
        reports: ReportSet,
    },
}

impl RunError {
    /// Reports accumulated before the run stopped
    pub fn reports(&self) -> &ReportSet {
        match self {
            RunError::Route { reports, .. } => reports,
            RunError::Cancelled { reports } => reports,
        }
    }

    /// Consumes the error, yielding the accumulated reports
    pub fn into_reports(self) -> ReportSet {
        match self {
            RunError::Route { reports, .. } => reports,
            RunError::Cancelled { reports } => reports,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::report::FailureKind;

    #[test]
    fn test_route_error_display_names_url() {
        let err = RunError::Route {
            url: "http://localhost/ping".to_string(),
            failure: JobFailure::new(FailureKind::Worker, "boom"),
            reports: ReportSet::new(),
        };
        let text = err.to_string();
        assert!(text.contains("http://localhost/ping"));
        assert!(text.contains("boom"));
    }

    #[test]
    fn test_cancelled_error_exposes_reports() {
        let err = RunError::Cancelled {
            reports: ReportSet::new(),
        };
        assert!(err.reports().is_empty());
        assert!(err.into_reports().is_empty());
    }
}
