//! Per-route reports and the run-level report set

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

use crate::engine::{EngineError, LoadStats};
use crate::options::LoadOptions;

/// Broad classification of a failed load job
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FailureKind {
    /// The options could not be turned into a request template
    InvalidOptions,
    /// The HTTP client could not be constructed
    Http,
    /// A worker task ended abnormally
    Worker,
    /// Statistics aggregation failed
    Metrics,
}

impl FailureKind {
    /// Snake-case name, matching the serialized form
    pub fn as_str(&self) -> &'static str {
        match self {
            FailureKind::InvalidOptions => "invalid_options",
            FailureKind::Http => "http",
            FailureKind::Worker => "worker",
            FailureKind::Metrics => "metrics",
        }
    }
}

impl fmt::Display for FailureKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Serializable failure details embedded in a failed report
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JobFailure {
    /// Failure class
    pub kind: FailureKind,
    /// Human-readable cause
    pub message: String,
}

impl JobFailure {
    /// Builds a failure record
    pub fn new(kind: FailureKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
        }
    }
}

impl fmt::Display for JobFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} ({})", self.message, self.kind)
    }
}

impl From<&EngineError> for JobFailure {
    fn from(err: &EngineError) -> Self {
        let kind = match err {
            EngineError::InvalidOptions(_) => FailureKind::InvalidOptions,
            EngineError::Client(_) => FailureKind::Http,
            EngineError::Worker(_) => FailureKind::Worker,
            EngineError::Metrics(_) => FailureKind::Metrics,
        };
        Self::new(kind, err.to_string())
    }
}

/// Request half of a report: the resolved options plus when the job began
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReportRequest {
    /// Options the job ran with
    #[serde(flatten)]
    pub options: LoadOptions,
    /// Job start, wall clock
    pub start_at: DateTime<Utc>,
}

/// Response half of a report: statistics on success, failure details otherwise
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ReportResponse {
    /// The engine completed and produced statistics
    Success {
        /// Job end, wall clock
        end_at: DateTime<Utc>,
        /// Aggregate statistics
        #[serde(flatten)]
        stats: LoadStats,
    },
    /// The engine failed before producing statistics
    Failure {
        /// Job end, wall clock
        end_at: DateTime<Utc>,
        /// Failure details
        #[serde(flatten)]
        failure: JobFailure,
    },
}

/// Paired request/response record for one executed route
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Report {
    /// What was asked of the engine and when
    pub request: ReportRequest,
    /// What came back and when
    pub response: ReportResponse,
}

impl Report {
    /// Report for a job that produced statistics
    pub fn success(
        options: LoadOptions,
        start_at: DateTime<Utc>,
        end_at: DateTime<Utc>,
        stats: LoadStats,
    ) -> Self {
        Self {
            request: ReportRequest { options, start_at },
            response: ReportResponse::Success { end_at, stats },
        }
    }

    /// Report for a job the engine failed
    pub fn failure(
        options: LoadOptions,
        start_at: DateTime<Utc>,
        end_at: DateTime<Utc>,
        failure: JobFailure,
    ) -> Self {
        Self {
            request: ReportRequest { options, start_at },
            response: ReportResponse::Failure { end_at, failure },
        }
    }

    /// URL of the job this report covers
    pub fn url(&self) -> &str {
        &self.request.options.url
    }

    /// Job start, wall clock
    pub fn start_at(&self) -> DateTime<Utc> {
        self.request.start_at
    }

    /// Job end regardless of outcome
    pub fn end_at(&self) -> DateTime<Utc> {
        match &self.response {
            ReportResponse::Success { end_at, .. } => *end_at,
            ReportResponse::Failure { end_at, .. } => *end_at,
        }
    }

    /// True when the job produced statistics
    pub fn is_success(&self) -> bool {
        matches!(self.response, ReportResponse::Success { .. })
    }

    /// Statistics, when the job succeeded
    pub fn stats(&self) -> Option<&LoadStats> {
        match &self.response {
            ReportResponse::Success { stats, .. } => Some(stats),
            ReportResponse::Failure { .. } => None,
        }
    }

    /// Failure details, when the job failed
    pub fn error(&self) -> Option<&JobFailure> {
        match &self.response {
            ReportResponse::Success { .. } => None,
            ReportResponse::Failure { failure, .. } => Some(failure),
        }
    }
}

/// Ordered collection of reports for one run.
///
/// Sequential runs append in plan order; concurrent runs append in
/// completion order.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ReportSet(Vec<Report>);

impl ReportSet {
    /// Creates an empty set
    pub fn new() -> Self {
        Self(Vec::new())
    }

    /// Appends a report
    pub fn push(&mut self, report: Report) {
        self.0.push(report);
    }

    /// Number of reports collected
    pub fn len(&self) -> usize {
        self.0.len()
    }

    /// True when no report has been collected
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Iterates the reports in collection order
    pub fn iter(&self) -> impl Iterator<Item = &Report> {
        self.0.iter()
    }

    /// Reports as a slice
    pub fn as_slice(&self) -> &[Report] {
        &self.0
    }

    /// Number of failed jobs in the set
    pub fn failed_count(&self) -> usize {
        self.0.iter().filter(|report| !report.is_success()).count()
    }
}
