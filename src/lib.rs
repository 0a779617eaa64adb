//! restbench: scripted HTTP load testing for REST APIs
//!
//! Loads a JSON test plan describing an API and a set of routes, then drives
//! every enabled route through a load engine and collects per-route reports:
//!
//! - **Config**: plan file parsing and validation
//! - **Options**: resolving routes into per-job request options
//! - **Engine**: HTTP load generation with concurrency, rate, and volume limits
//! - **Token**: background bearer-token refresh
//! - **Orchestrator**: sequential or concurrent run execution
//! - **Report**: per-route request/response records
//!
//! # Example
//!
//! ```rust,no_run
//! use restbench::{HttpLoadEngine, OrchestratorBuilder, TestPlan};
//! use std::sync::Arc;
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let plan = TestPlan::load("plan.json")?;
//!     let orchestrator = OrchestratorBuilder::new()
//!         .engine(Arc::new(HttpLoadEngine::new()))
//!         .build()?;
//!
//!     let reports = orchestrator.run(plan).await?;
//!     println!("{} route(s) completed", reports.len());
//!     Ok(())
//! }
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod cli;
pub mod config;
pub mod engine;
pub mod error;
pub mod options;
pub mod orchestrator;
pub mod report;
pub mod token;

// Re-export commonly used types
pub use config::{ExecutionMode, TestPlan};
pub use engine::{HttpLoadEngine, LoadEngine, LoadStats};
pub use error::RunError;
pub use options::LoadOptions;
pub use orchestrator::{Orchestrator, OrchestratorBuilder, ShutdownHandle};
pub use report::{Report, ReportSet};
pub use token::{TokenRefresher, TokenState};
