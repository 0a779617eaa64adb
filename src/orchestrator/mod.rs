//! Orchestrator for load test run lifecycle management
//!
//! The Orchestrator coordinates a complete test run:
//! - Driving every enabled route through the load engine, sequentially or
//!   concurrently per the plan's execution mode
//! - Keeping the bearer token fresh via a background refresher
//! - Handling cooperative cancellation via broadcast channels
//! - Collecting per-route reports into a single report set
//!
//! # Example
//!
//! ```ignore
//! use restbench::{HttpLoadEngine, OrchestratorBuilder, TestPlan};
//!
//! let plan = TestPlan::load("plan.json")?;
//! let orchestrator = OrchestratorBuilder::new()
//!     .engine(Arc::new(HttpLoadEngine::new()))
//!     .build()?;
//!
//! let reports = orchestrator.run(plan).await?;
//! ```

mod builder;
mod executor;
mod runner;

pub use builder::OrchestratorBuilder;
pub use executor::{Orchestrator, ShutdownHandle};
pub use runner::LoadJobRunner;
