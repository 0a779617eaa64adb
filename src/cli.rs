//! CLI argument parsing and command handling

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use std::fs::File;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use crate::config::TestPlan;
use crate::engine::HttpLoadEngine;
use crate::orchestrator::OrchestratorBuilder;
use crate::report::ReportSet;
use crate::token::HttpTokenClient;

/// restbench - scripted HTTP load testing for REST APIs
#[derive(Parser, Debug)]
#[command(name = "restbench")]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    /// Enable verbose logging
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Command to execute
    #[command(subcommand)]
    pub command: Commands,
}

/// Available subcommands
#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Run a load test plan
    Run {
        /// Path to the plan file
        #[arg(short, long)]
        config: PathBuf,

        /// Write the full report set to this file as JSON
        #[arg(short, long)]
        output: Option<PathBuf>,
    },
    /// Validate a plan file without running it
    Validate {
        /// Path to the plan file
        #[arg(short, long)]
        config: PathBuf,
    },
}

impl Cli {
    /// Dispatch the selected command
    pub async fn execute(&self) -> Result<()> {
        match &self.command {
            Commands::Run { config, output } => run(config, output.as_deref()).await,
            Commands::Validate { config } => validate(config),
        }
    }
}

async fn run(config: &Path, output: Option<&Path>) -> Result<()> {
    let plan = TestPlan::load(config)
        .with_context(|| format!("failed to load plan from {}", config.display()))?;

    println!("\n{}", "=".repeat(70));
    println!("   restbench - scripted HTTP load testing");
    println!("{}", "=".repeat(70));
    println!();
    println!("Plan:");
    println!("  Target:   {}", plan.api_base_url);
    println!("  Mode:     {:?}", plan.execution_mode);
    println!(
        "  Routes:   {} ({} enabled)",
        plan.routes.len(),
        plan.enabled_routes().count()
    );
    let token_enabled = plan
        .token_policy
        .as_ref()
        .map(|policy| policy.enabled)
        .unwrap_or(false);
    println!(
        "  Token:    {}",
        if token_enabled {
            "refresh enabled"
        } else {
            "disabled"
        }
    );
    println!("{}", "=".repeat(70));
    println!();

    let mut builder = OrchestratorBuilder::new().engine(Arc::new(HttpLoadEngine::new()));
    if let Some(policy) = plan.token_policy.as_ref().filter(|policy| policy.enabled) {
        let client = HttpTokenClient::new(Duration::from_millis(policy.refresh_interval_ms))
            .context("failed to build token refresh client")?;
        builder = builder.token_client(Arc::new(client));
    }
    let orchestrator = builder.build()?;

    // Ctrl-C cancels the run instead of killing the process outright, so
    // partial reports still get printed and exported.
    let shutdown = orchestrator.shutdown_handle();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            tracing::warn!("interrupt received, cancelling run");
            shutdown.shutdown();
        }
    });

    let outcome = orchestrator.run(plan).await;
    let reports = match &outcome {
        Ok(reports) => reports.clone(),
        Err(err) => err.reports().clone(),
    };

    print_summary(&reports);

    if let Some(path) = output {
        export_reports(&reports, path)
            .with_context(|| format!("failed to write report to {}", path.display()))?;
        println!("✓ JSON report written to: {}", path.display());
        println!();
    }

    outcome.map(|_| ()).map_err(Into::into)
}

fn validate(config: &Path) -> Result<()> {
    let plan = TestPlan::load(config)
        .with_context(|| format!("failed to load plan from {}", config.display()))?;

    println!(
        "✓ {} is valid: {} route(s), {} enabled",
        config.display(),
        plan.routes.len(),
        plan.enabled_routes().count()
    );
    Ok(())
}

fn print_summary(reports: &ReportSet) {
    println!();
    println!("{}", "=".repeat(70));
    println!("   Results");
    println!("{}", "=".repeat(70));

    if reports.is_empty() {
        println!("  (no routes ran)");
    }
    for report in reports.iter() {
        match report.stats() {
            Some(stats) => {
                println!(
                    "  ✓ {} - {} requests, {} errors, {:.1} rps, mean {:.1} ms",
                    report.url(),
                    stats.total_requests,
                    stats.total_errors,
                    stats.rps,
                    stats.mean_latency_ms
                );
            }
            None => {
                let message = report
                    .error()
                    .map(|failure| failure.message.clone())
                    .unwrap_or_default();
                println!("  ✗ {} - {}", report.url(), message);
            }
        }
    }
    println!("{}", "=".repeat(70));
}

fn export_reports(reports: &ReportSet, path: &Path) -> Result<()> {
    let file = File::create(path)?;
    serde_json::to_writer_pretty(file, reports)?;
    Ok(())
}
