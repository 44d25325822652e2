mod bootstrap_helpers;
mod cli_args;
mod replay;

use anyhow::Result;
use clap::Parser;
use planbridge_runtime::{PlanReporter, ReporterConfig, ReporterOptions};

use crate::bootstrap_helpers::init_tracing;
use crate::cli_args::Cli;
use crate::replay::{load_events, replay_events};

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    let mut config = ReporterConfig::load(&cli.config)?;
    cli.apply_overrides(&mut config);
    init_tracing(config.logging);

    let events = load_events(&cli.events)?;
    tracing::debug!(events = events.len(), path = %cli.events.display(), "replaying test events");
    let reporter = PlanReporter::new(ReporterOptions::new(config));
    replay_events(&reporter, &events).await;

    let summary = reporter.summary();
    println!(
        "published={} unmatched={} failed={} run_id={}",
        summary.published,
        summary.unmatched.len(),
        summary.failed.len(),
        reporter
            .run_id()
            .map_or_else(|| "none".to_string(), |run_id| run_id.to_string())
    );
    Ok(())
}
