//! `sentinel replay`: run the page strategies against saved HTML.

use crate::cli::output;
use crate::config::{SentinelConfig, Timing};
use crate::orchestrator::Orchestrator;
use crate::pipeline::{build_strategies, run_once, Sink};
use crate::renderer::replay::ReplayRenderer;
use anyhow::{bail, Result};
use std::path::{Path, PathBuf};
use std::sync::Arc;

/// Pages are served in the given order; each load-more click moves to the
/// next file. Nothing is stored, sent or journaled.
pub async fn run(config_path: Option<&Path>, files: &[PathBuf]) -> Result<()> {
    if files.is_empty() {
        bail!("no HTML files given");
    }
    let mut config = SentinelConfig::load(config_path)?;
    config.strategies.api = false;
    config.strategies.browser = true;
    config.browser.timing = Timing::instant();

    let renderer = Arc::new(ReplayRenderer::from_files(files)?);
    let orchestrator = Orchestrator::new(build_strategies(&config, renderer)?);
    let report = run_once(&orchestrator, Sink::DryRun, None).await?;

    if output::is_json() {
        output::print_json(&report);
        return Ok(());
    }
    output::print_listings(&report.listings);
    if !output::is_quiet() {
        match report.stage {
            Some(stage) => eprintln!("  {} listings via {stage}", report.found),
            None => eprintln!("  No listings recognized in {} pages", files.len()),
        }
    }
    Ok(())
}
