//! `sentinel run`: one pass of the watcher.

use crate::audit::RunJournal;
use crate::cli::output;
use crate::config::SentinelConfig;
use crate::gate::DispatchGate;
use crate::notifier::{LogNotifier, Notifier, WebhookNotifier};
use crate::orchestrator::Orchestrator;
use crate::pipeline::{build_strategies, run_once, RunReport, Sink};
use crate::renderer::chromium::ChromiumRenderer;
use crate::renderer::Renderer;
use crate::store::SqliteStore;
use anyhow::Result;
use std::path::PathBuf;
use std::sync::Arc;
use tracing::warn;

#[derive(Debug, Default)]
pub struct RunFlags {
    pub config: Option<PathBuf>,
    pub headful: bool,
    pub no_api: bool,
    pub no_browser: bool,
    pub dry_run: bool,
}

impl RunFlags {
    pub fn apply(&self, config: &mut SentinelConfig) {
        if self.headful {
            config.browser.headless = false;
        }
        if self.no_api {
            config.strategies.api = false;
        }
        if self.no_browser {
            config.strategies.browser = false;
        }
    }
}

/// Webhook when one is configured, the log otherwise.
pub fn notifier_for(config: &SentinelConfig) -> Result<Box<dyn Notifier>> {
    let notifier: Box<dyn Notifier> = match &config.webhook_url {
        Some(url) => Box::new(WebhookNotifier::new(url.clone(), config.notify_timeout_ms)?),
        None => {
            warn!("no webhook configured; new listings will only be logged");
            Box::new(LogNotifier)
        }
    };
    Ok(notifier)
}

pub async fn run(flags: &RunFlags) -> Result<()> {
    let mut config = SentinelConfig::load(flags.config.as_deref())?;
    flags.apply(&mut config);

    let renderer: Arc<dyn Renderer> =
        Arc::new(ChromiumRenderer::new(config.browser.chromium_path.clone()));
    let orchestrator = Orchestrator::new(build_strategies(&config, renderer)?);

    let mut journal = match RunJournal::open(&config.journal_path()) {
        Ok(j) => Some(j),
        Err(e) => {
            warn!("run journal unavailable: {e:#}");
            None
        }
    };

    let report = if flags.dry_run {
        run_once(&orchestrator, Sink::DryRun, journal.as_mut()).await?
    } else {
        let store = SqliteStore::open(&config.store_path())?;
        let notifier = notifier_for(&config)?;
        let gate = DispatchGate::new(&store, notifier.as_ref());
        run_once(&orchestrator, Sink::Gate(gate), journal.as_mut()).await?
    };

    print_report(&report);
    Ok(())
}

fn print_report(report: &RunReport) {
    if output::is_json() {
        output::print_json(report);
        return;
    }
    if !report.listings.is_empty() {
        output::print_listings(&report.listings);
    }
    if output::is_quiet() {
        return;
    }
    match report.stage {
        Some(stage) => eprintln!(
            "  Found {} listings via {stage}: {} new, {} already seen, {} notification failures ({}ms)",
            report.found,
            report.gate.forwarded,
            report.gate.already_seen,
            report.gate.notify_failures,
            report.duration_ms
        ),
        None => eprintln!(
            "  No listings found ({} strategies tried, {}ms)",
            report.attempted.len(),
            report.duration_ms
        ),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_flags_override_config() {
        let mut config = SentinelConfig::default();
        RunFlags {
            headful: true,
            no_browser: true,
            ..RunFlags::default()
        }
        .apply(&mut config);
        assert!(!config.browser.headless);
        assert!(!config.strategies.browser);
        assert!(config.strategies.api);
    }
}
