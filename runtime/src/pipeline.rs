//! One watcher run: orchestrate, gate, journal.

use crate::audit::{RunEvent, RunJournal, RunStatus};
use crate::config::SentinelConfig;
use crate::gate::{DispatchGate, GateReport};
use crate::listing::Listing;
use crate::orchestrator::Orchestrator;
use crate::renderer::Renderer;
use crate::strategy::api::ApiProber;
use crate::strategy::browser::BrowserStrategy;
use crate::strategy::scanner::HeuristicScanner;
use crate::strategy::{AcquisitionStrategy, Stage};
use anyhow::Result;
use serde::Serialize;
use std::sync::Arc;
use std::time::Instant;
use tracing::{info, warn};

/// Strategies enabled in `config`, in fallback order.
pub fn build_strategies(
    config: &SentinelConfig,
    renderer: Arc<dyn Renderer>,
) -> Result<Vec<Box<dyn AcquisitionStrategy>>> {
    let toggles = &config.strategies;
    let mut strategies: Vec<Box<dyn AcquisitionStrategy>> = Vec::new();
    if toggles.api {
        strategies.push(Box::new(ApiProber::from_config(config)?));
    }
    if toggles.browser {
        strategies.push(Box::new(BrowserStrategy::new(renderer, config)));
        // The scanner only reads pages the browser left behind.
        if toggles.scanner {
            strategies.push(Box::new(HeuristicScanner::from_config(config)));
        }
    }
    Ok(strategies)
}

/// Where a run's records go.
pub enum Sink<'a> {
    Gate(DispatchGate<'a>),
    /// Return the records without storing or sending them.
    DryRun,
}

#[derive(Debug, Serialize)]
pub struct RunReport {
    pub run_id: String,
    pub stage: Option<Stage>,
    pub attempted: Vec<Stage>,
    pub found: usize,
    pub gate: GateReport,
    pub duration_ms: u64,
    pub status: RunStatus,
    /// Records found; only kept for dry runs.
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub listings: Vec<Listing>,
}

impl RunReport {
    fn event(&self) -> RunEvent {
        RunEvent {
            run_id: self.run_id.clone(),
            timestamp: chrono::Utc::now().to_rfc3339(),
            stage: self.stage,
            found: self.found,
            forwarded: self.gate.forwarded,
            already_seen: self.gate.already_seen,
            notify_failures: self.gate.notify_failures,
            duration_ms: self.duration_ms,
            status: self.status,
        }
    }
}

fn record(journal: Option<&mut RunJournal>, report: &RunReport) {
    if let Some(journal) = journal {
        if let Err(e) = journal.append(&report.event()) {
            warn!("failed to write run journal: {e:#}");
        }
    }
}

/// Run the strategy chain once and hand the records to `sink`.
///
/// Only a store failure inside the gate is an error; it is journaled before
/// being returned.
pub async fn run_once(
    orchestrator: &Orchestrator,
    sink: Sink<'_>,
    journal: Option<&mut RunJournal>,
) -> Result<RunReport> {
    let run_id = uuid::Uuid::new_v4().to_string();
    let start = Instant::now();
    info!(run_id = %run_id, stages = ?orchestrator.stages(), "run started");

    let outcome = orchestrator.run().await;
    let found = outcome.listings.len();

    let mut report = RunReport {
        run_id,
        stage: outcome.stage,
        attempted: outcome.attempted,
        found,
        gate: GateReport::default(),
        duration_ms: 0,
        status: RunStatus::Exhausted,
        listings: Vec::new(),
    };

    if outcome.stage.is_none() {
        info!("no new listings: every strategy came back empty");
    } else {
        match sink {
            Sink::DryRun => {
                report.status = RunStatus::DryRun;
                report.listings = outcome.listings;
            }
            Sink::Gate(gate) => match gate.dispatch(&outcome.listings).await {
                Ok(gate_report) => {
                    report.status = RunStatus::Ok;
                    report.gate = gate_report;
                }
                Err(e) => {
                    report.status = RunStatus::Failed;
                    report.duration_ms = start.elapsed().as_millis() as u64;
                    record(journal, &report);
                    return Err(e.context("dispatch failed"));
                }
            },
        }
    }

    report.duration_ms = start.elapsed().as_millis() as u64;
    record(journal, &report);
    info!(
        run_id = %report.run_id,
        status = ?report.status,
        found = report.found,
        forwarded = report.gate.forwarded,
        "run finished in {}ms",
        report.duration_ms
    );
    Ok(report)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::renderer::replay::ReplayRenderer;

    #[test]
    fn test_build_strategies_respects_toggles() {
        let renderer: Arc<dyn Renderer> = Arc::new(ReplayRenderer::unavailable());
        let mut config = SentinelConfig::default();
        let stages = |c: &SentinelConfig| {
            Orchestrator::new(build_strategies(c, renderer.clone()).unwrap()).stages()
        };
        assert_eq!(stages(&config), vec![Stage::Api, Stage::Browser, Stage::Scanner]);

        config.strategies.api = false;
        assert_eq!(stages(&config), vec![Stage::Browser, Stage::Scanner]);

        config.strategies.api = true;
        config.strategies.browser = false;
        assert_eq!(stages(&config), vec![Stage::Api]);
    }

    #[test]
    fn test_unbuildable_api_client_is_reported() {
        let mut config = SentinelConfig::default();
        config.api.user_agent = "bad\r\nagent".to_string();
        let err = build_strategies(&config, Arc::new(ReplayRenderer::unavailable()))
            .err()
            .expect("invalid user agent must not fall back to a default client");
        assert!(format!("{err:#}").contains("failed to build HTTP client"));

        config.strategies.api = false;
        assert!(build_strategies(&config, Arc::new(ReplayRenderer::unavailable())).is_ok());
    }

    #[tokio::test]
    async fn test_exhausted_run_is_journaled() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("runs.jsonl");
        let mut journal = RunJournal::open(&path).unwrap();

        let report = run_once(&Orchestrator::new(Vec::new()), Sink::DryRun, Some(&mut journal))
            .await
            .unwrap();
        assert_eq!(report.status, RunStatus::Exhausted);

        let events = RunJournal::read_recent(&path, 5).unwrap();
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].run_id, report.run_id);
        assert_eq!(events[0].status, RunStatus::Exhausted);
    }
}
