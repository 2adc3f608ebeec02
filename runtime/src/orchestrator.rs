//! Strategy orchestration.
//!
//! Runs the configured strategies in order and stops at the first one that
//! returns records. A failing strategy is logged and counts as empty, so
//! nothing escapes this module.

use crate::listing::Listing;
use crate::strategy::{AcquisitionStrategy, Stage, StrategyContext};
use serde::Serialize;
use std::time::Instant;
use tracing::{info, warn};

/// How a run of the strategy chain ended.
#[derive(Debug, Serialize)]
pub struct RunOutcome {
    /// The stage that produced the records; `None` means every strategy came
    /// back empty.
    pub stage: Option<Stage>,
    pub listings: Vec<Listing>,
    /// Stages that were attempted, in order.
    pub attempted: Vec<Stage>,
}

impl RunOutcome {
    pub fn is_exhausted(&self) -> bool {
        self.stage.is_none()
    }
}

pub struct Orchestrator {
    strategies: Vec<Box<dyn AcquisitionStrategy>>,
}

impl Orchestrator {
    pub fn new(strategies: Vec<Box<dyn AcquisitionStrategy>>) -> Self {
        Self { strategies }
    }

    pub fn stages(&self) -> Vec<Stage> {
        self.strategies.iter().map(|s| s.stage()).collect()
    }

    pub async fn run(&self) -> RunOutcome {
        let mut ctx = StrategyContext::default();
        let mut attempted = Vec::new();

        for strategy in &self.strategies {
            let stage = strategy.stage();
            attempted.push(stage);
            let start = Instant::now();

            let listings = match strategy.acquire(&mut ctx).await {
                Ok(listings) => listings,
                Err(e) => {
                    warn!("{stage} strategy failed: {e}");
                    Vec::new()
                }
            };
            let elapsed_ms = start.elapsed().as_millis() as u64;

            if listings.is_empty() {
                info!("{stage} produced nothing after {elapsed_ms}ms; falling back");
                continue;
            }

            info!("{stage} produced {} listings in {elapsed_ms}ms", listings.len());
            return RunOutcome {
                stage: Some(stage),
                listings,
                attempted,
            };
        }

        info!("all strategies exhausted");
        RunOutcome {
            stage: None,
            listings: Vec::new(),
            attempted,
        }
    }
}
