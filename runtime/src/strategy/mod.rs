//! Acquisition strategies, tried in order by the orchestrator.
//!
//! - [`api`]: probe structured-data endpoints directly.
//! - [`browser`]: render the search page and read listing cards.
//! - [`scanner`]: heuristic selectors over the page the browser left behind.

pub mod api;
pub mod browser;
pub mod scanner;

use crate::error::StrategyResult;
use crate::listing::Listing;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Which strategy produced a run's records.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Stage {
    Api,
    Browser,
    Scanner,
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Stage::Api => f.write_str("api"),
            Stage::Browser => f.write_str("browser"),
            Stage::Scanner => f.write_str("scanner"),
        }
    }
}

/// State handed from one strategy to the next within a run.
#[derive(Debug, Default)]
pub struct StrategyContext {
    /// HTML of the last rendered search page on which no listing containers
    /// appeared. Only the scanner reads it.
    pub page_snapshot: Option<String>,
}

/// One way of turning the marketplace into listing records.
#[async_trait]
pub trait AcquisitionStrategy: Send + Sync {
    fn stage(&self) -> Stage;

    /// Produce records. An empty vector means "nothing usable here".
    async fn acquire(&self, ctx: &mut StrategyContext) -> StrategyResult<Vec<Listing>>;
}
