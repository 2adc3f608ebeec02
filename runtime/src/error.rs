//! Failures that end one acquisition strategy.
//!
//! None of these escape the orchestrator: each is logged and the run falls
//! through to the next strategy as if the failing one had found nothing.

/// Why a strategy stopped without producing records.
#[derive(thiserror::Error, Debug)]
pub enum StrategyError {
    #[error("rendering session unavailable: {0:#}")]
    Session(anyhow::Error),

    #[error("navigation to {url} failed: {source:#}")]
    Navigation {
        url: String,
        #[source]
        source: anyhow::Error,
    },

    #[error("challenge page still present after {waited_ms}ms and {alternatives} alternative URLs")]
    ChallengeNotCleared { waited_ms: u64, alternatives: usize },

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

pub type StrategyResult<T> = std::result::Result<T, StrategyError>;
