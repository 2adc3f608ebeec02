//! Run journal: one JSONL line per pipeline run.

pub mod journal;

pub use journal::{RunEvent, RunJournal, RunStatus};
