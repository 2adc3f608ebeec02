//! JSONL run journal: append-only record of every pipeline run.
//!
//! Features:
//! - One JSON object per line, newest last
//! - Rotation when the file exceeds `MAX_JOURNAL_SIZE` (10MB)
//! - Rotated files named `.1`, `.2`, etc. (max 5 rotations)

use crate::strategy::Stage;
use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::fs::{File, OpenOptions};
use std::io::{BufRead, BufReader, Write};
use std::path::{Path, PathBuf};

/// Maximum journal size before rotation (10 MB).
const MAX_JOURNAL_SIZE: u64 = 10 * 1024 * 1024;

/// Maximum number of rotated journal files to keep.
const MAX_ROTATIONS: u32 = 5;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RunStatus {
    /// Records were found and passed through the gate.
    Ok,
    /// Every strategy came back empty.
    Exhausted,
    /// Records were found but not stored or sent.
    DryRun,
    /// The gate failed (store error).
    Failed,
}

/// Summary of one run.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunEvent {
    pub run_id: String,
    pub timestamp: String,
    pub stage: Option<Stage>,
    pub found: usize,
    pub forwarded: usize,
    pub already_seen: usize,
    pub notify_failures: usize,
    pub duration_ms: u64,
    pub status: RunStatus,
}

/// Append-only JSONL journal with automatic rotation.
pub struct RunJournal {
    file: File,
    path: PathBuf,
    current_size: u64,
    max_size: u64,
}

impl RunJournal {
    /// Open or create the journal file.
    pub fn open(path: &Path) -> Result<Self> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        let file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(path)
            .with_context(|| format!("failed to open run journal: {}", path.display()))?;

        let current_size = file.metadata().map(|m| m.len()).unwrap_or(0);

        Ok(Self {
            file,
            path: path.to_path_buf(),
            current_size,
            max_size: MAX_JOURNAL_SIZE,
        })
    }

    pub fn with_max_size(mut self, bytes: u64) -> Self {
        self.max_size = bytes;
        self
    }

    pub fn append(&mut self, event: &RunEvent) -> Result<()> {
        if self.current_size >= self.max_size {
            self.rotate()?;
        }

        let json = serde_json::to_string(event)?;
        writeln!(self.file, "{json}").context("failed to write run journal")?;
        self.current_size += json.len() as u64 + 1;
        Ok(())
    }

    /// The last `limit` runs in the journal, oldest first. Unreadable lines
    /// are skipped; a missing journal is empty.
    pub fn read_recent(path: &Path, limit: usize) -> Result<Vec<RunEvent>> {
        let file = match File::open(path) {
            Ok(f) => f,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => {
                return Err(e).with_context(|| format!("failed to read {}", path.display()))
            }
        };
        let events: Vec<RunEvent> = BufReader::new(file)
            .lines()
            .map_while(Result::ok)
            .filter_map(|line| serde_json::from_str(&line).ok())
            .collect();
        let skip = events.len().saturating_sub(limit);
        Ok(events.into_iter().skip(skip).collect())
    }

    /// Rotate journal files: runs.jsonl → runs.jsonl.1, .1 → .2, etc.
    fn rotate(&mut self) -> Result<()> {
        self.file.flush()?;

        for i in (1..MAX_ROTATIONS).rev() {
            let from = rotation_path(&self.path, i);
            let to = rotation_path(&self.path, i + 1);
            if from.exists() {
                let _ = std::fs::rename(&from, &to);
            }
        }

        let _ = std::fs::rename(&self.path, rotation_path(&self.path, 1));

        self.file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)
            .with_context(|| "failed to reopen run journal after rotation")?;
        self.current_size = 0;

        Ok(())
    }
}

/// Build path for a rotated journal: `runs.jsonl.1`, `runs.jsonl.2`, etc.
fn rotation_path(base: &Path, index: u32) -> PathBuf {
    let name = format!(
        "{}.{index}",
        base.file_name()
            .and_then(|n| n.to_str())
            .unwrap_or("runs.jsonl")
    );
    base.with_file_name(name)
}
