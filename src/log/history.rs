//! Invocation history
//!
//! Append-only JSON Lines record of every agent invocation, stored at
//! `<log_dir>/history.jsonl`.

use std::fs::{self, OpenOptions};
use std::io::Write as IoWrite;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// History file name inside the log directory
pub const HISTORY_FILE: &str = "history.jsonl";

/// What an invocation was for
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum Operation {
    /// A role's regular run
    Run,
    /// Implementer fixing issues from a review
    Fix,
    /// A single reviewer run
    Review,
}

impl Operation {
    /// Lowercase name.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Run => "run",
            Self::Fix => "fix",
            Self::Review => "review",
        }
    }
}

/// One line of the history log
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct InvocationRecord {
    /// When the invocation finished
    pub timestamp: DateTime<Utc>,
    /// Task being worked on
    pub task: String,
    /// Role id
    pub agent: String,
    /// Kind of invocation
    pub operation: Operation,
    /// Whether the process succeeded
    pub success: bool,
    /// Exit code, when the process exited on its own
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub exit_code: Option<i32>,
    /// Wall-clock duration in seconds
    pub duration_secs: f64,
    /// Human-readable result (verdict, error message)
    pub outcome: String,
}

/// Appends to and reads `history.jsonl`
#[derive(Debug, Clone)]
pub struct HistoryLog {
    path: PathBuf,
}

impl HistoryLog {
    /// History log inside `log_dir`. The directory is created on first append.
    #[must_use]
    pub fn new<P: AsRef<Path>>(log_dir: P) -> Self {
        Self {
            path: log_dir.as_ref().join(HISTORY_FILE),
        }
    }

    /// Path of the history file.
    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Append one record.
    pub fn append(&self, record: &InvocationRecord) -> Result<()> {
        if let Some(dir) = self.path.parent() {
            fs::create_dir_all(dir)
                .with_context(|| format!("Failed to create log directory: {}", dir.display()))?;
        }

        let mut file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)
            .with_context(|| format!("Failed to open history file: {}", self.path.display()))?;

        let json = serde_json::to_string(record).context("Failed to serialize history record")?;
        writeln!(file, "{json}").context("Failed to write history record")?;

        Ok(())
    }

    /// Read every record in order. A missing file reads as empty.
    pub fn read_all(&self) -> Result<Vec<InvocationRecord>> {
        if !self.path.exists() {
            return Ok(Vec::new());
        }

        let content = fs::read_to_string(&self.path)
            .with_context(|| format!("Failed to read history file: {}", self.path.display()))?;

        content
            .lines()
            .enumerate()
            .filter(|(_, line)| !line.trim().is_empty())
            .map(|(idx, line)| {
                serde_json::from_str(line)
                    .with_context(|| format!("Failed to parse history line {}", idx + 1))
            })
            .collect()
    }

    /// The last `n` records.
    pub fn tail(&self, n: usize) -> Result<Vec<InvocationRecord>> {
        let mut records = self.read_all()?;
        let skip = records.len().saturating_sub(n);
        Ok(records.split_off(skip))
    }
}
