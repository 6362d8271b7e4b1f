//! Per-agent append-only log files
//!
//! Each agent gets `<log_dir>/<agent>.log`. Every invocation is framed by a
//! timestamped header (agent id, command line) and a footer summarizing the
//! result. Output is stored with terminal control sequences stripped.

use std::fs::{self, File, OpenOptions};
use std::io::Write as IoWrite;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use chrono::{SecondsFormat, Utc};

use super::sanitize::strip_control_sequences;

const RULE_WIDTH: usize = 80;

/// An open log file for one agent
#[derive(Debug)]
pub struct AgentLog {
    path: PathBuf,
    file: File,
}

impl AgentLog {
    /// Open (creating if needed) the log file for `agent` inside `log_dir`.
    pub fn open(log_dir: &Path, agent: &str) -> Result<Self> {
        fs::create_dir_all(log_dir)
            .with_context(|| format!("Failed to create log directory: {}", log_dir.display()))?;

        let path = log_dir.join(format!("{agent}.log"));
        let file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&path)
            .with_context(|| format!("Failed to open log file: {}", path.display()))?;

        Ok(Self { path, file })
    }

    /// Path of the log file.
    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Write the invocation header.
    pub fn write_header(&mut self, agent: &str, command_line: &str) -> Result<()> {
        let rule = "=".repeat(RULE_WIDTH);
        write!(
            self.file,
            "\n{rule}\n[{}] Agent: {agent}\nCommand: {command_line}\n{rule}\n\n",
            timestamp()
        )
        .context("Failed to write log header")
    }

    /// Append a chunk of process output, stripped of control sequences.
    pub fn write_output(&mut self, chunk: &str) -> Result<()> {
        self.file
            .write_all(strip_control_sequences(chunk).as_bytes())
            .context("Failed to write process output to log")
    }

    /// Write the invocation footer. `failure` is `None` on success.
    pub fn write_footer(&mut self, failure: Option<&str>) -> Result<()> {
        let line = failure.map_or_else(
            || "Command completed successfully".to_string(),
            |reason| format!("Command failed: {reason}"),
        );
        write!(self.file, "\n[{}] {line}\n", timestamp()).context("Failed to write log footer")?;
        self.file.flush().context("Failed to flush log file")
    }
}

fn timestamp() -> String {
    Utc::now().to_rfc3339_opts(SecondsFormat::Millis, true)
}
