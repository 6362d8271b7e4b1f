//! Persisted pipeline status
//!
//! Manages the status file (`ai_status.json` by default): a single JSON object
//! holding the current task and one state per role. It is the only record of
//! progress that survives a restart.
//!
//! The store assumes a single writer. `set` is a read-modify-write and will lose
//! updates if another process edits the file concurrently; there is no lock.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::{debug, info};

use super::state::{Role, StepState};
use crate::error::{PipelineError, Result};

/// Snapshot of the status file
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct StatusRecord {
    /// Current objective; empty means idle
    #[serde(default)]
    pub task: String,
    /// Planner state
    #[serde(default)]
    pub planner: StepState,
    /// Implementer state
    #[serde(default)]
    pub implementer: StepState,
    /// Tester state
    #[serde(default)]
    pub tester: StepState,
    /// Reviewer state
    #[serde(default)]
    pub reviewer: StepState,
    /// Keys this version does not know about, preserved on rewrite
    #[serde(flatten)]
    pub extra: BTreeMap<String, Value>,
}

impl StatusRecord {
    /// State of a single role.
    #[must_use]
    pub const fn state(&self, role: Role) -> StepState {
        match role {
            Role::Planner => self.planner,
            Role::Implementer => self.implementer,
            Role::Tester => self.tester,
            Role::Reviewer => self.reviewer,
        }
    }

    /// Replace the state of a single role.
    pub fn set_state(&mut self, role: Role, state: StepState) {
        let slot = match role {
            Role::Planner => &mut self.planner,
            Role::Implementer => &mut self.implementer,
            Role::Tester => &mut self.tester,
            Role::Reviewer => &mut self.reviewer,
        };
        *slot = state;
    }

    /// True when every role is `done`.
    #[must_use]
    pub fn all_done(&self) -> bool {
        Role::ALL
            .iter()
            .all(|role| self.state(*role) == StepState::Done)
    }

    /// True when a non-blank task is set.
    #[must_use]
    pub fn has_task(&self) -> bool {
        !self.task.trim().is_empty()
    }
}

/// Reads and writes the status file
#[derive(Debug, Clone)]
pub struct StatusStore {
    path: PathBuf,
}

impl StatusStore {
    /// Create a store backed by `path`. Nothing is touched until the first read.
    #[must_use]
    pub fn new<P: Into<PathBuf>>(path: P) -> Self {
        Self { path: path.into() }
    }

    /// Path of the backing file.
    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Read the current record.
    ///
    /// A missing or blank file is initialized with the default record (empty
    /// task, all roles pending), which is persisted and returned. Non-blank
    /// content that fails to parse is reported as `CorruptState` and left on
    /// disk untouched.
    pub fn read(&self) -> Result<StatusRecord> {
        let raw = match std::fs::read_to_string(&self.path) {
            Ok(raw) => raw,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => String::new(),
            Err(e) => {
                return Err(PipelineError::io(
                    format!("read {}", self.path.display()),
                    e,
                ))
            }
        };

        if raw.trim().is_empty() {
            info!(path = %self.path.display(), "initializing status file");
            let record = StatusRecord::default();
            self.write(&record)?;
            return Ok(record);
        }

        serde_json::from_str(&raw).map_err(|source| PipelineError::CorruptState {
            path: self.path.clone(),
            source,
        })
    }

    /// Replace the whole record on disk (write to temp, then rename).
    pub fn write(&self, record: &StatusRecord) -> Result<()> {
        let mut json = serde_json::to_string_pretty(record)
            .map_err(|e| PipelineError::io("serialize status", e.into()))?;
        json.push('\n');

        if let Some(parent) = self.path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent).map_err(|e| {
                    PipelineError::io(format!("create {}", parent.display()), e)
                })?;
            }
        }

        let tmp_path = self.path.with_extension("json.tmp");
        std::fs::write(&tmp_path, json.as_bytes())
            .map_err(|e| PipelineError::io(format!("write {}", tmp_path.display()), e))?;
        std::fs::rename(&tmp_path, &self.path).map_err(|e| {
            PipelineError::io(
                format!("rename {} -> {}", tmp_path.display(), self.path.display()),
                e,
            )
        })
    }

    /// Set one role's state, keeping everything else.
    pub fn set(&self, role: Role, state: StepState) -> Result<()> {
        let mut record = self.read()?;
        if record.state(role) == state {
            return Ok(());
        }
        debug!(%role, from = %record.state(role), to = %state, "status change");
        record.set_state(role, state);
        self.write(&record)
    }

    /// Reset the given roles to `pending` in a single write.
    pub fn reset(&self, roles: &[Role]) -> Result<StatusRecord> {
        let mut record = self.read()?;
        for role in roles {
            record.set_state(*role, StepState::Pending);
        }
        self.write(&record)?;
        Ok(record)
    }

    /// Store a new task and reset every role to `pending`.
    pub fn set_task(&self, task: &str) -> Result<StatusRecord> {
        let mut record = self.read()?;
        record.task = task.trim().to_string();
        for role in Role::ALL {
            record.set_state(role, StepState::Pending);
        }
        self.write(&record)?;
        Ok(record)
    }
}
