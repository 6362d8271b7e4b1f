//! Error taxonomy for the pipeline core
//!
//! Process-level failures (`Spawn`, `Timeout`, `NonZeroExit`, `Killed`) and
//! `MissingInput` abort a pass but leave the controller running. `CorruptState`,
//! `Io` and `Interrupted` are fatal to the controller loop.
//!
//! Missing or stale output and an exhausted review loop are not errors; they
//! flow through return values.

use std::path::PathBuf;
use std::time::Duration;

use thiserror::Error;

use crate::status::Role;

/// Result alias for core operations.
pub type Result<T, E = PipelineError> = std::result::Result<T, E>;

/// Errors raised by the status store, process runner and agent steps
#[derive(Debug, Error)]
pub enum PipelineError {
    /// The command could not be started (not found, not executable)
    #[error("[{agent}] failed to spawn {command}: {source}")]
    Spawn {
        /// Agent id the command was run for
        agent: String,
        /// Program name
        command: String,
        /// Underlying OS error
        source: std::io::Error,
    },

    /// The command outlived its timeout and was terminated
    #[error("[{agent}] {command} timed out after {}ms", timeout.as_millis())]
    Timeout {
        /// Agent id the command was run for
        agent: String,
        /// Program name
        command: String,
        /// The timeout that was exceeded
        timeout: Duration,
    },

    /// The command exited with a nonzero code
    #[error("[{agent}] {command} exited with code {code}")]
    NonZeroExit {
        /// Agent id the command was run for
        agent: String,
        /// Program name
        command: String,
        /// Exit code reported by the process
        code: i32,
    },

    /// The command was terminated by a signal it did not receive from us
    #[error("[{agent}] {command} was terminated by a signal")]
    Killed {
        /// Agent id the command was run for
        agent: String,
        /// Program name
        command: String,
    },

    /// A mandatory upstream artifact does not exist
    #[error("{role} requires {} but it does not exist", path.display())]
    MissingInput {
        /// Role that needed the artifact
        role: Role,
        /// Resolved path of the artifact
        path: PathBuf,
    },

    /// The status record has no task to work on
    #[error("no task is set; the {role} has nothing to do")]
    NoTask {
        /// Role that was asked to run
        role: Role,
    },

    /// The status file exists with content that cannot be parsed
    #[error("status file {} is corrupt: {source}", path.display())]
    CorruptState {
        /// Path of the status file
        path: PathBuf,
        /// Parse error
        source: serde_json::Error,
    },

    /// Filesystem error outside of a subprocess
    #[error("{context}: {source}")]
    Io {
        /// What was being attempted
        context: String,
        /// Underlying OS error
        source: std::io::Error,
    },

    /// The configuration cannot support the requested operation
    #[error("invalid configuration: {0}")]
    Config(String),

    /// Shutdown was requested before or while a process ran
    #[error("interrupted by shutdown request")]
    Interrupted,
}

impl PipelineError {
    /// Build an `Io` error with a short description of the failed operation.
    pub fn io(context: impl Into<String>, source: std::io::Error) -> Self {
        Self::Io {
            context: context.into(),
            source,
        }
    }

    /// Whether this error belongs to a single step and should abort only the
    /// current pass, rather than the controller itself.
    #[must_use]
    pub const fn is_step_failure(&self) -> bool {
        matches!(
            self,
            Self::Spawn { .. }
                | Self::Timeout { .. }
                | Self::NonZeroExit { .. }
                | Self::Killed { .. }
                | Self::MissingInput { .. }
                | Self::NoTask { .. }
        )
    }
}
