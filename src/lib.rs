//! Baton - coding agent pipeline controller
//!
//! Baton drives external coding agents (CLI programs) through a fixed
//! planner → implementer → tester → reviewer sequence for one task at a
//! time. Progress is persisted to a JSON status file so an interrupted
//! pipeline resumes where it left off, and the reviewer's verdict drives a
//! bounded fix → retest → re-review loop.

// Allow multiple crate versions from dependencies (can't easily control)
#![allow(clippy::multiple_crate_versions)]

pub mod agent;
pub mod cli;
pub mod error;
pub mod log;
pub mod logging;
pub mod pipeline;
pub mod process;
pub mod status;

#[cfg(test)]
pub mod testutil;

// Re-export commonly used types
pub use agent::{build_invocation, AgentStep, PipelineConfig, RoleConfig};
pub use error::{PipelineError, Result};
pub use log::{HistoryLog, InvocationRecord, Operation};
pub use pipeline::{
    PassOutcome, PipelineController, ReviewLoop, ReviewReport, TickOutcome, Verdict,
};
pub use process::{Invocation, ProcessOutcome, ProcessRunner, RunOptions, Termination};
pub use status::{Role, StatusRecord, StatusStore, StepState};
