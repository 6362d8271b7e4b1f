//! Subprocess execution
//!
//! Spawning agent commands with timeouts and shutdown handling, per-agent log
//! files, and the escape stripping applied to what those files receive.

pub mod agent_log;
pub mod runner;
pub mod sanitize;

pub use agent_log::AgentLog;
pub use runner::{Invocation, ProcessOutcome, ProcessRunner, RunOptions, Termination, GRACE_PERIOD};
