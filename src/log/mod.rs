//! Invocation history
//!
//! The JSONL record of every agent run, used by `baton history`.

pub mod history;

pub use history::{HistoryLog, InvocationRecord, Operation};
