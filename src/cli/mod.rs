//! CLI output formatting
//!
//! Human-readable, colored rendering of pipeline status and history.

pub mod display;

pub use display::{print_history, print_pass_outcome, print_status};
