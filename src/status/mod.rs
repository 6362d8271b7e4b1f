//! Pipeline status
//!
//! Role and step-state types, and the JSON-backed store that persists them.

pub mod state;
pub mod store;

pub use state::{Role, StepState};
pub use store::{StatusRecord, StatusStore};
