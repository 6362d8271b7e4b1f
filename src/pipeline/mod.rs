//! Pipeline control
//!
//! Verdict classification, the bounded review loop and the controller that
//! sequences roles across passes.

pub mod controller;
pub mod review_loop;
pub mod verdict;

pub use controller::{PassOutcome, PipelineController, TickOutcome};
pub use review_loop::{ReviewLoop, ReviewReport};
pub use verdict::Verdict;
