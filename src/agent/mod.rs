//! Agent roles
//!
//! Role configuration, prompt rendering, command-line construction and the
//! step operations that run a role and record its status.

pub mod config;
pub mod invocation;
pub mod prompt;
pub mod step;

pub use config::{PipelineConfig, RoleConfig};
pub use invocation::build_invocation;
pub use step::AgentStep;
