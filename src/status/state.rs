//! Pipeline roles and per-role step states

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

/// One of the four fixed pipeline stages
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    /// Researches the task and writes the plan
    Planner,
    /// Writes code from the plan, and fixes it from reviews
    Implementer,
    /// Writes and runs tests, then reports on them
    Tester,
    /// Reviews the code and emits a verdict marker
    Reviewer,
}

impl Role {
    /// All roles in pipeline order.
    pub const ALL: [Self; 4] = [Self::Planner, Self::Implementer, Self::Tester, Self::Reviewer];

    /// Status key and log file stem for this role.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Planner => "planner",
            Self::Implementer => "implementer",
            Self::Tester => "tester",
            Self::Reviewer => "reviewer",
        }
    }

    /// Human-readable title used in console headers.
    #[must_use]
    pub const fn title(self) -> &'static str {
        match self {
            Self::Planner => "Planner",
            Self::Implementer => "Implementer",
            Self::Tester => "Tester",
            Self::Reviewer => "Reviewer",
        }
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Role {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .into_iter()
            .find(|role| role.as_str().eq_ignore_ascii_case(s.trim()))
            .ok_or_else(|| {
                format!("unknown role '{s}' (expected planner, implementer, tester or reviewer)")
            })
    }
}

/// Persisted progress of a single role
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StepState {
    /// Not started for the current task
    #[default]
    Pending,
    /// A process for this role is running (or was, when the runner died)
    InProgress,
    /// Finished successfully; skipped on later passes
    Done,
    /// Spawn error, timeout or nonzero exit
    Failed,
    /// Reviewer only: the verdict asks for corrective action
    NeedsFix,
    /// Output missing, ambiguous or stale
    Unknown,
}

impl StepState {
    /// Serialized form, as it appears in the status file.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::InProgress => "in_progress",
            Self::Done => "done",
            Self::Failed => "failed",
            Self::NeedsFix => "needs_fix",
            Self::Unknown => "unknown",
        }
    }
}

impl fmt::Display for StepState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}
