//! Shared test utilities
//!
//! Agents are simulated with `sh -c` scripts running in a temp project. Every
//! script appends a line to `.calls/<role>` so tests can count invocations.

use std::path::Path;
use std::sync::Arc;

use crate::agent::config::{ControllerConfig, PipelineConfig};
use crate::agent::AgentStep;
use crate::pipeline::verdict::{NEED_FIX_MARKER, OK_MARKER};
use crate::process::ProcessRunner;
use crate::status::{Role, StatusStore};

/// Review text with the OK marker.
pub const OK: &str = OK_MARKER;
/// Review text with the NEED_FIX marker.
pub const NEED_FIX: &str = NEED_FIX_MARKER;
/// Review text with no marker.
pub const NO_MARKER: &str = "looks fine to me";

/// Replace `role`'s command with an `sh -c` script that also records the call.
pub fn set_script(config: &mut PipelineConfig, role: Role, script: &str) {
    let cfg = config.agents.role_mut(role);
    cfg.command = "sh".to_string();
    cfg.args = vec![
        "-c".to_string(),
        format!("mkdir -p .calls && echo run >> .calls/{role}; {script}"),
    ];
}

/// A reviewer script whose n-th run writes `verdicts[n-1]` (the last entry
/// repeats) to the review file, prefixed with the run number.
#[must_use]
pub fn reviewer_script(verdicts: &[&str]) -> String {
    let mut script = String::from("mkdir -p docs; n=$(($(wc -l < .calls/reviewer))); case $n in ");
    for (idx, verdict) in verdicts.iter().enumerate() {
        let pattern = if idx + 1 == verdicts.len() {
            "*".to_string()
        } else {
            (idx + 1).to_string()
        };
        script.push_str(&format!(
            "{pattern}) printf 'review %s\\n{verdict}\\n' \"$n\" > docs/AI_REVIEW.md ;; "
        ));
    }
    script.push_str("esac");
    script
}

/// Configuration with fast timings and well-behaved scripted agents.
#[must_use]
pub fn scripted_config(root: &Path) -> PipelineConfig {
    let mut config = PipelineConfig::with_base_dir(root);
    config.controller = ControllerConfig {
        poll_interval_ms: 10,
        failure_backoff_ms: 10,
        max_pass_retries: 2,
        artifact_wait_attempts: 2,
        artifact_wait_interval_ms: 10,
    };
    set_script(&mut config, Role::Planner, "mkdir -p docs && cat > docs/AI_PLAN.md");
    set_script(&mut config, Role::Implementer, "cat > /dev/null");
    set_script(
        &mut config,
        Role::Tester,
        "mkdir -p docs && echo 'all passed' > docs/AI_TEST_REPORT.md",
    );
    set_script(&mut config, Role::Reviewer, &reviewer_script(&[OK]));
    config
}

/// An `AgentStep` over `config` with a store at the configured path.
#[must_use]
pub fn agent_step(config: PipelineConfig) -> AgentStep {
    let store = StatusStore::new(config.status_file());
    let runner = ProcessRunner::new(config.project_root()).with_log_dir(config.log_dir());
    AgentStep::new(Arc::new(config), store, runner)
}

/// How many times `role`'s script has run in `root`.
#[must_use]
pub fn call_count(root: &Path, role: Role) -> usize {
    std::fs::read_to_string(root.join(".calls").join(role.as_str()))
        .map_or(0, |s| s.lines().count())
}
