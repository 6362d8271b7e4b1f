//! Pipeline configuration
//!
//! Parses `baton.toml`. Every section is optional; `[agents.<role>]` tables
//! override individual fields of the built-in role defaults.

use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{bail, Context, Result};
use serde::{Deserialize, Serialize};

use super::prompt::{
    DEFAULT_FIX_PROMPT, DEFAULT_IMPLEMENTER_PROMPT, DEFAULT_PLANNER_PROMPT,
    DEFAULT_REVIEWER_PROMPT, DEFAULT_TESTER_PROMPT,
};
use crate::status::Role;

/// Default config file name
pub const CONFIG_FILE: &str = "baton.toml";

/// Default per-role timeout (one hour)
pub const DEFAULT_TIMEOUT_MS: u64 = 60 * 60 * 1000;

const PLAN_FILE: &str = "docs/AI_PLAN.md";
const REVIEW_FILE: &str = "docs/AI_REVIEW.md";
const TEST_REPORT_FILE: &str = "docs/AI_TEST_REPORT.md";

/// Static configuration of one role
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(deny_unknown_fields)]
pub struct RoleConfig {
    /// Program to execute
    pub command: String,
    /// Arguments passed before any rewriting
    #[serde(default)]
    pub args: Vec<String>,
    /// Timeout in milliseconds; 0 disables it
    #[serde(default = "default_timeout_ms")]
    pub timeout_ms: u64,
    /// Provider label, shown in logs only
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub provider: Option<String>,
    /// Model label, shown in logs only
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub model: Option<String>,
    /// Prompt template written to stdin
    #[serde(default)]
    pub prompt: String,
    /// Prompt template for fix-from-review runs (implementer only)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub fix_prompt: Option<String>,
    /// Treat a nonzero exit as success (with a warning)
    #[serde(default)]
    pub allow_non_zero_exit: bool,
    /// Input artifacts
    #[serde(default)]
    pub reads: Vec<String>,
    /// Output artifacts
    #[serde(default)]
    pub writes: Vec<String>,
}

const fn default_timeout_ms() -> u64 {
    DEFAULT_TIMEOUT_MS
}

impl RoleConfig {
    /// Built-in configuration for `role`.
    #[must_use]
    pub fn default_for(role: Role) -> Self {
        let (command, provider, model, prompt, reads, writes): (_, _, _, _, &[&str], &[&str]) =
            match role {
                Role::Planner => (
                    "gemini",
                    "google",
                    "gemini-2.0-pro",
                    DEFAULT_PLANNER_PROMPT,
                    &[],
                    &[PLAN_FILE],
                ),
                Role::Implementer => (
                    "cursor-agent",
                    "cursor",
                    "gpt-4.1",
                    DEFAULT_IMPLEMENTER_PROMPT,
                    &[PLAN_FILE, REVIEW_FILE],
                    &["src/**"],
                ),
                Role::Tester => (
                    "cursor-agent",
                    "cursor",
                    "gpt-4.1",
                    DEFAULT_TESTER_PROMPT,
                    &[PLAN_FILE, "src/**"],
                    &[TEST_REPORT_FILE, "tests/**"],
                ),
                Role::Reviewer => (
                    "codex",
                    "openai",
                    "gpt-4.1",
                    DEFAULT_REVIEWER_PROMPT,
                    &[PLAN_FILE, "src/**"],
                    &[REVIEW_FILE],
                ),
            };

        Self {
            command: command.to_string(),
            args: Vec::new(),
            timeout_ms: DEFAULT_TIMEOUT_MS,
            provider: Some(provider.to_string()),
            model: Some(model.to_string()),
            prompt: prompt.to_string(),
            fix_prompt: (role == Role::Implementer).then(|| DEFAULT_FIX_PROMPT.to_string()),
            allow_non_zero_exit: false,
            reads: reads.iter().map(ToString::to_string).collect(),
            writes: writes.iter().map(ToString::to_string).collect(),
        }
    }

    /// Timeout as a duration; `None` when disabled.
    ///
    /// `timeout_ms = 0` means no timeout at all, not the one-hour default.
    /// Omit the field to keep the default.
    #[must_use]
    pub const fn timeout(&self) -> Option<Duration> {
        if self.timeout_ms == 0 {
            None
        } else {
            Some(Duration::from_millis(self.timeout_ms))
        }
    }

    /// First `writes` entry that names a concrete file.
    #[must_use]
    pub fn primary_output(&self) -> Option<&str> {
        self.writes
            .iter()
            .map(String::as_str)
            .find(|entry| !is_glob(entry))
    }
}

/// Whether an artifact entry is a pattern rather than a path.
#[must_use]
pub fn is_glob(entry: &str) -> bool {
    entry.contains(['*', '?', '['])
}

/// Field-level overrides from `[agents.<role>]`
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(deny_unknown_fields)]
struct RoleOverride {
    command: Option<String>,
    args: Option<Vec<String>>,
    timeout_ms: Option<u64>,
    provider: Option<String>,
    model: Option<String>,
    prompt: Option<String>,
    fix_prompt: Option<String>,
    allow_non_zero_exit: Option<bool>,
    reads: Option<Vec<String>>,
    writes: Option<Vec<String>>,
}

impl RoleOverride {
    fn apply(self, mut base: RoleConfig) -> RoleConfig {
        if let Some(v) = self.command {
            base.command = v;
        }
        if let Some(v) = self.args {
            base.args = v;
        }
        if let Some(v) = self.timeout_ms {
            base.timeout_ms = v;
        }
        if let Some(v) = self.provider {
            base.provider = Some(v);
        }
        if let Some(v) = self.model {
            base.model = Some(v);
        }
        if let Some(v) = self.prompt {
            base.prompt = v;
        }
        if let Some(v) = self.fix_prompt {
            base.fix_prompt = Some(v);
        }
        if let Some(v) = self.allow_non_zero_exit {
            base.allow_non_zero_exit = v;
        }
        if let Some(v) = self.reads {
            base.reads = v;
        }
        if let Some(v) = self.writes {
            base.writes = v;
        }
        base
    }
}

/// `[project]` paths
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(deny_unknown_fields, default)]
pub struct ProjectConfig {
    /// Directory agents run in, relative to the config file
    pub root: PathBuf,
    /// Log directory, relative to `root`
    pub log_dir: PathBuf,
    /// Status file, relative to the config file
    pub status_file: PathBuf,
}

impl Default for ProjectConfig {
    fn default() -> Self {
        Self {
            root: PathBuf::from("."),
            log_dir: PathBuf::from("logs"),
            status_file: PathBuf::from("ai_status.json"),
        }
    }
}

/// `[review_loop]` settings
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(deny_unknown_fields, default)]
pub struct ReviewLoopConfig {
    /// When false, the reviewer is marked done without running
    pub enabled: bool,
    /// Maximum number of reviewer runs per pass
    pub max_loops: u32,
}

impl Default for ReviewLoopConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            max_loops: 3,
        }
    }
}

/// `[controller]` timings
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(deny_unknown_fields, default)]
pub struct ControllerConfig {
    /// Idle polling interval
    pub poll_interval_ms: u64,
    /// Pause after a failed pass
    pub failure_backoff_ms: u64,
    /// Consecutive failed passes before the controller settles
    pub max_pass_retries: u32,
    /// How many times to poll for the review file after a reviewer run
    pub artifact_wait_attempts: u32,
    /// Delay between review file polls
    pub artifact_wait_interval_ms: u64,
}

impl Default for ControllerConfig {
    fn default() -> Self {
        Self {
            poll_interval_ms: 2000,
            failure_backoff_ms: 5000,
            max_pass_retries: 3,
            artifact_wait_attempts: 10,
            artifact_wait_interval_ms: 2000,
        }
    }
}

impl ControllerConfig {
    /// Idle polling interval.
    #[must_use]
    pub const fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }

    /// Pause after a failed pass.
    #[must_use]
    pub const fn failure_backoff(&self) -> Duration {
        Duration::from_millis(self.failure_backoff_ms)
    }

    /// Delay between review file polls.
    #[must_use]
    pub const fn artifact_wait_interval(&self) -> Duration {
        Duration::from_millis(self.artifact_wait_interval_ms)
    }
}

/// Resolved configuration of all four roles
#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
pub struct AgentsConfig {
    /// Planner
    pub planner: RoleConfig,
    /// Implementer
    pub implementer: RoleConfig,
    /// Tester
    pub tester: RoleConfig,
    /// Reviewer
    pub reviewer: RoleConfig,
}

impl Default for AgentsConfig {
    fn default() -> Self {
        Self {
            planner: RoleConfig::default_for(Role::Planner),
            implementer: RoleConfig::default_for(Role::Implementer),
            tester: RoleConfig::default_for(Role::Tester),
            reviewer: RoleConfig::default_for(Role::Reviewer),
        }
    }
}

impl AgentsConfig {
    /// Configuration of one role.
    #[must_use]
    pub const fn role(&self, role: Role) -> &RoleConfig {
        match role {
            Role::Planner => &self.planner,
            Role::Implementer => &self.implementer,
            Role::Tester => &self.tester,
            Role::Reviewer => &self.reviewer,
        }
    }

    /// Mutable configuration of one role.
    pub fn role_mut(&mut self, role: Role) -> &mut RoleConfig {
        match role {
            Role::Planner => &mut self.planner,
            Role::Implementer => &mut self.implementer,
            Role::Tester => &mut self.tester,
            Role::Reviewer => &mut self.reviewer,
        }
    }
}

#[derive(Debug, Default, Deserialize)]
#[serde(deny_unknown_fields)]
struct RawAgents {
    planner: Option<RoleOverride>,
    implementer: Option<RoleOverride>,
    tester: Option<RoleOverride>,
    reviewer: Option<RoleOverride>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(deny_unknown_fields)]
struct RawConfig {
    #[serde(default)]
    project: ProjectConfig,
    #[serde(default)]
    review_loop: ReviewLoopConfig,
    #[serde(default)]
    controller: ControllerConfig,
    #[serde(default)]
    agents: RawAgents,
}

/// Top-level configuration parsed from `baton.toml`
#[derive(Debug, Clone, Default, Serialize, PartialEq, Eq)]
pub struct PipelineConfig {
    /// Project paths
    pub project: ProjectConfig,
    /// Review loop settings
    pub review_loop: ReviewLoopConfig,
    /// Controller timings
    pub controller: ControllerConfig,
    /// Per-role configuration
    pub agents: AgentsConfig,
    /// Directory relative paths are resolved against
    #[serde(skip)]
    pub base_dir: PathBuf,
}

impl PipelineConfig {
    /// Parse a config file. Relative paths resolve against its directory.
    pub fn from_path<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {}", path.display()))?;
        let mut config = Self::parse(&content)
            .with_context(|| format!("in config file {}", path.display()))?;
        config.base_dir = path
            .parent()
            .filter(|p| !p.as_os_str().is_empty())
            .map_or_else(|| PathBuf::from("."), Path::to_path_buf);
        Ok(config)
    }

    /// Load `path` if it exists, otherwise use defaults rooted at its
    /// directory.
    pub fn load_or_default<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        if path.exists() {
            return Self::from_path(path);
        }
        let base_dir = path
            .parent()
            .filter(|p| !p.as_os_str().is_empty())
            .map_or_else(|| PathBuf::from("."), Path::to_path_buf);
        Ok(Self::with_base_dir(base_dir))
    }

    /// Default configuration resolving paths against `base_dir`.
    #[must_use]
    pub fn with_base_dir<P: Into<PathBuf>>(base_dir: P) -> Self {
        Self {
            base_dir: base_dir.into(),
            ..Self::default()
        }
    }

    /// Parse `baton.toml` content from a string.
    pub fn parse(content: &str) -> Result<Self> {
        let raw: RawConfig = toml::from_str(content).context("Failed to parse baton.toml")?;

        let mut agents = AgentsConfig::default();
        let overrides = [
            (Role::Planner, raw.agents.planner),
            (Role::Implementer, raw.agents.implementer),
            (Role::Tester, raw.agents.tester),
            (Role::Reviewer, raw.agents.reviewer),
        ];
        for (role, over) in overrides {
            if let Some(over) = over {
                let slot = agents.role_mut(role);
                *slot = over.apply(slot.clone());
            }
        }

        let config = Self {
            project: raw.project,
            review_loop: raw.review_loop,
            controller: raw.controller,
            agents,
            base_dir: PathBuf::new(),
        };
        config.validate()?;
        Ok(config)
    }

    /// Render as TOML (used by `baton init`).
    pub fn to_toml(&self) -> Result<String> {
        toml::to_string_pretty(self).context("Failed to serialize configuration")
    }

    fn validate(&self) -> Result<()> {
        if self.review_loop.max_loops == 0 {
            bail!("review_loop.max_loops must be at least 1");
        }

        for role in Role::ALL {
            let cfg = self.agents.role(role);
            if cfg.command.trim().is_empty() {
                bail!("agents.{role}.command cannot be empty");
            }
            for entry in cfg.reads.iter().chain(&cfg.writes) {
                if entry.trim().is_empty() {
                    bail!("agents.{role} has an empty artifact path");
                }
            }
        }

        if self.agents.reviewer.primary_output().is_none() {
            bail!("agents.reviewer.writes must name a review file (not a glob)");
        }

        Ok(())
    }

    /// Directory agents run in.
    #[must_use]
    pub fn project_root(&self) -> PathBuf {
        self.base_dir.join(&self.project.root)
    }

    /// Directory for per-agent logs and history.
    #[must_use]
    pub fn log_dir(&self) -> PathBuf {
        self.project_root().join(&self.project.log_dir)
    }

    /// Path of the status file.
    #[must_use]
    pub fn status_file(&self) -> PathBuf {
        self.base_dir.join(&self.project.status_file)
    }

    /// Resolve an artifact path against the project root.
    #[must_use]
    pub fn resolve_artifact(&self, entry: &str) -> PathBuf {
        self.project_root().join(entry)
    }

    /// Resolved primary output of `role`, if it has one.
    #[must_use]
    pub fn primary_output(&self, role: Role) -> Option<PathBuf> {
        self.agents
            .role(role)
            .primary_output()
            .map(|entry| self.resolve_artifact(entry))
    }
}
