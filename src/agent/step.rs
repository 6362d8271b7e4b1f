//! Role execution
//!
//! [`AgentStep`] ties role configuration to the process runner and the status
//! store. It provides the idempotent "run this role unless done" operation,
//! the implementer's fix-from-review run and the reviewer's single review.

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::{Instant, SystemTime};

use chrono::Utc;
use tracing::{debug, error, info, warn};

use super::config::{is_glob, PipelineConfig, RoleConfig};
use super::invocation::build_invocation;
use super::prompt::{PromptContext, DEFAULT_FIX_PROMPT};
use crate::error::{PipelineError, Result};
use crate::log::{HistoryLog, InvocationRecord, Operation};
use crate::pipeline::verdict::Verdict;
use crate::process::{ProcessOutcome, ProcessRunner, RunOptions};
use crate::status::{Role, StatusStore, StepState};

/// Lines of the review shown in diagnostics after classification
const REVIEW_PREVIEW_LINES: usize = 20;

/// Modification time and content of an artifact at one point in time
#[derive(Debug, Clone, PartialEq, Eq)]
struct ArtifactSnapshot {
    modified: Option<SystemTime>,
    content: Option<String>,
}

impl ArtifactSnapshot {
    fn take(path: &Path) -> Option<Self> {
        let meta = std::fs::metadata(path).ok()?;
        Some(Self {
            modified: meta.modified().ok(),
            content: std::fs::read_to_string(path).ok(),
        })
    }
}

/// Runs roles against the shared configuration, store and runner
#[derive(Debug, Clone)]
pub struct AgentStep {
    config: Arc<PipelineConfig>,
    store: StatusStore,
    runner: ProcessRunner,
    history: HistoryLog,
}

impl AgentStep {
    /// Bind `config` to a store and a runner. History goes to
    /// `<log_dir>/history.jsonl`.
    #[must_use]
    pub fn new(config: Arc<PipelineConfig>, store: StatusStore, runner: ProcessRunner) -> Self {
        let history = HistoryLog::new(config.log_dir());
        Self {
            config,
            store,
            runner,
            history,
        }
    }

    /// The status store roles report to.
    #[must_use]
    pub const fn store(&self) -> &StatusStore {
        &self.store
    }

    /// The runner used for every invocation.
    #[must_use]
    pub const fn runner(&self) -> &ProcessRunner {
        &self.runner
    }

    /// Run `role` unless it is already `done`.
    ///
    /// Returns `true` when a process was run. The reviewer delegates to
    /// [`Self::review_once`] and is persisted according to its verdict.
    pub async fn run_if_needed(&self, role: Role) -> Result<bool> {
        let record = self.store.read()?;
        if record.state(role) == StepState::Done {
            info!(%role, "already done, skipping");
            return Ok(false);
        }

        if role == Role::Reviewer {
            self.review_once().await?;
            return Ok(true);
        }

        if role == Role::Planner && !record.has_task() {
            return Err(PipelineError::NoTask { role });
        }

        let cfg = self.config.agents.role(role);
        self.warn_missing_inputs(role, cfg);
        let primary = self.config.primary_output(role);
        if let Some(path) = &primary {
            ensure_parent_dir(path)?;
        }

        info!(
            %role,
            command = %cfg.command,
            provider = cfg.provider.as_deref().unwrap_or("-"),
            model = cfg.model.as_deref().unwrap_or("-"),
            "running"
        );
        self.store.set(role, StepState::InProgress)?;

        let prompt = self.prompt_context(&record.task).render(&cfg.prompt);
        let start = Instant::now();
        let result = self.invoke(role, cfg, &prompt).await;
        self.record(role, Operation::Run, &record.task, start, &result, None);

        match result {
            Ok(_) => {
                if let Some(path) = &primary {
                    if !path.exists() {
                        warn!(%role, path = %path.display(), "expected output not found after run");
                    }
                }
                self.store.set(role, StepState::Done)?;
                info!(%role, "completed");
                Ok(true)
            }
            Err(e) => Err(self.fail(role, e)?),
        }
    }

    /// Run the implementer against the latest review.
    ///
    /// The review file must exist. The implementer's persisted status is left
    /// unchanged.
    pub async fn fix_from_review(&self) -> Result<()> {
        let review_file = self.review_file()?;
        if !review_file.exists() {
            return Err(PipelineError::MissingInput {
                role: Role::Implementer,
                path: review_file,
            });
        }

        let role = Role::Implementer;
        let cfg = self.config.agents.role(role);
        let task = self.store.read()?.task;
        let template = cfg.fix_prompt.as_deref().unwrap_or(DEFAULT_FIX_PROMPT);
        let prompt = self.prompt_context(&task).render(template);

        info!(review = %review_file.display(), "implementer fixing from review");
        let start = Instant::now();
        let result = self.invoke(role, cfg, &prompt).await;
        self.record(role, Operation::Fix, &task, start, &result, None);

        match result {
            Ok(_) => {
                info!("fix from review completed");
                Ok(())
            }
            Err(e) => {
                error!(err = %e, "fix from review failed");
                Err(e)
            }
        }
    }

    /// Run the reviewer once and classify its review.
    ///
    /// The verdict is persisted: OK as `done`, NEED_FIX as `needs_fix`,
    /// anything else as `unknown`. A review file that is still missing after
    /// the bounded wait, or that has neither changed mtime nor content since
    /// before the run, is UNKNOWN.
    pub async fn review_once(&self) -> Result<Verdict> {
        let role = Role::Reviewer;
        let cfg = self.config.agents.role(role);
        let review_file = self.review_file()?;
        let task = self.store.read()?.task;

        ensure_parent_dir(&review_file)?;
        let before = ArtifactSnapshot::take(&review_file);

        info!(
            command = %cfg.command,
            review = %review_file.display(),
            "reviewing"
        );
        self.store.set(role, StepState::InProgress)?;

        let prompt = self.prompt_context(&task).render(&cfg.prompt);
        let start = Instant::now();
        let result = self.invoke(role, cfg, &prompt).await;
        if result.is_err() {
            self.record(role, Operation::Review, &task, start, &result, None);
        }
        let result = match result {
            Ok(outcome) => Ok(outcome),
            Err(e) => return Err(self.fail(role, e)?),
        };

        let verdict = match self.wait_for_artifact(&review_file).await {
            Ok(true) => classify_review(&review_file, before.as_ref()),
            Ok(false) => {
                warn!(review = %review_file.display(), "review file not found after waiting");
                Verdict::Unknown
            }
            Err(e) => return Err(self.fail(role, e)?),
        };
        self.record(role, Operation::Review, &task, start, &result, Some(verdict));

        let state = match verdict {
            Verdict::Ok => StepState::Done,
            Verdict::NeedFix => StepState::NeedsFix,
            Verdict::Unknown => StepState::Unknown,
        };
        self.store.set(role, state)?;
        info!(%verdict, "review classified");
        Ok(verdict)
    }

    /// Poll for `path`: once immediately, then up to the configured number of
    /// attempts.
    async fn wait_for_artifact(&self, path: &Path) -> Result<bool> {
        if path.exists() {
            return Ok(true);
        }

        let attempts = self.config.controller.artifact_wait_attempts;
        let interval = self.config.controller.artifact_wait_interval();
        for attempt in 1..=attempts {
            if self.runner.shutdown_requested() {
                return Err(PipelineError::Interrupted);
            }
            info!(attempt, attempts, "waiting for review file");
            tokio::time::sleep(interval).await;
            if path.exists() {
                return Ok(true);
            }
        }
        Ok(false)
    }

    async fn invoke(&self, role: Role, cfg: &RoleConfig, prompt: &str) -> Result<ProcessOutcome> {
        let review_file = self.config.primary_output(Role::Reviewer);
        let invocation = build_invocation(
            role,
            cfg,
            self.runner.working_dir(),
            review_file.as_deref(),
        );
        let options = RunOptions {
            timeout: cfg.timeout(),
            allow_non_zero_exit: cfg.allow_non_zero_exit,
        };
        self.runner
            .run(role.as_str(), &invocation, prompt, &options)
            .await
    }

    /// Persist the state for a failed run and hand the error back.
    fn fail(&self, role: Role, err: PipelineError) -> Result<PipelineError> {
        if matches!(err, PipelineError::Interrupted) {
            warn!(%role, "interrupted, returning to pending");
            self.store.set(role, StepState::Pending)?;
        } else {
            error!(%role, err = %err, "failed");
            self.store.set(role, StepState::Failed)?;
        }
        Ok(err)
    }

    fn warn_missing_inputs(&self, role: Role, cfg: &RoleConfig) {
        for entry in cfg.reads.iter().filter(|e| !is_glob(e)) {
            let path = self.config.resolve_artifact(entry);
            if !path.exists() {
                warn!(%role, path = %path.display(), "input not found, continuing");
            }
        }
    }

    fn review_file(&self) -> Result<PathBuf> {
        self.config.primary_output(Role::Reviewer).ok_or_else(|| {
            PipelineError::Config("reviewer has no review file in `writes`".to_string())
        })
    }

    fn prompt_context<'a>(&self, task: &'a str) -> OwnedPromptContext<'a> {
        OwnedPromptContext {
            task,
            project_root: self.runner.working_dir().to_path_buf(),
            plan_file: self.config.primary_output(Role::Planner),
            review_file: self.config.primary_output(Role::Reviewer),
            test_report_file: self.config.primary_output(Role::Tester),
        }
    }

    fn record(
        &self,
        role: Role,
        operation: Operation,
        task: &str,
        start: Instant,
        result: &Result<ProcessOutcome>,
        verdict: Option<Verdict>,
    ) {
        let (success, exit_code, outcome) = match result {
            Ok(out) => (
                true,
                out.exit_code(),
                verdict.map_or_else(|| "completed".to_string(), |v| v.to_string()),
            ),
            Err(PipelineError::NonZeroExit { code, .. }) => (false, Some(*code), result_text(result)),
            Err(_) => (false, None, result_text(result)),
        };
        let entry = InvocationRecord {
            timestamp: Utc::now(),
            task: task.to_string(),
            agent: role.as_str().to_string(),
            operation,
            success,
            exit_code,
            duration_secs: start.elapsed().as_secs_f64(),
            outcome,
        };
        if let Err(e) = self.history.append(&entry) {
            warn!(%role, err = %e, "failed to record history");
        }
    }
}

fn result_text(result: &Result<ProcessOutcome>) -> String {
    result
        .as_ref()
        .err()
        .map_or_else(|| "completed".to_string(), ToString::to_string)
}

/// Prompt values with owned paths
struct OwnedPromptContext<'a> {
    task: &'a str,
    project_root: PathBuf,
    plan_file: Option<PathBuf>,
    review_file: Option<PathBuf>,
    test_report_file: Option<PathBuf>,
}

impl OwnedPromptContext<'_> {
    fn render(&self, template: &str) -> String {
        PromptContext {
            task: self.task,
            project_root: &self.project_root,
            plan_file: self.plan_file.as_deref(),
            review_file: self.review_file.as_deref(),
            test_report_file: self.test_report_file.as_deref(),
        }
        .render(template)
    }
}

fn classify_review(review_file: &Path, before: Option<&ArtifactSnapshot>) -> Verdict {
    let after = ArtifactSnapshot::take(review_file);
    if before.is_some() && after.as_ref() == before {
        warn!(review = %review_file.display(), "review file unchanged, possible stale output");
        return Verdict::Unknown;
    }

    let Some(content) = after.and_then(|s| s.content) else {
        warn!(review = %review_file.display(), "review file unreadable");
        return Verdict::Unknown;
    };

    let preview: Vec<&str> = content.lines().take(REVIEW_PREVIEW_LINES).collect();
    debug!(preview = %preview.join("\n"), "review preview");

    let verdict = Verdict::classify(&content);
    if verdict == Verdict::Unknown {
        warn!("no status marker found in review");
    }
    verdict
}

fn ensure_parent_dir(path: &Path) -> Result<()> {
    match path.parent() {
        Some(dir) if !dir.as_os_str().is_empty() => std::fs::create_dir_all(dir)
            .map_err(|e| PipelineError::io(format!("create {}", dir.display()), e)),
        _ => Ok(()),
    }
}
