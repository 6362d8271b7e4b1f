//! Pipeline controller
//!
//! Polls the status file and drives passes: planner, implementer and tester in
//! order, then the review loop. A changed task resets every role. Failed passes
//! are retried after a backoff until the retry budget runs out, at which point
//! the controller settles and waits for the status record to change.

use std::sync::Arc;

use tokio::sync::watch;
use tracing::{error, info, warn};

use super::review_loop::{ReviewLoop, ReviewReport};
use super::verdict::Verdict;
use crate::agent::config::PipelineConfig;
use crate::agent::AgentStep;
use crate::error::{PipelineError, Result};
use crate::process::runner::wait_for_shutdown;
use crate::process::ProcessRunner;
use crate::status::{Role, StatusRecord, StatusStore};

/// How a single pass ended
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PassOutcome {
    /// Every role is done
    Completed(ReviewReport),
    /// The review loop ended without an OK verdict
    Unresolved(ReviewReport),
    /// A step failed; the pass will be retried
    Failed {
        /// Error message of the failing step
        error: String,
    },
}

/// What one controller iteration did
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TickOutcome {
    /// No task is set
    NoTask,
    /// All roles are done for the current task
    Complete,
    /// Waiting for the status record to change after giving up on a task
    Settled,
    /// A pass ran
    Ran(PassOutcome),
}

/// Drives passes against the persisted status
#[derive(Debug)]
pub struct PipelineController {
    config: Arc<PipelineConfig>,
    store: StatusStore,
    steps: AgentStep,
    shutdown: Option<watch::Receiver<bool>>,
    last_task: Option<String>,
    consecutive_failures: u32,
    settled_on: Option<StatusRecord>,
}

impl PipelineController {
    /// Controller over `config`, running agents through `runner`. The runner's
    /// shutdown flag also ends the controller loop.
    #[must_use]
    pub fn new(config: PipelineConfig, runner: ProcessRunner) -> Self {
        let config = Arc::new(config);
        let store = StatusStore::new(config.status_file());
        let shutdown = runner.shutdown_receiver();
        let steps = AgentStep::new(Arc::clone(&config), store.clone(), runner);
        Self {
            config,
            store,
            steps,
            shutdown,
            last_task: None,
            consecutive_failures: 0,
            settled_on: None,
        }
    }

    /// The status store.
    #[must_use]
    pub const fn store(&self) -> &StatusStore {
        &self.store
    }

    /// Whether the controller is waiting for the status record to change.
    #[must_use]
    pub const fn is_settled(&self) -> bool {
        self.settled_on.is_some()
    }

    /// Poll and run passes until shutdown. Store errors are fatal.
    pub async fn run(&mut self) -> Result<()> {
        info!(status = %self.store.path().display(), "controller started");
        loop {
            if self.shutdown_requested() {
                info!("shutdown requested, stopping controller");
                return Ok(());
            }

            let pause = match self.tick().await {
                Ok(TickOutcome::Ran(PassOutcome::Failed { .. })) if !self.is_settled() => {
                    self.config.controller.failure_backoff()
                }
                Ok(_) => self.config.controller.poll_interval(),
                Err(PipelineError::Interrupted) => {
                    info!("pass interrupted, stopping controller");
                    return Ok(());
                }
                Err(e) => return Err(e),
            };

            tokio::select! {
                () = tokio::time::sleep(pause) => {}
                () = wait_for_shutdown(self.shutdown.clone()) => {}
            }
        }
    }

    /// One iteration: check the record and run a pass if there is work.
    pub async fn tick(&mut self) -> Result<TickOutcome> {
        let mut record = self.store.read()?;
        if !record.has_task() {
            self.last_task = Some(String::new());
            return Ok(TickOutcome::NoTask);
        }

        match self.last_task.as_deref() {
            None => {
                info!(task = %record.task, "resuming task");
            }
            Some(previous) if previous != record.task => {
                info!(previous, task = %record.task, "new task detected, resetting all roles");
                record = self.store.set_task(&record.task)?;
                self.consecutive_failures = 0;
                self.settled_on = None;
            }
            Some(_) => {}
        }
        self.last_task = Some(record.task.clone());

        if record.all_done() {
            return Ok(TickOutcome::Complete);
        }

        if let Some(settled) = &self.settled_on {
            if *settled == record {
                return Ok(TickOutcome::Settled);
            }
            info!("status changed, resuming");
            self.settled_on = None;
            self.consecutive_failures = 0;
        }

        let outcome = self.run_pass().await?;
        match &outcome {
            PassOutcome::Completed(_) => {
                self.consecutive_failures = 0;
                info!(task = %record.task, "pipeline completed");
            }
            PassOutcome::Unresolved(report) => {
                warn!(verdict = %report.verdict, "review unresolved, waiting for status change");
                self.settle()?;
            }
            PassOutcome::Failed { .. } => {
                self.consecutive_failures += 1;
                let limit = self.config.controller.max_pass_retries;
                if self.consecutive_failures >= limit {
                    warn!(attempts = self.consecutive_failures, "giving up on task, waiting for status change");
                    self.settle()?;
                }
            }
        }
        Ok(TickOutcome::Ran(outcome))
    }

    /// Run one pass over the current task.
    ///
    /// Step failures are reported as `PassOutcome::Failed`; store errors and
    /// interruption propagate.
    pub async fn run_pass(&self) -> Result<PassOutcome> {
        for role in [Role::Planner, Role::Implementer, Role::Tester] {
            if let Err(e) = self.steps.run_if_needed(role).await {
                return step_failure(e);
            }
        }

        let report = match ReviewLoop::new(&self.steps, self.config.review_loop).run().await {
            Ok(report) => report,
            Err(e) => return step_failure(e),
        };

        if report.verdict == Verdict::Ok {
            Ok(PassOutcome::Completed(report))
        } else {
            Ok(PassOutcome::Unresolved(report))
        }
    }

    fn settle(&mut self) -> Result<()> {
        self.settled_on = Some(self.store.read()?);
        Ok(())
    }

    fn shutdown_requested(&self) -> bool {
        self.shutdown.as_ref().is_some_and(|rx| *rx.borrow())
    }
}

fn step_failure(err: PipelineError) -> Result<PassOutcome> {
    if err.is_step_failure() {
        error!(err = %err, "pass failed");
        Ok(PassOutcome::Failed {
            error: err.to_string(),
        })
    } else {
        Err(err)
    }
}
