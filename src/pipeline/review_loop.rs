//! Bounded review/fix cycle
//!
//! The reviewer runs once. While it asks for fixes and fewer than `max_loops`
//! reviews have run, the implementer fixes from the review, the tester and
//! reviewer are reset and re-run, and the new review is classified.

use tracing::{info, warn};

use super::verdict::Verdict;
use crate::agent::config::ReviewLoopConfig;
use crate::agent::AgentStep;
use crate::error::Result;
use crate::status::{Role, StepState};

/// Result of one review loop
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ReviewReport {
    /// Final verdict
    pub verdict: Verdict,
    /// Reviewer runs
    pub reviews: u32,
    /// Fix-from-review runs attempted
    pub fixes: u32,
    /// Tester re-runs after a fix
    pub retests: u32,
}

impl ReviewReport {
    const fn resolved(verdict: Verdict) -> Self {
        Self {
            verdict,
            reviews: 0,
            fixes: 0,
            retests: 0,
        }
    }
}

/// The reviewer → fix → retest → re-review cycle
#[derive(Debug)]
pub struct ReviewLoop<'a> {
    steps: &'a AgentStep,
    config: ReviewLoopConfig,
}

impl<'a> ReviewLoop<'a> {
    /// Loop over `steps` with the given bounds.
    #[must_use]
    pub const fn new(steps: &'a AgentStep, config: ReviewLoopConfig) -> Self {
        Self { steps, config }
    }

    /// Drive the loop to a verdict and persist the reviewer's final state:
    /// `done` for OK, `unknown` otherwise.
    ///
    /// A failed fix ends the loop with NEED_FIX. Tester and reviewer process
    /// failures propagate.
    pub async fn run(&self) -> Result<ReviewReport> {
        let store = self.steps.store();

        if !self.config.enabled {
            info!("review loop disabled, marking reviewer done");
            store.set(Role::Reviewer, StepState::Done)?;
            return Ok(ReviewReport::resolved(Verdict::Ok));
        }

        if store.read()?.reviewer == StepState::Done {
            info!("reviewer already done, skipping review loop");
            return Ok(ReviewReport::resolved(Verdict::Ok));
        }

        let max_loops = self.config.max_loops.max(1);
        let mut report = ReviewReport::resolved(self.steps.review_once().await?);
        report.reviews = 1;
        let mut iteration = 1;

        while report.verdict == Verdict::NeedFix && iteration < max_loops {
            iteration += 1;
            info!(iteration, max_loops, "review requested fixes");

            report.fixes += 1;
            if let Err(e) = self.steps.fix_from_review().await {
                if !e.is_step_failure() {
                    return Err(e);
                }
                warn!(err = %e, "fix failed, review stays unresolved");
                break;
            }

            store.reset(&[Role::Tester, Role::Reviewer])?;
            self.steps.run_if_needed(Role::Tester).await?;
            report.retests += 1;

            report.verdict = self.steps.review_once().await?;
            report.reviews += 1;
        }

        if report.verdict == Verdict::NeedFix && iteration >= max_loops {
            warn!(max_loops, "review loop exhausted with issues remaining");
        }

        let final_state = if report.verdict == Verdict::Ok {
            StepState::Done
        } else {
            StepState::Unknown
        };
        store.set(Role::Reviewer, final_state)?;
        info!(
            verdict = %report.verdict,
            reviews = report.reviews,
            fixes = report.fixes,
            retests = report.retests,
            "review loop finished"
        );
        Ok(report)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testutil::{
        agent_step, call_count, reviewer_script, scripted_config, set_script, NEED_FIX,
        NO_MARKER, OK,
    };
    use tempfile::TempDir;

    fn loop_config(max_loops: u32) -> ReviewLoopConfig {
        ReviewLoopConfig {
            enabled: true,
            max_loops,
        }
    }

    #[tokio::test]
    async fn test_ok_on_first_review() {
        let tmp = TempDir::new().unwrap();
        let steps = agent_step(scripted_config(tmp.path()));

        let report = ReviewLoop::new(&steps, loop_config(3)).run().await.unwrap();

        assert_eq!(report.verdict, Verdict::Ok);
        assert_eq!((report.reviews, report.fixes, report.retests), (1, 0, 0));
        assert_eq!(steps.store().read().unwrap().reviewer, StepState::Done);
    }

    #[tokio::test]
    async fn test_fix_then_ok() {
        let tmp = TempDir::new().unwrap();
        let mut config = scripted_config(tmp.path());
        set_script(
            &mut config,
            Role::Reviewer,
            &reviewer_script(&[NEED_FIX, NEED_FIX, OK]),
        );
        let steps = agent_step(config);

        let report = ReviewLoop::new(&steps, loop_config(3)).run().await.unwrap();

        assert_eq!(report.verdict, Verdict::Ok);
        assert_eq!((report.reviews, report.fixes, report.retests), (3, 2, 2));
        assert_eq!(call_count(tmp.path(), Role::Reviewer), 3);
        assert_eq!(call_count(tmp.path(), Role::Implementer), 2);
        assert_eq!(call_count(tmp.path(), Role::Tester), 2);
        assert_eq!(steps.store().read().unwrap().reviewer, StepState::Done);
    }

    #[tokio::test]
    async fn test_loop_bounded_by_max_loops() {
        let tmp = TempDir::new().unwrap();
        let mut config = scripted_config(tmp.path());
        set_script(&mut config, Role::Reviewer, &reviewer_script(&[NEED_FIX]));
        let steps = agent_step(config);

        let report = ReviewLoop::new(&steps, loop_config(2)).run().await.unwrap();

        assert_eq!(report.verdict, Verdict::NeedFix);
        assert_eq!(call_count(tmp.path(), Role::Reviewer), 2);
        assert_eq!(steps.store().read().unwrap().reviewer, StepState::Unknown);
    }

    #[tokio::test]
    async fn test_single_loop_never_fixes() {
        let tmp = TempDir::new().unwrap();
        let mut config = scripted_config(tmp.path());
        set_script(&mut config, Role::Reviewer, &reviewer_script(&[NEED_FIX]));
        let steps = agent_step(config);

        let report = ReviewLoop::new(&steps, loop_config(1)).run().await.unwrap();

        assert_eq!(report.verdict, Verdict::NeedFix);
        assert_eq!(report.fixes, 0);
        assert_eq!(call_count(tmp.path(), Role::Implementer), 0);
    }

    #[tokio::test]
    async fn test_unknown_first_review_resolves_immediately() {
        let tmp = TempDir::new().unwrap();
        let mut config = scripted_config(tmp.path());
        set_script(&mut config, Role::Reviewer, &reviewer_script(&[NO_MARKER]));
        let steps = agent_step(config);

        let report = ReviewLoop::new(&steps, loop_config(3)).run().await.unwrap();

        assert_eq!(report.verdict, Verdict::Unknown);
        assert_eq!(report.reviews, 1);
        assert_eq!(call_count(tmp.path(), Role::Implementer), 0);
        assert_eq!(steps.store().read().unwrap().reviewer, StepState::Unknown);
    }

    #[tokio::test]
    async fn test_failed_fix_resolves_need_fix() {
        let tmp = TempDir::new().unwrap();
        let mut config = scripted_config(tmp.path());
        set_script(&mut config, Role::Reviewer, &reviewer_script(&[NEED_FIX]));
        set_script(&mut config, Role::Implementer, "exit 4");
        let steps = agent_step(config);

        let report = ReviewLoop::new(&steps, loop_config(3)).run().await.unwrap();

        assert_eq!(report.verdict, Verdict::NeedFix);
        assert_eq!((report.reviews, report.fixes, report.retests), (1, 1, 0));
        assert_eq!(call_count(tmp.path(), Role::Tester), 0);
        assert_eq!(steps.store().read().unwrap().reviewer, StepState::Unknown);
    }

    #[tokio::test]
    async fn test_disabled_loop_marks_reviewer_done() {
        let tmp = TempDir::new().unwrap();
        let steps = agent_step(scripted_config(tmp.path()));
        let config = ReviewLoopConfig {
            enabled: false,
            max_loops: 3,
        };

        let report = ReviewLoop::new(&steps, config).run().await.unwrap();

        assert_eq!(report.verdict, Verdict::Ok);
        assert_eq!(call_count(tmp.path(), Role::Reviewer), 0);
        assert_eq!(steps.store().read().unwrap().reviewer, StepState::Done);
    }

    #[tokio::test]
    async fn test_done_reviewer_skips_loop() {
        let tmp = TempDir::new().unwrap();
        let steps = agent_step(scripted_config(tmp.path()));
        steps.store().set(Role::Reviewer, StepState::Done).unwrap();

        let report = ReviewLoop::new(&steps, loop_config(3)).run().await.unwrap();

        assert_eq!(report.verdict, Verdict::Ok);
        assert_eq!(report.reviews, 0);
        assert_eq!(call_count(tmp.path(), Role::Reviewer), 0);
    }

    #[tokio::test]
    async fn test_reviewer_process_failure_propagates() {
        let tmp = TempDir::new().unwrap();
        let mut config = scripted_config(tmp.path());
        set_script(&mut config, Role::Reviewer, "exit 1");
        let steps = agent_step(config);

        let err = ReviewLoop::new(&steps, loop_config(3)).run().await.unwrap_err();

        assert!(err.is_step_failure(), "got: {err}");
        assert_eq!(steps.store().read().unwrap().reviewer, StepState::Failed);
    }
}
