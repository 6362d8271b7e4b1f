#![allow(missing_docs)]

use std::time::{Duration, Instant};

use tempfile::TempDir;
use tokio::sync::watch;

use baton::{
    HistoryLog, Operation, PassOutcome, PipelineConfig, PipelineController, PipelineError,
    ProcessRunner, Role, StatusStore, StepState, Verdict,
};

const TEST_CONFIG: &str = r#"
[project]
log_dir = "agent-logs"
status_file = "state/status.json"

[review_loop]
max_loops = 2

[controller]
poll_interval_ms = 10
failure_backoff_ms = 10
max_pass_retries = 1
artifact_wait_attempts = 2
artifact_wait_interval_ms = 10

[agents.planner]
command = "sh"
args = ["-c", "mkdir -p docs && cat > docs/AI_PLAN.md && echo planned"]

[agents.implementer]
command = "sh"
args = ["-c", "cat > /dev/null; printf '\\033[32mimplemented\\033[0m\\n'"]

[agents.tester]
command = "sh"
args = ["-c", "mkdir -p docs && echo 'all green' > docs/AI_TEST_REPORT.md"]

[agents.reviewer]
command = "sh"
args = ["-c", "mkdir -p docs && echo '[STATUS]: NO_CRITICAL_ISSUES' > docs/AI_REVIEW.md"]
"#;

fn setup(text: &str) -> (TempDir, PipelineConfig) {
    let tmp = TempDir::new().unwrap();
    let path = tmp.path().join("baton.toml");
    std::fs::write(&path, text).unwrap();
    let config = PipelineConfig::from_path(&path).unwrap();
    (tmp, config)
}

fn controller(config: PipelineConfig) -> PipelineController {
    let runner = ProcessRunner::new(config.project_root()).with_log_dir(config.log_dir());
    PipelineController::new(config, runner)
}

/// Integration test: config file → pass → status, agent logs and history.
///
/// Tests the complete data flow: parse config → set task → run pass →
/// verify status file, per-agent log files and history.jsonl.
#[tokio::test]
async fn test_config_file_drives_full_pass() {
    let (tmp, config) = setup(TEST_CONFIG);
    assert_eq!(config.status_file(), tmp.path().join("state/status.json"));

    // Step 1: set the task through the configured status file
    let store = StatusStore::new(config.status_file());
    store.set_task("ship the release").unwrap();

    // Step 2: run one pass
    let log_dir = config.log_dir();
    let ctl = controller(config);
    let outcome = ctl.run_pass().await.unwrap();
    assert!(matches!(outcome, PassOutcome::Completed(_)), "got: {outcome:?}");
    assert!(store.read().unwrap().all_done());

    // Step 3: one log file per role, with header and footer
    for role in Role::ALL {
        let path = log_dir.join(format!("{role}.log"));
        assert!(path.exists(), "missing {}", path.display());
    }
    let planner_log = std::fs::read_to_string(log_dir.join("planner.log")).unwrap();
    assert!(planner_log.contains("planned"));

    // Escape sequences are stripped from log files
    let implementer_log = std::fs::read_to_string(log_dir.join("implementer.log")).unwrap();
    assert!(implementer_log.contains("implemented"));
    assert!(!implementer_log.contains('\u{1b}'));

    // Step 4: history has one record per invocation, in order
    let records = HistoryLog::new(&log_dir).read_all().unwrap();
    let agents: Vec<_> = records.iter().map(|r| r.agent.as_str()).collect();
    assert_eq!(agents, ["planner", "implementer", "tester", "reviewer"]);
    assert_eq!(records[3].operation, Operation::Review);
    assert!(records.iter().all(|r| r.success && r.task == "ship the release"));
}

#[tokio::test]
async fn test_history_records_fix_operation() {
    let text = TEST_CONFIG.replace(
        "echo '[STATUS]: NO_CRITICAL_ISSUES' > docs/AI_REVIEW.md",
        "if [ -f docs/reviewed ]; then echo '[STATUS]: NO_CRITICAL_ISSUES' > docs/AI_REVIEW.md; \
         else touch docs/reviewed; echo '[STATUS]: CRITICAL_ISSUES' > docs/AI_REVIEW.md; fi",
    );
    let (_tmp, config) = setup(&text);
    StatusStore::new(config.status_file()).set_task("fix me").unwrap();
    let log_dir = config.log_dir();

    let outcome = controller(config).run_pass().await.unwrap();

    let PassOutcome::Completed(report) = outcome else {
        panic!("expected a completed pass, got {outcome:?}");
    };
    assert_eq!((report.reviews, report.fixes, report.retests), (2, 1, 1));

    let records = HistoryLog::new(&log_dir).read_all().unwrap();
    let ops: Vec<_> = records
        .iter()
        .map(|r| format!("{}:{}", r.agent, r.operation.as_str()))
        .collect();
    assert_eq!(
        ops,
        [
            "planner:run",
            "implementer:run",
            "tester:run",
            "reviewer:review",
            "implementer:fix",
            "tester:run",
            "reviewer:review",
        ]
    );
    assert_eq!(records[3].outcome, Verdict::NeedFix.as_str());
    assert_eq!(records[6].outcome, Verdict::Ok.as_str());
}

#[tokio::test]
async fn test_missing_command_fails_role() {
    let text = TEST_CONFIG.replacen(
        "[agents.planner]\ncommand = \"sh\"",
        "[agents.planner]\ncommand = \"baton-test-no-such-agent\"",
        1,
    );
    let (_tmp, config) = setup(&text);
    let store = StatusStore::new(config.status_file());
    store.set_task("anything").unwrap();

    let outcome = controller(config).run_pass().await.unwrap();

    let PassOutcome::Failed { error } = outcome else {
        panic!("expected a failed pass, got {outcome:?}");
    };
    assert!(error.contains("baton-test-no-such-agent"), "error: {error}");
    let record = store.read().unwrap();
    assert_eq!(record.planner, StepState::Failed);
    assert_eq!(record.implementer, StepState::Pending);
}

/// Integration test: a hung agent is terminated at its timeout.
#[tokio::test]
async fn test_timeout_terminates_agent() {
    let text = TEST_CONFIG.replace(
        "args = [\"-c\", \"cat > /dev/null; printf",
        "timeout_ms = 200\nargs = [\"-c\", \"cat > /dev/null; sleep 30; printf",
    );
    let (_tmp, config) = setup(&text);
    let store = StatusStore::new(config.status_file());
    store.set_task("hang").unwrap();

    let start = Instant::now();
    let outcome = controller(config).run_pass().await.unwrap();

    assert!(start.elapsed() < Duration::from_secs(10));
    let PassOutcome::Failed { error } = outcome else {
        panic!("expected a failed pass, got {outcome:?}");
    };
    assert!(error.contains("timed out"), "error: {error}");
    assert_eq!(store.read().unwrap().implementer, StepState::Failed);
}

/// Integration test: shutdown during an agent run stops the pass and leaves
/// the interrupted role pending.
#[tokio::test]
async fn test_shutdown_interrupts_pass() {
    let text = TEST_CONFIG.replace(
        "args = [\"-c\", \"cat > /dev/null; printf",
        "args = [\"-c\", \"cat > /dev/null; sleep 30; printf",
    );
    let (_tmp, config) = setup(&text);
    let store = StatusStore::new(config.status_file());
    store.set_task("interrupt me").unwrap();

    let (tx, rx) = watch::channel(false);
    let runner = ProcessRunner::new(config.project_root())
        .with_log_dir(config.log_dir())
        .with_shutdown(rx);
    let mut ctl = PipelineController::new(config, runner);

    // The task hands the sender back so it outlives the send
    let _sender = tokio::spawn(async move {
        tokio::time::sleep(Duration::from_millis(300)).await;
        let _ = tx.send(true);
        tx
    });

    let start = Instant::now();
    let err = ctl.run_pass().await.unwrap_err();
    assert!(matches!(err, PipelineError::Interrupted), "got: {err:?}");
    assert!(start.elapsed() < Duration::from_secs(10));

    let record = store.read().unwrap();
    assert_eq!(record.planner, StepState::Done);
    assert_eq!(record.implementer, StepState::Pending);

    // The loop notices the flag and stops cleanly
    ctl.run().await.unwrap();
}

#[test]
fn test_unknown_config_key_rejected() {
    let text = format!("{TEST_CONFIG}\n[agents.reviewer.extra]\nfoo = 1\n");
    let tmp = TempDir::new().unwrap();
    let path = tmp.path().join("baton.toml");
    std::fs::write(&path, text).unwrap();

    assert!(PipelineConfig::from_path(&path).is_err());
}
