//! Terminal display for pipeline status
//!
//! Renders the status record, pass results and history lines.
//! All output goes to stderr so stdout stays free for agent output.

use colored::{ColoredString, Colorize};

use crate::log::InvocationRecord;
use crate::pipeline::{PassOutcome, ReviewReport};
use crate::status::{Role, StatusRecord, StepState};

const TASK_WIDTH: usize = 70;

/// Icon and color for a step state.
#[must_use]
pub fn state_badge(state: StepState) -> ColoredString {
    match state {
        StepState::Pending => "○ pending".dimmed(),
        StepState::InProgress => "◐ in_progress".cyan(),
        StepState::Done => "● done".green(),
        StepState::Failed => "✗ failed".red().bold(),
        StepState::NeedsFix => "! needs_fix".yellow().bold(),
        StepState::Unknown => "? unknown".yellow(),
    }
}

/// Print the status record.
pub fn print_status(record: &StatusRecord) {
    eprintln!("\n{}", "=== Pipeline status ===".bold().cyan());
    let task = if record.has_task() {
        truncate(&record.task, TASK_WIDTH)
    } else {
        "(none)".to_string()
    };
    eprintln!("  {:<12} {}", "Task:".dimmed(), task.bold());
    for role in Role::ALL {
        eprintln!("  {:<12} {}", format!("{}:", role.title()), state_badge(record.state(role)));
    }
    eprintln!("{}", "─".repeat(50).dimmed());
}

/// Print the result of one pass.
pub fn print_pass_outcome(outcome: &PassOutcome) {
    match outcome {
        PassOutcome::Completed(report) => {
            eprintln!("  {} {}", "COMPLETED".green().bold(), review_summary(report));
        }
        PassOutcome::Unresolved(report) => {
            eprintln!("  {} {}", "UNRESOLVED".yellow().bold(), review_summary(report));
            eprintln!(
                "  {}",
                "Reset the reviewer or set a new task to continue.".dimmed()
            );
        }
        PassOutcome::Failed { error } => {
            eprintln!("  {} {}", "FAILED".red().bold(), error.red());
        }
    }
}

/// One-line summary of a review loop.
#[must_use]
pub fn review_summary(report: &ReviewReport) -> String {
    format!(
        "verdict {} | {} review(s), {} fix(es), {} retest(s)",
        report.verdict, report.reviews, report.fixes, report.retests
    )
}

/// Print history records, oldest first.
pub fn print_history(records: &[InvocationRecord]) {
    if records.is_empty() {
        eprintln!("  {}", "No invocations recorded.".dimmed());
        return;
    }
    for record in records {
        let line = format_history_line(record);
        if record.success {
            eprintln!("  {line}");
        } else {
            eprintln!("  {}", line.red());
        }
    }
}

/// Plain-text rendering of one history record.
#[must_use]
pub fn format_history_line(record: &InvocationRecord) -> String {
    let code = record
        .exit_code
        .map_or_else(|| "-".to_string(), |c| c.to_string());
    format!(
        "{} {:<11} {:<6} {:>7.1}s exit {:<3} {}",
        record.timestamp.format("%Y-%m-%d %H:%M:%S"),
        record.agent,
        record.operation.as_str(),
        record.duration_secs,
        code,
        truncate(&record.outcome, TASK_WIDTH)
    )
}

/// Shorten `text` to at most `max` characters, marking the cut with `...`.
#[must_use]
pub fn truncate(text: &str, max: usize) -> String {
    if text.chars().count() <= max {
        return text.to_string();
    }
    let kept: String = text.chars().take(max.saturating_sub(3)).collect();
    format!("{kept}...")
}
