//! Command-line construction per role
//!
//! Most agents take their configured command and args as-is. The reviewer
//! running `codex` needs its arguments rewritten: `codex review` prints the
//! review to stdout (captured into the review file), while `codex exec` is told
//! where to work and where to write its last message.

use std::path::Path;

use crate::process::Invocation;
use crate::status::Role;

use super::config::RoleConfig;

const CODEX: &str = "codex";

/// Build the command line for one run of `role`.
///
/// `review_file` is the reviewer's resolved primary output; it is only used
/// for the codex rewrite.
#[must_use]
pub fn build_invocation(
    role: Role,
    config: &RoleConfig,
    project_root: &Path,
    review_file: Option<&Path>,
) -> Invocation {
    let mut invocation = Invocation::new(config.command.clone(), config.args.clone());

    if role != Role::Reviewer || !is_codex(&config.command) {
        return invocation;
    }

    let args = &mut invocation.args;
    let has_exec = args.iter().any(|a| a == "exec" || a == "e");
    let has_review = args.iter().any(|a| a == "review");

    if has_exec {
        add_exec_flags(args, project_root, review_file);
    } else {
        if !has_review {
            args.insert(0, "review".to_string());
        }
        invocation.capture_output = review_file.map(Path::to_path_buf);
    }

    if invocation.args.last().map(String::as_str) != Some("-") {
        invocation.args.push("-".to_string());
    }
    invocation
}

fn is_codex(command: &str) -> bool {
    Path::new(command)
        .file_name()
        .is_some_and(|name| name == CODEX)
}

fn add_exec_flags(args: &mut Vec<String>, project_root: &Path, review_file: Option<&Path>) {
    // A trailing stdin marker must stay last
    if args.last().map(String::as_str) == Some("-") {
        args.pop();
    }

    let has = |args: &[String], flag: &str| args.iter().any(|a| a == flag);

    if !has(args, "-C") && !has(args, "--cd") {
        args.push("-C".to_string());
        args.push(project_root.display().to_string());
    }
    if !has(args, "--skip-git-repo-check") {
        args.push("--skip-git-repo-check".to_string());
    }
    if !has(args, "--color") && !has(args, "--colour") {
        args.push("--color".to_string());
        args.push("never".to_string());
    }
    if let Some(review_file) = review_file {
        if !has(args, "--output-last-message") && !has(args, "-o") {
            args.push("--output-last-message".to_string());
            args.push(review_file.display().to_string());
        }
    }
    // codex rejects --full-auto alongside the sandbox bypass
    if !has(args, "--full-auto") && !has(args, "--dangerously-bypass-approvals-and-sandbox") {
        args.push("--full-auto".to_string());
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;

    fn reviewer(args: &[&str]) -> RoleConfig {
        let mut cfg = RoleConfig::default_for(Role::Reviewer);
        cfg.args = args.iter().map(ToString::to_string).collect();
        cfg
    }

    fn root() -> PathBuf {
        PathBuf::from("/work/app")
    }

    fn review() -> PathBuf {
        root().join("docs/AI_REVIEW.md")
    }

    #[test]
    fn test_non_reviewer_passes_through() {
        let mut cfg = RoleConfig::default_for(Role::Planner);
        cfg.command = "codex".to_string();
        cfg.args = vec!["exec".to_string()];

        let inv = build_invocation(Role::Planner, &cfg, &root(), Some(&review()));

        assert_eq!(inv.command, "codex");
        assert_eq!(inv.args, vec!["exec"]);
        assert_eq!(inv.capture_output, None);
    }

    #[test]
    fn test_other_reviewer_command_passes_through() {
        let mut cfg = reviewer(&["--print"]);
        cfg.command = "claude".to_string();

        let inv = build_invocation(Role::Reviewer, &cfg, &root(), Some(&review()));

        assert_eq!(inv.args, vec!["--print"]);
        assert_eq!(inv.capture_output, None);
    }

    #[test]
    fn test_codex_defaults_to_review_with_capture() {
        let inv = build_invocation(Role::Reviewer, &reviewer(&[]), &root(), Some(&review()));

        assert_eq!(inv.args, vec!["review", "-"]);
        assert_eq!(inv.capture_output, Some(review()));
    }

    #[test]
    fn test_codex_explicit_review_kept() {
        let inv = build_invocation(
            Role::Reviewer,
            &reviewer(&["review", "--uncommitted"]),
            &root(),
            Some(&review()),
        );

        assert_eq!(inv.args, vec!["review", "--uncommitted", "-"]);
        assert_eq!(inv.capture_output, Some(review()));
    }

    #[test]
    fn test_codex_exec_gets_flags() {
        let inv = build_invocation(Role::Reviewer, &reviewer(&["exec"]), &root(), Some(&review()));

        assert_eq!(
            inv.args,
            vec![
                "exec",
                "-C",
                "/work/app",
                "--skip-git-repo-check",
                "--color",
                "never",
                "--output-last-message",
                "/work/app/docs/AI_REVIEW.md",
                "--full-auto",
                "-",
            ]
        );
        assert_eq!(inv.capture_output, None);
    }

    #[test]
    fn test_codex_exec_existing_flags_not_duplicated() {
        let inv = build_invocation(
            Role::Reviewer,
            &reviewer(&["e", "-C", "/elsewhere", "--color", "always", "--full-auto", "-"]),
            &root(),
            Some(&review()),
        );

        assert_eq!(inv.args.iter().filter(|a| *a == "-C").count(), 1);
        assert_eq!(inv.args.iter().filter(|a| *a == "--color").count(), 1);
        assert_eq!(inv.args.iter().filter(|a| *a == "--full-auto").count(), 1);
        assert_eq!(inv.args.iter().filter(|a| *a == "-").count(), 1);
        assert_eq!(inv.args.last().unwrap(), "-");
        assert!(inv.args.contains(&"--skip-git-repo-check".to_string()));
    }

    #[test]
    fn test_codex_exec_respects_alternative_spellings() {
        let inv = build_invocation(
            Role::Reviewer,
            &reviewer(&[
                "exec",
                "--dangerously-bypass-approvals-and-sandbox",
                "--colour",
                "never",
            ]),
            &root(),
            Some(&review()),
        );

        assert!(!inv.args.contains(&"--color".to_string()), "args: {:?}", inv.args);
        assert!(!inv.args.contains(&"--full-auto".to_string()), "args: {:?}", inv.args);
        assert_eq!(inv.args.iter().filter(|a| *a == "--colour").count(), 1);
        assert_eq!(inv.args.last().unwrap(), "-");
    }

    #[test]
    fn test_codex_matched_by_file_name() {
        let mut cfg = reviewer(&[]);
        cfg.command = "/usr/local/bin/codex".to_string();

        let inv = build_invocation(Role::Reviewer, &cfg, &root(), Some(&review()));

        assert_eq!(inv.args, vec!["review", "-"]);
    }
}
