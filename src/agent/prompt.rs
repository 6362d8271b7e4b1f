//! Prompt rendering
//!
//! Role prompts are templates with `{{variable}}` placeholders, filled from the
//! current task and the resolved artifact paths. Unknown variables are left
//! as-is so agent-specific syntax survives.

use std::collections::HashMap;
use std::path::Path;

/// Planner prompt used when the configuration does not supply one.
pub const DEFAULT_PLANNER_PROMPT: &str = "\
You are the system planner and researcher.

Task: \"{{task}}\"
Project root: {{project_root}}

Analyze the requirements, then design the modules, features, entities, data
schema and API surface. Split the work into ordered phases. Write the plan as
Markdown to {{plan_file}}.

Do not write implementation code.";

/// Implementer prompt used when the configuration does not supply one.
pub const DEFAULT_IMPLEMENTER_PROMPT: &str = "\
You are the code implementer.

Task: \"{{task}}\"
Project root: {{project_root}}
Plan: {{plan_file}}
Earlier review, if present: {{review_file}}

Read the plan and implement phase 1 in the project. Write real code that
builds and runs, not pseudo code.";

/// Implementer prompt for a corrective run after a review.
pub const DEFAULT_FIX_PROMPT: &str = "\
You are the code implementer. A reviewer has reported issues in:
{{review_file}}

Read every issue and suggestion. Use the recommended patches as a reference.
Fix the code in {{project_root}} incrementally, critical issues first.

Do not rewrite the project from scratch.";

/// Tester prompt used when the configuration does not supply one.
pub const DEFAULT_TESTER_PROMPT: &str = "\
You are the test engineer.

Task: \"{{task}}\"
Project root: {{project_root}}
Plan: {{plan_file}}

Write unit and integration tests for the current code using the project's
test tooling. Run them if you can execute shell commands. Summarize passing
and failing tests, rough coverage and untested areas in {{test_report_file}}.";

/// Reviewer prompt used when the configuration does not supply one.
pub const DEFAULT_REVIEWER_PROMPT: &str = "\
You are the code reviewer.

Task: \"{{task}}\"
Project root: {{project_root}}
Plan: {{plan_file}}

Review the code against the plan for correctness, security, architecture and
readability. Write the review to {{review_file}}. It must contain exactly one
status line:

[STATUS]: CRITICAL_ISSUES
or
[STATUS]: NO_CRITICAL_ISSUES

Then list strengths, issues, suggestions and recommended patches.";

/// Values available to prompt templates
#[derive(Debug, Clone, Copy)]
pub struct PromptContext<'a> {
    /// Current task text
    pub task: &'a str,
    /// Directory agents run in
    pub project_root: &'a Path,
    /// Planner's primary output
    pub plan_file: Option<&'a Path>,
    /// Reviewer's primary output
    pub review_file: Option<&'a Path>,
    /// Tester's primary output
    pub test_report_file: Option<&'a Path>,
}

impl PromptContext<'_> {
    /// Variable map for [`expand_template`]. Artifacts that are not
    /// configured are absent, so their placeholders stay literal.
    #[must_use]
    pub fn vars(&self) -> HashMap<String, String> {
        let mut vars = HashMap::new();
        vars.insert("task".to_string(), self.task.to_string());
        vars.insert(
            "project_root".to_string(),
            self.project_root.display().to_string(),
        );
        let artifacts = [
            ("plan_file", self.plan_file),
            ("review_file", self.review_file),
            ("test_report_file", self.test_report_file),
        ];
        for (name, path) in artifacts {
            if let Some(path) = path {
                vars.insert(name.to_string(), path.display().to_string());
            }
        }
        vars
    }

    /// Render `template` with this context.
    #[must_use]
    pub fn render(&self, template: &str) -> String {
        expand_template(template, &self.vars())
    }
}

/// Expand `{{variable_name}}` patterns in a template string.
///
/// Names are looked up in `vars`. Unknown names, names containing whitespace
/// and unterminated `{{` are copied through unchanged.
#[must_use]
#[allow(clippy::implicit_hasher)]
pub fn expand_template(template: &str, vars: &HashMap<String, String>) -> String {
    let mut result = String::with_capacity(template.len());
    let mut rest = template;

    while let Some(open) = rest.find("{{") {
        result.push_str(&rest[..open]);
        let after_open = &rest[open + 2..];

        let Some(close) = after_open.find("}}") else {
            result.push_str(&rest[open..]);
            return result;
        };
        let name = &after_open[..close];

        if name.is_empty() || name.contains(char::is_whitespace) || name.contains("{{") {
            // Not a variable: emit the braces and rescan after them
            result.push_str("{{");
            rest = after_open;
            continue;
        }

        match vars.get(name) {
            Some(value) => result.push_str(value),
            None => result.push_str(&rest[open..open + 2 + close + 2]),
        }
        rest = &after_open[close + 2..];
    }

    result.push_str(rest);
    result
}
