//! Review verdict classification

use std::fmt;

/// Marker for a review without blocking issues
pub const OK_MARKER: &str = "[STATUS]: NO_CRITICAL_ISSUES";

/// Marker for a review that requires fixes
pub const NEED_FIX_MARKER: &str = "[STATUS]: CRITICAL_ISSUES";

/// Reviewer's conclusion
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Verdict {
    /// No critical issues
    Ok,
    /// Critical issues must be fixed
    NeedFix,
    /// No marker, missing or stale review
    Unknown,
}

impl Verdict {
    /// Classify review text. The marker occurring first wins; matching is
    /// case-insensitive.
    #[must_use]
    pub fn classify(text: &str) -> Self {
        let upper = text.to_ascii_uppercase();
        match (upper.find(OK_MARKER), upper.find(NEED_FIX_MARKER)) {
            (Some(ok), Some(fix)) if fix < ok => Self::NeedFix,
            (Some(_), _) => Self::Ok,
            (None, Some(_)) => Self::NeedFix,
            (None, None) => Self::Unknown,
        }
    }

    /// Upper-case label.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Ok => "OK",
            Self::NeedFix => "NEED_FIX",
            Self::Unknown => "UNKNOWN",
        }
    }
}

impl fmt::Display for Verdict {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_ok_marker() {
        assert_eq!(
            Verdict::classify("[STATUS]: NO_CRITICAL_ISSUES\n\nLooks good."),
            Verdict::Ok
        );
    }

    #[test]
    fn test_need_fix_marker() {
        assert_eq!(
            Verdict::classify("# Review\n[STATUS]: CRITICAL_ISSUES\n- SQL injection"),
            Verdict::NeedFix
        );
    }

    #[test]
    fn test_case_insensitive() {
        assert_eq!(Verdict::classify("[status]: no_critical_issues"), Verdict::Ok);
        assert_eq!(Verdict::classify("[Status]: Critical_Issues"), Verdict::NeedFix);
    }

    #[test]
    fn test_no_marker_is_unknown() {
        assert_eq!(Verdict::classify("All fine, I think."), Verdict::Unknown);
        assert_eq!(Verdict::classify(""), Verdict::Unknown);
        assert_eq!(Verdict::classify("STATUS: CRITICAL_ISSUES"), Verdict::Unknown);
    }

    #[test]
    fn test_earliest_marker_wins() {
        let fix_first = "[STATUS]: CRITICAL_ISSUES\nwas [STATUS]: NO_CRITICAL_ISSUES before";
        assert_eq!(Verdict::classify(fix_first), Verdict::NeedFix);

        let ok_first = "[STATUS]: NO_CRITICAL_ISSUES\nprevious: [STATUS]: CRITICAL_ISSUES";
        assert_eq!(Verdict::classify(ok_first), Verdict::Ok);
    }

    #[test]
    fn test_non_ascii_text_does_not_shift_positions() {
        let text = "รีวิว ✓\n[status]: critical_issues\n[STATUS]: NO_CRITICAL_ISSUES";
        assert_eq!(Verdict::classify(text), Verdict::NeedFix);
    }
}
