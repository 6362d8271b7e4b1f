//! Terminal control sequence stripping for persisted logs
//!
//! Agent CLIs write colors, cursor movement and bracketed-paste toggles to
//! their output. The console mirror keeps them; log files get plain text.

use std::borrow::Cow;
use std::sync::LazyLock;

use regex::Regex;

/// CSI sequences (`ESC [ ... letter`, including private modes like `?2004h`),
/// OSC sequences terminated by BEL or ST, and the short keypad/charset escapes.
static CONTROL_SEQUENCE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r"\x1b\[[0-9;?]*[ -/]*[@-~]|\x1b\][^\x07\x1b]*(?:\x07|\x1b\\)|\x1b[=><]|\x1b\?[0-9;]*[A-Za-z]|\x1b[()][A-Za-z0-9]",
    )
    .expect("control sequence pattern is valid")
});

/// Remove terminal control sequences from `text`.
///
/// Borrows when there is nothing to strip.
#[must_use]
pub fn strip_control_sequences(text: &str) -> Cow<'_, str> {
    if !text.contains('\x1b') {
        return Cow::Borrowed(text);
    }
    CONTROL_SEQUENCE.replace_all(text, "")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_plain_text_is_borrowed() {
        let out = strip_control_sequences("hello world");
        assert!(matches!(out, Cow::Borrowed(_)));
        assert_eq!(out, "hello world");
    }

    #[test]
    fn test_strips_sgr_colors() {
        assert_eq!(
            strip_control_sequences("\x1b[1;32mPASS\x1b[0m tests"),
            "PASS tests"
        );
    }

    #[test]
    fn test_strips_bracketed_paste_toggles() {
        assert_eq!(
            strip_control_sequences("\x1b[?2004hprompt\x1b[?2004l"),
            "prompt"
        );
    }

    #[test]
    fn test_strips_cursor_movement_and_erase() {
        assert_eq!(strip_control_sequences("a\x1b[2K\x1b[1Gb"), "ab");
    }

    #[test]
    fn test_strips_osc_title() {
        assert_eq!(
            strip_control_sequences("\x1b]0;agent running\x07done"),
            "done"
        );
    }

    #[test]
    fn test_strips_keypad_mode_escapes() {
        assert_eq!(strip_control_sequences("\x1b=x\x1b>"), "x");
    }
}
