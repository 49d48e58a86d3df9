//! Name sanitization for repository names and committed file names

use regex::Regex;
use std::sync::OnceLock;

static UNSAFE_CHARS: OnceLock<Regex> = OnceLock::new();

fn unsafe_chars() -> &'static Regex {
    UNSAFE_CHARS.get_or_init(|| Regex::new(r"[^a-zA-Z0-9_.-]").expect("static pattern compiles"))
}

/// Reduce a name to the `[A-Za-z0-9_.-]` charset.
///
/// Every `..` is removed first so the result can never walk out of the
/// repository root, then each remaining unsafe character becomes `_`.
pub fn sanitize_name(name: &str) -> String {
    let without_parent = name.replace("..", "");
    unsafe_chars().replace_all(&without_parent, "_").into_owned()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_safe_names_unchanged() {
        assert_eq!(sanitize_name("countdown-timer_v2.html"), "countdown-timer_v2.html");
    }

    #[test]
    fn test_unsafe_chars_replaced() {
        assert_eq!(sanitize_name("my project!"), "my_project_");
        assert_eq!(sanitize_name("a/b\\c"), "a_b_c");
    }

    #[test]
    fn test_parent_segments_removed() {
        assert_eq!(sanitize_name("../../etc/passwd"), "__etc_passwd");
        assert_eq!(sanitize_name("logo..png"), "logopng");
    }

    #[test]
    fn test_unicode_replaced() {
        assert_eq!(sanitize_name("café"), "caf_");
    }
}
