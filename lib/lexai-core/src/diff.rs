//! Version-comparison diff pipeline (§4.11): produce a unified line diff of
//! two stored bodies synchronously, and build the companion `diff` job for
//! the worker's explanation-only path.

use similar::{ChangeTag, TextDiff};

/// Unified-style line diff of `a` against `b`. Produced immediately at
/// request time — the LLM explanation is a separate, asynchronous step.
pub fn unified_line_diff(a: &str, b: &str) -> String {
    let diff = TextDiff::from_lines(a, b);
    let mut out = String::new();
    for change in diff.iter_all_changes() {
        let marker = match change.tag() {
            ChangeTag::Delete => '-',
            ChangeTag::Insert => '+',
            ChangeTag::Equal => ' ',
        };
        out.push(marker);
        out.push_str(change.as_str().unwrap_or_default());
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn marks_insertions_and_deletions() {
        let a = "line one\nline two\n";
        let b = "line one\nline three\n";
        let diff = unified_line_diff(a, b);
        assert!(diff.contains("-line two"));
        assert!(diff.contains("+line three"));
        assert!(diff.contains(" line one"));
    }
}
