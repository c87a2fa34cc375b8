//! Post-processing applied to every LLM-synthesized document (spec.md §4.5).

use once_cell::sync::Lazy;
use regex::Regex;

/// Matches a markdown link's URL parenthetical, capturing the link text and
/// the (possibly line-broken) URL separately.
static LINK_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"\[([^\]]*)\]\(([^)]*)\)").unwrap());

/// A CR/LF run plus the whitespace that follows it, as it appears inside a
/// broken URL.
static BROKEN_NEWLINE_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"[\r\n]+[ \t]*").unwrap());

const CLOSING_PHRASES: &[&str] = &[
    "let me know",
    "questions?",
    "feel free to",
    "reply to refine",
    "hope this helps",
    "happy to",
];

/// Repairs markdown links whose URL was broken across lines by the provider,
/// leaving link text untouched.
#[must_use]
pub fn repair_broken_links(text: &str) -> String {
    LINK_RE
        .replace_all(text, |caps: &regex::Captures| {
            let link_text = &caps[1];
            let url = BROKEN_NEWLINE_RE.replace_all(&caps[2], "");
            format!("[{link_text}]({url})")
        })
        .into_owned()
}

/// Removes a trailing conversational closing line (and an immediately
/// preceding `---` separator), unless it sits inside a blockquote.
#[must_use]
pub fn strip_conversational_closing(text: &str) -> String {
    let mut lines: Vec<&str> = text.lines().collect();

    while let Some(last) = lines.last() {
        let trimmed = last.trim();
        if trimmed.is_empty() {
            lines.pop();
            continue;
        }
        if trimmed.starts_with('>') {
            break;
        }
        let lower = trimmed.to_lowercase();
        if CLOSING_PHRASES.iter().any(|p| lower.contains(p)) {
            lines.pop();
            continue;
        }
        break;
    }

    while matches!(lines.last(), Some(l) if l.trim().is_empty()) {
        lines.pop();
    }
    if matches!(lines.last(), Some(&l) if l.trim() == "---") {
        lines.pop();
    }
    while matches!(lines.last(), Some(l) if l.trim().is_empty()) {
        lines.pop();
    }

    lines.join("\n")
}

/// Runs the full post-processing pipeline on a synthesized document.
#[must_use]
pub fn postprocess(text: &str) -> String {
    let repaired = repair_broken_links(text);
    strip_conversational_closing(&repaired)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn repairs_a_url_broken_across_lines() {
        let text = "See [report](https://example.com/\n  path/to/page) for detail.";
        assert_eq!(
            repair_broken_links(text),
            "See [report](https://example.com/path/to/page) for detail."
        );
    }

    #[test]
    fn leaves_intact_links_unchanged() {
        let text = "See [report](https://example.com/page) for detail.";
        assert_eq!(repair_broken_links(text), text);
    }

    #[test]
    fn strips_trailing_closing_and_preceding_separator() {
        let text = "# Report\n\nBody text.\n\n---\n\nLet me know if you have questions!";
        assert_eq!(strip_conversational_closing(text), "# Report\n\nBody text.");
    }

    #[test]
    fn does_not_strip_closing_phrase_inside_blockquote() {
        let text = "# Report\n\n> Feel free to reach out.";
        assert_eq!(strip_conversational_closing(text), text);
    }

    #[test]
    fn leaves_report_without_a_closing_unchanged() {
        let text = "# Report\n\nJust the facts.";
        assert_eq!(strip_conversational_closing(text), text);
    }
}
