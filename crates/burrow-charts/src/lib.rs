//! Chart directive parsing (spec.md §6 "Chart directive syntax").
//!
//! A directive is a fenced code block with info string `chart`; actual PNG
//! rendering is an external collaborator (spec.md §1 "Out of scope").

use once_cell::sync::Lazy;
use regex::Regex;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChartType {
    Bar,
    Line,
    Pie,
}

impl ChartType {
    fn parse(raw: &str) -> Option<Self> {
        match raw.trim().to_lowercase().as_str() {
            "bar" => Some(Self::Bar),
            "line" => Some(Self::Line),
            "pie" => Some(Self::Pie),
            _ => None,
        }
    }
}

/// A successfully parsed chart directive and the byte span of its fenced
/// block in the source Markdown.
#[derive(Debug, Clone, PartialEq)]
pub struct ChartDirective {
    pub start: usize,
    pub end: usize,
    pub chart_type: ChartType,
    pub title: Option<String>,
    pub labels: Vec<String>,
    pub values: Vec<f64>,
}

static FENCE_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"(?s)```chart\r?\n(.*?)```").unwrap());

/// Finds every well-formed `chart` directive in `text`. A block with a
/// missing or unknown `type`, missing values, or no closing fence is
/// silently skipped rather than erroring.
#[must_use]
pub fn parse_directives(text: &str) -> Vec<ChartDirective> {
    FENCE_RE
        .captures_iter(text)
        .filter_map(|caps| {
            let whole = caps.get(0)?;
            let body = caps.get(1)?.as_str();
            parse_body(body).map(|(chart_type, title, labels, values)| ChartDirective {
                start: whole.start(),
                end: whole.end(),
                chart_type,
                title,
                labels,
                values,
            })
        })
        .collect()
}

fn parse_body(body: &str) -> Option<(ChartType, Option<String>, Vec<String>, Vec<f64>)> {
    let mut chart_type = None;
    let mut title = None;
    let mut labels = Vec::new();
    let mut values = None;

    for line in body.lines() {
        let line = line.trim();
        if line.is_empty() {
            continue;
        }
        let (key, value) = line.split_once(':')?;
        let key = key.trim().to_lowercase();
        let value = value.trim();
        match key.as_str() {
            "type" => chart_type = ChartType::parse(value),
            "title" => title = Some(unquote(value).to_string()),
            "x" | "labels" => {
                if let Ok(parsed) = serde_json::from_str::<Vec<String>>(value) {
                    labels = parsed;
                }
            }
            "y" | "values" => {
                if let Ok(parsed) = serde_json::from_str::<Vec<f64>>(value) {
                    values = Some(parsed);
                }
            }
            _ => {}
        }
    }

    Some((chart_type?, title, labels, values?))
}

fn unquote(s: &str) -> &str {
    s.strip_prefix('"').and_then(|s| s.strip_suffix('"')).unwrap_or(s)
}

/// Replaces each directive's fenced block with the corresponding entry of
/// `replacements` (same order as returned by [`parse_directives`]),
/// preserving all other content byte-for-byte.
///
/// # Panics
/// Panics if `directives.len() != replacements.len()`.
#[must_use]
pub fn replace_directives(text: &str, directives: &[ChartDirective], replacements: &[String]) -> String {
    assert_eq!(directives.len(), replacements.len());
    let mut out = String::with_capacity(text.len());
    let mut last_end = 0;
    for (directive, replacement) in directives.iter().zip(replacements) {
        out.push_str(&text[last_end..directive.start]);
        out.push_str(replacement);
        last_end = directive.end;
    }
    out.push_str(&text[last_end..]);
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_a_well_formed_bar_chart_directive() {
        let text = "# Report\n\n```chart\ntype: bar\ntitle: \"Sentiment\"\nlabels: [\"pos\", \"neg\"]\nvalues: [3, 1]\n```\n\nMore text.";
        let directives = parse_directives(text);
        assert_eq!(directives.len(), 1);
        let d = &directives[0];
        assert_eq!(d.chart_type, ChartType::Bar);
        assert_eq!(d.title.as_deref(), Some("Sentiment"));
        assert_eq!(d.labels, vec!["pos", "neg"]);
        assert_eq!(d.values, vec![3.0, 1.0]);
    }

    #[test]
    fn missing_type_is_silently_skipped() {
        let text = "```chart\nvalues: [1, 2]\n```";
        assert!(parse_directives(text).is_empty());
    }

    #[test]
    fn unknown_type_is_silently_skipped() {
        let text = "```chart\ntype: scatter\nvalues: [1, 2]\n```";
        assert!(parse_directives(text).is_empty());
    }

    #[test]
    fn missing_values_is_silently_skipped() {
        let text = "```chart\ntype: pie\nlabels: [\"a\"]\n```";
        assert!(parse_directives(text).is_empty());
    }

    #[test]
    fn unclosed_block_is_silently_skipped() {
        let text = "```chart\ntype: bar\nvalues: [1, 2]\nno closing fence here";
        assert!(parse_directives(text).is_empty());
    }

    #[test]
    fn replace_directives_preserves_surrounding_text_exactly() {
        let text = "Before.\n\n```chart\ntype: line\nvalues: [1, 2, 3]\n```\n\nAfter.";
        let directives = parse_directives(text);
        let out = replace_directives(text, &directives, &["![chart](charts/digest.png)".to_string()]);
        assert_eq!(out, "Before.\n\n![chart](charts/digest.png)\n\nAfter.");
    }

    #[test]
    fn replace_directives_leaves_invalid_blocks_untouched() {
        let text = "```chart\ntype: unknown\nvalues: [1]\n```\n\n```chart\ntype: bar\nvalues: [1]\n```";
        let directives = parse_directives(text);
        assert_eq!(directives.len(), 1);
        let out = replace_directives(text, &directives, &["RENDERED".to_string()]);
        assert!(out.contains("type: unknown"));
        assert!(out.contains("RENDERED"));
    }
}
