//! Attribution stripping (spec.md §4.5 "Attribution stripping").
//!
//! Replaces every occurrence of a configured service name (length >= 3) in
//! an outgoing LLM prompt with the literal `[service]`. Names are processed
//! longest-first so a name that is a substring of another (`news` inside
//! `news-api`) never corrupts the longer name's replacement.

/// Minimum service-name length eligible for stripping; spec.md exempts very
/// short names to avoid mass-replacing incidental substrings.
const MIN_NAME_LEN: usize = 3;

/// Strips configured service names from outgoing prompt text.
///
/// Built once per synthesis run from the set of service names present in
/// the routine's sources.
#[derive(Debug, Clone)]
pub struct AttributionStripper {
    /// Names eligible for stripping, longest first.
    names: Vec<String>,
}

impl AttributionStripper {
    #[must_use]
    pub fn new<I, S>(service_names: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let mut names: Vec<String> = service_names
            .into_iter()
            .map(Into::into)
            .filter(|n| n.len() >= MIN_NAME_LEN)
            .collect();
        names.sort_by(|a, b| b.len().cmp(&a.len()).then_with(|| a.cmp(b)));
        names.dedup();
        Self { names }
    }

    /// Replaces every occurrence of every configured name with `[service]`,
    /// longest name first.
    #[must_use]
    pub fn strip(&self, text: &str) -> String {
        let mut out = text.to_string();
        for name in &self.names {
            if out.contains(name.as_str()) {
                out = out.replace(name.as_str(), "[service]");
            }
        }
        out
    }

    /// The generic label used in place of `<service> — <tool>` once
    /// attribution is stripped (spec.md §4.5: `"Source i+1"`).
    #[must_use]
    pub fn generic_label(index: usize) -> String {
        format!("Source {}", index + 1)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn overlapping_names_strip_longest_first() {
        let stripper = AttributionStripper::new(["news", "news-api"]);
        let text = "data from news-api and news feed";
        assert_eq!(stripper.strip(text), "data from [service] and [service] feed");
    }

    #[test]
    fn names_shorter_than_three_chars_are_never_stripped() {
        let stripper = AttributionStripper::new(["ai", "weather"]);
        let text = "ai forecasts via weather";
        assert_eq!(stripper.strip(text), "ai forecasts via [service]");
    }

    #[test]
    fn generic_label_is_one_indexed() {
        assert_eq!(AttributionStripper::generic_label(0), "Source 1");
        assert_eq!(AttributionStripper::generic_label(4), "Source 5");
    }

    #[test]
    fn strip_applies_to_error_text_too() {
        let stripper = AttributionStripper::new(["news-api"]);
        assert_eq!(
            stripper.strip("news-api returned HTTP 500"),
            "[service] returned HTTP 500"
        );
    }
}
