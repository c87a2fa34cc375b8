//! Data model shared across the pipeline (spec.md §3).

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// The atomic output of one service call.
///
/// Named `FetchResult` rather than `Result` to avoid colliding with
/// `std::result::Result`; the meaning is exactly spec.md's `Result`.
///
/// Invariant: a non-empty `error` makes this a failure regardless of
/// whether `data` is also populated (the REST adapter populates both on an
/// HTTP >= 400 response, for debugging, but the call is still a failure).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FetchResult {
    pub service: String,
    pub tool: String,
    #[serde(with = "serde_bytes_as_string")]
    pub data: Vec<u8>,
    pub url: String,
    pub timestamp: DateTime<Utc>,
    #[serde(default)]
    pub error: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub context_label: Option<String>,
}

impl FetchResult {
    #[must_use]
    pub fn ok(service: impl Into<String>, tool: impl Into<String>, data: Vec<u8>, url: impl Into<String>) -> Self {
        Self {
            service: service.into(),
            tool: tool.into(),
            data,
            url: url.into(),
            timestamp: Utc::now(),
            error: String::new(),
            context_label: None,
        }
    }

    #[must_use]
    pub fn error(service: impl Into<String>, tool: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            service: service.into(),
            tool: tool.into(),
            data: Vec::new(),
            url: String::new(),
            timestamp: Utc::now(),
            error: message.into(),
            context_label: None,
        }
    }

    #[must_use]
    pub fn is_failure(&self) -> bool {
        !self.error.is_empty()
    }

    /// A human label for LLM prompting: `<service> — <tool>`, or the
    /// declared `context_label` when present.
    #[must_use]
    pub fn label(&self) -> String {
        self.context_label
            .clone()
            .unwrap_or_else(|| format!("{} — {}", self.service, self.tool))
    }

    #[must_use]
    pub fn data_as_str(&self) -> std::borrow::Cow<'_, str> {
        String::from_utf8_lossy(&self.data)
    }
}

/// Serializes byte data as a UTF-8-lossy string in JSON cache/report files,
/// matching spec.md §6's "base64 or string" cache-file layout choice.
mod serde_bytes_as_string {
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(data: &[u8], serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&String::from_utf8_lossy(data))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Vec<u8>, D::Error> {
        let s = String::deserialize(deserializer)?;
        Ok(s.into_bytes())
    }
}

/// One (service, tool, params) triple declared within a routine.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Source {
    pub service: String,
    pub tool: String,
    #[serde(default)]
    pub params: BTreeMap<String, String>,
    #[serde(default)]
    pub context_label: Option<String>,
}

/// `synthesis.strategy` (spec.md §3, §4.5).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum SynthesisStrategy {
    #[default]
    Auto,
    Single,
    MultiStage,
}

impl SynthesisStrategy {
    /// Parses the empty string as `Auto`, matching spec.md's
    /// `strategy ∈ {"", auto, single, multi-stage}`.
    pub fn parse(raw: &str) -> Option<Self> {
        match raw {
            "" | "auto" => Some(Self::Auto),
            "single" => Some(Self::Single),
            "multi-stage" => Some(Self::MultiStage),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ReportSettings {
    pub title: String,
    #[serde(default)]
    pub compare_with: Option<String>,
    /// Tri-state: `None` means "unset", which spec.md says defaults to on.
    #[serde(default)]
    pub generate_charts: Option<bool>,
}

impl ReportSettings {
    #[must_use]
    pub fn charts_enabled(&self) -> bool {
        self.generate_charts.unwrap_or(true)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SynthesisSettings {
    #[serde(default)]
    pub system: String,
    #[serde(default)]
    pub strategy_raw: String,
    #[serde(default = "default_summary_max_words")]
    pub summary_max_words: usize,
    /// `None` means "derive from `context_window`", per spec.md's boundary:
    /// `context_window == 0 => max_source_words = 10000`;
    /// otherwise `floor(0.4 * context_window)`.
    #[serde(default)]
    pub max_source_words: Option<usize>,
    #[serde(default)]
    pub threshold_bytes: Option<usize>,
    #[serde(default)]
    pub context_window: usize,
    #[serde(default = "default_concurrency")]
    pub concurrency: usize,
    #[serde(default)]
    pub llm: Option<String>,
}

fn default_summary_max_words() -> usize {
    300
}

fn default_concurrency() -> usize {
    1
}

impl Default for SynthesisSettings {
    fn default() -> Self {
        Self {
            system: String::new(),
            strategy_raw: String::new(),
            summary_max_words: default_summary_max_words(),
            max_source_words: None,
            threshold_bytes: None,
            context_window: 0,
            concurrency: default_concurrency(),
            llm: None,
        }
    }
}

impl SynthesisSettings {
    pub const DEFAULT_MAX_SOURCE_WORDS: usize = 10_000;

    /// Resolves `max_source_words` per spec.md §8's boundary table.
    #[must_use]
    pub fn resolved_max_source_words(&self) -> usize {
        if let Some(explicit) = self.max_source_words {
            return explicit;
        }
        if self.context_window == 0 {
            Self::DEFAULT_MAX_SOURCE_WORDS
        } else {
            ((self.context_window as f64) * 0.4).floor() as usize
        }
    }

    #[must_use]
    pub fn strategy(&self) -> Option<SynthesisStrategy> {
        SynthesisStrategy::parse(&self.strategy_raw)
    }
}

/// A declarative job: schedule + sources + report + synthesis prompt
/// (spec.md §3, §6).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Routine {
    pub name: String,
    #[serde(default)]
    pub schedule: String,
    #[serde(default)]
    pub timezone: String,
    #[serde(default)]
    pub jitter: u64,
    #[serde(default)]
    pub llm: Option<String>,
    pub report: ReportSettings,
    #[serde(default)]
    pub synthesis: SynthesisSettings,
    pub sources: Vec<Source>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fetch_result_ok_has_empty_error() {
        let r = FetchResult::ok("news", "search", b"hi".to_vec(), "http://x");
        assert!(!r.is_failure());
        assert_eq!(r.label(), "news — search");
    }

    #[test]
    fn fetch_result_error_is_a_failure_even_with_data() {
        let mut r = FetchResult::ok("news", "search", b"body".to_vec(), "http://x");
        r.error = "HTTP 500: boom".to_string();
        assert!(r.is_failure());
    }

    #[test]
    fn context_label_overrides_default_label() {
        let mut r = FetchResult::ok("news", "search", Vec::new(), "http://x");
        r.context_label = Some("Top Headlines".to_string());
        assert_eq!(r.label(), "Top Headlines");
    }

    #[test]
    fn strategy_parses_empty_string_as_auto() {
        assert_eq!(SynthesisStrategy::parse(""), Some(SynthesisStrategy::Auto));
        assert_eq!(SynthesisStrategy::parse("auto"), Some(SynthesisStrategy::Auto));
        assert_eq!(SynthesisStrategy::parse("single"), Some(SynthesisStrategy::Single));
        assert_eq!(
            SynthesisStrategy::parse("multi-stage"),
            Some(SynthesisStrategy::MultiStage)
        );
        assert_eq!(SynthesisStrategy::parse("bogus"), None);
    }

    #[test]
    fn max_source_words_boundary_table() {
        let mut s = SynthesisSettings::default();
        s.context_window = 0;
        assert_eq!(s.resolved_max_source_words(), 10_000);

        s.context_window = 8192;
        assert_eq!(s.resolved_max_source_words(), 3276);
    }

    #[test]
    fn max_source_words_explicit_overrides_context_window() {
        let mut s = SynthesisSettings::default();
        s.context_window = 8192;
        s.max_source_words = Some(500);
        assert_eq!(s.resolved_max_source_words(), 500);
    }
}
