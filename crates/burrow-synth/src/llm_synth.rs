//! C6: LLM-driven synthesis (spec.md §4.5).
//!
//! Chooses single-stage or multi-stage assembly, bounds stage-1 concurrency,
//! chunks oversized sources, enforces the stage-2 context budget, and
//! optionally strips service-name attribution from every outgoing prompt.

use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::Semaphore;

use burrow_core::model::SynthesisSettings;
use burrow_core::traits::{Provider, Synthesizer, SynthesisError};
use burrow_core::{CancellationToken, FetchResult, SynthesisStrategy};
use burrow_redaction::AttributionStripper;

use crate::chunk;
use crate::postprocess;

const STATIC_DOCUMENT_INSTRUCTION: &str =
    "This is a static report document, not a conversation; do not include conversational closings, sign-offs, or offers of further help.";
const LINK_PRESERVATION_INSTRUCTION: &str =
    "Preserve exact URLs; never break a URL across multiple lines; use markdown [text](url) links.";
const INCOMPLETE_DATA_INSTRUCTION: &str =
    "Analyze what IS present; never skip a section by saying data was 'not included' or similar.";
const ANTI_PREAMBLE_INSTRUCTION: &str =
    "Do not include any preamble or introduction; begin directly with the report content.";
const STAGE1_SYSTEM: &str =
    "You are a data summarization assistant. Extract key facts and preserve URLs, dates, numbers, and proper nouns exactly. Do not include any preamble.";

const DEFAULT_AUTO_THRESHOLD_BYTES: usize = 16_384;
const PRIORITIES_EXCERPT_MAX_CHARS: usize = 300;
const MIN_SUMMARY_WORDS: usize = 50;

/// Drives single- or multi-stage synthesis against an LLM [`Provider`].
pub struct LlmSynthesizer {
    provider: Arc<dyn Provider>,
    strategy: SynthesisStrategy,
    summary_max_words: usize,
    max_source_words: usize,
    threshold_bytes: Option<usize>,
    context_window: usize,
    concurrency: usize,
    stripper: Option<AttributionStripper>,
}

impl LlmSynthesizer {
    #[must_use]
    pub fn new(
        provider: Arc<dyn Provider>,
        settings: &SynthesisSettings,
        stripper: Option<AttributionStripper>,
    ) -> Self {
        Self {
            provider,
            strategy: settings.strategy().unwrap_or_default(),
            summary_max_words: settings.summary_max_words,
            max_source_words: settings.resolved_max_source_words(),
            threshold_bytes: settings.threshold_bytes,
            context_window: settings.context_window,
            concurrency: settings.concurrency.max(1),
            stripper,
        }
    }

    fn auto_threshold(&self) -> usize {
        let base = if self.context_window > 0 {
            (self.context_window as f64 * 0.5 * 4.0) as usize
        } else {
            DEFAULT_AUTO_THRESHOLD_BYTES
        };
        self.threshold_bytes.map_or(base, |t| t.max(base))
    }

    fn should_use_multi_stage(&self, results: &[FetchResult]) -> bool {
        match self.strategy {
            SynthesisStrategy::Single => false,
            SynthesisStrategy::MultiStage => true,
            SynthesisStrategy::Auto => {
                let total_bytes: usize = results.iter().map(|r| r.data.len()).sum();
                total_bytes > self.auto_threshold()
            }
        }
    }

    async fn single_stage(
        &self,
        ctx: &CancellationToken,
        title: &str,
        system: &str,
        results: &[FetchResult],
    ) -> Result<String, SynthesisError> {
        let mut user = format!("{title}\n\n");
        for (i, result) in results.iter().enumerate() {
            let label = source_label(self.stripper.as_ref(), i, result);
            user.push_str(&format!("### {label}\n\n"));
            if result.is_failure() {
                user.push_str(&format!("Error: {}\n\n", result.error));
            } else {
                user.push_str(result.data_as_str().as_ref());
                user.push_str("\n\n");
            }
        }

        let system_final = format!(
            "{system}\n\n{STATIC_DOCUMENT_INSTRUCTION}\n{LINK_PRESERVATION_INSTRUCTION}\n{INCOMPLETE_DATA_INSTRUCTION}"
        );
        let (system_final, user_final) = apply_strip_pair(self.stripper.as_ref(), &system_final, &user);
        let text = self.provider.complete(ctx, &system_final, &user_final).await?;
        Ok(text)
    }

    async fn multi_stage(
        &self,
        ctx: &CancellationToken,
        title: &str,
        system: &str,
        results: &[FetchResult],
    ) -> Result<String, SynthesisError> {
        let priorities = priorities_excerpt(system);
        let semaphore = Arc::new(Semaphore::new(self.concurrency));

        let mut handles = Vec::with_capacity(results.len());
        for (i, result) in results.iter().cloned().enumerate() {
            let provider = self.provider.clone();
            let ctx = ctx.clone();
            let stripper = self.stripper.clone();
            let priorities = priorities.clone();
            let sem = semaphore.clone();
            let max_source_words = self.max_source_words;
            let summary_max_words = self.summary_max_words;
            handles.push(tokio::spawn(async move {
                let _permit = sem.acquire_owned().await.expect("synthesis semaphore never closes");
                summarize_source(&provider, &ctx, stripper.as_ref(), &priorities, max_source_words, summary_max_words, i, &result)
                    .await
            }));
        }

        let mut labeled_summaries = Vec::with_capacity(results.len());
        for (i, (handle, result)) in handles.into_iter().zip(results.iter()).enumerate() {
            let summary = match handle.await {
                Ok(summary) => summary,
                Err(_panic) => {
                    tracing::warn!(source = i, "stage-1 summarization task panicked; using truncated raw fallback");
                    fallback_text(result, self.summary_max_words, self.stripper.as_ref())
                }
            };
            labeled_summaries.push((source_label(self.stripper.as_ref(), i, result), summary));
        }

        self.assemble_stage2(ctx, title, system, &labeled_summaries).await
    }

    async fn assemble_stage2(
        &self,
        ctx: &CancellationToken,
        title: &str,
        system: &str,
        labeled_summaries: &[(String, String)],
    ) -> Result<String, SynthesisError> {
        let adjusted = if self.context_window > 0 {
            let budget = (self.context_window as f64 * 0.6 * 4.0) as usize;
            truncate_proportionally(labeled_summaries, budget)
        } else {
            labeled_summaries.to_vec()
        };

        let user = build_stage2_user_prompt(title, &adjusted);
        let system_final = format!("{system}\n\n{STATIC_DOCUMENT_INSTRUCTION}");
        let (system_final, user_final) = apply_strip_pair(self.stripper.as_ref(), &system_final, &user);
        let text = self.provider.complete(ctx, &system_final, &user_final).await?;
        Ok(text)
    }
}

#[async_trait]
impl Synthesizer for LlmSynthesizer {
    async fn synthesize(
        &self,
        ctx: &CancellationToken,
        title: &str,
        system: &str,
        results: &[FetchResult],
    ) -> Result<String, SynthesisError> {
        if ctx.is_cancelled() {
            return Err(SynthesisError::Cancelled);
        }
        let markdown = if self.should_use_multi_stage(results) {
            self.multi_stage(ctx, title, system, results).await?
        } else {
            self.single_stage(ctx, title, system, results).await?
        };
        Ok(postprocess::postprocess(&markdown))
    }
}

fn source_label(stripper: Option<&AttributionStripper>, index: usize, result: &FetchResult) -> String {
    if stripper.is_some() {
        AttributionStripper::generic_label(index)
    } else {
        result.label()
    }
}

fn apply_strip(stripper: Option<&AttributionStripper>, text: &str) -> String {
    stripper.map_or_else(|| text.to_string(), |s| s.strip(text))
}

fn apply_strip_pair(stripper: Option<&AttributionStripper>, a: &str, b: &str) -> (String, String) {
    (apply_strip(stripper, a), apply_strip(stripper, b))
}

fn priorities_excerpt(system: &str) -> String {
    if system.chars().count() <= PRIORITIES_EXCERPT_MAX_CHARS {
        return system.to_string();
    }
    let truncated: String = system.chars().take(PRIORITIES_EXCERPT_MAX_CHARS).collect();
    let boundary = truncated.rfind(char::is_whitespace).unwrap_or(truncated.len());
    format!("{}...", truncated[..boundary].trim_end())
}

fn truncate_to_words(text: &str, n: usize) -> String {
    let words: Vec<&str> = text.split_whitespace().collect();
    if words.len() <= n {
        return text.to_string();
    }
    format!("{}...", words[..n].join(" "))
}

async fn summarize_source(
    provider: &Arc<dyn Provider>,
    ctx: &CancellationToken,
    stripper: Option<&AttributionStripper>,
    priorities: &str,
    max_source_words: usize,
    summary_max_words: usize,
    index: usize,
    result: &FetchResult,
) -> String {
    if result.is_failure() {
        return apply_strip(stripper, &format!("Error: {}", result.error));
    }

    let label = source_label(stripper, index, result);
    let raw = result.data_as_str().into_owned();
    let chunks = chunk::chunk(&raw, max_source_words);
    let total_chunks = chunks.len();
    let mut parts = Vec::with_capacity(total_chunks);

    for (chunk_index, chunk_text) in chunks.iter().enumerate() {
        let part_label = if total_chunks > 1 {
            format!("{label} (part {}/{total_chunks})", chunk_index + 1)
        } else {
            label.clone()
        };
        let user = format!(
            "Source: {part_label}\nPriorities: {priorities}\n\nData:\n{chunk_text}\n\nSummarize the above in approximately {summary_max_words} words."
        );
        let (system_final, user_final) = apply_strip_pair(stripper, STAGE1_SYSTEM, &user);
        match provider.complete(ctx, &system_final, &user_final).await {
            Ok(text) => parts.push(text),
            Err(_) => return fallback_text(result, summary_max_words, stripper),
        }
    }

    truncate_to_words(&parts.join("\n\n"), 2 * summary_max_words)
}

fn fallback_text(result: &FetchResult, summary_max_words: usize, stripper: Option<&AttributionStripper>) -> String {
    let data_str = result.data_as_str();
    let words: Vec<&str> = data_str.split_whitespace().collect();
    let limit = 3 * summary_max_words;
    let truncated = if words.len() > limit { words[..limit].join(" ") } else { words.join(" ") };
    apply_strip(stripper, &format!("{truncated} [... truncated ...]"))
}

/// Proportionally truncates summaries to fit `budget` bytes, never below
/// [`MIN_SUMMARY_WORDS`] words per summary; drops trailing summaries rather
/// than corrupting earlier ones when even the minimum cannot fit.
fn truncate_proportionally(summaries: &[(String, String)], budget: usize) -> Vec<(String, String)> {
    let total_bytes: usize = summaries.iter().map(|(_, s)| s.len()).sum();
    if total_bytes <= budget || summaries.is_empty() {
        return summaries.to_vec();
    }
    let ratio = budget as f64 / total_bytes as f64;

    let mut remaining: Vec<(String, String, usize)> = summaries
        .iter()
        .map(|(label, summary)| {
            let words = summary.split_whitespace().count().max(1);
            let target = ((words as f64) * ratio).floor() as usize;
            (label.clone(), summary.clone(), target.max(MIN_SUMMARY_WORDS))
        })
        .collect();

    loop {
        let estimated: usize = remaining
            .iter()
            .map(|(_, summary, target_words)| {
                let words = summary.split_whitespace().count().max(1);
                let bytes_per_word = summary.len() as f64 / words as f64;
                (bytes_per_word * (*target_words as f64)) as usize
            })
            .sum();
        if estimated <= budget || remaining.len() <= 1 {
            break;
        }
        tracing::warn!("stage-2 summary budget cannot fit all sources at minimum length; dropping trailing summary");
        remaining.pop();
    }

    remaining
        .into_iter()
        .map(|(label, summary, target_words)| (label, truncate_to_words(&summary, target_words)))
        .collect()
}

fn build_stage2_user_prompt(title: &str, labeled_summaries: &[(String, String)]) -> String {
    let mut out = format!("{title}\n\nPre-summarized source data extracts:\n\n");
    for (label, summary) in labeled_summaries {
        out.push_str(&format!("### {label}\n\n{summary}\n\n"));
    }
    out.push_str(LINK_PRESERVATION_INSTRUCTION);
    out.push('\n');
    out.push_str(INCOMPLETE_DATA_INSTRUCTION);
    out.push('\n');
    out.push_str(ANTI_PREAMBLE_INSTRUCTION);
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use burrow_core::traits::ProviderError;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Mutex;

    struct RecordingProvider {
        calls: Mutex<Vec<(String, String)>>,
        fail_on_call: Option<usize>,
        call_count: AtomicUsize,
    }

    impl RecordingProvider {
        fn new() -> Self {
            Self { calls: Mutex::new(Vec::new()), fail_on_call: None, call_count: AtomicUsize::new(0) }
        }

        fn failing_on(n: usize) -> Self {
            Self { calls: Mutex::new(Vec::new()), fail_on_call: Some(n), call_count: AtomicUsize::new(0) }
        }
    }

    #[async_trait]
    impl Provider for RecordingProvider {
        async fn complete(&self, _ctx: &CancellationToken, system: &str, user: &str) -> Result<String, ProviderError> {
            let n = self.call_count.fetch_add(1, Ordering::SeqCst);
            self.calls.lock().unwrap().push((system.to_string(), user.to_string()));
            if self.fail_on_call == Some(n) {
                return Err(ProviderError::Other("simulated failure".to_string()));
            }
            Ok(format!("summary #{n}"))
        }
    }

    fn small_results() -> Vec<FetchResult> {
        vec![
            FetchResult::ok("news", "search", b"short headline text".to_vec(), "http://a"),
            FetchResult::ok("weather", "forecast", b"sunny skies ahead".to_vec(), "http://b"),
        ]
    }

    #[tokio::test]
    async fn small_inputs_with_auto_strategy_use_a_single_call() {
        let provider = Arc::new(RecordingProvider::new());
        let settings = SynthesisSettings::default();
        let synth = LlmSynthesizer::new(provider.clone(), &settings, None);
        let out = synth
            .synthesize(&CancellationToken::new(), "Digest", "Be concise.", &small_results())
            .await
            .unwrap();
        assert_eq!(provider.call_count.load(Ordering::SeqCst), 1);
        assert!(out.contains("summary #0"));
    }

    #[tokio::test]
    async fn explicit_multi_stage_runs_stage1_per_source_then_stage2() {
        let provider = Arc::new(RecordingProvider::new());
        let mut settings = SynthesisSettings::default();
        settings.strategy_raw = "multi-stage".to_string();
        let synth = LlmSynthesizer::new(provider.clone(), &settings, None);
        synth
            .synthesize(&CancellationToken::new(), "Digest", "Be concise.", &small_results())
            .await
            .unwrap();
        assert_eq!(provider.call_count.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn stage1_failure_falls_back_to_truncated_raw_and_stage2_still_runs() {
        let provider = Arc::new(RecordingProvider::failing_on(0));
        let mut settings = SynthesisSettings::default();
        settings.strategy_raw = "multi-stage".to_string();
        let synth = LlmSynthesizer::new(provider.clone(), &settings, None);
        synth
            .synthesize(&CancellationToken::new(), "Digest", "Be concise.", &small_results())
            .await
            .unwrap();
        let calls = provider.calls.lock().unwrap();
        let stage2_call = calls.last().unwrap();
        assert!(stage2_call.1.contains("[... truncated ...]"));
    }

    #[tokio::test]
    async fn attribution_stripping_removes_service_names_from_every_prompt() {
        let provider = Arc::new(RecordingProvider::new());
        let settings = SynthesisSettings::default();
        let stripper = AttributionStripper::new(["news", "weather"]);
        let synth = LlmSynthesizer::new(provider.clone(), &settings, Some(stripper));
        synth
            .synthesize(&CancellationToken::new(), "Digest", "Be concise.", &small_results())
            .await
            .unwrap();
        let calls = provider.calls.lock().unwrap();
        for (system, user) in calls.iter() {
            assert!(!system.contains("news") && !system.contains("weather"));
            assert!(!user.contains("news") && !user.contains("weather"));
        }
    }

    #[test]
    fn proportional_truncation_drops_trailing_summaries_under_tiny_budget() {
        let summaries = vec![
            ("A".to_string(), "one two three four five six seven eight nine ten".repeat(20)),
            ("B".to_string(), "alpha beta gamma delta epsilon zeta eta theta".repeat(20)),
            ("C".to_string(), "red orange yellow green blue indigo violet".repeat(20)),
        ];
        let truncated = truncate_proportionally(&summaries, 10);
        assert!(truncated.len() < summaries.len());
    }

    #[test]
    fn priorities_excerpt_truncates_at_a_word_boundary() {
        let long = "word ".repeat(200);
        let excerpt = priorities_excerpt(&long);
        assert!(excerpt.len() <= PRIORITIES_EXCERPT_MAX_CHARS + 4);
        assert!(excerpt.ends_with("..."));
    }
}
