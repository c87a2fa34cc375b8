//! C4: formats a `Result` list as structured Markdown without an LLM.

use async_trait::async_trait;
use burrow_core::traits::{Synthesizer, SynthesisError};
use burrow_core::{CancellationToken, FetchResult};

/// A synthesizer that performs no LLM call: it simply renders each result
/// under its own heading. Used when a routine declares no `llm` provider.
#[derive(Debug, Default, Clone, Copy)]
pub struct PassthroughSynthesizer;

#[async_trait]
impl Synthesizer for PassthroughSynthesizer {
    async fn synthesize(
        &self,
        _ctx: &CancellationToken,
        title: &str,
        _system: &str,
        results: &[FetchResult],
    ) -> Result<String, SynthesisError> {
        let mut out = String::new();
        out.push_str(&format!("# {title}\n\n"));
        for result in results {
            out.push_str(&format!("### {}\n\n", result.label()));
            if result.is_failure() {
                out.push_str(&format!("Error: {}\n\n", result.error));
            } else {
                out.push_str(result.data_as_str().trim());
                out.push_str("\n\n");
            }
        }
        Ok(out.trim_end().to_string() + "\n")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use burrow_core::CancellationToken;

    #[tokio::test]
    async fn renders_one_section_per_result_in_order() {
        let results = vec![
            FetchResult::ok("news", "search", b"headline one".to_vec(), "http://x"),
            FetchResult::error("weather", "forecast", "HTTP 500: boom"),
        ];
        let out = PassthroughSynthesizer
            .synthesize(&CancellationToken::new(), "Daily Digest", "", &results)
            .await
            .unwrap();
        assert!(out.starts_with("# Daily Digest\n\n"));
        let news_pos = out.find("### news — search").unwrap();
        let weather_pos = out.find("### weather — forecast").unwrap();
        assert!(news_pos < weather_pos);
        assert!(out.contains("headline one"));
        assert!(out.contains("Error: HTTP 500: boom"));
    }

    #[tokio::test]
    async fn context_label_is_used_as_the_heading() {
        let mut r = FetchResult::ok("news", "search", b"data".to_vec(), "http://x");
        r.context_label = Some("Top Headlines".to_string());
        let out = PassthroughSynthesizer
            .synthesize(&CancellationToken::new(), "Report", "", &[r])
            .await
            .unwrap();
        assert!(out.contains("### Top Headlines"));
    }
}
