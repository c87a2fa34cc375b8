//! C8: pipeline executor (spec.md §4.4).
//!
//! Fans out one task per source with jitter and panic isolation, persists
//! raw results before synthesis ever runs, then drives the chosen
//! synthesizer and finalizes the report.

mod hooks;

use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;

use burrow_core::traits::SynthesisError;
use burrow_core::{CancellationToken, FetchResult, Routine, Source};
use burrow_report::{Report, ReportError, ReportStore};
use burrow_service::ServiceRegistry;
use rand::Rng;
use thiserror::Error;

pub use hooks::{ChartPostprocessor, Ledger, ProfileExpander, SynthesizerResolver};

/// Previous-report comparison text is capped at this many UTF-8 scalar
/// values before being appended to the synthesis system prompt (spec.md §4.4).
const COMPARE_WITH_CHAR_CAP: usize = 50_000;

const CHART_DIRECTIVE_INSTRUCTIONS: &str = "When a chart would clarify the data, include a fenced code block with info string `chart` whose body is `key: value` lines: `type` (bar, line, or pie), `title`, `labels` (JSON string array), `values` (JSON number array).";

#[derive(Debug, Error)]
pub enum ExecutorError {
    #[error("execution cancelled")]
    Cancelled,
    #[error("synthesis failed: {0}")]
    Synthesis(#[from] SynthesisError),
    #[error("report persistence failed: {0}")]
    Persistence(#[from] ReportError),
}

pub struct PipelineExecutor {
    registry: Arc<ServiceRegistry>,
    report_store: Arc<ReportStore>,
    synthesizer_resolver: Arc<dyn SynthesizerResolver>,
    profile_expander: Option<Arc<dyn ProfileExpander>>,
    chart_postprocessor: Option<Arc<dyn ChartPostprocessor>>,
    ledger: Option<Arc<dyn Ledger>>,
}

impl PipelineExecutor {
    #[must_use]
    pub fn new(
        registry: Arc<ServiceRegistry>,
        report_store: Arc<ReportStore>,
        synthesizer_resolver: Arc<dyn SynthesizerResolver>,
    ) -> Self {
        Self {
            registry,
            report_store,
            synthesizer_resolver,
            profile_expander: None,
            chart_postprocessor: None,
            ledger: None,
        }
    }

    #[must_use]
    pub fn with_profile_expander(mut self, expander: Arc<dyn ProfileExpander>) -> Self {
        self.profile_expander = Some(expander);
        self
    }

    #[must_use]
    pub fn with_chart_postprocessor(mut self, postprocessor: Arc<dyn ChartPostprocessor>) -> Self {
        self.chart_postprocessor = Some(postprocessor);
        self
    }

    #[must_use]
    pub fn with_ledger(mut self, ledger: Arc<dyn Ledger>) -> Self {
        self.ledger = Some(ledger);
        self
    }

    fn expand(&self, template: &str) -> String {
        match &self.profile_expander {
            None => template.to_string(),
            Some(expander) => match expander.expand(template) {
                Ok(expanded) => expanded,
                Err(original) => {
                    tracing::warn!(template, "profile reference could not be expanded; using literal text");
                    original
                }
            },
        }
    }

    /// Runs one routine end to end: fan out sources, persist raw data,
    /// synthesize, finalize. Raw data is durable the moment this returns an
    /// error from synthesis; only cancellation before the report directory
    /// is created produces no artifact at all.
    pub async fn run(&self, ctx: &CancellationToken, routine: &Routine) -> Result<Report, ExecutorError> {
        let results = self.fan_out(ctx, routine).await;

        if ctx.is_cancelled() {
            return Err(ExecutorError::Cancelled);
        }

        let raw_data = build_raw_data_map(&results);
        let dir = self.report_store.create(&routine.name, &raw_data)?;

        let title = self.expand(&routine.report.title);
        let mut system = self.expand(&routine.synthesis.system);

        if let Some(peer) = &routine.report.compare_with {
            if let Ok(Some(previous)) = self.report_store.find_latest(peer) {
                let capped: String = previous.markdown.chars().take(COMPARE_WITH_CHAR_CAP).collect();
                system.push_str("\n\n## Previous Report for Comparison\n\n");
                system.push_str(&capped);
            }
        }

        if routine.report.charts_enabled() {
            system.push_str("\n\n");
            system.push_str(CHART_DIRECTIVE_INSTRUCTIONS);
        }

        let synthesizer = self.synthesizer_resolver.resolve(routine);
        let markdown = synthesizer.synthesize(ctx, &title, &system, &results).await?;

        let markdown = if routine.report.charts_enabled() {
            match &self.chart_postprocessor {
                Some(renderer) => renderer.process(&markdown, &dir.join("charts")),
                None => markdown,
            }
        } else {
            markdown
        };

        let report = self.report_store.finish(&dir, &routine.name, &markdown)?;

        if let Some(ledger) = &self.ledger {
            ledger.index_report(&routine.name, &report);
            for (i, result) in results.iter().enumerate() {
                if !result.is_failure() {
                    ledger.index_result(&routine.name, i, result);
                }
            }
        }

        Ok(report)
    }

    async fn fan_out(&self, ctx: &CancellationToken, routine: &Routine) -> Vec<FetchResult> {
        let mut handles = Vec::with_capacity(routine.sources.len());
        for source in &routine.sources {
            let ctx = ctx.clone();
            let registry = self.registry.clone();
            let profile_expander = self.profile_expander.clone();
            let jitter = routine.jitter;
            let source = source.clone();
            handles.push(tokio::spawn(async move {
                run_source(&ctx, &registry, profile_expander.as_deref(), jitter, &source).await
            }));
        }

        let mut results = Vec::with_capacity(handles.len());
        for (handle, source) in handles.into_iter().zip(routine.sources.iter()) {
            let result = match handle.await {
                Ok(result) => result,
                Err(e) => {
                    let payload = panic_message(e);
                    tracing::warn!(service = %source.service, tool = %source.tool, panic = %payload, "source task panicked");
                    FetchResult::error(&source.service, &source.tool, format!("panic: {payload}"))
                }
            };
            results.push(result);
        }
        results
    }
}

fn panic_message(e: tokio::task::JoinError) -> String {
    if !e.is_panic() {
        return "task cancelled".to_string();
    }
    let reason = e.into_panic();
    if let Some(s) = reason.downcast_ref::<&str>() {
        return (*s).to_string();
    }
    if let Some(s) = reason.downcast_ref::<String>() {
        return s.clone();
    }
    "unknown panic payload".to_string()
}

async fn run_source(
    ctx: &CancellationToken,
    registry: &ServiceRegistry,
    profile_expander: Option<&dyn ProfileExpander>,
    jitter: u64,
    source: &Source,
) -> FetchResult {
    if jitter > 0 {
        let sleep_secs = rand::thread_rng().gen_range(0..jitter);
        tokio::select! {
            () = tokio::time::sleep(Duration::from_secs(sleep_secs)) => {}
            () = ctx.cancelled() => {
                return with_context_label(FetchResult::error(&source.service, &source.tool, "cancelled during jitter sleep"), source);
            }
        }
    }

    let service = match registry.get(&source.service) {
        Ok(service) => service,
        Err(e) => return with_context_label(FetchResult::error(&source.service, &source.tool, e.to_string()), source),
    };

    let expanded_params: BTreeMap<String, String> = source
        .params
        .iter()
        .map(|(k, v)| {
            let expanded = match profile_expander {
                None => v.clone(),
                Some(expander) => match expander.expand(v) {
                    Ok(expanded) => expanded,
                    Err(original) => {
                        tracing::warn!(param = %k, value = %v, "profile reference could not be expanded; using literal value");
                        original
                    }
                },
            };
            (k.clone(), expanded)
        })
        .collect();

    let result = match service.execute(ctx, &source.tool, &expanded_params).await {
        Ok(result) => result,
        Err(e) => FetchResult::error(&source.service, &source.tool, e.to_string()),
    };

    with_context_label(result, source)
}

fn with_context_label(mut result: FetchResult, source: &Source) -> FetchResult {
    if result.context_label.is_none() {
        result.context_label = source.context_label.clone();
    }
    result
}

fn build_raw_data_map(results: &[FetchResult]) -> BTreeMap<String, Vec<u8>> {
    let mut map = BTreeMap::new();
    for (i, result) in results.iter().enumerate() {
        if !result.data.is_empty() {
            map.insert(format!("{i}-{}-{}", result.service, result.tool), result.data.clone());
        }
    }
    map
}
