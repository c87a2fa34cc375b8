//! Collaborator interfaces the executor drives but does not implement
//! (spec.md §1 "Out of scope (external collaborators)").

use std::path::Path;
use std::sync::Arc;

use burrow_core::traits::Synthesizer;
use burrow_core::{FetchResult, Routine};
use burrow_report::Report;

/// Expands `{{profile.X}}`-style references in a string. Implementations
/// own the profile store; the executor only knows the shape of this call.
pub trait ProfileExpander: Send + Sync {
    /// Returns the expanded string, or `Err(original)` when expansion is
    /// not possible (the executor logs a warning and still uses `original`).
    fn expand(&self, template: &str) -> Result<String, String>;
}

/// Picks the synthesizer (C4 passthrough or C6 LLM-driven) for a routine,
/// typically based on `routine.llm` and the configured provider map.
pub trait SynthesizerResolver: Send + Sync {
    fn resolve(&self, routine: &Routine) -> Arc<dyn Synthesizer>;
}

/// Renders chart directives found in synthesized Markdown to PNG files
/// under `charts_dir` and returns the Markdown with directives replaced by
/// image links. Render failures must degrade gracefully (log and leave the
/// directive text in place) rather than fail the report.
pub trait ChartPostprocessor: Send + Sync {
    fn process(&self, markdown: &str, charts_dir: &Path) -> String;
}

/// Best-effort indexing of finalized reports and successful results into an
/// external ledger. Failures must never fail the report.
pub trait Ledger: Send + Sync {
    fn index_report(&self, routine: &str, report: &Report);
    fn index_result(&self, routine: &str, index: usize, result: &FetchResult);
}
