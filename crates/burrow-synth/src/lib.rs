//! Synthesizers that collapse a `Result` list into Markdown (spec.md §4.4, §4.5).

mod chunk;
mod llm_synth;
mod passthrough;
mod postprocess;

pub use llm_synth::LlmSynthesizer;
pub use passthrough::PassthroughSynthesizer;
