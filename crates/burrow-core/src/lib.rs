//! Shared types and capability traits for Burrow's collection-and-synthesis pipeline.
//!
//! Every other Burrow crate depends on this one; it holds nothing that needs
//! an external service, a filesystem, or a network socket of its own.

pub mod cancellation;
pub mod model;
pub mod traits;

pub use cancellation::CancellationToken;
pub use model::{FetchResult, Routine, Source, SynthesisStrategy};
pub use traits::{Provider, Service, Synthesizer};
