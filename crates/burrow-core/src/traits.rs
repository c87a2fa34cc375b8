//! Capability interfaces (spec.md §6 "External interfaces").
//!
//! Each is deliberately small and object-safe so the registry/executor can
//! hold `Box<dyn Service>` / `Arc<dyn Provider>` without knowing the
//! concrete backend (spec.md §9 "Polymorphism").

use std::collections::BTreeMap;

use async_trait::async_trait;
use thiserror::Error;

use crate::cancellation::CancellationToken;
use crate::model::FetchResult;

#[derive(Debug, Error)]
pub enum ServiceError {
    #[error("service not found: {0}")]
    NotFound(String),
    #[error("unknown tool: {0}")]
    UnknownTool(String),
    #[error("missing required path parameter: {0}")]
    MissingPathParam(String),
    #[error("unreplaced path placeholder: {0}")]
    UnreplacedPlaceholder(String),
    #[error("transport error: {0}")]
    Transport(String),
    #[error("{0}")]
    Other(String),
}

/// A capability identified by a unique name, offering one or more named
/// tools (spec.md §3 "Service").
#[async_trait]
pub trait Service: Send + Sync {
    fn name(&self) -> &str;

    async fn execute(
        &self,
        ctx: &CancellationToken,
        tool: &str,
        params: &BTreeMap<String, String>,
    ) -> Result<FetchResult, ServiceError>;
}

#[derive(Debug, Error)]
pub enum ProviderError {
    #[error("cannot reach {endpoint}")]
    Unreachable { endpoint: String },
    #[error("model not found; run pull")]
    ModelNotFound,
    #[error("invalid API key")]
    InvalidApiKey,
    #[error("rate limited")]
    RateLimited,
    #[error("no choices in response")]
    NoChoices,
    #[error("provider request timed out")]
    Timeout,
    #[error("provider error ({status}): {body}")]
    Http { status: u16, body: String },
    #[error("{0}")]
    Other(String),
}

/// An LLM backend (spec.md §4.8 / §6 "Provider interface").
#[async_trait]
pub trait Provider: Send + Sync {
    async fn complete(
        &self,
        ctx: &CancellationToken,
        system: &str,
        user: &str,
    ) -> Result<String, ProviderError>;
}

#[derive(Debug, Error)]
pub enum SynthesisError {
    #[error("provider error: {0}")]
    Provider(#[from] ProviderError),
    #[error("synthesis cancelled")]
    Cancelled,
    #[error("{0}")]
    Other(String),
}

/// Collapses an ordered list of results into a single Markdown document
/// (spec.md §6 "Synthesizer interface").
#[async_trait]
pub trait Synthesizer: Send + Sync {
    async fn synthesize(
        &self,
        ctx: &CancellationToken,
        title: &str,
        system: &str,
        results: &[FetchResult],
    ) -> Result<String, SynthesisError>;
}
