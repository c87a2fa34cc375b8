//! Local chat server backend, e.g. Ollama (spec.md §4.8).

use async_trait::async_trait;
use burrow_core::traits::{Provider, ProviderError};
use burrow_core::CancellationToken;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use std::time::Duration;

use crate::http::{build_client, read_capped, send_cancelable};

/// Default per-request timeout for the local backend (spec.md §4.8).
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(5 * 60);

#[derive(Debug, Clone, Default)]
pub struct LocalChatOptions {
    pub num_ctx: Option<u32>,
    pub temperature: Option<f32>,
    pub top_p: Option<f32>,
    pub num_predict: Option<i32>,
}

pub struct LocalChatProvider {
    client: Client,
    endpoint: String,
    model: String,
    timeout: Duration,
    options: LocalChatOptions,
}

impl LocalChatProvider {
    pub fn new(endpoint: impl Into<String>, model: impl Into<String>) -> Result<Self, ProviderError> {
        Ok(Self {
            client: build_client()?,
            endpoint: endpoint.into(),
            model: model.into(),
            timeout: DEFAULT_TIMEOUT,
            options: LocalChatOptions::default(),
        })
    }

    #[must_use]
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    #[must_use]
    pub fn with_options(mut self, options: LocalChatOptions) -> Self {
        self.options = options;
        self
    }
}

#[derive(Serialize)]
struct ChatMessage<'a> {
    role: &'a str,
    content: &'a str,
}

#[derive(Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    messages: Vec<ChatMessage<'a>>,
    stream: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    options: Option<ChatRequestOptions>,
}

#[derive(Serialize, Default)]
struct ChatRequestOptions {
    #[serde(skip_serializing_if = "Option::is_none")]
    num_ctx: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    temperature: Option<f32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    top_p: Option<f32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    num_predict: Option<i32>,
}

#[derive(Deserialize)]
struct ChatResponse {
    message: ChatResponseMessage,
}

#[derive(Deserialize)]
struct ChatResponseMessage {
    content: String,
}

#[async_trait]
impl Provider for LocalChatProvider {
    async fn complete(
        &self,
        ctx: &CancellationToken,
        system: &str,
        user: &str,
    ) -> Result<String, ProviderError> {
        let options = ChatRequestOptions {
            num_ctx: self.options.num_ctx,
            temperature: self.options.temperature,
            top_p: self.options.top_p,
            num_predict: self.options.num_predict,
        };
        let has_options = options.num_ctx.is_some()
            || options.temperature.is_some()
            || options.top_p.is_some()
            || options.num_predict.is_some();

        let body = ChatRequest {
            model: &self.model,
            messages: vec![
                ChatMessage { role: "system", content: system },
                ChatMessage { role: "user", content: user },
            ],
            stream: false,
            options: has_options.then_some(options),
        };

        let url = format!("{}/api/chat", self.endpoint.trim_end_matches('/'));
        let request = self.client.post(&url).timeout(self.timeout).json(&body);
        let response = send_cancelable(ctx, request, &self.endpoint).await?;

        let status = response.status();
        if status.as_u16() == 404 {
            return Err(ProviderError::ModelNotFound);
        }
        let body_bytes = read_capped(response).await?;
        if !status.is_success() {
            return Err(ProviderError::Http {
                status: status.as_u16(),
                body: crate::http::body_snippet(&body_bytes, 512),
            });
        }

        let parsed: ChatResponse = serde_json::from_slice(&body_bytes)
            .map_err(|e| ProviderError::Other(format!("invalid response from local chat server: {e}")))?;
        Ok(parsed.message.content)
    }
}
