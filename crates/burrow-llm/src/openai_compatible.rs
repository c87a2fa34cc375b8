//! OpenAI-compatible remote chat backend (spec.md §4.8).

use async_trait::async_trait;
use burrow_core::traits::{Provider, ProviderError};
use burrow_core::CancellationToken;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use std::time::Duration;

use crate::http::{build_client, read_capped, send_cancelable};

/// Default per-request timeout for the OpenAI-compatible backend (spec.md §4.8).
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(2 * 60);

pub struct OpenAiCompatibleProvider {
    client: Client,
    endpoint: String,
    model: String,
    api_key: Option<String>,
    timeout: Duration,
}

impl OpenAiCompatibleProvider {
    pub fn new(
        endpoint: impl Into<String>,
        model: impl Into<String>,
        api_key: Option<String>,
    ) -> Result<Self, ProviderError> {
        Ok(Self {
            client: build_client()?,
            endpoint: endpoint.into(),
            model: model.into(),
            api_key,
            timeout: DEFAULT_TIMEOUT,
        })
    }

    #[must_use]
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
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
}

#[derive(Deserialize)]
struct ChatResponse {
    #[serde(default)]
    choices: Vec<ChatChoice>,
}

#[derive(Deserialize)]
struct ChatChoice {
    message: ChatChoiceMessage,
}

#[derive(Deserialize)]
struct ChatChoiceMessage {
    content: String,
}

#[derive(Deserialize)]
struct ErrorEnvelope {
    error: ErrorDetail,
}

#[derive(Deserialize)]
struct ErrorDetail {
    message: String,
}

fn extract_error_message(body: &[u8]) -> Option<String> {
    serde_json::from_slice::<ErrorEnvelope>(body)
        .ok()
        .map(|e| e.error.message)
}

#[async_trait]
impl Provider for OpenAiCompatibleProvider {
    async fn complete(
        &self,
        ctx: &CancellationToken,
        system: &str,
        user: &str,
    ) -> Result<String, ProviderError> {
        let body = ChatRequest {
            model: &self.model,
            messages: vec![
                ChatMessage { role: "system", content: system },
                ChatMessage { role: "user", content: user },
            ],
        };

        let url = format!("{}/chat/completions", self.endpoint.trim_end_matches('/'));
        let mut request = self.client.post(&url).timeout(self.timeout).json(&body);
        if let Some(key) = &self.api_key {
            request = request.header("Authorization", format!("Bearer {key}"));
        }
        let response = send_cancelable(ctx, request, &self.endpoint).await?;

        let status = response.status();
        if status.as_u16() == 401 {
            return Err(ProviderError::InvalidApiKey);
        }
        if status.as_u16() == 429 {
            return Err(ProviderError::RateLimited);
        }
        let body_bytes = read_capped(response).await?;
        if !status.is_success() {
            let message = extract_error_message(&body_bytes)
                .unwrap_or_else(|| crate::http::body_snippet(&body_bytes, 512));
            return Err(ProviderError::Http { status: status.as_u16(), body: message });
        }

        let parsed: ChatResponse = serde_json::from_slice(&body_bytes)
            .map_err(|e| ProviderError::Other(format!("invalid response from provider: {e}")))?;
        let first = parsed.choices.into_iter().next().ok_or(ProviderError::NoChoices)?;
        Ok(first.message.content)
    }
}
