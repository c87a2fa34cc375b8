//! Shared HTTP plumbing for the two built-in providers (spec.md §4.8),
//! grounded on the same one-client-per-backend, capped-read pattern used by
//! the REST service adapter.

use std::time::Duration;

use burrow_core::traits::ProviderError;
use burrow_core::CancellationToken;
use reqwest::Client;

/// Both built-in providers cap response reads at 10 MiB (spec.md §4.8).
pub const MAX_RESPONSE_BYTES: usize = 10 * 1024 * 1024;

pub fn build_client() -> Result<Client, ProviderError> {
    Client::builder()
        .build()
        .map_err(|e| ProviderError::Other(format!("failed to build http client: {e}")))
}

/// Sends `request`, racing it against cancellation, and maps a transport
/// failure into the appropriate [`ProviderError`] variant.
pub async fn send_cancelable(
    ctx: &CancellationToken,
    request: reqwest::RequestBuilder,
    endpoint: &str,
) -> Result<reqwest::Response, ProviderError> {
    tokio::select! {
        result = request.send() => result.map_err(|e| classify_transport_error(&e, endpoint)),
        () = ctx.cancelled() => Err(ProviderError::Other("request cancelled".to_string())),
    }
}

fn classify_transport_error(e: &reqwest::Error, endpoint: &str) -> ProviderError {
    if e.is_timeout() {
        return ProviderError::Timeout;
    }
    if e.is_connect() {
        return ProviderError::Unreachable {
            endpoint: endpoint.to_string(),
        };
    }
    ProviderError::Other(format!("request failed: {e}"))
}

pub async fn read_capped(mut response: reqwest::Response) -> Result<Vec<u8>, ProviderError> {
    let mut body = Vec::new();
    loop {
        match response
            .chunk()
            .await
            .map_err(|e| ProviderError::Other(format!("failed to read response body: {e}")))?
        {
            Some(chunk) => {
                let remaining = MAX_RESPONSE_BYTES.saturating_sub(body.len());
                if remaining == 0 {
                    continue;
                }
                if chunk.len() > remaining {
                    body.extend_from_slice(&chunk[..remaining]);
                } else {
                    body.extend_from_slice(&chunk);
                }
            }
            None => break,
        }
    }
    Ok(body)
}

pub fn body_snippet(body: &[u8], max_chars: usize) -> String {
    String::from_utf8_lossy(body).chars().take(max_chars).collect()
}
