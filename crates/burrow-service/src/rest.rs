//! REST service adapter (spec.md §4.1).
//!
//! Turns a declarative `(tool, params)` pair into an HTTP request. Grounded
//! on the shared-HTTP-client pattern used for LLM backends elsewhere in this
//! workspace: one client per service, rustls, bounded timeout, a capped
//! response read.

use std::collections::BTreeMap;
use std::time::Duration;

use async_trait::async_trait;
use burrow_core::traits::{Service, ServiceError};
use burrow_core::{CancellationToken, FetchResult};
use rand::seq::SliceRandom;
use reqwest::Client;
use tracing::warn;
use url::Url;

use crate::config::{AuthMethod, ParamLocation, ServiceConfig};

/// Hard cap on response bodies read from any service (spec.md §4.1).
const MAX_RESPONSE_BYTES: usize = 10 * 1024 * 1024;

/// Per-request timeout (spec.md §5).
const REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

const PRIVACY_USER_AGENTS: &[&str] = &[
    "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36",
    "Mozilla/5.0 (Macintosh; Intel Mac OS X 10_15_7) AppleWebKit/605.1.15",
    "Mozilla/5.0 (X11; Linux x86_64) AppleWebKit/537.36",
];

/// An optional header-minimizing, UA-randomizing, referrer-stripping layer
/// (spec.md §4.1 "An optional privacy wrapper").
///
/// `preserve_user_agent` is the in-process equivalent of the sentinel header
/// spec.md describes: when the service's auth method itself needs to set a
/// specific `User-Agent`, the privacy layer must not clobber it, but that
/// preference never becomes an outbound header of its own.
#[derive(Debug, Clone, Copy, Default)]
struct PrivacyTransport;

impl PrivacyTransport {
    fn pick_user_agent(&self) -> &'static str {
        PRIVACY_USER_AGENTS
            .choose(&mut rand::thread_rng())
            .copied()
            .unwrap_or(PRIVACY_USER_AGENTS[0])
    }
}

/// A REST-backed [`Service`] bound to one configured endpoint.
///
/// Each instance owns its own `reqwest::Client` (spec.md §4.1/§5 "Transport
/// isolation" — no connection pool sharing across services).
pub struct RestService {
    name: String,
    config: ServiceConfig,
    client: Client,
    privacy: Option<PrivacyTransport>,
    /// Injected path template expander (spec.md §4.1 "Template expansion").
    /// Failures are logged and the original path is used unexpanded.
    path_expander: Option<Box<dyn Fn(&str) -> Result<String, String> + Send + Sync>>,
}

impl RestService {
    pub fn new(name: impl Into<String>, config: ServiceConfig) -> Result<Self, ServiceError> {
        let mut builder = Client::builder().timeout(REQUEST_TIMEOUT);
        if let Some(proxy_url) = config.proxy.as_deref() {
            let proxy = reqwest::Proxy::all(proxy_url)
                .map_err(|e| ServiceError::Other(format!("invalid proxy url: {e}")))?;
            builder = builder.proxy(proxy);
        }
        let client = builder
            .build()
            .map_err(|e| ServiceError::Other(format!("failed to build http client: {e}")))?;
        let privacy = config.privacy_transport.then_some(PrivacyTransport);
        Ok(Self {
            name: name.into(),
            config,
            client,
            privacy,
            path_expander: None,
        })
    }

    #[must_use]
    pub fn with_path_expander(
        mut self,
        expander: Box<dyn Fn(&str) -> Result<String, String> + Send + Sync>,
    ) -> Self {
        self.path_expander = Some(expander);
        self
    }

    fn expand_path(&self, path: &str) -> String {
        let Some(expander) = &self.path_expander else {
            return path.to_string();
        };
        match expander(path) {
            Ok(expanded) => expanded,
            Err(reason) => {
                warn!(service = %self.name, %reason, "path template expansion failed; using unexpanded path");
                path.to_string()
            }
        }
    }

    /// Phase 1: substitute `{maps_to}` tokens with percent-encoded path
    /// param values; error on a missing required param or a leftover token.
    fn substitute_path_params(
        &self,
        path: &str,
        params: &BTreeMap<String, String>,
        tool: &crate::config::ToolConfig,
    ) -> Result<String, ServiceError> {
        let mut substituted = path.to_string();
        for param in tool.params.iter().filter(|p| p.location == ParamLocation::Path) {
            let token = format!("{{{}}}", param.maps_to);
            let Some(value) = params.get(&param.name) else {
                return Err(ServiceError::MissingPathParam(param.maps_to.clone()));
            };
            let encoded = url::form_urlencoded::byte_serialize(value.as_bytes()).collect::<String>();
            substituted = substituted.replace(&token, &encoded);
        }
        if let Some(start) = substituted.find('{') {
            if substituted[start..].contains('}') {
                return Err(ServiceError::UnreplacedPlaceholder(substituted));
            }
        }
        Ok(substituted)
    }

    /// Phase 2: resolve the substituted path against the service endpoint
    /// and merge query parameters, preserving literal query pairs already
    /// present in the tool path and letting mapped params override them.
    fn assemble_url(
        &self,
        substituted_path: &str,
        params: &BTreeMap<String, String>,
        tool: &crate::config::ToolConfig,
    ) -> Result<Url, ServiceError> {
        let base = Url::parse(&self.config.endpoint)
            .map_err(|e| ServiceError::Other(format!("invalid service endpoint: {e}")))?;

        let mut url = if substituted_path.starts_with('/') {
            let mut u = base.clone();
            // Absolute tool paths replace the endpoint's path entirely.
            let (path_only, _) = split_path_and_query(substituted_path);
            u.set_path(path_only);
            u
        } else {
            base.join(substituted_path)
                .map_err(|e| ServiceError::Other(format!("invalid tool path: {e}")))?
        };

        // Carry over any literal query pairs already present in the tool path.
        let (_, existing_query) = split_path_and_query(substituted_path);
        let mut pairs: Vec<(String, String)> = existing_query
            .map(|q| {
                url::form_urlencoded::parse(q.as_bytes())
                    .into_owned()
                    .collect()
            })
            .unwrap_or_default();

        for param in tool.params.iter().filter(|p| p.location == ParamLocation::Query) {
            if tool.body.as_deref() == Some(param.name.as_str()) {
                continue;
            }
            let Some(value) = params.get(&param.name) else {
                continue;
            };
            pairs.retain(|(k, _)| k != &param.maps_to);
            pairs.push((param.maps_to.clone(), value.clone()));
        }

        self.apply_auth_query(&mut pairs);

        url.query_pairs_mut().clear();
        if !pairs.is_empty() {
            let mut serializer = url.query_pairs_mut();
            for (k, v) in &pairs {
                serializer.append_pair(k, v);
            }
        }
        Ok(url)
    }

    fn apply_auth_query(&self, pairs: &mut Vec<(String, String)>) {
        if let AuthMethod::ApiKey { param_name, value_env } = &self.config.auth {
            if let Ok(value) = std::env::var(value_env) {
                pairs.retain(|(k, _)| k != param_name);
                pairs.push((param_name.clone(), value));
            }
        }
    }

    fn apply_auth_headers(&self, mut request: reqwest::RequestBuilder) -> reqwest::RequestBuilder {
        match &self.config.auth {
            AuthMethod::ApiKeyHeader { header_name, value_env } => {
                if let Ok(value) = std::env::var(value_env) {
                    request = request.header(header_name, value);
                }
            }
            AuthMethod::Bearer { token_env } => {
                if let Ok(token) = std::env::var(token_env) {
                    request = request.header("Authorization", format!("Bearer {token}"));
                }
            }
            AuthMethod::UserAgent { value } => {
                request = request.header("User-Agent", value.clone());
            }
            AuthMethod::ApiKey { .. } | AuthMethod::None => {}
        }

        if let Some(privacy) = &self.privacy {
            let auth_sets_ua = matches!(self.config.auth, AuthMethod::UserAgent { .. });
            if !auth_sets_ua {
                request = request.header("User-Agent", privacy.pick_user_agent());
            }
            // Referrer stripping: never set one.
        }
        request
    }
}

fn split_path_and_query(path: &str) -> (&str, Option<&str>) {
    match path.split_once('?') {
        Some((p, q)) => (p, Some(q)),
        None => (path, None),
    }
}

/// Reads a response body up to `MAX_RESPONSE_BYTES`, discarding the rest
/// rather than buffering an unbounded payload (spec.md §4.1 "a 10 MiB cap
/// via a limited reader").
async fn read_capped(mut response: reqwest::Response) -> Result<Vec<u8>, String> {
    let mut body = Vec::new();
    loop {
        match response.chunk().await {
            Ok(Some(chunk)) => {
                if body.len() >= MAX_RESPONSE_BYTES {
                    continue;
                }
                let remaining = MAX_RESPONSE_BYTES - body.len();
                if chunk.len() > remaining {
                    body.extend_from_slice(&chunk[..remaining]);
                } else {
                    body.extend_from_slice(&chunk);
                }
            }
            Ok(None) => break,
            Err(e) => return Err(format!("failed to read response body: {e}")),
        }
    }
    Ok(body)
}

#[async_trait]
impl Service for RestService {
    fn name(&self) -> &str {
        &self.name
    }

    async fn execute(
        &self,
        ctx: &CancellationToken,
        tool: &str,
        params: &BTreeMap<String, String>,
    ) -> Result<FetchResult, ServiceError> {
        let tool_config = self
            .config
            .tools
            .get(tool)
            .ok_or_else(|| ServiceError::UnknownTool(tool.to_string()))?;

        let expanded_path = self.expand_path(&tool_config.path);
        let substituted = self.substitute_path_params(&expanded_path, params, tool_config)?;
        let url = self.assemble_url(&substituted, params, tool_config)?;

        let mut request = self.client.request(
            tool_config
                .method
                .parse()
                .unwrap_or(reqwest::Method::GET),
            url.clone(),
        );
        request = self.apply_auth_headers(request);

        if let Some(body_param) = &tool_config.body {
            if let Some(body_value) = params.get(body_param) {
                request = request
                    .header("Content-Type", "application/json")
                    .body(body_value.clone());
            }
        }

        let url_string = url.to_string();

        let send = async {
            tokio::select! {
                result = request.send() => result.map_err(|e| format!("request failed: {e}")),
                () = ctx.cancelled() => Err("request cancelled".to_string()),
            }
        };

        let response = match send.await {
            Ok(r) => r,
            Err(message) => {
                let mut result = FetchResult::error(&self.name, tool, message);
                result.url = url_string;
                return Ok(result);
            }
        };

        let status = response.status();
        let body = match read_capped(response).await {
            Ok(b) => b,
            Err(message) => {
                let mut result = FetchResult::error(&self.name, tool, message);
                result.url = url_string;
                return Ok(result);
            }
        };

        let mut result = if status.as_u16() >= 400 {
            let cap = body.len().min(512);
            let snippet = String::from_utf8_lossy(&body[..cap]).into_owned();
            FetchResult {
                service: self.name.clone(),
                tool: tool.to_string(),
                data: body,
                url: url_string.clone(),
                timestamp: chrono::Utc::now(),
                error: format!("HTTP {}: {}", status.as_u16(), snippet),
                context_label: None,
            }
        } else {
            FetchResult::ok(&self.name, tool, body, url_string.clone())
        };
        result.url = url_string;
        Ok(result)
    }
}
