//! Declarative tool configuration (spec.md §4.1, §9 "Declarative tool
//! config" — tagged variants over string-matched switches, rejected at
//! load time if unknown).

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ParamLocation {
    Query,
    Path,
}

impl Default for ParamLocation {
    fn default() -> Self {
        Self::Query
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ParamConfig {
    pub name: String,
    pub maps_to: String,
    #[serde(rename = "in", default)]
    pub location: ParamLocation,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolConfig {
    #[serde(default = "default_method")]
    pub method: String,
    pub path: String,
    #[serde(default)]
    pub params: Vec<ParamConfig>,
    /// Name of the param (by `ParamConfig::name`) whose raw value becomes
    /// the request body, if any.
    #[serde(default)]
    pub body: Option<String>,
}

fn default_method() -> String {
    "GET".to_string()
}

/// Auth method as a tagged enum (spec.md §4.1); unknown `method` values fail
/// deserialization instead of falling through a string match.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "method", rename_all = "snake_case")]
pub enum AuthMethod {
    ApiKey {
        #[serde(default = "default_api_key_param")]
        param_name: String,
        value_env: String,
    },
    ApiKeyHeader {
        #[serde(default = "default_api_key_header")]
        header_name: String,
        value_env: String,
    },
    Bearer {
        token_env: String,
    },
    UserAgent {
        value: String,
    },
    None,
}

fn default_api_key_param() -> String {
    "api_key".to_string()
}

fn default_api_key_header() -> String {
    "X-API-Key".to_string()
}

impl Default for AuthMethod {
    fn default() -> Self {
        Self::None
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServiceConfig {
    pub endpoint: String,
    #[serde(default)]
    pub auth: AuthMethod,
    #[serde(default)]
    pub proxy: Option<String>,
    #[serde(default)]
    pub privacy_transport: bool,
    #[serde(default)]
    pub tools: BTreeMap<String, ToolConfig>,
}
