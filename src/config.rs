//! Top-level `burrow.toml` settings (SPEC_FULL.md §4.1 "Configuration").

use std::collections::BTreeMap;
use std::path::PathBuf;

use burrow_service::ServiceConfig;
use serde::{Deserialize, Serialize};

fn default_reports_dir() -> PathBuf {
    PathBuf::from("./reports")
}
fn default_cache_dir() -> PathBuf {
    PathBuf::from("./cache")
}
fn default_routines_dir() -> PathBuf {
    PathBuf::from("./routines")
}
fn default_state_file() -> PathBuf {
    PathBuf::from("./state/scheduler.json")
}
fn default_cache_ttl_secs() -> u64 {
    3600
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PathsConfig {
    #[serde(default = "default_reports_dir")]
    pub reports_dir: PathBuf,
    #[serde(default = "default_cache_dir")]
    pub cache_dir: PathBuf,
    #[serde(default = "default_routines_dir")]
    pub routines_dir: PathBuf,
    #[serde(default = "default_state_file")]
    pub state_file: PathBuf,
    #[serde(default = "default_cache_ttl_secs")]
    pub cache_ttl_secs: u64,
}

impl Default for PathsConfig {
    fn default() -> Self {
        Self {
            reports_dir: default_reports_dir(),
            cache_dir: default_cache_dir(),
            routines_dir: default_routines_dir(),
            state_file: default_state_file(),
            cache_ttl_secs: default_cache_ttl_secs(),
        }
    }
}

/// Tagged by `kind`; an unknown kind fails deserialization instead of
/// falling through a string match (SPEC_FULL.md §4.1, spec.md §9
/// "Declarative tool config").
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ProviderConfig {
    Local {
        endpoint: String,
        model: String,
        #[serde(default)]
        timeout_secs: Option<u64>,
    },
    OpenaiCompatible {
        endpoint: String,
        model: String,
        api_key_env: String,
        #[serde(default)]
        timeout_secs: Option<u64>,
    },
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct LlmConfig {
    #[serde(default)]
    pub providers: BTreeMap<String, ProviderConfig>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Settings {
    #[serde(default)]
    pub paths: PathsConfig,
    #[serde(default)]
    pub llm: LlmConfig,
    #[serde(default)]
    pub services: BTreeMap<String, ServiceConfig>,
}

impl Settings {
    pub fn load(path: &std::path::Path) -> Result<Self, SettingsError> {
        let raw = std::fs::read_to_string(path)?;
        let settings: Self = toml::from_str(&raw)?;
        Ok(settings)
    }
}

#[derive(Debug, thiserror::Error)]
pub enum SettingsError {
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
    #[error("invalid burrow.toml: {0}")]
    Parse(#[from] toml::de::Error),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn minimal_toml_falls_back_to_default_paths() {
        let settings: Settings = toml::from_str("").unwrap();
        assert_eq!(settings.paths.reports_dir, PathBuf::from("./reports"));
        assert_eq!(settings.paths.cache_ttl_secs, 3600);
        assert!(settings.llm.providers.is_empty());
    }

    #[test]
    fn a_local_provider_parses_with_the_right_tag() {
        let toml = r#"
            [llm.providers.ollama]
            kind = "local"
            endpoint = "http://localhost:11434"
            model = "llama3"
        "#;
        let settings: Settings = toml::from_str(toml).unwrap();
        match &settings.llm.providers["ollama"] {
            ProviderConfig::Local { endpoint, model, .. } => {
                assert_eq!(endpoint, "http://localhost:11434");
                assert_eq!(model, "llama3");
            }
            other => panic!("expected Local, got {other:?}"),
        }
    }

    #[test]
    fn an_unknown_provider_kind_is_rejected_at_parse_time() {
        let toml = r#"
            [llm.providers.bad]
            kind = "magic"
            endpoint = "http://x"
            model = "m"
        "#;
        assert!(toml::from_str::<Settings>(toml).is_err());
    }
}
