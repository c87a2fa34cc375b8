//! Wires the Burrow crates together: loads `burrow.toml`, builds the
//! service/provider registries, and drives either a single routine run or
//! the scheduler (spec.md §1, SPEC_FULL.md §3 "Provider selection").

pub mod config;
pub mod error;

use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;

use burrow_cache::CachingService;
use burrow_core::traits::{Provider, Synthesizer};
use burrow_core::Routine;
use burrow_executor::{PipelineExecutor, SynthesizerResolver};
use burrow_llm::{LocalChatProvider, OpenAiCompatibleProvider};
use burrow_redaction::AttributionStripper;
use burrow_report::ReportStore;
use burrow_scheduler::Scheduler;
use burrow_service::{RestService, ServiceRegistry};
use burrow_synth::{LlmSynthesizer, PassthroughSynthesizer};

pub use config::Settings;
pub use error::BurrowError;

/// Builds a [`ServiceRegistry`] from configured services, wrapping each in a
/// [`CachingService`] with the configured TTL (spec.md §4.3).
#[must_use]
pub fn build_registry(settings: &Settings) -> ServiceRegistry {
    let registry = ServiceRegistry::new();
    let ttl = Duration::from_secs(settings.paths.cache_ttl_secs);
    for (name, config) in &settings.services {
        let rest = match RestService::new(name.clone(), config.clone()) {
            Ok(rest) => rest,
            Err(e) => {
                tracing::warn!(service = %name, error = %e, "failed to build service; skipping");
                continue;
            }
        };
        let cached = CachingService::new(Arc::new(rest), settings.paths.cache_dir.clone(), ttl);
        if let Err(e) = registry.register(Arc::new(cached)) {
            tracing::warn!(service = %name, error = %e, "failed to register service");
        }
    }
    registry
}

/// Builds every configured LLM provider, skipping (with a warning) any that
/// fail to construct (SPEC_FULL.md §4.1, spec.md §4.8).
#[must_use]
pub fn build_providers(settings: &Settings) -> BTreeMap<String, Arc<dyn Provider>> {
    let mut providers = BTreeMap::new();
    for (name, provider_config) in &settings.llm.providers {
        let provider: Arc<dyn Provider> = match provider_config {
            config::ProviderConfig::Local { endpoint, model, timeout_secs } => {
                match LocalChatProvider::new(endpoint.clone(), model.clone()) {
                    Ok(p) => {
                        let p = match timeout_secs {
                            Some(secs) => p.with_timeout(Duration::from_secs(*secs)),
                            None => p,
                        };
                        Arc::new(p)
                    }
                    Err(e) => {
                        tracing::warn!(provider = %name, error = %e, "failed to build local llm provider; skipping");
                        continue;
                    }
                }
            }
            config::ProviderConfig::OpenaiCompatible { endpoint, model, api_key_env, timeout_secs } => {
                let api_key = std::env::var(api_key_env).ok();
                if api_key.is_none() {
                    tracing::warn!(provider = %name, env = %api_key_env, "api key env var not set; requests will be unauthenticated");
                }
                match OpenAiCompatibleProvider::new(endpoint.clone(), model.clone(), api_key) {
                    Ok(p) => {
                        let p = match timeout_secs {
                            Some(secs) => p.with_timeout(Duration::from_secs(*secs)),
                            None => p,
                        };
                        Arc::new(p)
                    }
                    Err(e) => {
                        tracing::warn!(provider = %name, error = %e, "failed to build openai-compatible llm provider; skipping");
                        continue;
                    }
                }
            }
        };
        providers.insert(name.clone(), provider);
    }
    providers
}

/// Resolves a routine's `llm` key against the configured provider map,
/// falling back to the no-LLM passthrough synthesizer when the key is
/// absent or names an unconfigured provider (SPEC_FULL.md §3 "Provider
/// selection").
pub struct RoutineSynthesizerResolver {
    providers: BTreeMap<String, Arc<dyn Provider>>,
}

impl RoutineSynthesizerResolver {
    #[must_use]
    pub fn new(providers: BTreeMap<String, Arc<dyn Provider>>) -> Self {
        Self { providers }
    }
}

impl SynthesizerResolver for RoutineSynthesizerResolver {
    fn resolve(&self, routine: &Routine) -> Arc<dyn Synthesizer> {
        let Some(provider_name) = &routine.llm else {
            return Arc::new(PassthroughSynthesizer);
        };
        let Some(provider) = self.providers.get(provider_name) else {
            tracing::warn!(routine = %routine.name, llm = %provider_name, "llm provider not configured; falling back to passthrough synthesis");
            return Arc::new(PassthroughSynthesizer);
        };
        let service_names: Vec<String> = routine.sources.iter().map(|s| s.service.clone()).collect();
        let stripper = Some(AttributionStripper::new(service_names));
        Arc::new(LlmSynthesizer::new(provider.clone(), &routine.synthesis, stripper))
    }
}

/// Assembles the executor and scheduler from loaded settings.
pub struct App {
    pub executor: Arc<PipelineExecutor>,
    pub scheduler: Scheduler,
    pub settings: Settings,
}

impl App {
    pub fn build(settings: Settings) -> Result<Self, BurrowError> {
        let registry = Arc::new(build_registry(&settings));
        let report_store = Arc::new(ReportStore::new(settings.paths.reports_dir.clone()));
        let providers = build_providers(&settings);
        let resolver = Arc::new(RoutineSynthesizerResolver::new(providers));
        let executor = Arc::new(PipelineExecutor::new(registry, report_store, resolver));
        let scheduler = Scheduler::new(
            settings.paths.routines_dir.clone(),
            settings.paths.state_file.clone(),
            executor.clone(),
        )?;
        Ok(Self { executor, scheduler, settings })
    }

    /// Runs a single named routine immediately, bypassing the scheduler's
    /// `due` check and inflight guard entirely.
    pub async fn run_once(&self, ctx: &burrow_core::CancellationToken, routine_name: &str) -> Result<burrow_report::Report, BurrowError> {
        let routine = burrow_routine::load_dir(&self.settings.paths.routines_dir)?
            .into_iter()
            .find(|r| r.name == routine_name)
            .ok_or_else(|| BurrowError::RoutineNotFound(routine_name.to_string()))?;
        Ok(self.executor.run(ctx, &routine).await?)
    }
}
