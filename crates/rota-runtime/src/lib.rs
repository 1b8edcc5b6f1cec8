//! Process wiring for the rota assignment-rule engine.
//!
//! [`Runtime`] turns a [`config::RotaConfig`] into a ready engine: it picks the
//! rule-cache backend, shares one rule registry, and subscribes the
//! [`hooks::LifecycleHooks`] so their registration follows rule changes.

pub mod cache;
pub mod config;
pub mod hooks;
pub mod tracing_setup;

use config::RotaConfig;
use hooks::LifecycleHooks;
use rota_core::{AssignmentRuleEngine, Collaborators, RuleRegistry};
use std::sync::Arc;
use tracing::{info, warn};

pub use cache::{MokaCacheStore, build_cache_store};
pub use config::{CacheType, LogFormat};
pub use tracing_setup::{TracingConfig, init_tracing};

#[cfg(feature = "redis-cache")]
pub use cache::RedisCacheStore;

/// A configured engine with its registry and lifecycle hooks
pub struct Runtime {
    config: RotaConfig,
    engine: Arc<AssignmentRuleEngine>,
    registry: RuleRegistry,
    hooks: Arc<LifecycleHooks>,
}

impl std::fmt::Debug for Runtime {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Runtime")
            .field("config", &self.config)
            .field("hooks", &self.hooks)
            .finish_non_exhaustive()
    }
}

impl Runtime {
    /// Build a runtime backed by in-process stores
    pub fn from_config(config: RotaConfig) -> anyhow::Result<Self> {
        Self::with_collaborators(config, Collaborators::in_memory())
    }

    /// Build a runtime over host-provided stores.
    ///
    /// The `cache` collaborator is replaced by the backend the configuration
    /// selects.
    pub fn with_collaborators(config: RotaConfig, mut collaborators: Collaborators) -> anyhow::Result<Self> {
        collaborators.cache = build_cache_store(&config.caching)?;

        let engine = Arc::new(AssignmentRuleEngine::new(config.to_engine_config(), collaborators));
        let registry = engine.registry();
        let hooks = Arc::new(LifecycleHooks::new(Arc::clone(&engine)));
        registry.subscribe(hooks.clone());

        info!(
            environment = %config.environment.env_type,
            cache_type = ?config.caching.cache_type,
            document_types = ?hooks.registered_document_types(),
            "Assignment runtime ready"
        );
        Ok(Self { config, engine, registry, hooks })
    }

    /// Load configuration from the environment, initialize logging and build
    /// an in-process runtime.
    pub fn bootstrap() -> anyhow::Result<Self> {
        let config = RotaConfig::load()?.apply_profile();
        let tracing_config = TracingConfig::from_logging(&config.logging, &config.environment.env_type);
        if let Err(e) = init_tracing(tracing_config) {
            warn!("Logging already initialized: {}", e);
        }
        Self::from_config(config)
    }

    pub fn config(&self) -> &RotaConfig {
        &self.config
    }

    pub fn engine(&self) -> &Arc<AssignmentRuleEngine> {
        &self.engine
    }

    /// Registry whose writes refresh the hooks
    pub fn registry(&self) -> &RuleRegistry {
        &self.registry
    }

    pub fn hooks(&self) -> &Arc<LifecycleHooks> {
        &self.hooks
    }
}
