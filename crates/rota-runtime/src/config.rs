use anyhow::Context;
use rota_core::{DocumentEvent, EngineConfig};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;
use std::str::FromStr;
use tracing::{info, warn};

const DEFAULT_CONFIG: &str = r#"[environment]
env_type = "default"
[engine]
assignment_lookup_limit = 5
trigger_events = ["after_insert", "on_update"]
[caching]
cache_type = "in_memory"
rule_cache_ttl_minutes = 60
max_entries = 10000
[logging]
format = "pretty"
"#;

#[derive(Deserialize, Serialize, Debug, Clone, PartialEq)]
pub struct Environment {
    pub env_type: String,
}

impl Default for Environment {
    fn default() -> Self {
        Self { env_type: "default".to_string() }
    }
}

#[derive(Deserialize, Serialize, Debug, Clone, PartialEq)]
pub struct EngineSection {
    #[serde(default = "default_assignment_lookup_limit")]
    pub assignment_lookup_limit: usize,
    #[serde(default = "default_trigger_events")]
    pub trigger_events: Vec<DocumentEvent>,
}

impl Default for EngineSection {
    fn default() -> Self {
        Self {
            assignment_lookup_limit: default_assignment_lookup_limit(),
            trigger_events: default_trigger_events(),
        }
    }
}

/// Where the rule cache lives
#[derive(Deserialize, Serialize, Debug, Clone, Copy, PartialEq, Eq, Default)]
#[serde(rename_all = "snake_case")]
pub enum CacheType {
    #[default]
    InMemory,
    Redis,
}

impl FromStr for CacheType {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "in_memory" | "memory" => Ok(CacheType::InMemory),
            "redis" => Ok(CacheType::Redis),
            other => anyhow::bail!("unknown cache type '{other}'"),
        }
    }
}

#[derive(Deserialize, Serialize, Debug, Clone, PartialEq)]
pub struct CachingConfig {
    #[serde(default)]
    pub cache_type: CacheType,
    pub redis_url: Option<String>,
    #[serde(default = "default_rule_cache_ttl_minutes")]
    pub rule_cache_ttl_minutes: u64,
    #[serde(default = "default_max_entries")]
    pub max_entries: u64,
}

impl Default for CachingConfig {
    fn default() -> Self {
        Self {
            cache_type: CacheType::InMemory,
            redis_url: None,
            rule_cache_ttl_minutes: default_rule_cache_ttl_minutes(),
            max_entries: default_max_entries(),
        }
    }
}

#[derive(Deserialize, Serialize, Debug, Clone, Copy, PartialEq, Eq, Default)]
#[serde(rename_all = "snake_case")]
pub enum LogFormat {
    #[default]
    Pretty,
    Json,
}

impl FromStr for LogFormat {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "pretty" | "text" => Ok(LogFormat::Pretty),
            "json" => Ok(LogFormat::Json),
            other => anyhow::bail!("unknown log format '{other}'"),
        }
    }
}

#[derive(Deserialize, Serialize, Debug, Clone, PartialEq, Default)]
pub struct LoggingConfig {
    #[serde(default)]
    pub format: LogFormat,
    /// `EnvFilter` directives; `RUST_LOG` wins when set
    pub filter: Option<String>,
}

#[derive(Deserialize, Serialize, Debug, Clone, PartialEq, Default)]
pub struct RotaConfig {
    #[serde(default)]
    pub environment: Environment,
    #[serde(default)]
    pub engine: EngineSection,
    #[serde(default)]
    pub caching: CachingConfig,
    #[serde(default)]
    pub logging: LoggingConfig,
}

impl RotaConfig {
    /// Load from `ROTA_CONFIG_PATH` (default `rota.toml`), falling back to the
    /// built-in configuration when the file is missing.
    pub fn load() -> anyhow::Result<Self> {
        let config_path = std::env::var("ROTA_CONFIG_PATH").unwrap_or_else(|_| "rota.toml".to_string());
        Self::load_from(&config_path)
    }

    pub fn load_from(path: impl AsRef<Path>) -> anyhow::Result<Self> {
        let path = path.as_ref();
        let config_str = fs::read_to_string(path).unwrap_or_else(|_| {
            warn!(
                "Configuration file '{}' not found. Using default configuration.",
                path.display()
            );
            DEFAULT_CONFIG.to_string()
        });

        Self::parse(&config_str).with_context(|| format!("Failed to parse configuration file '{}'", path.display()))
    }

    pub fn parse(config_str: &str) -> anyhow::Result<Self> {
        Ok(toml::from_str(config_str)?)
    }

    pub fn apply_profile(mut self) -> Self {
        info!(
            "Applying configuration profile for '{}' environment.",
            self.environment.env_type
        );

        if let Ok(cache_type) = std::env::var("ROTA_CACHE_TYPE") {
            match cache_type.parse::<CacheType>() {
                Ok(cache_type) => self.caching.cache_type = cache_type,
                Err(e) => warn!("Ignoring ROTA_CACHE_TYPE: {}", e),
            }
        }
        if let Ok(redis_url) = std::env::var("ROTA_REDIS_URL") {
            self.caching.redis_url = Some(redis_url);
        }
        if let Ok(ttl) = std::env::var("ROTA_CACHE_TTL_MINUTES") {
            if let Ok(ttl_num) = ttl.parse::<u64>() {
                self.caching.rule_cache_ttl_minutes = ttl_num;
            }
        }

        if let Ok(limit) = std::env::var("ROTA_ASSIGNMENT_LOOKUP_LIMIT") {
            if let Ok(limit_num) = limit.parse::<usize>() {
                self.engine.assignment_lookup_limit = limit_num;
            }
        }

        if let Ok(format) = std::env::var("ROTA_LOG_FORMAT") {
            match format.parse::<LogFormat>() {
                Ok(format) => self.logging.format = format,
                Err(e) => warn!("Ignoring ROTA_LOG_FORMAT: {}", e),
            }
        }

        self
    }

    pub fn to_engine_config(&self) -> EngineConfig {
        EngineConfig {
            assignment_lookup_limit: self.engine.assignment_lookup_limit,
            trigger_events: self.engine.trigger_events.clone(),
        }
    }
}

fn default_assignment_lookup_limit() -> usize {
    rota_core::engine::DEFAULT_ASSIGNMENT_LOOKUP_LIMIT
}
fn default_trigger_events() -> Vec<DocumentEvent> {
    EngineConfig::default().trigger_events
}
fn default_rule_cache_ttl_minutes() -> u64 {
    60
}
fn default_max_entries() -> u64 {
    10_000
}
