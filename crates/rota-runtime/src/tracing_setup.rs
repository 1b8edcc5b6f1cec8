//! Logging setup
//!
//! Installs a `tracing-subscriber` registry with an `EnvFilter` and either a
//! human-readable or a JSON formatter.

use crate::config::{LogFormat, LoggingConfig};
use tracing::info;
use tracing_subscriber::{EnvFilter, layer::SubscriberExt, util::SubscriberInitExt};

pub const DEFAULT_FILTER: &str = "rota_core=info,rota_runtime=info";

/// Configuration for log output
#[derive(Debug, Clone)]
pub struct TracingConfig {
    /// Service name attached to the startup event
    pub service_name: String,
    /// Environment (dev, staging, prod)
    pub environment: String,
    pub format: LogFormat,
    /// Filter used when `RUST_LOG` is unset
    pub default_filter: String,
}

impl Default for TracingConfig {
    fn default() -> Self {
        Self {
            service_name: "rota".to_string(),
            environment: "development".to_string(),
            format: LogFormat::Pretty,
            default_filter: DEFAULT_FILTER.to_string(),
        }
    }
}

impl TracingConfig {
    /// Create configuration from environment variables
    pub fn from_environment() -> Self {
        Self {
            service_name: std::env::var("ROTA_SERVICE_NAME").unwrap_or_else(|_| "rota".to_string()),
            environment: std::env::var("ROTA_ENVIRONMENT").unwrap_or_else(|_| "development".to_string()),
            format: std::env::var("ROTA_LOG_FORMAT")
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or_default(),
            default_filter: DEFAULT_FILTER.to_string(),
        }
    }

    pub fn from_logging(logging: &LoggingConfig, environment: &str) -> Self {
        Self {
            environment: environment.to_string(),
            format: logging.format,
            default_filter: logging.filter.clone().unwrap_or_else(|| DEFAULT_FILTER.to_string()),
            ..Self::default()
        }
    }

    fn env_filter(&self) -> EnvFilter {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&self.default_filter))
    }
}

/// Install the global subscriber.
///
/// Fails when a global subscriber is already set.
pub fn init_tracing(config: TracingConfig) -> anyhow::Result<()> {
    let registry = tracing_subscriber::registry().with(config.env_filter());

    match config.format {
        LogFormat::Pretty => registry.with(tracing_subscriber::fmt::layer().with_target(true)).try_init()?,
        LogFormat::Json => registry
            .with(tracing_subscriber::fmt::layer().json().with_current_span(true))
            .try_init()?,
    }

    info!(
        service_name = %config.service_name,
        environment = %config.environment,
        format = ?config.format,
        "Logging initialized"
    );
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_tracing_config_default() {
        let config = TracingConfig::default();
        assert_eq!(config.service_name, "rota");
        assert_eq!(config.format, LogFormat::Pretty);
        assert_eq!(config.default_filter, DEFAULT_FILTER);
    }

    #[test]
    fn test_from_logging_prefers_configured_filter() {
        let logging = LoggingConfig { format: LogFormat::Json, filter: Some("rota_core=debug".to_string()) };
        let config = TracingConfig::from_logging(&logging, "prod");
        assert_eq!(config.environment, "prod");
        assert_eq!(config.format, LogFormat::Json);
        assert_eq!(config.default_filter, "rota_core=debug");
    }

    #[test]
    fn test_second_init_fails() {
        let _ = init_tracing(TracingConfig::default());
        assert!(init_tracing(TracingConfig::default()).is_err());
    }
}
