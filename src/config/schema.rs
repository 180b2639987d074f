//! Configuration schema definitions.
//!
//! This module defines the complete configuration structure for the service.
//! All types derive Serde traits for deserialization from config files.

use serde::{Deserialize, Serialize};

/// Root configuration for the demo service.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct AppConfig {
    /// Runtime environment name (development, production, ...).
    pub runtime_env: String,

    /// Listener configuration (bind address).
    pub listener: ListenerConfig,

    /// APM agent settings, fixed at process start.
    pub apm: ApmConfig,

    /// Console and remote log sink settings.
    pub logging: LoggingConfig,

    /// External API called by the users routes.
    pub upstream: UpstreamConfig,

    /// Latency injected in front of every route.
    pub delay: DelayConfig,

    /// Route selection.
    pub routes: RoutesConfig,

    /// Metrics exposition.
    pub observability: ObservabilityConfig,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            runtime_env: "development".to_string(),
            listener: ListenerConfig::default(),
            apm: ApmConfig::default(),
            logging: LoggingConfig::default(),
            upstream: UpstreamConfig::default(),
            delay: DelayConfig::default(),
            routes: RoutesConfig::default(),
            observability: ObservabilityConfig::default(),
        }
    }
}

impl AppConfig {
    /// Fill values derived from other settings.
    pub fn resolve(mut self) -> Self {
        if self.logging.index.is_empty() {
            self.logging.index = default_index(&self.runtime_env);
        }
        self
    }
}

/// Listener configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ListenerConfig {
    /// Bind address (e.g., "0.0.0.0:3000").
    pub bind_address: String,
}

impl Default for ListenerConfig {
    fn default() -> Self {
        Self {
            bind_address: "0.0.0.0:3000".to_string(),
        }
    }
}

/// Which request bodies the APM agent records.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum CaptureBody {
    Off,
    Errors,
    Transactions,
    All,
}

impl CaptureBody {
    /// Whether request bodies are attached to captured errors.
    pub fn for_errors(self) -> bool {
        matches!(self, CaptureBody::Errors | CaptureBody::All)
    }
}

/// APM agent configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ApmConfig {
    /// Service name reported with every transaction.
    pub service_name: String,

    /// Monitoring backend URL.
    pub server_url: String,

    /// Deployment environment tag.
    pub environment: String,

    /// Request body capture mode.
    pub capture_body: CaptureBody,

    /// Attach request headers to captured errors.
    pub capture_headers: bool,

    /// Report crashes surfaced by the request supervisor.
    pub capture_exceptions: bool,

    /// Optional secret token for the monitoring backend.
    pub secret_token: Option<String>,

    /// Probability in [0, 1] that a transaction is recorded.
    pub transaction_sample_rate: f64,
}

impl Default for ApmConfig {
    fn default() -> Self {
        Self {
            service_name: "app-server".to_string(),
            server_url: "http://localhost:8200".to_string(),
            environment: "development".to_string(),
            capture_body: CaptureBody::All,
            capture_headers: true,
            capture_exceptions: true,
            secret_token: None,
            transaction_sample_rate: 1.0,
        }
    }
}

/// Logger configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Minimum level for the console sink (trace, debug, info, warn, error).
    pub console_level: String,

    /// Ship log entries to the remote indexed store.
    pub remote_enabled: bool,

    /// Remote log store address.
    pub remote_url: String,

    /// Index the remote entries are written to. Empty derives
    /// `monitoring_<runtime_env>`.
    pub index: String,

    /// Buffered bytes that trigger a bulk flush.
    pub flush_bytes: usize,

    /// Upper bound on how long entries sit in the buffer.
    pub flush_interval_ms: u64,

    /// Entries queued between callers and the sink task.
    pub channel_capacity: usize,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            console_level: "info".to_string(),
            remote_enabled: true,
            remote_url: "http://localhost:9200".to_string(),
            index: String::new(),
            flush_bytes: 1000,
            flush_interval_ms: 5000,
            channel_capacity: 1024,
        }
    }
}

/// Index name derived from the runtime environment name.
pub fn default_index(runtime_env: &str) -> String {
    format!("monitoring_{}", runtime_env)
}

/// External API configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct UpstreamConfig {
    /// Users endpoint proxied by `/users`.
    pub users_url: String,
}

impl Default for UpstreamConfig {
    fn default() -> Self {
        Self {
            users_url: "https://reqres.in/api/users?page=1".to_string(),
        }
    }
}

/// Injected latency bounds in milliseconds, half-open `[min_ms, max_ms)`.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct DelayConfig {
    pub min_ms: u64,
    pub max_ms: u64,
}

impl Default for DelayConfig {
    fn default() -> Self {
        Self {
            min_ms: 100,
            max_ms: 600,
        }
    }
}

/// Implementation mounted on the users routes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Serialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum UsersVariant {
    /// Manual APM transaction and span around the upstream call.
    #[default]
    Tracked,
    /// Stage-by-stage logging, no transaction tracking.
    Logged,
}

impl std::str::FromStr for UsersVariant {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "tracked" => Ok(UsersVariant::Tracked),
            "logged" => Ok(UsersVariant::Logged),
            other => Err(format!("unknown users variant '{}'", other)),
        }
    }
}

#[derive(Debug, Clone, Deserialize, Serialize, Default)]
#[serde(default)]
pub struct RoutesConfig {
    pub users_variant: UsersVariant,
}

/// Observability configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ObservabilityConfig {
    /// Enable Prometheus metrics endpoint.
    pub metrics_enabled: bool,

    /// Metrics endpoint bind address.
    pub metrics_address: String,
}

impl Default for ObservabilityConfig {
    fn default() -> Self {
        Self {
            metrics_enabled: false,
            metrics_address: "0.0.0.0:9090".to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_match_demo_setup() {
        let config = AppConfig::default().resolve();
        assert_eq!(config.listener.bind_address, "0.0.0.0:3000");
        assert_eq!(config.apm.service_name, "app-server");
        assert_eq!(config.apm.transaction_sample_rate, 1.0);
        assert_eq!(config.logging.index, "monitoring_development");
        assert_eq!(config.logging.flush_bytes, 1000);
        assert_eq!(config.delay.min_ms, 100);
        assert_eq!(config.delay.max_ms, 600);
        assert_eq!(config.routes.users_variant, UsersVariant::Tracked);
    }

    #[test]
    fn test_partial_toml() {
        let config: AppConfig = toml::from_str(
            r#"
            [routes]
            users_variant = "logged"

            [apm]
            capture_body = "errors"
            "#,
        )
        .unwrap();
        assert_eq!(config.routes.users_variant, UsersVariant::Logged);
        assert_eq!(config.runtime_env, "development");
        assert_eq!(config.apm.capture_body, CaptureBody::Errors);
        assert_eq!(config.apm.service_name, "app-server");
    }

    #[test]
    fn test_explicit_index_survives_resolve() {
        let mut config = AppConfig::default();
        config.runtime_env = "staging".into();
        assert_eq!(config.clone().resolve().logging.index, "monitoring_staging");

        config.logging.index = "custom".into();
        assert_eq!(config.resolve().logging.index, "custom");
    }

    #[test]
    fn test_variant_from_str() {
        assert_eq!("Logged".parse::<UsersVariant>(), Ok(UsersVariant::Logged));
        assert!("both".parse::<UsersVariant>().is_err());
    }
}
