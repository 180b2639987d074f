//! Configuration loading from disk and the process environment.

use std::collections::HashMap;
use std::fs;
use std::path::Path;
use thiserror::Error;

use crate::config::schema::AppConfig;
use crate::config::validation::{validate_config, ValidationError};

/// Error type for configuration loading.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Parse error: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("Env file error: {0}")]
    EnvFile(#[from] dotenvy::Error),

    #[error("Invalid value for {key}: {reason}")]
    Env { key: &'static str, reason: String },

    #[error("Validation failed: {}", join(.0))]
    Validation(Vec<ValidationError>),
}

fn join(errors: &[ValidationError]) -> String {
    errors
        .iter()
        .map(|e| e.to_string())
        .collect::<Vec<_>>()
        .join(", ")
}

/// Environment keys recognized by [`apply_env`].
pub mod keys {
    pub const APM_SERVER_HOST: &str = "APM_SERVER_HOST";
    pub const APM_SECRET_TOKEN: &str = "APM_SECRET_TOKEN";
    pub const APM_ENVIRONMENT: &str = "APM_ENVIRONMENT";
    pub const ELASTICSEARCH_HOSTS: &str = "ELASTICSEARCH_HOSTS";
    pub const ELASTICSEARCH_INDEX: &str = "ELASTICSEARCH_INDEX";
    pub const APP_ENV: &str = "APP_ENV";
    pub const APP_PORT: &str = "APP_PORT";
    pub const USERS_VARIANT: &str = "USERS_VARIANT";
}

/// Parse a TOML file into a configuration without validating it.
pub fn read_config(path: &Path) -> Result<AppConfig, ConfigError> {
    let content = fs::read_to_string(path)?;
    Ok(toml::from_str(&content)?)
}

/// Load and validate configuration from a TOML file.
pub fn load_config(path: &Path) -> Result<AppConfig, ConfigError> {
    let config = read_config(path)?.resolve();
    validate_config(&config).map_err(ConfigError::Validation)?;
    Ok(config)
}

/// Overlay recognized environment variables on top of `config`.
///
/// `lookup` abstracts `std::env::var` so tests can feed a fixed map. Empty
/// values count as unset.
pub fn apply_env<F>(mut config: AppConfig, lookup: F) -> Result<AppConfig, ConfigError>
where
    F: Fn(&str) -> Option<String>,
{
    let get = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());

    if let Some(url) = get(keys::APM_SERVER_HOST) {
        config.apm.server_url = url;
    }
    if let Some(token) = get(keys::APM_SECRET_TOKEN) {
        config.apm.secret_token = Some(token);
    }
    if let Some(env) = get(keys::APM_ENVIRONMENT) {
        config.apm.environment = env;
    }
    if let Some(hosts) = get(keys::ELASTICSEARCH_HOSTS) {
        config.logging.remote_url = hosts;
    }
    if let Some(index) = get(keys::ELASTICSEARCH_INDEX) {
        config.logging.index = index;
    }
    if let Some(env) = get(keys::APP_ENV) {
        config.runtime_env = env;
    }
    if let Some(port) = get(keys::APP_PORT) {
        let port: u16 = port.parse().map_err(|e: std::num::ParseIntError| ConfigError::Env {
            key: keys::APP_PORT,
            reason: e.to_string(),
        })?;
        config.listener.bind_address = with_port(&config.listener.bind_address, port);
    }
    if let Some(variant) = get(keys::USERS_VARIANT) {
        config.routes.users_variant = variant.parse().map_err(|reason| ConfigError::Env {
            key: keys::USERS_VARIANT,
            reason,
        })?;
    }

    Ok(config)
}

/// Replace the port of a `host:port` bind address.
pub fn with_port(bind_address: &str, port: u16) -> String {
    let host = bind_address
        .rsplit_once(':')
        .map(|(host, _)| host)
        .unwrap_or("0.0.0.0");
    format!("{}:{}", host, port)
}

/// Default dotenv file, relative to the working directory.
pub const DEFAULT_ENV_FILE: &str = ".env";

/// Read `KEY=value` pairs from a dotenv file. A missing file yields nothing.
pub fn read_env_file(path: &Path) -> Result<HashMap<String, String>, ConfigError> {
    match dotenvy::from_path_iter(path) {
        Ok(iter) => Ok(iter.collect::<Result<HashMap<_, _>, _>>()?),
        Err(e) if e.not_found() => Ok(HashMap::new()),
        Err(e) => Err(e.into()),
    }
}

/// Build the effective configuration: optional file, then environment, then
/// derived values, then validation.
///
/// Variables from `env_file` fill in only what the process environment
/// leaves unset.
pub fn load_from(path: Option<&Path>, env_file: &Path) -> Result<AppConfig, ConfigError> {
    let base = match path {
        Some(path) => read_config(path)?,
        None => AppConfig::default(),
    };
    let file_vars = read_env_file(env_file)?;
    let lookup = |key: &str| std::env::var(key).ok().or_else(|| file_vars.get(key).cloned());
    let config = apply_env(base, lookup)?.resolve();
    validate_config(&config).map_err(ConfigError::Validation)?;
    Ok(config)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::schema::UsersVariant;
    use std::collections::HashMap;

    fn lookup(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key| map.get(key).cloned()
    }

    #[test]
    fn test_env_overlay() {
        let config = apply_env(
            AppConfig::default(),
            lookup(&[
                ("APM_SERVER_HOST", "http://apm:8200"),
                ("APM_SECRET_TOKEN", "s3cret"),
                ("ELASTICSEARCH_HOSTS", "http://es:9200"),
                ("APP_ENV", "production"),
                ("APP_PORT", "4000"),
                ("USERS_VARIANT", "logged"),
            ]),
        )
        .unwrap()
        .resolve();

        assert_eq!(config.apm.server_url, "http://apm:8200");
        assert_eq!(config.apm.secret_token.as_deref(), Some("s3cret"));
        assert_eq!(config.logging.remote_url, "http://es:9200");
        assert_eq!(config.logging.index, "monitoring_production");
        assert_eq!(config.listener.bind_address, "0.0.0.0:4000");
        assert_eq!(config.routes.users_variant, UsersVariant::Logged);
    }

    #[test]
    fn test_missing_env_keeps_defaults() {
        let config = apply_env(AppConfig::default(), lookup(&[("APM_SECRET_TOKEN", "  ")]))
            .unwrap()
            .resolve();
        assert_eq!(config.logging.remote_url, "http://localhost:9200");
        assert!(config.apm.secret_token.is_none());
    }

    #[test]
    fn test_bad_port_rejected() {
        let err = apply_env(AppConfig::default(), lookup(&[("APP_PORT", "http")])).unwrap_err();
        assert!(err.to_string().contains("APP_PORT"));
    }

    #[test]
    fn test_with_port() {
        assert_eq!(with_port("127.0.0.1:3000", 8080), "127.0.0.1:8080");
        assert_eq!(with_port("garbage", 8080), "0.0.0.0:8080");
    }

    fn write_env_file(name: &str, content: &str) -> std::path::PathBuf {
        let path = std::env::temp_dir().join(format!("apm-demo-{}-{}.env", name, std::process::id()));
        fs::write(&path, content).unwrap();
        path
    }

    #[test]
    fn test_env_file_values_picked_up() {
        let path = write_env_file(
            "load",
            "# local overrides\nAPM_DEMO_UNUSED=1\nELASTICSEARCH_INDEX=monitoring_from_file\n",
        );

        let vars = read_env_file(&path).unwrap();
        assert_eq!(vars.get("APM_DEMO_UNUSED").map(String::as_str), Some("1"));

        let config = load_from(None, &path).unwrap();
        fs::remove_file(&path).unwrap();
        assert_eq!(config.logging.index, "monitoring_from_file");
    }

    #[test]
    fn test_missing_env_file_is_empty() {
        let vars = read_env_file(Path::new("/nonexistent/.env")).unwrap();
        assert!(vars.is_empty());
    }

    #[test]
    fn test_malformed_env_file_rejected() {
        let path = write_env_file("bad", "NOT VALID LINE\n");
        let err = read_env_file(&path).unwrap_err();
        fs::remove_file(&path).unwrap();
        assert!(matches!(err, ConfigError::EnvFile(_)));
    }

    #[test]
    fn test_load_missing_file() {
        let err = load_config(Path::new("/nonexistent/apm-demo.toml")).unwrap_err();
        assert!(matches!(err, ConfigError::Io(_)));
    }
}
