//! Configuration validation.
//!
//! # Responsibilities
//! - Semantic validation (serde handles syntactic)
//! - Validate value ranges (sample rate, delay bounds, flush threshold)
//! - Check that addresses and URLs parse
//!
//! # Design Decisions
//! - Returns all validation errors, not just first
//! - Validation is pure function: AppConfig → Result<(), Vec<ValidationError>>
//! - Runs before config is accepted into the system

use std::net::SocketAddr;
use thiserror::Error;

use crate::config::schema::AppConfig;

/// A single semantic problem in the configuration.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum ValidationError {
    #[error("invalid bind address '{0}'")]
    BindAddress(String),

    #[error("{field}: invalid URL '{value}'")]
    Url { field: &'static str, value: String },

    #[error("transaction_sample_rate {0} is outside [0, 1]")]
    SampleRate(f64),

    #[error("delay min_ms {min} exceeds max_ms {max}")]
    DelayBounds { min: u64, max: u64 },

    #[error("{0} must be greater than zero")]
    Zero(&'static str),

    #[error("unknown console log level '{0}'")]
    LogLevel(String),
}

/// Validate a loaded configuration.
pub fn validate_config(config: &AppConfig) -> Result<(), Vec<ValidationError>> {
    let mut errors = Vec::new();

    if config.listener.bind_address.parse::<SocketAddr>().is_err() {
        errors.push(ValidationError::BindAddress(config.listener.bind_address.clone()));
    }

    check_url(&mut errors, "apm.server_url", &config.apm.server_url);
    check_url(&mut errors, "upstream.users_url", &config.upstream.users_url);
    if config.logging.remote_enabled {
        check_url(&mut errors, "logging.remote_url", &config.logging.remote_url);
    }

    let rate = config.apm.transaction_sample_rate;
    if !(0.0..=1.0).contains(&rate) {
        errors.push(ValidationError::SampleRate(rate));
    }

    if config.delay.min_ms > config.delay.max_ms {
        errors.push(ValidationError::DelayBounds {
            min: config.delay.min_ms,
            max: config.delay.max_ms,
        });
    }

    if config.logging.flush_bytes == 0 {
        errors.push(ValidationError::Zero("logging.flush_bytes"));
    }
    if config.logging.flush_interval_ms == 0 {
        errors.push(ValidationError::Zero("logging.flush_interval_ms"));
    }
    if config.logging.channel_capacity == 0 {
        errors.push(ValidationError::Zero("logging.channel_capacity"));
    }
    if config.logging.console_level.parse::<tracing::Level>().is_err() {
        errors.push(ValidationError::LogLevel(config.logging.console_level.clone()));
    }

    if config.observability.metrics_enabled
        && config.observability.metrics_address.parse::<SocketAddr>().is_err()
    {
        errors.push(ValidationError::BindAddress(config.observability.metrics_address.clone()));
    }

    if errors.is_empty() {
        Ok(())
    } else {
        Err(errors)
    }
}

fn check_url(errors: &mut Vec<ValidationError>, field: &'static str, value: &str) {
    if url::Url::parse(value).is_err() {
        errors.push(ValidationError::Url {
            field,
            value: value.to_string(),
        });
    }
}
