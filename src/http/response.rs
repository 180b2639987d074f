//! Response bodies and the crash signal.
//!
//! # Responsibilities
//! - Shape the JSON payloads returned by the routes
//! - Convert a crash signal or a caught panic into a 500 response
//! - Carry a [`CrashReport`] to the request supervisor
//!
//! # Design Decisions
//! - Crashes never terminate the process; they become a generic failure
//!   response, and the report travels in the response extensions

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::any::Any;
use thiserror::Error;

pub const ROOT_MESSAGE: &str = "Hello from APM Test App!";
pub const INTERNAL_ERROR_MESSAGE: &str = "Internal Server Error";

/// `{ "message": ..., "status": ... }`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StatusMessage {
    pub message: String,
    pub status: String,
}

impl StatusMessage {
    pub fn success(message: &str) -> Self {
        Self {
            message: message.to_string(),
            status: "success".to_string(),
        }
    }

    pub fn error(message: &str) -> Self {
        Self {
            message: message.to_string(),
            status: "error".to_string(),
        }
    }

    pub fn into_value(self) -> Value {
        serde_json::json!({ "status": self.status, "message": self.message })
    }
}

/// Where a crash came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CrashSource {
    /// A handler returned [`AppError::Crash`].
    Handler,
    /// A handler panicked.
    Panic,
}

/// Unhandled failure handed from the response path to the supervisor.
#[derive(Debug, Clone, Error)]
#[error("{message}")]
pub struct CrashReport {
    pub message: String,
    pub origin: CrashSource,
}

/// Fatal handler result.
#[derive(Debug, Error)]
pub enum AppError {
    #[error("{0}")]
    Crash(String),
}

impl AppError {
    pub fn crash(message: impl Into<String>) -> Self {
        AppError::Crash(message.into())
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        match self {
            AppError::Crash(message) => crash_response(CrashReport {
                message,
                origin: CrashSource::Handler,
            }),
        }
    }
}

/// Generic 500 carrying the report for the supervisor.
pub fn crash_response(report: CrashReport) -> Response {
    let body = StatusMessage::error(INTERNAL_ERROR_MESSAGE);
    let mut response = (StatusCode::INTERNAL_SERVER_ERROR, Json(body)).into_response();
    response.extensions_mut().insert(report);
    response
}

/// Panic handler for `CatchPanicLayer`.
pub fn panic_response(panic: Box<dyn Any + Send + 'static>) -> Response {
    let message = if let Some(s) = panic.downcast_ref::<String>() {
        s.clone()
    } else if let Some(s) = panic.downcast_ref::<&str>() {
        s.to_string()
    } else {
        "handler panicked".to_string()
    };
    crash_response(CrashReport {
        message,
        origin: CrashSource::Panic,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_crash_becomes_500_with_report() {
        let response = AppError::crash("Simulated error for APM").into_response();
        assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);

        let report = response.extensions().get::<CrashReport>().unwrap();
        assert_eq!(report.message, "Simulated error for APM");
        assert_eq!(report.origin, CrashSource::Handler);
    }

    #[test]
    fn test_panic_payload_message() {
        let response = panic_response(Box::new("kaboom"));
        let report = response.extensions().get::<CrashReport>().unwrap();
        assert_eq!(report.message, "kaboom");
        assert_eq!(report.origin, CrashSource::Panic);

        let response = panic_response(Box::new(42u8));
        let report = response.extensions().get::<CrashReport>().unwrap();
        assert_eq!(report.message, "handler panicked");
    }

    #[test]
    fn test_error_shape() {
        let value = StatusMessage::error("json_parsing_failed").into_value();
        assert_eq!(value, serde_json::json!({"status": "error", "message": "json_parsing_failed"}));
    }
}
