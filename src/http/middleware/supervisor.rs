//! Request supervisor.
//! Counts responses and forwards crashes to the APM client.

use axum::{
    body::Body,
    extract::{MatchedPath, Request, State},
    http::header::CONTENT_LENGTH,
    middleware::Next,
    response::Response,
};

use crate::http::response::CrashReport;
use crate::http::server::AppState;
use crate::observability::{metrics, ErrorContext};

/// Largest request body kept for error reports.
pub const MAX_CAPTURED_BODY: usize = 16 * 1024;

pub async fn supervise(State(state): State<AppState>, req: Request, next: Next) -> Response {
    let method = req.method().to_string();
    let path = req.uri().path().to_string();
    let route = req
        .extensions()
        .get::<MatchedPath>()
        .map(|p| p.as_str().to_string())
        .unwrap_or_else(|| "unmatched".to_string());
    let headers: Vec<(String, String)> = if state.apm.config().capture_headers {
        req.headers()
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_str().unwrap_or("<binary>").to_string()))
            .collect()
    } else {
        Vec::new()
    };

    let (req, body) = if state.apm.config().capture_body.for_errors() {
        buffer_body(req).await
    } else {
        (req, None)
    };

    let mut response = next.run(req).await;
    metrics::record_request(&route, response.status().as_u16());

    if let Some(report) = response.extensions_mut().remove::<CrashReport>() {
        tracing::error!(
            method = %method,
            path = %path,
            origin = ?report.origin,
            error = %report,
            "Unhandled error in request handler"
        );
        state.apm.capture_error(
            &report,
            ErrorContext {
                method: Some(method),
                path: Some(path),
                headers,
                body,
                crash: true,
                ..ErrorContext::default()
            },
        );
    }

    response
}

/// Read a small body with a declared length and put it back on the request.
/// Anything else passes through untouched.
async fn buffer_body(req: Request) -> (Request, Option<String>) {
    let declared = req
        .headers()
        .get(CONTENT_LENGTH)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.parse::<usize>().ok());
    if !matches!(declared, Some(len) if len > 0 && len <= MAX_CAPTURED_BODY) {
        return (req, None);
    }

    let (parts, body) = req.into_parts();
    match axum::body::to_bytes(body, MAX_CAPTURED_BODY).await {
        Ok(bytes) => {
            let text = String::from_utf8_lossy(&bytes).into_owned();
            (Request::from_parts(parts, Body::from(bytes)), Some(text))
        }
        Err(e) => {
            tracing::debug!(error = %e, "Request body could not be buffered");
            (Request::from_parts(parts, Body::empty()), None)
        }
    }
}
