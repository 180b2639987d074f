//! Latency injection.
//! Holds every request for a random duration before it reaches its handler.

use axum::{
    extract::{Request, State},
    middleware::Next,
    response::Response,
};
use rand::Rng;
use std::time::Duration;

use crate::config::DelayConfig;
use crate::http::server::AppState;
use crate::observability::metrics;

/// Uniform in `[min_ms, max_ms)`; equal bounds give a fixed delay.
pub fn sample_delay(config: &DelayConfig) -> Duration {
    let ms = if config.max_ms > config.min_ms {
        rand::thread_rng().gen_range(config.min_ms..config.max_ms)
    } else {
        config.min_ms
    };
    Duration::from_millis(ms)
}

pub async fn inject_delay(State(state): State<AppState>, req: Request, next: Next) -> Response {
    state.logger.warn("simulating some delay on every request...");

    let delay = sample_delay(&state.delay);
    metrics::record_delay(delay);
    tokio::time::sleep(delay).await;

    next.run(req).await
}
