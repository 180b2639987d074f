//! Route handlers.
//!
//! Every handler runs after the delay middleware; none of them fails the
//! request except `/error`, which returns a crash signal on purpose.

use axum::{extract::State, Json};
use serde_json::Value;

use crate::http::response::{AppError, StatusMessage, ROOT_MESSAGE};
use crate::http::server::AppState;
use crate::observability::{ErrorContext, Outcome};
use crate::upstream::{UpstreamError, UpstreamResult, UsersClient};

pub const USERS_TRANSACTION: &str = "GET /users";
pub const USERS_SPAN: &str = "Fetching user data";

/// `GET /`
pub async fn root() -> Json<StatusMessage> {
    Json(StatusMessage::success(ROOT_MESSAGE))
}

/// `GET /users` with a manual transaction and span around the upstream call.
pub async fn users_tracked(State(state): State<AppState>) -> Json<Value> {
    let mut transaction = state.apm.start_transaction(USERS_TRANSACTION, "custom");

    let sent = {
        let span = transaction.start_span(USERS_SPAN, "external", "http");
        let sent = state.users.send().await;
        span.end();
        sent
    };
    let result = sent.and_then(|body| UsersClient::parse(&body));

    let body = match result {
        Ok(users) => {
            transaction.set_outcome(Outcome::Success);
            users
        }
        Err(err) => {
            transaction.set_outcome(Outcome::Failure);
            state
                .apm
                .capture_error(&err, ErrorContext::for_transaction(&transaction));
            StatusMessage::error(&err.to_string()).into_value()
        }
    };

    transaction.end();
    Json(body)
}

/// `GET /users` with stage-by-stage logging and no transaction tracking.
pub async fn users_logged(State(state): State<AppState>) -> Json<Value> {
    state.logger.info("Making api call to users.");

    match fetch_logged(&state).await {
        Ok(users) => Json(users),
        Err(err) => {
            state.logger.error_with(&err, err.stage());
            Json(StatusMessage::error(public_message(&err)).into_value())
        }
    }
}

async fn fetch_logged(state: &AppState) -> UpstreamResult<Value> {
    let body = state.users.send().await?;
    state.logger.info("received users data from api");
    UsersClient::parse(&body)
}

/// Message returned to clients by the logged variant, one per failure kind.
pub fn public_message(err: &UpstreamError) -> &'static str {
    match err {
        UpstreamError::Request(_) => "some_internal_error",
        UpstreamError::Parse(_) => "json_parsing_failed",
    }
}

/// `GET /error`
pub async fn simulate_error(State(state): State<AppState>) -> Result<Json<Value>, AppError> {
    state.logger.error("simulating error on /error");
    Err(AppError::crash("Simulated error for APM"))
}
