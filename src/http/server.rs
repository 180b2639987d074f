//! HTTP server setup and configuration.
//!
//! # Responsibilities
//! - Create Axum Router with all handlers
//! - Mount the configured `/users` variant
//! - Wire up middleware (request ID, tracing, supervisor, delay, panic guard)
//! - Bind server to listener and drain on shutdown

use axum::{
    body::Body,
    http::Request,
    middleware,
    routing::{get, MethodRouter},
    Router,
};
use std::sync::Arc;
use tokio::net::TcpListener;
use tokio::sync::broadcast;
use tower_http::{
    catch_panic::CatchPanicLayer,
    request_id::{MakeRequestUuid, PropagateRequestIdLayer, SetRequestIdLayer},
    trace::TraceLayer,
};

use crate::config::{AppConfig, DelayConfig, UsersVariant};
use crate::http::handlers;
use crate::http::middleware::{inject_delay, supervise};
use crate::http::response::panic_response;
use crate::observability::{ApmClient, Logger};
use crate::upstream::UsersClient;

/// Application state injected into handlers.
#[derive(Clone)]
pub struct AppState {
    pub logger: Logger,
    pub apm: Arc<ApmClient>,
    pub users: UsersClient,
    pub delay: DelayConfig,
}

impl AppState {
    pub fn new(
        config: &AppConfig,
        logger: Logger,
        apm: Arc<ApmClient>,
    ) -> Result<Self, url::ParseError> {
        Ok(Self {
            logger,
            apm,
            users: UsersClient::new(&config.upstream)?,
            delay: config.delay.clone(),
        })
    }
}

/// HTTP server for the demo service.
pub struct HttpServer {
    router: Router,
    config: AppConfig,
}

impl HttpServer {
    /// Create a new HTTP server with the given configuration.
    pub fn new(
        config: AppConfig,
        logger: Logger,
        apm: Arc<ApmClient>,
    ) -> Result<Self, url::ParseError> {
        let state = AppState::new(&config, logger, apm)?;
        let router = Self::build_router(&config, state);
        Ok(Self { router, config })
    }

    /// Build the Axum router with all middleware layers.
    pub fn build_router(config: &AppConfig, state: AppState) -> Router {
        let users: MethodRouter<AppState> = match config.routes.users_variant {
            UsersVariant::Tracked => get(handlers::users_tracked),
            UsersVariant::Logged => get(handlers::users_logged),
        };

        let routes = Router::new()
            .route("/", get(handlers::root))
            .route("/users", users.clone())
            .route("/users-list", users)
            .route("/error", get(handlers::simulate_error));
        Self::with_layers(routes, state)
    }

    /// Wrap `routes` in the request pipeline.
    ///
    /// Innermost first: panic guard, delay, supervisor; then request ID and
    /// tracing around the whole router.
    fn with_layers(routes: Router<AppState>, state: AppState) -> Router {
        routes
            .layer(CatchPanicLayer::custom(panic_response))
            .layer(middleware::from_fn_with_state(state.clone(), inject_delay))
            .layer(middleware::from_fn_with_state(state.clone(), supervise))
            .with_state(state)
            .layer(PropagateRequestIdLayer::x_request_id())
            .layer(TraceLayer::new_for_http().make_span_with(|req: &Request<Body>| {
                let request_id = req
                    .headers()
                    .get("x-request-id")
                    .and_then(|v| v.to_str().ok())
                    .unwrap_or("unknown");
                tracing::info_span!(
                    "request",
                    method = %req.method(),
                    uri = %req.uri(),
                    request_id = %request_id,
                )
            }))
            .layer(SetRequestIdLayer::x_request_id(MakeRequestUuid))
    }

    /// Run the server until the shutdown signal fires, then drain.
    pub async fn run(
        self,
        listener: TcpListener,
        mut shutdown: broadcast::Receiver<()>,
    ) -> Result<(), std::io::Error> {
        let addr = listener.local_addr()?;
        tracing::debug!(
            address = %addr,
            users_variant = ?self.config.routes.users_variant,
            "HTTP server starting"
        );

        axum::serve(listener, self.router)
            .with_graceful_shutdown(async move {
                let _ = shutdown.recv().await;
                tracing::info!("Shutdown signal received");
            })
            .await?;

        tracing::info!("HTTP server stopped");
        Ok(())
    }
}
