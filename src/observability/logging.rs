//! Structured logging.
//!
//! # Responsibilities
//! - Build the logging pipeline once at startup
//! - Fan every event out to the console and the remote indexed store
//! - Provide leveled logging with an optional stage tag
//!
//! # Design Decisions
//! - Uses tracing crate for structured logging
//! - `Logger` is constructed explicitly and passed to the components that
//!   log; clones share one underlying dispatcher
//! - Remote delivery is fire-and-forget; an unreachable store never fails a
//!   log call

use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tokio::sync::{mpsc, oneshot};
use tracing::{Dispatch, Level};
use tracing_subscriber::filter::{LevelFilter, Targets};
use tracing_subscriber::{layer::SubscriberExt, EnvFilter, Layer};

use crate::config::LoggingConfig;
use crate::observability::remote::{RemoteLayer, RemoteSink, SinkMessage, SINK_TARGET};

/// Errors raised while building the logger.
#[derive(Debug, Error)]
pub enum LoggingError {
    #[error("invalid console level '{0}'")]
    Level(String),

    #[error("failed to build remote sink client: {0}")]
    Client(#[from] reqwest::Error),

    #[error("a global logger is already installed")]
    AlreadyInstalled,
}

struct LoggerInner {
    dispatch: Dispatch,
    sink: Option<mpsc::Sender<SinkMessage>>,
}

/// Shared handle to the process logger.
#[derive(Clone)]
pub struct Logger {
    inner: Arc<LoggerInner>,
}

impl Logger {
    /// Build the console and remote sinks.
    ///
    /// With the remote sink enabled this spawns the sink task, so it must be
    /// called from within a Tokio runtime.
    pub fn init(config: &LoggingConfig) -> Result<Self, LoggingError> {
        let level: Level = config
            .console_level
            .parse()
            .map_err(|_| LoggingError::Level(config.console_level.clone()))?;

        let console_filter =
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level.as_str()));
        let console = tracing_subscriber::fmt::layer()
            .with_ansi(true)
            .with_filter(console_filter);

        let (remote, sink) = if config.remote_enabled {
            let (tx, rx) = mpsc::channel(config.channel_capacity);
            let task = RemoteSink::new(
                &config.remote_url,
                config.flush_bytes,
                Duration::from_millis(config.flush_interval_ms),
                rx,
            )?;
            tokio::spawn(task.run());

            // Client libraries used by the sink are kept off the remote
            // store, otherwise every flush would log itself.
            let filter = Targets::new()
                .with_default(LevelFilter::from_level(level))
                .with_target(SINK_TARGET, LevelFilter::OFF)
                .with_target("hyper", LevelFilter::OFF)
                .with_target("hyper_util", LevelFilter::OFF)
                .with_target("reqwest", LevelFilter::OFF)
                .with_target("h2", LevelFilter::OFF);
            let layer = RemoteLayer::new(tx.clone(), &config.index).with_filter(filter);
            (Some(layer), Some(tx))
        } else {
            (None, None)
        };

        let subscriber = tracing_subscriber::registry().with(console).with(remote);

        Ok(Self {
            inner: Arc::new(LoggerInner {
                dispatch: Dispatch::new(subscriber),
                sink,
            }),
        })
    }

    /// Route framework and library events through this logger as well.
    pub fn install_global(&self) -> Result<(), LoggingError> {
        tracing::dispatcher::set_global_default(self.inner.dispatch.clone())
            .map_err(|_| LoggingError::AlreadyInstalled)
    }

    /// True when both handles refer to the same underlying logger.
    pub fn ptr_eq(&self, other: &Logger) -> bool {
        Arc::ptr_eq(&self.inner, &other.inner)
    }

    pub fn log(&self, level: Level, message: &str, tag: Option<&str>) {
        tracing::dispatcher::with_default(&self.inner.dispatch, || match level {
            Level::ERROR => tracing::error!(tag, "{}", message),
            Level::WARN => tracing::warn!(tag, "{}", message),
            Level::INFO => tracing::info!(tag, "{}", message),
            Level::DEBUG => tracing::debug!(tag, "{}", message),
            _ => tracing::trace!(tag, "{}", message),
        });
    }

    pub fn info(&self, message: &str) {
        self.log(Level::INFO, message, None);
    }

    pub fn warn(&self, message: &str) {
        self.log(Level::WARN, message, None);
    }

    pub fn error(&self, message: &str) {
        self.log(Level::ERROR, message, None);
    }

    /// Log an error under a tag naming the stage that failed.
    pub fn error_with(&self, err: &(dyn std::error::Error + 'static), tag: &str) {
        tracing::dispatcher::with_default(&self.inner.dispatch, || {
            tracing::error!(tag, error = err, "{}", tag);
        });
    }

    /// Push buffered entries to the remote store and wait for the attempt.
    pub async fn flush(&self) {
        let Some(sink) = &self.inner.sink else {
            return;
        };
        let (ack, done) = oneshot::channel();
        if sink.send(SinkMessage::Flush(ack)).await.is_ok() {
            let _ = tokio::time::timeout(Duration::from_secs(15), done).await;
        }
    }
}

impl std::fmt::Debug for Logger {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Logger")
            .field("remote", &self.inner.sink.is_some())
            .finish()
    }
}
