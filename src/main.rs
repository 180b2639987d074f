//! APM demo service.
//!
//! # Architecture Overview
//!
//! ```text
//!   Client Request
//!   ──────────────▶ request id ─▶ trace span ─▶ supervisor ─▶ delay ─▶ handler
//!                                                   │                     │
//!                                                   │ crash report        │ transaction / span
//!                                                   ▼                     ▼
//!                                              ┌──────────────────────────────┐
//!                                              │          APM client          │
//!                                              └──────────────┬───────────────┘
//!                                                             │ tracing events
//!                                                             ▼
//!                                      ┌─────────────────────────────────────────┐
//!                                      │ Logger: console  +  remote bulk sink    │
//!                                      └─────────────────────────────────────────┘
//! ```

use clap::Parser;
use std::path::PathBuf;
use std::sync::Arc;
use tokio::net::TcpListener;

use apm_demo::config::{self, loader::with_port};
use apm_demo::http::HttpServer;
use apm_demo::lifecycle::{signals, Shutdown};
use apm_demo::observability::{metrics, ApmClient, Logger};

#[derive(Parser)]
#[command(name = "apm-demo")]
#[command(about = "HTTP service that produces APM and log telemetry", long_about = None)]
struct Cli {
    /// TOML configuration file; environment variables override it.
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Dotenv file consulted for variables the environment does not set.
    #[arg(long, default_value = config::loader::DEFAULT_ENV_FILE)]
    env_file: PathBuf,

    /// Listen port, overriding the configured bind address.
    #[arg(short, long)]
    port: Option<u16>,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();

    let mut config = config::load_from(cli.config.as_deref(), &cli.env_file)?;
    if let Some(port) = cli.port {
        config.listener.bind_address = with_port(&config.listener.bind_address, port);
    }

    // One logger for the whole process, shared with every component.
    let logger = Logger::init(&config.logging)?;
    logger.install_global()?;

    tracing::debug!(
        runtime_env = %config.runtime_env,
        bind_address = %config.listener.bind_address,
        index = %config.logging.index,
        users_variant = ?config.routes.users_variant,
        "Configuration loaded"
    );

    // The APM agent starts before the server is built.
    let apm = Arc::new(ApmClient::start(config.apm.clone()));

    if config.observability.metrics_enabled {
        if let Ok(addr) = config.observability.metrics_address.parse() {
            metrics::init_metrics(addr);
        } else {
            tracing::error!(
                metrics_address = %config.observability.metrics_address,
                "Failed to parse metrics address"
            );
        }
    }

    let listener = TcpListener::bind(&config.listener.bind_address).await?;
    let port = listener.local_addr()?.port();

    let shutdown = Shutdown::new();
    let server = HttpServer::new(config, logger.clone(), apm)?;
    let server_shutdown = shutdown.subscribe();
    let server_task = tokio::spawn(server.run(listener, server_shutdown));

    logger.info(&format!("Server is running on port {}", port));

    signals::wait_for_shutdown().await;
    shutdown.trigger();
    server_task.await??;

    logger.flush().await;
    Ok(())
}
