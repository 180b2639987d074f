//! APM demo service library.
//!
//! A small HTTP service whose only job is to produce telemetry: simulated
//! latency on every request, a traced call to an external API, and a
//! deliberate crash route.

pub mod config;
pub mod http;
pub mod lifecycle;
pub mod observability;
pub mod upstream;

pub use config::AppConfig;
pub use http::HttpServer;
pub use lifecycle::Shutdown;
pub use observability::{ApmClient, Logger};
