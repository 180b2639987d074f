//! Configuration management subsystem.
//!
//! # Data Flow
//! ```text
//! config file (TOML, optional)
//!     → loader.rs (parse & deserialize)
//!     → loader.rs (environment overlay)
//!     → AppConfig::resolve (derived values)
//!     → validation.rs (semantic checks)
//!     → AppConfig (validated, immutable)
//!     → handed to logger, APM agent and server at startup
//! ```
//!
//! # Design Decisions
//! - Config is immutable once loaded; no runtime reconfiguration
//! - All fields have defaults to allow running with no file at all
//! - Validation separates syntactic (serde) from semantic checks

pub mod loader;
pub mod schema;
pub mod validation;

pub use loader::{load_config, load_from, ConfigError};
pub use schema::AppConfig;
pub use schema::ApmConfig;
pub use schema::CaptureBody;
pub use schema::DelayConfig;
pub use schema::ListenerConfig;
pub use schema::LoggingConfig;
pub use schema::ObservabilityConfig;
pub use schema::UpstreamConfig;
pub use schema::UsersVariant;
