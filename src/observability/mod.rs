//! Observability subsystem.
//!
//! # Data Flow
//! ```text
//! Handlers and middleware produce:
//!     → logging.rs (leveled log calls with stage tags)
//!     → apm.rs (transactions, spans, captured errors)
//!     → metrics.rs (counters, histograms)
//!
//! Sinks:
//!     → console (colorized fmt layer)
//!     → remote.rs (bulk-indexed log store, batched)
//!     → Prometheus scrape endpoint (optional)
//! ```
//!
//! # Design Decisions
//! - APM records are emitted as tracing events, so they reach both log sinks
//! - Request ID flows through the request span
//! - Metrics are cheap (atomic increments)

pub mod apm;
pub mod logging;
pub mod metrics;
pub mod remote;

pub use apm::{ApmClient, ErrorContext, Outcome, Reporter};
pub use logging::{Logger, LoggingError};
