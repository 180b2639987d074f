//! HTTP protocol handling subsystem.
//!
//! # Data Flow
//! ```text
//! TCP connection
//!     → server.rs (Axum setup, request ID, trace span)
//!     → middleware/supervisor.rs (counts responses, reports crashes)
//!     → middleware/delay.rs (simulated latency)
//!     → handlers.rs (route logic, outbound call, APM transaction)
//!     → response.rs (JSON payloads, crash → 500)
//!     → Send to client
//! ```

pub mod handlers;
pub mod middleware;
pub mod response;
pub mod server;

pub use response::{AppError, CrashReport, StatusMessage};
pub use server::{AppState, HttpServer};
