//! Outbound calls to the external users API.

pub mod client;

pub use client::{UpstreamError, UpstreamResult, UsersClient};
