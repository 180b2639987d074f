//! Request middleware.

pub mod delay;
pub mod supervisor;

pub use delay::inject_delay;
pub use supervisor::supervise;
