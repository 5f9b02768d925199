//! Shared gazeguard library exports that keep the binary and tests aligned.

pub mod bridge;
pub mod config;
pub mod eventlog;
pub mod gaze;
pub mod protocol;
pub mod runtime;
pub mod sink;
pub mod source;
pub mod speech;
mod telemetry;
pub mod tracker;

pub use telemetry::init_tracing;
