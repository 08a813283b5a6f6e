//! # Grindvakt Telemetry
//!
//! Crate for logging and metrics of the enforcement daemon.

pub mod logging;
pub mod metrics;

pub use logging::EventLogger;
pub use metrics::MetricsRecorder;
