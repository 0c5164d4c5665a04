//! IO modules - external system interfaces
//!
//! This module contains all external IO operations:
//! - `upstream` - HTTP client for the telemetry feed
//! - `blackbox` - full-state JSON snapshot written on shutdown
//! - `prometheus` - Prometheus metrics HTTP endpoint

pub mod blackbox;
pub mod prometheus;
pub mod upstream;

// Re-export commonly used types
pub use blackbox::Blackbox;
pub use upstream::{HttpTelemetrySource, TelemetrySource};
