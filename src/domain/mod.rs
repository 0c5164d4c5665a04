//! Domain models - core business types and geometry
//!
//! This module contains the canonical data types used throughout the system:
//! - `Firefighter` / `Beacon` - tracked entities with stable internal ids
//! - `Position` / `Vitals` - append-only time series per firefighter
//! - `Alert` / `AlertType` / `Severity` - the alert taxonomy
//! - planar geometry helpers for stationarity and proximity checks

pub mod geo;
pub mod types;

// Re-export commonly used types at module level
pub use types::{
    Alert, AlertId, AlertType, Beacon, BeaconId, Firefighter, FirefighterId, Position, Severity,
    Vitals,
};
