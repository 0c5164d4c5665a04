//! Services - engine logic and state management
//!
//! This module contains the core engine services:
//! - `coerce` - lenient scalar coercion for upstream JSON
//! - `normalize` - tolerant payload extraction into canonical records
//! - `store` - in-memory entity store with per-entity commit units
//! - `movement` - stationarity and last-contact derivation
//! - `proximity` - nearest-beacon matching
//! - `alerts` - rule evaluation, dedup, and retention
//! - `status` - read-side status report composition
//! - `poller` - the fixed-cadence poll loop driving everything

pub mod alerts;
pub mod coerce;
pub mod movement;
pub mod normalize;
pub mod poller;
pub mod proximity;
pub mod status;
pub mod store;

// Re-export commonly used types
pub use alerts::AlertEngine;
pub use poller::{IdentityMap, Poller};
pub use store::TelemetryStore;
