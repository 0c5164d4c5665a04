//! Firewatch: telemetry normalization and alert derivation for
//! firefighter safety monitoring.

pub mod domain;
pub mod infra;
pub mod io;
pub mod services;
