//! Runtime glue: configuration, the in-flight batch gate, submission progress,
//! and telemetry.

pub mod config;
pub mod guard;
pub mod progress;
pub mod telemetry;
