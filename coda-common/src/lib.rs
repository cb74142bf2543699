//! # Coda Common Library
//!
//! Shared code for the coda calibration services including:
//! - Domain model (frequency bands, events, stations, parameter sets)
//! - Measurement records exchanged between pipeline stages
//! - Running statistics and geodesy helpers
//! - Lifecycle event types (CalibrationEvent enum) and the EventBus
//! - Configuration loading and tracing initialisation

pub mod config;
pub mod error;
pub mod events;
pub mod logging;
pub mod model;
pub mod stats;

pub use error::{Error, Result};
pub use model::FrequencyBand;
