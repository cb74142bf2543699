//! coda-calibration library interface
//!
//! Path and site calibration of coda amplitudes plus on-demand Mw
//! measurement. Exposes the service, its solvers and the persistence layer
//! for embedding and integration testing.

pub mod db;
pub mod error;
pub mod services;

pub use crate::error::{CalibrationError, CalibrationResult};
pub use crate::services::{CalibrationService, Collaborators, MwReport, MwSelection, PipelineSettings};
