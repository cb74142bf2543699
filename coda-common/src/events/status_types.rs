//! Job identity and status type definitions
//!
//! Supporting types for calibration and measurement lifecycle events.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Identifier of a calibration or measurement job
///
/// Allocated monotonically by the job registry; never reused within a process.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct JobId(pub u64);

impl fmt::Display for JobId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Calibration pipeline status
///
/// Progresses Starting → PeakStarting → ShapeStarting → PathStarting →
/// SiteStarting → Complete, or ends in Error from any stage.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum CalibrationStatus {
    Starting,
    PeakStarting,
    ShapeStarting,
    PathStarting,
    SiteStarting,
    Complete,
    Error,
}

impl CalibrationStatus {
    /// No further events follow this status
    pub fn is_terminal(&self) -> bool {
        matches!(self, CalibrationStatus::Complete | CalibrationStatus::Error)
    }
}

impl fmt::Display for CalibrationStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            CalibrationStatus::Starting => "STARTING",
            CalibrationStatus::PeakStarting => "PEAK_STARTING",
            CalibrationStatus::ShapeStarting => "SHAPE_STARTING",
            CalibrationStatus::PathStarting => "PATH_STARTING",
            CalibrationStatus::SiteStarting => "SITE_STARTING",
            CalibrationStatus::Complete => "COMPLETE",
            CalibrationStatus::Error => "ERROR",
        };
        f.write_str(s)
    }
}

/// Mw measurement job status
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum MeasurementStatus {
    Starting,
    Complete,
    Error,
}
