//! Error types for coda-calibration

use std::time::Duration;
use thiserror::Error;

/// Calibration job error type
#[derive(Debug, Error)]
pub enum CalibrationError {
    /// Submission refused because every slot (and queue position) is taken
    #[error("Capacity exceeded: {0}")]
    CapacityExceeded(String),

    /// Run stopped at a cancellation checkpoint
    #[error("Cancelled")]
    Cancelled,

    /// Caller gave up waiting for the job result
    #[error("Timed out after {0:?}")]
    Timeout(Duration),

    /// Nothing qualified for processing
    #[error("No data: {0}")]
    NoData(String),

    /// An external collaborator failed
    #[error("Collaborator error: {0}")]
    Collaborator(String),

    /// coda-common error
    #[error("Common error: {0}")]
    Common(#[from] coda_common::Error),

    /// Background task panicked or was aborted
    #[error("Task join error: {0}")]
    Join(String),
}

impl From<sqlx::Error> for CalibrationError {
    fn from(e: sqlx::Error) -> Self {
        CalibrationError::Common(coda_common::Error::Database(e))
    }
}

impl From<tokio::task::JoinError> for CalibrationError {
    fn from(e: tokio::task::JoinError) -> Self {
        CalibrationError::Join(e.to_string())
    }
}

impl CalibrationError {
    pub fn is_cancelled(&self) -> bool {
        matches!(self, CalibrationError::Cancelled)
    }
}

/// Result type for calibration operations
pub type CalibrationResult<T> = Result<T, CalibrationError>;
