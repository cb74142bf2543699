//! Lifecycle event types for the calibration services
//!
//! Provides the CalibrationEvent enum and the EventBus used to publish job
//! status to any number of observers.

mod status_types;

pub use status_types::{CalibrationStatus, JobId, MeasurementStatus};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;

/// Calibration lifecycle events
///
/// Broadcast via EventBus and serializable for transmission to observers.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum CalibrationEvent {
    /// Calibration job changed status
    CalibrationStatusChanged {
        job_id: JobId,
        status: CalibrationStatus,
        /// Failure message (only with `Error` status)
        #[serde(default, skip_serializing_if = "Option::is_none")]
        error: Option<String>,
        /// Run stopped at a cancellation checkpoint (only with `Complete`)
        #[serde(default)]
        cancelled: bool,
        timestamp: DateTime<Utc>,
    },

    /// Mw measurement job changed status
    MeasurementStatusChanged {
        job_id: JobId,
        status: MeasurementStatus,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        error: Option<String>,
        /// Job stopped at a cancellation checkpoint (only with `Complete`)
        #[serde(default)]
        cancelled: bool,
        timestamp: DateTime<Utc>,
    },

    /// All intermediate and result data was deleted
    DataCleared { timestamp: DateTime<Utc> },
}

impl CalibrationEvent {
    /// Get event type as string for filtering
    pub fn event_type(&self) -> &str {
        match self {
            CalibrationEvent::CalibrationStatusChanged { .. } => "CalibrationStatusChanged",
            CalibrationEvent::MeasurementStatusChanged { .. } => "MeasurementStatusChanged",
            CalibrationEvent::DataCleared { .. } => "DataCleared",
        }
    }

    pub fn calibration(job_id: JobId, status: CalibrationStatus) -> Self {
        CalibrationEvent::CalibrationStatusChanged {
            job_id,
            status,
            error: None,
            cancelled: false,
            timestamp: Utc::now(),
        }
    }

    pub fn calibration_error(job_id: JobId, message: impl Into<String>) -> Self {
        CalibrationEvent::CalibrationStatusChanged {
            job_id,
            status: CalibrationStatus::Error,
            error: Some(message.into()),
            cancelled: false,
            timestamp: Utc::now(),
        }
    }

    pub fn calibration_cancelled(job_id: JobId) -> Self {
        CalibrationEvent::CalibrationStatusChanged {
            job_id,
            status: CalibrationStatus::Complete,
            error: None,
            cancelled: true,
            timestamp: Utc::now(),
        }
    }

    pub fn measurement(job_id: JobId, status: MeasurementStatus) -> Self {
        CalibrationEvent::MeasurementStatusChanged {
            job_id,
            status,
            error: None,
            cancelled: false,
            timestamp: Utc::now(),
        }
    }

    pub fn measurement_error(job_id: JobId, message: impl Into<String>) -> Self {
        CalibrationEvent::MeasurementStatusChanged {
            job_id,
            status: MeasurementStatus::Error,
            error: Some(message.into()),
            cancelled: false,
            timestamp: Utc::now(),
        }
    }

    pub fn measurement_cancelled(job_id: JobId) -> Self {
        CalibrationEvent::MeasurementStatusChanged {
            job_id,
            status: MeasurementStatus::Complete,
            error: None,
            cancelled: true,
            timestamp: Utc::now(),
        }
    }
}

// ========================================
// EventBus Implementation
// ========================================

/// Central event distribution bus for calibration lifecycle events
///
/// The EventBus uses tokio::broadcast internally, providing:
/// - Non-blocking publish (slow subscribers don't block producers)
/// - Multiple concurrent subscribers
/// - Lagged message detection for slow subscribers
///
/// # Examples
///
/// ```
/// use coda_common::events::{CalibrationEvent, CalibrationStatus, EventBus, JobId};
/// use std::sync::Arc;
///
/// let event_bus = Arc::new(EventBus::new(100));
/// let mut rx = event_bus.subscribe();
///
/// event_bus.emit_lossy(CalibrationEvent::calibration(JobId(1), CalibrationStatus::Starting));
///
/// let received = rx.try_recv().unwrap();
/// assert_eq!(received.event_type(), "CalibrationStatusChanged");
/// ```
#[derive(Clone)]
pub struct EventBus {
    tx: broadcast::Sender<CalibrationEvent>,
    capacity: usize,
}

impl EventBus {
    /// Creates a new EventBus with specified channel capacity
    ///
    /// `capacity` is the number of events buffered before the oldest are
    /// dropped for lagging receivers.
    pub fn new(capacity: usize) -> Self {
        let (tx, _) = broadcast::channel(capacity);
        Self { tx, capacity }
    }

    /// Subscribe to all future events
    ///
    /// Events emitted before subscription are not received.
    pub fn subscribe(&self) -> broadcast::Receiver<CalibrationEvent> {
        self.tx.subscribe()
    }

    /// Emit an event to all subscribers
    ///
    /// Returns `Ok(subscriber_count)` if at least one subscriber exists,
    /// `Err` if no subscribers are listening.
    #[allow(clippy::result_large_err)]
    pub fn emit(
        &self,
        event: CalibrationEvent,
    ) -> Result<usize, broadcast::error::SendError<CalibrationEvent>> {
        self.tx.send(event)
    }

    /// Emit an event, ignoring if no subscribers are listening
    pub fn emit_lossy(&self, event: CalibrationEvent) {
        let _ = self.tx.send(event);
    }

    /// Get the current number of active subscribers
    pub fn subscriber_count(&self) -> usize {
        self.tx.receiver_count()
    }

    /// Get the configured channel capacity
    pub fn capacity(&self) -> usize {
        self.capacity
    }
}
