//! Job admission
//!
//! Full calibrations share a single slot and are refused while it is held.
//! Mw measurement jobs run on a bounded pool: `workers` may execute at once
//! and up to `queue_depth` more may wait; anything beyond is refused
//! immediately.

use crate::error::{CalibrationError, CalibrationResult};
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{OwnedSemaphorePermit, Semaphore};
use tokio::task::JoinHandle;

/// Single-slot gate for full calibration runs
#[derive(Debug, Clone)]
pub struct CalibrationScheduler {
    slot: Arc<Semaphore>,
}

impl Default for CalibrationScheduler {
    fn default() -> Self {
        Self::new()
    }
}

impl CalibrationScheduler {
    pub fn new() -> Self {
        Self {
            slot: Arc::new(Semaphore::new(1)),
        }
    }

    /// Take the calibration slot without waiting
    ///
    /// The slot is released when the returned permit is dropped.
    pub fn try_acquire(&self) -> CalibrationResult<OwnedSemaphorePermit> {
        self.slot.clone().try_acquire_owned().map_err(|e| {
            CalibrationError::CapacityExceeded(format!("calibration already running ({e})"))
        })
    }

    pub fn is_busy(&self) -> bool {
        self.slot.available_permits() == 0
    }

    /// Refuse all further runs
    pub fn shutdown(&self) {
        self.slot.close();
    }
}

/// Handle to a job submitted to a [`MeasurementPool`]
#[derive(Debug)]
pub struct MeasurementHandle<T> {
    inner: JoinHandle<CalibrationResult<T>>,
}

impl<T> MeasurementHandle<T> {
    /// Wait for the job to finish
    pub async fn join(self) -> CalibrationResult<T> {
        self.inner.await?
    }

    /// Wait at most `timeout` for the job
    ///
    /// On timeout the job keeps running detached and
    /// `CalibrationError::Timeout` is returned.
    pub async fn await_with_timeout(self, timeout: Duration) -> CalibrationResult<T> {
        match tokio::time::timeout(timeout, self.inner).await {
            Ok(joined) => joined?,
            Err(_) => Err(CalibrationError::Timeout(timeout)),
        }
    }
}

/// Bounded pool for Mw measurement jobs
#[derive(Debug, Clone)]
pub struct MeasurementPool {
    admission: Arc<Semaphore>,
    execution: Arc<Semaphore>,
    workers: usize,
    queue_depth: usize,
}

impl MeasurementPool {
    pub fn new(workers: usize, queue_depth: usize) -> Self {
        let workers = workers.max(1);
        Self {
            admission: Arc::new(Semaphore::new(workers + queue_depth)),
            execution: Arc::new(Semaphore::new(workers)),
            workers,
            queue_depth,
        }
    }

    pub fn workers(&self) -> usize {
        self.workers
    }

    pub fn queue_depth(&self) -> usize {
        self.queue_depth
    }

    /// Jobs that can still be admitted
    pub fn available(&self) -> usize {
        self.admission.available_permits()
    }

    /// Admit a job, or refuse it when every slot and queue position is taken
    pub fn submit<F, Fut, T>(&self, job: F) -> CalibrationResult<MeasurementHandle<T>>
    where
        F: FnOnce() -> Fut + Send + 'static,
        Fut: Future<Output = CalibrationResult<T>> + Send + 'static,
        T: Send + 'static,
    {
        let admitted = self.admission.clone().try_acquire_owned().map_err(|_| {
            CalibrationError::CapacityExceeded(format!(
                "measurement pool full ({} workers, queue depth {})",
                self.workers, self.queue_depth
            ))
        })?;
        let execution = self.execution.clone();

        let inner = tokio::spawn(async move {
            let _admitted = admitted;
            let _running = execution
                .acquire_owned()
                .await
                .map_err(|_| CalibrationError::Cancelled)?;
            job().await
        });
        Ok(MeasurementHandle { inner })
    }

    /// Refuse new jobs and stop queued ones from starting
    pub fn shutdown(&self) {
        self.admission.close();
        self.execution.close();
    }
}
