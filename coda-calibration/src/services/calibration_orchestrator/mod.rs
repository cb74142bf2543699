//! Calibration pipeline orchestrator
//!
//! Sequences a full calibration run:
//! PEAK → SHAPE → PATH → SITE → final re-measurement, with a cancellation
//! checkpoint between every stage.
//!
//! Only one full run may hold the calibration slot at a time. Mw measurement
//! jobs run on a separate bounded pool and never wait for that slot.
//!
//! Stage bodies live in sibling modules:
//! - `pipeline`: the full calibration run
//! - `mw_measurement`: on-demand Mw measurement
//! - `validation_toggle`: reference / validation set moves
//! - `stages`: pure transformations shared by both runs

mod mw_measurement;
mod pipeline;
pub mod stages;
mod validation_toggle;

pub use mw_measurement::{MwReport, MwSelection};
pub use validation_toggle::toggle_validation;

use crate::db::CalibrationStore;
use crate::error::{CalibrationError, CalibrationResult};
use crate::services::collaborators::Collaborators;
use crate::services::job_registry::JobRegistry;
use crate::services::path_correction::PathOptimizerSettings;
use crate::services::scheduler::{CalibrationScheduler, MeasurementHandle, MeasurementPool};
use crate::services::site_correction::SiteSolverSettings;
use coda_common::config::CalibrationSettings;
use coda_common::events::{CalibrationEvent, EventBus, JobId};
use coda_common::model::{Phase, ShapeFitterConstraints, VelocityConfiguration};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{broadcast, Mutex};
use tokio::task::JoinHandle;

/// Tuning for both pipelines
#[derive(Debug, Clone, PartialEq)]
pub struct PipelineSettings {
    pub velocity: VelocityConfiguration,
    pub shape_constraints: ShapeFitterConstraints,
    pub path: PathOptimizerSettings,
    pub site: SiteSolverSettings,
    /// Phase whose MDAC parameters drive the source model
    pub source_phase: Phase,
    pub worker_threads: usize,
    pub worker_queue_depth: usize,
    /// How long `measure_mw` waits before giving up
    pub measurement_timeout: Duration,
}

impl Default for PipelineSettings {
    fn default() -> Self {
        Self::from(&CalibrationSettings::default())
    }
}

impl From<&CalibrationSettings> for PipelineSettings {
    fn from(settings: &CalibrationSettings) -> Self {
        Self {
            velocity: VelocityConfiguration {
                phase_speed_in_kms: settings.phase_speed_kms,
                ..Default::default()
            },
            shape_constraints: ShapeFitterConstraints::default(),
            path: PathOptimizerSettings::from(settings),
            site: SiteSolverSettings::from(settings),
            source_phase: Phase::Lg,
            worker_threads: settings.worker_threads,
            worker_queue_depth: settings.worker_queue_depth,
            measurement_timeout: Duration::from_secs(settings.measurement_timeout_secs),
        }
    }
}

/// A submitted calibration run
#[derive(Debug)]
pub struct CalibrationRun {
    pub job_id: JobId,
    /// Resolves once the run has emitted its terminal event
    pub handle: JoinHandle<CalibrationResult<()>>,
}

/// Calibration service, cheap to clone
#[derive(Clone)]
pub struct CalibrationService {
    store: Arc<dyn CalibrationStore>,
    event_bus: EventBus,
    collaborators: Collaborators,
    settings: Arc<PipelineSettings>,
    jobs: JobRegistry,
    scheduler: CalibrationScheduler,
    pool: MeasurementPool,
    /// Serializes validation toggles
    toggle_lock: Arc<Mutex<()>>,
}

impl CalibrationService {
    pub fn new(
        store: Arc<dyn CalibrationStore>,
        event_bus: EventBus,
        collaborators: Collaborators,
        settings: PipelineSettings,
    ) -> Self {
        let pool = MeasurementPool::new(settings.worker_threads, settings.worker_queue_depth);
        tracing::info!(
            workers = pool.workers(),
            queue_depth = pool.queue_depth(),
            "Calibration service created"
        );
        Self {
            store,
            event_bus,
            collaborators,
            settings: Arc::new(settings),
            jobs: JobRegistry::new(),
            scheduler: CalibrationScheduler::new(),
            pool,
            toggle_lock: Arc::new(Mutex::new(())),
        }
    }

    pub fn settings(&self) -> &PipelineSettings {
        &self.settings
    }

    pub fn jobs(&self) -> &JobRegistry {
        &self.jobs
    }

    pub fn subscribe(&self) -> broadcast::Receiver<CalibrationEvent> {
        self.event_bus.subscribe()
    }

    /// Claim the calibration slot and spawn a full run
    ///
    /// Fails with `CapacityExceeded` while another run holds the slot.
    pub fn submit_calibration(&self, auto_pick: bool) -> CalibrationResult<CalibrationRun> {
        let permit = self.scheduler.try_acquire()?;
        let guard = self.jobs.register();
        let job_id = guard.id();
        let service = self.clone();

        tracing::info!(job_id = %job_id, auto_pick, "Calibration submitted");

        let handle = tokio::spawn(async move {
            let _permit = permit;
            service.run_calibration(&guard, auto_pick).await
        });

        Ok(CalibrationRun { job_id, handle })
    }

    /// Fire-and-forget start; false when a run is already active
    pub fn start_calibration(&self, auto_pick: bool) -> bool {
        match self.submit_calibration(auto_pick) {
            Ok(_) => true,
            Err(e) => {
                let job_id = self.jobs.next_id();
                tracing::warn!(job_id = %job_id, error = %e, "Calibration rejected");
                self.event_bus
                    .emit_lossy(CalibrationEvent::calibration_error(job_id, e.to_string()));
                false
            }
        }
    }

    /// Request cooperative cancellation; false when the id is not running
    pub fn cancel_calibration(&self, job_id: JobId) -> bool {
        self.jobs.cancel(job_id)
    }

    /// Submit an Mw measurement job to the measurement pool
    pub fn make_mw_measurements(
        &self,
        selection: MwSelection,
        auto_pick: bool,
        persist: bool,
    ) -> CalibrationResult<MeasurementHandle<MwReport>> {
        let guard = self.jobs.register();
        let job_id = guard.id();
        let service = self.clone();

        let submitted = self.pool.submit(move || async move {
            service
                .run_mw_measurement(&guard, selection, auto_pick, persist)
                .await
        });

        match &submitted {
            Ok(_) => tracing::debug!(
                job_id = %job_id,
                available = self.pool.available(),
                "Mw measurement submitted"
            ),
            Err(e) => {
                tracing::warn!(job_id = %job_id, error = %e, "Mw measurement rejected");
                self.event_bus
                    .emit_lossy(CalibrationEvent::measurement_error(job_id, e.to_string()));
            }
        }
        submitted
    }

    /// Measure and wait, bounded by the configured measurement timeout
    pub async fn measure_mw(
        &self,
        selection: MwSelection,
        auto_pick: bool,
        persist: bool,
    ) -> CalibrationResult<MwReport> {
        let handle = self.make_mw_measurements(selection, auto_pick, persist)?;
        handle
            .await_with_timeout(self.settings.measurement_timeout)
            .await
    }

    /// Delete every intermediate and result record
    pub async fn clear_data(&self) -> CalibrationResult<()> {
        self.store.clear_results().await?;
        tracing::info!("Calibration data cleared");
        self.event_bus
            .emit_lossy(CalibrationEvent::DataCleared {
                timestamp: chrono::Utc::now(),
            });
        Ok(())
    }

    /// Refuse new work and cancel everything in flight
    pub fn shutdown(&self) {
        self.scheduler.shutdown();
        self.pool.shutdown();
        let cancelled = self.jobs.cancel_all();
        tracing::info!(cancelled, "Calibration service shut down");
    }

    pub fn is_calibrating(&self) -> bool {
        self.scheduler.is_busy()
    }
}

/// Cancellation checkpoint between stages
pub(crate) fn checkpoint(token: &tokio_util::sync::CancellationToken) -> CalibrationResult<()> {
    if token.is_cancelled() {
        Err(CalibrationError::Cancelled)
    } else {
        Ok(())
    }
}

/// Run a synchronous stage on the blocking pool
pub(crate) async fn blocking<T, F>(stage: F) -> CalibrationResult<T>
where
    F: FnOnce() -> CalibrationResult<T> + Send + 'static,
    T: Send + 'static,
{
    tokio::task::spawn_blocking(stage).await?
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_settings_from_config() {
        let config = CalibrationSettings {
            worker_threads: 3,
            worker_queue_depth: 7,
            measurement_timeout_secs: 60,
            aggressive_path_optimization: false,
            max_path_evaluations: 500,
            spectra_truncation: false,
            phase_speed_kms: 3.2,
        };
        let settings = PipelineSettings::from(&config);
        assert_eq!(settings.velocity.phase_speed_in_kms, 3.2);
        assert_eq!(settings.path.phase_speed_kms, 3.2);
        assert!(!settings.path.aggressive);
        assert_eq!(settings.path.max_evaluations, 500);
        assert!(!settings.site.spectra_truncation);
        assert_eq!(settings.measurement_timeout, Duration::from_secs(60));
        assert_eq!(settings.worker_threads, 3);
        assert_eq!(settings.worker_queue_depth, 7);
        assert_eq!(settings.source_phase, Phase::Lg);
    }

    #[tokio::test]
    async fn test_checkpoint() {
        let token = tokio_util::sync::CancellationToken::new();
        assert!(checkpoint(&token).is_ok());
        token.cancel();
        assert!(matches!(checkpoint(&token), Err(CalibrationError::Cancelled)));
    }

    #[tokio::test]
    async fn test_blocking_propagates_stage_error() {
        let ok = blocking(|| Ok(2 + 2)).await.expect("stage result");
        assert_eq!(ok, 4);
        let err = blocking(|| Err::<(), _>(CalibrationError::Collaborator("boom".into()))).await;
        assert!(matches!(err, Err(CalibrationError::Collaborator(_))));
    }
}
