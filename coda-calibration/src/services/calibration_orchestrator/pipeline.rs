//! Full calibration run
//!
//! Stage order:
//! 1. Peak velocities over all active waveforms
//! 2. Clear the previous run's velocities and synthetics, SNR filter, persist
//! 3. Optional coda end auto-pick
//! 4. Shape fit, committed by field-merge
//! 5. Synthetics and spectra from end-picked waveforms
//! 6. Path correction, committed by field-merge
//! 7. Spectra re-measured with the path terms
//! 8. Site correction and Mw fit, replacing site terms and measured Mws
//! 9. Final re-measurement with path and site corrections

use super::{blocking, checkpoint, stages, CalibrationService};
use crate::error::{CalibrationError, CalibrationResult};
use crate::services::collaborators::{BandParameterMap, ShapeFitOptions, SiteParameterMap};
use crate::services::job_registry::JobGuard;
use crate::services::path_correction::PathCorrectionOptimizer;
use crate::services::site_correction::{SiteCorrectionRequest, SiteCorrectionSolver};
use coda_common::events::{CalibrationEvent, CalibrationStatus, JobId};
use coda_common::model::{SpectraMeasurement, SyntheticCoda};
use std::collections::BTreeSet;
use std::sync::Arc;
use std::time::Instant;
use tokio_util::sync::CancellationToken;

impl CalibrationService {
    /// Run every stage and emit the terminal event
    ///
    /// Cancellation ends with `Complete { cancelled: true }` and
    /// `Err(Cancelled)`. Missing qualifying data posts an `Error` event but
    /// the task still succeeds; any other failure posts the `Error` event and
    /// returns the error.
    pub(super) async fn run_calibration(&self, guard: &JobGuard, auto_pick: bool) -> CalibrationResult<()> {
        let job_id = guard.id();
        let start_time = Instant::now();
        self.emit_status(job_id, CalibrationStatus::Starting);

        match self.run_stages(job_id, guard.token(), auto_pick).await {
            Ok(()) => {
                tracing::info!(
                    job_id = %job_id,
                    elapsed_ms = start_time.elapsed().as_millis() as u64,
                    "Calibration complete"
                );
                self.emit_status(job_id, CalibrationStatus::Complete);
                Ok(())
            }
            Err(CalibrationError::Cancelled) => {
                tracing::info!(job_id = %job_id, "Calibration cancelled");
                self.event_bus
                    .emit_lossy(CalibrationEvent::calibration_cancelled(job_id));
                Err(CalibrationError::Cancelled)
            }
            Err(e @ CalibrationError::NoData(_)) => {
                tracing::warn!(job_id = %job_id, error = %e, "Calibration found no qualifying data");
                self.event_bus
                    .emit_lossy(CalibrationEvent::calibration_error(job_id, e.to_string()));
                Ok(())
            }
            Err(e) => {
                tracing::error!(job_id = %job_id, error = %e, "Calibration failed");
                self.event_bus
                    .emit_lossy(CalibrationEvent::calibration_error(job_id, e.to_string()));
                Err(e)
            }
        }
    }

    fn emit_status(&self, job_id: JobId, status: CalibrationStatus) {
        self.event_bus
            .emit_lossy(CalibrationEvent::calibration(job_id, status));
    }

    async fn run_stages(
        &self,
        job_id: JobId,
        token: &CancellationToken,
        auto_pick: bool,
    ) -> CalibrationResult<()> {
        let collaborators = &self.collaborators;

        // PEAK
        checkpoint(token)?;
        self.emit_status(job_id, CalibrationStatus::PeakStarting);
        let waveforms = collaborators.waveforms.active_waveforms().await?;
        tracing::info!(job_id = %job_id, waveforms = waveforms.len(), "Measuring peak velocities");

        let measurer = collaborators.velocity.clone();
        let config = self.settings.velocity.clone();
        let velocities = blocking(move || measurer.measure_velocities(&waveforms, &config)).await?;
        checkpoint(token)?;

        self.store.clear_intermediate().await?;
        let mut shared = self.store.shared_parameters().await?;
        let mut velocities = stages::snr_filter(velocities, &shared);
        self.store.replace_velocity_measurements(&velocities).await?;
        checkpoint(token)?;

        if auto_pick {
            let picker = collaborators.picker.clone();
            let params = shared.clone();
            velocities = blocking(move || picker.auto_pick(&velocities, &params)).await?;
            self.store.replace_velocity_measurements(&velocities).await?;
            checkpoint(token)?;
        }

        // SHAPE
        self.emit_status(job_id, CalibrationStatus::ShapeStarting);
        let velocities = Arc::new(velocities);
        let overlays = {
            let shapes = collaborators.shapes.clone();
            let measurements = velocities.clone();
            let params = shared.clone();
            let constraints = self.settings.shape_constraints.clone();
            let cancel = token.clone();
            let options = ShapeFitOptions {
                auto_pick,
                persist: true,
            };
            blocking(move || shapes.fit_shapes(&measurements, &params, &constraints, options, &cancel)).await?
        };
        shared = stages::merge_overlays(&shared, &overlays);
        self.store
            .save_shared_parameters(&stages::updated_parameters(&shared, &overlays))
            .await?;
        tracing::info!(job_id = %job_id, bands = overlays.len(), "Shape parameters committed");
        checkpoint(token)?;

        let picked = stages::end_picked_waveforms(&velocities);
        if picked.is_empty() {
            return Err(CalibrationError::NoData(
                "no end-picked waveforms passed the SNR filter".to_string(),
            ));
        }

        let generator = collaborators.synthetics.clone();
        let params = shared.clone();
        let synthetics = Arc::new(blocking(move || generator.generate_synthetics(&picked, &params)).await?);
        checkpoint(token)?;

        let spectra = self.measure_spectra(&synthetics, &shared, None).await?;
        checkpoint(token)?;

        // PATH
        self.emit_status(job_id, CalibrationStatus::PathStarting);
        let optimizer = PathCorrectionOptimizer::new(self.settings.path);
        let params = shared.clone();
        let path = blocking(move || Ok(optimizer.optimize(&spectra, &params))).await?;
        shared = stages::merge_overlays(&shared, &path.overlays);
        self.store
            .save_shared_parameters(&stages::updated_parameters(&shared, &path.overlays))
            .await?;
        self.store.replace_path_measurements(&path.measurements).await?;
        tracing::info!(job_id = %job_id, bands = path.overlays.len(), "Path parameters committed");
        checkpoint(token)?;

        let spectra = self.measure_spectra(&synthetics, &shared, None).await?;
        checkpoint(token)?;

        // SITE
        self.emit_status(job_id, CalibrationStatus::SiteStarting);
        let references = self.store.reference_mws().await?;
        let validation_event_ids: BTreeSet<String> = self
            .store
            .validation_mws()
            .await?
            .into_iter()
            .map(|v| v.event_id)
            .collect();
        let fi = self.store.mdac_fi().await?;
        let ps = self.store.mdac_ps(self.settings.source_phase).await?;

        let solver = SiteCorrectionSolver::new(
            self.settings.site,
            collaborators.source_model.clone(),
            collaborators.mw_fitter.clone(),
        );
        let site = blocking(move || {
            solver.solve(SiteCorrectionRequest {
                spectra: &spectra,
                references: &references,
                validation_event_ids: &validation_event_ids,
                fi: &fi,
                ps: &ps,
            })
        })
        .await?;
        self.store.replace_site_parameters(&site.site_parameters).await?;
        self.store.replace_measured_mws(&site.measured_mws).await?;
        tracing::info!(
            job_id = %job_id,
            measured = site.measured_mws.len(),
            "Site parameters and measured Mws committed"
        );
        checkpoint(token)?;

        // Final pass with both corrections
        let final_spectra = self
            .measure_spectra(&synthetics, &shared, Some(site.site_parameters))
            .await?;
        self.store.replace_synthetics(&synthetics).await?;
        tracing::debug!(job_id = %job_id, spectra = final_spectra.len(), "Final spectra measured");

        Ok(())
    }

    /// Measure spectra on the blocking pool
    pub(super) async fn measure_spectra(
        &self,
        synthetics: &Arc<Vec<SyntheticCoda>>,
        params: &BandParameterMap,
        site: Option<SiteParameterMap>,
    ) -> CalibrationResult<Vec<SpectraMeasurement>> {
        let measurer = self.collaborators.spectra.clone();
        let synthetics = synthetics.clone();
        let params = params.clone();
        let velocity = self.settings.velocity.clone();
        blocking(move || measurer.measure_spectra(&synthetics, &params, &velocity, site.as_ref())).await
    }
}
