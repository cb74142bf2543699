//! On-demand Mw measurement
//!
//! Reduced pipeline over the current calibration: peak velocity, optional
//! auto-pick, SNR filter, shape adjustment, synthetics, site corrected
//! spectra and the Mw fit. Shape adjustments stay in memory; the stored
//! calibration is never modified, apart from the measured Mws when the
//! caller asks for them to be persisted.

use super::{blocking, checkpoint, stages, CalibrationService};
use crate::error::{CalibrationError, CalibrationResult};
use crate::services::collaborators::ShapeFitOptions;
use crate::services::job_registry::JobGuard;
use crate::services::site_correction::annotate_fit_quality;
use coda_common::events::{CalibrationEvent, JobId, MeasurementStatus};
use coda_common::model::{MeasuredMwParameters, SpectraMeasurement, Waveform};
use std::collections::{BTreeMap, BTreeSet};
use std::sync::Arc;
use tokio_util::sync::CancellationToken;

/// Waveforms an Mw measurement runs over
#[derive(Debug, Clone)]
pub enum MwSelection {
    /// Every active waveform
    AllActive,
    EventIds(BTreeSet<String>),
    /// An explicit waveform list, used as given
    Waveforms(Vec<Waveform>),
}

/// Result of an Mw measurement job
#[derive(Debug, Clone, Default)]
pub struct MwReport {
    pub measured_mws: BTreeMap<String, MeasuredMwParameters>,
    /// Path and site corrected spectra the fits were made from
    pub spectra: Vec<SpectraMeasurement>,
}

impl MwReport {
    pub fn is_empty(&self) -> bool {
        self.measured_mws.is_empty()
    }
}

impl CalibrationService {
    pub(super) async fn run_mw_measurement(
        &self,
        guard: &JobGuard,
        selection: MwSelection,
        auto_pick: bool,
        persist: bool,
    ) -> CalibrationResult<MwReport> {
        let job_id = guard.id();
        self.event_bus
            .emit_lossy(CalibrationEvent::measurement(job_id, MeasurementStatus::Starting));

        match self
            .measure_selection(job_id, guard.token(), selection, auto_pick, persist)
            .await
        {
            Ok(report) => {
                tracing::info!(job_id = %job_id, events = report.measured_mws.len(), "Mw measurement complete");
                self.event_bus
                    .emit_lossy(CalibrationEvent::measurement(job_id, MeasurementStatus::Complete));
                Ok(report)
            }
            Err(CalibrationError::Cancelled) => {
                tracing::info!(job_id = %job_id, "Mw measurement cancelled");
                self.event_bus
                    .emit_lossy(CalibrationEvent::measurement_cancelled(job_id));
                Err(CalibrationError::Cancelled)
            }
            Err(CalibrationError::NoData(message)) => {
                tracing::warn!(job_id = %job_id, "Mw measurement found nothing to measure: {}", message);
                self.event_bus
                    .emit_lossy(CalibrationEvent::measurement_error(job_id, message));
                Ok(MwReport::default())
            }
            Err(e) => {
                tracing::error!(job_id = %job_id, error = %e, "Mw measurement failed");
                self.event_bus
                    .emit_lossy(CalibrationEvent::measurement_error(job_id, e.to_string()));
                Err(e)
            }
        }
    }

    async fn measure_selection(
        &self,
        job_id: JobId,
        token: &CancellationToken,
        selection: MwSelection,
        auto_pick: bool,
        persist: bool,
    ) -> CalibrationResult<MwReport> {
        let collaborators = &self.collaborators;

        let waveforms = match selection {
            MwSelection::AllActive => collaborators.waveforms.active_waveforms().await?,
            MwSelection::EventIds(ids) => collaborators.waveforms.waveforms_for_events(&ids).await?,
            MwSelection::Waveforms(waveforms) => waveforms,
        };
        let sites = self.store.site_parameters().await?;
        let waveforms = stages::restrict_to_site_stations(waveforms, &sites);
        if waveforms.is_empty() {
            return Err(CalibrationError::NoData(
                "no waveforms from site-calibrated stations match the selection".to_string(),
            ));
        }
        tracing::info!(job_id = %job_id, waveforms = waveforms.len(), "Measuring Mw");

        let mut shared = self.store.shared_parameters().await?;

        let measurer = collaborators.velocity.clone();
        let config = self.settings.velocity.clone();
        let velocities = blocking(move || measurer.measure_velocities(&waveforms, &config)).await?;
        checkpoint(token)?;

        let velocities = if auto_pick {
            let picker = collaborators.picker.clone();
            let params = shared.clone();
            let picked = blocking(move || picker.auto_pick(&velocities, &params)).await?;
            checkpoint(token)?;
            picked
        } else {
            velocities
        };
        let velocities = stages::snr_filter(velocities, &shared);

        let velocities = Arc::new(velocities);
        let overlays = {
            let shapes = collaborators.shapes.clone();
            let measurements = velocities.clone();
            let params = shared.clone();
            let constraints = self.settings.shape_constraints.clone();
            let cancel = token.clone();
            let options = ShapeFitOptions {
                auto_pick,
                persist: false,
            };
            blocking(move || shapes.fit_shapes(&measurements, &params, &constraints, options, &cancel)).await?
        };
        shared = stages::merge_overlays(&shared, &overlays);
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

        let spectra = self.measure_spectra(&synthetics, &shared, Some(sites)).await?;
        checkpoint(token)?;

        let references = self.store.reference_mws().await?;
        let fi = self.store.mdac_fi().await?;
        let ps = self.store.mdac_ps(self.settings.source_phase).await?;
        let inputs = stages::fit_inputs_from_corrected(&spectra, &references);

        let fitter = collaborators.mw_fitter.clone();
        let measured = blocking(move || {
            let mut measured = fitter.fit_mws(&inputs, &fi, &ps)?;
            annotate_fit_quality(&mut measured, &inputs);
            Ok(measured)
        })
        .await?;

        if persist {
            self.store.save_measured_mws(&measured).await?;
            tracing::debug!(job_id = %job_id, count = measured.len(), "Measured Mws saved");
        }

        Ok(MwReport {
            measured_mws: measured
                .into_iter()
                .map(|mw| (mw.event_id.clone(), mw))
                .collect(),
            spectra,
        })
    }
}
