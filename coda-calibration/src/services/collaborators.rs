//! Contracts for the external collaborators the pipeline drives
//!
//! Computation collaborators are synchronous: the orchestrator always calls
//! them from inside `spawn_blocking`. The waveform source does I/O and is
//! async.
//!
//! Collaborators receive immutable inputs and return fresh records. A picker
//! that adds a coda end pick returns a new measurement carrying a new
//! waveform; it never edits the one it was given.

use crate::error::CalibrationResult;
use coda_common::model::{
    MdacParametersFi, MdacParametersPs, MeasuredMwParameters, PeakVelocityMeasurement,
    ReferenceMwParameters, ShapeFitterConstraints, SharedFrequencyBandParameters,
    SharedParametersOverlay, SiteFrequencyBandParameters, SpectraMeasurement, Station,
    SyntheticCoda, VelocityConfiguration, Waveform,
};
use coda_common::FrequencyBand;
use std::collections::{BTreeMap, BTreeSet};
use std::sync::Arc;
use tokio_util::sync::CancellationToken;

/// Shared parameters keyed by band
pub type BandParameterMap = BTreeMap<FrequencyBand, SharedFrequencyBandParameters>;

/// Site terms keyed by band, then station
pub type SiteParameterMap = BTreeMap<FrequencyBand, BTreeMap<Station, SiteFrequencyBandParameters>>;

/// Peak velocity / SNR measurement
pub trait VelocityMeasurer: Send + Sync {
    fn measure_velocities(
        &self,
        waveforms: &[Waveform],
        config: &VelocityConfiguration,
    ) -> CalibrationResult<Vec<PeakVelocityMeasurement>>;
}

/// Coda end auto-picking
pub trait AutoPicker: Send + Sync {
    /// Returns the measurements with their waveforms re-picked
    fn auto_pick(
        &self,
        measurements: &[PeakVelocityMeasurement],
        params: &BandParameterMap,
    ) -> CalibrationResult<Vec<PeakVelocityMeasurement>>;
}

/// Synthetic coda generation from shared band parameters
pub trait SyntheticGenerator: Send + Sync {
    fn generate_synthetics(
        &self,
        waveforms: &[Waveform],
        params: &BandParameterMap,
    ) -> CalibrationResult<Vec<SyntheticCoda>>;
}

/// Flags forwarded to the shape fitter
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ShapeFitOptions {
    pub auto_pick: bool,
    /// The fitted shapes will be committed to the shared parameter set
    pub persist: bool,
}

/// Envelope shape fitting
pub trait ShapeFitter: Send + Sync {
    /// Fit shape coefficients per band
    ///
    /// Returns one overlay per band that was fit. May return
    /// `CalibrationError::Cancelled` once `cancel` fires.
    fn fit_shapes(
        &self,
        measurements: &[PeakVelocityMeasurement],
        params: &BandParameterMap,
        constraints: &ShapeFitterConstraints,
        options: ShapeFitOptions,
        cancel: &CancellationToken,
    ) -> CalibrationResult<BTreeMap<FrequencyBand, SharedParametersOverlay>>;
}

/// Spectral amplitude measurement
pub trait SpectraMeasurer: Send + Sync {
    /// Measure amplitudes for each synthetic; `site` adds the site-corrected stage
    fn measure_spectra(
        &self,
        synthetics: &[SyntheticCoda],
        params: &BandParameterMap,
        velocity: &VelocityConfiguration,
        site: Option<&SiteParameterMap>,
    ) -> CalibrationResult<Vec<SpectraMeasurement>>;
}

/// Theoretical source spectrum
pub trait SourceSpectrumModel: Send + Sync {
    /// log10 of the moment spectrum (N-m) at `frequency` Hz
    fn log10_moment(
        &self,
        ps: &MdacParametersPs,
        fi: &MdacParametersFi,
        mw: f64,
        frequency: f64,
    ) -> f64;

    /// Corner frequency (Hz) of the model spectrum
    fn corner_frequency(&self, ps: &MdacParametersPs, fi: &MdacParametersFi, mw: f64) -> f64;
}

/// Site-corrected mean amplitude of one event in one band
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BandAmplitude {
    pub mean: f64,
    pub standard_deviation: f64,
    pub count: u64,
    pub weight: f64,
}

/// Everything the Mw fitter needs for one event
#[derive(Debug, Clone, PartialEq)]
pub struct MwFitInput {
    pub event_id: String,
    pub bands: BTreeMap<FrequencyBand, BandAmplitude>,
    pub station_count: u32,
    pub band_coverage: f64,
    pub reference: Option<ReferenceMwParameters>,
}

/// Spectral Mw regression
pub trait MwFitter: Send + Sync {
    fn fit_mws(
        &self,
        inputs: &[MwFitInput],
        fi: &MdacParametersFi,
        ps: &MdacParametersPs,
    ) -> CalibrationResult<Vec<MeasuredMwParameters>>;
}

/// Access to stacked coda waveforms
#[async_trait::async_trait]
pub trait WaveformSource: Send + Sync {
    async fn active_waveforms(&self) -> CalibrationResult<Vec<Waveform>>;

    async fn waveforms_for_events(
        &self,
        event_ids: &BTreeSet<String>,
    ) -> CalibrationResult<Vec<Waveform>>;
}

/// The full set of collaborators the orchestrator drives
#[derive(Clone)]
pub struct Collaborators {
    pub waveforms: Arc<dyn WaveformSource>,
    pub velocity: Arc<dyn VelocityMeasurer>,
    pub picker: Arc<dyn AutoPicker>,
    pub synthetics: Arc<dyn SyntheticGenerator>,
    pub shapes: Arc<dyn ShapeFitter>,
    pub spectra: Arc<dyn SpectraMeasurer>,
    pub source_model: Arc<dyn SourceSpectrumModel>,
    pub mw_fitter: Arc<dyn MwFitter>,
}
