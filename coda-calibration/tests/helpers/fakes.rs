//! Deterministic stand-ins for the measurement collaborators

use coda_calibration::error::{CalibrationError, CalibrationResult};
use coda_calibration::services::collaborators::{
    AutoPicker, BandParameterMap, MwFitInput, MwFitter, ShapeFitOptions, ShapeFitter,
    SiteParameterMap, SpectraMeasurer, SyntheticGenerator, VelocityMeasurer, WaveformSource,
};
use coda_common::model::{
    great_circle_distance_km, MdacParametersFi, MdacParametersPs, MeasuredMwParameters,
    PeakVelocityMeasurement, ShapeFitterConstraints, SharedParametersOverlay, SpectraMeasurement,
    SyntheticCoda, VelocityConfiguration, Waveform, WaveformPick,
};
use coda_common::FrequencyBand;
use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Mutex;
use std::time::Duration;
use tokio_util::sync::CancellationToken;

/// Fixed waveform catalogue
pub struct FakeWaveforms {
    pub waveforms: Vec<Waveform>,
}

#[async_trait::async_trait]
impl WaveformSource for FakeWaveforms {
    async fn active_waveforms(&self) -> CalibrationResult<Vec<Waveform>> {
        Ok(self.waveforms.iter().filter(|w| w.active).cloned().collect())
    }

    async fn waveforms_for_events(&self, event_ids: &BTreeSet<String>) -> CalibrationResult<Vec<Waveform>> {
        Ok(self
            .waveforms
            .iter()
            .filter(|w| event_ids.contains(&w.event.event_id))
            .cloned()
            .collect())
    }
}

/// Every waveform measures at the same SNR
pub struct FakeVelocity {
    pub snr: f64,
}

impl VelocityMeasurer for FakeVelocity {
    fn measure_velocities(
        &self,
        waveforms: &[Waveform],
        _config: &VelocityConfiguration,
    ) -> CalibrationResult<Vec<PeakVelocityMeasurement>> {
        Ok(waveforms
            .iter()
            .map(|w| PeakVelocityMeasurement {
                waveform: w.clone(),
                time_sec_from_origin: 30.0,
                snr: self.snr,
                velocity: 3.5,
                amplitude: 1.0,
                distance: great_circle_distance_km(&w.event, &w.station),
            })
            .collect())
    }
}

/// Adds a coda end pick at 200 s and records each batch size
#[derive(Default)]
pub struct FakePicker {
    batches: Mutex<Vec<usize>>,
}

impl FakePicker {
    /// Number of measurements handed over on each call
    pub fn batches(&self) -> Vec<usize> {
        self.batches.lock().unwrap().clone()
    }
}

impl AutoPicker for FakePicker {
    fn auto_pick(
        &self,
        measurements: &[PeakVelocityMeasurement],
        _params: &BandParameterMap,
    ) -> CalibrationResult<Vec<PeakVelocityMeasurement>> {
        self.batches.lock().unwrap().push(measurements.len());
        Ok(measurements
            .iter()
            .map(|m| {
                let mut picks = m.waveform.picks.clone();
                picks.push(WaveformPick::new("F", 200.0));
                PeakVelocityMeasurement {
                    waveform: m.waveform.with_picks(picks),
                    ..m.clone()
                }
            })
            .collect())
    }
}

pub struct FakeSynthetics;

impl SyntheticGenerator for FakeSynthetics {
    fn generate_synthetics(
        &self,
        waveforms: &[Waveform],
        _params: &BandParameterMap,
    ) -> CalibrationResult<Vec<SyntheticCoda>> {
        Ok(waveforms
            .iter()
            .map(|w| SyntheticCoda {
                source_waveform: w.clone(),
                source_velocity: 3.5,
                source_beta: -0.5,
                source_gamma: 0.5,
            })
            .collect())
    }
}

/// Shape fitter that can be held open until released or cancelled
#[derive(Default)]
pub struct HoldingShapeFitter {
    hold: AtomicBool,
    entered: AtomicUsize,
    persist_flags: Mutex<Vec<bool>>,
}

impl HoldingShapeFitter {
    pub fn hold(&self) {
        self.hold.store(true, Ordering::SeqCst);
    }

    pub fn release(&self) {
        self.hold.store(false, Ordering::SeqCst);
    }

    /// Number of fits started so far
    pub fn entered(&self) -> usize {
        self.entered.load(Ordering::SeqCst)
    }

    pub fn persist_flags(&self) -> Vec<bool> {
        self.persist_flags.lock().unwrap().clone()
    }
}

impl ShapeFitter for HoldingShapeFitter {
    fn fit_shapes(
        &self,
        _measurements: &[PeakVelocityMeasurement],
        params: &BandParameterMap,
        _constraints: &ShapeFitterConstraints,
        options: ShapeFitOptions,
        cancel: &CancellationToken,
    ) -> CalibrationResult<BTreeMap<FrequencyBand, SharedParametersOverlay>> {
        self.persist_flags.lock().unwrap().push(options.persist);
        self.entered.fetch_add(1, Ordering::SeqCst);
        while self.hold.load(Ordering::SeqCst) {
            if cancel.is_cancelled() {
                return Err(CalibrationError::Cancelled);
            }
            std::thread::sleep(Duration::from_millis(5));
        }
        Ok(params
            .keys()
            .map(|band| {
                (
                    *band,
                    SharedParametersOverlay {
                        beta1: Some(-0.5),
                        gamma1: Some(0.5),
                        ..Default::default()
                    },
                )
            })
            .collect())
    }
}

/// Amplitudes from a fixed (event, station) table
///
/// The path corrected value is the table entry; the fully corrected value
/// adds the station's site term when one is supplied.
pub struct FakeSpectra {
    pub amplitudes: HashMap<(String, String), f64>,
    site_calls: AtomicUsize,
    calls: AtomicUsize,
}

impl FakeSpectra {
    pub fn new(amplitudes: HashMap<(String, String), f64>) -> Self {
        Self {
            amplitudes,
            site_calls: AtomicUsize::new(0),
            calls: AtomicUsize::new(0),
        }
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    pub fn site_calls(&self) -> usize {
        self.site_calls.load(Ordering::SeqCst)
    }
}

impl SpectraMeasurer for FakeSpectra {
    fn measure_spectra(
        &self,
        synthetics: &[SyntheticCoda],
        _params: &BandParameterMap,
        _velocity: &VelocityConfiguration,
        site: Option<&SiteParameterMap>,
    ) -> CalibrationResult<Vec<SpectraMeasurement>> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if site.is_some() {
            self.site_calls.fetch_add(1, Ordering::SeqCst);
        }
        Ok(synthetics
            .iter()
            .map(|s| {
                let w = &s.source_waveform;
                let key = (w.event.event_id.clone(), w.station.station_name.clone());
                let amplitude = self.amplitudes.get(&key).copied().unwrap_or(20.0);
                let site_term = site
                    .and_then(|sites| sites.get(&w.band))
                    .and_then(|stations| stations.get(&w.station))
                    .map(|p| p.site_term)
                    .unwrap_or(0.0);
                SpectraMeasurement {
                    waveform: w.clone(),
                    raw_at_start: amplitude,
                    raw_at_measurement_time: amplitude,
                    path_corrected: amplitude,
                    path_and_site_corrected: amplitude + site_term,
                    start_cut_sec: 30.0,
                    end_cut_sec: 200.0,
                    rms_fit: 0.1,
                }
            })
            .collect())
    }
}

/// Mw from the average band amplitude: `mean / 1.5 - 10`
pub struct EchoFitter;

impl MwFitter for EchoFitter {
    fn fit_mws(
        &self,
        inputs: &[MwFitInput],
        _fi: &MdacParametersFi,
        _ps: &MdacParametersPs,
    ) -> CalibrationResult<Vec<MeasuredMwParameters>> {
        Ok(inputs
            .iter()
            .map(|input| {
                let n = input.bands.len().max(1) as f64;
                let mean = input.bands.values().map(|b| b.mean).sum::<f64>() / n;
                MeasuredMwParameters {
                    data_count: input.bands.len() as u32,
                    ..MeasuredMwParameters::new(input.event_id.clone(), mean / 1.5 - 10.0)
                }
            })
            .collect())
    }
}
