//! Test Helper Utilities
//!
//! Shared fixtures and a service harness for the coda-calibration
//! integration tests

#![allow(dead_code)]

pub mod fakes;
pub mod log_capture;

pub use fakes::{
    EchoFitter, FakePicker, FakeSpectra, FakeSynthetics, FakeVelocity, FakeWaveforms,
    HoldingShapeFitter,
};
pub use log_capture::{capture_logs, LogCapture};

use coda_calibration::db::{CalibrationStore, MemoryCalibrationStore};
use coda_calibration::services::mdac::MdacModel;
use coda_calibration::services::path_correction::PathOptimizerSettings;
use coda_calibration::{CalibrationService, Collaborators, PipelineSettings};
use coda_common::events::{CalibrationEvent, EventBus};
use coda_common::model::{
    Event, ReferenceMwParameters, SharedFrequencyBandParameters, SiteFrequencyBandParameters,
    Station, Waveform, WaveformPick,
};
use coda_common::FrequencyBand;
use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::broadcast;

pub fn band() -> FrequencyBand {
    FrequencyBand::new(1.0, 2.0)
}

pub fn stations() -> Vec<Station> {
    vec![
        Station::new("XX", "A", 1.0, 1.0),
        Station::new("XX", "B", 2.0, -1.0),
        Station::new("XX", "C", -1.0, 2.0),
    ]
}

/// Station offsets baked into the fake amplitudes
pub fn station_offset(name: &str) -> f64 {
    match name {
        "B" => 0.3,
        "C" => -0.2,
        _ => 0.0,
    }
}

pub fn events() -> Vec<Event> {
    (0..4)
        .map(|i| Event::new(format!("e{}", i + 1), 0.0, i as f64 * 0.5))
        .collect()
}

/// One end-picked waveform per (event, station)
pub fn waveforms(end_picked: bool) -> Vec<Waveform> {
    let mut waveforms = Vec::new();
    let mut id = 1;
    for event in events() {
        for station in stations() {
            let mut w = Waveform::new(id, event.clone(), station, band());
            if end_picked {
                w = w.with_picks(vec![WaveformPick::new("F", 180.0)]);
            }
            waveforms.push(w);
            id += 1;
        }
    }
    waveforms
}

/// `20 + 0.5 * event index + station offset`
pub fn amplitudes() -> HashMap<(String, String), f64> {
    let mut table = HashMap::new();
    for (i, event) in events().iter().enumerate() {
        for station in stations() {
            table.insert(
                (event.event_id.clone(), station.station_name.clone()),
                20.0 + 0.5 * i as f64 + station_offset(&station.station_name),
            );
        }
    }
    table
}

pub fn shared_parameters() -> SharedFrequencyBandParameters {
    let mut p = SharedFrequencyBandParameters::new(band());
    p.min_snr = 2.0;
    p.p1 = 1e-3;
    p.p2 = 1.0;
    p.q = 300.0;
    p.xc = 100.0;
    p.xt = 2.0;
    p
}

pub fn site_term(station: &Station, term: f64) -> SiteFrequencyBandParameters {
    SiteFrequencyBandParameters {
        station: station.clone(),
        band: band(),
        site_term: term,
    }
}

/// Harness knobs
#[derive(Debug, Clone)]
pub struct HarnessOptions {
    pub end_picked: bool,
    pub snr: f64,
    pub workers: usize,
    pub queue_depth: usize,
    pub measurement_timeout: Duration,
}

impl Default for HarnessOptions {
    fn default() -> Self {
        Self {
            end_picked: true,
            snr: 10.0,
            workers: 2,
            queue_depth: 2,
            measurement_timeout: Duration::from_secs(30),
        }
    }
}

/// A service over an in-memory store and the fake collaborators
pub struct Harness {
    pub service: CalibrationService,
    pub store: Arc<MemoryCalibrationStore>,
    pub shapes: Arc<HoldingShapeFitter>,
    pub spectra: Arc<FakeSpectra>,
    pub picker: Arc<FakePicker>,
}

pub async fn harness(options: HarnessOptions) -> Harness {
    let store = Arc::new(MemoryCalibrationStore::new());
    store
        .save_shared_parameters(&[shared_parameters()])
        .await
        .expect("seed shared parameters");
    store
        .save_reference_mws(&[
            ReferenceMwParameters::new("e1", 4.0),
            ReferenceMwParameters::new("e2", 4.5),
        ])
        .await
        .expect("seed references");

    let shapes = Arc::new(HoldingShapeFitter::default());
    let spectra = Arc::new(FakeSpectra::new(amplitudes()));
    let picker = Arc::new(FakePicker::default());
    let collaborators = Collaborators {
        waveforms: Arc::new(FakeWaveforms {
            waveforms: waveforms(options.end_picked),
        }),
        velocity: Arc::new(FakeVelocity { snr: options.snr }),
        picker: picker.clone(),
        synthetics: Arc::new(FakeSynthetics),
        shapes: shapes.clone(),
        spectra: spectra.clone(),
        source_model: Arc::new(MdacModel),
        mw_fitter: Arc::new(EchoFitter),
    };

    let settings = PipelineSettings {
        path: PathOptimizerSettings {
            aggressive: false,
            max_evaluations: 20_000,
            phase_speed_kms: 3.5,
        },
        worker_threads: options.workers,
        worker_queue_depth: options.queue_depth,
        measurement_timeout: options.measurement_timeout,
        ..PipelineSettings::default()
    };

    let service = CalibrationService::new(store.clone(), EventBus::new(256), collaborators, settings);

    Harness {
        service,
        store,
        shapes,
        spectra,
        picker,
    }
}

/// Seed site terms that cancel each fixture station's offset
pub async fn seed_site_terms(store: &MemoryCalibrationStore) {
    let terms: BTreeMap<Station, SiteFrequencyBandParameters> = stations()
        .into_iter()
        .map(|s| (s.clone(), site_term(&s, -station_offset(&s.station_name))))
        .collect();
    store
        .replace_site_parameters(&BTreeMap::from([(band(), terms)]))
        .await
        .expect("seed site terms");
}

/// Wait until the shape fitter has been entered `count` times
pub async fn wait_for_shape_fit(shapes: &HoldingShapeFitter, count: usize) {
    tokio::time::timeout(Duration::from_secs(10), async {
        while shapes.entered() < count {
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
    })
    .await
    .expect("shape fit never started");
}

/// Everything received so far, without waiting
pub fn drain(rx: &mut broadcast::Receiver<CalibrationEvent>) -> Vec<CalibrationEvent> {
    let mut events = Vec::new();
    while let Ok(event) = rx.try_recv() {
        events.push(event);
    }
    events
}
