//! Measurement records exchanged between pipeline stages
//!
//! These are plain values. A stage that changes picks or amplitudes returns a
//! fresh record instead of mutating the one it was given, so records handed to
//! parallel workers are never aliased.

use super::{Event, FrequencyBand, Station};
use serde::{Deserialize, Serialize};

/// Pick type marking the end of the usable coda
pub const CODA_END_PICK: &str = "F";

/// A time pick attached to a waveform
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WaveformPick {
    pub pick_type: String,
    pub pick_name: String,
    pub time_sec_from_origin: f64,
}

impl WaveformPick {
    pub fn new(pick_type: impl Into<String>, time_sec_from_origin: f64) -> Self {
        let pick_type = pick_type.into();
        Self {
            pick_name: pick_type.clone(),
            pick_type,
            time_sec_from_origin,
        }
    }

    pub fn is_coda_end(&self) -> bool {
        self.pick_type.trim().eq_ignore_ascii_case(CODA_END_PICK)
    }
}

/// A stacked coda envelope for one (event, station, band)
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Waveform {
    pub id: i64,
    pub event: Event,
    pub station: Station,
    pub band: FrequencyBand,
    pub active: bool,
    pub picks: Vec<WaveformPick>,
}

impl Waveform {
    pub fn new(id: i64, event: Event, station: Station, band: FrequencyBand) -> Self {
        Self {
            id,
            event,
            station,
            band,
            active: true,
            picks: Vec::new(),
        }
    }

    /// Returns a copy carrying `picks` instead of the current pick list
    pub fn with_picks(&self, picks: Vec<WaveformPick>) -> Self {
        Self {
            picks,
            ..self.clone()
        }
    }

    /// Event, station and band are all usable
    pub fn is_valid(&self) -> bool {
        !self.event.event_id.is_empty() && !self.station.station_name.is_empty() && self.band.is_valid()
    }

    pub fn coda_end_pick(&self) -> Option<&WaveformPick> {
        self.picks.iter().find(|p| p.is_coda_end())
    }

    /// Carries a coda end pick after the origin time
    pub fn is_end_picked(&self) -> bool {
        self.coda_end_pick()
            .map(|p| p.time_sec_from_origin > 0.0)
            .unwrap_or(false)
    }
}

/// Peak velocity / SNR measurement for one waveform
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PeakVelocityMeasurement {
    pub waveform: Waveform,
    pub time_sec_from_origin: f64,
    pub snr: f64,
    pub velocity: f64,
    pub amplitude: f64,
    pub distance: f64,
}

/// A synthetic coda generated from shared band parameters
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SyntheticCoda {
    pub source_waveform: Waveform,
    pub source_velocity: f64,
    pub source_beta: f64,
    pub source_gamma: f64,
}

/// Coda amplitude measured at three correction stages
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SpectraMeasurement {
    pub waveform: Waveform,
    pub raw_at_start: f64,
    pub raw_at_measurement_time: f64,
    pub path_corrected: f64,
    pub path_and_site_corrected: f64,
    pub start_cut_sec: f64,
    pub end_cut_sec: f64,
    pub rms_fit: f64,
}

impl SpectraMeasurement {
    pub fn event(&self) -> &Event {
        &self.waveform.event
    }

    pub fn station(&self) -> &Station {
        &self.waveform.station
    }

    pub fn band(&self) -> FrequencyBand {
        self.waveform.band
    }
}
