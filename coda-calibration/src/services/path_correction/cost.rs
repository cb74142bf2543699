//! Robust path residual cost
//!
//! Observed amplitudes are compared to an Extended Street-Herrmann spreading
//! plus Q attenuation prediction. Each event's residuals are centred on their
//! median before a pseudo-Huber penalty is applied, so a constant source
//! term per event never contributes cost.

use super::start_points::{P1_IDX, P2, Q_IDX, SHARED_TERMS, XCROSS_IDX, XTRANS_IDX};
use coda_common::model::{great_circle_distance_km, SpectraMeasurement, Station};
use coda_common::stats::median;
use coda_common::FrequencyBand;
use std::collections::BTreeMap;
use std::f64::consts::{LOG10_E, PI};

/// Pseudo-Huber transition width (log10 amplitude units)
pub const HUBER_DELTA: f64 = 0.5;

/// Distances below this are treated as this (km)
const MIN_DISTANCE_KM: f64 = 1e-3;

/// log10 Extended Street-Herrmann geometric spreading correction
///
/// Spreading rate `s1` below `xc / xt`, `s2` beyond `xc * xt`, with a linear
/// (in log distance) transition of the rate in between.
pub fn esh_log10(s1: f64, s2: f64, xc: f64, xt: f64, distance: f64) -> f64 {
    let xstart = xc / xt;
    let xend = xc * xt;

    if distance <= xstart {
        -s1 * distance.log10()
    } else if distance >= xend {
        let ds = s2 - s1;
        -s1 * xstart.log10() - (s1 + ds / 2.0) * (xend / xstart).log10() - s2 * (distance / xend).log10()
    } else {
        let s = (s2 - s1) / (xend / xstart).log10();
        let ds = s * (distance / xstart).log10();
        -s1 * xstart.log10() - (s1 + ds / 2.0) * (distance / xstart).log10()
    }
}

/// Cost contributed by one event's residuals
///
/// Zero for fewer than two residuals. Otherwise `delta^2` plus
/// `sqrt(1 + (d / delta)^2) - 1` for each deviation `d` from the median.
pub fn event_cost(residuals: &[f64]) -> f64 {
    if residuals.len() < 2 {
        return 0.0;
    }
    let Some(center) = median(residuals) else {
        return 0.0;
    };
    let spread: f64 = residuals
        .iter()
        .map(|r| {
            let d = (r - center) / HUBER_DELTA;
            (1.0 + d * d).sqrt() - 1.0
        })
        .sum();
    HUBER_DELTA * HUBER_DELTA + spread
}

#[derive(Debug, Clone, Copy)]
struct Observation {
    amplitude: f64,
    distance: f64,
    site: Option<usize>,
}

/// Path cost for one band, ready for repeated evaluation
#[derive(Debug, Clone)]
pub struct PathCostFunction {
    band: FrequencyBand,
    events: Vec<Vec<Observation>>,
    site_stations: Vec<Station>,
    data_count: usize,
    attenuation_scale: f64,
}

impl PathCostFunction {
    /// Group a band's spectra by event and station
    ///
    /// Invalid waveforms and spectra from other bands are ignored. A repeated
    /// (event, station) pair keeps the last measurement. Events seen by fewer
    /// than two stations are dropped. Stations observing at least two of the
    /// remaining events get a free site term.
    pub fn new<'a, I>(band: FrequencyBand, spectra: I, phase_speed_kms: f64) -> Self
    where
        I: IntoIterator<Item = &'a SpectraMeasurement>,
    {
        let mut grouped: BTreeMap<&str, BTreeMap<&Station, &SpectraMeasurement>> = BTreeMap::new();
        for s in spectra {
            if !s.waveform.is_valid() || s.band() != band {
                continue;
            }
            let previous = grouped
                .entry(s.event().event_id.as_str())
                .or_default()
                .insert(s.station(), s);
            if previous.is_some() {
                tracing::debug!(
                    band = %band,
                    event_id = %s.event().event_id,
                    station = %s.station().station_name,
                    "Same event/station pair seen more than once"
                );
            }
        }
        grouped.retain(|_, stations| stations.len() >= 2);

        let mut events_per_station: BTreeMap<&Station, usize> = BTreeMap::new();
        for stations in grouped.values() {
            for station in stations.keys() {
                *events_per_station.entry(*station).or_default() += 1;
            }
        }
        let site_stations: Vec<Station> = events_per_station
            .iter()
            .filter(|(_, n)| **n >= 2)
            .map(|(s, _)| (*s).clone())
            .collect();
        let site_index: BTreeMap<&Station, usize> = site_stations
            .iter()
            .enumerate()
            .map(|(i, s)| (s, SHARED_TERMS + i))
            .collect();

        let mut data_count = 0;
        let events = grouped
            .values()
            .map(|stations| {
                stations
                    .iter()
                    .map(|(station, spectra)| {
                        data_count += 1;
                        Observation {
                            amplitude: spectra.raw_at_measurement_time,
                            distance: great_circle_distance_km(spectra.event(), station)
                                .max(MIN_DISTANCE_KM),
                            site: site_index.get(station).copied(),
                        }
                    })
                    .collect()
            })
            .collect();

        Self {
            band,
            events,
            site_stations,
            data_count,
            attenuation_scale: PI * band.geometric_center() * LOG10_E / phase_speed_kms,
        }
    }

    pub fn band(&self) -> FrequencyBand {
        self.band
    }

    /// No event has two or more observing stations
    pub fn is_empty(&self) -> bool {
        self.events.is_empty()
    }

    pub fn event_count(&self) -> usize {
        self.events.len()
    }

    /// Observations contributing cost
    pub fn data_count(&self) -> usize {
        self.data_count
    }

    /// Stations carrying a free site term, in vector order
    pub fn site_stations(&self) -> &[Station] {
        &self.site_stations
    }

    pub fn dimension(&self) -> usize {
        SHARED_TERMS + self.site_stations.len()
    }

    /// Evaluate the cost of an optimization vector
    pub fn cost(&self, x: &[f64]) -> f64 {
        let p1 = 10f64.powf(x[P1_IDX]);
        let q = 10f64.powf(x[Q_IDX]);
        let xc = 10f64.powf(x[XCROSS_IDX]);
        let xt = 10f64.powf(10f64.powf(x[XTRANS_IDX]));
        let attenuation = self.attenuation_scale / q;

        let mut residuals = Vec::new();
        let mut total = 0.0;
        for observations in &self.events {
            residuals.clear();
            residuals.extend(observations.iter().map(|o| {
                let site = o.site.map(|i| x[i]).unwrap_or(0.0);
                let predicted = site + esh_log10(p1, P2, xc, xt, o.distance) - o.distance * attenuation;
                o.amplitude - predicted
            }));
            total += event_cost(&residuals);
        }
        total
    }

    /// Normalised residual diagnostic, `(cost / data_count)^2`
    pub fn residual(&self, cost: f64) -> f64 {
        (cost / self.data_count.max(1) as f64).powi(2)
    }
}
