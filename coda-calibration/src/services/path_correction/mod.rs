//! Path Correction Optimizer
//!
//! Fits the shared path terms (p1, q, xc, xt) of every band independently.
//! Each band runs a multi-start CMA-ES over the robust residual cost, with a
//! free site offset for every station that observes two or more events. The
//! site offsets only absorb station bias during the fit and are discarded;
//! site terms proper come from the site correction solver.
//!
//! Bands are processed in parallel on the rayon pool, and so are the starts
//! within a band. Callers on the async runtime must run this inside
//! `spawn_blocking`.

pub mod cmaes;
pub mod cost;
pub mod start_points;

use crate::services::collaborators::BandParameterMap;
use cmaes::{Cmaes, CmaesOptions, CmaesOutcome};
use coda_common::config::CalibrationSettings;
use coda_common::model::{
    PathCalibrationMeasurement, SharedFrequencyBandParameters, SharedParametersOverlay,
    SpectraMeasurement,
};
use coda_common::FrequencyBand;
use cost::PathCostFunction;
use rayon::prelude::*;
use start_points::ParameterBounds;
use std::collections::BTreeMap;

/// Optimizer knobs
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PathOptimizerSettings {
    /// Start from all 16 corners of the shared box instead of two
    pub aggressive: bool,
    /// Evaluation cap per start
    pub max_evaluations: u64,
    pub phase_speed_kms: f64,
}

impl Default for PathOptimizerSettings {
    fn default() -> Self {
        Self {
            aggressive: true,
            max_evaluations: 1_000_000,
            phase_speed_kms: 3.5,
        }
    }
}

impl From<&CalibrationSettings> for PathOptimizerSettings {
    fn from(settings: &CalibrationSettings) -> Self {
        Self {
            aggressive: settings.aggressive_path_optimization,
            max_evaluations: settings.max_path_evaluations,
            phase_speed_kms: settings.phase_speed_kms,
        }
    }
}

/// Result of fitting one band
#[derive(Debug, Clone, PartialEq)]
pub struct BandFit {
    pub band: FrequencyBand,
    /// New path terms; `None` when the current terms are kept
    pub overlay: Option<SharedParametersOverlay>,
    pub measurement: PathCalibrationMeasurement,
    pub initial_cost: f64,
    pub final_cost: f64,
}

/// Everything a path calibration produces
#[derive(Debug, Clone, Default, PartialEq)]
pub struct PathCorrectionOutcome {
    /// Path-term overlays for the bands that were fit
    pub overlays: BTreeMap<FrequencyBand, SharedParametersOverlay>,
    /// Residual diagnostics, one per band with fittable data
    pub measurements: Vec<PathCalibrationMeasurement>,
}

pub struct PathCorrectionOptimizer {
    settings: PathOptimizerSettings,
}

impl PathCorrectionOptimizer {
    pub fn new(settings: PathOptimizerSettings) -> Self {
        Self { settings }
    }

    pub fn settings(&self) -> &PathOptimizerSettings {
        &self.settings
    }

    /// Fit every band present in `params`
    ///
    /// Spectra for bands missing from `params` are ignored. Every band with
    /// fittable data gets a diagnostic; only bands whose fit improved on the
    /// current terms get an overlay.
    pub fn optimize(
        &self,
        spectra: &[SpectraMeasurement],
        params: &BandParameterMap,
    ) -> PathCorrectionOutcome {
        let mut by_band: BTreeMap<FrequencyBand, Vec<&SpectraMeasurement>> = BTreeMap::new();
        for s in spectra {
            if params.contains_key(&s.band()) {
                by_band.entry(s.band()).or_default().push(s);
            }
        }

        tracing::info!(
            bands = params.len(),
            spectra = spectra.len(),
            aggressive = self.settings.aggressive,
            "Path calibration starting"
        );

        let fits: Vec<BandFit> = params
            .par_iter()
            .filter_map(|(band, current)| {
                let band_spectra = by_band.get(band).map(Vec::as_slice).unwrap_or(&[]);
                self.optimize_band(*band, current, band_spectra)
            })
            .collect();

        let mut outcome = PathCorrectionOutcome::default();
        for fit in fits {
            outcome.measurements.push(fit.measurement);
            if let Some(overlay) = fit.overlay {
                outcome.overlays.insert(fit.band, overlay);
            }
        }
        outcome.measurements.sort_by(|a, b| a.band.cmp(&b.band));

        tracing::info!(fitted = outcome.overlays.len(), "Path calibration finished");
        outcome
    }

    /// Fit one band from its current parameters
    pub fn optimize_band(
        &self,
        band: FrequencyBand,
        current: &SharedFrequencyBandParameters,
        spectra: &[&SpectraMeasurement],
    ) -> Option<BandFit> {
        if spectra.is_empty() {
            tracing::warn!(band = %band, "No spectra for band, path terms left unchanged");
            return None;
        }

        let cost_fn = PathCostFunction::new(band, spectra.iter().copied(), self.settings.phase_speed_kms);
        if cost_fn.is_empty() {
            tracing::warn!(
                band = %band,
                "No event in band is observed by two or more stations, path terms left unchanged"
            );
            return None;
        }

        let bounds = ParameterBounds::with_sites(cost_fn.site_stations().len());
        let initial = start_points::initial_point(current, &bounds);
        let initial_cost = cost_fn.cost(&initial);
        let starts = start_points::start_points(&bounds, self.settings.aggressive);

        tracing::debug!(
            band = %band,
            events = cost_fn.event_count(),
            sites = cost_fn.site_stations().len(),
            starts = starts.len(),
            initial_cost,
            "Fitting band"
        );

        let results: Vec<Option<CmaesOutcome>> = starts
            .par_iter()
            .enumerate()
            .map(|(i, start)| {
                let options = CmaesOptions {
                    max_evaluations: self.settings.max_evaluations,
                    seed: start_seed(band, i),
                    ..Default::default()
                };
                Cmaes::new(&bounds, options).minimize(|x| cost_fn.cost(x), start)
            })
            .collect();

        let converged = results.iter().filter(|r| r.is_some()).count();
        // Strictly lower wins so the earliest start keeps ties
        let best = results
            .into_iter()
            .flatten()
            .fold(None::<CmaesOutcome>, |best, candidate| match best {
                Some(b) if b.cost <= candidate.cost => Some(b),
                _ => Some(candidate),
            });

        let (overlay, final_cost) = settle(band, best, initial_cost);

        tracing::debug!(
            band = %band,
            converged,
            initial_cost,
            final_cost,
            "Band fit complete"
        );

        Some(BandFit {
            band,
            overlay,
            measurement: PathCalibrationMeasurement {
                band,
                initial_residual: cost_fn.residual(initial_cost),
                final_residual: cost_fn.residual(final_cost),
            },
            initial_cost,
            final_cost,
        })
    }
}

/// Overlay and final cost for a band's best start
///
/// Current terms are kept (no overlay, final cost = initial cost) when no
/// start converged or the best one is worse than the starting point.
fn settle(
    band: FrequencyBand,
    best: Option<CmaesOutcome>,
    initial_cost: f64,
) -> (Option<SharedParametersOverlay>, f64) {
    match best {
        Some(best) if best.cost <= initial_cost => (Some(start_points::to_overlay(&best.point)), best.cost),
        Some(_) => {
            tracing::info!(band = %band, "Fit did not improve on current terms, path terms left unchanged");
            (None, initial_cost)
        }
        None => {
            tracing::error!(band = %band, "No optimizer start converged, path terms left unchanged");
            (None, initial_cost)
        }
    }
}

fn start_seed(band: FrequencyBand, start_index: usize) -> u64 {
    band.low.to_bits() ^ band.high.to_bits().rotate_left(17) ^ start_index as u64
}
