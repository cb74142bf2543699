//! Site Correction / Mw Solver
//!
//! Resolves the per-station site bias left in path-corrected amplitudes and
//! hands per-event band averages to the Mw fitter.
//!
//! 1. Reference events anchor a first site term per (station, band): the mean
//!    of `theoretical source - path corrected` over the reference events the
//!    station recorded.
//! 2. Those terms are applied to every non-validation event to estimate the
//!    event's band amplitude net of site effects.
//! 3. Final site terms are the mean of `event estimate - path corrected`.
//! 4. Event band means are recomputed with the final terms, along with each
//!    event's station count and band coverage.
//! 5. Band weights are derived from the spread of those means.
//!
//! Every pass is a fold per band. Bands run on the rayon pool and their
//! partial results are gathered into sorted maps, so results do not depend
//! on thread scheduling.

use crate::error::CalibrationResult;
use crate::services::collaborators::{
    BandAmplitude, MwFitInput, MwFitter, SiteParameterMap, SourceSpectrumModel,
};
use crate::services::mdac::LOG10_NM_TO_DYNE_CM;
use coda_common::config::CalibrationSettings;
use coda_common::model::{
    MdacParametersFi, MdacParametersPs, MeasuredMwParameters, ReferenceMwParameters,
    SiteFrequencyBandParameters, SpectraMeasurement, Station,
};
use coda_common::stats::SummaryStatistics;
use coda_common::FrequencyBand;
use rayon::prelude::*;
use std::collections::{BTreeMap, BTreeSet};
use std::sync::Arc;

const MAX_BAND_WEIGHT: f64 = 2.0;

/// Spectra of one band, by event id then station
type BandGroup<'a> = BTreeMap<&'a str, BTreeMap<&'a Station, &'a SpectraMeasurement>>;

type StationStats<'a> = BTreeMap<&'a Station, SummaryStatistics>;
type EventStats<'a> = BTreeMap<&'a str, SummaryStatistics>;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SiteSolverSettings {
    /// Drop reference bands above the event's own corner frequency when
    /// other references carry a known apparent stress
    pub spectra_truncation: bool,
}

impl Default for SiteSolverSettings {
    fn default() -> Self {
        Self {
            spectra_truncation: true,
        }
    }
}

impl From<&CalibrationSettings> for SiteSolverSettings {
    fn from(settings: &CalibrationSettings) -> Self {
        Self {
            spectra_truncation: settings.spectra_truncation,
        }
    }
}

/// Inputs to one site calibration
#[derive(Debug, Clone, Copy)]
pub struct SiteCorrectionRequest<'a> {
    pub spectra: &'a [SpectraMeasurement],
    pub references: &'a [ReferenceMwParameters],
    /// Events held back from calibration
    pub validation_event_ids: &'a BTreeSet<String>,
    pub fi: &'a MdacParametersFi,
    pub ps: &'a MdacParametersPs,
}

/// Site terms and event averages before the Mw fit
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SiteTerms {
    pub site_parameters: SiteParameterMap,
    pub fit_inputs: Vec<MwFitInput>,
}

/// Everything a site calibration produces
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SiteCorrectionOutcome {
    /// Complete replacement for the stored site parameters
    pub site_parameters: SiteParameterMap,
    pub fit_inputs: Vec<MwFitInput>,
    /// Fitted Mws annotated with station count and band coverage
    pub measured_mws: Vec<MeasuredMwParameters>,
}

pub struct SiteCorrectionSolver {
    settings: SiteSolverSettings,
    source_model: Arc<dyn SourceSpectrumModel>,
    mw_fitter: Arc<dyn MwFitter>,
}

impl SiteCorrectionSolver {
    pub fn new(
        settings: SiteSolverSettings,
        source_model: Arc<dyn SourceSpectrumModel>,
        mw_fitter: Arc<dyn MwFitter>,
    ) -> Self {
        Self {
            settings,
            source_model,
            mw_fitter,
        }
    }

    /// Compute site terms, then fit Mws from the site-corrected averages
    pub fn solve(&self, request: SiteCorrectionRequest<'_>) -> CalibrationResult<SiteCorrectionOutcome> {
        let terms = self.site_terms(request);

        let mut measured_mws = self
            .mw_fitter
            .fit_mws(&terms.fit_inputs, request.fi, request.ps)?;

        annotate_fit_quality(&mut measured_mws, &terms.fit_inputs);

        tracing::info!(
            site_terms = terms.site_parameters.values().map(BTreeMap::len).sum::<usize>(),
            events = terms.fit_inputs.len(),
            measured = measured_mws.len(),
            "Site calibration finished"
        );

        Ok(SiteCorrectionOutcome {
            site_parameters: terms.site_parameters,
            fit_inputs: terms.fit_inputs,
            measured_mws,
        })
    }

    /// Passes 1 through 5, without the Mw fit
    pub fn site_terms(&self, request: SiteCorrectionRequest<'_>) -> SiteTerms {
        let groups = group_by_band(request.spectra);
        let references: BTreeMap<&str, &ReferenceMwParameters> = request
            .references
            .iter()
            .map(|r| (r.event_id.as_str(), r))
            .collect();
        let has_ground_truth = request
            .references
            .iter()
            .any(|r| r.ground_truth_stress().is_some());
        let is_calibration_event = |event_id: &str| !request.validation_event_ids.contains(event_id);

        if references.is_empty() {
            tracing::warn!("No reference events, site terms cannot be anchored");
        }

        // Pass 1: reference-anchored terms
        let reference_terms: BTreeMap<FrequencyBand, StationStats> = groups
            .par_iter()
            .map(|(band, events)| {
                let terms = events
                    .iter()
                    .filter_map(|(event_id, stations)| {
                        let reference = references.get(event_id)?;
                        let theory =
                            self.reference_amplitude(*band, reference, has_ground_truth, request.fi, request.ps)?;
                        Some(station_offsets(stations, theory))
                    })
                    .fold(StationStats::new(), merge_station_stats);
                (*band, terms)
            })
            .collect();

        // Pass 2: event estimates from the reference terms
        let first_estimates: BTreeMap<FrequencyBand, EventStats> = groups
            .par_iter()
            .map(|(band, events)| {
                let terms = reference_terms.get(band);
                (*band, corrected_event_means(events, terms, &is_calibration_event))
            })
            .collect();

        // Pass 3: final site terms
        let final_terms: BTreeMap<FrequencyBand, StationStats> = groups
            .par_iter()
            .map(|(band, events)| {
                let estimates = first_estimates.get(band);
                let terms = events
                    .iter()
                    .filter(|(event_id, _)| is_calibration_event(**event_id))
                    .filter_map(|(event_id, stations)| {
                        let estimate = estimates?.get(event_id)?;
                        Some(station_offsets(stations, estimate.mean()))
                    })
                    .fold(StationStats::new(), merge_station_stats);
                (*band, terms)
            })
            .collect();

        // Pass 4: event band means with the final terms, every event included
        let final_estimates: BTreeMap<FrequencyBand, EventStats> = groups
            .par_iter()
            .map(|(band, events)| (*band, corrected_event_means(events, final_terms.get(band), &|_: &str| true)))
            .collect();

        let site_parameters = to_site_parameters(&final_terms);
        let fit_inputs = build_fit_inputs(
            &groups,
            &final_terms,
            &final_estimates,
            &references,
            has_ground_truth,
        );

        SiteTerms {
            site_parameters,
            fit_inputs,
        }
    }

    /// Theoretical log10 amplitude (dyne-cm) of a reference event in a band
    ///
    /// `None` when truncation excludes the band for this event.
    fn reference_amplitude(
        &self,
        band: FrequencyBand,
        reference: &ReferenceMwParameters,
        has_ground_truth: bool,
        fi: &MdacParametersFi,
        ps: &MdacParametersPs,
    ) -> Option<f64> {
        let center = band.center();
        let fi = match reference.ground_truth_stress() {
            Some(stress) => MdacParametersFi {
                sigma: stress,
                psi: 0.0,
                ..fi.clone()
            },
            None => fi.clone(),
        };

        if self.settings.spectra_truncation && has_ground_truth && reference.ground_truth_stress().is_none() {
            let corner = self.source_model.corner_frequency(ps, &fi, reference.ref_mw);
            if center > corner {
                tracing::trace!(
                    event_id = %reference.event_id,
                    band = %band,
                    corner,
                    "Band above reference corner frequency, skipped"
                );
                return None;
            }
        }

        let theory = self.source_model.log10_moment(ps, &fi, reference.ref_mw, center) + LOG10_NM_TO_DYNE_CM;
        theory.is_finite().then_some(theory)
    }
}

fn group_by_band(spectra: &[SpectraMeasurement]) -> BTreeMap<FrequencyBand, BandGroup<'_>> {
    let mut groups: BTreeMap<FrequencyBand, BandGroup<'_>> = BTreeMap::new();
    for s in spectra {
        if !s.waveform.is_valid() {
            continue;
        }
        groups
            .entry(s.band())
            .or_default()
            .entry(s.event().event_id.as_str())
            .or_default()
            .insert(s.station(), s);
    }
    groups
}

/// One event's `level - path corrected` per station
fn station_offsets<'a>(
    stations: &BTreeMap<&'a Station, &'a SpectraMeasurement>,
    level: f64,
) -> StationStats<'a> {
    let mut partial = StationStats::new();
    for (station, spectra) in stations {
        add_finite(partial.entry(*station).or_default(), level - spectra.path_corrected);
    }
    partial
}

/// Fold step: merge one event's partial station statistics
fn merge_station_stats<'a>(mut acc: StationStats<'a>, partial: StationStats<'a>) -> StationStats<'a> {
    for (station, stats) in partial {
        acc.entry(station).or_default().merge(&stats);
    }
    acc
}

fn add_finite(stats: &mut SummaryStatistics, value: f64) {
    if value.is_finite() {
        stats.add_value(value);
    }
}

/// Per-event mean of `path corrected + site term` over stations with a term
fn corrected_event_means<'a>(
    events: &BandGroup<'a>,
    terms: Option<&StationStats<'a>>,
    include: &(dyn Fn(&str) -> bool + Sync),
) -> EventStats<'a> {
    let mut means = EventStats::new();
    let Some(terms) = terms else {
        return means;
    };
    for (event_id, stations) in events {
        if !include(*event_id) {
            continue;
        }
        for (station, spectra) in stations {
            let Some(term) = terms.get(station).filter(|t| t.n() > 0) else {
                continue;
            };
            add_finite(means.entry(*event_id).or_default(), spectra.path_corrected + term.mean());
        }
    }
    means.retain(|_, stats| stats.n() > 0);
    means
}

fn to_site_parameters(terms: &BTreeMap<FrequencyBand, StationStats<'_>>) -> SiteParameterMap {
    let mut site_parameters = SiteParameterMap::new();
    for (band, stations) in terms {
        let entries: BTreeMap<Station, SiteFrequencyBandParameters> = stations
            .iter()
            .filter(|(_, stats)| stats.n() > 0)
            .map(|(station, stats)| {
                (
                    (*station).clone(),
                    SiteFrequencyBandParameters {
                        station: (*station).clone(),
                        band: *band,
                        site_term: stats.mean(),
                    },
                )
            })
            .collect();
        if !entries.is_empty() {
            site_parameters.insert(*band, entries);
        }
    }
    site_parameters
}

/// Copy station count and band coverage from the fit inputs onto the fits
pub fn annotate_fit_quality(measured: &mut [MeasuredMwParameters], inputs: &[MwFitInput]) {
    let by_event: BTreeMap<&str, &MwFitInput> = inputs
        .iter()
        .map(|input| (input.event_id.as_str(), input))
        .collect();
    for mw in measured {
        if let Some(input) = by_event.get(mw.event_id.as_str()) {
            mw.station_count = input.station_count;
            mw.band_coverage = input.band_coverage;
        }
    }
}

/// Pass 5 weighting of one band mean
///
/// `min(2, 1 / standard error)`, or 1.0 when the spread is unusable.
pub fn band_weight(stats: &SummaryStatistics) -> f64 {
    if stats.n() < 2 {
        return 1.0;
    }
    let sd = stats.standard_deviation();
    let se = stats.standard_error();
    if !sd.is_finite() || !se.is_finite() || sd == 0.0 || se == 0.0 {
        return 1.0;
    }
    (1.0 / se).min(MAX_BAND_WEIGHT)
}

fn build_fit_inputs(
    groups: &BTreeMap<FrequencyBand, BandGroup<'_>>,
    final_terms: &BTreeMap<FrequencyBand, StationStats<'_>>,
    estimates: &BTreeMap<FrequencyBand, EventStats<'_>>,
    references: &BTreeMap<&str, &ReferenceMwParameters>,
    has_ground_truth: bool,
) -> Vec<MwFitInput> {
    let total_bands = groups.len().max(1) as f64;

    let mut per_event: BTreeMap<&str, BTreeMap<FrequencyBand, SummaryStatistics>> = BTreeMap::new();
    for (band, events) in estimates {
        for (event_id, stats) in events {
            per_event.entry(*event_id).or_default().insert(*band, *stats);
        }
    }

    let mut stations_per_event: BTreeMap<&str, BTreeSet<&Station>> = BTreeMap::new();
    for (band, events) in groups {
        let Some(terms) = final_terms.get(band) else {
            continue;
        };
        for (event_id, stations) in events {
            for station in stations.keys() {
                if terms.get(station).is_some_and(|t| t.n() > 0) {
                    stations_per_event.entry(*event_id).or_default().insert(*station);
                }
            }
        }
    }

    per_event
        .into_iter()
        .map(|(event_id, bands)| {
            let reference = references.get(event_id).map(|r| (*r).clone());
            let uniform = has_ground_truth
                && reference
                    .as_ref()
                    .and_then(|r| r.ground_truth_stress())
                    .is_none();
            let band_coverage = bands.len() as f64 / total_bands;
            let bands = bands
                .into_iter()
                .map(|(band, stats)| {
                    let weight = if uniform { 1.0 } else { band_weight(&stats) };
                    (
                        band,
                        BandAmplitude {
                            mean: stats.mean(),
                            standard_deviation: stats.standard_deviation(),
                            count: stats.n(),
                            weight,
                        },
                    )
                })
                .collect();
            MwFitInput {
                event_id: event_id.to_string(),
                bands,
                station_count: stations_per_event.get(event_id).map(|s| s.len()).unwrap_or(0) as u32,
                band_coverage,
                reference,
            }
        })
        .collect()
}
