//! Pure transformations between pipeline stages

use crate::services::collaborators::{BandAmplitude, BandParameterMap, MwFitInput, SiteParameterMap};
use crate::services::site_correction::band_weight;
use coda_common::model::{
    PeakVelocityMeasurement, ReferenceMwParameters, SharedFrequencyBandParameters,
    SharedParametersOverlay, SpectraMeasurement, Station, Waveform,
};
use coda_common::stats::SummaryStatistics;
use coda_common::FrequencyBand;
use std::collections::{BTreeMap, BTreeSet};

/// Keep measurements whose band is known and whose SNR reaches the band minimum
pub fn snr_filter(
    measurements: Vec<PeakVelocityMeasurement>,
    params: &BandParameterMap,
) -> Vec<PeakVelocityMeasurement> {
    let before = measurements.len();
    let kept: Vec<PeakVelocityMeasurement> = measurements
        .into_iter()
        .filter(|m| {
            params
                .get(&m.waveform.band)
                .is_some_and(|p| m.snr >= p.min_snr)
        })
        .collect();
    tracing::debug!(before, after = kept.len(), "SNR filter applied");
    kept
}

/// Waveforms of the measurements that carry a coda end pick
pub fn end_picked_waveforms(measurements: &[PeakVelocityMeasurement]) -> Vec<Waveform> {
    measurements
        .iter()
        .filter(|m| m.waveform.is_end_picked())
        .map(|m| m.waveform.clone())
        .collect()
}

/// Field-merge each overlay into its band; overlays for unknown bands are dropped
pub fn merge_overlays(
    params: &BandParameterMap,
    overlays: &BTreeMap<FrequencyBand, SharedParametersOverlay>,
) -> BandParameterMap {
    params
        .iter()
        .map(|(band, current)| {
            let merged = match overlays.get(band) {
                Some(overlay) => current.merge(overlay),
                None => current.clone(),
            };
            (*band, merged)
        })
        .collect()
}

/// Merged parameters of the bands an overlay touched, ready to persist
pub fn updated_parameters(
    params: &BandParameterMap,
    overlays: &BTreeMap<FrequencyBand, SharedParametersOverlay>,
) -> Vec<SharedFrequencyBandParameters> {
    overlays
        .keys()
        .filter_map(|band| params.get(band).cloned())
        .collect()
}

/// Drop waveforms recorded at stations without any site term
pub fn restrict_to_site_stations(waveforms: Vec<Waveform>, sites: &SiteParameterMap) -> Vec<Waveform> {
    let calibrated: BTreeSet<&Station> = sites.values().flat_map(|stations| stations.keys()).collect();
    waveforms
        .into_iter()
        .filter(|w| calibrated.contains(&w.station))
        .collect()
}

/// Fit inputs built straight from path and site corrected amplitudes
///
/// Used when site terms already exist, so the band mean of an event is the
/// plain average of its corrected station amplitudes.
pub fn fit_inputs_from_corrected(
    spectra: &[SpectraMeasurement],
    references: &[ReferenceMwParameters],
) -> Vec<MwFitInput> {
    let references: BTreeMap<&str, &ReferenceMwParameters> =
        references.iter().map(|r| (r.event_id.as_str(), r)).collect();
    let has_ground_truth = references.values().any(|r| r.ground_truth_stress().is_some());

    let mut bands_seen: BTreeSet<FrequencyBand> = BTreeSet::new();
    let mut per_event: BTreeMap<&str, BTreeMap<FrequencyBand, SummaryStatistics>> = BTreeMap::new();
    let mut stations: BTreeMap<&str, BTreeSet<&Station>> = BTreeMap::new();
    for s in spectra {
        if !s.waveform.is_valid() || !s.path_and_site_corrected.is_finite() {
            continue;
        }
        let event_id = s.event().event_id.as_str();
        bands_seen.insert(s.band());
        per_event
            .entry(event_id)
            .or_default()
            .entry(s.band())
            .or_default()
            .add_value(s.path_and_site_corrected);
        stations.entry(event_id).or_default().insert(s.station());
    }

    let total_bands = bands_seen.len().max(1) as f64;
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
                    (
                        band,
                        BandAmplitude {
                            mean: stats.mean(),
                            standard_deviation: stats.standard_deviation(),
                            count: stats.n(),
                            weight: if uniform { 1.0 } else { band_weight(&stats) },
                        },
                    )
                })
                .collect();
            MwFitInput {
                event_id: event_id.to_string(),
                bands,
                station_count: stations.get(event_id).map(BTreeSet::len).unwrap_or(0) as u32,
                band_coverage,
                reference,
            }
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use coda_common::model::{Event, SiteFrequencyBandParameters, WaveformPick};

    fn band() -> FrequencyBand {
        FrequencyBand::new(1.0, 2.0)
    }

    fn waveform(id: i64, event: &str, station: &str) -> Waveform {
        Waveform::new(
            id,
            Event::new(event, 0.0, 0.0),
            Station::new("XX", station, 1.0, 1.0),
            band(),
        )
    }

    fn velocity(waveform: Waveform, snr: f64) -> PeakVelocityMeasurement {
        PeakVelocityMeasurement {
            waveform,
            time_sec_from_origin: 10.0,
            snr,
            velocity: 3.0,
            amplitude: 1.0,
            distance: 100.0,
        }
    }

    fn params(min_snr: f64) -> BandParameterMap {
        let mut p = SharedFrequencyBandParameters::new(band());
        p.min_snr = min_snr;
        BandParameterMap::from([(band(), p)])
    }

    fn spectra(event: &str, station: &str, corrected: f64) -> SpectraMeasurement {
        SpectraMeasurement {
            waveform: waveform(1, event, station),
            raw_at_start: 0.0,
            raw_at_measurement_time: 0.0,
            path_corrected: 0.0,
            path_and_site_corrected: corrected,
            start_cut_sec: 0.0,
            end_cut_sec: 0.0,
            rms_fit: 0.0,
        }
    }

    #[test]
    fn test_snr_filter_threshold_and_unknown_band() {
        let mut stray = waveform(3, "e1", "C");
        stray.band = FrequencyBand::new(4.0, 8.0);
        let kept = snr_filter(
            vec![
                velocity(waveform(1, "e1", "A"), 1.9),
                velocity(waveform(2, "e1", "B"), 2.0),
                velocity(stray, 50.0),
            ],
            &params(2.0),
        );
        assert_eq!(kept.len(), 1);
        assert_eq!(kept[0].waveform.id, 2);
    }

    #[test]
    fn test_end_picked_filter() {
        let picked = waveform(1, "e1", "A").with_picks(vec![WaveformPick::new("F", 90.0)]);
        let measurements = vec![velocity(picked, 5.0), velocity(waveform(2, "e1", "B"), 5.0)];
        let waveforms = end_picked_waveforms(&measurements);
        assert_eq!(waveforms.len(), 1);
        assert_eq!(waveforms[0].id, 1);
    }

    #[test]
    fn test_merge_overlays_ignores_unknown_bands() {
        let base = params(2.0);
        let overlays = BTreeMap::from([
            (band(), SharedParametersOverlay::path_terms(0.01, 0.5, 300.0, 50.0, 2.0)),
            (
                FrequencyBand::new(8.0, 16.0),
                SharedParametersOverlay::path_terms(0.1, 0.1, 1.0, 1.0, 1.0),
            ),
        ]);
        let merged = merge_overlays(&base, &overlays);
        assert_eq!(merged.len(), 1);
        assert_eq!(merged[&band()].q, 300.0);
        assert_eq!(merged[&band()].min_snr, 2.0);
        assert_eq!(updated_parameters(&merged, &overlays).len(), 1);
    }

    #[test]
    fn test_restrict_to_site_stations() {
        let station = Station::new("XX", "A", 1.0, 1.0);
        let sites = SiteParameterMap::from([(
            band(),
            BTreeMap::from([(
                station.clone(),
                SiteFrequencyBandParameters {
                    station,
                    band: band(),
                    site_term: 0.2,
                },
            )]),
        )]);
        let kept = restrict_to_site_stations(vec![waveform(1, "e1", "A"), waveform(2, "e1", "B")], &sites);
        assert_eq!(kept.len(), 1);
        assert_eq!(kept[0].station.station_name, "A");
    }

    #[test]
    fn test_fit_inputs_from_corrected() {
        let inputs = fit_inputs_from_corrected(
            &[spectra("e1", "A", 20.0), spectra("e1", "B", 22.0), spectra("e2", "A", f64::NAN)],
            &[ReferenceMwParameters::new("e1", 4.0)],
        );
        assert_eq!(inputs.len(), 1);
        let input = &inputs[0];
        assert_eq!(input.event_id, "e1");
        assert_eq!(input.station_count, 2);
        assert_eq!(input.band_coverage, 1.0);
        assert!(input.reference.is_some());
        let amplitude = input.bands[&band()];
        assert_eq!(amplitude.mean, 21.0);
        assert_eq!(amplitude.count, 2);
    }
}
