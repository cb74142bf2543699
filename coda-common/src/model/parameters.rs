//! Calibration parameter sets
//!
//! Shared parameters are keyed by band and refreshed by field-merge; site
//! parameters are keyed by (station, band) and replaced wholesale on every
//! site calibration.

use super::{FrequencyBand, Station};
use serde::{Deserialize, Serialize};

/// Per-band model shared across all stations
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SharedFrequencyBandParameters {
    pub band: FrequencyBand,
    pub velocity0: f64,
    pub velocity1: f64,
    pub velocity2: f64,
    pub beta0: f64,
    pub beta1: f64,
    pub beta2: f64,
    pub gamma0: f64,
    pub gamma1: f64,
    pub gamma2: f64,
    pub min_snr: f64,
    /// Attenuation coefficient (near-field spreading exponent)
    pub p1: f64,
    /// Far-field spreading exponent
    pub p2: f64,
    /// Geometric spreading crossover distance (km)
    pub xc: f64,
    /// Geometric spreading transition width factor
    pub xt: f64,
    /// Quality factor
    pub q: f64,
    pub min_length: f64,
    pub max_length: f64,
    pub measurement_time: f64,
    pub coda_start_offset: f64,
}

impl SharedFrequencyBandParameters {
    pub fn new(band: FrequencyBand) -> Self {
        Self {
            band,
            velocity0: 0.0,
            velocity1: 0.0,
            velocity2: 0.0,
            beta0: 0.0,
            beta1: 0.0,
            beta2: 0.0,
            gamma0: 0.0,
            gamma1: 0.0,
            gamma2: 0.0,
            min_snr: 0.0,
            p1: 0.0,
            p2: 0.0,
            xc: 0.0,
            xt: 0.0,
            q: 0.0,
            min_length: 0.0,
            max_length: 0.0,
            measurement_time: 0.0,
            coda_start_offset: 0.0,
        }
    }

    /// Overlay `update` onto these parameters
    ///
    /// Fields present in the overlay win; absent fields keep this value.
    pub fn merge(&self, update: &SharedParametersOverlay) -> Self {
        let pick = |new: Option<f64>, old: f64| new.unwrap_or(old);
        Self {
            band: self.band,
            velocity0: pick(update.velocity0, self.velocity0),
            velocity1: pick(update.velocity1, self.velocity1),
            velocity2: pick(update.velocity2, self.velocity2),
            beta0: pick(update.beta0, self.beta0),
            beta1: pick(update.beta1, self.beta1),
            beta2: pick(update.beta2, self.beta2),
            gamma0: pick(update.gamma0, self.gamma0),
            gamma1: pick(update.gamma1, self.gamma1),
            gamma2: pick(update.gamma2, self.gamma2),
            min_snr: pick(update.min_snr, self.min_snr),
            p1: pick(update.p1, self.p1),
            p2: pick(update.p2, self.p2),
            xc: pick(update.xc, self.xc),
            xt: pick(update.xt, self.xt),
            q: pick(update.q, self.q),
            min_length: pick(update.min_length, self.min_length),
            max_length: pick(update.max_length, self.max_length),
            measurement_time: pick(update.measurement_time, self.measurement_time),
            coda_start_offset: pick(update.coda_start_offset, self.coda_start_offset),
        }
    }
}

/// Partial update to [`SharedFrequencyBandParameters`]
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SharedParametersOverlay {
    pub velocity0: Option<f64>,
    pub velocity1: Option<f64>,
    pub velocity2: Option<f64>,
    pub beta0: Option<f64>,
    pub beta1: Option<f64>,
    pub beta2: Option<f64>,
    pub gamma0: Option<f64>,
    pub gamma1: Option<f64>,
    pub gamma2: Option<f64>,
    pub min_snr: Option<f64>,
    pub p1: Option<f64>,
    pub p2: Option<f64>,
    pub xc: Option<f64>,
    pub xt: Option<f64>,
    pub q: Option<f64>,
    pub min_length: Option<f64>,
    pub max_length: Option<f64>,
    pub measurement_time: Option<f64>,
    pub coda_start_offset: Option<f64>,
}

impl SharedParametersOverlay {
    /// Overlay carrying only the path terms
    pub fn path_terms(p1: f64, p2: f64, q: f64, xc: f64, xt: f64) -> Self {
        Self {
            p1: Some(p1),
            p2: Some(p2),
            q: Some(q),
            xc: Some(xc),
            xt: Some(xt),
            ..Default::default()
        }
    }

    /// Overlay replacing every field of `params`
    pub fn full(params: &SharedFrequencyBandParameters) -> Self {
        Self {
            velocity0: Some(params.velocity0),
            velocity1: Some(params.velocity1),
            velocity2: Some(params.velocity2),
            beta0: Some(params.beta0),
            beta1: Some(params.beta1),
            beta2: Some(params.beta2),
            gamma0: Some(params.gamma0),
            gamma1: Some(params.gamma1),
            gamma2: Some(params.gamma2),
            min_snr: Some(params.min_snr),
            p1: Some(params.p1),
            p2: Some(params.p2),
            xc: Some(params.xc),
            xt: Some(params.xt),
            q: Some(params.q),
            min_length: Some(params.min_length),
            max_length: Some(params.max_length),
            measurement_time: Some(params.measurement_time),
            coda_start_offset: Some(params.coda_start_offset),
        }
    }
}

/// Per-station, per-band site term offset (log10 amplitude units)
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SiteFrequencyBandParameters {
    pub station: Station,
    pub band: FrequencyBand,
    pub site_term: f64,
}

/// Path fit diagnostics for one band
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PathCalibrationMeasurement {
    pub band: FrequencyBand,
    pub initial_residual: f64,
    pub final_residual: f64,
}

/// Seismic phase an MDAC parameter row applies to
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Phase {
    Pn,
    Pg,
    Sn,
    Lg,
}

impl Phase {
    /// Compressional phases use the P-wave corner frequency
    pub fn is_compressional(&self) -> bool {
        matches!(self, Phase::Pn | Phase::Pg)
    }
}

/// Velocity windows used by the measurement collaborators
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VelocityConfiguration {
    /// Phase speed used by the attenuation term (km/s)
    pub phase_speed_in_kms: f64,
    pub group_velocity1_in_kms_gt_distance: f64,
    pub group_velocity2_in_kms_gt_distance: f64,
    pub group_velocity1_in_kms_lt_distance: f64,
    pub group_velocity2_in_kms_lt_distance: f64,
    pub distance_threshold_in_km: f64,
}

impl Default for VelocityConfiguration {
    fn default() -> Self {
        Self {
            phase_speed_in_kms: 3.5,
            group_velocity1_in_kms_gt_distance: 4.7,
            group_velocity2_in_kms_gt_distance: 2.3,
            group_velocity1_in_kms_lt_distance: 3.9,
            group_velocity2_in_kms_lt_distance: 1.9,
            distance_threshold_in_km: 300.0,
        }
    }
}

/// Bounds handed to the envelope shape fitter
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ShapeFitterConstraints {
    pub min_intercept: f64,
    pub max_intercept: f64,
    pub min_beta: f64,
    pub max_beta: f64,
    pub min_gamma: f64,
    pub max_gamma: f64,
    pub iterations: u32,
    pub fitting_point_count: u32,
}

impl Default for ShapeFitterConstraints {
    fn default() -> Self {
        Self {
            min_intercept: 0.5,
            max_intercept: 20.0,
            min_beta: -4.0,
            max_beta: -1e-4,
            min_gamma: 0.001,
            max_gamma: 4.0,
            iterations: 10,
            fitting_point_count: 10_000,
        }
    }
}

/// Source (frequency-independent) MDAC parameters
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MdacParametersFi {
    /// Stress drop (MPa)
    pub sigma: f64,
    pub psi: f64,
    pub zeta: f64,
    /// Reference moment (N-m)
    pub m0_ref: f64,
    /// Source P velocity (m/s)
    pub alpha_s: f64,
    /// Source S velocity (m/s)
    pub beta_s: f64,
    pub rho_s: f64,
    pub radpat_p: f64,
    pub radpat_s: f64,
}

impl Default for MdacParametersFi {
    fn default() -> Self {
        Self {
            sigma: 0.3,
            psi: 0.0,
            zeta: 1.0,
            m0_ref: 1e16,
            alpha_s: 6000.0,
            beta_s: 3500.0,
            rho_s: 2700.0,
            radpat_p: 0.44,
            radpat_s: 0.6,
        }
    }
}

/// Phase-specific MDAC parameters
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MdacParametersPs {
    pub phase: Phase,
    pub q0: f64,
    pub gamma0: f64,
    pub u0: f64,
    pub eta: f64,
    pub dist_crit: f64,
    pub snr: f64,
}

impl Default for MdacParametersPs {
    fn default() -> Self {
        Self {
            phase: Phase::Lg,
            q0: 300.0,
            gamma0: 0.5,
            u0: 3.5,
            eta: 0.5,
            dist_crit: 100.0,
            snr: 2.0,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_merge_keeps_absent_fields() {
        let mut baseline = SharedFrequencyBandParameters::new(FrequencyBand::new(1.0, 2.0));
        baseline.velocity0 = 3.1;
        baseline.min_snr = 2.0;
        baseline.q = 100.0;

        let merged = baseline.merge(&SharedParametersOverlay::path_terms(0.001, 1.0, 450.0, 300.0, 4.0));

        assert_eq!(merged.velocity0, 3.1);
        assert_eq!(merged.min_snr, 2.0);
        assert_eq!(merged.q, 450.0);
        assert_eq!(merged.xc, 300.0);
        assert_eq!(merged.band, baseline.band);
    }

    #[test]
    fn test_full_overlay_replaces_everything() {
        let baseline = SharedFrequencyBandParameters::new(FrequencyBand::new(1.0, 2.0));
        let mut fitted = baseline.clone();
        fitted.beta1 = -0.7;
        fitted.gamma2 = 0.02;

        assert_eq!(baseline.merge(&SharedParametersOverlay::full(&fitted)), fitted);
    }

    #[test]
    fn test_phase_serialization() {
        let json = serde_json::to_string(&Phase::Lg).unwrap();
        assert_eq!(json, "\"LG\"");
        assert!(Phase::Pg.is_compressional());
        assert!(!Phase::Sn.is_compressional());
    }
}
