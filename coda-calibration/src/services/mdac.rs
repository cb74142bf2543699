//! MDAC (Magnitude and Distance Amplitude Correction) source model
//!
//! Brune-style omega-square source spectrum whose corner frequency scales
//! with apparent stress: `sigma_a = sigma * (M0 / M0ref)^psi`.

use super::collaborators::SourceSpectrumModel;
use coda_common::model::{MdacParametersFi, MdacParametersPs};
use std::f64::consts::PI;

pub const MPA_TO_PA: f64 = 1e6;

/// log10 of the moment (N-m) to log10 dyne-cm
pub const LOG10_NM_TO_DYNE_CM: f64 = 7.0;

pub fn mw_to_log_m0(mw: f64) -> f64 {
    1.5 * mw + 9.1
}

pub fn mw_to_m0(mw: f64) -> f64 {
    10f64.powf(mw_to_log_m0(mw))
}

/// Source constant relating apparent stress and moment to corner frequency
pub fn source_constant(fi: &MdacParametersFi) -> f64 {
    let tmp_p = fi.radpat_p * fi.radpat_p * fi.zeta.powi(3) / fi.alpha_s.powi(5);
    let tmp_s = fi.radpat_s * fi.radpat_s / fi.beta_s.powi(5);
    16.0 * PI / (fi.beta_s * fi.beta_s * (tmp_p + tmp_s))
}

/// Evaluated MDAC source for one (phase, Mw)
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct MdacSource {
    pub m0: f64,
    /// Apparent stress in Pa
    pub apparent_stress: f64,
    /// Angular corner frequency (rad/s)
    pub angular_corner: f64,
}

impl MdacSource {
    pub fn new(ps: &MdacParametersPs, fi: &MdacParametersFi, mw: f64) -> Self {
        let m0 = mw_to_m0(mw);
        let apparent_stress = fi.sigma * MPA_TO_PA * (m0 / fi.m0_ref).powf(fi.psi);
        let wcs = (source_constant(fi) * apparent_stress / m0).cbrt();
        let angular_corner = if ps.phase.is_compressional() {
            fi.zeta * wcs
        } else {
            wcs
        };
        Self {
            m0,
            apparent_stress,
            angular_corner,
        }
    }

    /// Moment spectrum (N-m) at `frequency` Hz
    pub fn moment_at(&self, frequency: f64) -> f64 {
        let w = 2.0 * PI * frequency;
        self.m0 / (1.0 + (w / self.angular_corner).powi(2))
    }

    pub fn corner_frequency(&self) -> f64 {
        self.angular_corner / (2.0 * PI)
    }
}

/// Default [`SourceSpectrumModel`]
#[derive(Debug, Clone, Copy, Default)]
pub struct MdacModel;

impl SourceSpectrumModel for MdacModel {
    fn log10_moment(
        &self,
        ps: &MdacParametersPs,
        fi: &MdacParametersFi,
        mw: f64,
        frequency: f64,
    ) -> f64 {
        MdacSource::new(ps, fi, mw).moment_at(frequency).log10()
    }

    fn corner_frequency(&self, ps: &MdacParametersPs, fi: &MdacParametersFi, mw: f64) -> f64 {
        MdacSource::new(ps, fi, mw).corner_frequency()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use coda_common::model::Phase;

    fn lg() -> MdacParametersPs {
        MdacParametersPs::default()
    }

    #[test]
    fn test_moment_conversions() {
        assert!((mw_to_log_m0(4.0) - 15.1).abs() < 1e-12);
        assert!((mw_to_m0(5.0) - 10f64.powf(16.6)).abs() / mw_to_m0(5.0) < 1e-12);
    }

    #[test]
    fn test_low_frequency_plateau_is_m0() {
        let fi = MdacParametersFi::default();
        let model = MdacModel;
        let flat = model.log10_moment(&lg(), &fi, 4.0, 1e-6);
        assert!((flat - 15.1).abs() < 1e-6);

        // Spectrum is down by 3 dB (factor 2 in moment) at the corner
        let fc = model.corner_frequency(&lg(), &fi, 4.0);
        let at_corner = model.log10_moment(&lg(), &fi, 4.0, fc);
        assert!((at_corner - (15.1 - 2f64.log10())).abs() < 1e-9);
    }

    #[test]
    fn test_corner_frequency_decreases_with_magnitude() {
        let fi = MdacParametersFi::default();
        let small = MdacModel.corner_frequency(&lg(), &fi, 3.0);
        let large = MdacModel.corner_frequency(&lg(), &fi, 6.0);
        assert!(small > large);
        assert!(small.is_finite() && large > 0.0);
    }

    #[test]
    fn test_p_phase_scales_by_zeta() {
        let fi = MdacParametersFi {
            zeta: 1.5,
            ..Default::default()
        };
        let pg = MdacParametersPs {
            phase: Phase::Pg,
            ..Default::default()
        };
        let s = MdacModel.corner_frequency(&lg(), &fi, 4.0);
        let p = MdacModel.corner_frequency(&pg, &fi, 4.0);
        assert!((p / s - 1.5).abs() < 1e-12);
    }

    #[test]
    fn test_apparent_stress_scaling() {
        let flat = MdacParametersFi {
            psi: 0.0,
            ..Default::default()
        };
        let source = MdacSource::new(&lg(), &flat, 4.5);
        assert!((source.apparent_stress - flat.sigma * MPA_TO_PA).abs() < 1e-6);

        // A positive psi raises the stress of events above the reference moment
        let scaled = MdacParametersFi {
            psi: 0.25,
            m0_ref: mw_to_m0(4.0),
            ..Default::default()
        };
        let above = MdacSource::new(&lg(), &scaled, 5.0);
        assert!(above.apparent_stress > scaled.sigma * MPA_TO_PA);
    }
}
