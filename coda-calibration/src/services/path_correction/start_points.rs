//! Parameter layout, bounds and multi-start seeds for the path fit
//!
//! Optimization vector layout: `[log10 p1, log10 q, log10 xc, log10 log10 xt,
//! site_0, site_1, ...]`.

use coda_common::model::{SharedFrequencyBandParameters, SharedParametersOverlay};

pub const P1_IDX: usize = 0;
pub const Q_IDX: usize = 1;
pub const XCROSS_IDX: usize = 2;
pub const XTRANS_IDX: usize = 3;
pub const SHARED_TERMS: usize = 4;

const SHARED_LOWER: [f64; SHARED_TERMS] = [-10.0, 0.0, 0.0, -10.0];
const SHARED_UPPER: [f64; SHARED_TERMS] = [-0.001, 3.0, 3.0, 0.04];
const SITE_MIN: f64 = -10.0;
const SITE_MAX: f64 = 10.0;

/// Far-field spreading exponent, not fit
pub const P2: f64 = 1.0;

const DEFAULT_P1: f64 = 1e-4;
const DEFAULT_Q: f64 = 500.0;
const DEFAULT_XC: f64 = 500.0;
const DEFAULT_XT: f64 = 2.0;

/// Box constraints for one band's optimization vector
#[derive(Debug, Clone, PartialEq)]
pub struct ParameterBounds {
    pub lower: Vec<f64>,
    pub upper: Vec<f64>,
}

impl ParameterBounds {
    pub fn with_sites(site_count: usize) -> Self {
        let mut lower = SHARED_LOWER.to_vec();
        let mut upper = SHARED_UPPER.to_vec();
        lower.extend(std::iter::repeat(SITE_MIN).take(site_count));
        upper.extend(std::iter::repeat(SITE_MAX).take(site_count));
        Self { lower, upper }
    }

    pub fn dimension(&self) -> usize {
        self.lower.len()
    }

    /// Nearest point inside the box
    pub fn repair(&self, x: &[f64]) -> Vec<f64> {
        x.iter()
            .zip(self.lower.iter().zip(&self.upper))
            .map(|(v, (lo, hi))| v.clamp(*lo, *hi))
            .collect()
    }

    pub fn contains(&self, x: &[f64]) -> bool {
        x.len() == self.dimension()
            && x
                .iter()
                .zip(self.lower.iter().zip(&self.upper))
                .all(|(v, (lo, hi))| *v >= *lo && *v <= *hi)
    }

    fn midpoint(&self, i: usize) -> f64 {
        self.lower[i] + (self.upper[i] - self.lower[i]) / 2.0
    }
}

/// Deterministic starting points
///
/// Always the midpoint of the shared box. Aggressive mode adds all 16 corners
/// of the shared box; otherwise only the all-low and all-high corners. Site
/// offsets start at zero.
pub fn start_points(bounds: &ParameterBounds, aggressive: bool) -> Vec<Vec<f64>> {
    let dim = bounds.dimension();
    let base = |shared: [f64; SHARED_TERMS]| {
        let mut point = vec![0.0; dim];
        point[..SHARED_TERMS].copy_from_slice(&shared);
        point
    };

    let mut midpoint = [0.0; SHARED_TERMS];
    for (i, v) in midpoint.iter_mut().enumerate() {
        *v = bounds.midpoint(i);
    }
    let mut points = vec![base(midpoint)];

    if aggressive {
        for mask in 0..(1usize << SHARED_TERMS) {
            let mut corner = [0.0; SHARED_TERMS];
            for (i, v) in corner.iter_mut().enumerate() {
                *v = if mask & (1 << i) == 0 {
                    bounds.lower[i]
                } else {
                    bounds.upper[i]
                };
            }
            points.push(base(corner));
        }
    } else {
        points.push(base(SHARED_LOWER));
        points.push(base(SHARED_UPPER));
    }
    points
}

/// Starting vector from a band's current parameters
///
/// Falls back to the built-in defaults when the current terms have no
/// finite log-space image; the result is clamped into the box.
pub fn initial_point(current: &SharedFrequencyBandParameters, bounds: &ParameterBounds) -> Vec<f64> {
    let shared = log_terms(current.p1, current.q, current.xc, current.xt).unwrap_or([
        DEFAULT_P1.log10(),
        DEFAULT_Q.log10(),
        DEFAULT_XC.log10(),
        DEFAULT_XT.log10().log10(),
    ]);
    let mut point = vec![0.0; bounds.dimension()];
    point[..SHARED_TERMS].copy_from_slice(&shared);
    bounds.repair(&point)
}

fn log_terms(p1: f64, q: f64, xc: f64, xt: f64) -> Option<[f64; SHARED_TERMS]> {
    let terms = [p1.log10(), q.log10(), xc.log10(), xt.log10().log10()];
    terms.iter().all(|v| v.is_finite()).then_some(terms)
}

/// Linear-space path terms for an optimization vector
pub fn to_overlay(point: &[f64]) -> SharedParametersOverlay {
    SharedParametersOverlay::path_terms(
        10f64.powf(point[P1_IDX]),
        P2,
        10f64.powf(point[Q_IDX]),
        10f64.powf(point[XCROSS_IDX]),
        10f64.powf(10f64.powf(point[XTRANS_IDX])),
    )
}
