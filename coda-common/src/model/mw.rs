//! Moment magnitude records

use serde::{Deserialize, Serialize};

/// Fitted Mw and apparent stress for one event, with uncertainty bounds
///
/// `*_1_*` bounds are the one-standard-error envelope of the fit, `*_2_*`
/// the two-standard-error envelope.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct MeasuredMwParameters {
    pub event_id: String,
    pub mw: f64,
    pub apparent_stress_in_mpa: f64,
    pub mw_1_min: f64,
    pub mw_1_max: f64,
    pub mw_2_min: f64,
    pub mw_2_max: f64,
    pub apparent_stress_1_min: f64,
    pub apparent_stress_1_max: f64,
    pub apparent_stress_2_min: f64,
    pub apparent_stress_2_max: f64,
    pub misfit: f64,
    pub corner_frequency: f64,
    pub data_count: u32,
    /// Distinct stations contributing to the fit
    pub station_count: u32,
    /// Fraction of known bands with a measurement for this event
    pub band_coverage: f64,
    pub iterations: u32,
}

impl MeasuredMwParameters {
    pub fn new(event_id: impl Into<String>, mw: f64) -> Self {
        Self {
            event_id: event_id.into(),
            mw,
            ..Default::default()
        }
    }
}

/// Ground-truth magnitude used to anchor site terms
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReferenceMwParameters {
    pub event_id: String,
    pub ref_mw: f64,
    /// Known apparent stress, when the event's spectrum shape is constrained
    pub ref_apparent_stress_in_mpa: Option<f64>,
}

impl ReferenceMwParameters {
    pub fn new(event_id: impl Into<String>, ref_mw: f64) -> Self {
        Self {
            event_id: event_id.into(),
            ref_mw,
            ref_apparent_stress_in_mpa: None,
        }
    }

    pub fn with_apparent_stress(mut self, stress_in_mpa: f64) -> Self {
        self.ref_apparent_stress_in_mpa = Some(stress_in_mpa);
        self
    }

    /// A usable apparent stress (present and non-zero)
    pub fn ground_truth_stress(&self) -> Option<f64> {
        self.ref_apparent_stress_in_mpa.filter(|s| *s != 0.0 && s.is_finite())
    }
}

/// Ground-truth magnitude held back from calibration for validation
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ValidationMwParameters {
    pub event_id: String,
    pub mw: f64,
    pub apparent_stress_in_mpa: Option<f64>,
}

impl From<&ReferenceMwParameters> for ValidationMwParameters {
    fn from(reference: &ReferenceMwParameters) -> Self {
        Self {
            event_id: reference.event_id.clone(),
            mw: reference.ref_mw,
            apparent_stress_in_mpa: reference.ref_apparent_stress_in_mpa,
        }
    }
}

impl From<&ValidationMwParameters> for ReferenceMwParameters {
    fn from(validation: &ValidationMwParameters) -> Self {
        Self {
            event_id: validation.event_id.clone(),
            ref_mw: validation.mw,
            ref_apparent_stress_in_mpa: validation.apparent_stress_in_mpa,
        }
    }
}
