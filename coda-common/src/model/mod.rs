//! Domain model shared by the calibration pipeline
//!
//! Every calibration parameter set is keyed by a [`FrequencyBand`]. Events and
//! stations are immutable and only used as map keys and for distances.

mod frequency_band;
mod location;
mod measurements;
mod mw;
mod parameters;

pub use frequency_band::FrequencyBand;
pub use location::{great_circle_distance_km, Event, Station};
pub use measurements::{
    PeakVelocityMeasurement, SpectraMeasurement, SyntheticCoda, Waveform, WaveformPick,
    CODA_END_PICK,
};
pub use mw::{MeasuredMwParameters, ReferenceMwParameters, ValidationMwParameters};
pub use parameters::{
    MdacParametersFi, MdacParametersPs, PathCalibrationMeasurement, Phase,
    ShapeFitterConstraints, SharedFrequencyBandParameters, SharedParametersOverlay,
    SiteFrequencyBandParameters, VelocityConfiguration,
};
