//! Calibration services
//!
//! The orchestrator drives the external collaborators and the two solvers;
//! the registry and schedulers govern which jobs may run.

pub mod calibration_orchestrator;
pub mod collaborators;
pub mod job_registry;
pub mod mdac;
pub mod path_correction;
pub mod scheduler;
pub mod site_correction;

pub use calibration_orchestrator::{
    toggle_validation, CalibrationRun, CalibrationService, MwReport, MwSelection, PipelineSettings,
};
pub use collaborators::{BandParameterMap, Collaborators, SiteParameterMap};
pub use job_registry::{JobGuard, JobRegistry};
pub use mdac::MdacModel;
pub use path_correction::{PathCorrectionOptimizer, PathCorrectionOutcome, PathOptimizerSettings};
pub use scheduler::{CalibrationScheduler, MeasurementHandle, MeasurementPool};
pub use site_correction::{SiteCorrectionOutcome, SiteCorrectionSolver, SiteSolverSettings};
