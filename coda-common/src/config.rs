//! Bootstrap configuration loading
//!
//! Configuration file resolution follows this priority order:
//! 1. Explicit path argument (highest priority)
//! 2. `CODA_CONFIG` environment variable
//! 3. `<config dir>/coda/config.toml`
//! 4. Built-in defaults (fallback)
//!
//! A missing file is not an error: a warning is logged and defaults are used.
//! A file that exists but cannot be parsed is an error.

use crate::{Error, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use tracing::{info, warn};

/// Environment variable naming an explicit config file
pub const CONFIG_ENV_VAR: &str = "CODA_CONFIG";

/// Top-level configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CodaConfig {
    /// Path to SQLite database file
    #[serde(default = "default_database_path")]
    pub database_path: PathBuf,

    #[serde(default)]
    pub logging: LoggingConfig,

    #[serde(default)]
    pub calibration: CalibrationSettings,
}

impl Default for CodaConfig {
    fn default() -> Self {
        Self {
            database_path: default_database_path(),
            logging: LoggingConfig::default(),
            calibration: CalibrationSettings::default(),
        }
    }
}

/// Logging configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// Log level (trace, debug, info, warn, error)
    #[serde(default = "default_log_level")]
    pub level: String,

    /// Log file path (optional, logs to stderr if not specified)
    #[serde(default)]
    pub file: Option<PathBuf>,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            file: None,
        }
    }
}

/// Calibration tuning knobs
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CalibrationSettings {
    /// Measurement pool execution slots
    pub worker_threads: usize,
    /// Measurement jobs that may wait for a slot before submissions are refused
    pub worker_queue_depth: usize,
    pub measurement_timeout_secs: u64,
    /// Start the path optimizer from every corner of the parameter box
    pub aggressive_path_optimization: bool,
    pub max_path_evaluations: u64,
    /// Drop reference spectra above the event's own corner frequency
    pub spectra_truncation: bool,
    pub phase_speed_kms: f64,
}

impl Default for CalibrationSettings {
    fn default() -> Self {
        let workers = std::thread::available_parallelism()
            .map(|n| n.get())
            .unwrap_or(4);
        Self {
            worker_threads: workers,
            worker_queue_depth: workers * 4,
            measurement_timeout_secs: 4 * 60 * 60,
            aggressive_path_optimization: true,
            max_path_evaluations: 1_000_000,
            spectra_truncation: true,
            phase_speed_kms: 3.5,
        }
    }
}

fn default_database_path() -> PathBuf {
    dirs::data_local_dir()
        .map(|d| d.join("coda").join("calibration.db"))
        .unwrap_or_else(|| PathBuf::from("./coda_data/calibration.db"))
}

fn default_log_level() -> String {
    "info".to_string()
}

impl CodaConfig {
    /// Resolve and load configuration
    ///
    /// `explicit` takes priority over the environment and the platform
    /// config directory.
    pub fn load(explicit: Option<&Path>) -> Result<Self> {
        match resolve_config_path(explicit) {
            Some(path) if path.exists() => Self::from_file(&path),
            Some(path) => {
                warn!("Config file {:?} not found, using defaults", path);
                Ok(Self::default())
            }
            None => {
                warn!("No config directory available, using defaults");
                Ok(Self::default())
            }
        }
    }

    /// Parse configuration from a TOML file
    pub fn from_file(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .map_err(|e| Error::Config(format!("Failed to read config file {:?}: {}", path, e)))?;
        let config: CodaConfig = toml::from_str(&content)
            .map_err(|e| Error::Config(format!("Failed to parse TOML: {}", e)))?;
        config.validate()?;
        info!("Loaded configuration from {:?}", path);
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        let c = &self.calibration;
        if c.worker_threads == 0 {
            return Err(Error::Config("calibration.worker_threads must be at least 1".into()));
        }
        if c.max_path_evaluations == 0 {
            return Err(Error::Config("calibration.max_path_evaluations must be at least 1".into()));
        }
        if !(c.phase_speed_kms.is_finite() && c.phase_speed_kms > 0.0) {
            return Err(Error::Config(format!(
                "calibration.phase_speed_kms must be positive, got {}",
                c.phase_speed_kms
            )));
        }
        Ok(())
    }
}

/// Pick the config file path by priority, without checking it exists
pub fn resolve_config_path(explicit: Option<&Path>) -> Option<PathBuf> {
    if let Some(path) = explicit {
        return Some(path.to_path_buf());
    }
    if let Ok(path) = std::env::var(CONFIG_ENV_VAR) {
        if !path.trim().is_empty() {
            return Some(PathBuf::from(path));
        }
    }
    dirs::config_dir().map(|d| d.join("coda").join("config.toml"))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = CodaConfig::default();
        assert_eq!(config.logging.level, "info");
        assert!(config.logging.file.is_none());
        assert!(config.calibration.worker_threads >= 1);
        assert_eq!(config.calibration.measurement_timeout_secs, 14_400);
        assert!(config.calibration.aggressive_path_optimization);
        assert_eq!(config.calibration.phase_speed_kms, 3.5);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_partial_toml_fills_defaults() {
        let config: CodaConfig = toml::from_str(
            r#"
            database_path = "/tmp/coda.db"

            [calibration]
            worker_threads = 2
            aggressive_path_optimization = false
            "#,
        )
        .unwrap();
        assert_eq!(config.database_path, PathBuf::from("/tmp/coda.db"));
        assert_eq!(config.calibration.worker_threads, 2);
        assert!(!config.calibration.aggressive_path_optimization);
        assert_eq!(config.calibration.max_path_evaluations, 1_000_000);
        assert_eq!(config.logging.level, "info");
    }

    #[test]
    fn test_validate_rejects_zero_workers() {
        let mut config = CodaConfig::default();
        config.calibration.worker_threads = 0;
        assert!(matches!(config.validate(), Err(Error::Config(_))));
    }
}
