//! Calibration persistence
//!
//! One row per band for shared parameters, one per (station, band) for site
//! terms and one per event for each Mw set. Records are stored as JSON
//! payloads next to their key columns.

pub mod memory;
pub mod sqlite;

pub use memory::MemoryCalibrationStore;
pub use sqlite::SqliteCalibrationStore;

use crate::services::collaborators::{BandParameterMap, SiteParameterMap};
use anyhow::Result;
use coda_common::model::{
    MdacParametersFi, MdacParametersPs, MeasuredMwParameters, PathCalibrationMeasurement,
    PeakVelocityMeasurement, Phase, ReferenceMwParameters, SharedFrequencyBandParameters,
    SyntheticCoda, ValidationMwParameters,
};
use sqlx::sqlite::SqlitePoolOptions;
use sqlx::SqlitePool;
use std::path::Path;

/// Storage used by the calibration pipeline
///
/// Shared parameters and Mw sets are upserted by key; site parameters, path
/// diagnostics, velocity measurements and synthetics are replaced wholesale.
#[async_trait::async_trait]
pub trait CalibrationStore: Send + Sync {
    async fn shared_parameters(&self) -> coda_common::Result<BandParameterMap>;

    /// Insert or overwrite one row per band
    async fn save_shared_parameters(
        &self,
        params: &[SharedFrequencyBandParameters],
    ) -> coda_common::Result<()>;

    async fn site_parameters(&self) -> coda_common::Result<SiteParameterMap>;

    /// Drop every stored site term, then store `params`
    async fn replace_site_parameters(&self, params: &SiteParameterMap) -> coda_common::Result<()>;

    async fn measured_mws(&self) -> coda_common::Result<Vec<MeasuredMwParameters>>;

    /// Insert or overwrite by event id
    async fn save_measured_mws(&self, mws: &[MeasuredMwParameters]) -> coda_common::Result<()>;

    async fn replace_measured_mws(&self, mws: &[MeasuredMwParameters]) -> coda_common::Result<()>;

    async fn reference_mws(&self) -> coda_common::Result<Vec<ReferenceMwParameters>>;

    async fn save_reference_mws(&self, mws: &[ReferenceMwParameters]) -> coda_common::Result<()>;

    async fn delete_reference_mws(&self, event_ids: &[String]) -> coda_common::Result<()>;

    async fn validation_mws(&self) -> coda_common::Result<Vec<ValidationMwParameters>>;

    async fn save_validation_mws(&self, mws: &[ValidationMwParameters]) -> coda_common::Result<()>;

    async fn delete_validation_mws(&self, event_ids: &[String]) -> coda_common::Result<()>;

    async fn path_measurements(&self) -> coda_common::Result<Vec<PathCalibrationMeasurement>>;

    async fn replace_path_measurements(
        &self,
        measurements: &[PathCalibrationMeasurement],
    ) -> coda_common::Result<()>;

    async fn velocity_measurements(&self) -> coda_common::Result<Vec<PeakVelocityMeasurement>>;

    async fn replace_velocity_measurements(
        &self,
        measurements: &[PeakVelocityMeasurement],
    ) -> coda_common::Result<()>;

    async fn synthetics(&self) -> coda_common::Result<Vec<SyntheticCoda>>;

    async fn replace_synthetics(&self, synthetics: &[SyntheticCoda]) -> coda_common::Result<()>;

    /// Remove velocity measurements and synthetics from a previous run
    async fn clear_intermediate(&self) -> coda_common::Result<()>;

    /// Remove every intermediate and result record
    ///
    /// Shared parameters, reference and validation Mws and MDAC parameters
    /// are inputs and survive.
    async fn clear_results(&self) -> coda_common::Result<()>;

    /// Stored source parameters, or the defaults
    async fn mdac_fi(&self) -> coda_common::Result<MdacParametersFi>;

    async fn save_mdac_fi(&self, fi: &MdacParametersFi) -> coda_common::Result<()>;

    /// Stored parameters for `phase`, or the defaults for it
    async fn mdac_ps(&self, phase: Phase) -> coda_common::Result<MdacParametersPs>;

    async fn save_mdac_ps(&self, ps: &MdacParametersPs) -> coda_common::Result<()>;
}

/// Open (creating if needed) the calibration database
pub async fn init_database_pool(db_path: &Path) -> Result<SqlitePool> {
    if let Some(parent) = db_path.parent() {
        std::fs::create_dir_all(parent)?;
    }

    let db_url = format!("sqlite://{}?mode=rwc", db_path.display());
    tracing::debug!("Connecting to database: {}", db_url);

    let pool = SqlitePool::connect(&db_url).await?;

    sqlx::query("PRAGMA journal_mode = WAL").execute(&pool).await?;
    sqlx::query("PRAGMA busy_timeout = 5000").execute(&pool).await?;

    init_tables(&pool).await?;

    Ok(pool)
}

/// Private in-memory database with the calibration tables
///
/// Limited to one connection: every SQLite memory connection is its own
/// database.
pub async fn init_memory_pool() -> Result<SqlitePool> {
    let pool = SqlitePoolOptions::new()
        .max_connections(1)
        .connect("sqlite::memory:")
        .await?;
    init_tables(&pool).await?;
    Ok(pool)
}

/// Create calibration tables if they don't exist
pub async fn init_tables(pool: &SqlitePool) -> Result<()> {
    let statements = [
        r#"
        CREATE TABLE IF NOT EXISTS shared_parameters (
            low_frequency REAL NOT NULL,
            high_frequency REAL NOT NULL,
            payload TEXT NOT NULL,
            updated_at TEXT NOT NULL,
            PRIMARY KEY (low_frequency, high_frequency)
        )
        "#,
        r#"
        CREATE TABLE IF NOT EXISTS site_parameters (
            network_name TEXT NOT NULL,
            station_name TEXT NOT NULL,
            low_frequency REAL NOT NULL,
            high_frequency REAL NOT NULL,
            site_term REAL NOT NULL,
            payload TEXT NOT NULL,
            PRIMARY KEY (network_name, station_name, low_frequency, high_frequency)
        )
        "#,
        r#"
        CREATE TABLE IF NOT EXISTS measured_mw (
            event_id TEXT PRIMARY KEY,
            payload TEXT NOT NULL
        )
        "#,
        r#"
        CREATE TABLE IF NOT EXISTS reference_mw (
            event_id TEXT PRIMARY KEY,
            payload TEXT NOT NULL
        )
        "#,
        r#"
        CREATE TABLE IF NOT EXISTS validation_mw (
            event_id TEXT PRIMARY KEY,
            payload TEXT NOT NULL
        )
        "#,
        r#"
        CREATE TABLE IF NOT EXISTS path_measurements (
            low_frequency REAL NOT NULL,
            high_frequency REAL NOT NULL,
            payload TEXT NOT NULL,
            PRIMARY KEY (low_frequency, high_frequency)
        )
        "#,
        r#"
        CREATE TABLE IF NOT EXISTS velocity_measurements (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            waveform_id INTEGER NOT NULL,
            payload TEXT NOT NULL
        )
        "#,
        r#"
        CREATE TABLE IF NOT EXISTS synthetics (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            waveform_id INTEGER NOT NULL,
            payload TEXT NOT NULL
        )
        "#,
        r#"
        CREATE TABLE IF NOT EXISTS mdac_fi (
            id INTEGER PRIMARY KEY CHECK (id = 1),
            payload TEXT NOT NULL
        )
        "#,
        r#"
        CREATE TABLE IF NOT EXISTS mdac_ps (
            phase TEXT PRIMARY KEY,
            payload TEXT NOT NULL
        )
        "#,
    ];

    for statement in statements {
        sqlx::query(statement).execute(pool).await?;
    }

    tracing::info!("Calibration tables initialized");

    Ok(())
}
