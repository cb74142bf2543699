//! SQLite-backed [`CalibrationStore`]

use super::CalibrationStore;
use crate::services::collaborators::{BandParameterMap, SiteParameterMap};
use chrono::Utc;
use coda_common::model::{
    MdacParametersFi, MdacParametersPs, MeasuredMwParameters, PathCalibrationMeasurement,
    PeakVelocityMeasurement, Phase, ReferenceMwParameters, SharedFrequencyBandParameters,
    SiteFrequencyBandParameters, SyntheticCoda, ValidationMwParameters,
};
use coda_common::Result;
use serde::de::DeserializeOwned;
use serde::Serialize;
use sqlx::SqlitePool;

#[derive(Debug, Clone)]
pub struct SqliteCalibrationStore {
    pool: SqlitePool,
}

impl SqliteCalibrationStore {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }

    async fn payloads<T: DeserializeOwned + Send>(&self, sql: &str) -> Result<Vec<T>> {
        let rows: Vec<String> = sqlx::query_scalar(sql).fetch_all(&self.pool).await?;
        rows.iter().map(|p| from_json(p)).collect()
    }

    async fn upsert_by_event<T: Serialize + Sync>(
        &self,
        table: &str,
        rows: &[(&str, &T)],
    ) -> Result<()> {
        let sql = format!(
            "INSERT INTO {table} (event_id, payload) VALUES (?, ?) \
             ON CONFLICT(event_id) DO UPDATE SET payload = excluded.payload"
        );
        let mut tx = self.pool.begin().await?;
        for (event_id, row) in rows {
            sqlx::query(&sql)
                .bind(*event_id)
                .bind(to_json(*row)?)
                .execute(&mut *tx)
                .await?;
        }
        tx.commit().await?;
        Ok(())
    }

    async fn delete_events(&self, table: &str, event_ids: &[String]) -> Result<()> {
        let sql = format!("DELETE FROM {table} WHERE event_id = ?");
        let mut tx = self.pool.begin().await?;
        for event_id in event_ids {
            sqlx::query(&sql).bind(event_id).execute(&mut *tx).await?;
        }
        tx.commit().await?;
        Ok(())
    }

    /// Replace every row of a `(waveform_id, payload)` table
    async fn replace_waveform_rows<T: Serialize + Sync>(
        &self,
        table: &str,
        rows: &[(i64, &T)],
    ) -> Result<()> {
        let insert = format!("INSERT INTO {table} (waveform_id, payload) VALUES (?, ?)");
        let mut tx = self.pool.begin().await?;
        sqlx::query(&format!("DELETE FROM {table}"))
            .execute(&mut *tx)
            .await?;
        for (waveform_id, row) in rows {
            sqlx::query(&insert)
                .bind(*waveform_id)
                .bind(to_json(*row)?)
                .execute(&mut *tx)
                .await?;
        }
        tx.commit().await?;
        Ok(())
    }
}

fn to_json<T: Serialize + ?Sized>(value: &T) -> Result<String> {
    Ok(serde_json::to_string(value)?)
}

fn from_json<T: DeserializeOwned>(payload: &str) -> Result<T> {
    Ok(serde_json::from_str(payload)?)
}

fn phase_key(phase: Phase) -> Result<String> {
    // Serialized form is the quoted upper-case name
    Ok(to_json(&phase)?.trim_matches('"').to_string())
}

#[async_trait::async_trait]
impl CalibrationStore for SqliteCalibrationStore {
    async fn shared_parameters(&self) -> Result<BandParameterMap> {
        let params: Vec<SharedFrequencyBandParameters> = self
            .payloads("SELECT payload FROM shared_parameters ORDER BY low_frequency, high_frequency")
            .await?;
        Ok(params.into_iter().map(|p| (p.band, p)).collect())
    }

    async fn save_shared_parameters(&self, params: &[SharedFrequencyBandParameters]) -> Result<()> {
        let now = Utc::now().to_rfc3339();
        let mut tx = self.pool.begin().await?;
        for p in params {
            sqlx::query(
                r#"
                INSERT INTO shared_parameters (low_frequency, high_frequency, payload, updated_at)
                VALUES (?, ?, ?, ?)
                ON CONFLICT(low_frequency, high_frequency) DO UPDATE SET
                    payload = excluded.payload,
                    updated_at = excluded.updated_at
                "#,
            )
            .bind(p.band.low)
            .bind(p.band.high)
            .bind(to_json(p)?)
            .bind(&now)
            .execute(&mut *tx)
            .await?;
        }
        tx.commit().await?;
        tracing::debug!(bands = params.len(), "Shared parameters saved");
        Ok(())
    }

    async fn site_parameters(&self) -> Result<SiteParameterMap> {
        let rows: Vec<SiteFrequencyBandParameters> = self
            .payloads("SELECT payload FROM site_parameters ORDER BY low_frequency, high_frequency, network_name, station_name")
            .await?;
        let mut map = SiteParameterMap::new();
        for row in rows {
            map.entry(row.band).or_default().insert(row.station.clone(), row);
        }
        Ok(map)
    }

    async fn replace_site_parameters(&self, params: &SiteParameterMap) -> Result<()> {
        let mut tx = self.pool.begin().await?;
        sqlx::query("DELETE FROM site_parameters")
            .execute(&mut *tx)
            .await?;
        let mut count = 0usize;
        for row in params.values().flat_map(|stations| stations.values()) {
            sqlx::query(
                r#"
                INSERT INTO site_parameters (
                    network_name, station_name, low_frequency, high_frequency, site_term, payload
                ) VALUES (?, ?, ?, ?, ?, ?)
                "#,
            )
            .bind(&row.station.network_name)
            .bind(&row.station.station_name)
            .bind(row.band.low)
            .bind(row.band.high)
            .bind(row.site_term)
            .bind(to_json(row)?)
            .execute(&mut *tx)
            .await?;
            count += 1;
        }
        tx.commit().await?;
        tracing::debug!(rows = count, "Site parameters replaced");
        Ok(())
    }

    async fn measured_mws(&self) -> Result<Vec<MeasuredMwParameters>> {
        self.payloads("SELECT payload FROM measured_mw ORDER BY event_id").await
    }

    async fn save_measured_mws(&self, mws: &[MeasuredMwParameters]) -> Result<()> {
        let rows: Vec<(&str, &MeasuredMwParameters)> = mws.iter().map(|m| (m.event_id.as_str(), m)).collect();
        self.upsert_by_event("measured_mw", &rows).await
    }

    async fn replace_measured_mws(&self, mws: &[MeasuredMwParameters]) -> Result<()> {
        sqlx::query("DELETE FROM measured_mw").execute(&self.pool).await?;
        self.save_measured_mws(mws).await
    }

    async fn reference_mws(&self) -> Result<Vec<ReferenceMwParameters>> {
        self.payloads("SELECT payload FROM reference_mw ORDER BY event_id").await
    }

    async fn save_reference_mws(&self, mws: &[ReferenceMwParameters]) -> Result<()> {
        let rows: Vec<(&str, &ReferenceMwParameters)> = mws.iter().map(|m| (m.event_id.as_str(), m)).collect();
        self.upsert_by_event("reference_mw", &rows).await
    }

    async fn delete_reference_mws(&self, event_ids: &[String]) -> Result<()> {
        self.delete_events("reference_mw", event_ids).await
    }

    async fn validation_mws(&self) -> Result<Vec<ValidationMwParameters>> {
        self.payloads("SELECT payload FROM validation_mw ORDER BY event_id").await
    }

    async fn save_validation_mws(&self, mws: &[ValidationMwParameters]) -> Result<()> {
        let rows: Vec<(&str, &ValidationMwParameters)> = mws.iter().map(|m| (m.event_id.as_str(), m)).collect();
        self.upsert_by_event("validation_mw", &rows).await
    }

    async fn delete_validation_mws(&self, event_ids: &[String]) -> Result<()> {
        self.delete_events("validation_mw", event_ids).await
    }

    async fn path_measurements(&self) -> Result<Vec<PathCalibrationMeasurement>> {
        self.payloads("SELECT payload FROM path_measurements ORDER BY low_frequency, high_frequency")
            .await
    }

    async fn replace_path_measurements(&self, measurements: &[PathCalibrationMeasurement]) -> Result<()> {
        let mut tx = self.pool.begin().await?;
        sqlx::query("DELETE FROM path_measurements")
            .execute(&mut *tx)
            .await?;
        for m in measurements {
            sqlx::query(
                r#"
                INSERT INTO path_measurements (low_frequency, high_frequency, payload)
                VALUES (?, ?, ?)
                ON CONFLICT(low_frequency, high_frequency) DO UPDATE SET payload = excluded.payload
                "#,
            )
            .bind(m.band.low)
            .bind(m.band.high)
            .bind(to_json(m)?)
            .execute(&mut *tx)
            .await?;
        }
        tx.commit().await?;
        Ok(())
    }

    async fn velocity_measurements(&self) -> Result<Vec<PeakVelocityMeasurement>> {
        self.payloads("SELECT payload FROM velocity_measurements ORDER BY id").await
    }

    async fn replace_velocity_measurements(&self, measurements: &[PeakVelocityMeasurement]) -> Result<()> {
        let rows: Vec<(i64, &PeakVelocityMeasurement)> =
            measurements.iter().map(|m| (m.waveform.id, m)).collect();
        self.replace_waveform_rows("velocity_measurements", &rows).await
    }

    async fn synthetics(&self) -> Result<Vec<SyntheticCoda>> {
        self.payloads("SELECT payload FROM synthetics ORDER BY id").await
    }

    async fn replace_synthetics(&self, synthetics: &[SyntheticCoda]) -> Result<()> {
        let rows: Vec<(i64, &SyntheticCoda)> =
            synthetics.iter().map(|s| (s.source_waveform.id, s)).collect();
        self.replace_waveform_rows("synthetics", &rows).await
    }

    async fn clear_intermediate(&self) -> Result<()> {
        let mut tx = self.pool.begin().await?;
        sqlx::query("DELETE FROM velocity_measurements")
            .execute(&mut *tx)
            .await?;
        sqlx::query("DELETE FROM synthetics").execute(&mut *tx).await?;
        tx.commit().await?;
        Ok(())
    }

    async fn clear_results(&self) -> Result<()> {
        let mut tx = self.pool.begin().await?;
        for table in [
            "velocity_measurements",
            "synthetics",
            "path_measurements",
            "site_parameters",
            "measured_mw",
        ] {
            sqlx::query(&format!("DELETE FROM {table}"))
                .execute(&mut *tx)
                .await?;
        }
        tx.commit().await?;
        tracing::info!("Calibration results cleared");
        Ok(())
    }

    async fn mdac_fi(&self) -> Result<MdacParametersFi> {
        let payload: Option<String> = sqlx::query_scalar("SELECT payload FROM mdac_fi WHERE id = 1")
            .fetch_optional(&self.pool)
            .await?;
        match payload {
            Some(p) => from_json(&p),
            None => Ok(MdacParametersFi::default()),
        }
    }

    async fn save_mdac_fi(&self, fi: &MdacParametersFi) -> Result<()> {
        sqlx::query(
            "INSERT INTO mdac_fi (id, payload) VALUES (1, ?) \
             ON CONFLICT(id) DO UPDATE SET payload = excluded.payload",
        )
        .bind(to_json(fi)?)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn mdac_ps(&self, phase: Phase) -> Result<MdacParametersPs> {
        let payload: Option<String> = sqlx::query_scalar("SELECT payload FROM mdac_ps WHERE phase = ?")
            .bind(phase_key(phase)?)
            .fetch_optional(&self.pool)
            .await?;
        match payload {
            Some(p) => from_json(&p),
            None => Ok(MdacParametersPs {
                phase,
                ..Default::default()
            }),
        }
    }

    async fn save_mdac_ps(&self, ps: &MdacParametersPs) -> Result<()> {
        sqlx::query(
            "INSERT INTO mdac_ps (phase, payload) VALUES (?, ?) \
             ON CONFLICT(phase) DO UPDATE SET payload = excluded.payload",
        )
        .bind(phase_key(ps.phase)?)
        .bind(to_json(ps)?)
        .execute(&self.pool)
        .await?;
        Ok(())
    }
}
