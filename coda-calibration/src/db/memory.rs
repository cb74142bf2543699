//! In-process [`CalibrationStore`] for tests and embedding

use super::CalibrationStore;
use crate::services::collaborators::{BandParameterMap, SiteParameterMap};
use coda_common::model::{
    MdacParametersFi, MdacParametersPs, MeasuredMwParameters, PathCalibrationMeasurement,
    PeakVelocityMeasurement, Phase, ReferenceMwParameters, SharedFrequencyBandParameters,
    SyntheticCoda, ValidationMwParameters,
};
use coda_common::Result;
use std::collections::{BTreeMap, HashMap};
use tokio::sync::RwLock;

#[derive(Debug, Default)]
struct State {
    shared: BandParameterMap,
    sites: SiteParameterMap,
    measured: BTreeMap<String, MeasuredMwParameters>,
    references: BTreeMap<String, ReferenceMwParameters>,
    validation: BTreeMap<String, ValidationMwParameters>,
    path: Vec<PathCalibrationMeasurement>,
    velocities: Vec<PeakVelocityMeasurement>,
    synthetics: Vec<SyntheticCoda>,
    fi: Option<MdacParametersFi>,
    ps: HashMap<Phase, MdacParametersPs>,
}

#[derive(Debug, Default)]
pub struct MemoryCalibrationStore {
    state: RwLock<State>,
}

impl MemoryCalibrationStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait::async_trait]
impl CalibrationStore for MemoryCalibrationStore {
    async fn shared_parameters(&self) -> Result<BandParameterMap> {
        Ok(self.state.read().await.shared.clone())
    }

    async fn save_shared_parameters(&self, params: &[SharedFrequencyBandParameters]) -> Result<()> {
        let mut state = self.state.write().await;
        for p in params {
            state.shared.insert(p.band, p.clone());
        }
        Ok(())
    }

    async fn site_parameters(&self) -> Result<SiteParameterMap> {
        Ok(self.state.read().await.sites.clone())
    }

    async fn replace_site_parameters(&self, params: &SiteParameterMap) -> Result<()> {
        self.state.write().await.sites = params.clone();
        Ok(())
    }

    async fn measured_mws(&self) -> Result<Vec<MeasuredMwParameters>> {
        Ok(self.state.read().await.measured.values().cloned().collect())
    }

    async fn save_measured_mws(&self, mws: &[MeasuredMwParameters]) -> Result<()> {
        let mut state = self.state.write().await;
        for mw in mws {
            state.measured.insert(mw.event_id.clone(), mw.clone());
        }
        Ok(())
    }

    async fn replace_measured_mws(&self, mws: &[MeasuredMwParameters]) -> Result<()> {
        self.state.write().await.measured = mws
            .iter()
            .map(|m| (m.event_id.clone(), m.clone()))
            .collect();
        Ok(())
    }

    async fn reference_mws(&self) -> Result<Vec<ReferenceMwParameters>> {
        Ok(self.state.read().await.references.values().cloned().collect())
    }

    async fn save_reference_mws(&self, mws: &[ReferenceMwParameters]) -> Result<()> {
        let mut state = self.state.write().await;
        for mw in mws {
            state.references.insert(mw.event_id.clone(), mw.clone());
        }
        Ok(())
    }

    async fn delete_reference_mws(&self, event_ids: &[String]) -> Result<()> {
        let mut state = self.state.write().await;
        for id in event_ids {
            state.references.remove(id);
        }
        Ok(())
    }

    async fn validation_mws(&self) -> Result<Vec<ValidationMwParameters>> {
        Ok(self.state.read().await.validation.values().cloned().collect())
    }

    async fn save_validation_mws(&self, mws: &[ValidationMwParameters]) -> Result<()> {
        let mut state = self.state.write().await;
        for mw in mws {
            state.validation.insert(mw.event_id.clone(), mw.clone());
        }
        Ok(())
    }

    async fn delete_validation_mws(&self, event_ids: &[String]) -> Result<()> {
        let mut state = self.state.write().await;
        for id in event_ids {
            state.validation.remove(id);
        }
        Ok(())
    }

    async fn path_measurements(&self) -> Result<Vec<PathCalibrationMeasurement>> {
        Ok(self.state.read().await.path.clone())
    }

    async fn replace_path_measurements(&self, measurements: &[PathCalibrationMeasurement]) -> Result<()> {
        self.state.write().await.path = measurements.to_vec();
        Ok(())
    }

    async fn velocity_measurements(&self) -> Result<Vec<PeakVelocityMeasurement>> {
        Ok(self.state.read().await.velocities.clone())
    }

    async fn replace_velocity_measurements(&self, measurements: &[PeakVelocityMeasurement]) -> Result<()> {
        self.state.write().await.velocities = measurements.to_vec();
        Ok(())
    }

    async fn synthetics(&self) -> Result<Vec<SyntheticCoda>> {
        Ok(self.state.read().await.synthetics.clone())
    }

    async fn replace_synthetics(&self, synthetics: &[SyntheticCoda]) -> Result<()> {
        self.state.write().await.synthetics = synthetics.to_vec();
        Ok(())
    }

    async fn clear_intermediate(&self) -> Result<()> {
        let mut state = self.state.write().await;
        state.velocities.clear();
        state.synthetics.clear();
        Ok(())
    }

    async fn clear_results(&self) -> Result<()> {
        let mut state = self.state.write().await;
        state.velocities.clear();
        state.synthetics.clear();
        state.path.clear();
        state.sites.clear();
        state.measured.clear();
        Ok(())
    }

    async fn mdac_fi(&self) -> Result<MdacParametersFi> {
        Ok(self.state.read().await.fi.clone().unwrap_or_default())
    }

    async fn save_mdac_fi(&self, fi: &MdacParametersFi) -> Result<()> {
        self.state.write().await.fi = Some(fi.clone());
        Ok(())
    }

    async fn mdac_ps(&self, phase: Phase) -> Result<MdacParametersPs> {
        Ok(self
            .state
            .read()
            .await
            .ps
            .get(&phase)
            .cloned()
            .unwrap_or(MdacParametersPs {
                phase,
                ..Default::default()
            }))
    }

    async fn save_mdac_ps(&self, ps: &MdacParametersPs) -> Result<()> {
        self.state.write().await.ps.insert(ps.phase, ps.clone());
        Ok(())
    }
}
