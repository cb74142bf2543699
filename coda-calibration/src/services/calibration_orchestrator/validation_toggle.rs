//! Reference / validation set moves
//!
//! An event with a non-zero Mw in exactly one of the two sets is moved to the
//! other one. Events found in both sets or in neither are left alone.

use super::CalibrationService;
use crate::db::CalibrationStore;
use crate::error::CalibrationResult;
use coda_common::model::{ReferenceMwParameters, ValidationMwParameters};
use std::collections::{BTreeMap, BTreeSet};

impl CalibrationService {
    /// Toggle each event between the reference and validation sets
    ///
    /// Returns one message per distinct event id describing what happened.
    /// Concurrent toggles through the same service are serialized.
    pub async fn toggle_validation_by_event_ids(&self, event_ids: &[String]) -> CalibrationResult<Vec<String>> {
        let _toggle = self.toggle_lock.lock().await;
        toggle_validation(self.store.as_ref(), event_ids).await
    }
}

/// Apply the toggle directly against a store
pub async fn toggle_validation(
    store: &dyn CalibrationStore,
    event_ids: &[String],
) -> CalibrationResult<Vec<String>> {
    let references: BTreeMap<String, ReferenceMwParameters> = store
        .reference_mws()
        .await?
        .into_iter()
        .filter(|r| r.ref_mw != 0.0)
        .map(|r| (r.event_id.clone(), r))
        .collect();
    let validation: BTreeMap<String, ValidationMwParameters> = store
        .validation_mws()
        .await?
        .into_iter()
        .filter(|v| v.mw != 0.0)
        .map(|v| (v.event_id.clone(), v))
        .collect();

    let mut to_validation: Vec<ValidationMwParameters> = Vec::new();
    let mut to_reference: Vec<ReferenceMwParameters> = Vec::new();
    let mut messages = Vec::new();

    let requested: BTreeSet<&String> = event_ids.iter().collect();
    for event_id in requested {
        match (references.get(event_id), validation.get(event_id)) {
            (Some(reference), None) => {
                to_validation.push(ValidationMwParameters::from(reference));
                messages.push(format!("Event {} moved from reference to validation", event_id));
            }
            (None, Some(held_back)) => {
                to_reference.push(ReferenceMwParameters::from(held_back));
                messages.push(format!("Event {} moved from validation to reference", event_id));
            }
            (Some(_), Some(_)) => {
                messages.push(format!(
                    "Event {} has both reference and validation values, left unchanged",
                    event_id
                ));
            }
            (None, None) => {
                messages.push(format!(
                    "Event {} has no reference or validation value, left unchanged",
                    event_id
                ));
            }
        }
    }

    if !to_validation.is_empty() {
        let ids: Vec<String> = to_validation.iter().map(|v| v.event_id.clone()).collect();
        store.save_validation_mws(&to_validation).await?;
        store.delete_reference_mws(&ids).await?;
    }
    if !to_reference.is_empty() {
        let ids: Vec<String> = to_reference.iter().map(|r| r.event_id.clone()).collect();
        store.save_reference_mws(&to_reference).await?;
        store.delete_validation_mws(&ids).await?;
    }

    tracing::info!(
        to_validation = to_validation.len(),
        to_reference = to_reference.len(),
        "Validation toggle applied"
    );

    Ok(messages)
}
