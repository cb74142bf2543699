//! Integration tests for reference / validation toggling and data clearing

mod helpers;

use coda_calibration::db::CalibrationStore;
use coda_common::events::CalibrationEvent;
use coda_common::model::{MeasuredMwParameters, ReferenceMwParameters, ValidationMwParameters};
use helpers::*;
use std::collections::BTreeSet;

fn ids<T>(rows: &[T], id: impl Fn(&T) -> &str) -> BTreeSet<String> {
    rows.iter().map(|r| id(r).to_string()).collect()
}

#[tokio::test]
async fn test_toggle_moves_between_sets() {
    let h = harness(HarnessOptions::default()).await;
    h.store
        .save_validation_mws(&[
            ValidationMwParameters {
                event_id: "e3".into(),
                mw: 3.9,
                apparent_stress_in_mpa: Some(0.5),
            },
            ValidationMwParameters {
                event_id: "e5".into(),
                mw: 4.2,
                apparent_stress_in_mpa: None,
            },
        ])
        .await
        .unwrap();
    h.store
        .save_reference_mws(&[ReferenceMwParameters::new("e5", 4.2)])
        .await
        .unwrap();

    let messages = h
        .service
        .toggle_validation_by_event_ids(&[
            "e1".to_string(),
            "e3".to_string(),
            "e5".to_string(),
            "e6".to_string(),
            "e1".to_string(),
        ])
        .await
        .unwrap();
    assert_eq!(messages.len(), 4);
    assert!(messages[0].contains("e1") && messages[0].contains("reference to validation"));
    assert!(messages[1].contains("e3") && messages[1].contains("validation to reference"));
    assert!(messages[2].contains("e5") && messages[2].contains("left unchanged"));
    assert!(messages[3].contains("e6") && messages[3].contains("left unchanged"));

    let references = h.store.reference_mws().await.unwrap();
    let validation = h.store.validation_mws().await.unwrap();
    assert_eq!(
        ids(&references, |r| r.event_id.as_str()),
        BTreeSet::from(["e2".to_string(), "e3".to_string(), "e5".to_string()])
    );
    assert_eq!(
        ids(&validation, |v| v.event_id.as_str()),
        BTreeSet::from(["e1".to_string(), "e5".to_string()])
    );

    // Values travel with the event
    let e3 = references.iter().find(|r| r.event_id == "e3").unwrap();
    assert_eq!(e3.ref_mw, 3.9);
    assert_eq!(e3.ref_apparent_stress_in_mpa, Some(0.5));
    let e1 = validation.iter().find(|v| v.event_id == "e1").unwrap();
    assert_eq!(e1.mw, 4.0);
}

#[tokio::test]
async fn test_toggle_twice_restores_sets() {
    let h = harness(HarnessOptions::default()).await;
    let before = h.store.reference_mws().await.unwrap();

    let ids = vec!["e1".to_string(), "e2".to_string()];
    h.service.toggle_validation_by_event_ids(&ids).await.unwrap();
    assert!(h.store.reference_mws().await.unwrap().is_empty());
    assert_eq!(h.store.validation_mws().await.unwrap().len(), 2);

    h.service.toggle_validation_by_event_ids(&ids).await.unwrap();
    assert_eq!(h.store.reference_mws().await.unwrap(), before);
    assert!(h.store.validation_mws().await.unwrap().is_empty());
}

#[tokio::test]
async fn test_zero_mw_counts_as_absent() {
    let h = harness(HarnessOptions::default()).await;
    h.store
        .save_reference_mws(&[ReferenceMwParameters::new("e7", 0.0)])
        .await
        .unwrap();

    let messages = h
        .service
        .toggle_validation_by_event_ids(&["e7".to_string()])
        .await
        .unwrap();
    assert!(messages[0].contains("no reference or validation value"));
    assert!(h.store.validation_mws().await.unwrap().is_empty());
}

#[tokio::test]
async fn test_clear_data_keeps_inputs() {
    let h = harness(HarnessOptions::default()).await;
    seed_site_terms(&h.store).await;
    h.store
        .save_measured_mws(&[MeasuredMwParameters::new("e1", 4.1)])
        .await
        .unwrap();
    let mut rx = h.service.subscribe();

    h.service.clear_data().await.unwrap();

    assert!(h.store.site_parameters().await.unwrap().is_empty());
    assert!(h.store.measured_mws().await.unwrap().is_empty());
    assert_eq!(h.store.reference_mws().await.unwrap().len(), 2);
    assert_eq!(h.store.shared_parameters().await.unwrap().len(), 1);
    assert!(drain(&mut rx)
        .iter()
        .any(|e| matches!(e, CalibrationEvent::DataCleared { .. })));
}
