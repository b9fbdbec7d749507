/// Integration tests for the train → persist → serve round trip
///
/// These tests drive the public API end to end without a database:
/// 1. Simulated sensor history feeds both training pipelines
/// 2. Artifacts are written to a temporary models directory
/// 3. A freshly loaded service answers predictions over the router
///
/// Run with: cargo test --test train_and_serve

use chrono::{NaiveDate, TimeZone, Utc};
use flood_alert_service::analysis::features::{complete_features, engineer_features};
use flood_alert_service::analysis::labels::derive_labels;
use flood_alert_service::config::AppConfig;
use flood_alert_service::endpoint::route;
use flood_alert_service::ensemble::{Dataset, ForestParams, RandomForest, Targets};
use flood_alert_service::model::{
    FeatureInput, LEGACY_FEATURE_COUNT, MODEL_FEATURES, RiskLabel, SensorReading,
};
use flood_alert_service::serving::PredictionService;
use flood_alert_service::serving::registry::ModelRegistry;
use flood_alert_service::simulate::synthetic_history;
use flood_alert_service::store::{ArtifactStore, ModelArtifact, ModelKind, ModelMetrics};
use flood_alert_service::training::{TrainingError, train_and_save};
use serde_json::{Value, json};
use std::path::Path;

// ---------------------------------------------------------------------------
// Test Helpers
// ---------------------------------------------------------------------------

fn today() -> NaiveDate {
    NaiveDate::from_ymd_opt(2025, 10, 20).unwrap()
}

fn history(rows: usize) -> Vec<SensorReading> {
    let start = Utc.with_ymd_and_hms(2025, 10, 20, 6, 0, 0).unwrap();
    synthetic_history(rows, 42, start)
}

fn quick_config() -> AppConfig {
    let mut config = AppConfig::default();
    config.training.classifier_trees = 20;
    config.training.regressor_trees = 20;
    config
}

fn trained_service(dir: &Path) -> PredictionService {
    let config = quick_config();
    let store = ArtifactStore::new(dir);
    let readings = history(600);
    train_and_save(ModelKind::Classifier, &readings, &config, &store, Some(today())).unwrap();
    train_and_save(ModelKind::Regressor, &readings, &config, &store, Some(today())).unwrap();

    let mut service = PredictionService::new(config, ModelRegistry::new(store));
    let report = service.reload_for(today());
    assert!(report.classifier_loaded && report.regressor_loaded, "{:?}", report.errors);
    service
}

fn post(service: &mut PredictionService, path: &str, body: &Value) -> (u16, Value) {
    route(service, "POST", path, &body.to_string())
}

fn rising_sample() -> Value {
    json!({
        "mucNuocA": 24.0, "mucNuocB": 29.0, "luuLuong": 15.0, "is_raining_now": true,
        "b_rate_of_change": "0.8", "flow_rate_of_change": 0.3, "ab_diff": 5.0,
        "b_absolute_change": 1.6
    })
}

// ---------------------------------------------------------------------------
// 1. Training
// ---------------------------------------------------------------------------

#[test]
fn test_too_few_rows_persists_nothing() {
    let dir = tempfile::tempdir().unwrap();
    let store = ArtifactStore::new(dir.path());
    let result = train_and_save(ModelKind::Classifier, &history(20), &quick_config(), &store, None);

    assert!(matches!(
        result,
        Err(TrainingError::InsufficientData { found: 20, required: 50 })
    ));
    assert!(!store.generic_path(ModelKind::Classifier).exists());
}

#[test]
fn test_simulated_history_covers_every_label() {
    let config = AppConfig::default();
    let rows = engineer_features(&history(600), &config.features);
    let labels = derive_labels(&rows, &config.labels);
    for label in RiskLabel::ALL {
        assert!(labels.contains(&label), "no {} rows in simulated history", label);
    }
}

// ---------------------------------------------------------------------------
// 2. Serving
// ---------------------------------------------------------------------------

#[test]
fn test_predict_over_router() {
    let dir = tempfile::tempdir().unwrap();
    let mut service = trained_service(dir.path());

    let (status, body) = post(&mut service, "/predict", &rising_sample());
    assert_eq!(status, 200);
    assert!(serde_json::from_value::<RiskLabel>(body["prediction"].clone()).is_ok());
    assert_eq!(body["confidence"].as_object().unwrap().len(), 4);
    assert!(body["danger_analysis"]["rapid_rise"].as_bool().unwrap());
    assert!(body["message"].as_str().unwrap().len() > 0);
}

#[test]
fn test_predict_time_never_negative() {
    let dir = tempfile::tempdir().unwrap();
    let mut service = trained_service(dir.path());

    for sample in [rising_sample(), json!({}), json!({"mucNuocA": -100, "ab_diff": "x"})] {
        let (status, body) = post(&mut service, "/predict_time", &sample);
        assert_eq!(status, 200);
        assert!(body["predicted_seconds"].as_f64().unwrap() >= 0.0);
        assert!(body["formatted_time"].is_string());
        assert!(body["warning_level"].is_string());
    }
}

#[test]
fn test_calm_water_is_never_a_danger_countdown() {
    let dir = tempfile::tempdir().unwrap();
    let mut service = trained_service(dir.path());

    let calm = json!({
        "mucNuocA": 5.0, "mucNuocB": 4.0, "luuLuong": 2.0, "is_raining_now": 0,
        "b_rate_of_change": 0.0, "flow_rate_of_change": 0.0, "ab_diff": -1.0,
        "b_absolute_change": 0.0
    });
    let (status, body) = post(&mut service, "/predict_time", &calm);
    assert_eq!(status, 200);
    let seconds = body["predicted_seconds"].as_f64().unwrap();
    // Zero means no countdown pending, not zero seconds left
    if seconds == 0.0 {
        assert_eq!(body["warning_level"], RiskLabel::Normal.as_str());
        assert_eq!(body["warning_color"], "green");
    }
}

#[test]
fn test_batch_of_n_returns_n_entries() {
    let dir = tempfile::tempdir().unwrap();
    let mut service = trained_service(dir.path());

    let batch = json!({ "samples": [rising_sample(), 42, {}, [1, 2], rising_sample()] });
    let (status, body) = post(&mut service, "/batch_predict", &batch);
    assert_eq!(status, 200);
    assert_eq!(body["total"], 5);
    assert_eq!(body["succeeded"], 3);
    assert_eq!(body["failed"], 2);

    let results = body["results"].as_array().unwrap();
    assert_eq!(results.len(), 5);
    assert_eq!(results[1]["success"], false);
    assert_eq!(results[3]["success"], false);
    assert_eq!(results[0]["prediction"], results[4]["prediction"]);
}

#[test]
fn test_serving_completion_matches_training_features() {
    let config = AppConfig::default();
    let rows = engineer_features(&history(200), &config.features);
    for row in &rows {
        let served = complete_features(&FeatureInput::from(row), &config.features);
        assert_eq!(served.model_vector(), row.model_vector());
    }
}

#[test]
fn test_reload_picks_up_new_artifacts() {
    let dir = tempfile::tempdir().unwrap();
    let store = ArtifactStore::new(dir.path());
    let mut service = PredictionService::new(quick_config(), ModelRegistry::new(store.clone()));

    let (status, _) = post(&mut service, "/predict", &rising_sample());
    assert_eq!(status, 503);

    train_and_save(ModelKind::Classifier, &history(300), &quick_config(), &store, None).unwrap();
    let (status, body) = route(&mut service, "POST", "/reload_models", "");
    assert_eq!(status, 200);
    assert_eq!(body["classifier_loaded"], true);
    assert_eq!(body["regressor_loaded"], false);

    let (status, _) = post(&mut service, "/predict", &rising_sample());
    assert_eq!(status, 200);
    let (_, health) = route(&mut service, "GET", "/health", "");
    assert_eq!(health["status"], "degraded");
}

// ---------------------------------------------------------------------------
// 3. Feature-width compatibility
// ---------------------------------------------------------------------------

fn legacy_classifier(readings: &[SensorReading], config: &AppConfig) -> ModelArtifact {
    let rows = engineer_features(readings, &config.features);
    let labels = derive_labels(&rows, &config.labels);
    let features: Vec<Vec<f64>> = rows
        .iter()
        .map(|r| r.model_vector()[..LEGACY_FEATURE_COUNT].to_vec())
        .collect();
    let dataset = Dataset::new(
        features,
        Targets::Classes {
            labels: labels.iter().map(RiskLabel::index).collect(),
            n_classes: RiskLabel::ALL.len(),
        },
    )
    .unwrap();
    let forest = RandomForest::fit(&dataset, ForestParams { n_trees: 10, ..ForestParams::default() }).unwrap();

    ModelArtifact {
        kind: ModelKind::Classifier,
        feature_names: MODEL_FEATURES[..LEGACY_FEATURE_COUNT]
            .iter()
            .map(|s| s.to_string())
            .collect(),
        classes: RiskLabel::ALL.to_vec(),
        trained_at: Utc::now(),
        n_samples: rows.len(),
        metrics: ModelMetrics::default(),
        forest,
    }
}

#[test]
fn test_narrower_model_receives_truncated_vector() {
    let dir = tempfile::tempdir().unwrap();
    let store = ArtifactStore::new(dir.path());
    let config = quick_config();
    store.save(&legacy_classifier(&history(300), &config), None).unwrap();

    let mut service = PredictionService::new(config, ModelRegistry::new(store));
    service.reload_for(today());

    let (status, body) = post(&mut service, "/predict", &rising_sample());
    assert_eq!(status, 200, "{}", body);

    let (_, info) = route(&mut service, "GET", "/model_info", "");
    assert_eq!(info["classifier"]["expected_features"], LEGACY_FEATURE_COUNT);
    assert_eq!(info["classifier"]["supplied_features"], MODEL_FEATURES.len());
}
