/// Prediction service behind the HTTP endpoint.
///
/// Submodules:
/// - `request`   — lenient field coercion for request bodies
/// - `narrative` — notification title/body, risk factors, time buckets
/// - `registry`  — loaded artifacts behind a swappable snapshot handle
///
/// `PredictionService` is transport-agnostic: it takes decoded JSON and
/// returns typed responses or a `ServeError` carrying its HTTP status.

pub mod narrative;
pub mod registry;
pub mod request;

use crate::analysis::features::{complete_features, finite_or_zero};
use crate::config::AppConfig;
use crate::ensemble::EnsembleError;
use crate::model::{FeatureRow, MODEL_FEATURES, RiskLabel, format_countdown};
use crate::store::{ModelArtifact, ModelKind, ModelMetrics};
use chrono::{DateTime, NaiveDate, Utc};
use registry::{LoadedArtifact, ModelRegistry, ReloadReport};
use serde::Serialize;
use serde_json::{Value, json};
use std::collections::BTreeMap;
use thiserror::Error;

// ---------------------------------------------------------------------------
// Errors
// ---------------------------------------------------------------------------

#[derive(Debug, Error)]
pub enum ServeError {
    #[error("{0} model not loaded")]
    ModelNotLoaded(ModelKind),
    #[error("model expects {expected} features but only {supplied} were supplied")]
    FeatureMismatch { expected: usize, supplied: usize },
    #[error("request body must be a JSON object")]
    NotAnObject,
    #[error("batch body must be an object with a `samples` array")]
    InvalidBatch,
    #[error("invalid JSON body: {0}")]
    InvalidJson(String),
    #[error("prediction failed: {0}")]
    Prediction(#[from] EnsembleError),
}

impl ServeError {
    pub fn status_code(&self) -> u16 {
        match self {
            ServeError::ModelNotLoaded(_) => 503,
            ServeError::FeatureMismatch { .. }
            | ServeError::NotAnObject
            | ServeError::InvalidBatch
            | ServeError::InvalidJson(_) => 400,
            ServeError::Prediction(_) => 500,
        }
    }

    pub fn to_json(&self) -> Value {
        let mut body = json!({ "error": self.to_string() });
        if let ServeError::FeatureMismatch { expected, supplied } = self {
            body["expected_features"] = json!(expected);
            body["supplied_features"] = json!(supplied);
        }
        body
    }
}

// ---------------------------------------------------------------------------
// Responses
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Serialize)]
pub struct DangerAnalysis {
    /// Recomputed from the request primitives
    pub danger_index: f64,
    pub rapid_rise: bool,
    pub b_rate_of_change: f64,
    pub risk_factors: Vec<String>,
    pub title: String,
    pub color: &'static str,
    /// Countdown from the regressor, when it is loaded
    #[serde(skip_serializing_if = "Option::is_none")]
    pub predicted_seconds: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub formatted_time: Option<String>,
    /// Request fields that were missing or not numeric and read as 0
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub defaulted_fields: Vec<&'static str>,
}

#[derive(Debug, Clone, Serialize)]
pub struct PredictResponse {
    pub prediction: RiskLabel,
    /// Probability per class, keyed by wire label
    pub confidence: BTreeMap<&'static str, f64>,
    pub danger_analysis: DangerAnalysis,
    pub message: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct TimeResponse {
    pub predicted_seconds: f64,
    pub formatted_time: String,
    pub warning_level: RiskLabel,
    pub warning_color: &'static str,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub defaulted_fields: Vec<&'static str>,
}

#[derive(Debug, Clone, Serialize)]
pub struct BatchEntry {
    pub index: usize,
    pub success: bool,
    #[serde(flatten)]
    pub result: Option<PredictResponse>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct BatchResponse {
    pub results: Vec<BatchEntry>,
    pub total: usize,
    pub succeeded: usize,
    pub failed: usize,
}

#[derive(Debug, Clone, Serialize)]
pub struct ArtifactInfo {
    pub loaded: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub path: Option<String>,
    pub expected_features: usize,
    pub supplied_features: usize,
    pub feature_names: Vec<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub trained_at: Option<DateTime<Utc>>,
    pub n_samples: usize,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub metrics: Option<ModelMetrics>,
    pub feature_importances: BTreeMap<String, f64>,
}

impl ArtifactInfo {
    fn from_loaded(loaded: Option<&LoadedArtifact>) -> Self {
        let supplied_features = MODEL_FEATURES.len();
        match loaded {
            Some(LoadedArtifact { path, artifact }) => ArtifactInfo {
                loaded: true,
                path: Some(path.display().to_string()),
                expected_features: artifact.n_features(),
                supplied_features,
                feature_names: artifact.feature_names.clone(),
                trained_at: Some(artifact.trained_at),
                n_samples: artifact.n_samples,
                metrics: Some(artifact.metrics.clone()),
                feature_importances: artifact
                    .importance_ranking()
                    .into_iter()
                    .map(|(name, imp)| (name.to_string(), imp))
                    .collect(),
            },
            None => ArtifactInfo {
                loaded: false,
                path: None,
                expected_features: 0,
                supplied_features,
                feature_names: Vec::new(),
                trained_at: None,
                n_samples: 0,
                metrics: None,
                feature_importances: BTreeMap::new(),
            },
        }
    }
}

// ---------------------------------------------------------------------------
// Service
// ---------------------------------------------------------------------------

/// Non-negative seconds; non-finite predictions read as 0.
pub fn clamp_seconds(raw: f64) -> f64 {
    finite_or_zero(raw).max(0.0)
}

fn aligned<'a>(artifact: &ModelArtifact, vector: &'a [f64]) -> Result<&'a [f64], ServeError> {
    artifact
        .align_features(vector)
        .ok_or(ServeError::FeatureMismatch {
            expected: artifact.n_features(),
            supplied: vector.len(),
        })
}

pub struct PredictionService {
    config: AppConfig,
    registry: ModelRegistry,
}

impl PredictionService {
    pub fn new(config: AppConfig, registry: ModelRegistry) -> Self {
        Self { config, registry }
    }

    pub fn config(&self) -> &AppConfig {
        &self.config
    }

    /// Completed feature row plus the request fields that were coerced to 0.
    fn complete(&self, body: &Value) -> Result<(FeatureRow, Vec<&'static str>), ServeError> {
        let input = request::parse_input(body).ok_or(ServeError::NotAnObject)?;
        let defaulted = request::defaulted_fields(body);
        if !defaulted.is_empty() {
            log::debug!("fields defaulted to 0: {}", defaulted.join(", "));
        }
        Ok((complete_features(&input, &self.config.features), defaulted))
    }

    fn countdown(&self, regressor: &ModelArtifact, row: &FeatureRow) -> Result<f64, ServeError> {
        let vector = row.model_vector();
        let raw = regressor.forest.predict_value(aligned(regressor, &vector)?)?;
        Ok(clamp_seconds(raw))
    }

    /// Risk label, class probabilities and narrative for one sample.
    pub fn predict(&self, body: &Value) -> Result<PredictResponse, ServeError> {
        let models = self.registry.snapshot();
        let classifier = &models
            .classifier
            .as_ref()
            .ok_or(ServeError::ModelNotLoaded(ModelKind::Classifier))?
            .artifact;

        let (row, defaulted_fields) = self.complete(body)?;
        let vector = row.model_vector();
        let probs = classifier.forest.predict_proba(aligned(classifier, &vector)?)?;

        let mut prediction = RiskLabel::Normal;
        let mut best = f64::NEG_INFINITY;
        let mut confidence = BTreeMap::new();
        for (label, p) in classifier.classes.iter().zip(&probs) {
            confidence.insert(label.as_str(), *p);
            if *p > best {
                best = *p;
                prediction = *label;
            }
        }

        let predicted_seconds = match models.regressor.as_ref() {
            Some(loaded) => match self.countdown(&loaded.artifact, &row) {
                Ok(seconds) => Some(seconds),
                Err(e) => {
                    log::warn!("countdown unavailable for narrative: {}", e);
                    None
                }
            },
            None => None,
        };

        let thresholds = &self.config.labels;
        let message = narrative::body(prediction, predicted_seconds);
        Ok(PredictResponse {
            prediction,
            confidence,
            danger_analysis: DangerAnalysis {
                danger_index: row.danger_index,
                rapid_rise: narrative::rapid_rise(&row, thresholds),
                b_rate_of_change: row.b_rate_of_change,
                risk_factors: narrative::risk_factors(&row, thresholds),
                title: narrative::title(prediction).to_string(),
                color: prediction.color(),
                predicted_seconds,
                formatted_time: predicted_seconds.and_then(format_countdown),
                defaulted_fields,
            },
            message,
        })
    }

    /// Predicted seconds until upstream danger, never negative.
    pub fn predict_time(&self, body: &Value) -> Result<TimeResponse, ServeError> {
        let models = self.registry.snapshot();
        let regressor = &models
            .regressor
            .as_ref()
            .ok_or(ServeError::ModelNotLoaded(ModelKind::Regressor))?
            .artifact;

        let (row, defaulted_fields) = self.complete(body)?;
        let seconds = self.countdown(regressor, &row)?;
        let level = narrative::time_level(seconds, &self.config.serving.time_levels);

        Ok(TimeResponse {
            predicted_seconds: seconds,
            formatted_time: format_countdown(seconds).unwrap_or_default(),
            warning_level: level,
            warning_color: level.color(),
            defaulted_fields,
        })
    }

    /// `predict` over `{samples: [...]}`, one entry per sample.
    ///
    /// A failing sample is reported in its own entry; only a missing
    /// classifier or a malformed envelope fails the whole batch.
    pub fn batch_predict(&self, body: &Value) -> Result<BatchResponse, ServeError> {
        let samples = body
            .get("samples")
            .and_then(Value::as_array)
            .ok_or(ServeError::InvalidBatch)?;

        if self.registry.snapshot().classifier.is_none() {
            return Err(ServeError::ModelNotLoaded(ModelKind::Classifier));
        }

        let results: Vec<BatchEntry> = samples
            .iter()
            .enumerate()
            .map(|(index, sample)| match self.predict(sample) {
                Ok(result) => BatchEntry {
                    index,
                    success: true,
                    result: Some(result),
                    error: None,
                },
                Err(e) => BatchEntry {
                    index,
                    success: false,
                    result: None,
                    error: Some(e.to_string()),
                },
            })
            .collect();

        let succeeded = results.iter().filter(|r| r.success).count();
        Ok(BatchResponse {
            total: results.len(),
            succeeded,
            failed: results.len() - succeeded,
            results,
        })
    }

    pub fn model_info(&self) -> Value {
        let models = self.registry.snapshot();
        json!({
            "classifier": ArtifactInfo::from_loaded(models.get(ModelKind::Classifier)),
            "regressor": ArtifactInfo::from_loaded(models.get(ModelKind::Regressor)),
            "supplied_feature_names": MODEL_FEATURES,
            "models_dir": self.registry.store().dir().display().to_string(),
            "loaded_at": models.loaded_at,
        })
    }

    pub fn health(&self) -> Value {
        let models = self.registry.snapshot();
        let classifier_loaded = models.classifier.is_some();
        let regressor_loaded = models.regressor.is_some();
        json!({
            "status": if classifier_loaded && regressor_loaded { "ok" } else { "degraded" },
            "service": "flood_alert_service",
            "version": env!("CARGO_PKG_VERSION"),
            "classifier_loaded": classifier_loaded,
            "regressor_loaded": regressor_loaded,
        })
    }

    pub fn reload(&mut self) -> ReloadReport {
        self.registry.reload()
    }

    pub fn reload_for(&mut self, today: NaiveDate) -> ReloadReport {
        self.registry.reload_for(today)
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use crate::simulate::synthetic_history;
    use crate::store::ArtifactStore;
    use crate::training::train_and_save;
    use chrono::TimeZone;

    fn today() -> NaiveDate {
        NaiveDate::from_ymd_opt(2025, 10, 20).unwrap()
    }

    fn small_config() -> AppConfig {
        let mut config = AppConfig::default();
        config.training.classifier_trees = 15;
        config.training.regressor_trees = 15;
        config
    }

    fn service_with(kinds: &[ModelKind], dir: &std::path::Path) -> PredictionService {
        let config = small_config();
        let store = ArtifactStore::new(dir);
        let start = Utc.with_ymd_and_hms(2025, 10, 20, 6, 0, 0).unwrap();
        let readings = synthetic_history(400, 11, start);
        for &kind in kinds {
            train_and_save(kind, &readings, &config, &store, None).unwrap();
        }
        let mut service = PredictionService::new(config, ModelRegistry::new(store));
        service.reload_for(today());
        service
    }

    fn sample() -> Value {
        json!({
            "mucNuocA": 22.0, "mucNuocB": 26.5, "luuLuong": 12.0, "is_raining_now": 1,
            "b_rate_of_change": 0.4, "flow_rate_of_change": 0.2, "ab_diff": 4.5,
            "b_absolute_change": 0.8
        })
    }

    #[test]
    fn test_unloaded_models_are_503() {
        let dir = tempfile::tempdir().unwrap();
        let service = service_with(&[], dir.path());

        let err = service.predict(&sample()).unwrap_err();
        assert_eq!(err.status_code(), 503);
        let err = service.predict_time(&sample()).unwrap_err();
        assert_eq!(err.status_code(), 503);
        assert_eq!(service.health()["status"], "degraded");
    }

    #[test]
    fn test_predict_returns_distribution_and_narrative() {
        let dir = tempfile::tempdir().unwrap();
        let service = service_with(&[ModelKind::Classifier, ModelKind::Regressor], dir.path());

        let response = service.predict(&sample()).unwrap();
        assert_eq!(response.confidence.len(), 4);
        let total: f64 = response.confidence.values().sum();
        assert!((total - 1.0).abs() < 1e-9);
        assert_eq!(response.danger_analysis.title, narrative::title(response.prediction));
        assert!(response.danger_analysis.predicted_seconds.is_some());
        assert!(response.message.starts_with(narrative::body(response.prediction, None).as_str()));
        assert_eq!(service.health()["status"], "ok");
    }

    #[test]
    fn test_client_danger_index_is_ignored() {
        let dir = tempfile::tempdir().unwrap();
        let service = service_with(&[ModelKind::Classifier], dir.path());

        let mut forged = sample();
        forged["danger_index"] = json!(9999.0);
        let honest = service.predict(&sample()).unwrap();
        let forged = service.predict(&forged).unwrap();
        assert_eq!(honest.danger_analysis.danger_index, forged.danger_analysis.danger_index);
        assert_eq!(honest.confidence, forged.confidence);
    }

    #[test]
    fn test_predict_time_is_never_negative() {
        let dir = tempfile::tempdir().unwrap();
        let service = service_with(&[ModelKind::Regressor], dir.path());

        for body in [sample(), json!({}), json!({"mucNuocA": "garbage", "ab_diff": -50})] {
            let response = service.predict_time(&body).unwrap();
            assert!(response.predicted_seconds >= 0.0);
            assert!(!response.formatted_time.is_empty());
            assert_eq!(response.warning_color, response.warning_level.color());
        }
        assert_eq!(clamp_seconds(-12.0), 0.0);
        assert_eq!(clamp_seconds(f64::NAN), 0.0);
        assert_eq!(clamp_seconds(f64::INFINITY), 0.0);
    }

    /// Regressor that predicts exactly 0 s everywhere, as a calm history does.
    fn save_calm_regressor(store: &ArtifactStore) {
        use crate::ensemble::{Dataset, ForestParams, RandomForest, Targets};

        let features: Vec<Vec<f64>> = (0..30)
            .map(|i| {
                let mut row = vec![0.0; MODEL_FEATURES.len()];
                row[0] = 5.0 + (i % 3) as f64 * 0.1;
                row[1] = 4.0 + (i % 5) as f64 * 0.1;
                row
            })
            .collect();
        let dataset = Dataset::new(features, Targets::Values(vec![0.0; 30])).unwrap();
        let forest = RandomForest::fit(&dataset, ForestParams { n_trees: 5, ..ForestParams::default() }).unwrap();
        let artifact = ModelArtifact {
            kind: ModelKind::Regressor,
            feature_names: MODEL_FEATURES.iter().map(|s| s.to_string()).collect(),
            classes: Vec::new(),
            trained_at: Utc::now(),
            n_samples: 30,
            metrics: ModelMetrics::default(),
            forest,
        };
        store.save(&artifact, None).unwrap();
    }

    #[test]
    fn test_calm_countdown_is_normal_not_danger() {
        let dir = tempfile::tempdir().unwrap();
        let store = ArtifactStore::new(dir.path());
        save_calm_regressor(&store);
        let mut service = PredictionService::new(small_config(), ModelRegistry::new(store));
        service.reload_for(today());

        let calm = json!({
            "mucNuocA": 5.0, "mucNuocB": 4.0, "luuLuong": 2.0, "is_raining_now": 0,
            "b_rate_of_change": 0.0, "flow_rate_of_change": 0.0, "ab_diff": -1.0,
            "b_absolute_change": 0.0
        });
        let response = service.predict_time(&calm).unwrap();
        assert_eq!(response.predicted_seconds, 0.0);
        assert_eq!(response.warning_level, RiskLabel::Normal);
        assert_eq!(response.warning_color, "green");
        assert!(response.defaulted_fields.is_empty());
    }

    #[test]
    fn test_trained_models_agree_on_calm_input() {
        let dir = tempfile::tempdir().unwrap();
        let service = service_with(&[ModelKind::Classifier, ModelKind::Regressor], dir.path());

        let calm = json!({"mucNuocA": 5.0, "mucNuocB": 4.0, "luuLuong": 2.0, "is_raining_now": false});
        let time = service.predict_time(&calm).unwrap();
        // A zero countdown never reads as imminent danger
        assert!(time.predicted_seconds > 0.0 || time.warning_level == RiskLabel::Normal);
        assert_eq!(time.warning_level, narrative::time_level(time.predicted_seconds, &service.config().serving.time_levels));
    }

    #[test]
    fn test_defaulted_fields_are_reported() {
        let dir = tempfile::tempdir().unwrap();
        let service = service_with(&[ModelKind::Classifier], dir.path());

        let response = service.predict(&sample()).unwrap();
        assert!(response.danger_analysis.defaulted_fields.is_empty());
        let json = serde_json::to_value(&response).unwrap();
        assert!(json["danger_analysis"].get("defaulted_fields").is_none());

        let partial = json!({"mucNuocA": 12.0, "mucNuocB": "rising", "ab_diff": 1.0});
        let response = service.predict(&partial).unwrap();
        assert_eq!(
            response.danger_analysis.defaulted_fields,
            vec![
                "mucNuocB",
                "luuLuong",
                "is_raining_now",
                "b_rate_of_change",
                "flow_rate_of_change",
                "b_absolute_change"
            ]
        );
    }

    #[test]
    fn test_non_object_body_is_400() {
        let dir = tempfile::tempdir().unwrap();
        let service = service_with(&[ModelKind::Classifier], dir.path());
        let err = service.predict(&json!([1, 2, 3])).unwrap_err();
        assert_eq!(err.status_code(), 400);
    }

    #[test]
    fn test_batch_isolates_bad_samples() {
        let dir = tempfile::tempdir().unwrap();
        let service = service_with(&[ModelKind::Classifier], dir.path());

        let body = json!({ "samples": [sample(), "not an object", sample(), {}] });
        let response = service.batch_predict(&body).unwrap();

        assert_eq!(response.total, 4);
        assert_eq!(response.results.len(), 4);
        assert_eq!(response.succeeded, 3);
        assert_eq!(response.failed, 1);
        assert!(!response.results[1].success);
        assert!(response.results[1].error.is_some());
        for (i, entry) in response.results.iter().enumerate() {
            assert_eq!(entry.index, i);
        }

        let json = serde_json::to_value(&response).unwrap();
        assert!(json["results"][0]["prediction"].is_string());
        assert_eq!(json["results"][1]["success"], false);
    }

    #[test]
    fn test_batch_envelope_must_have_samples() {
        let dir = tempfile::tempdir().unwrap();
        let service = service_with(&[ModelKind::Classifier], dir.path());
        let err = service.batch_predict(&json!({"rows": []})).unwrap_err();
        assert!(matches!(err, ServeError::InvalidBatch));
    }

    #[test]
    fn test_feature_mismatch_error_body() {
        let err = ServeError::FeatureMismatch { expected: 12, supplied: 9 };
        assert_eq!(err.status_code(), 400);
        let body = err.to_json();
        assert_eq!(body["expected_features"], 12);
        assert_eq!(body["supplied_features"], 9);
    }

    #[test]
    fn test_model_info_reports_feature_counts() {
        let dir = tempfile::tempdir().unwrap();
        let service = service_with(&[ModelKind::Regressor], dir.path());
        let info = service.model_info();
        assert_eq!(info["classifier"]["loaded"], false);
        assert_eq!(info["regressor"]["loaded"], true);
        assert_eq!(info["regressor"]["expected_features"], 9);
        assert_eq!(info["regressor"]["supplied_features"], 9);
    }
}
