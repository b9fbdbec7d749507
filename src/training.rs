/// Training pipelines for the risk classifier and the countdown regressor.
///
/// Both pipelines share one shape:
///
/// 1. refuse to train on fewer than `min_rows` raw readings
/// 2. engineer features (and, for the classifier, derive labels)
/// 3. split off a held-out test set, stratified by label when possible
/// 4. fit a random forest sized for the amount of data
/// 5. evaluate on the held-out rows and persist the artifact
///
/// Nothing is written when any step fails. Conditions that still allow a
/// usable model (a single label class, a class too small to stratify) are
/// recorded as warnings on the artifact instead of aborting.

use crate::analysis::features::engineer_features;
use crate::analysis::labels::derive_labels;
use crate::config::{AppConfig, TrainingConfig};
use crate::db::DbConfigError;
use crate::ensemble::{Dataset, EnsembleError, ForestParams, RandomForest, Targets};
use crate::model::{FeatureRow, MODEL_FEATURES, RiskLabel, SensorReading};
use crate::store::{ArtifactStore, ModelArtifact, ModelKind, ModelMetrics, ModelStoreError};
use chrono::{NaiveDate, Utc};
use rand::SeedableRng;
use rand::seq::SliceRandom;
use rand_chacha::ChaCha8Rng;
use std::path::PathBuf;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum TrainingError {
    #[error("insufficient data: {found} rows, at least {required} required")]
    InsufficientData { found: usize, required: usize },
    #[error(transparent)]
    Database(#[from] DbConfigError),
    #[error(transparent)]
    Ensemble(#[from] EnsembleError),
    #[error(transparent)]
    Store(#[from] ModelStoreError),
}

/// Summary of a completed training run.
#[derive(Debug, Clone)]
pub struct TrainingReport {
    pub kind: ModelKind,
    pub path: PathBuf,
    pub n_samples: usize,
    pub metrics: ModelMetrics,
    /// Feature importances, highest first
    pub importances: Vec<(String, f64)>,
}

// ---------------------------------------------------------------------------
// Sizing and splitting
// ---------------------------------------------------------------------------

/// Ensemble size and depth for `n_rows` training rows.
///
/// Both scale linearly with `n_rows / full_capacity_rows` (capped at 1)
/// and never drop below `min_trees` / `min_depth` or rise above the base.
pub fn scale_hyperparameters(
    base_trees: usize,
    base_depth: usize,
    n_rows: usize,
    config: &TrainingConfig,
) -> (usize, usize) {
    let factor = if config.full_capacity_rows == 0 {
        1.0
    } else {
        (n_rows as f64 / config.full_capacity_rows as f64).min(1.0)
    };
    let scale = |base: usize, floor: usize| -> usize {
        let scaled = (base as f64 * factor).round() as usize;
        scaled.clamp(floor.min(base), base)
    };
    (
        scale(base_trees, config.min_trees),
        scale(base_depth, config.min_depth),
    )
}

/// Shuffled train/test index split.
///
/// With `strata`, each class contributes `round(len * test_fraction)` rows
/// to the test set (at least one, never all of it). Both sides are
/// guaranteed non-empty when `n >= 2`.
pub fn train_test_split(
    n: usize,
    test_fraction: f64,
    strata: Option<&[usize]>,
    seed: u64,
) -> (Vec<usize>, Vec<usize>) {
    let mut rng = ChaCha8Rng::seed_from_u64(seed);
    let mut train = Vec::new();
    let mut test = Vec::new();

    match strata {
        Some(labels) => {
            let n_classes = labels.iter().copied().max().map_or(0, |m| m + 1);
            let mut groups: Vec<Vec<usize>> = vec![Vec::new(); n_classes];
            for (i, &label) in labels.iter().enumerate().take(n) {
                groups[label].push(i);
            }
            for mut group in groups.into_iter().filter(|g| !g.is_empty()) {
                group.shuffle(&mut rng);
                let n_test = test_count(group.len(), test_fraction);
                test.extend_from_slice(&group[..n_test]);
                train.extend_from_slice(&group[n_test..]);
            }
        }
        None => {
            let mut all: Vec<usize> = (0..n).collect();
            all.shuffle(&mut rng);
            let n_test = test_count(n, test_fraction);
            test.extend_from_slice(&all[..n_test]);
            train.extend_from_slice(&all[n_test..]);
        }
    }

    train.sort_unstable();
    test.sort_unstable();
    (train, test)
}

fn test_count(len: usize, fraction: f64) -> usize {
    if len < 2 {
        return 0;
    }
    ((len as f64 * fraction).round() as usize).clamp(1, len - 1)
}

pub fn accuracy(predicted: &[usize], actual: &[usize]) -> f64 {
    if actual.is_empty() {
        return 0.0;
    }
    let correct = predicted.iter().zip(actual).filter(|(p, a)| p == a).count();
    correct as f64 / actual.len() as f64
}

pub fn rmse(predicted: &[f64], actual: &[f64]) -> f64 {
    if actual.is_empty() {
        return 0.0;
    }
    let sse: f64 = predicted.iter().zip(actual).map(|(p, a)| (p - a).powi(2)).sum();
    (sse / actual.len() as f64).sqrt()
}

// ---------------------------------------------------------------------------
// Pipelines
// ---------------------------------------------------------------------------

fn prepare(readings: &[SensorReading], config: &AppConfig) -> Result<Vec<FeatureRow>, TrainingError> {
    let required = config.training.min_rows;
    if readings.len() < required {
        return Err(TrainingError::InsufficientData {
            found: readings.len(),
            required,
        });
    }
    Ok(engineer_features(readings, &config.features))
}

fn select(rows: &[Vec<f64>], indices: &[usize]) -> Vec<Vec<f64>> {
    indices.iter().map(|&i| rows[i].clone()).collect()
}

fn forest_params(base_trees: usize, n_rows: usize, config: &TrainingConfig) -> ForestParams {
    let (n_trees, max_depth) = scale_hyperparameters(base_trees, config.max_depth, n_rows, config);
    ForestParams {
        n_trees,
        max_depth,
        min_samples_split: config.min_samples_split,
        min_samples_leaf: config.min_samples_leaf,
        max_features: None,
        bootstrap: true,
        seed: config.seed,
    }
}

fn feature_names() -> Vec<String> {
    MODEL_FEATURES.iter().map(|s| s.to_string()).collect()
}

/// Rows per label, in severity order, including empty labels.
pub fn label_distribution(labels: &[RiskLabel]) -> Vec<(RiskLabel, usize)> {
    RiskLabel::ALL
        .iter()
        .map(|&label| (label, labels.iter().filter(|&&l| l == label).count()))
        .collect()
}

/// Fits the risk label classifier on `readings`.
pub fn fit_classifier(
    readings: &[SensorReading],
    config: &AppConfig,
) -> Result<ModelArtifact, TrainingError> {
    let rows = prepare(readings, config)?;
    let labels = derive_labels(&rows, &config.labels);
    let distribution = label_distribution(&labels);
    let mut warnings = Vec::new();

    let present: Vec<&(RiskLabel, usize)> = distribution.iter().filter(|(_, c)| *c > 0).collect();
    if present.len() < 2 {
        let only = present.first().map(|(l, _)| l.as_str()).unwrap_or("none");
        let msg = format!("only one label class present ({}); classifier cannot discriminate", only);
        log::warn!("{}", msg);
        warnings.push(msg);
    }

    let class_idx: Vec<usize> = labels.iter().map(RiskLabel::index).collect();
    let stratify = present.iter().all(|(_, c)| *c >= 2);
    if !stratify {
        let msg = "a label class has fewer than 2 rows; using an unstratified split".to_string();
        log::warn!("{}", msg);
        warnings.push(msg);
    }

    let t = &config.training;
    let (train_idx, test_idx) = train_test_split(
        rows.len(),
        t.test_fraction,
        stratify.then_some(class_idx.as_slice()),
        t.seed,
    );

    let vectors: Vec<Vec<f64>> = rows.iter().map(FeatureRow::model_vector).collect();
    let dataset = Dataset::new(
        select(&vectors, &train_idx),
        Targets::Classes {
            labels: train_idx.iter().map(|&i| class_idx[i]).collect(),
            n_classes: RiskLabel::ALL.len(),
        },
    )?;
    let params = forest_params(t.classifier_trees, train_idx.len(), t);
    log::info!(
        "fitting classifier: {} train / {} test rows, {} trees, depth {}",
        train_idx.len(),
        test_idx.len(),
        params.n_trees,
        params.max_depth
    );
    let forest = RandomForest::fit(&dataset, params)?;

    let mut predicted = Vec::with_capacity(test_idx.len());
    for &i in &test_idx {
        predicted.push(forest.predict_class(&vectors[i])?);
    }
    let actual: Vec<usize> = test_idx.iter().map(|&i| class_idx[i]).collect();
    let acc = accuracy(&predicted, &actual);
    log::info!("classifier held-out accuracy: {:.4}", acc);
    let (mean_tree_depth, mean_leaves) = forest.mean_shape();

    Ok(ModelArtifact {
        kind: ModelKind::Classifier,
        feature_names: feature_names(),
        classes: RiskLabel::ALL.to_vec(),
        trained_at: Utc::now(),
        n_samples: rows.len(),
        metrics: ModelMetrics {
            train_rows: train_idx.len(),
            test_rows: test_idx.len(),
            accuracy: Some(acc),
            rmse: None,
            n_trees: params.n_trees,
            max_depth: params.max_depth,
            mean_tree_depth,
            mean_leaves,
            label_counts: distribution,
            warnings,
        },
        forest,
    })
}

/// Fits the countdown regressor on `readings`.
///
/// The target is the recorded countdown in seconds, zero where absent.
pub fn fit_regressor(
    readings: &[SensorReading],
    config: &AppConfig,
) -> Result<ModelArtifact, TrainingError> {
    let rows = prepare(readings, config)?;
    let mut warnings = Vec::new();

    let targets: Vec<f64> = rows.iter().map(|r| r.countdown_seconds).collect();
    if targets.iter().all(|&c| c == 0.0) {
        let msg = "no countdown recorded in any row; regressor will predict 0".to_string();
        log::warn!("{}", msg);
        warnings.push(msg);
    }

    let t = &config.training;
    let (train_idx, test_idx) = train_test_split(rows.len(), t.test_fraction, None, t.seed);

    let vectors: Vec<Vec<f64>> = rows.iter().map(FeatureRow::model_vector).collect();
    let dataset = Dataset::new(
        select(&vectors, &train_idx),
        Targets::Values(train_idx.iter().map(|&i| targets[i]).collect()),
    )?;
    let params = forest_params(t.regressor_trees, train_idx.len(), t);
    log::info!(
        "fitting regressor: {} train / {} test rows, {} trees, depth {}",
        train_idx.len(),
        test_idx.len(),
        params.n_trees,
        params.max_depth
    );
    let forest = RandomForest::fit(&dataset, params)?;

    let mut predicted = Vec::with_capacity(test_idx.len());
    for &i in &test_idx {
        predicted.push(forest.predict_value(&vectors[i])?);
    }
    let actual: Vec<f64> = test_idx.iter().map(|&i| targets[i]).collect();
    let error = rmse(&predicted, &actual);
    log::info!("regressor held-out RMSE: {:.2} s", error);
    let (mean_tree_depth, mean_leaves) = forest.mean_shape();

    Ok(ModelArtifact {
        kind: ModelKind::Regressor,
        feature_names: feature_names(),
        classes: Vec::new(),
        trained_at: Utc::now(),
        n_samples: rows.len(),
        metrics: ModelMetrics {
            train_rows: train_idx.len(),
            test_rows: test_idx.len(),
            accuracy: None,
            rmse: Some(error),
            n_trees: params.n_trees,
            max_depth: params.max_depth,
            mean_tree_depth,
            mean_leaves,
            label_counts: Vec::new(),
            warnings,
        },
        forest,
    })
}

/// Fits `kind` and saves it; dated artifact when `date` is given.
pub fn train_and_save(
    kind: ModelKind,
    readings: &[SensorReading],
    config: &AppConfig,
    store: &ArtifactStore,
    date: Option<NaiveDate>,
) -> Result<TrainingReport, TrainingError> {
    let artifact = match kind {
        ModelKind::Classifier => fit_classifier(readings, config)?,
        ModelKind::Regressor => fit_regressor(readings, config)?,
    };

    let path = store.save(&artifact, date)?;
    let importances = artifact
        .importance_ranking()
        .into_iter()
        .map(|(name, imp)| (name.to_string(), imp))
        .collect();

    Ok(TrainingReport {
        kind,
        path,
        n_samples: artifact.n_samples,
        metrics: artifact.metrics,
        importances,
    })
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use crate::simulate::synthetic_history;
    use chrono::TimeZone;

    fn start() -> chrono::DateTime<Utc> {
        Utc.with_ymd_and_hms(2025, 10, 20, 6, 0, 0).unwrap()
    }

    fn quick_config() -> AppConfig {
        let mut config = AppConfig::default();
        config.training.classifier_trees = 20;
        config.training.regressor_trees = 20;
        config
    }

    #[test]
    fn test_scale_hyperparameters() {
        let t = TrainingConfig::default();
        assert_eq!(scale_hyperparameters(100, 10, 5000, &t), (100, 10));
        assert_eq!(scale_hyperparameters(100, 10, 1000, &t), (100, 10));
        assert_eq!(scale_hyperparameters(100, 10, 500, &t), (50, 5));
        assert_eq!(scale_hyperparameters(200, 10, 50, &t), (10, 3));
        // Floors never exceed the base size
        assert_eq!(scale_hyperparameters(5, 2, 10, &t), (5, 2));
    }

    #[test]
    fn test_split_sizes_and_disjointness() {
        let (train, test) = train_test_split(100, 0.2, None, 42);
        assert_eq!(test.len(), 20);
        assert_eq!(train.len(), 80);
        assert!(test.iter().all(|i| !train.contains(i)));
    }

    #[test]
    fn test_split_is_stratified() {
        let labels: Vec<usize> = (0..100).map(|i| if i < 90 { 0 } else { 1 }).collect();
        let (train, test) = train_test_split(100, 0.2, Some(&labels), 42);
        assert_eq!(test.iter().filter(|&&i| labels[i] == 1).count(), 2);
        assert_eq!(test.iter().filter(|&&i| labels[i] == 0).count(), 18);
        assert_eq!(train.len() + test.len(), 100);
    }

    #[test]
    fn test_split_keeps_both_sides_non_empty() {
        let (train, test) = train_test_split(2, 0.2, None, 1);
        assert_eq!((train.len(), test.len()), (1, 1));
        let (train, test) = train_test_split(3, 0.9, None, 1);
        assert_eq!((train.len(), test.len()), (1, 2));
    }

    #[test]
    fn test_metrics() {
        assert_eq!(accuracy(&[0, 1, 2, 3], &[0, 1, 0, 3]), 0.75);
        assert_eq!(rmse(&[1.0, 3.0], &[1.0, 1.0]), 2f64.sqrt());
        assert_eq!(accuracy(&[], &[]), 0.0);
    }

    #[test]
    fn test_insufficient_rows_abort() {
        let readings = synthetic_history(49, 1, start());
        let err = fit_classifier(&readings, &quick_config()).unwrap_err();
        assert!(matches!(err, TrainingError::InsufficientData { found: 49, required: 50 }));

        let err = fit_regressor(&readings, &quick_config()).unwrap_err();
        assert!(matches!(err, TrainingError::InsufficientData { .. }));
    }

    #[test]
    fn test_insufficient_rows_persist_nothing() {
        let dir = tempfile::tempdir().unwrap();
        let store = ArtifactStore::new(dir.path());
        let readings = synthetic_history(10, 1, start());

        let result = train_and_save(ModelKind::Classifier, &readings, &quick_config(), &store, None);
        assert!(result.is_err());
        assert_eq!(std::fs::read_dir(dir.path()).unwrap().count(), 0);
    }

    #[test]
    fn test_classifier_on_simulated_floods() {
        let readings = synthetic_history(600, 42, start());
        let artifact = fit_classifier(&readings, &quick_config()).unwrap();

        assert_eq!(artifact.kind, ModelKind::Classifier);
        assert_eq!(artifact.n_features(), MODEL_FEATURES.len());
        assert_eq!(artifact.classes, RiskLabel::ALL.to_vec());
        assert_eq!(artifact.metrics.train_rows + artifact.metrics.test_rows, 600);
        let acc = artifact.metrics.accuracy.unwrap();
        assert!(acc > 0.8, "held-out accuracy {}", acc);
    }

    #[test]
    fn test_single_class_warns_but_trains() {
        // Flat water, no rain: every row is Normal
        let readings: Vec<SensorReading> = (0..60)
            .map(|i| SensorReading {
                mucnuoca: 5.0,
                mucnuocb: 4.0 + (i % 3) as f64 * 0.1,
                luuluong: 2.0,
                is_raining: Some(false),
                created_at: start() + chrono::Duration::seconds(i * 2),
                countdown_seconds: None,
            })
            .collect();

        let artifact = fit_classifier(&readings, &quick_config()).unwrap();
        assert!(!artifact.metrics.warnings.is_empty());
        assert_eq!(artifact.metrics.accuracy, Some(1.0));
    }

    #[test]
    fn test_regressor_on_simulated_floods() {
        let readings = synthetic_history(600, 42, start());
        let artifact = fit_regressor(&readings, &quick_config()).unwrap();

        assert_eq!(artifact.kind, ModelKind::Regressor);
        assert!(artifact.classes.is_empty());
        let error = artifact.metrics.rmse.unwrap();
        assert!(error.is_finite());
        assert!(artifact.metrics.warnings.is_empty());
    }

    #[test]
    fn test_train_and_save_writes_dated_artifact() {
        let dir = tempfile::tempdir().unwrap();
        let store = ArtifactStore::new(dir.path());
        let date = NaiveDate::from_ymd_opt(2025, 10, 20).unwrap();
        let readings = synthetic_history(200, 5, start());

        let report =
            train_and_save(ModelKind::Regressor, &readings, &quick_config(), &store, Some(date))
                .unwrap();
        assert_eq!(report.path, dir.path().join("time_model_2025-10-20.json"));
        assert!(report.path.is_file());
        assert_eq!(report.importances.len(), MODEL_FEATURES.len());
        assert!(report.metrics.label_counts.is_empty());
        assert!(report.metrics.mean_tree_depth <= report.metrics.max_depth as f64);
    }

    #[test]
    fn test_classifier_records_label_counts_once() {
        let dir = tempfile::tempdir().unwrap();
        let store = ArtifactStore::new(dir.path());
        let config = quick_config();
        let readings = synthetic_history(300, 9, start());

        let report = train_and_save(ModelKind::Classifier, &readings, &config, &store, None).unwrap();
        let counts = &report.metrics.label_counts;
        assert_eq!(counts.len(), RiskLabel::ALL.len());
        assert_eq!(counts.iter().map(|(_, c)| c).sum::<usize>(), 300);

        let expected = label_distribution(&derive_labels(
            &engineer_features(&readings, &config.features),
            &config.labels,
        ));
        assert_eq!(*counts, expected);

        // Counts and tree shape travel with the artifact
        let loaded = store.load(ModelKind::Classifier, &report.path).unwrap();
        assert_eq!(loaded.metrics.label_counts, expected);
        assert!(loaded.metrics.mean_leaves >= 1.0);
        assert!(loaded.metrics.mean_tree_depth <= loaded.metrics.max_depth as f64);
    }
}
