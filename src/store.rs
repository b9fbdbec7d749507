/// Model artifact persistence.
///
/// A trained ensemble is written as one JSON document wrapping the forest
/// with the metadata the serving layer needs (feature names, class order,
/// training metrics). File names follow the deployment convention:
///
/// - `flood_model_<YYYY-MM-DD>.json` / `time_model_<YYYY-MM-DD>.json` for
///   models trained on the current day's rows
/// - `flood_model.json` / `time_model.json` for historical models
///
/// Loading prefers today's dated artifact and falls back to the generic one.

use crate::ensemble::{RandomForest, Task};
use crate::model::RiskLabel;
use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use thiserror::Error;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ModelKind {
    /// Risk label classifier
    Classifier,
    /// Countdown-to-danger regressor
    Regressor,
}

impl ModelKind {
    pub fn file_stem(&self) -> &'static str {
        match self {
            ModelKind::Classifier => "flood_model",
            ModelKind::Regressor => "time_model",
        }
    }
}

impl std::fmt::Display for ModelKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(match self {
            ModelKind::Classifier => "classifier",
            ModelKind::Regressor => "regressor",
        })
    }
}

/// Held-out evaluation recorded at training time.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ModelMetrics {
    pub train_rows: usize,
    pub test_rows: usize,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub accuracy: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub rmse: Option<f64>,
    pub n_trees: usize,
    pub max_depth: usize,
    /// Depth and leaf count actually grown, averaged over the trees
    #[serde(default)]
    pub mean_tree_depth: f64,
    #[serde(default)]
    pub mean_leaves: f64,
    /// Training rows per label, in severity order; classifier only
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub label_counts: Vec<(RiskLabel, usize)>,
    #[serde(default)]
    pub warnings: Vec<String>,
}

/// Persisted form of a trained model.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ModelArtifact {
    pub kind: ModelKind,
    /// Feature names in model input order
    pub feature_names: Vec<String>,
    /// Class order of the classifier's probability vector; empty for the regressor
    #[serde(default)]
    pub classes: Vec<RiskLabel>,
    pub trained_at: DateTime<Utc>,
    pub n_samples: usize,
    pub metrics: ModelMetrics,
    pub forest: RandomForest,
}

impl ModelArtifact {
    pub fn n_features(&self) -> usize {
        self.feature_names.len()
    }

    /// Fits a supplied vector to the model's width.
    ///
    /// Extra trailing values are dropped; returns `None` when the model
    /// expects more values than were supplied.
    pub fn align_features<'a>(&self, supplied: &'a [f64]) -> Option<&'a [f64]> {
        supplied.get(..self.n_features())
    }

    /// Feature names paired with their importances, highest first.
    pub fn importance_ranking(&self) -> Vec<(&str, f64)> {
        let mut ranking: Vec<(&str, f64)> = self
            .feature_names
            .iter()
            .map(String::as_str)
            .zip(self.forest.feature_importances().iter().copied())
            .collect();
        ranking.sort_by(|a, b| b.1.total_cmp(&a.1));
        ranking
    }

    fn check_consistency(&self, expected: ModelKind) -> Result<(), String> {
        if self.kind != expected {
            return Err(format!("artifact holds a {}, expected a {}", self.kind, expected));
        }
        if self.forest.n_features() != self.n_features() {
            return Err(format!(
                "forest expects {} features but {} names are recorded",
                self.forest.n_features(),
                self.n_features()
            ));
        }
        match (self.kind, self.forest.task()) {
            (ModelKind::Classifier, Task::Classification { n_classes }) => {
                if n_classes != self.classes.len() {
                    return Err(format!(
                        "forest has {} classes but {} labels are recorded",
                        n_classes,
                        self.classes.len()
                    ));
                }
            }
            (ModelKind::Regressor, Task::Regression) => {}
            _ => return Err("forest task does not match artifact kind".into()),
        }
        Ok(())
    }
}

#[derive(Debug, Error)]
pub enum ModelStoreError {
    #[error("failed to access {}: {source}", path.display())]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },
    #[error("failed to serialize model: {0}")]
    Serialize(#[source] serde_json::Error),
    #[error("failed to parse {}: {source}", path.display())]
    Parse {
        path: PathBuf,
        source: serde_json::Error,
    },
    #[error("invalid artifact {}: {reason}", path.display())]
    Invalid { path: PathBuf, reason: String },
}

/// Directory of model artifacts.
#[derive(Debug, Clone)]
pub struct ArtifactStore {
    dir: PathBuf,
}

impl ArtifactStore {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    pub fn generic_path(&self, kind: ModelKind) -> PathBuf {
        self.dir.join(format!("{}.json", kind.file_stem()))
    }

    pub fn dated_path(&self, kind: ModelKind, date: NaiveDate) -> PathBuf {
        self.dir
            .join(format!("{}_{}.json", kind.file_stem(), date.format("%Y-%m-%d")))
    }

    /// Today's dated artifact if present, otherwise the generic one.
    pub fn resolve(&self, kind: ModelKind, today: NaiveDate) -> Option<PathBuf> {
        [self.dated_path(kind, today), self.generic_path(kind)]
            .into_iter()
            .find(|path| path.is_file())
    }

    /// Writes `artifact` under its dated name when `date` is given, else
    /// its generic name. Written to a temporary file first and renamed so a
    /// concurrent reload never sees a partial file.
    pub fn save(
        &self,
        artifact: &ModelArtifact,
        date: Option<NaiveDate>,
    ) -> Result<PathBuf, ModelStoreError> {
        let path = match date {
            Some(date) => self.dated_path(artifact.kind, date),
            None => self.generic_path(artifact.kind),
        };

        fs::create_dir_all(&self.dir).map_err(|source| ModelStoreError::Io {
            path: self.dir.clone(),
            source,
        })?;

        let json = serde_json::to_vec(artifact).map_err(ModelStoreError::Serialize)?;
        let tmp = path.with_extension("json.tmp");
        fs::write(&tmp, json).map_err(|source| ModelStoreError::Io {
            path: tmp.clone(),
            source,
        })?;
        fs::rename(&tmp, &path).map_err(|source| ModelStoreError::Io {
            path: path.clone(),
            source,
        })?;

        log::info!("saved {} artifact to {}", artifact.kind, path.display());
        Ok(path)
    }

    /// Reads and validates one artifact file.
    pub fn load(&self, kind: ModelKind, path: &Path) -> Result<ModelArtifact, ModelStoreError> {
        let bytes = fs::read(path).map_err(|source| ModelStoreError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        let artifact: ModelArtifact =
            serde_json::from_slice(&bytes).map_err(|source| ModelStoreError::Parse {
                path: path.to_path_buf(),
                source,
            })?;
        artifact
            .check_consistency(kind)
            .map_err(|reason| ModelStoreError::Invalid {
                path: path.to_path_buf(),
                reason,
            })?;
        Ok(artifact)
    }

    /// Loads the preferred artifact for `kind`, or `None` if neither file exists.
    pub fn load_latest(
        &self,
        kind: ModelKind,
        today: NaiveDate,
    ) -> Result<Option<(PathBuf, ModelArtifact)>, ModelStoreError> {
        match self.resolve(kind, today) {
            Some(path) => {
                let artifact = self.load(kind, &path)?;
                Ok(Some((path, artifact)))
            }
            None => Ok(None),
        }
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ensemble::{Dataset, ForestParams, Targets};

    fn classifier_artifact(n_features: usize) -> ModelArtifact {
        let features: Vec<Vec<f64>> = (0..40)
            .map(|i| (0..n_features).map(|j| (i * (j + 1)) as f64).collect())
            .collect();
        let labels: Vec<usize> = (0..40).map(|i| i / 10).collect();
        let dataset = Dataset::new(features, Targets::Classes { labels, n_classes: 4 }).unwrap();
        let forest =
            RandomForest::fit(&dataset, ForestParams { n_trees: 3, ..ForestParams::default() })
                .unwrap();

        ModelArtifact {
            kind: ModelKind::Classifier,
            feature_names: (0..n_features).map(|j| format!("f{}", j)).collect(),
            classes: RiskLabel::ALL.to_vec(),
            trained_at: Utc::now(),
            n_samples: 40,
            metrics: ModelMetrics::default(),
            forest,
        }
    }

    fn today() -> NaiveDate {
        NaiveDate::from_ymd_opt(2025, 10, 20).unwrap()
    }

    #[test]
    fn test_artifact_file_names() {
        let store = ArtifactStore::new("/models");
        assert_eq!(
            store.dated_path(ModelKind::Classifier, today()),
            PathBuf::from("/models/flood_model_2025-10-20.json")
        );
        assert_eq!(
            store.generic_path(ModelKind::Regressor),
            PathBuf::from("/models/time_model.json")
        );
    }

    #[test]
    fn test_resolve_prefers_dated_then_generic() {
        let dir = tempfile::tempdir().unwrap();
        let store = ArtifactStore::new(dir.path());
        assert_eq!(store.resolve(ModelKind::Classifier, today()), None);

        let artifact = classifier_artifact(3);
        let generic = store.save(&artifact, None).unwrap();
        assert_eq!(store.resolve(ModelKind::Classifier, today()), Some(generic.clone()));

        let dated = store.save(&artifact, Some(today())).unwrap();
        assert_eq!(store.resolve(ModelKind::Classifier, today()), Some(dated));

        // Yesterday's dated file does not count as today's
        let tomorrow = today().succ_opt().unwrap();
        assert_eq!(store.resolve(ModelKind::Classifier, tomorrow), Some(generic));
    }

    #[test]
    fn test_save_then_load() {
        let dir = tempfile::tempdir().unwrap();
        let store = ArtifactStore::new(dir.path());
        let artifact = classifier_artifact(3);
        store.save(&artifact, None).unwrap();

        let (path, loaded) = store
            .load_latest(ModelKind::Classifier, today())
            .unwrap()
            .expect("artifact should be found");
        assert_eq!(path, store.generic_path(ModelKind::Classifier));
        assert_eq!(loaded.classes, artifact.classes);
        assert_eq!(loaded.feature_names, artifact.feature_names);
        assert!(!path.with_extension("json.tmp").exists());
    }

    #[test]
    fn test_load_rejects_wrong_kind() {
        let dir = tempfile::tempdir().unwrap();
        let store = ArtifactStore::new(dir.path());
        let path = store.save(&classifier_artifact(2), None).unwrap();

        let err = store.load(ModelKind::Regressor, &path).unwrap_err();
        assert!(matches!(err, ModelStoreError::Invalid { .. }));
    }

    #[test]
    fn test_load_rejects_corrupt_file() {
        let dir = tempfile::tempdir().unwrap();
        let store = ArtifactStore::new(dir.path());
        let path = store.generic_path(ModelKind::Classifier);
        fs::write(&path, b"{not json").unwrap();

        let err = store.load(ModelKind::Classifier, &path).unwrap_err();
        assert!(matches!(err, ModelStoreError::Parse { .. }));
    }

    #[test]
    fn test_align_features_truncates_or_refuses() {
        let artifact = classifier_artifact(7);
        let nine = [1.0, 2.0, 3.0, 4.0, 5.0, 6.0, 7.0, 8.0, 9.0];
        assert_eq!(artifact.align_features(&nine), Some(&nine[..7]));
        assert_eq!(artifact.align_features(&nine[..7]), Some(&nine[..7]));
        assert_eq!(artifact.align_features(&nine[..5]), None);
    }

    #[test]
    fn test_importance_ranking_sorted() {
        let artifact = classifier_artifact(3);
        let ranking = artifact.importance_ranking();
        assert_eq!(ranking.len(), 3);
        for pair in ranking.windows(2) {
            assert!(pair[0].1 >= pair[1].1);
        }
    }
}
