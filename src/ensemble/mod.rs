/// Bagged decision-tree ensembles for the risk classifier and countdown
/// regressor.
///
/// Submodules:
/// - `tree`   — CART tree (gini for classes, variance for values)
/// - `forest` — bootstrap ensemble of trees, seeded for reproducibility
///
/// Both types derive serde so fitted models persist as JSON artifacts.

pub mod forest;
pub mod tree;

pub use forest::{ForestParams, RandomForest};
pub use tree::{DecisionTree, Node, TreeParams};

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// What the ensemble learns.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Task {
    Classification { n_classes: usize },
    Regression,
}

/// Training targets, one per feature row.
#[derive(Debug, Clone, PartialEq)]
pub enum Targets {
    /// Class indices in `0..n_classes`
    Classes { labels: Vec<usize>, n_classes: usize },
    Values(Vec<f64>),
}

impl Targets {
    pub fn len(&self) -> usize {
        match self {
            Targets::Classes { labels, .. } => labels.len(),
            Targets::Values(values) => values.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn task(&self) -> Task {
        match self {
            Targets::Classes { n_classes, .. } => Task::Classification { n_classes: *n_classes },
            Targets::Values(_) => Task::Regression,
        }
    }
}

/// Feature matrix plus targets, validated on construction.
#[derive(Debug, Clone)]
pub struct Dataset {
    features: Vec<Vec<f64>>,
    targets: Targets,
    n_features: usize,
}

impl Dataset {
    pub fn new(features: Vec<Vec<f64>>, targets: Targets) -> Result<Self, EnsembleError> {
        if features.is_empty() {
            return Err(EnsembleError::EmptyDataset);
        }
        if features.len() != targets.len() {
            return Err(EnsembleError::TargetCount {
                rows: features.len(),
                targets: targets.len(),
            });
        }

        let n_features = features[0].len();
        if n_features == 0 {
            return Err(EnsembleError::EmptyDataset);
        }
        if let Some(row) = features.iter().find(|row| row.len() != n_features) {
            return Err(EnsembleError::FeatureWidth {
                expected: n_features,
                found: row.len(),
            });
        }

        match &targets {
            Targets::Classes { labels, n_classes } => {
                if *n_classes == 0 {
                    return Err(EnsembleError::EmptyDataset);
                }
                if let Some(&label) = labels.iter().find(|&&l| l >= *n_classes) {
                    return Err(EnsembleError::ClassOutOfRange {
                        label,
                        n_classes: *n_classes,
                    });
                }
            }
            Targets::Values(values) => {
                if values.iter().any(|v| !v.is_finite()) {
                    return Err(EnsembleError::NonFiniteTarget);
                }
            }
        }

        Ok(Self { features, targets, n_features })
    }

    pub fn n_samples(&self) -> usize {
        self.features.len()
    }

    pub fn n_features(&self) -> usize {
        self.n_features
    }

    pub fn features(&self) -> &[Vec<f64>] {
        &self.features
    }

    pub fn targets(&self) -> &Targets {
        &self.targets
    }

    pub fn task(&self) -> Task {
        self.targets.task()
    }
}

#[derive(Debug, Error, PartialEq)]
pub enum EnsembleError {
    #[error("dataset has no rows or no features")]
    EmptyDataset,
    #[error("{rows} feature rows but {targets} targets")]
    TargetCount { rows: usize, targets: usize },
    #[error("feature vector has {found} values, expected {expected}")]
    FeatureWidth { expected: usize, found: usize },
    #[error("class label {label} out of range for {n_classes} classes")]
    ClassOutOfRange { label: usize, n_classes: usize },
    #[error("regression target is not finite")]
    NonFiniteTarget,
    #[error("{0} is not supported by a {1} ensemble")]
    WrongTask(&'static str, &'static str),
    #[error("invalid ensemble parameters: {0}")]
    InvalidParams(&'static str),
}
