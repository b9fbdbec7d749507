/// Random forest: bootstrap-aggregated CART trees.
///
/// Tree `i` draws its bootstrap sample and feature subsets from a ChaCha8
/// stream seeded with `seed + i`, so a fixed seed reproduces the same forest.

use super::tree::{argmax, DecisionTree, TreeParams};
use super::{Dataset, EnsembleError, Task};
use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha8Rng;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ForestParams {
    pub n_trees: usize,
    pub max_depth: usize,
    pub min_samples_split: usize,
    pub min_samples_leaf: usize,
    /// Features tried per split. `None` means √n for classification and
    /// all features for regression.
    pub max_features: Option<usize>,
    pub bootstrap: bool,
    pub seed: u64,
}

impl Default for ForestParams {
    fn default() -> Self {
        Self {
            n_trees: 100,
            max_depth: 10,
            min_samples_split: 2,
            min_samples_leaf: 1,
            max_features: None,
            bootstrap: true,
            seed: 42,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RandomForest {
    task: Task,
    params: ForestParams,
    n_features: usize,
    trees: Vec<DecisionTree>,
    /// Mean impurity decrease per feature, normalized to sum to 1
    feature_importances: Vec<f64>,
}

impl RandomForest {
    pub fn fit(dataset: &Dataset, params: ForestParams) -> Result<RandomForest, EnsembleError> {
        if params.n_trees == 0 {
            return Err(EnsembleError::InvalidParams("n_trees must be >= 1"));
        }
        if params.max_depth == 0 {
            return Err(EnsembleError::InvalidParams("max_depth must be >= 1"));
        }

        let task = dataset.task();
        let n = dataset.n_samples();
        let n_features = dataset.n_features();
        let max_features = params.max_features.unwrap_or(match task {
            Task::Classification { .. } => (n_features as f64).sqrt().ceil() as usize,
            Task::Regression => n_features,
        });
        let tree_params = TreeParams {
            max_depth: params.max_depth,
            min_samples_split: params.min_samples_split,
            min_samples_leaf: params.min_samples_leaf,
            max_features: Some(max_features.clamp(1, n_features)),
        };

        let mut trees = Vec::with_capacity(params.n_trees);
        for i in 0..params.n_trees {
            let mut rng = ChaCha8Rng::seed_from_u64(params.seed.wrapping_add(i as u64));
            let sample: Vec<usize> = if params.bootstrap {
                (0..n).map(|_| rng.gen_range(0..n)).collect()
            } else {
                (0..n).collect()
            };
            trees.push(DecisionTree::fit(dataset, &sample, &tree_params, &mut rng));
        }

        let feature_importances = aggregate_importances(&trees, n_features);

        Ok(RandomForest {
            task,
            params,
            n_features,
            trees,
            feature_importances,
        })
    }

    pub fn task(&self) -> Task {
        self.task
    }

    pub fn params(&self) -> &ForestParams {
        &self.params
    }

    pub fn n_features(&self) -> usize {
        self.n_features
    }

    pub fn n_trees(&self) -> usize {
        self.trees.len()
    }

    pub fn trees(&self) -> &[DecisionTree] {
        &self.trees
    }

    pub fn feature_importances(&self) -> &[f64] {
        &self.feature_importances
    }

    /// Mean grown depth and mean leaf count over the trees.
    pub fn mean_shape(&self) -> (f64, f64) {
        if self.trees.is_empty() {
            return (0.0, 0.0);
        }
        let n = self.trees.len() as f64;
        let depth: usize = self.trees.iter().map(DecisionTree::depth).sum();
        let leaves: usize = self.trees.iter().map(|t| t.root().n_leaves()).sum();
        (depth as f64 / n, leaves as f64 / n)
    }

    fn check_width(&self, x: &[f64]) -> Result<(), EnsembleError> {
        if x.len() != self.n_features {
            return Err(EnsembleError::FeatureWidth {
                expected: self.n_features,
                found: x.len(),
            });
        }
        Ok(())
    }

    /// Class probabilities averaged over the trees.
    pub fn predict_proba(&self, x: &[f64]) -> Result<Vec<f64>, EnsembleError> {
        let Task::Classification { n_classes } = self.task else {
            return Err(EnsembleError::WrongTask("predict_proba", "regression"));
        };
        self.check_width(x)?;

        let mut probs = vec![0.0; n_classes];
        for tree in &self.trees {
            for (acc, p) in probs.iter_mut().zip(tree.predict_proba(x)) {
                *acc += p;
            }
        }
        let n_trees = self.trees.len().max(1) as f64;
        for p in &mut probs {
            *p /= n_trees;
        }
        Ok(probs)
    }

    /// Most probable class; ties resolve to the lower index.
    pub fn predict_class(&self, x: &[f64]) -> Result<usize, EnsembleError> {
        let probs = self.predict_proba(x)?;
        Ok(argmax(&probs))
    }

    /// Mean of the per-tree predictions.
    pub fn predict_value(&self, x: &[f64]) -> Result<f64, EnsembleError> {
        if self.task != Task::Regression {
            return Err(EnsembleError::WrongTask("predict_value", "classification"));
        }
        self.check_width(x)?;

        let total: f64 = self.trees.iter().map(|t| t.predict_value(x)).sum();
        Ok(total / self.trees.len().max(1) as f64)
    }
}

fn aggregate_importances(trees: &[DecisionTree], n_features: usize) -> Vec<f64> {
    let mut importances = vec![0.0; n_features];
    for tree in trees {
        let tree_total: f64 = tree.importances().iter().sum();
        if tree_total <= 0.0 {
            continue;
        }
        for (acc, imp) in importances.iter_mut().zip(tree.importances()) {
            *acc += imp / tree_total;
        }
    }

    let total: f64 = importances.iter().sum();
    if total > 0.0 {
        for imp in &mut importances {
            *imp /= total;
        }
    }
    importances
}
