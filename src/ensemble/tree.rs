/// CART decision tree.
///
/// Splits are chosen by a sorted sweep over each candidate feature, keeping
/// running class counts (gini) or running sums (variance) for both sides so
/// each feature costs one sort plus a linear pass.

use super::{Dataset, Targets, Task};
use rand::seq::SliceRandom;
use rand_chacha::ChaCha8Rng;
use serde::{Deserialize, Serialize};

/// Nodes with impurity at or below this are not split further.
const PURE_IMPURITY: f64 = 1e-12;

/// Growth limits for a single tree.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct TreeParams {
    pub max_depth: usize,
    pub min_samples_split: usize,
    pub min_samples_leaf: usize,
    /// Features tried per split; `None` tries all of them.
    pub max_features: Option<usize>,
}

impl Default for TreeParams {
    fn default() -> Self {
        Self {
            max_depth: 10,
            min_samples_split: 2,
            min_samples_leaf: 1,
            max_features: None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Node {
    Leaf {
        /// Mean target (regression) or majority class index (classification)
        value: f64,
        #[serde(default, skip_serializing_if = "Vec::is_empty")]
        class_probs: Vec<f64>,
        n_samples: usize,
    },
    Split {
        feature_idx: usize,
        /// Rows with `x[feature_idx] <= threshold` go left
        threshold: f64,
        n_samples: usize,
        left: Box<Node>,
        right: Box<Node>,
    },
}

impl Node {
    pub fn n_samples(&self) -> usize {
        match self {
            Node::Leaf { n_samples, .. } | Node::Split { n_samples, .. } => *n_samples,
        }
    }

    /// Depth counted in split levels; a lone leaf has depth 0.
    pub fn depth(&self) -> usize {
        match self {
            Node::Leaf { .. } => 0,
            Node::Split { left, right, .. } => 1 + left.depth().max(right.depth()),
        }
    }

    pub fn n_leaves(&self) -> usize {
        match self {
            Node::Leaf { .. } => 1,
            Node::Split { left, right, .. } => left.n_leaves() + right.n_leaves(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DecisionTree {
    task: Task,
    n_features: usize,
    root: Node,
    /// Total impurity decrease per feature, unnormalized
    importances: Vec<f64>,
}

impl DecisionTree {
    /// Grows a tree on the rows of `dataset` listed in `sample`.
    ///
    /// `sample` may repeat indices (bootstrap draws). `rng` drives the
    /// per-split feature subsampling.
    pub fn fit(
        dataset: &Dataset,
        sample: &[usize],
        params: &TreeParams,
        rng: &mut ChaCha8Rng,
    ) -> DecisionTree {
        let mut builder = Builder {
            dataset,
            params,
            importances: vec![0.0; dataset.n_features()],
        };
        let root = builder.grow(sample.to_vec(), 0, rng);

        DecisionTree {
            task: dataset.task(),
            n_features: dataset.n_features(),
            root,
            importances: builder.importances,
        }
    }

    pub fn task(&self) -> Task {
        self.task
    }

    pub fn n_features(&self) -> usize {
        self.n_features
    }

    pub fn root(&self) -> &Node {
        &self.root
    }

    pub fn importances(&self) -> &[f64] {
        &self.importances
    }

    pub fn depth(&self) -> usize {
        self.root.depth()
    }

    /// Leaf reached by `x`. Callers check the width first.
    pub fn leaf(&self, x: &[f64]) -> &Node {
        let mut node = &self.root;
        while let Node::Split { feature_idx, threshold, left, right, .. } = node {
            let value = x.get(*feature_idx).copied().unwrap_or(0.0);
            node = if value <= *threshold { left } else { right };
        }
        node
    }

    pub fn predict_value(&self, x: &[f64]) -> f64 {
        match self.leaf(x) {
            Node::Leaf { value, .. } => *value,
            Node::Split { .. } => 0.0,
        }
    }

    pub fn predict_proba(&self, x: &[f64]) -> &[f64] {
        match self.leaf(x) {
            Node::Leaf { class_probs, .. } => class_probs,
            Node::Split { .. } => &[],
        }
    }
}

// ---------------------------------------------------------------------------
// Impurity accumulators
// ---------------------------------------------------------------------------

#[derive(Debug, Clone)]
enum Stats {
    Classes { counts: Vec<f64>, n: f64 },
    Values { sum: f64, sum_sq: f64, n: f64 },
}

impl Stats {
    fn empty(task: Task) -> Stats {
        match task {
            Task::Classification { n_classes } => Stats::Classes {
                counts: vec![0.0; n_classes],
                n: 0.0,
            },
            Task::Regression => Stats::Values { sum: 0.0, sum_sq: 0.0, n: 0.0 },
        }
    }

    fn of(targets: &Targets, task: Task, indices: &[usize]) -> Stats {
        let mut stats = Stats::empty(task);
        for &i in indices {
            stats.add(targets, i);
        }
        stats
    }

    fn add(&mut self, targets: &Targets, i: usize) {
        self.shift(targets, i, 1.0);
    }

    fn remove(&mut self, targets: &Targets, i: usize) {
        self.shift(targets, i, -1.0);
    }

    fn shift(&mut self, targets: &Targets, i: usize, sign: f64) {
        match (self, targets) {
            (Stats::Classes { counts, n }, Targets::Classes { labels, .. }) => {
                counts[labels[i]] += sign;
                *n += sign;
            }
            (Stats::Values { sum, sum_sq, n }, Targets::Values(values)) => {
                let y = values[i];
                *sum += sign * y;
                *sum_sq += sign * y * y;
                *n += sign;
            }
            _ => {}
        }
    }

    fn count(&self) -> f64 {
        match self {
            Stats::Classes { n, .. } | Stats::Values { n, .. } => *n,
        }
    }

    /// Gini impurity or population variance.
    fn impurity(&self) -> f64 {
        match self {
            Stats::Classes { counts, n } => {
                if *n <= 0.0 {
                    return 0.0;
                }
                1.0 - counts.iter().map(|c| (c / n) * (c / n)).sum::<f64>()
            }
            Stats::Values { sum, sum_sq, n } => {
                if *n <= 0.0 {
                    return 0.0;
                }
                let mean = sum / n;
                (sum_sq / n - mean * mean).max(0.0)
            }
        }
    }

    fn leaf(&self) -> Node {
        let n_samples = self.count().round() as usize;
        match self {
            Stats::Classes { counts, n } => {
                let class_probs: Vec<f64> = if *n > 0.0 {
                    counts.iter().map(|c| c / n).collect()
                } else {
                    vec![1.0 / counts.len() as f64; counts.len()]
                };
                Node::Leaf {
                    value: argmax(&class_probs) as f64,
                    class_probs,
                    n_samples,
                }
            }
            Stats::Values { sum, n, .. } => Node::Leaf {
                value: if *n > 0.0 { sum / n } else { 0.0 },
                class_probs: Vec::new(),
                n_samples,
            },
        }
    }
}

/// Index of the largest value; ties resolve to the lowest index.
pub(crate) fn argmax(values: &[f64]) -> usize {
    let mut best = 0;
    for (i, v) in values.iter().enumerate() {
        if *v > values[best] {
            best = i;
        }
    }
    best
}

// ---------------------------------------------------------------------------
// Growth
// ---------------------------------------------------------------------------

struct Builder<'a> {
    dataset: &'a Dataset,
    params: &'a TreeParams,
    importances: Vec<f64>,
}

struct BestSplit {
    feature_idx: usize,
    threshold: f64,
    gain: f64,
}

impl Builder<'_> {
    fn grow(&mut self, indices: Vec<usize>, depth: usize, rng: &mut ChaCha8Rng) -> Node {
        let targets = self.dataset.targets();
        let stats = Stats::of(targets, self.dataset.task(), &indices);
        let n = indices.len();
        let impurity = stats.impurity();

        if depth >= self.params.max_depth
            || n < self.params.min_samples_split.max(2)
            || n < 2 * self.params.min_samples_leaf.max(1)
            || impurity <= PURE_IMPURITY
        {
            return stats.leaf();
        }

        let Some(best) = self.best_split(&indices, &stats, impurity, rng) else {
            return stats.leaf();
        };

        self.importances[best.feature_idx] += best.gain * n as f64;

        let features = self.dataset.features();
        let (left_idx, right_idx): (Vec<usize>, Vec<usize>) = indices
            .iter()
            .partition(|&&i| features[i][best.feature_idx] <= best.threshold);

        let left = self.grow(left_idx, depth + 1, rng);
        let right = self.grow(right_idx, depth + 1, rng);

        Node::Split {
            feature_idx: best.feature_idx,
            threshold: best.threshold,
            n_samples: n,
            left: Box::new(left),
            right: Box::new(right),
        }
    }

    fn best_split(
        &self,
        indices: &[usize],
        parent: &Stats,
        parent_impurity: f64,
        rng: &mut ChaCha8Rng,
    ) -> Option<BestSplit> {
        let n_features = self.dataset.n_features();
        let max_features = self.params.max_features.unwrap_or(n_features).clamp(1, n_features);

        let mut candidates: Vec<usize> = (0..n_features).collect();
        candidates.shuffle(rng);
        candidates.truncate(max_features);

        let features = self.dataset.features();
        let targets = self.dataset.targets();
        let min_leaf = self.params.min_samples_leaf.max(1);
        let n = indices.len();

        let mut best: Option<BestSplit> = None;
        let mut best_gain = 0.0;

        for feature_idx in candidates {
            let mut sorted: Vec<(f64, usize)> =
                indices.iter().map(|&i| (features[i][feature_idx], i)).collect();
            sorted.sort_by(|a, b| a.0.total_cmp(&b.0));

            let mut left = Stats::empty(self.dataset.task());
            let mut right = parent.clone();

            for pos in 0..n - 1 {
                let (value, i) = sorted[pos];
                left.add(targets, i);
                right.remove(targets, i);

                let next = sorted[pos + 1].0;
                if value == next {
                    continue;
                }
                let n_left = pos + 1;
                let n_right = n - n_left;
                if n_left < min_leaf || n_right < min_leaf {
                    continue;
                }

                let weighted = (n_left as f64 * left.impurity()
                    + n_right as f64 * right.impurity())
                    / n as f64;
                let gain = parent_impurity - weighted;

                if gain > best_gain {
                    best_gain = gain;
                    best = Some(BestSplit {
                        feature_idx,
                        threshold: midpoint(value, next),
                        gain,
                    });
                }
            }
        }

        best
    }
}

/// Threshold strictly below `hi` so `hi` always routes right.
fn midpoint(lo: f64, hi: f64) -> f64 {
    let mid = lo + (hi - lo) / 2.0;
    if mid < hi { mid } else { lo }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
