//! Regression trees (CART with squared error criterion) used as the base
//! learners of forests and quantile boosting.
use ndarray::{ArrayView1, ArrayView2};
use ndarray_rand::rand::Rng;
use serde::{Deserialize, Serialize};

/// Strategy used to choose the split threshold at each node
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum Splitter {
    /// Best threshold among all midpoints
    Best,
    /// One threshold drawn uniformly between the feature min and max (extra trees)
    Random,
}

/// Number of features examined at each split
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum MaxFeatures {
    /// Every feature
    All,
    /// Given number of randomly drawn features
    Count(usize),
}

/// Regression tree hyperparameters
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct TreeParams {
    pub(crate) splitter: Splitter,
    pub(crate) max_features: MaxFeatures,
    pub(crate) min_samples_leaf: usize,
    pub(crate) min_samples_split: usize,
    pub(crate) max_depth: Option<usize>,
}

impl Default for TreeParams {
    fn default() -> Self {
        TreeParams {
            splitter: Splitter::Best,
            max_features: MaxFeatures::All,
            min_samples_leaf: 1,
            min_samples_split: 2,
            max_depth: None,
        }
    }
}

impl TreeParams {
    /// Set the split strategy
    pub fn splitter(mut self, splitter: Splitter) -> Self {
        self.splitter = splitter;
        self
    }

    /// Set the number of features examined at each split
    pub fn max_features(mut self, max_features: MaxFeatures) -> Self {
        self.max_features = max_features;
        self
    }

    /// Set the minimum number of samples in a leaf (at least 1)
    pub fn min_samples_leaf(mut self, min_samples_leaf: usize) -> Self {
        self.min_samples_leaf = min_samples_leaf.max(1);
        self
    }

    /// Set the maximum depth of the tree
    pub fn max_depth(mut self, max_depth: Option<usize>) -> Self {
        self.max_depth = max_depth;
        self
    }

    /// Grow a tree on the rows `samples` of `(x, y)` (duplicates allowed, see bootstrap)
    pub fn fit<R: Rng>(
        &self,
        x: &ArrayView2<f64>,
        y: &ArrayView1<f64>,
        samples: Vec<usize>,
        rng: &mut R,
    ) -> RegressionTree {
        let mut nodes = vec![Node::Leaf {
            value: 0.,
            variance: 0.,
        }];
        let mut stack = vec![(0, samples, 0)];
        while let Some((id, samples, depth)) = stack.pop() {
            let (mean, variance) = mean_var(y, &samples);
            let splittable = samples.len() >= self.min_samples_split.max(2 * self.min_samples_leaf)
                && self.max_depth.map_or(true, |d| depth < d)
                && variance > 0.;
            let split = if splittable {
                self.find_split(x, y, &samples, rng)
            } else {
                None
            };
            match split {
                Some((feature, threshold)) => {
                    let (left, right): (Vec<usize>, Vec<usize>) = samples
                        .into_iter()
                        .partition(|&i| x[[i, feature]] <= threshold);
                    let left_id = nodes.len();
                    nodes.push(Node::Leaf {
                        value: 0.,
                        variance: 0.,
                    });
                    nodes.push(Node::Leaf {
                        value: 0.,
                        variance: 0.,
                    });
                    nodes[id] = Node::Split {
                        feature,
                        threshold,
                        left: left_id,
                        right: left_id + 1,
                    };
                    stack.push((left_id, left, depth + 1));
                    stack.push((left_id + 1, right, depth + 1));
                }
                None => {
                    nodes[id] = Node::Leaf {
                        value: mean,
                        variance,
                    }
                }
            }
        }
        RegressionTree {
            nodes,
            nx: x.ncols(),
        }
    }

    fn find_split<R: Rng>(
        &self,
        x: &ArrayView2<f64>,
        y: &ArrayView1<f64>,
        samples: &[usize],
        rng: &mut R,
    ) -> Option<(usize, f64)> {
        let nx = x.ncols();
        let n_features = match self.max_features {
            MaxFeatures::All => nx,
            MaxFeatures::Count(k) => k.clamp(1, nx),
        };
        let mut features: Vec<usize> = (0..nx).collect();
        let mut best: Option<(f64, usize, f64)> = None;
        let mut visited = 0;
        // Features constant within the node do not count as visited
        for i in 0..nx {
            if visited >= n_features {
                break;
            }
            let j = rng.gen_range(i..nx);
            features.swap(i, j);
            let feature = features[i];
            let (lo, up) = samples.iter().fold((f64::INFINITY, f64::NEG_INFINITY), |acc, &s| {
                (acc.0.min(x[[s, feature]]), acc.1.max(x[[s, feature]]))
            });
            if lo >= up {
                continue;
            }
            visited += 1;
            let candidate = match self.splitter {
                Splitter::Best => self.best_threshold(x, y, samples, feature),
                Splitter::Random => {
                    self.random_threshold(x, y, samples, feature, rng.gen_range(lo..up))
                }
            };
            if let Some((score, threshold)) = candidate {
                if best.map_or(true, |b| score > b.0) {
                    best = Some((score, feature, threshold));
                }
            }
        }
        best.map(|(_, feature, threshold)| (feature, threshold))
    }

    // Score is sum_left^2 / n_left + sum_right^2 / n_right, maximizing it
    // minimizes the total squared error of the children.
    fn best_threshold(
        &self,
        x: &ArrayView2<f64>,
        y: &ArrayView1<f64>,
        samples: &[usize],
        feature: usize,
    ) -> Option<(f64, f64)> {
        let mut sorted: Vec<(f64, f64)> = samples.iter().map(|&i| (x[[i, feature]], y[i])).collect();
        sorted.sort_by(|a, b| a.0.total_cmp(&b.0));
        let n = sorted.len();
        let total: f64 = sorted.iter().map(|v| v.1).sum();
        let min_leaf = self.min_samples_leaf;
        let mut sum_left = 0.;
        let mut best: Option<(f64, f64)> = None;
        for k in 1..n {
            sum_left += sorted[k - 1].1;
            if k < min_leaf || n - k < min_leaf || sorted[k - 1].0 >= sorted[k].0 {
                continue;
            }
            let sum_right = total - sum_left;
            let score = sum_left * sum_left / k as f64 + sum_right * sum_right / (n - k) as f64;
            if best.map_or(true, |b| score > b.0) {
                let (a, b) = (sorted[k - 1].0, sorted[k].0);
                let mut threshold = a + (b - a) / 2.;
                if threshold >= b {
                    threshold = a;
                }
                best = Some((score, threshold));
            }
        }
        best
    }

    fn random_threshold(
        &self,
        x: &ArrayView2<f64>,
        y: &ArrayView1<f64>,
        samples: &[usize],
        feature: usize,
        threshold: f64,
    ) -> Option<(f64, f64)> {
        let (mut n_left, mut sum_left, mut sum_right) = (0, 0., 0.);
        for &i in samples {
            if x[[i, feature]] <= threshold {
                n_left += 1;
                sum_left += y[i];
            } else {
                sum_right += y[i];
            }
        }
        let n_right = samples.len() - n_left;
        if n_left < self.min_samples_leaf || n_right < self.min_samples_leaf {
            return None;
        }
        let score = sum_left * sum_left / n_left as f64 + sum_right * sum_right / n_right as f64;
        Some((score, threshold))
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
enum Node {
    Leaf {
        value: f64,
        variance: f64,
    },
    Split {
        feature: usize,
        threshold: f64,
        left: usize,
        right: usize,
    },
}

/// A fitted regression tree
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct RegressionTree {
    nodes: Vec<Node>,
    nx: usize,
}

impl RegressionTree {
    /// Index of the leaf reached by `x`
    pub fn leaf_index(&self, x: &ArrayView1<f64>) -> usize {
        let mut id = 0;
        while let Node::Split {
            feature,
            threshold,
            left,
            right,
        } = &self.nodes[id]
        {
            id = if x[*feature] <= *threshold {
                *left
            } else {
                *right
            };
        }
        id
    }

    /// Value and variance of training outputs in the leaf reached by `x`
    pub fn predict_leaf(&self, x: &ArrayView1<f64>) -> (f64, f64) {
        match &self.nodes[self.leaf_index(x)] {
            Node::Leaf { value, variance } => (*value, *variance),
            Node::Split { .. } => (f64::NAN, f64::NAN),
        }
    }

    /// Predicted value at `x`
    pub fn predict_one(&self, x: &ArrayView1<f64>) -> f64 {
        self.predict_leaf(x).0
    }

    /// Replace the value of the leaf `index` (no-op on a split node)
    pub fn set_leaf_value(&mut self, index: usize, new_value: f64) {
        if let Some(Node::Leaf { value, .. }) = self.nodes.get_mut(index) {
            *value = new_value;
        }
    }

    /// Number of leaves
    pub fn n_leaves(&self) -> usize {
        self.nodes
            .iter()
            .filter(|n| matches!(n, Node::Leaf { .. }))
            .count()
    }

    /// Number of input features
    pub fn nx(&self) -> usize {
        self.nx
    }
}

fn mean_var(y: &ArrayView1<f64>, samples: &[usize]) -> (f64, f64) {
    let n = samples.len() as f64;
    if samples.is_empty() {
        return (0., 0.);
    }
    let mean = samples.iter().map(|&i| y[i]).sum::<f64>() / n;
    let var = samples.iter().map(|&i| (y[i] - mean).powi(2)).sum::<f64>() / n;
    (mean, var)
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_abs_diff_eq;
    use ndarray::{Array1, Array2};
    use ndarray_rand::rand::SeedableRng;
    use rand_xoshiro::Xoshiro256Plus;

    fn step_data() -> (Array2<f64>, Array1<f64>) {
        let x = Array2::from_shape_fn((20, 2), |(i, j)| if j == 0 { i as f64 / 19. } else { 0.3 });
        let y = x.column(0).mapv(|v| if v < 0.5 { 1. } else { 5. });
        (x, y)
    }

    #[test]
    fn test_best_split_recovers_step() {
        let (x, y) = step_data();
        let mut rng = Xoshiro256Plus::seed_from_u64(0);
        let tree = TreeParams::default().fit(&x.view(), &y.view(), (0..20).collect(), &mut rng);
        assert_eq!(tree.n_leaves(), 2);
        assert_abs_diff_eq!(tree.predict_one(&Array1::from(vec![0.1, 0.3]).view()), 1.);
        assert_abs_diff_eq!(tree.predict_one(&Array1::from(vec![0.9, 0.3]).view()), 5.);
        assert_abs_diff_eq!(tree.predict_leaf(&Array1::from(vec![0.9, 0.]).view()).1, 0.);
    }

    #[test]
    fn test_random_split_min_samples_leaf() {
        let (x, y) = step_data();
        let mut rng = Xoshiro256Plus::seed_from_u64(1);
        let params = TreeParams::default()
            .splitter(Splitter::Random)
            .min_samples_leaf(3);
        let tree = params.fit(&x.view(), &y.view(), (0..20).collect(), &mut rng);
        // every leaf holds at least 3 samples
        let mut counts = std::collections::HashMap::new();
        for row in x.rows() {
            *counts.entry(tree.leaf_index(&row)).or_insert(0) += 1;
        }
        assert!(counts.values().all(|&c| c >= 3));
        for (row, yi) in x.rows().into_iter().zip(y.iter()) {
            assert_abs_diff_eq!(tree.predict_one(&row), *yi, epsilon = 4.);
        }
    }

    #[test]
    fn test_max_depth() {
        let x = Array2::from_shape_fn((32, 1), |(i, _)| i as f64);
        let y = x.column(0).mapv(|v| v * v);
        let mut rng = Xoshiro256Plus::seed_from_u64(2);
        let tree = TreeParams::default()
            .max_depth(Some(2))
            .fit(&x.view(), &y.view(), (0..32).collect(), &mut rng);
        assert_eq!(tree.n_leaves(), 4);
    }
}
