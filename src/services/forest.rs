//! Seeded random forest classifier.
//!
//! Bootstrap-sampled gini trees with a random feature subset per split.
//! Class probabilities are the mean leaf frequency across trees.

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use rayon::prelude::*;
use serde::{Deserialize, Serialize};

use crate::error::{EngineError, Result};
use crate::utils::normalize_probabilities;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ForestParams {
    pub n_trees: usize,
    pub max_depth: usize,
    pub min_samples_split: usize,
    pub min_samples_leaf: usize,
    /// Features tried per split; `None` means sqrt(n_features)
    #[serde(default)]
    pub max_features: Option<usize>,
}

impl Default for ForestParams {
    fn default() -> Self {
        Self {
            n_trees: 200,
            max_depth: 10,
            min_samples_split: 5,
            min_samples_leaf: 2,
            max_features: None,
        }
    }
}

impl ForestParams {
    pub fn validate(&self, n_features: usize) -> Result<()> {
        let problem = if self.n_trees == 0 {
            Some("n_trees must be at least 1".to_string())
        } else if self.max_depth == 0 {
            Some("max_depth must be at least 1".to_string())
        } else if self.min_samples_split < 2 {
            Some("min_samples_split must be at least 2".to_string())
        } else if self.min_samples_leaf == 0 {
            Some("min_samples_leaf must be at least 1".to_string())
        } else {
            match self.max_features {
                Some(m) if m == 0 || m > n_features => Some(format!(
                    "max_features must be between 1 and {}, got {}",
                    n_features, m
                )),
                _ => None,
            }
        };
        match problem {
            Some(msg) => Err(EngineError::InvalidParams(msg)),
            None => Ok(()),
        }
    }

    fn features_per_split(&self, n_features: usize) -> usize {
        self.max_features
            .unwrap_or_else(|| ((n_features as f64).sqrt() as usize).max(1))
            .min(n_features)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
enum Node {
    Leaf {
        distribution: Vec<f64>,
    },
    Split {
        feature: usize,
        threshold: f64,
        left: usize,
        right: usize,
    },
}

/// Nodes stored flat; index 0 is the root
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DecisionTree {
    nodes: Vec<Node>,
}

impl DecisionTree {
    fn predict(&self, features: &[f64]) -> &[f64] {
        let mut idx = 0;
        loop {
            match &self.nodes[idx] {
                Node::Leaf { distribution } => return distribution,
                Node::Split {
                    feature,
                    threshold,
                    left,
                    right,
                } => {
                    idx = if features[*feature] <= *threshold {
                        *left
                    } else {
                        *right
                    };
                }
            }
        }
    }

    pub fn depth(&self) -> usize {
        fn walk(nodes: &[Node], idx: usize) -> usize {
            match &nodes[idx] {
                Node::Leaf { .. } => 0,
                Node::Split { left, right, .. } => 1 + walk(nodes, *left).max(walk(nodes, *right)),
            }
        }
        walk(&self.nodes, 0)
    }

    /// Indices reachable and within bounds, checked after deserialising
    fn is_well_formed(&self, n_features: usize, n_classes: usize) -> bool {
        let len = self.nodes.len();
        len > 0
            && self.nodes.iter().enumerate().all(|(i, node)| match node {
                Node::Leaf { distribution } => distribution.len() == n_classes,
                Node::Split {
                    feature,
                    left,
                    right,
                    ..
                } => *feature < n_features && *left > i && *right > i && *left < len && *right < len,
            })
    }
}

struct TreeGrower<'a> {
    x: &'a [Vec<f64>],
    y: &'a [usize],
    n_classes: usize,
    n_features: usize,
    params: &'a ForestParams,
    rng: StdRng,
    nodes: Vec<Node>,
}

struct BestSplit {
    feature: usize,
    threshold: f64,
    impurity: f64,
}

impl<'a> TreeGrower<'a> {
    fn grow(&mut self, samples: Vec<usize>, depth: usize) -> usize {
        let counts = self.class_counts(&samples);
        let idx = self.nodes.len();
        self.nodes.push(Node::Leaf {
            distribution: distribution(&counts, samples.len()),
        });

        let pure = counts.iter().filter(|&&c| c > 0).count() <= 1;
        if pure || depth >= self.params.max_depth || samples.len() < self.params.min_samples_split {
            return idx;
        }

        let Some(best) = self.best_split(&samples) else {
            return idx;
        };

        let (left, right): (Vec<usize>, Vec<usize>) = samples
            .into_iter()
            .partition(|&i| self.x[i][best.feature] <= best.threshold);
        let left = self.grow(left, depth + 1);
        let right = self.grow(right, depth + 1);
        self.nodes[idx] = Node::Split {
            feature: best.feature,
            threshold: best.threshold,
            left,
            right,
        };
        idx
    }

    fn class_counts(&self, samples: &[usize]) -> Vec<usize> {
        let mut counts = vec![0; self.n_classes];
        for &i in samples {
            counts[self.y[i]] += 1;
        }
        counts
    }

    fn best_split(&mut self, samples: &[usize]) -> Option<BestSplit> {
        let n = samples.len();
        let min_leaf = self.params.min_samples_leaf;
        let k = self.params.features_per_split(self.n_features);
        // Random feature order; past the first k, keep looking only while
        // no valid split has been found
        let order = rand::seq::index::sample(&mut self.rng, self.n_features, self.n_features);

        let total = self.class_counts(samples);
        let mut best: Option<BestSplit> = None;

        for (tried, feature) in order.into_iter().enumerate() {
            if tried >= k && best.is_some() {
                break;
            }
            let mut ordered: Vec<(f64, usize)> =
                samples.iter().map(|&i| (self.x[i][feature], self.y[i])).collect();
            ordered.sort_by(|a, b| a.0.total_cmp(&b.0));

            let mut left = vec![0usize; self.n_classes];
            for pos in 1..n {
                left[ordered[pos - 1].1] += 1;
                if pos < min_leaf || n - pos < min_leaf {
                    continue;
                }
                let (lo, hi) = (ordered[pos - 1].0, ordered[pos].0);
                if lo >= hi {
                    continue;
                }

                let right: Vec<usize> = total.iter().zip(&left).map(|(t, l)| t - l).collect();
                let impurity = (pos as f64 * gini(&left, pos) + (n - pos) as f64 * gini(&right, n - pos))
                    / n as f64;
                if best.as_ref().map_or(true, |b| impurity < b.impurity) {
                    best = Some(BestSplit {
                        feature,
                        threshold: lo + (hi - lo) / 2.0,
                        impurity,
                    });
                }
            }
        }

        best
    }
}

fn gini(counts: &[usize], n: usize) -> f64 {
    if n == 0 {
        return 0.0;
    }
    let n = n as f64;
    1.0 - counts.iter().map(|&c| (c as f64 / n).powi(2)).sum::<f64>()
}

fn distribution(counts: &[usize], n: usize) -> Vec<f64> {
    if n == 0 {
        return vec![1.0 / counts.len() as f64; counts.len()];
    }
    counts.iter().map(|&c| c as f64 / n as f64).collect()
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RandomForest {
    n_classes: usize,
    n_features: usize,
    trees: Vec<DecisionTree>,
}

impl RandomForest {
    /// Fit on rows `x` with class labels `y` in `0..n_classes`.
    ///
    /// Each tree draws from its own RNG seeded up front from `seed`, so the
    /// result does not depend on how rayon schedules the trees.
    pub fn fit(
        x: &[Vec<f64>],
        y: &[usize],
        n_classes: usize,
        params: &ForestParams,
        seed: u64,
    ) -> Result<Self> {
        if x.is_empty() || x.len() != y.len() {
            return Err(EngineError::InvalidParams(format!(
                "need matching non-empty samples and labels, got {} and {}",
                x.len(),
                y.len()
            )));
        }
        if n_classes < 2 {
            return Err(EngineError::InvalidParams(
                "a classifier needs at least two classes".to_string(),
            ));
        }
        let n_features = x[0].len();
        if n_features == 0 || x.iter().any(|row| row.len() != n_features) {
            return Err(EngineError::InvalidParams(
                "every sample must have the same non-zero number of features".to_string(),
            ));
        }
        if let Some(bad) = y.iter().find(|&&label| label >= n_classes) {
            return Err(EngineError::InvalidParams(format!(
                "label {} out of range for {} classes",
                bad, n_classes
            )));
        }
        params.validate(n_features)?;

        let mut master = StdRng::seed_from_u64(seed);
        let tree_seeds: Vec<u64> = (0..params.n_trees).map(|_| master.gen()).collect();
        let n = x.len();

        let trees: Vec<DecisionTree> = tree_seeds
            .par_iter()
            .map(|&tree_seed| {
                let mut rng = StdRng::seed_from_u64(tree_seed);
                let bootstrap: Vec<usize> = (0..n).map(|_| rng.gen_range(0..n)).collect();
                let mut grower = TreeGrower {
                    x,
                    y,
                    n_classes,
                    n_features,
                    params,
                    rng,
                    nodes: Vec::new(),
                };
                grower.grow(bootstrap, 0);
                DecisionTree {
                    nodes: grower.nodes,
                }
            })
            .collect();

        Ok(Self {
            n_classes,
            n_features,
            trees,
        })
    }

    /// Mean leaf distribution across trees. Callers check arity first.
    pub fn predict_proba(&self, features: &[f64]) -> Vec<f64> {
        let mut summed = vec![0.0; self.n_classes];
        for tree in &self.trees {
            for (acc, p) in summed.iter_mut().zip(tree.predict(features)) {
                *acc += p;
            }
        }
        let n = self.trees.len().max(1) as f64;
        let averaged: Vec<f64> = summed.into_iter().map(|s| s / n).collect();
        normalize_probabilities(&averaged)
    }

    pub fn n_features(&self) -> usize {
        self.n_features
    }

    pub fn n_classes(&self) -> usize {
        self.n_classes
    }

    pub fn n_trees(&self) -> usize {
        self.trees.len()
    }

    pub fn max_depth(&self) -> usize {
        self.trees.iter().map(DecisionTree::depth).max().unwrap_or(0)
    }

    /// Structural check for forests read back from disk
    pub fn is_well_formed(&self) -> bool {
        !self.trees.is_empty()
            && self
                .trees
                .iter()
                .all(|t| t.is_well_formed(self.n_features, self.n_classes))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn small_params() -> ForestParams {
        ForestParams {
            n_trees: 25,
            max_depth: 4,
            min_samples_split: 2,
            min_samples_leaf: 1,
            max_features: None,
        }
    }

    /// Class 1 when the first feature is above 5; the second feature is noise
    fn separable() -> (Vec<Vec<f64>>, Vec<usize>) {
        let mut x = Vec::new();
        let mut y = Vec::new();
        for i in 0..40 {
            let v = (i % 10) as f64 + 0.5;
            x.push(vec![v, (i * 7 % 3) as f64]);
            y.push(usize::from(v > 5.0));
        }
        (x, y)
    }

    #[test]
    fn learns_a_threshold() {
        let (x, y) = separable();
        let params = ForestParams {
            max_features: Some(2),
            ..small_params()
        };
        let forest = RandomForest::fit(&x, &y, 2, &params, 42).unwrap();
        let high = forest.predict_proba(&[8.5, 1.0]);
        let low = forest.predict_proba(&[1.5, 1.0]);
        assert!(high[1] > 0.8, "got {:?}", high);
        assert!(low[0] > 0.8, "got {:?}", low);
        assert!((high.iter().sum::<f64>() - 1.0).abs() < 1e-9);
        assert_eq!(forest.n_trees(), 25);
        assert!(forest.max_depth() <= 4);
        assert!(forest.is_well_formed());
    }

    #[test]
    fn same_seed_same_forest() {
        let (x, y) = separable();
        let a = RandomForest::fit(&x, &y, 2, &small_params(), 7).unwrap();
        let b = RandomForest::fit(&x, &y, 2, &small_params(), 7).unwrap();
        assert_eq!(a, b);
    }

    #[test]
    fn survives_json() {
        let (x, y) = separable();
        let forest = RandomForest::fit(&x, &y, 2, &small_params(), 1).unwrap();
        let json = serde_json::to_string(&forest).unwrap();
        let back: RandomForest = serde_json::from_str(&json).unwrap();
        assert_eq!(back.predict_proba(&[3.5, 2.0]), forest.predict_proba(&[3.5, 2.0]));
    }

    #[test]
    fn single_class_training_still_predicts_every_class() {
        let x = vec![vec![1.0], vec![2.0], vec![3.0]];
        let y = vec![0, 0, 0];
        let forest = RandomForest::fit(&x, &y, 3, &small_params(), 0).unwrap();
        assert_eq!(forest.predict_proba(&[2.0]), vec![1.0, 0.0, 0.0]);
    }

    #[test]
    fn rejects_bad_input() {
        let (x, y) = separable();
        assert!(RandomForest::fit(&[], &[], 2, &small_params(), 0).is_err());
        assert!(RandomForest::fit(&x, &y[..3], 2, &small_params(), 0).is_err());
        assert!(RandomForest::fit(&x, &vec![5; x.len()], 2, &small_params(), 0).is_err());

        let params = ForestParams {
            max_features: Some(3),
            ..small_params()
        };
        assert!(RandomForest::fit(&x, &y, 2, &params, 0).is_err());
        let params = ForestParams {
            min_samples_split: 1,
            ..small_params()
        };
        assert!(params.validate(2).is_err());
    }
}
