//! Random Forest implementation

use crate::error::{TabregError, Result};
use crate::utils::random::next_seed;
use super::decision_tree::DecisionTreeRegressor;
use super::models::{check_width, check_xy, r2, Model};
use super::params::{ParamReader, ParamValue};
use ndarray::{Array1, Array2};
use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha8Rng;
use rayon::prelude::*;
use serde::{Deserialize, Serialize};

/// Strategy for max features
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub enum MaxFeatures {
    /// Square root of n_features
    Sqrt,
    /// Log2 of n_features
    Log2,
    /// Fraction of n_features
    Fraction(f64),
    /// Fixed number
    Fixed(usize),
    /// All features
    All,
}

impl MaxFeatures {
    fn resolve(self, n_features: usize) -> usize {
        let n = match self {
            MaxFeatures::Sqrt => (n_features as f64).sqrt().floor() as usize,
            MaxFeatures::Log2 => (n_features as f64).log2().floor() as usize,
            MaxFeatures::Fraction(f) => (n_features as f64 * f).floor() as usize,
            MaxFeatures::Fixed(n) => n,
            MaxFeatures::All => n_features,
        };
        n.clamp(1, n_features.max(1))
    }

    fn from_param(param: &ParamReader<'_>) -> Result<Self> {
        let bad = || {
            TabregError::invalid_param(
                "random_forest",
                "max_features",
                format!("expected \"sqrt\", \"log2\", null, an integer or a fraction in (0, 1], got {}", param.value()),
            )
        };

        match param.value() {
            v if v.is_null() => Ok(MaxFeatures::All),
            ParamValue::Int(n) if *n >= 1 => Ok(MaxFeatures::Fixed(*n as usize)),
            ParamValue::Float(f) if *f > 0.0 && *f < 1.0 => Ok(MaxFeatures::Fraction(*f)),
            ParamValue::Float(f) if *f == 1.0 => Ok(MaxFeatures::All),
            ParamValue::Str(s) => match s.trim() {
                "sqrt" => Ok(MaxFeatures::Sqrt),
                "log2" => Ok(MaxFeatures::Log2),
                other => {
                    if let Ok(n) = other.parse::<i64>() {
                        return Self::from_param(&ParamReader::new("random_forest", "max_features", &ParamValue::Int(n)));
                    }
                    match other.parse::<f64>() {
                        Ok(f) => Self::from_param(&ParamReader::new("random_forest", "max_features", &ParamValue::Float(f))),
                        Err(_) => Err(bad()),
                    }
                }
            },
            _ => Err(bad()),
        }
    }
}

/// Random forest regressor: bagged regression trees averaged at prediction
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RandomForestRegressor {
    trees: Vec<DecisionTreeRegressor>,
    /// Number of trees
    pub n_estimators: usize,
    /// Maximum depth per tree
    pub max_depth: Option<usize>,
    /// Minimum samples to split
    pub min_samples_split: usize,
    /// Minimum samples in leaf
    pub min_samples_leaf: usize,
    /// Features tried per split (all by default)
    pub max_features: MaxFeatures,
    /// Bootstrap sampling
    pub bootstrap: bool,
    /// Compute the out-of-bag R² during fit
    pub oob_score: bool,
    /// Random state
    pub random_state: Option<u64>,
    oob_score_value: Option<f64>,
    feature_importances: Option<Array1<f64>>,
    n_features: usize,
}

impl Default for RandomForestRegressor {
    fn default() -> Self {
        Self::new(100)
    }
}

impl RandomForestRegressor {
    pub fn new(n_estimators: usize) -> Self {
        Self {
            trees: Vec::new(),
            n_estimators,
            max_depth: None,
            min_samples_split: 2,
            min_samples_leaf: 1,
            max_features: MaxFeatures::All,
            bootstrap: true,
            oob_score: false,
            random_state: None,
            oob_score_value: None,
            feature_importances: None,
            n_features: 0,
        }
    }

    pub fn with_max_depth(mut self, depth: usize) -> Self {
        self.max_depth = Some(depth);
        self
    }

    pub fn with_min_samples_leaf(mut self, min_samples: usize) -> Self {
        self.min_samples_leaf = min_samples;
        self
    }

    pub fn with_max_features(mut self, max_features: MaxFeatures) -> Self {
        self.max_features = max_features;
        self
    }

    pub fn with_bootstrap(mut self, bootstrap: bool) -> Self {
        self.bootstrap = bootstrap;
        self
    }

    pub fn with_random_state(mut self, seed: u64) -> Self {
        self.random_state = Some(seed);
        self
    }

    pub fn with_oob_score(mut self, oob_score: bool) -> Self {
        self.oob_score = oob_score;
        self
    }

    fn compute_feature_importances(&mut self) {
        let mut total = vec![0.0; self.n_features];
        for tree in &self.trees {
            if let Some(imp) = tree.feature_importances() {
                for (acc, &val) in total.iter_mut().zip(imp.iter()) {
                    *acc += val;
                }
            }
        }

        let sum: f64 = total.iter().sum();
        if sum > 0.0 {
            for imp in &mut total {
                *imp /= sum;
            }
        }
        self.feature_importances = Some(Array1::from_vec(total));
    }

    /// Average prediction of the trees that never saw each sample
    fn compute_oob_score(&mut self, x: &Array2<f64>, y: &Array1<f64>, in_bag: &[Vec<bool>]) -> Result<()> {
        let n_samples = x.nrows();
        let mut sums = vec![0.0; n_samples];
        let mut counts = vec![0usize; n_samples];

        for (tree, bag) in self.trees.iter().zip(in_bag) {
            let preds = tree.predict(x)?;
            for i in 0..n_samples {
                if !bag[i] {
                    sums[i] += preds[i];
                    counts[i] += 1;
                }
            }
        }

        let covered: Vec<usize> = (0..n_samples).filter(|&i| counts[i] > 0).collect();
        if covered.is_empty() {
            self.oob_score_value = None;
            return Ok(());
        }

        let y_true: Array1<f64> = covered.iter().map(|&i| y[i]).collect();
        let y_pred: Array1<f64> = covered.iter().map(|&i| sums[i] / counts[i] as f64).collect();
        self.oob_score_value = Some(r2(&y_true, &y_pred));
        Ok(())
    }

    pub fn feature_importances(&self) -> Option<&Array1<f64>> {
        self.feature_importances.as_ref()
    }

    /// Out-of-bag R², available after fitting with `oob_score` and `bootstrap`
    pub fn oob_score_value(&self) -> Option<f64> {
        self.oob_score_value
    }

    pub fn n_trees(&self) -> usize {
        self.trees.len()
    }
}

impl Model for RandomForestRegressor {
    fn name(&self) -> &'static str {
        "random_forest"
    }

    fn fit(&mut self, x: &Array2<f64>, y: &Array1<f64>) -> Result<()> {
        check_xy(x, y)?;
        if self.n_estimators == 0 {
            return Err(TabregError::invalid_param("random_forest", "n_estimators", "must be at least 1"));
        }
        if self.oob_score && !self.bootstrap {
            return Err(TabregError::ValidationError(
                "Out of bag estimation only available if bootstrap=True".to_string(),
            ));
        }

        let n_samples = x.nrows();
        self.n_features = x.ncols();
        let max_features = self.max_features.resolve(self.n_features);

        // Build trees in parallel, tree i seeded with base_seed + i
        let base_seed = self.random_state.unwrap_or_else(next_seed);
        let grown: Vec<(DecisionTreeRegressor, Vec<bool>)> = (0..self.n_estimators)
            .into_par_iter()
            .map(|tree_idx| -> Result<(DecisionTreeRegressor, Vec<bool>)> {
                let mut rng = ChaCha8Rng::seed_from_u64(base_seed.wrapping_add(tree_idx as u64));

                let sample_indices: Vec<usize> = if self.bootstrap {
                    (0..n_samples).map(|_| rng.gen_range(0..n_samples)).collect()
                } else {
                    (0..n_samples).collect()
                };

                let mut in_bag = vec![false; n_samples];
                for &i in &sample_indices {
                    in_bag[i] = true;
                }

                let mut tree = DecisionTreeRegressor::new()
                    .with_max_depth(self.max_depth)
                    .with_min_samples_split(self.min_samples_split)
                    .with_min_samples_leaf(self.min_samples_leaf)
                    .with_max_features(Some(max_features));
                tree.fit_indices(x, y, &sample_indices, &mut rng)?;

                Ok((tree, in_bag))
            })
            .collect::<Result<Vec<_>>>()?;

        let (trees, in_bag): (Vec<_>, Vec<_>) = grown.into_iter().unzip();
        self.trees = trees;
        self.compute_feature_importances();

        self.oob_score_value = None;
        if self.oob_score {
            self.compute_oob_score(x, y, &in_bag)?;
        }

        Ok(())
    }

    fn predict(&self, x: &Array2<f64>) -> Result<Array1<f64>> {
        if self.trees.is_empty() {
            return Err(TabregError::ModelNotFitted);
        }
        check_width(x, self.n_features)?;

        let all_predictions: Vec<Array1<f64>> = self
            .trees
            .par_iter()
            .map(|tree| tree.predict(x))
            .collect::<Result<Vec<_>>>()?;

        let mut mean = Array1::zeros(x.nrows());
        for preds in &all_predictions {
            mean += preds;
        }
        Ok(mean / all_predictions.len() as f64)
    }

    fn is_fitted(&self) -> bool {
        !self.trees.is_empty()
    }

    fn set_param(&mut self, param: &ParamReader<'_>) -> Result<()> {
        match param.name() {
            "n_estimators" => self.n_estimators = param.usize()?,
            "max_depth" => self.max_depth = param.optional_usize()?,
            "min_samples_split" => self.min_samples_split = param.usize()?.max(2),
            "min_samples_leaf" => self.min_samples_leaf = param.usize()?.max(1),
            "max_features" => self.max_features = MaxFeatures::from_param(param)?,
            "bootstrap" => self.bootstrap = param.bool()?,
            "oob_score" => self.oob_score = param.bool()?,
            _ => return Err(param.unknown()),
        }
        Ok(())
    }
}
