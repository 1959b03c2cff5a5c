//! Cross-validation implementations

use crate::error::{TabregError, Result};
use crate::metrics::Scorer;
use crate::pipeline::Pipeline;
use crate::utils::data_loader::DataSaver;
use crate::utils::random::derived_rng;
use ndarray::{Array1, Array2, Axis};
use polars::prelude::*;
use rand::seq::SliceRandom;
use rand::SeedableRng;
use rand_chacha::ChaCha8Rng;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Instant;
use tracing::{debug, info};

/// Cross-validation strategy
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum CVStrategy {
    /// K-Fold cross-validation
    KFold { n_splits: usize, shuffle: bool },
    /// K-Fold repeated with a different shuffle each time
    RepeatedKFold { n_splits: usize, n_repeats: usize },
    /// Independent random train/test partitions
    ShuffleSplit { n_splits: usize, test_size: f64 },
    /// Leave-one-out cross-validation
    LeaveOneOut,
}

impl Default for CVStrategy {
    fn default() -> Self {
        CVStrategy::KFold { n_splits: 5, shuffle: false }
    }
}

/// A single train/test split
#[derive(Debug, Clone)]
pub struct CVSplit {
    pub train_indices: Vec<usize>,
    pub test_indices: Vec<usize>,
    pub fold_idx: usize,
}

/// Cross-validation splitter
#[derive(Debug, Clone)]
pub struct CrossValidator {
    strategy: CVStrategy,
    random_state: Option<u64>,
}

impl CrossValidator {
    pub fn new(strategy: CVStrategy) -> Self {
        Self {
            strategy,
            random_state: None,
        }
    }

    /// Set random state for reproducibility
    pub fn with_random_state(mut self, seed: u64) -> Self {
        self.random_state = Some(seed);
        self
    }

    pub fn strategy(&self) -> &CVStrategy {
        &self.strategy
    }

    /// Shuffling generator: own seed if set, otherwise one drawn from the
    /// process-wide generator
    fn rng(&self) -> ChaCha8Rng {
        match self.random_state {
            Some(seed) => ChaCha8Rng::seed_from_u64(seed),
            None => derived_rng(),
        }
    }

    /// Generate train/test splits
    pub fn split(&self, n_samples: usize) -> Result<Vec<CVSplit>> {
        match &self.strategy {
            CVStrategy::KFold { n_splits, shuffle } => {
                let mut indices: Vec<usize> = (0..n_samples).collect();
                if *shuffle {
                    indices.shuffle(&mut self.rng());
                }
                k_fold_split(&indices, *n_splits, 0)
            }
            CVStrategy::RepeatedKFold { n_splits, n_repeats } => {
                if *n_repeats == 0 {
                    return Err(TabregError::ValidationError("n_repeats must be at least 1".to_string()));
                }
                let mut rng = self.rng();
                let mut all_splits = Vec::with_capacity(n_splits * n_repeats);
                for repeat in 0..*n_repeats {
                    let mut indices: Vec<usize> = (0..n_samples).collect();
                    indices.shuffle(&mut rng);
                    all_splits.extend(k_fold_split(&indices, *n_splits, repeat * n_splits)?);
                }
                Ok(all_splits)
            }
            CVStrategy::ShuffleSplit { n_splits, test_size } => {
                self.shuffle_split(n_samples, *n_splits, *test_size)
            }
            CVStrategy::LeaveOneOut => {
                if n_samples < 2 {
                    return Err(TabregError::ValidationError(format!(
                        "LeaveOneOut needs at least 2 samples, got {}",
                        n_samples
                    )));
                }
                Ok((0..n_samples)
                    .map(|i| CVSplit {
                        train_indices: (0..n_samples).filter(|&j| j != i).collect(),
                        test_indices: vec![i],
                        fold_idx: i,
                    })
                    .collect())
            }
        }
    }

    fn shuffle_split(&self, n_samples: usize, n_splits: usize, test_size: f64) -> Result<Vec<CVSplit>> {
        if n_splits == 0 {
            return Err(TabregError::ValidationError("n_splits must be at least 1".to_string()));
        }
        if !(test_size > 0.0 && test_size < 1.0) {
            return Err(TabregError::ValidationError(format!(
                "test_size must be in (0, 1), got {}",
                test_size
            )));
        }

        let n_test = (test_size * n_samples as f64).ceil() as usize;
        if n_test == 0 || n_test >= n_samples {
            return Err(TabregError::ValidationError(format!(
                "test_size={} leaves an empty side with {} samples",
                test_size, n_samples
            )));
        }

        let mut rng = self.rng();
        Ok((0..n_splits)
            .map(|fold_idx| {
                let mut indices: Vec<usize> = (0..n_samples).collect();
                indices.shuffle(&mut rng);
                let (test, train) = indices.split_at(n_test);
                CVSplit {
                    train_indices: train.to_vec(),
                    test_indices: test.to_vec(),
                    fold_idx,
                }
            })
            .collect())
    }
}

/// Contiguous folds over `indices`; the first `n % k` folds get one extra sample
fn k_fold_split(indices: &[usize], n_splits: usize, first_fold: usize) -> Result<Vec<CVSplit>> {
    let n_samples = indices.len();
    if n_splits < 2 {
        return Err(TabregError::ValidationError("n_splits must be at least 2".to_string()));
    }
    if n_samples < n_splits {
        return Err(TabregError::ValidationError(format!(
            "n_samples ({}) must be >= n_splits ({})",
            n_samples, n_splits
        )));
    }

    let base = n_samples / n_splits;
    let remainder = n_samples % n_splits;

    let mut splits = Vec::with_capacity(n_splits);
    let mut current = 0;

    for fold in 0..n_splits {
        let fold_size = if fold < remainder { base + 1 } else { base };
        let test_indices = indices[current..current + fold_size].to_vec();
        let train_indices: Vec<usize> = indices[..current]
            .iter()
            .chain(indices[current + fold_size..].iter())
            .copied()
            .collect();

        splits.push(CVSplit {
            train_indices,
            test_indices,
            fold_idx: first_fold + fold,
        });

        current += fold_size;
    }

    Ok(splits)
}

/// Per-fold timings and scores from [`cross_validate`]
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CVResults {
    /// Seconds spent fitting each fold
    pub fit_time: Vec<f64>,
    /// Seconds spent predicting and scoring each fold
    pub score_time: Vec<f64>,
    /// `(scorer, per-fold scores)` in scoring order
    pub test_scores: Vec<(String, Vec<f64>)>,
}

impl CVResults {
    /// All result arrays keyed the way they are reported: `fit_time`,
    /// `score_time`, then `test_<scorer>`
    pub fn entries(&self) -> Vec<(String, &[f64])> {
        let mut out: Vec<(String, &[f64])> = vec![
            ("fit_time".to_string(), self.fit_time.as_slice()),
            ("score_time".to_string(), self.score_time.as_slice()),
        ];
        out.extend(
            self.test_scores
                .iter()
                .map(|(name, scores)| (format!("test_{}", name), scores.as_slice())),
        );
        out
    }

    /// Scores for one scorer
    pub fn scores(&self, scorer: &str) -> Option<&[f64]> {
        self.test_scores
            .iter()
            .find(|(name, _)| name == scorer)
            .map(|(_, s)| s.as_slice())
    }

    pub fn n_folds(&self) -> usize {
        self.fit_time.len()
    }
}

/// Label of the default scorer (the pipeline's R²) when none are requested
pub const DEFAULT_SCORE_NAME: &str = "score";

/// Fit a copy of `pipeline` on every training fold and score it on the
/// matching test fold.
///
/// With no scorers, each fold is scored by R² and reported as `test_score`.
pub fn cross_validate(
    pipeline: &Pipeline,
    x: &Array2<f64>,
    y: &Array1<f64>,
    cv: &CrossValidator,
    scorers: &[Scorer],
) -> Result<CVResults> {
    if x.nrows() != y.len() {
        return Err(TabregError::ShapeError {
            expected: format!("y length = {}", x.nrows()),
            actual: format!("y length = {}", y.len()),
        });
    }
    let labelled: Vec<(String, Scorer)> = if scorers.is_empty() {
        vec![(DEFAULT_SCORE_NAME.to_string(), Scorer::R2)]
    } else {
        scorers.iter().map(|s| (s.as_str().to_string(), *s)).collect()
    };

    let splits = cv.split(x.nrows())?;
    let mut results = CVResults {
        test_scores: labelled.iter().map(|(name, _)| (name.clone(), Vec::new())).collect(),
        ..Default::default()
    };

    for split in &splits {
        let x_train = x.select(Axis(0), &split.train_indices);
        let y_train = y.select(Axis(0), &split.train_indices);
        let x_test = x.select(Axis(0), &split.test_indices);
        let y_test = y.select(Axis(0), &split.test_indices);

        let mut fold_pipeline = pipeline.clone();
        let start = Instant::now();
        fold_pipeline.fit(&x_train, &y_train)?;
        results.fit_time.push(start.elapsed().as_secs_f64());

        let start = Instant::now();
        let y_pred = fold_pipeline.predict(&x_test)?;
        for ((_, scorer), (_, scores)) in labelled.iter().zip(results.test_scores.iter_mut()) {
            scores.push(scorer.score(&y_test, &y_pred)?);
        }
        results.score_time.push(start.elapsed().as_secs_f64());

        debug!(fold = split.fold_idx, n_train = split.train_indices.len(), "Fold finished");
    }

    Ok(results)
}

/// Summarise the `test_*` entries as `"mean ± std"` (population std, 3 decimals),
/// keyed by scorer name
pub fn format_cv_results(results: &CVResults) -> Vec<(String, String)> {
    results
        .entries()
        .into_iter()
        .filter_map(|(key, values)| {
            let name = key.strip_prefix("test_")?.to_string();
            let n = values.len().max(1) as f64;
            let mean = values.iter().sum::<f64>() / n;
            let std = (values.iter().map(|v| (v - mean).powi(2)).sum::<f64>() / n).sqrt();
            Some((name, format!("{:.3} ± {:.3}", mean, std)))
        })
        .collect()
}

/// Write one summary row per model to `<output_dir>/cv_results.csv`
///
/// The first column, `model`, holds the row label.
pub fn save_results(rows: &[(String, Vec<(String, String)>)], output_dir: &Path) -> Result<PathBuf> {
    let mut header: Vec<String> = Vec::new();
    for (_, summary) in rows {
        for (scorer, _) in summary {
            if !header.contains(scorer) {
                header.push(scorer.clone());
            }
        }
    }

    let mut columns: Vec<Column> = Vec::with_capacity(header.len() + 1);
    columns.push(Column::new(
        "model".into(),
        rows.iter().map(|(model, _)| model.as_str()).collect::<Vec<_>>(),
    ));
    for scorer in &header {
        let values: Vec<Option<&str>> = rows
            .iter()
            .map(|(_, summary)| {
                summary
                    .iter()
                    .find(|(name, _)| name == scorer)
                    .map(|(_, v)| v.as_str())
            })
            .collect();
        columns.push(Column::new(scorer.as_str().into(), values));
    }

    let mut df = DataFrame::new(columns)?;
    let path = output_dir.join("cv_results.csv");
    DataSaver::save_csv(&mut df, &path)?;
    info!("Results saved to {}", path.display());
    Ok(path)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pipeline::create_pipeline;
    use crate::training::ModelParams;
    use ndarray::array;

    #[test]
    fn test_cross_validate_default_score_name() {
        let x = array![[1.0], [2.0], [3.0], [4.0], [5.0], [6.0]];
        let y = array![3.0, 5.0, 7.0, 9.0, 11.0, 13.0];
        let pipeline = create_pipeline("linear", true, 1234, &ModelParams::new()).unwrap();
        let cv = CrossValidator::new(CVStrategy::KFold { n_splits: 3, shuffle: false });

        let results = cross_validate(&pipeline, &x, &y, &cv, &[]).unwrap();
        assert_eq!(results.n_folds(), 3);
        let formatted = format_cv_results(&results);
        assert_eq!(formatted, vec![("score".to_string(), "1.000 ± 0.000".to_string())]);

        let results = cross_validate(&pipeline, &x, &y, &cv, &[Scorer::NegMeanAbsoluteError]).unwrap();
        assert!(results.scores("score").is_none());
        assert_eq!(results.scores("neg_mean_absolute_error").unwrap().len(), 3);
    }

    #[test]
    fn test_k_fold() {
        let cv = CrossValidator::new(CVStrategy::KFold { n_splits: 5, shuffle: false });
        let splits = cv.split(100).unwrap();

        assert_eq!(splits.len(), 5);

        // Each test set should have 20 samples
        for split in &splits {
            assert_eq!(split.test_indices.len(), 20);
            assert_eq!(split.train_indices.len(), 80);
        }

        // All indices should be covered exactly once in test sets
        let mut all_test: Vec<usize> = splits.iter().flat_map(|s| s.test_indices.clone()).collect();
        all_test.sort();
        assert_eq!(all_test, (0..100).collect::<Vec<_>>());
    }

    #[test]
    fn test_k_fold_uneven() {
        let cv = CrossValidator::new(CVStrategy::KFold { n_splits: 3, shuffle: true }).with_random_state(3);
        let sizes: Vec<usize> = cv.split(10).unwrap().iter().map(|s| s.test_indices.len()).collect();
        assert_eq!(sizes, vec![4, 3, 3]);
    }

    #[test]
    fn test_k_fold_too_few_samples() {
        let cv = CrossValidator::new(CVStrategy::KFold { n_splits: 5, shuffle: false });
        assert!(matches!(cv.split(3), Err(TabregError::ValidationError(_))));
    }

    #[test]
    fn test_shuffle_split() {
        let cv = CrossValidator::new(CVStrategy::ShuffleSplit { n_splits: 4, test_size: 0.25 })
            .with_random_state(0);
        let splits = cv.split(10).unwrap();
        assert_eq!(splits.len(), 4);
        for split in &splits {
            assert_eq!(split.test_indices.len(), 3);
            assert_eq!(split.train_indices.len(), 7);
            assert!(split.test_indices.iter().all(|i| !split.train_indices.contains(i)));
        }
    }

    #[test]
    fn test_leave_one_out() {
        let cv = CrossValidator::new(CVStrategy::LeaveOneOut);
        let splits = cv.split(10).unwrap();

        assert_eq!(splits.len(), 10);

        for split in &splits {
            assert_eq!(split.test_indices.len(), 1);
            assert_eq!(split.train_indices.len(), 9);
        }
    }

    #[test]
    fn test_repeated_k_fold() {
        let cv = CrossValidator::new(CVStrategy::RepeatedKFold { n_splits: 5, n_repeats: 3 })
            .with_random_state(42);
        let splits = cv.split(100).unwrap();

        assert_eq!(splits.len(), 15); // 5 * 3
        for repeat in splits.chunks(5) {
            let mut covered: Vec<usize> = repeat.iter().flat_map(|s| s.test_indices.clone()).collect();
            covered.sort();
            assert_eq!(covered, (0..100).collect::<Vec<_>>());
        }
    }

    #[test]
    fn test_format_cv_results() {
        let results = CVResults {
            fit_time: vec![0.1, 0.2],
            score_time: vec![0.01, 0.01],
            test_scores: vec![
                ("r2".to_string(), vec![0.5, 0.7]),
                ("neg_mean_squared_error".to_string(), vec![-1.0, -2.0]),
            ],
        };

        let formatted = format_cv_results(&results);
        assert_eq!(
            formatted,
            vec![
                ("r2".to_string(), "0.600 ± 0.100".to_string()),
                ("neg_mean_squared_error".to_string(), "-1.500 ± 0.500".to_string()),
            ]
        );
    }
}
