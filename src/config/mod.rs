//! Run configuration
//!
//! One [`AppConfig`] drives each CLI command. It is composed by
//! [`loader::ConfigLoader`] from a file, `TABREG__*` environment variables and
//! `key.path=value` overrides.

pub mod loader;

pub use loader::{parse_override, ConfigLoader};

use crate::data::DataConfig;
use crate::error::{TabregError, Result};
use crate::metrics::{MetricConfig, Scorer};
use crate::pipeline::ModelConfig;
use crate::training::{CVStrategy, CrossValidator};
use chrono::{DateTime, Local};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

/// Splitter named in the `cross_validate` block
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CvStrategyName {
    #[default]
    Kfold,
    RepeatedKfold,
    ShuffleSplit,
    LeaveOneOut,
}

fn default_n_splits() -> usize {
    5
}

fn default_n_repeats() -> usize {
    10
}

fn default_cv_test_size() -> f64 {
    0.2
}

/// The `cross_validate` block
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CrossValidationConfig {
    #[serde(default)]
    pub strategy: CvStrategyName,
    #[serde(default = "default_n_splits")]
    pub n_splits: usize,
    /// Repetitions for `repeated_kfold`
    #[serde(default = "default_n_repeats")]
    pub n_repeats: usize,
    /// Shuffle before k-fold splitting
    #[serde(default)]
    pub shuffle: bool,
    /// Held-out fraction for `shuffle_split`
    #[serde(default = "default_cv_test_size")]
    pub test_size: f64,
    /// Splitter seed; unset draws from the process-wide generator
    #[serde(default)]
    pub random_state: Option<u64>,
    /// Scorer names; unset reports the pipeline's R² as `score`
    #[serde(default)]
    pub scoring: Option<Vec<String>>,
}

impl Default for CrossValidationConfig {
    fn default() -> Self {
        Self {
            strategy: CvStrategyName::default(),
            n_splits: default_n_splits(),
            n_repeats: default_n_repeats(),
            shuffle: false,
            test_size: default_cv_test_size(),
            random_state: None,
            scoring: None,
        }
    }
}

impl CrossValidationConfig {
    pub fn validator(&self) -> CrossValidator {
        let strategy = match self.strategy {
            CvStrategyName::Kfold => CVStrategy::KFold {
                n_splits: self.n_splits,
                shuffle: self.shuffle,
            },
            CvStrategyName::RepeatedKfold => CVStrategy::RepeatedKFold {
                n_splits: self.n_splits,
                n_repeats: self.n_repeats,
            },
            CvStrategyName::ShuffleSplit => CVStrategy::ShuffleSplit {
                n_splits: self.n_splits,
                test_size: self.test_size,
            },
            CvStrategyName::LeaveOneOut => CVStrategy::LeaveOneOut,
        };

        let cv = CrossValidator::new(strategy);
        match self.random_state {
            Some(seed) => cv.with_random_state(seed),
            None => cv,
        }
    }

    /// Parsed scorers, empty when `scoring` is unset
    pub fn scorers(&self) -> Result<Vec<Scorer>> {
        self.scoring.iter().flatten().map(|s| s.parse()).collect()
    }
}

/// Everything a `train`, `test` or `predict` run reads
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AppConfig {
    /// Seeds the process-wide generator when set
    #[serde(default)]
    pub seed: Option<u64>,
    /// Run directory; a timestamped one under `outputs/` when unset
    #[serde(default)]
    pub output_dir: Option<PathBuf>,
    /// Checkpoint to load (test, predict)
    #[serde(default)]
    pub checkpoint: Option<PathBuf>,
    /// Where `train` writes checkpoints
    #[serde(default)]
    pub checkpoint_dir: Option<PathBuf>,
    /// Predictions file name inside the run directory
    #[serde(default)]
    pub predictions_file: Option<String>,
    pub data: DataConfig,
    #[serde(default)]
    pub model: ModelConfig,
    #[serde(default)]
    pub cross_validate: Option<CrossValidationConfig>,
    #[serde(default)]
    pub metrics: BTreeMap<String, MetricConfig>,
}

impl AppConfig {
    /// Configured run directory, or `outputs/YYYY-MM-DD/HH-MM-SS` for `now`
    pub fn resolve_output_dir(&self, now: &DateTime<Local>) -> PathBuf {
        match &self.output_dir {
            Some(dir) => dir.clone(),
            None => Path::new("outputs")
                .join(now.format("%Y-%m-%d").to_string())
                .join(now.format("%H-%M-%S").to_string()),
        }
    }

    /// Checkpoint path, required by test and predict
    pub fn checkpoint_path(&self) -> Result<&Path> {
        self.checkpoint
            .as_deref()
            .ok_or_else(|| TabregError::ConfigError("'checkpoint' is not set".to_string()))
    }

    /// Pretty JSON for logging
    pub fn to_pretty_json(&self) -> Result<String> {
        Ok(serde_json::to_string_pretty(self)?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_minimal_config_defaults() {
        let cfg: AppConfig = serde_json::from_str(
            r#"{"data": {"train_dataset_url": "train.csv", "test_dataset_url": "test.csv", "target_variable": "y"}}"#,
        )
        .unwrap();

        assert_eq!(cfg.seed, None);
        assert!(cfg.data.drop_na);
        assert_eq!(cfg.data.test_size, 0.2);
        assert_eq!(cfg.model.model_type, "linear");
        assert!(cfg.cross_validate.is_none());
        assert!(cfg.metrics.is_empty());
        assert!(cfg.checkpoint_path().is_err());
    }

    #[test]
    fn test_cross_validation_block() {
        let cv: CrossValidationConfig =
            serde_json::from_str(r#"{"strategy": "shuffle_split", "n_splits": 3, "scoring": ["r2", "neg_mean_absolute_error"]}"#)
                .unwrap();
        assert_eq!(
            cv.validator().strategy(),
            &CVStrategy::ShuffleSplit { n_splits: 3, test_size: 0.2 }
        );
        assert_eq!(cv.scorers().unwrap(), vec![Scorer::R2, Scorer::NegMeanAbsoluteError]);

        let bad = CrossValidationConfig {
            scoring: Some(vec!["accuracy".to_string()]),
            ..Default::default()
        };
        assert!(bad.scorers().is_err());

        let unset: CrossValidationConfig = serde_json::from_str(r#"{"n_splits": 4}"#).unwrap();
        assert_eq!(unset.scoring, None);
        assert!(unset.scorers().unwrap().is_empty());
    }

    #[test]
    fn test_default_output_dir_is_timestamped() {
        let cfg: AppConfig = serde_json::from_str(
            r#"{"data": {"train_dataset_url": "a", "test_dataset_url": "b", "target_variable": "y"}}"#,
        )
        .unwrap();
        let now = Local::now();
        let dir = cfg.resolve_output_dir(&now);
        assert!(dir.starts_with("outputs"));
        assert_eq!(dir.components().count(), 3);
    }
}
