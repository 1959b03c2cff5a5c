//! Training/test table loading and feature selection

use crate::error::{TabregError, Result};
use crate::utils::data_loader::{column_names, drop_missing_rows, DataLoader};
use crate::utils::random::derived_rng;
use polars::prelude::*;
use rand::seq::SliceRandom;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use tracing::{info, warn};

/// Name of the identifier column carried alongside the features
pub const ID_COLUMN: &str = "id";

fn default_drop_na() -> bool {
    true
}

fn default_test_size() -> f64 {
    0.2
}

/// Construction inputs of a [`DataModule`] (the `data` configuration block)
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DataConfig {
    pub train_dataset_url: PathBuf,
    pub test_dataset_url: PathBuf,
    pub target_variable: String,
    /// Keep only these features (in table order)
    #[serde(default)]
    pub include_features: Option<Vec<String>>,
    /// Drop these features; replaces any `include_features` selection
    #[serde(default)]
    pub exclude_features: Option<Vec<String>>,
    /// Drop training rows with missing values
    #[serde(default = "default_drop_na")]
    pub drop_na: bool,
    /// Held-out fraction used by `get_split`
    #[serde(default = "default_test_size")]
    pub test_size: f64,
}

impl DataConfig {
    pub fn new(
        train_dataset_url: impl Into<PathBuf>,
        test_dataset_url: impl Into<PathBuf>,
        target_variable: impl Into<String>,
    ) -> Self {
        Self {
            train_dataset_url: train_dataset_url.into(),
            test_dataset_url: test_dataset_url.into(),
            target_variable: target_variable.into(),
            include_features: None,
            exclude_features: None,
            drop_na: default_drop_na(),
            test_size: default_test_size(),
        }
    }

    pub fn with_include_features<S: Into<String>>(mut self, features: impl IntoIterator<Item = S>) -> Self {
        self.include_features = Some(features.into_iter().map(Into::into).collect());
        self
    }

    pub fn with_exclude_features<S: Into<String>>(mut self, features: impl IntoIterator<Item = S>) -> Self {
        self.exclude_features = Some(features.into_iter().map(Into::into).collect());
        self
    }

    pub fn with_drop_na(mut self, drop_na: bool) -> Self {
        self.drop_na = drop_na;
        self
    }

    pub fn with_test_size(mut self, test_size: f64) -> Self {
        self.test_size = test_size;
        self
    }
}

/// Ids, features (without `id`) and target for one side of the data
#[derive(Debug, Clone)]
pub struct LabeledData {
    pub ids: Series,
    pub features: DataFrame,
    pub target: Series,
}

/// Ids and features for the unlabeled test table
#[derive(Debug, Clone)]
pub struct UnlabeledData {
    pub ids: Series,
    pub features: DataFrame,
}

/// Loads the training and test tables once and serves feature/target views
/// over them
#[derive(Debug, Clone)]
pub struct DataModule {
    config: DataConfig,
    df_train: DataFrame,
    df_test: DataFrame,
    features_selected: Vec<String>,
}

impl DataModule {
    /// Load both tables and compute the feature selection
    pub fn new(config: DataConfig) -> Result<Self> {
        if !(config.test_size > 0.0 && config.test_size < 1.0) {
            return Err(TabregError::ConfigError(format!(
                "test_size must be in (0, 1), got {}",
                config.test_size
            )));
        }

        let loader = DataLoader::new();

        info!("Loading training data from {}", config.train_dataset_url.display());
        let mut df_train = loader.load_auto(&config.train_dataset_url)?;

        info!("Loading test data from {}", config.test_dataset_url.display());
        let df_test = loader.load_auto(&config.test_dataset_url)?;

        if config.drop_na {
            info!("Dropping rows with missing values");
            let before = df_train.height();
            df_train = drop_missing_rows(&df_train)?;
            info!("Dropped {} of {} training rows", before - df_train.height(), before);
        }

        let all_features: Vec<String> = column_names(&df_train)
            .into_iter()
            .filter(|c| *c != config.target_variable)
            .collect();
        if all_features.len() == df_train.width() {
            return Err(TabregError::FeatureNotFound(config.target_variable.clone()));
        }
        info!("Found {} features in the dataset", all_features.len());

        let features_selected = select_features(
            &all_features,
            config.include_features.as_deref(),
            config.exclude_features.as_deref(),
        );

        info!(
            "Selected {} features from the dataset: {}",
            features_selected.len(),
            features_selected.join(", ")
        );

        Ok(Self {
            config,
            df_train,
            df_test,
            features_selected,
        })
    }

    pub fn config(&self) -> &DataConfig {
        &self.config
    }

    /// Selected columns, `id` first when it had to be added
    pub fn features_selected(&self) -> &[String] {
        &self.features_selected
    }

    /// Training table after missing-value handling
    pub fn train_frame(&self) -> &DataFrame {
        &self.df_train
    }

    pub fn test_frame(&self) -> &DataFrame {
        &self.df_test
    }

    /// Both sides of one fresh random partition of the training table, as
    /// `(train, held_out)`
    pub fn split(&self) -> Result<(LabeledData, LabeledData)> {
        info!("Splitting data into train and test sets");

        let n = self.df_train.height();
        let n_test = (self.config.test_size * n as f64).ceil() as usize;
        if n_test == 0 || n_test >= n {
            return Err(TabregError::DataError(format!(
                "test_size={} on {} rows leaves an empty split",
                self.config.test_size, n
            )));
        }

        let mut order: Vec<IdxSize> = (0..n as IdxSize).collect();
        order.shuffle(&mut derived_rng());
        let (test_idx, train_idx) = order.split_at(n_test);

        let held_out = self.labeled_rows(test_idx)?;
        let train = self.labeled_rows(train_idx)?;
        Ok((train, held_out))
    }

    /// One side of a fresh random partition; repeated calls re-partition
    pub fn get_split(&self, train: bool) -> Result<LabeledData> {
        let (train_side, held_out) = self.split()?;
        Ok(if train { train_side } else { held_out })
    }

    /// The whole training table
    pub fn get_train_data(&self) -> Result<LabeledData> {
        info!("Loading training data");
        let (ids, features) = separate_ids(&self.df_train, &self.features_selected, "training table")?;
        let target = self.target(&self.df_train)?;
        Ok(LabeledData { ids, features, target })
    }

    /// The whole test table
    pub fn get_test_data(&self) -> Result<UnlabeledData> {
        info!("Loading test data");
        for column in &self.features_selected {
            if self.df_test.get_column_index(column).is_none() {
                return Err(TabregError::SchemaMismatch(column.clone()));
            }
        }
        let (ids, features) = separate_ids(&self.df_test, &self.features_selected, "test table")?;
        Ok(UnlabeledData { ids, features })
    }

    fn target(&self, df: &DataFrame) -> Result<Series> {
        Ok(df
            .column(&self.config.target_variable)
            .map_err(|_| TabregError::FeatureNotFound(self.config.target_variable.clone()))?
            .as_materialized_series()
            .clone())
    }

    fn labeled_rows(&self, rows: &[IdxSize]) -> Result<LabeledData> {
        let idx = IdxCa::from_vec("idx".into(), rows.to_vec());
        let subset = self.df_train.take(&idx)?;
        let (ids, features) = separate_ids(&subset, &self.features_selected, "training table")?;
        let target = self.target(&subset)?;
        Ok(LabeledData { ids, features, target })
    }
}

/// include → keep listed features; exclude → drop listed features and
/// replace any include selection; `id` is prepended when missing
fn select_features(all_features: &[String], include: Option<&[String]>, exclude: Option<&[String]>) -> Vec<String> {
    let mut selected: Vec<String> = all_features.to_vec();

    if let Some(include) = include {
        selected = all_features.iter().filter(|f| include.contains(f)).cloned().collect();
    }

    if let Some(exclude) = exclude {
        selected = all_features.iter().filter(|f| !exclude.contains(f)).cloned().collect();
    }

    if !selected.iter().any(|f| f == ID_COLUMN) {
        warn!(
            "The '{}' column is not included in the selected features. It will be added automatically.",
            ID_COLUMN
        );
        selected.insert(0, ID_COLUMN.to_string());
    }

    selected
}

/// Select `columns` from `df` and split off the `id` column
fn separate_ids(df: &DataFrame, columns: &[String], table: &str) -> Result<(Series, DataFrame)> {
    let ids = df
        .column(ID_COLUMN)
        .map_err(|_| TabregError::FeatureNotFound(format!("'{}' in the {}", ID_COLUMN, table)))?
        .as_materialized_series()
        .clone();

    let feature_columns: Vec<&str> = columns
        .iter()
        .map(|s| s.as_str())
        .filter(|c| *c != ID_COLUMN)
        .collect();
    let features = df.select(feature_columns)?;

    Ok((ids, features))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn names(v: &[&str]) -> Vec<String> {
        v.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn test_select_all_by_default() {
        let all = names(&["id", "a", "b"]);
        assert_eq!(select_features(&all, None, None), all);
    }

    #[test]
    fn test_include_keeps_table_order_and_adds_id() {
        let all = names(&["id", "a", "b", "c"]);
        let include = names(&["c", "a"]);
        assert_eq!(select_features(&all, Some(&include), None), names(&["id", "a", "c"]));
    }

    #[test]
    fn test_exclude_overrides_include() {
        let all = names(&["id", "a", "b", "c"]);
        let include = names(&["a"]);
        let exclude = names(&["b"]);
        assert_eq!(
            select_features(&all, Some(&include), Some(&exclude)),
            names(&["id", "a", "c"])
        );
    }

    #[test]
    fn test_excluding_id_puts_it_back_first() {
        let all = names(&["a", "id", "b"]);
        let exclude = names(&["id"]);
        assert_eq!(select_features(&all, None, Some(&exclude)), names(&["id", "a", "b"]));
    }
}
