//! Regression pipelines
//!
//! A pipeline is an ordered list of named stages: an optional `"scaler"`
//! followed by exactly one `"model"`. [`create_pipeline`] is the factory for
//! the supported model kinds.

mod checkpoint;

pub use checkpoint::{checkpoint_file_name, save_checkpoint};

use crate::error::{TabregError, Result};
use crate::preprocessing::StandardScaler;
use crate::training::{
    LassoRegression, LinearRegression, Model, ModelParams, RandomForestRegressor, SVMRegressor,
};
use crate::utils::data_loader::{frame_to_array2, series_to_array1};
use ndarray::{Array1, Array2};
use polars::prelude::*;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use tracing::debug;

/// Name of the optional scaling stage
pub const SCALER_STEP: &str = "scaler";
/// Name of the regressor stage
pub const MODEL_STEP: &str = "model";

/// Supported regressor kinds
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ModelKind {
    Linear,
    Lasso,
    RandomForest,
    Svm,
}

impl ModelKind {
    pub const ALL: [ModelKind; 4] = [
        ModelKind::Linear,
        ModelKind::Lasso,
        ModelKind::RandomForest,
        ModelKind::Svm,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            ModelKind::Linear => "linear",
            ModelKind::Lasso => "lasso",
            ModelKind::RandomForest => "random_forest",
            ModelKind::Svm => "svm",
        }
    }

    /// Whether the factory forwards its seed as `random_state`
    pub fn is_seeded(&self) -> bool {
        matches!(self, ModelKind::Lasso | ModelKind::RandomForest)
    }
}

impl fmt::Display for ModelKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ModelKind {
    type Err = TabregError;

    fn from_str(s: &str) -> Result<Self> {
        ModelKind::ALL
            .iter()
            .copied()
            .find(|k| k.as_str() == s)
            .ok_or_else(|| TabregError::invalid_model_type(s))
    }
}

/// The regressor held by a pipeline's `"model"` stage
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Regressor {
    Linear(LinearRegression),
    Lasso(LassoRegression),
    RandomForest(RandomForestRegressor),
    Svm(SVMRegressor),
}

impl Regressor {
    /// Default-configured regressor of the given kind
    pub fn new(kind: ModelKind) -> Self {
        match kind {
            ModelKind::Linear => Regressor::Linear(LinearRegression::new()),
            ModelKind::Lasso => Regressor::Lasso(LassoRegression::default()),
            ModelKind::RandomForest => Regressor::RandomForest(RandomForestRegressor::default()),
            ModelKind::Svm => Regressor::Svm(SVMRegressor::new()),
        }
    }

    pub fn kind(&self) -> ModelKind {
        match self {
            Regressor::Linear(_) => ModelKind::Linear,
            Regressor::Lasso(_) => ModelKind::Lasso,
            Regressor::RandomForest(_) => ModelKind::RandomForest,
            Regressor::Svm(_) => ModelKind::Svm,
        }
    }

    /// Seed of the model's own randomness, for kinds that have one
    pub fn random_state(&self) -> Option<u64> {
        match self {
            Regressor::Lasso(m) => m.random_state,
            Regressor::RandomForest(m) => m.random_state,
            Regressor::Linear(_) | Regressor::Svm(_) => None,
        }
    }

    fn set_random_state(&mut self, seed: u64) {
        match self {
            Regressor::Lasso(m) => m.random_state = Some(seed),
            Regressor::RandomForest(m) => m.random_state = Some(seed),
            Regressor::Linear(_) | Regressor::Svm(_) => {}
        }
    }

    fn as_model(&self) -> &dyn Model {
        match self {
            Regressor::Linear(m) => m,
            Regressor::Lasso(m) => m,
            Regressor::RandomForest(m) => m,
            Regressor::Svm(m) => m,
        }
    }

    fn as_model_mut(&mut self) -> &mut dyn Model {
        match self {
            Regressor::Linear(m) => m,
            Regressor::Lasso(m) => m,
            Regressor::RandomForest(m) => m,
            Regressor::Svm(m) => m,
        }
    }

    pub fn set_params(&mut self, params: &ModelParams) -> Result<()> {
        self.as_model_mut().set_params(params)
    }

    pub fn fit(&mut self, x: &Array2<f64>, y: &Array1<f64>) -> Result<()> {
        self.as_model_mut().fit(x, y)
    }

    pub fn predict(&self, x: &Array2<f64>) -> Result<Array1<f64>> {
        self.as_model().predict(x)
    }

    pub fn is_fitted(&self) -> bool {
        self.as_model().is_fitted()
    }
}

/// One pipeline stage
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Stage {
    Scaler(StandardScaler),
    Model(Regressor),
}

impl Stage {
    pub fn as_scaler(&self) -> Option<&StandardScaler> {
        match self {
            Stage::Scaler(s) => Some(s),
            Stage::Model(_) => None,
        }
    }

    pub fn as_regressor(&self) -> Option<&Regressor> {
        match self {
            Stage::Model(r) => Some(r),
            Stage::Scaler(_) => None,
        }
    }
}

/// Ordered, named stages ending in a regressor
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(try_from = "RawPipeline")]
pub struct Pipeline {
    steps: Vec<(String, Stage)>,
    /// Column order seen by `fit_frame`
    feature_names: Option<Vec<String>>,
}

/// Decoded form of a [`Pipeline`], checked before use
#[derive(Deserialize)]
struct RawPipeline {
    steps: Vec<(String, Stage)>,
    #[serde(default)]
    feature_names: Option<Vec<String>>,
}

impl TryFrom<RawPipeline> for Pipeline {
    type Error = TabregError;

    fn try_from(raw: RawPipeline) -> Result<Self> {
        let pipeline = Self {
            steps: raw.steps,
            feature_names: raw.feature_names,
        };
        pipeline.validate()?;
        Ok(pipeline)
    }
}

impl Pipeline {
    /// Build from explicit stages. The last stage must be the only regressor.
    pub fn new(steps: Vec<(String, Stage)>) -> Result<Self> {
        let pipeline = Self {
            steps,
            feature_names: None,
        };
        pipeline.validate()?;
        Ok(pipeline)
    }

    fn validate(&self) -> Result<()> {
        let n_models = self.steps.iter().filter(|(_, s)| matches!(s, Stage::Model(_))).count();
        if n_models != 1 || !matches!(self.steps.last(), Some((_, Stage::Model(_)))) {
            return Err(TabregError::ConfigError(
                "a pipeline needs exactly one regressor, as its last stage".to_string(),
            ));
        }
        Ok(())
    }

    /// Stages in order
    pub fn steps(&self) -> &[(String, Stage)] {
        &self.steps
    }

    pub fn len(&self) -> usize {
        self.steps.len()
    }

    pub fn is_empty(&self) -> bool {
        self.steps.is_empty()
    }

    /// Stage by name
    pub fn named_step(&self, name: &str) -> Option<&Stage> {
        self.steps.iter().find(|(n, _)| n == name).map(|(_, s)| s)
    }

    pub fn scaler(&self) -> Option<&StandardScaler> {
        self.steps.iter().find_map(|(_, s)| s.as_scaler())
    }

    pub fn model(&self) -> &Regressor {
        // `new` and deserialization both validate the trailing regressor
        match self.steps.last() {
            Some((_, Stage::Model(r))) => r,
            _ => unreachable!("pipeline without a regressor stage"),
        }
    }

    pub fn kind(&self) -> ModelKind {
        self.model().kind()
    }

    /// Feature columns recorded by [`Pipeline::fit_frame`]
    pub fn feature_names(&self) -> Option<&[String]> {
        self.feature_names.as_deref()
    }

    pub fn is_fitted(&self) -> bool {
        self.model().is_fitted()
    }

    /// Fit each stage in turn, feeding transformed data forward
    pub fn fit(&mut self, x: &Array2<f64>, y: &Array1<f64>) -> Result<()> {
        let mut current = x.to_owned();
        for (name, stage) in &mut self.steps {
            debug!(step = name.as_str(), rows = current.nrows(), cols = current.ncols(), "Fitting stage");
            match stage {
                Stage::Scaler(scaler) => current = scaler.fit_transform(&current)?,
                Stage::Model(model) => model.fit(&current, y)?,
            }
        }
        Ok(())
    }

    pub fn predict(&self, x: &Array2<f64>) -> Result<Array1<f64>> {
        let mut current = x.to_owned();
        for (_, stage) in &self.steps {
            match stage {
                Stage::Scaler(scaler) => current = scaler.transform(&current)?,
                Stage::Model(model) => return model.predict(&current),
            }
        }
        Err(TabregError::ModelNotFitted)
    }

    /// Fit on a feature frame, remembering its column order
    pub fn fit_frame(&mut self, features: &DataFrame, target: &Series) -> Result<()> {
        let x = frame_to_array2(features)?;
        let y = series_to_array1(target)?;
        self.fit(&x, &y)?;
        self.feature_names = Some(
            features
                .get_column_names()
                .into_iter()
                .map(|s| s.to_string())
                .collect(),
        );
        Ok(())
    }

    /// Predict on a frame, selecting the columns seen at fit time
    pub fn predict_frame(&self, features: &DataFrame) -> Result<Array1<f64>> {
        let x = match &self.feature_names {
            Some(names) => {
                if let Some(missing) = names
                    .iter()
                    .find(|n| features.get_column_index(n.as_str()).is_none())
                {
                    return Err(TabregError::SchemaMismatch(missing.clone()));
                }
                frame_to_array2(&features.select(names.iter().map(|s| s.as_str()))?)?
            }
            None => frame_to_array2(features)?,
        };
        self.predict(&x)
    }
}

/// Build a pipeline: optional `"scaler"`, then the `"model"` selected by
/// `model_type`.
///
/// `seed` becomes the regressor's `random_state` for `lasso` and
/// `random_forest` and is ignored otherwise. `params` are applied verbatim.
pub fn create_pipeline(
    model_type: &str,
    scale_features: bool,
    seed: u64,
    params: &ModelParams,
) -> Result<Pipeline> {
    let kind: ModelKind = model_type.parse()?;

    let mut regressor = Regressor::new(kind);
    if kind.is_seeded() {
        if params.contains_key("random_state") {
            return Err(TabregError::invalid_param(
                kind.as_str(),
                "random_state",
                "set through the pipeline seed, not as a model parameter",
            ));
        }
        regressor.set_random_state(seed);
    }
    regressor.set_params(params)?;

    let mut steps = Vec::with_capacity(2);
    if scale_features {
        steps.push((SCALER_STEP.to_string(), Stage::Scaler(StandardScaler::new())));
    }
    steps.push((MODEL_STEP.to_string(), Stage::Model(regressor)));

    Pipeline::new(steps)
}

fn default_model_type() -> String {
    ModelKind::Linear.as_str().to_string()
}

fn default_scale_features() -> bool {
    true
}

fn default_seed() -> u64 {
    1234
}

/// Factory inputs as they appear in the `model` configuration block
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ModelConfig {
    #[serde(default = "default_model_type")]
    pub model_type: String,
    #[serde(default = "default_scale_features")]
    pub scale_features: bool,
    #[serde(default = "default_seed")]
    pub seed: u64,
    #[serde(default)]
    pub params: ModelParams,
}

impl Default for ModelConfig {
    fn default() -> Self {
        Self {
            model_type: default_model_type(),
            scale_features: default_scale_features(),
            seed: default_seed(),
            params: ModelParams::new(),
        }
    }
}

impl ModelConfig {
    pub fn new(model_type: impl Into<String>) -> Self {
        Self {
            model_type: model_type.into(),
            ..Default::default()
        }
    }

    /// Fresh, unfitted pipeline for this configuration
    pub fn instantiate(&self) -> Result<Pipeline> {
        create_pipeline(&self.model_type, self.scale_features, self.seed, &self.params)
    }
}
