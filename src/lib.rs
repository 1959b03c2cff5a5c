//! tabreg - Configuration-driven tabular regression
//!
//! This crate provides the pieces of a train / test / predict workflow over
//! CSV tables:
//! - Dataset loading with feature selection and train/held-out splits
//! - A pipeline factory building an optional scaler plus one regressor
//! - Cross-validation with a `mean ± std` summary table
//! - JSON checkpoints and sorted prediction tables
//!
//! # Modules
//!
//! ## Data
//! - [`data`] - Training/test tables, feature selection, splits
//! - [`preprocessing`] - Feature scaling
//!
//! ## Models
//! - [`training`] - Regressors and cross-validation
//! - [`pipeline`] - Pipeline factory and checkpoints
//! - [`metrics`] - Regression metrics and scorers
//!
//! ## Services
//! - [`config`] - Layered run configuration
//! - [`cli`] - Command-line interface
//!
//! ## Utilities
//! - [`utils`] - CSV I/O, array conversion, process-wide RNG

// Core error handling
pub mod error;

// Data
pub mod data;
pub mod preprocessing;

// Models
pub mod training;
pub mod pipeline;
pub mod metrics;

// Utilities
pub mod utils;

// Services
pub mod config;
pub mod cli;

pub use error::{TabregError, Result};

/// Re-export commonly used types
pub mod prelude {
    // Error handling
    pub use crate::error::{TabregError, Result};

    // Data
    pub use crate::data::{DataConfig, DataModule, LabeledData, UnlabeledData};

    // Preprocessing
    pub use crate::preprocessing::StandardScaler;

    // Training
    pub use crate::training::{
        cross_validate, format_cv_results, CVStrategy, CrossValidator, Model, ModelParams, ParamValue,
    };

    // Pipeline
    pub use crate::pipeline::{create_pipeline, save_checkpoint, ModelConfig, ModelKind, Pipeline, Regressor};

    // Metrics
    pub use crate::metrics::{evaluate_model, Metric, MetricConfig, Scorer};

    // Configuration
    pub use crate::config::{AppConfig, ConfigLoader};

    // Utilities
    pub use crate::utils::seed_everything;
}
