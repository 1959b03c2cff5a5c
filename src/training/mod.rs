//! Model training module
//!
//! Regressors available to a pipeline:
//! - Ordinary least squares and Lasso
//! - Random forest of regression trees
//! - Epsilon-support vector regression
//!
//! plus k-fold style cross-validation over a whole pipeline.

mod models;
pub mod params;
pub mod cross_validation;
pub mod linear_models;
pub mod decision_tree;
pub mod random_forest;
pub mod svm;

pub use models::Model;
pub(crate) use models::r2;
pub use params::{ModelParams, ParamReader, ParamValue};
pub use cross_validation::{
    cross_validate, format_cv_results, save_results, CVResults, CVSplit, CVStrategy, CrossValidator,
    DEFAULT_SCORE_NAME,
};
pub use linear_models::{LassoRegression, LinearRegression, Selection};
pub use decision_tree::{DecisionTreeRegressor, TreeNode};
pub use random_forest::{MaxFeatures, RandomForestRegressor};
pub use svm::{Gamma, KernelType, SVMRegressor};
