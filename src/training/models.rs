//! Shared regressor interface

use crate::error::{TabregError, Result};
use super::params::{ModelParams, ParamReader};
use ndarray::{Array1, Array2};

/// Trait implemented by every regressor a pipeline can hold
pub trait Model: Send + Sync {
    /// Name used in logs and error messages
    fn name(&self) -> &'static str;

    /// Fit the model to training data
    fn fit(&mut self, x: &Array2<f64>, y: &Array1<f64>) -> Result<()>;

    /// Make predictions
    fn predict(&self, x: &Array2<f64>) -> Result<Array1<f64>>;

    /// Whether `fit` has completed
    fn is_fitted(&self) -> bool;

    /// Set one hyperparameter by its configuration name
    fn set_param(&mut self, param: &ParamReader<'_>) -> Result<()>;

    /// Apply every hyperparameter in `params`
    fn set_params(&mut self, params: &ModelParams) -> Result<()> {
        let model = self.name();
        for (name, value) in params {
            self.set_param(&ParamReader::new(model, name, value))?;
        }
        Ok(())
    }

    /// Coefficient of determination on the given data
    fn score(&self, x: &Array2<f64>, y: &Array1<f64>) -> Result<f64> {
        let y_pred = self.predict(x)?;
        Ok(r2(y, &y_pred))
    }
}

/// R² with the convention that a constant target scores 1.0 when predicted
/// exactly and 0.0 otherwise
pub(crate) fn r2(y_true: &Array1<f64>, y_pred: &Array1<f64>) -> f64 {
    let y_mean = y_true.mean().unwrap_or(0.0);
    let ss_res = (y_pred - y_true).mapv(|v| v * v).sum();
    let ss_tot = y_true.mapv(|v| (v - y_mean) * (v - y_mean)).sum();

    if ss_tot == 0.0 {
        return if ss_res == 0.0 { 1.0 } else { 0.0 };
    }

    1.0 - ss_res / ss_tot
}

/// Reject X/y pairs with different row counts
pub(crate) fn check_xy(x: &Array2<f64>, y: &Array1<f64>) -> Result<()> {
    if x.nrows() != y.len() {
        return Err(TabregError::ShapeError {
            expected: format!("y length = {}", x.nrows()),
            actual: format!("y length = {}", y.len()),
        });
    }
    if x.nrows() == 0 {
        return Err(TabregError::DataError("cannot fit on zero samples".to_string()));
    }
    Ok(())
}

/// Reject prediction input whose width differs from the training data
pub(crate) fn check_width(x: &Array2<f64>, n_features: usize) -> Result<()> {
    if x.ncols() != n_features {
        return Err(TabregError::ShapeError {
            expected: format!("{} features", n_features),
            actual: format!("{} features", x.ncols()),
        });
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::array;

    #[test]
    fn test_r2_perfect() {
        let y = array![1.0, 2.0, 3.0];
        assert!((r2(&y, &y) - 1.0).abs() < 1e-12);
    }

    #[test]
    fn test_check_xy_mismatch() {
        let x = array![[1.0], [2.0]];
        let y = array![1.0];
        assert!(matches!(check_xy(&x, &y), Err(TabregError::ShapeError { .. })));
    }
}
