//! Regression metrics and cross-validation scorers

use crate::error::{TabregError, Result};
use ndarray::Array1;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

/// Regression metric computed on true and predicted targets
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Metric {
    MeanSquaredError,
    RootMeanSquaredError,
    MeanAbsoluteError,
    MedianAbsoluteError,
    MaxError,
    R2Score,
    ExplainedVarianceScore,
    MeanAbsolutePercentageError,
}

impl Metric {
    pub const ALL: [Metric; 8] = [
        Metric::MeanSquaredError,
        Metric::RootMeanSquaredError,
        Metric::MeanAbsoluteError,
        Metric::MedianAbsoluteError,
        Metric::MaxError,
        Metric::R2Score,
        Metric::ExplainedVarianceScore,
        Metric::MeanAbsolutePercentageError,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Metric::MeanSquaredError => "mean_squared_error",
            Metric::RootMeanSquaredError => "root_mean_squared_error",
            Metric::MeanAbsoluteError => "mean_absolute_error",
            Metric::MedianAbsoluteError => "median_absolute_error",
            Metric::MaxError => "max_error",
            Metric::R2Score => "r2_score",
            Metric::ExplainedVarianceScore => "explained_variance_score",
            Metric::MeanAbsolutePercentageError => "mean_absolute_percentage_error",
        }
    }

    /// Evaluate the metric. Lengths must match and be non-zero.
    pub fn compute(&self, y_true: &Array1<f64>, y_pred: &Array1<f64>) -> Result<f64> {
        if y_true.len() != y_pred.len() {
            return Err(TabregError::ShapeError {
                expected: format!("y_pred length = {}", y_true.len()),
                actual: format!("y_pred length = {}", y_pred.len()),
            });
        }
        if y_true.is_empty() {
            return Err(TabregError::DataError(format!(
                "{} needs at least one sample",
                self.as_str()
            )));
        }

        Ok(match self {
            Metric::MeanSquaredError => mean_squared_error(y_true, y_pred),
            Metric::RootMeanSquaredError => mean_squared_error(y_true, y_pred).sqrt(),
            Metric::MeanAbsoluteError => mean_absolute_error(y_true, y_pred),
            Metric::MedianAbsoluteError => median_absolute_error(y_true, y_pred),
            Metric::MaxError => max_error(y_true, y_pred),
            Metric::R2Score => r2_score(y_true, y_pred),
            Metric::ExplainedVarianceScore => explained_variance_score(y_true, y_pred),
            Metric::MeanAbsolutePercentageError => mean_absolute_percentage_error(y_true, y_pred),
        })
    }
}

impl fmt::Display for Metric {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Metric {
    type Err = TabregError;

    /// Accepts a bare name or a dotted path such as `sklearn.metrics.r2_score`
    fn from_str(s: &str) -> Result<Self> {
        let name = s.trim().rsplit('.').next().unwrap_or_default();
        Metric::ALL
            .iter()
            .copied()
            .find(|m| m.as_str() == name)
            .ok_or_else(|| TabregError::ConfigError(format!("Unknown metric: {}", s)))
    }
}

pub fn mean_squared_error(y_true: &Array1<f64>, y_pred: &Array1<f64>) -> f64 {
    (y_true - y_pred).mapv(|e| e * e).mean().unwrap_or(0.0)
}

pub fn mean_absolute_error(y_true: &Array1<f64>, y_pred: &Array1<f64>) -> f64 {
    (y_true - y_pred).mapv(f64::abs).mean().unwrap_or(0.0)
}

pub fn median_absolute_error(y_true: &Array1<f64>, y_pred: &Array1<f64>) -> f64 {
    let mut errors: Vec<f64> = (y_true - y_pred).mapv(f64::abs).to_vec();
    errors.sort_by(|a, b| a.total_cmp(b));
    let n = errors.len();
    if n == 0 {
        return 0.0;
    }
    if n % 2 == 0 {
        (errors[n / 2 - 1] + errors[n / 2]) / 2.0
    } else {
        errors[n / 2]
    }
}

pub fn max_error(y_true: &Array1<f64>, y_pred: &Array1<f64>) -> f64 {
    (y_true - y_pred).iter().fold(0.0f64, |m, e| m.max(e.abs()))
}

/// R² with a constant target scoring 1.0 when predicted exactly and 0.0 otherwise
pub fn r2_score(y_true: &Array1<f64>, y_pred: &Array1<f64>) -> f64 {
    let mean = y_true.mean().unwrap_or(0.0);
    let ss_res = (y_true - y_pred).mapv(|e| e * e).sum();
    let ss_tot = y_true.mapv(|v| (v - mean) * (v - mean)).sum();
    if ss_tot == 0.0 {
        return if ss_res == 0.0 { 1.0 } else { 0.0 };
    }
    1.0 - ss_res / ss_tot
}

pub fn explained_variance_score(y_true: &Array1<f64>, y_pred: &Array1<f64>) -> f64 {
    let residual = y_true - y_pred;
    let var_res = residual.var(0.0);
    let var_true = y_true.var(0.0);
    if var_true == 0.0 {
        return if var_res == 0.0 { 1.0 } else { 0.0 };
    }
    1.0 - var_res / var_true
}

/// Relative error with the denominator floored at machine epsilon
pub fn mean_absolute_percentage_error(y_true: &Array1<f64>, y_pred: &Array1<f64>) -> f64 {
    y_true
        .iter()
        .zip(y_pred.iter())
        .map(|(t, p)| (t - p).abs() / t.abs().max(f64::EPSILON))
        .sum::<f64>()
        / y_true.len().max(1) as f64
}

/// Cross-validation scorer, oriented so that greater is better
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Scorer {
    R2,
    ExplainedVariance,
    MaxError,
    NegMeanSquaredError,
    NegRootMeanSquaredError,
    NegMeanAbsoluteError,
    NegMedianAbsoluteError,
    NegMeanAbsolutePercentageError,
}

impl Scorer {
    pub const ALL: [Scorer; 8] = [
        Scorer::R2,
        Scorer::ExplainedVariance,
        Scorer::MaxError,
        Scorer::NegMeanSquaredError,
        Scorer::NegRootMeanSquaredError,
        Scorer::NegMeanAbsoluteError,
        Scorer::NegMedianAbsoluteError,
        Scorer::NegMeanAbsolutePercentageError,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Scorer::R2 => "r2",
            Scorer::ExplainedVariance => "explained_variance",
            Scorer::MaxError => "max_error",
            Scorer::NegMeanSquaredError => "neg_mean_squared_error",
            Scorer::NegRootMeanSquaredError => "neg_root_mean_squared_error",
            Scorer::NegMeanAbsoluteError => "neg_mean_absolute_error",
            Scorer::NegMedianAbsoluteError => "neg_median_absolute_error",
            Scorer::NegMeanAbsolutePercentageError => "neg_mean_absolute_percentage_error",
        }
    }

    fn metric(&self) -> (Metric, f64) {
        match self {
            Scorer::R2 => (Metric::R2Score, 1.0),
            Scorer::ExplainedVariance => (Metric::ExplainedVarianceScore, 1.0),
            Scorer::MaxError => (Metric::MaxError, -1.0),
            Scorer::NegMeanSquaredError => (Metric::MeanSquaredError, -1.0),
            Scorer::NegRootMeanSquaredError => (Metric::RootMeanSquaredError, -1.0),
            Scorer::NegMeanAbsoluteError => (Metric::MeanAbsoluteError, -1.0),
            Scorer::NegMedianAbsoluteError => (Metric::MedianAbsoluteError, -1.0),
            Scorer::NegMeanAbsolutePercentageError => (Metric::MeanAbsolutePercentageError, -1.0),
        }
    }

    pub fn score(&self, y_true: &Array1<f64>, y_pred: &Array1<f64>) -> Result<f64> {
        let (metric, sign) = self.metric();
        Ok(sign * metric.compute(y_true, y_pred)?)
    }
}

impl fmt::Display for Scorer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Scorer {
    type Err = TabregError;

    fn from_str(s: &str) -> Result<Self> {
        Scorer::ALL
            .iter()
            .copied()
            .find(|m| m.as_str() == s.trim())
            .ok_or_else(|| TabregError::ConfigError(format!("Unknown scorer: {}", s)))
    }
}

/// One entry of the `metrics` configuration block
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MetricConfig {
    /// Metric name, bare or as a dotted path
    #[serde(rename = "_target_")]
    pub target: String,
}

impl MetricConfig {
    pub fn new(target: impl Into<String>) -> Self {
        Self { target: target.into() }
    }

    pub fn metric(&self) -> Result<Metric> {
        self.target.parse()
    }
}

/// Evaluate every configured metric, keyed by its configuration name
pub fn evaluate_model(
    metrics: &BTreeMap<String, MetricConfig>,
    y_true: &Array1<f64>,
    y_pred: &Array1<f64>,
) -> Result<BTreeMap<String, f64>> {
    metrics
        .iter()
        .map(|(name, cfg)| Ok((name.clone(), cfg.metric()?.compute(y_true, y_pred)?)))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::array;

    #[test]
    fn test_regression_metrics() {
        let y_true = array![3.0, -0.5, 2.0, 7.0];
        let y_pred = array![2.5, 0.0, 2.0, 8.0];

        assert!((mean_squared_error(&y_true, &y_pred) - 0.375).abs() < 1e-12);
        assert!((mean_absolute_error(&y_true, &y_pred) - 0.5).abs() < 1e-12);
        assert!((median_absolute_error(&y_true, &y_pred) - 0.5).abs() < 1e-12);
        assert!((max_error(&y_true, &y_pred) - 1.0).abs() < 1e-12);
        assert!((r2_score(&y_true, &y_pred) - 0.948_608_137_044_967_9).abs() < 1e-12);
        assert!((explained_variance_score(&y_true, &y_pred) - 0.957_173_447_537_473_2).abs() < 1e-12);
    }

    #[test]
    fn test_metric_from_dotted_path() {
        assert_eq!("sklearn.metrics.r2_score".parse::<Metric>().unwrap(), Metric::R2Score);
        assert_eq!("mean_squared_error".parse::<Metric>().unwrap(), Metric::MeanSquaredError);
        assert!(matches!("accuracy".parse::<Metric>(), Err(TabregError::ConfigError(_))));
    }

    #[test]
    fn test_scorer_is_negated_loss() {
        let y_true = array![1.0, 2.0];
        let y_pred = array![2.0, 2.0];
        assert_eq!(Scorer::NegMeanSquaredError.score(&y_true, &y_pred).unwrap(), -0.5);
        assert!("accuracy".parse::<Scorer>().is_err());
    }

    #[test]
    fn test_evaluate_model() {
        let mut metrics = BTreeMap::new();
        metrics.insert("mse".to_string(), MetricConfig::new("sklearn.metrics.mean_squared_error"));
        metrics.insert("mae".to_string(), MetricConfig::new("mean_absolute_error"));

        let y_true = array![1.0, 2.0, 3.0];
        let y_pred = array![1.0, 2.0, 5.0];
        let values = evaluate_model(&metrics, &y_true, &y_pred).unwrap();

        assert_eq!(values.len(), 2);
        assert!((values["mse"] - 4.0 / 3.0).abs() < 1e-12);
        assert!((values["mae"] - 2.0 / 3.0).abs() < 1e-12);
    }

    #[test]
    fn test_length_mismatch() {
        let err = Metric::MeanSquaredError.compute(&array![1.0], &array![1.0, 2.0]);
        assert!(matches!(err, Err(TabregError::ShapeError { .. })));
    }
}
