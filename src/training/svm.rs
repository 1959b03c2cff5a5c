//! Epsilon-support vector regression
//!
//! The dual is solved by coordinate descent with the intercept folded into
//! the kernel (`K + 1`), which removes the equality constraint and lets every
//! coefficient be updated on its own.

use crate::error::{TabregError, Result};
use super::models::{check_width, check_xy, Model};
use super::params::{ParamReader, ParamValue};
use ndarray::{Array1, Array2, ArrayView1, Axis};
use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use tracing::warn;

/// Maximum number of samples for eager kernel matrix computation.
/// Beyond this, training will return an error to prevent OOM.
const MAX_KERNEL_MATRIX_SAMPLES: usize = 10_000;

/// Sweep limit applied when `max_iter` is unbounded
const SWEEP_CAP: usize = 100_000;

/// Kernel function type
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum KernelType {
    /// K(x, y) = x · y
    Linear,
    /// K(x, y) = (γ x · y + r)^d
    Poly,
    /// K(x, y) = exp(-γ ||x - y||²)
    Rbf,
    /// K(x, y) = tanh(γ x · y + r)
    Sigmoid,
}

/// Kernel coefficient for rbf, poly and sigmoid
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Gamma {
    /// 1 / (n_features * X.var())
    Scale,
    /// 1 / n_features
    Auto,
    Value(f64),
}

/// Support vector regressor
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SVMRegressor {
    /// Regularization parameter (C)
    pub c: f64,
    pub kernel: KernelType,
    /// Polynomial degree
    pub degree: i32,
    pub gamma: Gamma,
    /// Independent term for poly and sigmoid
    pub coef0: f64,
    /// Width of the insensitive tube
    pub epsilon: f64,
    /// Tolerance for stopping criterion
    pub tol: f64,
    /// Maximum sweeps over the data, unbounded when `None`
    pub max_iter: Option<usize>,
    support_vectors: Option<Array2<f64>>,
    dual_coef: Option<Array1<f64>>,
    gamma_value: f64,
    n_features: usize,
}

impl Default for SVMRegressor {
    fn default() -> Self {
        Self::new()
    }
}

impl SVMRegressor {
    pub fn new() -> Self {
        Self {
            c: 1.0,
            kernel: KernelType::Rbf,
            degree: 3,
            gamma: Gamma::Scale,
            coef0: 0.0,
            epsilon: 0.1,
            tol: 1e-3,
            max_iter: None,
            support_vectors: None,
            dual_coef: None,
            gamma_value: 1.0,
            n_features: 0,
        }
    }

    pub fn with_c(mut self, c: f64) -> Self {
        self.c = c;
        self
    }

    pub fn with_kernel(mut self, kernel: KernelType) -> Self {
        self.kernel = kernel;
        self
    }

    pub fn with_gamma(mut self, gamma: Gamma) -> Self {
        self.gamma = gamma;
        self
    }

    pub fn with_epsilon(mut self, epsilon: f64) -> Self {
        self.epsilon = epsilon;
        self
    }

    fn resolve_gamma(&self, x: &Array2<f64>) -> f64 {
        let n_features = x.ncols().max(1) as f64;
        match self.gamma {
            Gamma::Value(g) => g,
            Gamma::Auto => 1.0 / n_features,
            Gamma::Scale => {
                let var = x.var(0.0);
                if var > 0.0 {
                    1.0 / (n_features * var)
                } else {
                    1.0
                }
            }
        }
    }

    fn kernel(&self, a: ArrayView1<f64>, b: ArrayView1<f64>) -> f64 {
        let gamma = self.gamma_value;
        match self.kernel {
            KernelType::Linear => a.dot(&b),
            KernelType::Poly => (gamma * a.dot(&b) + self.coef0).powi(self.degree),
            KernelType::Rbf => {
                let norm_sq: f64 = a.iter().zip(b.iter()).map(|(p, q)| (p - q) * (p - q)).sum();
                (-gamma * norm_sq).exp()
            }
            KernelType::Sigmoid => (gamma * a.dot(&b) + self.coef0).tanh(),
        }
    }

    /// Kernel between every row of `a` and every row of `b`, rows computed in parallel
    fn kernel_matrix(&self, a: &Array2<f64>, b: &Array2<f64>) -> Result<Array2<f64>> {
        let rows: Vec<Vec<f64>> = (0..a.nrows())
            .into_par_iter()
            .map(|i| b.rows().into_iter().map(|row| self.kernel(a.row(i), row)).collect())
            .collect();

        let data: Vec<f64> = rows.into_iter().flatten().collect();
        Ok(Array2::from_shape_vec((a.nrows(), b.nrows()), data)?)
    }

    /// Number of samples kept as support vectors
    pub fn n_support_vectors(&self) -> usize {
        self.support_vectors.as_ref().map_or(0, |sv| sv.nrows())
    }

    /// Intercept implied by the folded bias
    pub fn intercept(&self) -> Option<f64> {
        self.dual_coef.as_ref().map(|b| b.sum())
    }
}

impl Model for SVMRegressor {
    fn name(&self) -> &'static str {
        "svm"
    }

    fn fit(&mut self, x: &Array2<f64>, y: &Array1<f64>) -> Result<()> {
        check_xy(x, y)?;
        let n = x.nrows();

        if n > MAX_KERNEL_MATRIX_SAMPLES {
            return Err(TabregError::ValidationError(format!(
                "Dataset has {} samples, exceeding the maximum {} for SVR kernel matrix. \
                 Consider subsampling or using a different algorithm.",
                n, MAX_KERNEL_MATRIX_SAMPLES
            )));
        }

        self.n_features = x.ncols();
        self.gamma_value = self.resolve_gamma(x);

        // Q = K + 1
        let q = self.kernel_matrix(x, x)? + 1.0;

        let mut beta: Array1<f64> = Array1::zeros(n);
        // Gradient of the smooth part: Q beta - y
        let mut grad: Array1<f64> = -y;
        let max_sweeps = self.max_iter.unwrap_or(SWEEP_CAP);
        let mut converged = false;

        for _ in 0..max_sweeps {
            let mut max_change = 0.0f64;

            for i in 0..n {
                let q_ii = q[[i, i]];
                if q_ii <= 1e-12 {
                    continue;
                }

                let z = beta[i] - grad[i] / q_ii;
                let shrink = self.epsilon / q_ii;
                let soft = if z > shrink {
                    z - shrink
                } else if z < -shrink {
                    z + shrink
                } else {
                    0.0
                };
                let updated = soft.clamp(-self.c, self.c);

                let delta = updated - beta[i];
                if delta != 0.0 {
                    grad.scaled_add(delta, &q.column(i));
                    beta[i] = updated;
                    max_change = max_change.max(delta.abs() * q_ii.sqrt());
                }
            }

            if max_change < self.tol {
                converged = true;
                break;
            }
        }

        if !converged {
            warn!(
                "SVR solver stopped after {} sweeps without reaching tol={}",
                max_sweeps, self.tol
            );
        }

        let support: Vec<usize> = (0..n).filter(|&i| beta[i] != 0.0).collect();
        self.support_vectors = Some(x.select(Axis(0), &support));
        self.dual_coef = Some(support.iter().map(|&i| beta[i]).collect());
        Ok(())
    }

    fn predict(&self, x: &Array2<f64>) -> Result<Array1<f64>> {
        let (sv, coef) = match (&self.support_vectors, &self.dual_coef) {
            (Some(sv), Some(coef)) => (sv, coef),
            _ => return Err(TabregError::ModelNotFitted),
        };
        check_width(x, self.n_features)?;

        if sv.nrows() == 0 {
            return Ok(Array1::zeros(x.nrows()));
        }

        let k = self.kernel_matrix(x, sv)? + 1.0;
        Ok(k.dot(coef))
    }

    fn is_fitted(&self) -> bool {
        self.dual_coef.is_some()
    }

    fn set_param(&mut self, param: &ParamReader<'_>) -> Result<()> {
        match param.name() {
            "C" | "c" => self.c = param.positive_f64()?,
            "epsilon" => self.epsilon = param.non_negative_f64()?,
            "tol" => self.tol = param.positive_f64()?,
            "coef0" => self.coef0 = param.f64()?,
            "degree" => self.degree = i32::try_from(param.usize()?).map_err(|_| param.unknown())?,
            "kernel" => {
                self.kernel = match param.str()? {
                    "linear" => KernelType::Linear,
                    "poly" => KernelType::Poly,
                    "rbf" => KernelType::Rbf,
                    "sigmoid" => KernelType::Sigmoid,
                    other => {
                        return Err(TabregError::invalid_param(
                            "svm",
                            "kernel",
                            format!("expected one of linear, poly, rbf, sigmoid, got \"{}\"", other),
                        ))
                    }
                }
            }
            "gamma" => {
                self.gamma = match param.value() {
                    ParamValue::Str(s) if s == "scale" => Gamma::Scale,
                    ParamValue::Str(s) if s == "auto" => Gamma::Auto,
                    _ => Gamma::Value(param.positive_f64()?),
                }
            }
            "max_iter" => {
                let v = param.i64()?;
                self.max_iter = if v < 0 { None } else { Some(v as usize) };
            }
            _ => return Err(param.unknown()),
        }
        Ok(())
    }
}
