//! Linear model implementations

use crate::error::{TabregError, Result};
use super::models::{check_width, check_xy, Model};
use super::params::ParamReader;
use crate::utils::random::next_seed;
use ndarray::{Array1, Array2, Axis};
use rand::seq::SliceRandom;
use rand::SeedableRng;
use rand_chacha::ChaCha8Rng;
use serde::{Deserialize, Serialize};

/// Cholesky factorisation of a symmetric positive-definite matrix.
/// Returns `None` when a pivot is not clearly positive.
fn cholesky(a: &Array2<f64>) -> Option<Array2<f64>> {
    let n = a.nrows();
    let max_diag = a.diag().iter().fold(0.0f64, |m, v| m.max(v.abs()));
    let threshold = 1e-12 * max_diag.max(1e-300);
    let mut l = Array2::zeros((n, n));

    for i in 0..n {
        for j in 0..=i {
            let mut sum = 0.0;
            for k in 0..j {
                sum += l[[i, k]] * l[[j, k]];
            }

            if i == j {
                let diag = a[[i, i]] - sum;
                if diag <= threshold {
                    return None;
                }
                l[[i, j]] = diag.sqrt();
            } else {
                l[[i, j]] = (a[[i, j]] - sum) / l[[j, j]];
            }
        }
    }

    Some(l)
}

/// Solve L L^T x = b by forward and backward substitution
fn cholesky_substitute(l: &Array2<f64>, b: &Array1<f64>) -> Array1<f64> {
    let n = l.nrows();

    let mut y = Array1::zeros(n);
    for i in 0..n {
        let mut sum = 0.0;
        for j in 0..i {
            sum += l[[i, j]] * y[j];
        }
        y[i] = (b[i] - sum) / l[[i, i]];
    }

    let mut x = Array1::zeros(n);
    for i in (0..n).rev() {
        let mut sum = 0.0;
        for j in (i + 1)..n {
            sum += l[[j, i]] * x[j];
        }
        x[i] = (y[i] - sum) / l[[i, i]];
    }

    x
}

/// Gauss-Jordan inversion with partial pivoting (last resort)
fn matrix_inverse(m: &Array2<f64>) -> Option<Array2<f64>> {
    let n = m.nrows();
    if n != m.ncols() {
        return None;
    }

    let mut aug = Array2::zeros((n, 2 * n));
    for i in 0..n {
        for j in 0..n {
            aug[[i, j]] = m[[i, j]];
        }
        aug[[i, n + i]] = 1.0;
    }

    for col in 0..n {
        let mut max_row = col;
        for row in col + 1..n {
            if aug[[row, col]].abs() > aug[[max_row, col]].abs() {
                max_row = row;
            }
        }

        if max_row != col {
            for j in 0..2 * n {
                aug.swap([col, j], [max_row, j]);
            }
        }

        if aug[[col, col]].abs() < 1e-10 {
            return None;
        }

        let pivot = aug[[col, col]];
        for j in 0..2 * n {
            aug[[col, j]] /= pivot;
        }

        for row in 0..n {
            if row != col {
                let factor = aug[[row, col]];
                for j in 0..2 * n {
                    aug[[row, j]] -= factor * aug[[col, j]];
                }
            }
        }
    }

    Some(aug.slice(ndarray::s![.., n..]).to_owned())
}

/// Solve the symmetric system A x = b.
///
/// Rank-deficient systems (collinear features, fewer rows than columns) get a
/// tiny ridge on the diagonal, which converges on the minimum-norm least
/// squares solution.
fn solve_symmetric(a: &Array2<f64>, b: &Array1<f64>) -> Option<Array1<f64>> {
    let n = a.nrows();
    if n != a.ncols() || n != b.len() {
        return None;
    }
    if n == 0 {
        return Some(Array1::zeros(0));
    }

    if let Some(l) = cholesky(a) {
        return Some(cholesky_substitute(&l, b));
    }

    let mean_diag = a.diag().iter().map(|v| v.abs()).sum::<f64>() / n as f64;
    for scale in [1e-10, 1e-8, 1e-6] {
        let ridge = scale * mean_diag.max(1.0);
        let mut a_reg = a.clone();
        for k in 0..n {
            a_reg[[k, k]] += ridge;
        }
        if let Some(l) = cholesky(&a_reg) {
            return Some(cholesky_substitute(&l, b));
        }
    }

    matrix_inverse(a).map(|inv| inv.dot(b))
}

/// Centre X and y when fitting an intercept
fn center(
    x: &Array2<f64>,
    y: &Array1<f64>,
    fit_intercept: bool,
) -> (Array2<f64>, Array1<f64>, Option<(Array1<f64>, f64)>) {
    if !fit_intercept {
        return (x.clone(), y.clone(), None);
    }

    let x_mean = x
        .mean_axis(Axis(0))
        .unwrap_or_else(|| Array1::zeros(x.ncols()));
    let y_mean = y.mean().unwrap_or(0.0);
    let x_centered = x - &x_mean.view().insert_axis(Axis(0));
    let y_centered = y - y_mean;

    (x_centered, y_centered, Some((x_mean, y_mean)))
}

/// Ordinary least squares regression
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LinearRegression {
    /// Fitted coefficients (weights)
    pub coefficients: Option<Array1<f64>>,
    /// Fitted intercept (bias)
    pub intercept: Option<f64>,
    /// Whether to fit intercept
    pub fit_intercept: bool,
}

impl Default for LinearRegression {
    fn default() -> Self {
        Self::new()
    }
}

impl LinearRegression {
    /// Create a new linear regression model
    pub fn new() -> Self {
        Self {
            coefficients: None,
            intercept: None,
            fit_intercept: true,
        }
    }

    /// Enable/disable fitting intercept
    pub fn with_fit_intercept(mut self, fit_intercept: bool) -> Self {
        self.fit_intercept = fit_intercept;
        self
    }
}

impl Model for LinearRegression {
    fn name(&self) -> &'static str {
        "linear"
    }

    fn fit(&mut self, x: &Array2<f64>, y: &Array1<f64>) -> Result<()> {
        check_xy(x, y)?;

        let (x_c, y_c, means) = center(x, y, self.fit_intercept);

        // Normal equations: (X^T X) w = X^T y
        let xtx = x_c.t().dot(&x_c);
        let xty = x_c.t().dot(&y_c);
        let coefficients = solve_symmetric(&xtx, &xty).ok_or_else(|| {
            TabregError::ComputationError("Matrix is singular, cannot solve least squares".to_string())
        })?;

        let intercept = match means {
            Some((x_mean, y_mean)) => y_mean - coefficients.dot(&x_mean),
            None => 0.0,
        };

        self.coefficients = Some(coefficients);
        self.intercept = Some(intercept);
        Ok(())
    }

    fn predict(&self, x: &Array2<f64>) -> Result<Array1<f64>> {
        let coefficients = self.coefficients.as_ref().ok_or(TabregError::ModelNotFitted)?;
        check_width(x, coefficients.len())?;
        Ok(x.dot(coefficients) + self.intercept.unwrap_or(0.0))
    }

    fn is_fitted(&self) -> bool {
        self.coefficients.is_some()
    }

    fn set_param(&mut self, param: &ParamReader<'_>) -> Result<()> {
        match param.name() {
            "fit_intercept" => self.fit_intercept = param.bool()?,
            _ => return Err(param.unknown()),
        }
        Ok(())
    }
}

/// Coordinate visiting order for lasso
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Selection {
    /// Features in column order
    Cyclic,
    /// A fresh random permutation each sweep, drawn from `random_state`
    Random,
}

/// Lasso Regression (L1-regularized via coordinate descent)
///
/// Minimises `(1 / 2n) * ||y - Xw||^2 + alpha * ||w||_1`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LassoRegression {
    pub coefficients: Option<Array1<f64>>,
    pub intercept: Option<f64>,
    pub fit_intercept: bool,
    /// L1 regularization strength
    pub alpha: f64,
    pub max_iter: usize,
    pub tol: f64,
    pub selection: Selection,
    /// Seed for the random coordinate order
    pub random_state: Option<u64>,
    /// Sweeps run by the last fit
    pub n_iter: usize,
}

impl Default for LassoRegression {
    fn default() -> Self {
        Self::new(1.0)
    }
}

impl LassoRegression {
    pub fn new(alpha: f64) -> Self {
        Self {
            coefficients: None,
            intercept: None,
            fit_intercept: true,
            alpha,
            max_iter: 1000,
            tol: 1e-4,
            selection: Selection::Cyclic,
            random_state: None,
            n_iter: 0,
        }
    }

    pub fn with_alpha(mut self, alpha: f64) -> Self {
        self.alpha = alpha;
        self
    }

    pub fn with_max_iter(mut self, max_iter: usize) -> Self {
        self.max_iter = max_iter;
        self
    }

    pub fn with_selection(mut self, selection: Selection) -> Self {
        self.selection = selection;
        self
    }

    pub fn with_random_state(mut self, seed: u64) -> Self {
        self.random_state = Some(seed);
        self
    }

    /// Soft-threshold operator for L1 proximal step
    fn soft_threshold(val: f64, threshold: f64) -> f64 {
        if val > threshold {
            val - threshold
        } else if val < -threshold {
            val + threshold
        } else {
            0.0
        }
    }
}

impl Model for LassoRegression {
    fn name(&self) -> &'static str {
        "lasso"
    }

    fn fit(&mut self, x: &Array2<f64>, y: &Array1<f64>) -> Result<()> {
        check_xy(x, y)?;
        let n_samples = x.nrows();
        let n_features = x.ncols();

        let (x_c, y_c, means) = center(x, y, self.fit_intercept);

        let col_norms: Vec<f64> = (0..n_features)
            .map(|j| x_c.column(j).mapv(|v| v * v).sum())
            .collect();

        let mut rng = match self.random_state {
            Some(seed) => ChaCha8Rng::seed_from_u64(seed),
            None => ChaCha8Rng::seed_from_u64(next_seed()),
        };
        let mut order: Vec<usize> = (0..n_features).collect();

        let mut w: Array1<f64> = Array1::zeros(n_features);
        let mut r = y_c.clone();
        let lambda = self.alpha * n_samples as f64;
        self.n_iter = 0;

        for _ in 0..self.max_iter {
            self.n_iter += 1;
            if self.selection == Selection::Random {
                order.shuffle(&mut rng);
            }

            let mut max_update = 0.0f64;
            let mut max_weight = 0.0f64;

            for &j in &order {
                if col_norms[j] < 1e-15 {
                    w[j] = 0.0;
                    continue;
                }
                // rho = x_j^T r + ||x_j||^2 w_j, with r the current residual
                let rho = x_c.column(j).dot(&r) + col_norms[j] * w[j];
                let old = w[j];
                w[j] = Self::soft_threshold(rho, lambda) / col_norms[j];

                let delta = old - w[j];
                if delta != 0.0 {
                    r.scaled_add(delta, &x_c.column(j));
                }
                max_update = max_update.max(delta.abs());
                max_weight = max_weight.max(w[j].abs());
            }

            if max_weight == 0.0 || max_update / max_weight < self.tol {
                break;
            }
        }

        self.intercept = Some(match means {
            Some((x_mean, y_mean)) => y_mean - w.dot(&x_mean),
            None => 0.0,
        });
        self.coefficients = Some(w);
        Ok(())
    }

    fn predict(&self, x: &Array2<f64>) -> Result<Array1<f64>> {
        let coefficients = self.coefficients.as_ref().ok_or(TabregError::ModelNotFitted)?;
        check_width(x, coefficients.len())?;
        Ok(x.dot(coefficients) + self.intercept.unwrap_or(0.0))
    }

    fn is_fitted(&self) -> bool {
        self.coefficients.is_some()
    }

    fn set_param(&mut self, param: &ParamReader<'_>) -> Result<()> {
        match param.name() {
            "alpha" => self.alpha = param.non_negative_f64()?,
            "fit_intercept" => self.fit_intercept = param.bool()?,
            "max_iter" => self.max_iter = param.usize()?.max(1),
            "tol" => self.tol = param.positive_f64()?,
            "selection" => {
                self.selection = match param.str()? {
                    "cyclic" => Selection::Cyclic,
                    "random" => Selection::Random,
                    other => {
                        return Err(TabregError::invalid_param(
                            "lasso",
                            "selection",
                            format!("expected \"cyclic\" or \"random\", got \"{}\"", other),
                        ))
                    }
                }
            }
            _ => return Err(param.unknown()),
        }
        Ok(())
    }
}
