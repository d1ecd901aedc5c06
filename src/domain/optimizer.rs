//! Multi-asset weight optimisation: risk parity and mean-variance.

use std::fmt;
use std::str::FromStr;

use nalgebra::{DMatrix, DVector};
use serde::Serialize;
use tracing::{debug, warn};

use super::error::AetherError;
use super::returns::ReturnMatrix;

/// Smallest variance an asset may have before the covariance is singular.
const MIN_VARIANCE: f64 = 1e-16;

/// Reciprocal condition number below which Σ is treated as singular.
const MIN_RECIPROCAL_CONDITION: f64 = 1e-12;

const WEIGHT_EPSILON: f64 = 1e-12;

const PROJECTION_STEPS: usize = 200;
const PROJECTION_TOLERANCE: f64 = 1e-9;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum OptimizationMethod {
    RiskParity,
    MeanVariance,
}

impl fmt::Display for OptimizationMethod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            OptimizationMethod::RiskParity => write!(f, "risk_parity"),
            OptimizationMethod::MeanVariance => write!(f, "mean_variance"),
        }
    }
}

impl FromStr for OptimizationMethod {
    type Err = AetherError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().replace('-', "_").as_str() {
            "risk_parity" => Ok(OptimizationMethod::RiskParity),
            "mean_variance" => Ok(OptimizationMethod::MeanVariance),
            other => Err(AetherError::configuration(
                "method",
                format!("unknown optimization method '{}'", other),
            )),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct OptimizerConfig {
    pub method: OptimizationMethod,
    /// λ in the mean-variance objective.
    pub risk_aversion: f64,
    pub tolerance: f64,
    pub max_iterations: usize,
    pub allow_short: bool,
    /// Upper bound on every weight; also the lower bound's magnitude when shorting.
    pub max_weight: f64,
}

impl Default for OptimizerConfig {
    fn default() -> Self {
        OptimizerConfig {
            method: OptimizationMethod::RiskParity,
            risk_aversion: 3.0,
            tolerance: 1e-8,
            max_iterations: 500,
            allow_short: true,
            max_weight: 1.0,
        }
    }
}

impl OptimizerConfig {
    pub fn validate(&self) -> Result<(), AetherError> {
        if !self.risk_aversion.is_finite() || self.risk_aversion <= 0.0 {
            return Err(AetherError::configuration(
                "risk_aversion",
                "must be greater than zero",
            ));
        }
        if !self.tolerance.is_finite() || self.tolerance <= 0.0 {
            return Err(AetherError::configuration("tolerance", "must be greater than zero"));
        }
        if self.max_iterations == 0 {
            return Err(AetherError::configuration("max_iterations", "must be at least 1"));
        }
        if !self.max_weight.is_finite() || self.max_weight <= 0.0 || self.max_weight > 1.0 {
            return Err(AetherError::configuration("max_weight", "must be in (0, 1]"));
        }
        Ok(())
    }

    /// Weights must be able to sum to one under the upper bound.
    pub fn check_feasible(&self, n_assets: usize) -> Result<(), AetherError> {
        if self.max_weight * (n_assets as f64) < 1.0 - WEIGHT_EPSILON {
            return Err(AetherError::configuration(
                "max_weight",
                format!(
                    "{} x {} assets cannot reach a fully invested portfolio",
                    self.max_weight, n_assets
                ),
            ));
        }
        Ok(())
    }

    fn lower_bound(&self) -> f64 {
        if self.allow_short { -self.max_weight } else { 0.0 }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AssetWeight {
    pub asset: String,
    pub weight: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct OptimizationResult {
    pub weights: Vec<AssetWeight>,
    pub objective: f64,
    pub method: OptimizationMethod,
    pub iterations: usize,
    pub converged: bool,
    /// True when weights were projected onto the configured bounds.
    pub clamped: bool,
}

impl OptimizationResult {
    pub fn weight(&self, asset: &str) -> Option<f64> {
        self.weights
            .iter()
            .find(|w| w.asset == asset)
            .map(|w| w.weight)
    }

    pub fn weight_sum(&self) -> f64 {
        self.weights.iter().map(|w| w.weight).sum()
    }
}

/// Solve for portfolio weights over `returns` with the configured method.
pub fn optimize(
    returns: &ReturnMatrix,
    config: &OptimizerConfig,
) -> Result<OptimizationResult, AetherError> {
    config.validate()?;

    let n = returns.n_assets();
    let t = returns.n_periods();
    if n < 2 {
        return Err(AetherError::insufficient("optimizer assets", n, 2));
    }
    if t < n + 1 {
        return Err(AetherError::insufficient("optimizer return periods", t, n + 1));
    }
    config.check_feasible(n)?;

    let cov = returns.covariance()?;

    let (mut weights, iterations, converged) = match config.method {
        OptimizationMethod::RiskParity => {
            let solution = risk_parity_weights(&cov, config.tolerance, config.max_iterations)?;
            if !solution.converged {
                warn!(
                    iterations = solution.iterations,
                    tolerance = config.tolerance,
                    "risk parity stopped at the iteration cap"
                );
            }
            (solution.weights, solution.iterations, solution.converged)
        }
        OptimizationMethod::MeanVariance => {
            let mu = returns.mean_returns();
            let w = mean_variance_weights(&mu, &cov, config.risk_aversion)?;
            (w, 0, true)
        }
    };

    let mut clamped = false;
    if !config.allow_short && weights.iter().any(|&w| w < -WEIGHT_EPSILON) {
        clamp_negative(weights.as_mut_slice());
        clamped = true;
    }
    if project_onto_bounds(weights.as_mut_slice(), config.lower_bound(), config.max_weight) {
        clamped = true;
    }

    let objective = match config.method {
        OptimizationMethod::RiskParity => risk_parity_objective(&cov, &weights),
        OptimizationMethod::MeanVariance => {
            mean_variance_objective(&returns.mean_returns(), &cov, &weights, config.risk_aversion)
        }
    };

    debug!(
        method = %config.method,
        iterations,
        converged,
        clamped,
        objective,
        "optimisation finished"
    );

    Ok(OptimizationResult {
        weights: returns
            .assets()
            .iter()
            .zip(weights.iter())
            .map(|(asset, &weight)| AssetWeight {
                asset: asset.clone(),
                weight,
            })
            .collect(),
        objective,
        method: config.method,
        iterations,
        converged,
        clamped,
    })
}

#[derive(Debug, Clone, PartialEq)]
pub struct RiskParitySolution {
    pub weights: DVector<f64>,
    pub iterations: usize,
    pub converged: bool,
}

/// Equal-risk-contribution weights by fixed-point iteration.
///
/// Starting from equal weights, each step sets w_i to sqrt(w_i / (Σw)_i) and
/// renormalises. At the fixed point every w_i (Σw)_i is equal. Stops when the
/// largest relative weight change drops below `tolerance`.
pub fn risk_parity_weights(
    cov: &DMatrix<f64>,
    tolerance: f64,
    max_iterations: usize,
) -> Result<RiskParitySolution, AetherError> {
    let n = check_square(cov)?;
    if let Some(i) = (0..n).find(|&i| !(cov[(i, i)] > MIN_VARIANCE)) {
        return Err(AetherError::SingularCovariance {
            reason: format!("asset {} has zero variance", i),
        });
    }

    let mut weights = DVector::from_element(n, 1.0 / n as f64);
    for iteration in 1..=max_iterations {
        let marginal = cov * &weights;
        let variance = weights.dot(&marginal);
        if !variance.is_finite() || variance <= 0.0 {
            return Err(AetherError::SingularCovariance {
                reason: "portfolio variance is not positive".to_string(),
            });
        }

        let mut next = DVector::from_fn(n, |i, _| {
            (weights[i] / marginal[i].max(f64::MIN_POSITIVE)).sqrt()
        });
        let total = next.sum();
        next /= total;

        let max_change = next
            .iter()
            .zip(weights.iter())
            .map(|(new, old)| ((new - old) / old).abs())
            .fold(0.0, f64::max);
        weights = next;

        if max_change < tolerance {
            return Ok(RiskParitySolution {
                weights,
                iterations: iteration,
                converged: true,
            });
        }
    }

    Ok(RiskParitySolution {
        weights,
        iterations: max_iterations,
        converged: false,
    })
}

/// Per-asset share of portfolio volatility: w_i (Σw)_i / sqrt(wᵀΣw).
pub fn risk_contributions(cov: &DMatrix<f64>, weights: &DVector<f64>) -> DVector<f64> {
    let marginal = cov * weights;
    let variance = weights.dot(&marginal);
    if variance <= 0.0 {
        return DVector::zeros(weights.len());
    }
    weights.component_mul(&marginal) / variance.sqrt()
}

/// Sum of squared deviations of risk contributions from their mean.
fn risk_parity_objective(cov: &DMatrix<f64>, weights: &DVector<f64>) -> f64 {
    let rc = risk_contributions(cov, weights);
    let mean = rc.mean();
    rc.iter().map(|c| (c - mean).powi(2)).sum()
}

/// Fully invested mean-variance weights: w = Σ⁻¹(μ - γ1) / λ with γ chosen so
/// the weights sum to one.
pub fn mean_variance_weights(
    mu: &DVector<f64>,
    cov: &DMatrix<f64>,
    risk_aversion: f64,
) -> Result<DVector<f64>, AetherError> {
    let n = check_square(cov)?;
    if mu.len() != n {
        return Err(AetherError::Alignment {
            reason: format!("{} expected returns for a {}x{} covariance", mu.len(), n, n),
        });
    }

    let eigenvalues = cov.clone().symmetric_eigen().eigenvalues;
    let max_eig = eigenvalues.max();
    let min_eig = eigenvalues.min();
    if !(max_eig > 0.0) || min_eig / max_eig < MIN_RECIPROCAL_CONDITION {
        return Err(AetherError::SingularCovariance {
            reason: format!(
                "reciprocal condition number {:.3e} is below {:e}",
                if max_eig > 0.0 { min_eig / max_eig } else { 0.0 },
                MIN_RECIPROCAL_CONDITION
            ),
        });
    }

    let inverse = cov
        .clone()
        .cholesky()
        .ok_or_else(|| AetherError::SingularCovariance {
            reason: "covariance is not positive definite".to_string(),
        })?
        .inverse();

    let ones = DVector::from_element(n, 1.0);
    let inv_mu = &inverse * mu;
    let inv_ones = &inverse * &ones;
    let a = ones.dot(&inv_ones);
    let b = ones.dot(&inv_mu);
    let gamma = (b - risk_aversion) / a;

    Ok((inv_mu - inv_ones * gamma) / risk_aversion)
}

/// wᵀμ - λ/2 · wᵀΣw
fn mean_variance_objective(
    mu: &DVector<f64>,
    cov: &DMatrix<f64>,
    weights: &DVector<f64>,
    risk_aversion: f64,
) -> f64 {
    weights.dot(mu) - 0.5 * risk_aversion * weights.dot(&(cov * weights))
}

fn check_square(cov: &DMatrix<f64>) -> Result<usize, AetherError> {
    if cov.nrows() != cov.ncols() {
        return Err(AetherError::Alignment {
            reason: format!("covariance is {}x{}", cov.nrows(), cov.ncols()),
        });
    }
    Ok(cov.nrows())
}

/// Zero out negative weights and renormalise the rest to sum to one.
fn clamp_negative(weights: &mut [f64]) {
    for w in weights.iter_mut() {
        if *w < 0.0 {
            *w = 0.0;
        }
    }
    let total: f64 = weights.iter().sum();
    if total > WEIGHT_EPSILON {
        for w in weights.iter_mut() {
            *w /= total;
        }
    }
}

/// Euclidean projection onto {Σw = 1, lower ≤ w ≤ upper}.
///
/// The projection is clamp(w - τ) for the shift τ that restores a unit sum;
/// τ is found by bisection since the clamped sum is monotone in τ. Returns
/// true if any weight moved.
fn project_onto_bounds(weights: &mut [f64], lower: f64, upper: f64) -> bool {
    if weights.is_empty() {
        return false;
    }
    let clamped_sum =
        |tau: f64| -> f64 { weights.iter().map(|w| (w - tau).clamp(lower, upper)).sum() };

    let max = weights.iter().copied().fold(f64::NEG_INFINITY, f64::max);
    let min = weights.iter().copied().fold(f64::INFINITY, f64::min);
    let mut lo = min - upper;
    let mut hi = max - lower;
    for _ in 0..PROJECTION_STEPS {
        let mid = 0.5 * (lo + hi);
        if clamped_sum(mid) > 1.0 {
            lo = mid;
        } else {
            hi = mid;
        }
    }
    let tau = 0.5 * (lo + hi);

    let mut moved = false;
    for w in weights.iter_mut() {
        let projected = (*w - tau).clamp(lower, upper);
        if (projected - *w).abs() > PROJECTION_TOLERANCE {
            moved = true;
        }
        *w = projected;
    }
    moved
}
