//! Levenberg-Marquardt nonlinear least squares
//!
//! Minimizes `sum (f(x_i; p) - y_i)^2` over `p` with the step control of
//! MINPACK's `lmdif`:
//!
//! - the Jacobian is taken by forward differences
//! - each parameter is scaled by the largest Jacobian column norm seen for
//!   it (`D`), so `A ~ 1` and `x0 ~ 1000` move on comparable terms
//! - every step lies in a trust region `||D step|| <= delta`, with `delta`
//!   starting at `step_bound * ||D p0||`; the damping factor is searched so
//!   the step lands on the region boundary
//! - `delta` grows or shrinks with how well the linearised model predicted
//!   the actual drop in cost
//!
//! A search that ends where some parameter no longer moves the model (a
//! zero Jacobian column, as in a fully saturated logistic) is
//! [`Error::DegenerateFit`], never a fit.

use nalgebra::{DMatrix, DVector};
use serde::{Deserialize, Serialize};

use crate::{Error, Result};

/// Smallest ratio of actual to predicted reduction for which a step is kept.
const MIN_ACCEPTED_RATIO: f64 = 1e-4;

/// Relative slack allowed between a damped step and the region boundary.
const BOUNDARY_TOLERANCE: f64 = 0.1;

/// Damping factor bisections per trust region subproblem.
const MAX_DAMPING_SEARCH: usize = 100;

/// A Jacobian column this small relative to the largest one marks a
/// parameter the model ignores.
const DEGENERATE_COLUMN_RATIO: f64 = 1e-8;

/// Knobs for the solver.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SolverOptions {
    /// Model evaluations (over the whole data set) before giving up.
    pub max_evaluations: usize,
    /// Stop when both the actual and predicted relative cost reduction fall
    /// below this.
    pub ftol: f64,
    /// Stop when the trust region is this small relative to the scaled
    /// parameter vector.
    pub xtol: f64,
    /// Initial trust region radius as a multiple of the scaled parameter
    /// norm.
    pub step_bound: f64,
}

impl Default for SolverOptions {
    fn default() -> Self {
        Self {
            max_evaluations: 1_000_000,
            ftol: 1.49012e-8,
            xtol: 1.49012e-8,
            step_bound: 100.0,
        }
    }
}

/// Parameters found by [`least_squares`].
#[derive(Debug, Clone, PartialEq)]
pub struct Solution {
    /// Best parameters.
    pub params: Vec<f64>,
    /// Sum of squared residuals at `params`.
    pub residual_sum_squares: f64,
    /// Model evaluations spent.
    pub evaluations: usize,
}

struct Problem<'a, F> {
    model: F,
    xs: &'a [f64],
    ys: &'a [f64],
    evaluations: usize,
}

impl<F: Fn(f64, &[f64]) -> f64> Problem<'_, F> {
    fn residuals(&mut self, params: &[f64]) -> DVector<f64> {
        self.evaluations += 1;
        DVector::from_iterator(
            self.xs.len(),
            self.xs
                .iter()
                .zip(self.ys)
                .map(|(&x, &y)| (self.model)(x, params) - y),
        )
    }

    fn jacobian(&mut self, params: &[f64], residuals: &DVector<f64>) -> Result<DMatrix<f64>> {
        let step_scale = f64::EPSILON.sqrt();
        let mut jacobian = DMatrix::zeros(self.xs.len(), params.len());
        let mut shifted = params.to_vec();

        for j in 0..params.len() {
            let base = params[j];
            let mut column = None;
            // Fall back to a backward difference at a domain edge
            for direction in [1.0, -1.0] {
                let h = direction * step_scale * base.abs().max(1.0);
                shifted[j] = base + h;
                let r = self.residuals(&shifted);
                let diff = (r - residuals) / h;
                if diff.iter().all(|v| v.is_finite()) {
                    column = Some(diff);
                    break;
                }
            }
            shifted[j] = base;

            let column = column.ok_or_else(|| {
                Error::NonFiniteModel(format!("derivative for parameter {j} at {params:?}"))
            })?;
            jacobian.set_column(j, &column);
        }

        Ok(jacobian)
    }
}

/// Step minimizing the linearised cost within `||D step|| <= delta`.
///
/// Returns the step with the damping factor that produced it. The
/// undamped Gauss-Newton step is used when it already fits the region.
fn trust_region_step(
    normal: &DMatrix<f64>,
    gradient: &DVector<f64>,
    diag: &DVector<f64>,
    delta: f64,
) -> Option<(DVector<f64>, f64)> {
    let solve = |damping: f64| {
        let mut damped = normal.clone();
        for (i, d) in diag.iter().enumerate() {
            damped[(i, i)] += damping * d * d;
        }
        damped
            .cholesky()
            .map(|c| c.solve(&(-gradient)))
            .filter(|step| step.iter().all(|v| v.is_finite()))
    };
    let scaled_norm = |step: &DVector<f64>| step.component_mul(diag).norm();

    if let Some(step) = solve(0.0) {
        if scaled_norm(&step) <= (1.0 + BOUNDARY_TOLERANCE) * delta {
            return Some((step, 0.0));
        }
    }

    // ||D step|| <= ||D^-1 g|| / damping, so `upper` is always inside
    let mut upper = gradient.component_div(diag).norm() / delta;
    let mut lower = upper * 1e-12;
    let mut best = None;

    for _ in 0..MAX_DAMPING_SEARCH {
        let damping = (lower * upper).sqrt();
        let Some(step) = solve(damping) else {
            lower = damping;
            continue;
        };
        let norm = scaled_norm(&step);
        if (norm - delta).abs() <= BOUNDARY_TOLERANCE * delta {
            return Some((step, damping));
        }
        if norm > delta {
            lower = damping;
        } else {
            upper = damping;
            best = Some((step, damping));
        }
        if upper <= lower * (1.0 + f64::EPSILON) {
            break;
        }
    }

    best.or_else(|| solve(upper).map(|step| (step, upper)))
}

/// Fit `model` to `(xs, ys)` starting from `initial`.
///
/// # Errors
///
/// - [`Error::InvalidInput`] if `xs` and `ys` differ in length or hold
///   non-finite values.
/// - [`Error::InsufficientData`] if there are fewer points than
///   parameters. This is checked before any evaluation.
/// - [`Error::NonFiniteModel`] if the model is NaN or infinite at the
///   initial guess.
/// - [`Error::NotConverged`] if the evaluation budget runs out.
/// - [`Error::DegenerateFit`] if the search ends where a parameter no
///   longer affects the model.
#[allow(clippy::too_many_lines)]
pub fn least_squares<F>(
    model: F,
    xs: &[f64],
    ys: &[f64],
    initial: &[f64],
    options: &SolverOptions,
) -> Result<Solution>
where
    F: Fn(f64, &[f64]) -> f64,
{
    if xs.len() != ys.len() {
        return Err(Error::InvalidInput(format!(
            "{} x values but {} y values",
            xs.len(),
            ys.len()
        )));
    }
    if initial.is_empty() {
        return Err(Error::InvalidInput("no parameters to fit".to_string()));
    }
    if xs.len() < initial.len() {
        return Err(Error::InsufficientData {
            points: xs.len(),
            required: initial.len(),
        });
    }
    if xs.iter().chain(ys).chain(initial).any(|v| !v.is_finite()) {
        return Err(Error::InvalidInput(
            "data and initial guess must be finite".to_string(),
        ));
    }

    let mut problem = Problem {
        model,
        xs,
        ys,
        evaluations: 0,
    };

    let mut params = DVector::from_column_slice(initial);
    let mut residuals = problem.residuals(params.as_slice());
    let mut cost = residuals.norm_squared();
    if !cost.is_finite() {
        return Err(Error::NonFiniteModel(format!("initial guess {initial:?}")));
    }

    let mut diag: Option<DVector<f64>> = None;
    let mut delta = 0.0_f64;
    let mut first_step = true;
    let mut converged = false;

    'outer: while problem.evaluations < options.max_evaluations {
        if cost == 0.0 {
            converged = true;
            break;
        }

        let jacobian = problem.jacobian(params.as_slice(), &residuals)?;
        let column_norms = DVector::from_iterator(
            params.len(),
            jacobian.column_iter().map(|c| c.norm()),
        );
        let scale = match diag.take() {
            None => {
                let scale = column_norms.map(|n| if n > 0.0 { n } else { 1.0 });
                let scaled = params.component_mul(&scale).norm();
                delta = if scaled > 0.0 {
                    options.step_bound * scaled
                } else {
                    options.step_bound
                };
                scale
            }
            Some(scale) => scale.zip_map(&column_norms, f64::max),
        };

        let gradient = jacobian.tr_mul(&residuals);
        let residual_norm = cost.sqrt();
        let gradient_cosine = gradient
            .iter()
            .zip(column_norms.iter())
            .filter(|&(_, &n)| n > 0.0)
            .map(|(g, n)| (g / (n * residual_norm)).abs())
            .fold(0.0, f64::max);
        if gradient_cosine <= f64::EPSILON {
            converged = true;
            break;
        }
        let normal = jacobian.tr_mul(&jacobian);

        loop {
            let Some((step, damping)) = trust_region_step(&normal, &gradient, &scale, delta)
            else {
                // No damping gives a usable step: nothing left to try
                converged = true;
                break 'outer;
            };
            let step_norm = step.component_mul(&scale).norm();
            if first_step {
                delta = delta.min(step_norm);
                first_step = false;
            }

            let candidate = &params + &step;
            let candidate_residuals = problem.residuals(candidate.as_slice());
            let candidate_cost = candidate_residuals.norm_squared();

            // Reductions relative to the current cost
            let linear = (&jacobian * &step).norm() / residual_norm;
            let damped = damping.sqrt() * step_norm / residual_norm;
            let predicted = linear.mul_add(linear, 2.0 * damped * damped);
            let directional = -linear.mul_add(linear, damped * damped);
            let blew_up = !candidate_cost.is_finite() || candidate_cost >= 100.0 * cost;
            let actual = if blew_up { -1.0 } else { 1.0 - candidate_cost / cost };
            let ratio = if predicted > 0.0 { actual / predicted } else { 0.0 };

            if ratio <= 0.25 {
                let shrink = if actual >= 0.0 {
                    0.5
                } else {
                    0.5 * directional / 0.5f64.mul_add(actual, directional)
                };
                let shrink = if blew_up || shrink < 0.1 { 0.1 } else { shrink };
                delta = shrink * delta.min(step_norm / 0.1);
            } else if damping == 0.0 || ratio >= 0.75 {
                delta = step_norm / 0.5;
            }

            let accepted = ratio >= MIN_ACCEPTED_RATIO;
            if accepted {
                params = candidate;
                residuals = candidate_residuals;
                cost = candidate_cost;
            }

            let scaled_params = params.component_mul(&scale).norm();
            let small_reduction = actual.abs() <= options.ftol
                && predicted <= options.ftol
                && 0.5 * ratio <= 1.0;
            // No further progress is possible at this precision
            let exhausted = (actual.abs() <= f64::EPSILON
                && predicted <= f64::EPSILON
                && 0.5 * ratio <= 1.0)
                || delta <= f64::EPSILON * scaled_params;
            if small_reduction || delta <= options.xtol * scaled_params || exhausted {
                converged = true;
                break 'outer;
            }
            if problem.evaluations >= options.max_evaluations {
                break 'outer;
            }

            if accepted {
                diag = Some(scale);
                continue 'outer;
            }
        }
    }

    if !converged {
        return Err(Error::NotConverged {
            evaluations: problem.evaluations,
        });
    }

    check_identifiable(&mut problem, &params, &residuals)?;
    Ok(Solution {
        params: params.iter().copied().collect(),
        residual_sum_squares: cost,
        evaluations: problem.evaluations,
    })
}

/// Reject a solution where some parameter has no effect on the model.
fn check_identifiable<F: Fn(f64, &[f64]) -> f64>(
    problem: &mut Problem<'_, F>,
    params: &DVector<f64>,
    residuals: &DVector<f64>,
) -> Result<()> {
    let jacobian = problem.jacobian(params.as_slice(), residuals)?;
    let norms: Vec<f64> = jacobian.column_iter().map(|c| c.norm()).collect();
    let largest = norms.iter().copied().fold(0.0, f64::max);

    match norms
        .iter()
        .position(|&n| n <= DEGENERATE_COLUMN_RATIO * largest)
    {
        Some(parameter) => Err(Error::DegenerateFit {
            parameter,
            evaluations: problem.evaluations,
        }),
        None => Ok(()),
    }
}
