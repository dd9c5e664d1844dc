//! Curve fitting
//!
//! [`fit_model`] fits one of the [`Model`] families to parallel `x`/`y`
//! arrays and returns a [`FitOutcome`]: the [`FittedCurve`] (model plus
//! parameters, evaluable anywhere) and goodness-of-fit numbers.
//!
//! ```rust
//! use vdw_crunch::fit::{fit_model, Model, SolverOptions};
//!
//! # fn main() -> vdw_crunch::Result<()> {
//! let xs = [1.0, 2.0, 3.0, 4.0];
//! let ys = [3.0, 5.0, 7.0, 9.0];
//! let outcome = fit_model(Model::Linear, &xs, &ys, None, &SolverOptions::default())?;
//! assert!((outcome.curve.eval(10.0) - 21.0).abs() < 1e-6);
//! # Ok(())
//! # }
//! ```

mod model;
mod solver;

pub use model::Model;
pub use solver::{least_squares, Solution, SolverOptions};

use serde::{Deserialize, Serialize};

use crate::{Error, Result};

/// A model family with concrete parameters.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FittedCurve {
    model: Model,
    params: Vec<f64>,
}

impl FittedCurve {
    /// Pair a model with parameters.
    ///
    /// # Errors
    ///
    /// Returns error if the parameter count does not match the model.
    pub fn new(model: Model, params: Vec<f64>) -> Result<Self> {
        if params.len() != model.param_count() {
            return Err(Error::InvalidInput(format!(
                "{model} takes {} parameters, got {}",
                model.param_count(),
                params.len()
            )));
        }
        Ok(Self { model, params })
    }

    /// Model family.
    #[must_use]
    pub const fn model(&self) -> Model {
        self.model
    }

    /// Parameters in [`Model::param_names`] order.
    #[must_use]
    pub fn params(&self) -> &[f64] {
        &self.params
    }

    /// Parameter by name (`"y0"`, `"A"`, `"k"`, `"x0"`).
    #[must_use]
    pub fn param(&self, name: &str) -> Option<f64> {
        self.model
            .param_names()
            .iter()
            .position(|n| *n == name)
            .map(|i| self.params[i])
    }

    /// Evaluate the curve at `x`.
    #[must_use]
    pub fn eval(&self, x: f64) -> f64 {
        self.model.eval(x, &self.params)
    }

    /// `count` evenly spaced `(x, y)` points over `[lo, hi]`.
    #[must_use]
    pub fn sample(&self, lo: f64, hi: f64, count: usize) -> Vec<(f64, f64)> {
        match count {
            0 => Vec::new(),
            1 => vec![(lo, self.eval(lo))],
            _ => {
                #[allow(clippy::cast_precision_loss)]
                let step = (hi - lo) / (count - 1) as f64;
                (0..count)
                    .map(|i| {
                        #[allow(clippy::cast_precision_loss)]
                        let x = if i + 1 == count { hi } else { lo + step * i as f64 };
                        (x, self.eval(x))
                    })
                    .collect()
            }
        }
    }
}

/// Result of fitting a model to data.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FitOutcome {
    /// The fitted curve.
    pub curve: FittedCurve,
    /// Sum of squared residuals.
    pub residual_sum_squares: f64,
    /// Coefficient of determination; `None` when the data has no variance.
    pub r_squared: Option<f64>,
    /// Points fitted.
    pub points: usize,
    /// Model evaluations the solver spent.
    pub evaluations: usize,
}

/// Fit `model` to `(xs, ys)`.
///
/// `initial` overrides [`Model::default_guess`]. Without one, a default seed
/// that degenerates (a logistic starting saturated over the data) is
/// retried once from [`Model::data_guess`] with the remaining budget.
///
/// # Errors
///
/// See [`least_squares`]. A guess of the wrong length is
/// [`Error::InvalidInput`].
pub fn fit_model(
    model: Model,
    xs: &[f64],
    ys: &[f64],
    initial: Option<&[f64]>,
    options: &SolverOptions,
) -> Result<FitOutcome> {
    let required = model.param_count();
    if xs.len() < required {
        return Err(Error::InsufficientData {
            points: xs.len(),
            required,
        });
    }

    let eval = move |x: f64, p: &[f64]| model.eval(x, p);
    let solution = match initial {
        Some(guess) if guess.len() != required => {
            return Err(Error::InvalidInput(format!(
                "{model} takes {required} parameters, initial guess has {}",
                guess.len()
            )))
        }
        Some(guess) => least_squares(eval, xs, ys, guess, options)?,
        None => match least_squares(eval, xs, ys, &model.default_guess(xs), options) {
            Err(Error::DegenerateFit {
                parameter,
                evaluations,
            }) if evaluations < options.max_evaluations => {
                let Some(guess) = model.data_guess(xs, ys) else {
                    return Err(Error::DegenerateFit {
                        parameter,
                        evaluations,
                    });
                };
                tracing::debug!(%model, evaluations, "default seed degenerated, retrying from data");
                let retry = SolverOptions {
                    max_evaluations: options.max_evaluations - evaluations,
                    ..*options
                };
                let mut solution = least_squares(eval, xs, ys, &guess, &retry)
                    .map_err(|e| offset_evaluations(e, evaluations))?;
                solution.evaluations += evaluations;
                solution
            }
            other => other?,
        },
    };

    Ok(FitOutcome {
        r_squared: r_squared(ys, solution.residual_sum_squares),
        points: xs.len(),
        evaluations: solution.evaluations,
        residual_sum_squares: solution.residual_sum_squares,
        curve: FittedCurve {
            model,
            params: solution.params,
        },
    })
}

/// Count evaluations spent before a retry in its error.
fn offset_evaluations(error: Error, spent: usize) -> Error {
    match error {
        Error::NotConverged { evaluations } => Error::NotConverged {
            evaluations: evaluations + spent,
        },
        Error::DegenerateFit {
            parameter,
            evaluations,
        } => Error::DegenerateFit {
            parameter,
            evaluations: evaluations + spent,
        },
        other => other,
    }
}

#[allow(clippy::cast_precision_loss)]
fn r_squared(ys: &[f64], residual_sum_squares: f64) -> Option<f64> {
    let mean = ys.iter().sum::<f64>() / ys.len() as f64;
    let total: f64 = ys.iter().map(|y| (y - mean).powi(2)).sum();
    (total > 0.0).then(|| 1.0 - residual_sum_squares / total)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_logistic_through_four_points() {
        let xs = [4.0, 5.0, 6.0, 7.0];
        let ys = [0.05, 0.4, 0.7, 0.95];
        let outcome =
            fit_model(Model::Logistic, &xs, &ys, None, &SolverOptions::default()).unwrap();

        for (x, y) in xs.iter().zip(ys) {
            assert!((outcome.curve.eval(*x) - y).abs() < 1e-4, "x={x}");
        }
        assert!(outcome.r_squared.unwrap() > 0.999);
    }

    #[test]
    fn test_default_seed_fits_rates_near_w24() {
        // Transition around n = 28, the range of W(2,4) = 35
        let xs: Vec<f64> = (22..=34).map(f64::from).collect();
        let ys = [
            0.02, 0.04, 0.07, 0.12, 0.2, 0.31, 0.45, 0.59, 0.72, 0.82, 0.89, 0.93, 0.97,
        ];
        let outcome =
            fit_model(Model::Logistic, &xs, &ys, None, &SolverOptions::default()).unwrap();

        for (x, y) in xs.iter().zip(ys) {
            assert!((outcome.curve.eval(*x) - y).abs() < 0.02, "x={x}");
        }
        assert!(outcome.r_squared.unwrap() > 0.99);
    }

    #[test]
    fn test_default_seed_fits_large_coloring_sizes() {
        for (lo, hi, k) in [(150, 260, 0.05), (900, 1300, 0.015)] {
            let mid = f64::from(lo + hi) / 2.0;
            let xs: Vec<f64> = (lo..=hi).step_by(5).map(f64::from).collect();
            let ys: Vec<f64> = xs.iter().map(|&x| 1.0 / (1.0 + (-k * (x - mid)).exp())).collect();

            let outcome =
                fit_model(Model::Logistic, &xs, &ys, None, &SolverOptions::default()).unwrap();
            assert!((outcome.curve.param("x0").unwrap() - mid).abs() < 1e-3, "{lo}..{hi}");
            for (x, y) in xs.iter().zip(&ys) {
                assert!((outcome.curve.eval(*x) - y).abs() < 1e-4);
            }
        }
    }

    #[test]
    fn test_explicit_guess_is_not_retried() {
        let xs: Vec<f64> = (30..=52).map(|i| f64::from(i) * 5.0).collect();
        let ys: Vec<f64> = xs
            .iter()
            .map(|&x| 1.0 / (1.0 + (-0.05 * (x - 205.0)).exp()))
            .collect();
        let err = fit_model(
            Model::Logistic,
            &xs,
            &ys,
            Some(&[-0.2, 1.2, 0.3, 61.5]),
            &SolverOptions::default(),
        )
        .unwrap_err();
        assert!(matches!(err, Error::DegenerateFit { .. }));
    }

    #[test]
    fn test_reciprocal_recovers_parameters() {
        let xs: Vec<f64> = (1..=8).map(f64::from).collect();
        let ys: Vec<f64> = xs.iter().map(|x| 0.1 + 30.0 / x).collect();
        let outcome =
            fit_model(Model::Reciprocal, &xs, &ys, None, &SolverOptions::default()).unwrap();

        assert!((outcome.curve.param("y0").unwrap() - 0.1).abs() < 1e-6);
        assert!((outcome.curve.param("A").unwrap() - 30.0).abs() < 1e-6);
        assert_eq!(outcome.curve.param("k"), None);
    }

    #[test]
    fn test_logarithmic_reproduces_data() {
        let xs: Vec<f64> = (1..=10).map(f64::from).collect();
        let ys: Vec<f64> = xs.iter().map(|x| 10.0f64.mul_add((0.5 * (x + 2.0)).ln(), 3.0)).collect();
        let outcome = fit_model(
            Model::Logarithmic,
            &xs,
            &ys,
            Some(&[1.0, 5.0, 1.0, -1.0]),
            &SolverOptions::default(),
        )
        .unwrap();

        for (x, y) in xs.iter().zip(&ys) {
            assert!((outcome.curve.eval(*x) - y).abs() < 1e-4);
        }
    }

    #[test]
    fn test_insufficient_points() {
        let err = fit_model(
            Model::Logistic,
            &[5.0, 6.0, 7.0],
            &[0.4, 0.7, 0.95],
            None,
            &SolverOptions::default(),
        )
        .unwrap_err();
        assert!(matches!(err, Error::InsufficientData { points: 3, required: 4 }));
    }

    #[test]
    fn test_wrong_guess_length() {
        let err = fit_model(
            Model::Linear,
            &[1.0, 2.0],
            &[1.0, 2.0],
            Some(&[1.0, 2.0, 3.0]),
            &SolverOptions::default(),
        )
        .unwrap_err();
        assert!(matches!(err, Error::InvalidInput(_)));
    }

    #[test]
    fn test_sample_spans_bounds() {
        let curve = FittedCurve::new(Model::Linear, vec![0.0, 2.0]).unwrap();
        let points = curve.sample(1.0, 3.0, 5);

        assert_eq!(points.len(), 5);
        assert_eq!(points[0], (1.0, 2.0));
        assert_eq!(points[4], (3.0, 6.0));
        assert!((points[2].0 - 2.0).abs() < 1e-12);
        assert!(curve.sample(0.0, 1.0, 0).is_empty());
        assert_eq!(curve.sample(2.0, 9.0, 1), vec![(2.0, 4.0)]);
    }

    #[test]
    fn test_curve_param_count_checked() {
        assert!(FittedCurve::new(Model::Logistic, vec![1.0]).is_err());
    }
}
