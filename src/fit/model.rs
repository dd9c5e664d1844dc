//! Model families

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::{Error, Result};

const NAMES_4: &[&str] = &["y0", "A", "k", "x0"];
const NAMES_2: &[&str] = &["y0", "A"];

/// Parametric curve families.
///
/// Four-parameter families take `[y0, A, k, x0]`, two-parameter families
/// take `[y0, A]`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Model {
    /// `y0 + A / (1 + exp(-k (x - x0)))`
    #[default]
    Logistic,
    /// `y0 + A exp(k (x - x0))`
    Exponential,
    /// `y0 + A (x - x0)^k`
    Monomial,
    /// `y0 + A ln(k (x - x0))`
    Logarithmic,
    /// `y0 + A x`
    Linear,
    /// `y0 + A / x`
    Reciprocal,
    /// `y0 + A sqrt(x 2^(k (x - x0) - 1))`
    Composite,
}

impl Model {
    /// Every family, in declaration order.
    pub const ALL: [Self; 7] = [
        Self::Logistic,
        Self::Exponential,
        Self::Monomial,
        Self::Logarithmic,
        Self::Linear,
        Self::Reciprocal,
        Self::Composite,
    ];

    /// Number of free parameters.
    #[must_use]
    pub const fn param_count(self) -> usize {
        match self {
            Self::Linear | Self::Reciprocal => 2,
            _ => 4,
        }
    }

    /// Parameter names, in order.
    #[must_use]
    pub const fn param_names(self) -> &'static [&'static str] {
        match self {
            Self::Linear | Self::Reciprocal => NAMES_2,
            _ => NAMES_4,
        }
    }

    /// Evaluate the model at `x`.
    ///
    /// `params` must hold [`Self::param_count`] values. Outside a family's
    /// domain (log of a non-positive number, fractional power of a negative
    /// base) the result is NaN.
    #[must_use]
    pub fn eval(self, x: f64, params: &[f64]) -> f64 {
        debug_assert_eq!(params.len(), self.param_count());
        let (y0, a) = (params[0], params[1]);
        match self {
            Self::Logistic => y0 + a / (1.0 + (-params[2] * (x - params[3])).exp()),
            Self::Exponential => y0 + a * (params[2] * (x - params[3])).exp(),
            Self::Monomial => y0 + a * (x - params[3]).powf(params[2]),
            Self::Logarithmic => y0 + a * (params[2] * (x - params[3])).ln(),
            Self::Linear => a.mul_add(x, y0),
            Self::Reciprocal => y0 + a / x,
            Self::Composite => {
                y0 + a * (x * 2f64.powf(params[2] * (x - params[3]) - 1.0)).sqrt()
            }
        }
    }

    /// Starting parameters when the caller has none.
    ///
    /// The logistic seed `[-0.2, 1.2, 0.3, 0.3 * mean(x)]` suits success
    /// rates in `(0, 1)`. Families that need `x > x0` start with `x0` just
    /// below the smallest `x`.
    #[must_use]
    pub fn default_guess(self, xs: &[f64]) -> Vec<f64> {
        #[allow(clippy::cast_precision_loss)]
        let mean = if xs.is_empty() {
            0.0
        } else {
            xs.iter().sum::<f64>() / xs.len() as f64
        };
        let min = xs.iter().copied().fold(f64::INFINITY, f64::min);
        let below_min = if min.is_finite() { min - 1.0 } else { 0.0 };

        match self {
            Self::Logistic => vec![-0.2, 1.2, 0.3, 0.3 * mean],
            Self::Exponential => vec![0.0, 1.0, 0.1, mean],
            Self::Monomial | Self::Logarithmic => vec![0.0, 1.0, 1.0, below_min],
            Self::Linear => vec![1.0, 1.0],
            Self::Reciprocal => vec![50.0, 50.0],
            Self::Composite => vec![0.0, 2.0, 1.0, 0.0],
        }
    }

    /// Second starting point read off the data, for families where the
    /// default seed can start on a plateau.
    ///
    /// For the logistic: `x0` where the rates cross one half, `k` spanning
    /// the transition over the observed `x` range, `y0 = 0` and `A = 1`.
    #[must_use]
    pub fn data_guess(self, xs: &[f64], ys: &[f64]) -> Option<Vec<f64>> {
        if self != Self::Logistic || xs.is_empty() || xs.len() != ys.len() {
            return None;
        }

        let mut points: Vec<(f64, f64)> = xs.iter().copied().zip(ys.iter().copied()).collect();
        points.sort_by(|a, b| a.0.total_cmp(&b.0));
        let (first, last) = (points[0], points[points.len() - 1]);

        let crossing = points.windows(2).find_map(|w| {
            let ((xa, ya), (xb, yb)) = (w[0], w[1]);
            (ya <= 0.5 && 0.5 <= yb && yb > ya).then(|| xa + (0.5 - ya) * (xb - xa) / (yb - ya))
        });
        let x0 = crossing.unwrap_or(if points.iter().all(|&(_, y)| y < 0.5) {
            last.0
        } else {
            first.0
        });
        let span = (last.0 - first.0).max(1.0);

        Some(vec![0.0, 1.0, 4.0 / span, x0])
    }

    /// Lowercase name, as accepted by `FromStr`.
    #[must_use]
    pub const fn name(self) -> &'static str {
        match self {
            Self::Logistic => "logistic",
            Self::Exponential => "exponential",
            Self::Monomial => "monomial",
            Self::Logarithmic => "logarithmic",
            Self::Linear => "linear",
            Self::Reciprocal => "reciprocal",
            Self::Composite => "composite",
        }
    }
}

impl fmt::Display for Model {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for Model {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        let lower = s.to_ascii_lowercase();
        Self::ALL
            .into_iter()
            .find(|m| m.name() == lower)
            .ok_or_else(|| Error::InvalidInput(format!("unknown model family '{s}'")))
    }
}
