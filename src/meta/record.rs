//! Fit Record - per-key fitted parameters

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::fit::{FittedCurve, Model};
use crate::key::KeyDomain;

/// Per-key summary written by the pipeline and read by the cross-key
/// analyzer.
///
/// The shape parameters are `None` when too few interior points existed
/// to fit; that is a normal state, distinct from a fitted value of zero.
///
/// ## Wire format
///
/// ```json
/// {"key":13,"domain":"pattern","model":"logistic","V":8,"sample_count":3,
///  "y0":null,"A":null,"k_param":null,"x0":null,"computed_at":"2026-01-01T00:00:00Z"}
/// ```
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct FitRecord {
    key: u64,
    #[serde(default)]
    domain: KeyDomain,
    #[serde(default)]
    model: Model,
    #[serde(rename = "V")]
    first_total_success: Option<u64>,
    sample_count: usize,
    y0: Option<f64>,
    #[serde(rename = "A")]
    amplitude: Option<f64>,
    k_param: Option<f64>,
    x0: Option<f64>,
    computed_at: DateTime<Utc>,
}

impl FitRecord {
    /// Record for a key whose series was too short to fit.
    #[must_use]
    pub fn unfitted(
        key: u64,
        domain: KeyDomain,
        model: Model,
        first_total_success: Option<u64>,
        sample_count: usize,
    ) -> Self {
        Self {
            key,
            domain,
            model,
            first_total_success,
            sample_count,
            y0: None,
            amplitude: None,
            k_param: None,
            x0: None,
            computed_at: Utc::now(),
        }
    }

    /// Record carrying a fitted curve.
    ///
    /// Two-parameter families leave `k_param` and `x0` empty.
    #[must_use]
    pub fn fitted(
        key: u64,
        domain: KeyDomain,
        first_total_success: Option<u64>,
        sample_count: usize,
        curve: &FittedCurve,
    ) -> Self {
        Self {
            y0: curve.param("y0"),
            amplitude: curve.param("A"),
            k_param: curve.param("k"),
            x0: curve.param("x0"),
            ..Self::unfitted(key, domain, curve.model(), first_total_success, sample_count)
        }
    }

    /// Override the computation timestamp.
    #[must_use]
    pub const fn with_computed_at(mut self, computed_at: DateTime<Utc>) -> Self {
        self.computed_at = computed_at;
        self
    }

    /// Key
    #[must_use]
    pub const fn key(&self) -> u64 {
        self.key
    }

    /// Key domain.
    #[must_use]
    pub const fn domain(&self) -> KeyDomain {
        self.domain
    }

    /// Model family the shape parameters belong to.
    #[must_use]
    pub const fn model(&self) -> Model {
        self.model
    }

    /// First `n` with total success (`V`).
    #[must_use]
    pub const fn first_total_success(&self) -> Option<u64> {
        self.first_total_success
    }

    /// Interior points the fit saw.
    #[must_use]
    pub const fn sample_count(&self) -> usize {
        self.sample_count
    }

    /// Vertical offset `y0`.
    #[must_use]
    pub const fn y0(&self) -> Option<f64> {
        self.y0
    }

    /// Amplitude `A`.
    #[must_use]
    pub const fn amplitude(&self) -> Option<f64> {
        self.amplitude
    }

    /// Rate parameter `k`.
    #[must_use]
    pub const fn k_param(&self) -> Option<f64> {
        self.k_param
    }

    /// Horizontal offset `x0`.
    #[must_use]
    pub const fn x0(&self) -> Option<f64> {
        self.x0
    }

    /// When the record was computed.
    #[must_use]
    pub const fn computed_at(&self) -> DateTime<Utc> {
        self.computed_at
    }

    /// Whether shape parameters are present.
    #[must_use]
    pub const fn is_fitted(&self) -> bool {
        self.y0.is_some() && self.amplitude.is_some()
    }

    /// The fitted curve, if the record has one.
    #[must_use]
    pub fn curve(&self) -> Option<FittedCurve> {
        let params: Option<Vec<f64>> = self
            .model
            .param_names()
            .iter()
            .map(|name| match *name {
                "y0" => self.y0,
                "A" => self.amplitude,
                "k" => self.k_param,
                "x0" => self.x0,
                _ => None,
            })
            .collect();
        FittedCurve::new(self.model, params?).ok()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_unfitted_record_has_null_shape() {
        let record = FitRecord::unfitted(13, KeyDomain::Pattern, Model::Logistic, Some(8), 3);
        assert!(!record.is_fitted());
        assert!(record.curve().is_none());

        let json = serde_json::to_value(&record).unwrap();
        assert_eq!(json["V"], 8);
        assert!(json["y0"].is_null());
        assert!(json["A"].is_null());
        assert!(json["k_param"].is_null());
        assert!(json["x0"].is_null());
        assert_eq!(json["domain"], "pattern");
    }

    #[test]
    fn test_fitted_record_rebuilds_curve() {
        let curve = FittedCurve::new(Model::Logistic, vec![-0.1, 1.1, 2.0, 5.5]).unwrap();
        let record = FitRecord::fitted(13, KeyDomain::Pattern, Some(8), 4, &curve);

        assert!(record.is_fitted());
        assert_eq!(record.k_param(), Some(2.0));
        assert_eq!(record.curve(), Some(curve));
    }

    #[test]
    fn test_zero_is_not_null() {
        let curve = FittedCurve::new(Model::Linear, vec![0.0, 0.0]).unwrap();
        let record = FitRecord::fitted(3, KeyDomain::Length, None, 2, &curve);
        assert_eq!(record.y0(), Some(0.0));
        assert_eq!(record.x0(), None);
        assert!(record.is_fitted());
    }

    #[test]
    fn test_missing_domain_and_model_default() {
        let json = r#"{"key":7,"V":null,"sample_count":0,"y0":null,"A":null,"k_param":null,"x0":null,"computed_at":"2026-01-01T00:00:00Z"}"#;
        let record: FitRecord = serde_json::from_str(json).unwrap();
        assert_eq!(record.domain(), KeyDomain::Pattern);
        assert_eq!(record.model(), Model::Logistic);
        assert_eq!(record.first_total_success(), None);
    }
}
