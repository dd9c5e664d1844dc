//! Success-rate series
//!
//! Turns the trial records of one key into the `(n, rate)` points a curve
//! is fitted to. The success probability is assumed non-decreasing in `n`,
//! so exact 0% points carry no shape information and exact 100% points only
//! matter as the first size `V` where every sampled coloring succeeded.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::trial::TrialRecord;

/// Fit-input points for one key plus its first total-success size.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RateSeries {
    key: u64,
    points: Vec<(u64, f64)>,
    first_total_success: Option<u64>,
}

impl RateSeries {
    /// Aggregate trial records for `key`.
    ///
    /// Records for other keys are ignored. Several records for the same
    /// `n` are pooled (their attempts and successes summed) before the rate
    /// is taken.
    ///
    /// # Example
    ///
    /// ```rust
    /// use vdw_crunch::rate::RateSeries;
    /// use vdw_crunch::trial::TrialRecord;
    ///
    /// let trials = [
    ///     TrialRecord::new(13, 3, 100, 0).unwrap(),
    ///     TrialRecord::new(13, 5, 100, 40).unwrap(),
    ///     TrialRecord::new(13, 8, 100, 100).unwrap(),
    /// ];
    /// let series = RateSeries::aggregate(13, &trials);
    /// assert_eq!(series.points(), &[(5, 0.4)]);
    /// assert_eq!(series.first_total_success(), Some(8));
    /// ```
    #[must_use]
    pub fn aggregate(key: u64, trials: &[TrialRecord]) -> Self {
        // n -> (attempts, successes)
        let mut pooled: BTreeMap<u64, (u64, u64)> = BTreeMap::new();
        for trial in trials.iter().filter(|t| t.key == key && t.attempts > 0) {
            let cell = pooled.entry(trial.n).or_default();
            cell.0 = cell.0.saturating_add(trial.attempts);
            cell.1 = cell.1.saturating_add(trial.successes);
        }

        let mut points = Vec::new();
        let mut first_total_success = None;
        for (n, (attempts, successes)) in pooled {
            if successes == attempts {
                first_total_success = Some(first_total_success.map_or(n, |v: u64| v.min(n)));
            } else if successes > 0 {
                #[allow(clippy::cast_precision_loss)]
                points.push((n, successes as f64 / attempts as f64));
            }
        }

        Self {
            key,
            points,
            first_total_success,
        }
    }

    /// Key the series belongs to.
    #[must_use]
    pub const fn key(&self) -> u64 {
        self.key
    }

    /// Points with a rate strictly between 0 and 1, ascending in `n`.
    #[must_use]
    pub fn points(&self) -> &[(u64, f64)] {
        &self.points
    }

    /// Smallest `n` where every attempt succeeded (`V`).
    #[must_use]
    pub const fn first_total_success(&self) -> Option<u64> {
        self.first_total_success
    }

    /// Number of fit-input points.
    #[must_use]
    pub fn len(&self) -> usize {
        self.points.len()
    }

    /// True when no interior points exist.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.points.is_empty()
    }

    /// Sizes and rates as parallel arrays, ready for the fitter.
    #[must_use]
    #[allow(clippy::cast_precision_loss)]
    pub fn xy(&self) -> (Vec<f64>, Vec<f64>) {
        self.points.iter().map(|&(n, rate)| (n as f64, rate)).unzip()
    }
}
