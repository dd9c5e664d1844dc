//! Cross-key analysis
//!
//! Second-stage fits across the per-key [`FitRecord`]s: how `V` grows with
//! the key or with the progression length `kW`, and how the shape
//! parameters drift with the key. The `kW`-`V` fit over genuine Van der
//! Waerden keys is a candidate closed form for `W(2, k)`; it is compared
//! against the known small values by [`approximation_table`].

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::fit::{fit_model, FitOutcome, FittedCurve, Model, SolverOptions};
use crate::key::KeyDomain;
use crate::meta::FitRecord;
use crate::predicate::KeyFilter;
use crate::report::{Event, Reporter};
use crate::{Error, Result};

/// Known values `(k, W(2, k))`.
pub const KNOWN_VDW_NUMBERS: [(u32, u64); 4] = [(3, 9), (4, 35), (5, 178), (6, 1132)];

/// A numeric quantity read off a record.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Field {
    /// The key itself.
    Key,
    /// Progression length `kW`.
    ProgressionLength,
    /// First total-success size `V`.
    V,
    /// Offset `y0`.
    Y0,
    /// Amplitude `A`.
    A,
    /// Rate `k`.
    K,
    /// Horizontal offset `x0`.
    X0,
    /// Interior points the per-key fit saw.
    SampleCount,
    /// `y0 / A`.
    OffsetRatio,
}

impl Field {
    /// Value for `record`, if present.
    #[must_use]
    #[allow(clippy::cast_precision_loss)]
    pub fn value(self, domain: KeyDomain, record: &FitRecord) -> Option<f64> {
        match self {
            Self::Key => Some(record.key() as f64),
            Self::ProgressionLength => domain.progression_length(record.key()).map(f64::from),
            Self::V => record.first_total_success().map(|v| v as f64),
            Self::Y0 => record.y0(),
            Self::A => record.amplitude(),
            Self::K => record.k_param(),
            Self::X0 => record.x0(),
            Self::SampleCount => Some(record.sample_count() as f64),
            Self::OffsetRatio => match (record.y0(), record.amplitude()) {
                (Some(y0), Some(a)) if a != 0.0 => Some(y0 / a),
                _ => None,
            },
        }
    }

    /// Short label.
    #[must_use]
    pub const fn name(self) -> &'static str {
        match self {
            Self::Key => "key",
            Self::ProgressionLength => "kW",
            Self::V => "V",
            Self::Y0 => "y0",
            Self::A => "A",
            Self::K => "k",
            Self::X0 => "x0",
            Self::SampleCount => "sample_count",
            Self::OffsetRatio => "y0/A",
        }
    }
}

impl fmt::Display for Field {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for Field {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "key" | "p" => Ok(Self::Key),
            "kW" | "kw" => Ok(Self::ProgressionLength),
            "V" | "v" => Ok(Self::V),
            "y0" => Ok(Self::Y0),
            "A" | "a" => Ok(Self::A),
            "k" => Ok(Self::K),
            "x0" => Ok(Self::X0),
            "sample_count" => Ok(Self::SampleCount),
            "y0/A" | "offset_ratio" => Ok(Self::OffsetRatio),
            other => Err(Error::InvalidInput(format!("unknown field '{other}'"))),
        }
    }
}

/// All fit records of one store, ordered by key.
#[derive(Debug, Clone, PartialEq)]
pub struct CrossKeyDataset {
    domain: KeyDomain,
    records: Vec<FitRecord>,
}

impl CrossKeyDataset {
    /// Collect records; they are sorted by key and later duplicates win.
    #[must_use]
    pub fn new(domain: KeyDomain, mut records: Vec<FitRecord>) -> Self {
        records.reverse();
        records.sort_by_key(FitRecord::key);
        records.dedup_by_key(|r| r.key());
        Self { domain, records }
    }

    /// Key domain.
    #[must_use]
    pub const fn domain(&self) -> KeyDomain {
        self.domain
    }

    /// Records, ascending by key.
    #[must_use]
    pub fn records(&self) -> &[FitRecord] {
        &self.records
    }

    /// Number of records.
    #[must_use]
    pub fn len(&self) -> usize {
        self.records.len()
    }

    /// True when empty.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    /// Records whose key passes `filter`.
    #[must_use]
    pub fn filter(&self, filter: &KeyFilter) -> Self {
        Self {
            domain: self.domain,
            records: self
                .records
                .iter()
                .filter(|r| filter.matches(self.domain, r.key()))
                .cloned()
                .collect(),
        }
    }

    /// Parallel `(x, y)` arrays; records missing either value are dropped.
    #[must_use]
    pub fn series(&self, x: Field, y: Field) -> (Vec<f64>, Vec<f64>) {
        self.records
            .iter()
            .filter_map(|r| Some((x.value(self.domain, r)?, y.value(self.domain, r)?)))
            .unzip()
    }

    /// Fit `model` to `y` as a function of `x`.
    ///
    /// # Errors
    ///
    /// See [`fit_model`].
    pub fn fit(
        &self,
        x: Field,
        y: Field,
        model: Model,
        initial: Option<&[f64]>,
        options: &SolverOptions,
    ) -> Result<CrossKeyFit> {
        let (xs, ys) = self.series(x, y);
        let outcome = fit_model(model, &xs, &ys, initial, options)?;
        let x_min = xs.iter().copied().fold(f64::INFINITY, f64::min);
        let x_max = xs.iter().copied().fold(f64::NEG_INFINITY, f64::max);

        Ok(CrossKeyFit {
            x,
            y,
            x_range: (x_min, x_max),
            outcome,
        })
    }
}

/// A second-stage fit.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CrossKeyFit {
    /// Independent quantity.
    pub x: Field,
    /// Dependent quantity.
    pub y: Field,
    /// Smallest and largest `x` fitted.
    pub x_range: (f64, f64),
    /// Fitted curve and goodness of fit.
    pub outcome: FitOutcome,
}

impl CrossKeyFit {
    /// The fitted curve.
    #[must_use]
    pub const fn curve(&self) -> &FittedCurve {
        &self.outcome.curve
    }

    /// `count` points of the curve over the fitted `x` range.
    #[must_use]
    pub fn sample(&self, count: usize) -> Vec<(f64, f64)> {
        self.outcome.curve.sample(self.x_range.0, self.x_range.1, count)
    }
}

/// A named second-stage fit to run.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Analysis {
    /// Identifier
    pub name: &'static str,
    /// Independent quantity.
    pub x: Field,
    /// Dependent quantity.
    pub y: Field,
    /// Model family.
    pub model: Model,
    /// Starting parameters.
    pub initial: Vec<f64>,
    /// Restrict to genuine Van der Waerden keys.
    pub vdw_only: bool,
}

/// Name of the `kW`-`V` analysis over genuine keys.
pub const LENGTH_V: &str = "kW-V";
/// Name of the key-`V` analysis over every key.
pub const KEY_V: &str = "key-V";

/// The standard set of cross-key fits.
#[must_use]
pub fn standard_analyses() -> Vec<Analysis> {
    let analysis = |name, x, y, model, initial: &[f64], vdw_only| Analysis {
        name,
        x,
        y,
        model,
        initial: initial.to_vec(),
        vdw_only,
    };
    vec![
        analysis(KEY_V, Field::Key, Field::V, Model::Logarithmic, &[0.0, 100.0, 2.0, -1.0], false),
        analysis(LENGTH_V, Field::ProgressionLength, Field::V, Model::Composite, &[0.0, 2.0, 1.0, 0.0], true),
        analysis("key-y0", Field::Key, Field::Y0, Model::Linear, &[1.0, 1.0], false),
        analysis("key-A", Field::Key, Field::A, Model::Linear, &[1.0, 1.0], false),
        analysis("key-k", Field::Key, Field::K, Model::Reciprocal, &[50.0, 50.0], false),
        analysis("key-x0", Field::Key, Field::X0, Model::Logarithmic, &[1.0, 1.0, 1.0, -1.0], false),
    ]
}

/// Outcome of one [`Analysis`].
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AnalysisReport {
    /// Analysis name.
    pub name: &'static str,
    /// The fit, when it succeeded.
    pub fit: Option<CrossKeyFit>,
    /// Why it failed otherwise.
    pub error: Option<String>,
}

/// Run each analysis against `dataset`.
///
/// A failing analysis is reported and recorded; the rest still run.
pub fn run_analyses(
    dataset: &CrossKeyDataset,
    analyses: &[Analysis],
    options: &SolverOptions,
    reporter: &dyn Reporter,
) -> Vec<AnalysisReport> {
    let vdw = dataset.filter(&KeyFilter::all().vdw_only(true));

    analyses
        .iter()
        .map(|analysis| {
            let data = if analysis.vdw_only { &vdw } else { dataset };
            match data.fit(
                analysis.x,
                analysis.y,
                analysis.model,
                Some(&analysis.initial),
                options,
            ) {
                Ok(fit) => AnalysisReport {
                    name: analysis.name,
                    fit: Some(fit),
                    error: None,
                },
                Err(e) => {
                    let reason = e.to_string();
                    reporter.report(&Event::AnalysisFailed {
                        name: analysis.name,
                        reason: &reason,
                    });
                    AnalysisReport {
                        name: analysis.name,
                        fit: None,
                        error: Some(reason),
                    }
                }
            }
        })
        .collect()
}

/// One row of [`approximation_table`].
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ApproximationRow {
    /// Progression length.
    pub k: u32,
    /// Known `W(2, k)`.
    pub known: u64,
    /// The `kW`-`V` fit at `k` (non-VDW keys discarded).
    pub discarding: Option<f64>,
    /// The key-`V` fit at the plain progression key for `k`.
    pub composition: Option<f64>,
}

/// Compare the known `W(2, k)` with two ways of predicting it.
///
/// `discarding` evaluates `length_v` (fit on genuine keys only) at `k`;
/// `composition` evaluates `key_v` (fit on every key) at the key of the
/// plain length-`k` progression (`2^k - 1` for patterns). A missing curve
/// or a non-finite value leaves the cell empty.
#[must_use]
#[allow(clippy::cast_precision_loss)]
pub fn approximation_table(
    domain: KeyDomain,
    length_v: Option<&FittedCurve>,
    key_v: Option<&FittedCurve>,
) -> Vec<ApproximationRow> {
    let finite = |v: f64| v.is_finite().then_some(v);

    KNOWN_VDW_NUMBERS
        .iter()
        .map(|&(k, known)| ApproximationRow {
            k,
            known,
            discarding: length_v.and_then(|c| finite(c.eval(f64::from(k)))),
            composition: key_v
                .zip(domain.key_for_length(k))
                .and_then(|(c, key)| finite(c.eval(key as f64))),
        })
        .collect()
}

/// Find a report's fitted curve by analysis name.
#[must_use]
pub fn curve_named<'a>(reports: &'a [AnalysisReport], name: &str) -> Option<&'a FittedCurve> {
    reports
        .iter()
        .find(|r| r.name == name)
        .and_then(|r| r.fit.as_ref())
        .map(CrossKeyFit::curve)
}
