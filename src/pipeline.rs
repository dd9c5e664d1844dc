//! Batch crunching
//!
//! [`Pipeline`] wires a [`TrialSource`] to a [`MetaStore`]: for each key it
//! aggregates trials into a [`RateSeries`], fits the configured model when
//! there are enough interior points, and stores a [`FitRecord`].
//!
//! ## Failure policy
//!
//! - malformed trial records are reported and skipped by the source
//! - too few points is a normal outcome: the record is written with null
//!   shape parameters
//! - a fit that fails writes nothing, so a later run retries the key
//! - one key failing never stops [`Pipeline::run`]; failures are collected
//!   in the [`BatchSummary`]
//!
//! ## Example
//!
//! ```rust
//! use vdw_crunch::config::PipelineConfig;
//! use vdw_crunch::meta::{MemoryMetaStore, MetaStore};
//! use vdw_crunch::pipeline::Pipeline;
//! use vdw_crunch::predicate::KeyFilter;
//! use vdw_crunch::report::SilentReporter;
//! use vdw_crunch::trial::TrialRecord;
//!
//! # fn main() -> vdw_crunch::Result<()> {
//! let trials = vec![
//!     TrialRecord::new(13, 5, 100, 40).unwrap(),
//!     TrialRecord::new(13, 8, 100, 100).unwrap(),
//! ];
//! let pipeline = Pipeline::new(trials, MemoryMetaStore::new(), PipelineConfig::default())
//!     .with_reporter(SilentReporter);
//!
//! let summary = pipeline.run(&KeyFilter::all())?;
//! assert_eq!(summary.written, vec![13]);
//! assert_eq!(pipeline.store().get(13)?.unwrap().first_total_success(), Some(8));
//! # Ok(())
//! # }
//! ```

use serde::Serialize;

use crate::analysis::CrossKeyDataset;
use crate::config::PipelineConfig;
use crate::fit::fit_model;
use crate::meta::{FitRecord, MetaStore, WriteMode};
use crate::predicate::KeyFilter;
use crate::rate::RateSeries;
use crate::report::{Event, Reporter, SkipReason, TracingReporter};
use crate::trial::TrialSource;
use crate::{Error, Result};

/// What happened to one key.
#[derive(Debug, Clone, PartialEq)]
pub enum KeyOutcome {
    /// A record was computed and stored.
    Written(FitRecord),
    /// The stored record could not be decoded; it was recomputed and
    /// replaced.
    Recovered(FitRecord),
    /// Nothing was computed.
    Skipped(SkipReason),
}

impl KeyOutcome {
    /// The stored record, if one was written.
    #[must_use]
    pub const fn record(&self) -> Option<&FitRecord> {
        match self {
            Self::Written(record) | Self::Recovered(record) => Some(record),
            Self::Skipped(_) => None,
        }
    }
}

/// A key whose processing failed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct KeyFailure {
    /// Key
    pub key: u64,
    /// Error message
    pub reason: String,
}

/// Totals for one [`Pipeline::run`].
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct BatchSummary {
    /// Keys whose record was (re)written, ascending.
    pub written: Vec<u64>,
    /// Written keys that had too few points for a fit.
    pub unfitted: Vec<u64>,
    /// Written keys whose previous record was corrupt.
    pub recovered: Vec<u64>,
    /// Keys left alone because a record existed.
    pub already_computed: Vec<u64>,
    /// Keys rejected by the filter.
    pub filtered_out: usize,
    /// Keys that failed; nothing was written for them.
    pub failed: Vec<KeyFailure>,
}

impl BatchSummary {
    /// True when no key failed.
    #[must_use]
    pub fn is_clean(&self) -> bool {
        self.failed.is_empty()
    }
}

/// Trial-to-record pipeline.
#[derive(Debug)]
pub struct Pipeline<S, M, R = TracingReporter> {
    source: S,
    store: M,
    config: PipelineConfig,
    reporter: R,
}

impl<S: TrialSource, M: MetaStore> Pipeline<S, M> {
    /// Create a pipeline reporting through `tracing`.
    pub const fn new(source: S, store: M, config: PipelineConfig) -> Self {
        Self {
            source,
            store,
            config,
            reporter: TracingReporter,
        }
    }
}

impl<S: TrialSource, M: MetaStore, R: Reporter> Pipeline<S, M, R> {
    /// Replace the reporter.
    pub fn with_reporter<R2: Reporter>(self, reporter: R2) -> Pipeline<S, M, R2> {
        Pipeline {
            source: self.source,
            store: self.store,
            config: self.config,
            reporter,
        }
    }

    /// Trial source.
    pub const fn source(&self) -> &S {
        &self.source
    }

    /// Record store.
    pub const fn store(&self) -> &M {
        &self.store
    }

    /// Active configuration.
    pub const fn config(&self) -> &PipelineConfig {
        &self.config
    }

    /// Active reporter.
    pub const fn reporter(&self) -> &R {
        &self.reporter
    }

    /// Compute the record for `key` without touching the store.
    ///
    /// # Errors
    ///
    /// Returns error if the trials cannot be read or the fit fails.
    pub fn compute_for_key(&self, key: u64) -> Result<FitRecord> {
        let trials = self.source.trials(key, &self.reporter)?;
        let series = RateSeries::aggregate(key, &trials);
        let domain = self.config.domain;
        let model = self.config.model;

        self.reporter.report(&Event::KeyAggregated {
            key,
            points: series.len(),
            first_total_success: series.first_total_success(),
        });

        if series.len() < self.config.min_fit_points {
            self.reporter.report(&Event::FitSkipped {
                key,
                points: series.len(),
                required: self.config.min_fit_points,
            });
            return Ok(FitRecord::unfitted(
                key,
                domain,
                model,
                series.first_total_success(),
                series.len(),
            ));
        }

        let (xs, ys) = series.xy();
        let outcome = fit_model(model, &xs, &ys, None, &self.config.solver)?;
        tracing::debug!(
            key = %domain.describe(key),
            evaluations = outcome.evaluations,
            rss = outcome.residual_sum_squares,
            "fit converged"
        );

        Ok(FitRecord::fitted(
            key,
            domain,
            series.first_total_success(),
            series.len(),
            &outcome.curve,
        ))
    }

    /// Compute and store the record for `key`, honoring the write mode.
    ///
    /// Under [`WriteMode::CreateIfAbsent`] a stored record that cannot be
    /// decoded counts as not yet computed: it is reported and replaced.
    ///
    /// # Errors
    ///
    /// Returns error if the record cannot be computed or stored. Nothing is
    /// written in that case.
    pub fn process_key(&self, key: u64) -> Result<KeyOutcome> {
        let mut recovering = false;
        if self.config.write_mode == WriteMode::CreateIfAbsent {
            match self.store.get(key) {
                Ok(Some(_)) => {
                    self.reporter.report(&Event::KeySkipped {
                        key,
                        reason: SkipReason::AlreadyComputed,
                    });
                    return Ok(KeyOutcome::Skipped(SkipReason::AlreadyComputed));
                }
                Ok(None) => {}
                Err(Error::CorruptRecord { location, reason }) => {
                    self.reporter.report(&Event::CorruptRecord {
                        location: &location,
                        reason: &reason,
                    });
                    recovering = true;
                }
                Err(e) => return Err(e),
            }
        }

        let record = self.compute_for_key(key)?;
        self.store.put(&record)?;
        self.reporter.report(&Event::RecordWritten { key });
        Ok(if recovering {
            KeyOutcome::Recovered(record)
        } else {
            KeyOutcome::Written(record)
        })
    }

    /// Process every key of the source that passes `filter`.
    ///
    /// # Errors
    ///
    /// Only fails if the source cannot list its keys; per-key errors are
    /// collected in the summary.
    pub fn run(&self, filter: &KeyFilter) -> Result<BatchSummary> {
        let mut summary = BatchSummary::default();

        for key in self.source.keys(&self.reporter)? {
            if !filter.matches(self.config.domain, key) {
                self.reporter.report(&Event::KeySkipped {
                    key,
                    reason: SkipReason::FilteredOut,
                });
                summary.filtered_out += 1;
                continue;
            }

            match self.process_key(key) {
                Ok(KeyOutcome::Skipped(_)) => summary.already_computed.push(key),
                Ok(outcome) => {
                    if matches!(outcome, KeyOutcome::Recovered(_)) {
                        summary.recovered.push(key);
                    }
                    if !outcome.record().is_some_and(FitRecord::is_fitted) {
                        summary.unfitted.push(key);
                    }
                    summary.written.push(key);
                }
                Err(e) => {
                    let reason = e.to_string();
                    self.reporter.report(&Event::FitFailed {
                        key,
                        reason: &reason,
                    });
                    summary.failed.push(KeyFailure { key, reason });
                }
            }
        }

        tracing::info!(
            written = summary.written.len(),
            recovered = summary.recovered.len(),
            skipped = summary.already_computed.len(),
            failed = summary.failed.len(),
            "batch complete"
        );
        Ok(summary)
    }

    /// Every stored record, ready for cross-key analysis.
    ///
    /// # Errors
    ///
    /// Returns error if the store cannot be listed.
    pub fn load_dataset(&self) -> Result<CrossKeyDataset> {
        let records = self.store.load_all(&self.reporter)?;
        Ok(CrossKeyDataset::new(self.config.domain, records))
    }
}
