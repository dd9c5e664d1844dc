//! Progress and warning reporting
//!
//! The pipeline never prints. It hands [`Event`]s to a [`Reporter`]
//! supplied by the caller: [`TracingReporter`] turns them into structured
//! `tracing` events, [`SilentReporter`] drops them (quiet runs), and
//! [`MemoryReporter`] keeps them for inspection.

use std::sync::Mutex;

/// Why a key was not processed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SkipReason {
    /// Key did not match the active filter.
    FilteredOut,
    /// A fit record already exists and the write mode keeps it.
    AlreadyComputed,
}

/// Something worth telling the operator about.
#[derive(Debug, Clone, PartialEq)]
pub enum Event<'a> {
    /// A trial record could not be used and was skipped.
    MalformedTrial {
        /// Where the record came from (file path, table row).
        location: &'a str,
        /// What was wrong with it.
        reason: &'a str,
    },
    /// A stored fit record could not be decoded and was skipped.
    CorruptRecord {
        /// Where the record lives.
        location: &'a str,
        /// Decoder message.
        reason: &'a str,
    },
    /// A key was not processed.
    KeySkipped {
        /// Key
        key: u64,
        /// Why
        reason: SkipReason,
    },
    /// Trials for a key were aggregated into a rate series.
    KeyAggregated {
        /// Key
        key: u64,
        /// Interior points available for fitting.
        points: usize,
        /// First `n` with total success, if any.
        first_total_success: Option<u64>,
    },
    /// Too few points for a fit; shape parameters stay null.
    FitSkipped {
        /// Key
        key: u64,
        /// Interior points available.
        points: usize,
        /// Points the model needs.
        required: usize,
    },
    /// The solver gave up on a key.
    FitFailed {
        /// Key
        key: u64,
        /// Error message.
        reason: &'a str,
    },
    /// A fit record was persisted.
    RecordWritten {
        /// Key
        key: u64,
    },
    /// A cross-key analysis failed.
    AnalysisFailed {
        /// Analysis name
        name: &'a str,
        /// Error message.
        reason: &'a str,
    },
}

/// Sink for pipeline events.
pub trait Reporter {
    /// Receive one event.
    fn report(&self, event: &Event<'_>);
}

impl<R: Reporter + ?Sized> Reporter for &R {
    fn report(&self, event: &Event<'_>) {
        (**self).report(event);
    }
}

impl<R: Reporter + ?Sized> Reporter for Box<R> {
    fn report(&self, event: &Event<'_>) {
        (**self).report(event);
    }
}

/// Emits every event through `tracing`.
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingReporter;

impl Reporter for TracingReporter {
    fn report(&self, event: &Event<'_>) {
        match *event {
            Event::MalformedTrial { location, reason } => {
                tracing::warn!(location, reason, "trial record corrupt; ignoring");
            }
            Event::CorruptRecord { location, reason } => {
                tracing::warn!(location, reason, "fit record corrupt");
            }
            Event::KeySkipped { key, reason } => match reason {
                SkipReason::FilteredOut => tracing::debug!(key, "skipping key (filtered out)"),
                SkipReason::AlreadyComputed => {
                    tracing::info!(key, "skipping key (record exists)");
                }
            },
            Event::KeyAggregated {
                key,
                points,
                first_total_success,
            } => {
                tracing::info!(key, points, v = ?first_total_success, "analyzing key");
            }
            Event::FitSkipped {
                key,
                points,
                required,
            } => {
                tracing::info!(key, points, required, "not enough points to fit");
            }
            Event::FitFailed { key, reason } => {
                tracing::warn!(key, reason, "fit failed");
            }
            Event::RecordWritten { key } => tracing::info!(key, "fit record written"),
            Event::AnalysisFailed { name, reason } => {
                tracing::warn!(analysis = name, reason, "cross-key fit failed");
            }
        }
    }
}

/// Discards every event.
#[derive(Debug, Default, Clone, Copy)]
pub struct SilentReporter;

impl Reporter for SilentReporter {
    fn report(&self, _event: &Event<'_>) {}
}

/// Keeps a rendered copy of every event.
#[derive(Debug, Default)]
pub struct MemoryReporter {
    events: Mutex<Vec<String>>,
}

impl MemoryReporter {
    /// Create an empty reporter.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Rendered events in arrival order.
    #[must_use]
    pub fn events(&self) -> Vec<String> {
        self.events
            .lock()
            .map(|events| events.clone())
            .unwrap_or_default()
    }

    /// Number of malformed trial or corrupt record warnings seen.
    #[must_use]
    pub fn warning_count(&self) -> usize {
        self.events()
            .iter()
            .filter(|e| e.starts_with("MalformedTrial") || e.starts_with("CorruptRecord"))
            .count()
    }
}

impl Reporter for MemoryReporter {
    fn report(&self, event: &Event<'_>) {
        if let Ok(mut events) = self.events.lock() {
            events.push(format!("{event:?}"));
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_memory_reporter_collects_in_order() {
        let reporter = MemoryReporter::new();
        reporter.report(&Event::RecordWritten { key: 3 });
        reporter.report(&Event::MalformedTrial {
            location: "data/3/5.txt",
            reason: "not an integer",
        });

        let events = reporter.events();
        assert_eq!(events.len(), 2);
        assert!(events[0].starts_with("RecordWritten"));
        assert_eq!(reporter.warning_count(), 1);
    }

    #[test]
    fn test_reporter_through_box_and_ref() {
        let reporter = MemoryReporter::new();
        {
            let by_ref: &dyn Reporter = &reporter;
            by_ref.report(&Event::RecordWritten { key: 1 });
        }
        let boxed: Box<dyn Reporter> = Box::new(SilentReporter);
        boxed.report(&Event::RecordWritten { key: 2 });
        assert_eq!(reporter.events().len(), 1);
    }
}
