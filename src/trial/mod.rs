//! Trial data readers
//!
//! The external trial generator leaves, per key and coloring size `n`, a
//! count of attempted random colorings and how many of them contained the
//! progression. Two layouts are supported:
//!
//! ```text
//! directory:  <root>/<key>/<n>.txt     "attempts\nsuccesses\n"
//! table:      parquet rows             key | n | attempts | successes
//! ```
//!
//! Malformed records are reported and skipped; they never abort a scan.

mod directory;
mod table;

pub use directory::DirectoryTrialSource;
pub use table::{write_trials_parquet, ParquetTrialSource};

use serde::{Deserialize, Serialize};

use crate::report::Reporter;
use crate::{Error, Result};

/// One `(key, n)` cell of trial counts.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct TrialRecord {
    /// Pattern mask or progression length.
    pub key: u64,
    /// Coloring size.
    pub n: u64,
    /// Random colorings tried.
    pub attempts: u64,
    /// Colorings that contained the progression.
    pub successes: u64,
}

impl TrialRecord {
    /// Build a record, checking `0 < attempts` and `successes <= attempts`.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidInput`] naming the violated invariant.
    pub fn new(key: u64, n: u64, attempts: u64, successes: u64) -> Result<Self> {
        if attempts == 0 {
            return Err(Error::InvalidInput("zero attempts".to_string()));
        }
        if successes > attempts {
            return Err(Error::InvalidInput(format!(
                "{successes} successes exceed {attempts} attempts"
            )));
        }
        Ok(Self {
            key,
            n,
            attempts,
            successes,
        })
    }

    /// `successes / attempts`
    #[must_use]
    #[allow(clippy::cast_precision_loss)]
    pub fn rate(&self) -> f64 {
        self.successes as f64 / self.attempts as f64
    }
}

/// A collection of trial records addressable by key.
pub trait TrialSource {
    /// All keys with data, ascending.
    ///
    /// # Errors
    ///
    /// Returns error if the underlying storage cannot be listed.
    fn keys(&self, reporter: &dyn Reporter) -> Result<Vec<u64>>;

    /// Every usable record for `key`, in no particular order.
    ///
    /// # Errors
    ///
    /// Returns error if the underlying storage cannot be read. Individual
    /// malformed records are reported, not returned as errors.
    fn trials(&self, key: u64, reporter: &dyn Reporter) -> Result<Vec<TrialRecord>>;
}

impl<S: TrialSource + ?Sized> TrialSource for Box<S> {
    fn keys(&self, reporter: &dyn Reporter) -> Result<Vec<u64>> {
        (**self).keys(reporter)
    }

    fn trials(&self, key: u64, reporter: &dyn Reporter) -> Result<Vec<TrialRecord>> {
        (**self).trials(key, reporter)
    }
}

impl TrialSource for [TrialRecord] {
    fn keys(&self, _reporter: &dyn Reporter) -> Result<Vec<u64>> {
        let mut keys: Vec<u64> = self.iter().map(|t| t.key).collect();
        keys.sort_unstable();
        keys.dedup();
        Ok(keys)
    }

    fn trials(&self, key: u64, _reporter: &dyn Reporter) -> Result<Vec<TrialRecord>> {
        Ok(self.iter().filter(|t| t.key == key).copied().collect())
    }
}

impl TrialSource for Vec<TrialRecord> {
    fn keys(&self, reporter: &dyn Reporter) -> Result<Vec<u64>> {
        self.as_slice().keys(reporter)
    }

    fn trials(&self, key: u64, reporter: &dyn Reporter) -> Result<Vec<TrialRecord>> {
        self.as_slice().trials(key, reporter)
    }
}
