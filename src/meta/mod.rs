//! Fit record storage
//!
//! One [`FitRecord`] per key. The store is the only state that survives
//! between runs, which makes batch crunching resumable: with
//! [`WriteMode::CreateIfAbsent`] a key whose record exists is neither
//! recomputed nor rewritten.
//!
//! ## Usage
//!
//! ```rust
//! use vdw_crunch::fit::Model;
//! use vdw_crunch::key::KeyDomain;
//! use vdw_crunch::meta::{FitRecord, MemoryMetaStore, MetaStore};
//!
//! # fn main() -> vdw_crunch::Result<()> {
//! let store = MemoryMetaStore::new();
//! store.put(&FitRecord::unfitted(13, KeyDomain::Pattern, Model::Logistic, Some(8), 3))?;
//!
//! assert!(store.contains(13)?);
//! assert_eq!(store.get(13)?.unwrap().first_total_success(), Some(8));
//! # Ok(())
//! # }
//! ```

mod json_dir;
mod memory;
mod record;

pub use json_dir::JsonDirStore;
pub use memory::MemoryMetaStore;
pub use record::FitRecord;

use serde::{Deserialize, Serialize};

use crate::report::{Event, Reporter};
use crate::{Error, Result};

/// What to do when a key already has a record.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WriteMode {
    /// Keep the existing record; skip the key.
    #[default]
    CreateIfAbsent,
    /// Recompute and replace.
    Overwrite,
}

/// Keyed storage for fit records.
pub trait MetaStore {
    /// Record for `key`; `Ok(None)` when not yet computed.
    ///
    /// # Errors
    ///
    /// [`Error::CorruptRecord`] if a record exists but cannot be decoded;
    /// storage errors otherwise.
    fn get(&self, key: u64) -> Result<Option<FitRecord>>;

    /// Store `record`, replacing any record for the same key.
    ///
    /// # Errors
    ///
    /// Returns error if the record cannot be written.
    fn put(&self, record: &FitRecord) -> Result<()>;

    /// Whether a record exists for `key` (decodable or not).
    ///
    /// # Errors
    ///
    /// Returns error if the store cannot be queried.
    fn contains(&self, key: u64) -> Result<bool>;

    /// Keys with records, ascending.
    ///
    /// # Errors
    ///
    /// Returns error if the store cannot be listed.
    fn keys(&self) -> Result<Vec<u64>>;

    /// Every decodable record, ascending by key.
    ///
    /// Corrupt records are reported and skipped.
    ///
    /// # Errors
    ///
    /// Returns error if the store cannot be listed or read.
    fn load_all(&self, reporter: &dyn Reporter) -> Result<Vec<FitRecord>> {
        let mut records = Vec::new();
        for key in self.keys()? {
            match self.get(key) {
                Ok(Some(record)) => records.push(record),
                Ok(None) => {}
                Err(Error::CorruptRecord { location, reason }) => {
                    reporter.report(&Event::CorruptRecord {
                        location: &location,
                        reason: &reason,
                    });
                }
                Err(e) => return Err(e),
            }
        }
        Ok(records)
    }
}

impl<M: MetaStore + ?Sized> MetaStore for Box<M> {
    fn get(&self, key: u64) -> Result<Option<FitRecord>> {
        (**self).get(key)
    }

    fn put(&self, record: &FitRecord) -> Result<()> {
        (**self).put(record)
    }

    fn contains(&self, key: u64) -> Result<bool> {
        (**self).contains(key)
    }

    fn keys(&self) -> Result<Vec<u64>> {
        (**self).keys()
    }

    fn load_all(&self, reporter: &dyn Reporter) -> Result<Vec<FitRecord>> {
        (**self).load_all(reporter)
    }
}
