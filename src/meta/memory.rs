//! In-memory fit record store using `DashMap`.
//!
//! Nothing survives the process; useful for tests and one-shot analyses.

use dashmap::DashMap;

use super::{FitRecord, MetaStore};
use crate::Result;

/// In-memory fit record store.
///
/// # Example
///
/// ```rust
/// use vdw_crunch::meta::{MemoryMetaStore, MetaStore};
///
/// let store = MemoryMetaStore::new();
/// assert!(store.is_empty());
/// assert_eq!(store.get(1).unwrap(), None);
/// ```
#[derive(Debug, Default)]
pub struct MemoryMetaStore {
    records: DashMap<u64, FitRecord>,
}

impl MemoryMetaStore {
    /// Create an empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of records.
    #[must_use]
    pub fn len(&self) -> usize {
        self.records.len()
    }

    /// Check if the store is empty.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    /// Drop every record.
    pub fn clear(&self) {
        self.records.clear();
    }
}

impl MetaStore for MemoryMetaStore {
    fn get(&self, key: u64) -> Result<Option<FitRecord>> {
        Ok(self.records.get(&key).map(|r| r.value().clone()))
    }

    fn put(&self, record: &FitRecord) -> Result<()> {
        self.records.insert(record.key(), record.clone());
        Ok(())
    }

    fn contains(&self, key: u64) -> Result<bool> {
        Ok(self.records.contains_key(&key))
    }

    fn keys(&self) -> Result<Vec<u64>> {
        let mut keys: Vec<u64> = self.records.iter().map(|r| *r.key()).collect();
        keys.sort_unstable();
        Ok(keys)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fit::Model;
    use crate::key::KeyDomain;
    use crate::report::SilentReporter;

    fn record(key: u64) -> FitRecord {
        FitRecord::unfitted(key, KeyDomain::Pattern, Model::Logistic, Some(key * 2), 1)
    }

    #[test]
    fn test_put_overwrites() {
        let store = MemoryMetaStore::new();
        store.put(&record(3)).unwrap();
        store
            .put(&FitRecord::unfitted(3, KeyDomain::Pattern, Model::Logistic, Some(99), 1))
            .unwrap();

        assert_eq!(store.len(), 1);
        assert_eq!(store.get(3).unwrap().unwrap().first_total_success(), Some(99));
    }

    #[test]
    fn test_load_all_sorted() {
        let store = MemoryMetaStore::new();
        for key in [9, 1, 5] {
            store.put(&record(key)).unwrap();
        }

        let keys: Vec<u64> = store
            .load_all(&SilentReporter)
            .unwrap()
            .iter()
            .map(FitRecord::key)
            .collect();
        assert_eq!(keys, vec![1, 5, 9]);
    }

    #[test]
    fn test_clear() {
        let store = MemoryMetaStore::new();
        store.put(&record(1)).unwrap();
        store.clear();
        assert!(store.is_empty());
        assert!(!store.contains(1).unwrap());
    }
}
