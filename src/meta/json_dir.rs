//! JSON-file-per-key fit record store

use std::fs;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use super::{FitRecord, MetaStore};
use crate::{Error, Result};

const PREFIX: &str = "meta-";
const SUFFIX: &str = ".json";

/// Stores each record as `<dir>/meta-<key:05>.json`.
///
/// The zero-padded name keeps a directory listing in key order for keys
/// below 100000.
#[derive(Debug, Clone)]
pub struct JsonDirStore {
    dir: PathBuf,
}

impl JsonDirStore {
    /// Open (and create if needed) a store rooted at `dir`.
    ///
    /// # Errors
    ///
    /// Returns error if the directory cannot be created.
    pub fn open(dir: impl Into<PathBuf>) -> Result<Self> {
        let dir = dir.into();
        fs::create_dir_all(&dir)?;
        Ok(Self { dir })
    }

    /// Store directory.
    #[must_use]
    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// File holding the record for `key`.
    #[must_use]
    pub fn path_for(&self, key: u64) -> PathBuf {
        self.dir.join(format!("{PREFIX}{key:05}{SUFFIX}"))
    }

    fn parse_file_name(name: &str) -> Option<u64> {
        name.strip_prefix(PREFIX)?
            .strip_suffix(SUFFIX)?
            .parse()
            .ok()
    }
}

impl MetaStore for JsonDirStore {
    fn get(&self, key: u64) -> Result<Option<FitRecord>> {
        let path = self.path_for(key);
        let text = match fs::read_to_string(&path) {
            Ok(text) => text,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(e.into()),
        };

        let record: FitRecord =
            serde_json::from_str(&text).map_err(|e| Error::CorruptRecord {
                location: path.display().to_string(),
                reason: e.to_string(),
            })?;

        if record.key() != key {
            return Err(Error::CorruptRecord {
                location: path.display().to_string(),
                reason: format!("file holds key {}", record.key()),
            });
        }
        Ok(Some(record))
    }

    fn put(&self, record: &FitRecord) -> Result<()> {
        let path = self.path_for(record.key());
        let mut json = serde_json::to_string_pretty(record)?;
        json.push('\n');

        // Write-then-rename so an interrupted run never leaves half a record
        let tmp = path.with_extension("json.tmp");
        fs::write(&tmp, json)?;
        if let Err(e) = fs::rename(&tmp, &path) {
            // Best effort: the rename error is the one worth reporting
            let _ = fs::remove_file(&tmp);
            return Err(e.into());
        }
        Ok(())
    }

    fn contains(&self, key: u64) -> Result<bool> {
        Ok(self.path_for(key).is_file())
    }

    fn keys(&self) -> Result<Vec<u64>> {
        let mut keys = Vec::new();
        for entry in fs::read_dir(&self.dir)? {
            let entry = entry?;
            if !entry.file_type()?.is_file() {
                continue;
            }
            if let Some(key) = entry.file_name().to_str().and_then(Self::parse_file_name) {
                keys.push(key);
            }
        }
        keys.sort_unstable();
        Ok(keys)
    }
}
