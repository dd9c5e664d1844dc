//! One-file-per-`n` trial layout

use std::fs;
use std::path::{Path, PathBuf};

use super::{TrialRecord, TrialSource};
use crate::report::{Event, Reporter};
use crate::Result;

/// Reads `<root>/<key>/<n>.txt` files.
///
/// Each file holds the attempt count on its first line and the success
/// count on its second. Anything after that is ignored.
#[derive(Debug, Clone)]
pub struct DirectoryTrialSource {
    root: PathBuf,
}

impl DirectoryTrialSource {
    /// Read trials from `root`.
    #[must_use]
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    /// Root directory.
    #[must_use]
    pub fn root(&self) -> &Path {
        &self.root
    }

    fn key_dir(&self, key: u64) -> PathBuf {
        self.root.join(key.to_string())
    }

    fn parse_counts(text: &str) -> std::result::Result<(u64, u64), String> {
        let mut lines = text.lines().map(str::trim);
        let mut next = |what: &str| -> std::result::Result<u64, String> {
            let line = lines.next().ok_or_else(|| format!("missing {what} line"))?;
            line.parse::<u64>()
                .map_err(|e| format!("{what} '{line}' is not a count: {e}"))
        };
        let attempts = next("attempts")?;
        let successes = next("successes")?;
        Ok((attempts, successes))
    }
}

impl TrialSource for DirectoryTrialSource {
    fn keys(&self, _reporter: &dyn Reporter) -> Result<Vec<u64>> {
        let mut keys = Vec::new();
        for entry in fs::read_dir(&self.root)? {
            let entry = entry?;
            if !entry.file_type()?.is_dir() {
                continue;
            }
            // Non-numeric directories belong to other tooling
            if let Some(key) = entry.file_name().to_str().and_then(|s| s.parse().ok()) {
                keys.push(key);
            }
        }
        keys.sort_unstable();
        Ok(keys)
    }

    fn trials(&self, key: u64, reporter: &dyn Reporter) -> Result<Vec<TrialRecord>> {
        let dir = self.key_dir(key);
        let mut trials = Vec::new();

        for entry in fs::read_dir(&dir)? {
            let entry = entry?;
            if !entry.file_type()?.is_file() {
                continue;
            }
            let path = entry.path();
            let location = path.display().to_string();

            let Some(n) = path
                .file_stem()
                .and_then(|s| s.to_str())
                .and_then(|s| s.parse::<u64>().ok())
            else {
                reporter.report(&Event::MalformedTrial {
                    location: &location,
                    reason: "file name is not a coloring size",
                });
                continue;
            };

            let text = match fs::read_to_string(&path) {
                Ok(text) => text,
                Err(e) => {
                    let reason = e.to_string();
                    reporter.report(&Event::MalformedTrial {
                        location: &location,
                        reason: &reason,
                    });
                    continue;
                }
            };

            let record = Self::parse_counts(&text)
                .and_then(|(attempts, successes)| {
                    TrialRecord::new(key, n, attempts, successes).map_err(|e| e.to_string())
                });
            match record {
                Ok(record) => trials.push(record),
                Err(reason) => reporter.report(&Event::MalformedTrial {
                    location: &location,
                    reason: &reason,
                }),
            }
        }

        Ok(trials)
    }
}
