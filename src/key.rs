//! Key domains
//!
//! A key names one trial series. Under [`KeyDomain::Pattern`] it is a
//! retain/omit bit mask `p` describing a generalized arithmetic progression
//! (`13 = 0b1101` keeps positions 0, 2 and 3 of a length-4 progression).
//! Under [`KeyDomain::Length`] it is the progression length `k` itself.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::{Error, Result};

/// How keys are interpreted.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum KeyDomain {
    /// Keys are pattern masks `p`.
    #[default]
    Pattern,
    /// Keys are progression lengths `k`.
    Length,
}

impl KeyDomain {
    /// Whether the key is a genuine Van der Waerden data point.
    ///
    /// A pattern is only a plain arithmetic progression when every position
    /// is retained, i.e. the mask is all ones and `p + 1` is a power of
    /// two. The empty mask `0` is not a progression. Every length key is a
    /// genuine data point.
    #[must_use]
    pub fn is_vdw_key(self, key: u64) -> bool {
        match self {
            Self::Pattern => key != 0 && key & key.wrapping_add(1) == 0,
            Self::Length => true,
        }
    }

    /// Progression length `kW` spanned by the key.
    ///
    /// `None` for a length key beyond `u32::MAX`.
    #[must_use]
    pub fn progression_length(self, key: u64) -> Option<u32> {
        match self {
            Self::Pattern => Some(u64::BITS - key.leading_zeros()),
            Self::Length => u32::try_from(key).ok(),
        }
    }

    /// Key of the plain progression of length `kw`: `2^kW - 1` for patterns.
    ///
    /// Returns `None` when the pattern would not fit in 64 bits.
    #[must_use]
    pub fn key_for_length(self, kw: u32) -> Option<u64> {
        match self {
            Self::Pattern => match kw {
                0 => None,
                64 => Some(u64::MAX),
                kw if kw < 64 => Some((1u64 << kw) - 1),
                _ => None,
            },
            Self::Length => Some(u64::from(kw)),
        }
    }

    /// Human-readable label for a key, e.g. `p=13 (1101)`.
    #[must_use]
    pub fn describe(self, key: u64) -> String {
        match self {
            Self::Pattern => format!("p={key} ({key:b})"),
            Self::Length => format!("k={key}"),
        }
    }
}

impl fmt::Display for KeyDomain {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Pattern => f.write_str("pattern"),
            Self::Length => f.write_str("length"),
        }
    }
}

impl FromStr for KeyDomain {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_ascii_lowercase().as_str() {
            "pattern" | "p" => Ok(Self::Pattern),
            "length" | "k" => Ok(Self::Length),
            other => Err(Error::InvalidInput(format!(
                "unknown key domain '{other}' (expected 'pattern' or 'length')"
            ))),
        }
    }
}
