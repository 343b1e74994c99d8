use std::cmp::Ordering;
use std::fmt;
use std::str::FromStr;

use lazy_static::lazy_static;
use regex::Regex;
use serde::de::Error as _;
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use thiserror::Error;

lazy_static! {
    static ref VERSION_RE: Regex =
        Regex::new(r"^(\d+)(?:\.(\d+))?(?:\.(\d+))?(?:\.([A-Za-z0-9_-]+))?$").unwrap();
}

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum VersionError {
    #[error("invalid version `{0}`")]
    InvalidVersion(String),

    #[error("invalid version range `{0}`")]
    InvalidRange(String),

    #[error("version range `{0}` has its bounds reversed")]
    ReversedRange(String),
}

/// A unit version: `major.minor.micro` plus an optional qualifier.
///
/// Versions are totally ordered: the numeric triple is compared first, then
/// the qualifier byte-wise. The absent qualifier (empty string) orders below
/// every non-empty qualifier, so `1.0.0` < `1.0.0.beta`.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Version {
    pub major: u64,
    pub minor: u64,
    pub micro: u64,
    pub qualifier: String,
}

impl Version {
    pub fn new(major: u64, minor: u64, micro: u64) -> Self {
        Self {
            major,
            minor,
            micro,
            qualifier: String::new(),
        }
    }

    pub fn with_qualifier(major: u64, minor: u64, micro: u64, qualifier: impl Into<String>) -> Self {
        Self {
            major,
            minor,
            micro,
            qualifier: qualifier.into(),
        }
    }

    /// The lowest possible version, `0.0.0`.
    pub fn zero() -> Self {
        Self::new(0, 0, 0)
    }

    /// Parse a version string with one to three numeric segments and an
    /// optional alphanumeric qualifier, e.g. `1`, `1.2`, `1.2.3`,
    /// `1.2.3.rc1`.
    pub fn parse(input: &str) -> Result<Self, VersionError> {
        let trimmed = input.trim();
        let captures = VERSION_RE
            .captures(trimmed)
            .ok_or_else(|| VersionError::InvalidVersion(input.to_string()))?;

        let segment = |idx: usize| -> u64 {
            captures
                .get(idx)
                .and_then(|m| m.as_str().parse().ok())
                .unwrap_or(0)
        };

        Ok(Self {
            major: segment(1),
            minor: segment(2),
            micro: segment(3),
            qualifier: captures
                .get(4)
                .map(|m| m.as_str().to_string())
                .unwrap_or_default(),
        })
    }
}

impl Ord for Version {
    fn cmp(&self, other: &Self) -> Ordering {
        (self.major, self.minor, self.micro, &self.qualifier).cmp(&(
            other.major,
            other.minor,
            other.micro,
            &other.qualifier,
        ))
    }
}

impl PartialOrd for Version {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl fmt::Display for Version {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}.{}", self.major, self.minor, self.micro)?;
        if !self.qualifier.is_empty() {
            write!(f, ".{}", self.qualifier)?;
        }
        Ok(())
    }
}

impl FromStr for Version {
    type Err = VersionError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

impl Serialize for Version {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

impl<'de> Deserialize<'de> for Version {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let raw = String::deserialize(deserializer)?;
        Version::parse(&raw).map_err(D::Error::custom)
    }
}
