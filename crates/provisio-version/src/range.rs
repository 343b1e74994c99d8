use std::fmt;
use std::str::FromStr;

use serde::de::Error as _;
use serde::{Deserialize, Deserializer, Serialize, Serializer};

use crate::version::{Version, VersionError};

/// An interval over the version order, with inclusive or exclusive bounds.
///
/// The textual forms follow the usual bracket syntax: `[1.0.0,2.0.0)` is
/// half-open, `[1.0.0,1.0.0]` matches exactly one version, and a bare
/// version `1.0.0` means "that version or anything later". The
/// unconstrained range (`any`) matches every version.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct VersionRange {
    pub min: Version,
    pub include_min: bool,
    pub max: Option<Version>,
    pub include_max: bool,
}

impl VersionRange {
    pub fn new(min: Version, include_min: bool, max: Option<Version>, include_max: bool) -> Self {
        Self {
            min,
            include_min,
            max,
            include_max,
        }
    }

    /// The unconstrained range: matches every version.
    pub fn any() -> Self {
        Self::new(Version::zero(), true, None, false)
    }

    /// A range matching exactly one version.
    pub fn exact(version: Version) -> Self {
        Self::new(version.clone(), true, Some(version), true)
    }

    /// A range matching the given version and everything later.
    pub fn at_least(version: Version) -> Self {
        Self::new(version, true, None, false)
    }

    pub fn is_any(&self) -> bool {
        self.max.is_none() && self.include_min && self.min == Version::zero()
    }

    pub fn includes(&self, version: &Version) -> bool {
        if self.include_min {
            if *version < self.min {
                return false;
            }
        } else if *version <= self.min {
            return false;
        }

        match &self.max {
            None => true,
            Some(max) if self.include_max => version <= max,
            Some(max) => version < max,
        }
    }

    /// Parse a range string: `[1.0,2.0)`, `(1.0,2.0]`, `[1.0,1.0]` or a
    /// bare version meaning "at least".
    pub fn parse(input: &str) -> Result<Self, VersionError> {
        let trimmed = input.trim();
        if trimmed.is_empty() {
            return Err(VersionError::InvalidRange(input.to_string()));
        }

        let first = trimmed.as_bytes()[0];
        if first != b'[' && first != b'(' {
            // Bare version: that version or anything later.
            return Ok(Self::at_least(Version::parse(trimmed)?));
        }

        let include_min = first == b'[';
        let last = trimmed.as_bytes()[trimmed.len() - 1];
        let include_max = match last {
            b']' => true,
            b')' => false,
            _ => return Err(VersionError::InvalidRange(input.to_string())),
        };

        let inner = &trimmed[1..trimmed.len() - 1];
        let (low, high) = inner
            .split_once(',')
            .ok_or_else(|| VersionError::InvalidRange(input.to_string()))?;

        let min = Version::parse(low)?;
        let max = Version::parse(high)?;
        if max < min {
            return Err(VersionError::ReversedRange(input.to_string()));
        }

        Ok(Self::new(min, include_min, Some(max), include_max))
    }
}

impl fmt::Display for VersionRange {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.max {
            None => write!(f, "{}", self.min),
            Some(max) => write!(
                f,
                "{}{},{}{}",
                if self.include_min { '[' } else { '(' },
                self.min,
                max,
                if self.include_max { ']' } else { ')' },
            ),
        }
    }
}

impl FromStr for VersionRange {
    type Err = VersionError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

impl Serialize for VersionRange {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

impl<'de> Deserialize<'de> for VersionRange {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let raw = String::deserialize(deserializer)?;
        VersionRange::parse(&raw).map_err(D::Error::custom)
    }
}
