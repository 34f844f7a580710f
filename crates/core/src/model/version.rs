use serde::{Deserialize, Serialize};
use std::fmt;
use std::num::ParseIntError;
use std::str::FromStr;

/// Monotonically increasing dictionary version.
///
/// The high 16 bits form the major epoch. Saved quiz progress is only
/// compatible across versions that share a major epoch, because a new epoch
/// may reorder or replace entries.
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct Version(i32);

impl Version {
    /// Creates a new `Version`
    #[must_use]
    pub fn new(raw: i32) -> Self {
        Self(raw)
    }

    /// Builds a version from its major epoch and minor revision.
    #[must_use]
    pub fn from_parts(major: i16, minor: u16) -> Self {
        Self((i32::from(major) << 16) | i32::from(minor))
    }

    /// Returns the underlying i32 value
    #[must_use]
    pub fn value(&self) -> i32 {
        self.0
    }

    /// High 16 bits (arithmetic shift, so negative versions keep their sign).
    #[must_use]
    pub fn major(&self) -> i32 {
        self.0 >> 16
    }

    #[must_use]
    pub fn minor(&self) -> u16 {
        (self.0 & 0xFFFF) as u16
    }

    /// True when both versions belong to the same major epoch.
    #[must_use]
    pub fn same_major(&self, other: Version) -> bool {
        self.major() == other.major()
    }
}

impl fmt::Debug for Version {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Version({}:{})", self.major(), self.minor())
    }
}

impl fmt::Display for Version {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl FromStr for Version {
    type Err = ParseIntError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        s.parse::<i32>().map(Self)
    }
}

impl From<i32> for Version {
    fn from(raw: i32) -> Self {
        Self(raw)
    }
}
