use core::fmt;
use core::str::FromStr;

use serde::{Deserialize, Serialize};

/// Identifies one declared shape of the persisted record types.
///
/// Versions compare as `(major, minor, patch)` triples. Note that migration
/// order is registry declaration order, not numeric order: a registry may
/// list versions in any sequence as long as they are pairwise distinct.
///
/// ```
/// use strata_migrate::SchemaVersion;
///
/// let v: SchemaVersion = "2.1".parse().unwrap();
/// assert_eq!(v, SchemaVersion::new(2, 1, 0));
/// assert_eq!(v.to_string(), "2.1.0");
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct SchemaVersion {
    /// Major component.
    pub major: u32,
    /// Minor component.
    pub minor: u32,
    /// Patch component.
    pub patch: u32,
}

impl SchemaVersion {
    /// Create a version from its three components.
    pub const fn new(major: u32, minor: u32, patch: u32) -> Self {
        Self {
            major,
            minor,
            patch,
        }
    }

    /// Shorthand for `major.0.0`.
    pub const fn major(major: u32) -> Self {
        Self::new(major, 0, 0)
    }
}

impl fmt::Display for SchemaVersion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}.{}", self.major, self.minor, self.patch)
    }
}

/// Error parsing a [`SchemaVersion`] from text.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("invalid schema version `{input}`: expected `major[.minor[.patch]]`")]
pub struct ParseVersionError {
    input: String,
}

impl FromStr for SchemaVersion {
    type Err = ParseVersionError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let invalid = || ParseVersionError {
            input: s.to_string(),
        };

        let trimmed = s.trim().trim_start_matches('v');
        if trimmed.is_empty() {
            return Err(invalid());
        }

        let mut parts = [0u32; 3];
        let mut count = 0;
        for piece in trimmed.split('.') {
            if count == 3 {
                return Err(invalid());
            }
            parts[count] = piece.parse().map_err(|_| invalid())?;
            count += 1;
        }

        Ok(Self::new(parts[0], parts[1], parts[2]))
    }
}
