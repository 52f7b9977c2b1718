//! Migration version identifiers.
//!
//! A [`MigrationVersion`] is either a dotted sequence of non-negative
//! integers (`1`, `1.2`, `2.0.1`) or one of four sentinels used by the
//! classifier and the target policy. Concrete versions compare
//! component-wise with trailing zeros ignored, so `1.0` and `1` are equal.

use crate::error::{CoreError, CoreResult};
use serde::de::{self, Visitor};
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::cmp::Ordering;
use std::fmt;
use std::hash::{Hash, Hasher};
use std::str::FromStr;

/// Ordered version identifier with sentinel values.
#[derive(Debug, Clone)]
pub enum MigrationVersion {
    /// No migrations applied yet
    Empty,
    /// Resolves at classification time to the highest applied version
    Current,
    /// Resolves at classification time to the lowest pending version
    Next,
    /// A concrete dotted version
    Version {
        /// Numeric components with trailing zeros removed
        parts: Vec<u64>,
        /// Text as written (underscores normalised to dots)
        display: String,
    },
    /// No ceiling
    Latest,
}

impl MigrationVersion {
    /// Parse a version string, accepting the `current`, `latest` and `next`
    /// keywords in any case. Underscores are treated as dots.
    pub fn parse(input: &str) -> CoreResult<Self> {
        let trimmed = input.trim();
        match trimmed.to_ascii_lowercase().as_str() {
            "current" => return Ok(MigrationVersion::Current),
            "latest" => return Ok(MigrationVersion::Latest),
            "next" => return Ok(MigrationVersion::Next),
            _ => {}
        }
        Self::parse_concrete(trimmed)
    }

    /// Parse a version string that must be a concrete dotted version.
    pub fn parse_concrete(input: &str) -> CoreResult<Self> {
        let invalid = |reason: &str| CoreError::InvalidVersion {
            version: input.to_string(),
            reason: reason.to_string(),
        };

        if input.is_empty() {
            return Err(invalid("version cannot be empty"));
        }

        let display = input.replace('_', ".");
        let mut parts = Vec::new();
        for part in display.split('.') {
            if part.is_empty() {
                return Err(invalid("version contains an empty component"));
            }
            if !part.bytes().all(|b| b.is_ascii_digit()) {
                return Err(invalid("version contains non-numeric characters"));
            }
            let value = part
                .parse::<u64>()
                .map_err(|_| invalid("version component is too large"))?;
            parts.push(value);
        }

        while parts.last() == Some(&0) {
            parts.pop();
        }

        Ok(MigrationVersion::Version { parts, display })
    }

    /// Build a concrete version from numeric components.
    pub fn from_parts(parts: &[u64]) -> Self {
        let display = parts
            .iter()
            .map(u64::to_string)
            .collect::<Vec<_>>()
            .join(".");
        let mut trimmed = parts.to_vec();
        while trimmed.last() == Some(&0) {
            trimmed.pop();
        }
        MigrationVersion::Version {
            parts: trimmed,
            display,
        }
    }

    /// True for a dotted version, false for any sentinel.
    pub fn is_concrete(&self) -> bool {
        matches!(self, MigrationVersion::Version { .. })
    }

    fn rank(&self) -> u8 {
        match self {
            MigrationVersion::Empty => 0,
            MigrationVersion::Current => 1,
            MigrationVersion::Next => 2,
            MigrationVersion::Version { .. } => 3,
            MigrationVersion::Latest => 4,
        }
    }
}

impl PartialEq for MigrationVersion {
    fn eq(&self, other: &Self) -> bool {
        self.cmp(other) == Ordering::Equal
    }
}

impl Eq for MigrationVersion {}

impl PartialOrd for MigrationVersion {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for MigrationVersion {
    fn cmp(&self, other: &Self) -> Ordering {
        match (self, other) {
            (
                MigrationVersion::Version { parts: left, .. },
                MigrationVersion::Version { parts: right, .. },
            ) => {
                // Trailing zeros are already trimmed, so missing components
                // compare as zero.
                let len = left.len().max(right.len());
                for i in 0..len {
                    let l = left.get(i).copied().unwrap_or(0);
                    let r = right.get(i).copied().unwrap_or(0);
                    match l.cmp(&r) {
                        Ordering::Equal => continue,
                        non_eq => return non_eq,
                    }
                }
                Ordering::Equal
            }
            _ => self.rank().cmp(&other.rank()),
        }
    }
}

impl Hash for MigrationVersion {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.rank().hash(state);
        if let MigrationVersion::Version { parts, .. } = self {
            parts.hash(state);
        }
    }
}

impl fmt::Display for MigrationVersion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            MigrationVersion::Empty => write!(f, "<< Empty Schema >>"),
            MigrationVersion::Current => write!(f, "current"),
            MigrationVersion::Next => write!(f, "next"),
            MigrationVersion::Version { display, .. } => write!(f, "{display}"),
            MigrationVersion::Latest => write!(f, "latest"),
        }
    }
}

impl FromStr for MigrationVersion {
    type Err = CoreError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        MigrationVersion::parse(s)
    }
}

impl Serialize for MigrationVersion {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

impl<'de> Deserialize<'de> for MigrationVersion {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        struct VersionVisitor;

        impl Visitor<'_> for VersionVisitor {
            type Value = MigrationVersion;

            fn expecting(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str("a dotted version or one of current/latest/next")
            }

            fn visit_str<E: de::Error>(self, v: &str) -> Result<Self::Value, E> {
                MigrationVersion::parse(v).map_err(E::custom)
            }

            fn visit_u64<E: de::Error>(self, v: u64) -> Result<Self::Value, E> {
                Ok(MigrationVersion::from_parts(&[v]))
            }

            fn visit_i64<E: de::Error>(self, v: i64) -> Result<Self::Value, E> {
                let v = u64::try_from(v).map_err(|_| E::custom("version cannot be negative"))?;
                self.visit_u64(v)
            }

            fn visit_f64<E: de::Error>(self, v: f64) -> Result<Self::Value, E> {
                // Unquoted YAML such as `target: 1.10` arrives as a float and
                // has already lost its trailing zeros.
                Err(E::custom(unquoted_version_message(v)))
            }
        }

        deserializer.deserialize_any(VersionVisitor)
    }
}

/// Error text for a dotted version written as a bare YAML number.
pub(crate) fn unquoted_version_message(v: f64) -> String {
    format!("version {v} must be quoted (for example \"1.10\") so every part is kept")
}

#[cfg(test)]
#[path = "version_test.rs"]
mod tests;
