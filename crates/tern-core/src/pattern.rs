//! Ignore patterns for validation and cherry-pick filters.

use crate::error::{CoreError, CoreResult};
use crate::serde_helpers::scalar_string;
use crate::state::MigrationState;
use crate::version::MigrationVersion;
use serde::{Deserialize, Deserializer, Serialize};
use std::fmt;
use std::str::FromStr;

const WILDCARD: &str = "*";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum PatternKind {
    Any,
    Repeatable,
    Versioned,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum PatternState {
    Any,
    Missing,
    Pending,
    Ignored,
    Future,
}

/// A `type:state` pair selecting classification results to tolerate,
/// e.g. `*:future` or `repeatable:missing`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct IgnorePattern {
    kind: PatternKind,
    state: PatternState,
}

impl IgnorePattern {
    /// Whether a migration of this shape and state is covered.
    pub fn matches(&self, is_versioned: bool, state: MigrationState) -> bool {
        let kind_matches = match self.kind {
            PatternKind::Any => true,
            PatternKind::Versioned => is_versioned,
            PatternKind::Repeatable => !is_versioned,
        };
        let state_matches = match self.state {
            PatternState::Any => true,
            PatternState::Missing => state.is_missing(),
            PatternState::Pending => state == MigrationState::Pending,
            PatternState::Ignored => state == MigrationState::Ignored,
            PatternState::Future => state.is_future(),
        };
        kind_matches && state_matches
    }
}

/// True if any pattern tolerates versioned migrations newer than the
/// resolvable set, including failed ones.
pub fn is_future_ignored(patterns: &[IgnorePattern]) -> bool {
    patterns
        .iter()
        .any(|p| p.matches(true, MigrationState::FutureFailed))
}

impl FromStr for IgnorePattern {
    type Err = CoreError;

    fn from_str(s: &str) -> CoreResult<Self> {
        let invalid = |reason: &str| CoreError::ConfigInvalid {
            message: format!("Invalid ignore migration pattern '{s}': {reason}"),
        };

        let (kind, state) = s
            .split_once(':')
            .ok_or_else(|| invalid("expected <type>:<state>"))?;

        let kind = match kind.trim().to_ascii_lowercase().as_str() {
            WILDCARD => PatternKind::Any,
            "repeatable" => PatternKind::Repeatable,
            "versioned" => PatternKind::Versioned,
            _ => return Err(invalid("type must be one of *, repeatable, versioned")),
        };
        let state = match state.trim().to_ascii_lowercase().as_str() {
            WILDCARD => PatternState::Any,
            "missing" => PatternState::Missing,
            "pending" => PatternState::Pending,
            "ignored" => PatternState::Ignored,
            "future" => PatternState::Future,
            _ => {
                return Err(invalid(
                    "state must be one of *, missing, pending, ignored, future",
                ))
            }
        };

        Ok(Self { kind, state })
    }
}

impl TryFrom<String> for IgnorePattern {
    type Error = CoreError;

    fn try_from(value: String) -> CoreResult<Self> {
        value.parse()
    }
}

impl From<IgnorePattern> for String {
    fn from(pattern: IgnorePattern) -> Self {
        pattern.to_string()
    }
}

impl fmt::Display for IgnorePattern {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let kind = match self.kind {
            PatternKind::Any => WILDCARD,
            PatternKind::Repeatable => "repeatable",
            PatternKind::Versioned => "versioned",
        };
        let state = match self.state {
            PatternState::Any => WILDCARD,
            PatternState::Missing => "missing",
            PatternState::Pending => "pending",
            PatternState::Ignored => "ignored",
            PatternState::Future => "future",
        };
        write!(f, "{kind}:{state}")
    }
}

/// Cherry-pick entry: a version for versioned migrations or a description
/// for repeatable ones.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(transparent)]
pub struct MigrationPattern(String);

impl MigrationPattern {
    pub fn new(pattern: impl Into<String>) -> Self {
        Self(pattern.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Versioned migrations match on version equality, repeatables on their
    /// description with spaces and underscores treated alike.
    pub fn matches(&self, version: Option<&MigrationVersion>, description: &str) -> bool {
        match version {
            Some(version) => MigrationVersion::parse_concrete(&self.0)
                .map(|pattern| &pattern == version)
                .unwrap_or(false),
            None => self.0.replace(' ', "_") == description.replace(' ', "_"),
        }
    }
}

impl<'de> Deserialize<'de> for MigrationPattern {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        scalar_string(deserializer).map(MigrationPattern)
    }
}

impl fmt::Display for MigrationPattern {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

#[cfg(test)]
#[path = "pattern_test.rs"]
mod tests;
