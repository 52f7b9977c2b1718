//! Classification states of a migration.

use serde::{Deserialize, Serialize};
use std::fmt;

/// The single state the classifier assigns to each migration identity.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum MigrationState {
    /// Resolved, not yet applied, and executable
    Pending,
    /// Resolved but newer than the configured target
    AboveTarget,
    /// Resolved but older than the baseline
    BelowBaseline,
    /// Resolved at exactly the baseline, or a baseline migration superseded by history
    BaselineIgnored,
    /// The baseline marker row
    Baseline,
    /// Resolved but excluded from execution
    Ignored,
    /// Applied successfully but no longer resolvable
    MissingSuccess,
    /// Applied unsuccessfully and no longer resolvable
    MissingFailed,
    /// Applied successfully
    Success,
    /// Applied unsuccessfully
    Failed,
    /// Applied successfully after a higher version
    OutOfOrder,
    /// Applied successfully with a version newer than any resolvable one
    FutureSuccess,
    /// Applied unsuccessfully with a version newer than any resolvable one
    FutureFailed,
    /// Latest run of a repeatable whose checksum has since changed
    Outdated,
    /// Older run of a repeatable that has been re-applied since
    Superseded,
}

impl MigrationState {
    /// Human readable name used in reports.
    pub fn display_name(&self) -> &'static str {
        match self {
            MigrationState::Pending => "Pending",
            MigrationState::AboveTarget => "Above Target",
            MigrationState::BelowBaseline => "Below Baseline",
            MigrationState::BaselineIgnored => "Baseline Ignored",
            MigrationState::Baseline => "Baseline",
            MigrationState::Ignored => "Ignored",
            MigrationState::MissingSuccess => "Missing",
            MigrationState::MissingFailed => "Failed (Missing)",
            MigrationState::Success => "Success",
            MigrationState::Failed => "Failed",
            MigrationState::OutOfOrder => "Out of Order",
            MigrationState::FutureSuccess => "Future",
            MigrationState::FutureFailed => "Failed (Future)",
            MigrationState::Outdated => "Outdated",
            MigrationState::Superseded => "Superseded",
        }
    }

    /// Whether a ledger row backs this state.
    pub fn is_applied(&self) -> bool {
        !matches!(
            self,
            MigrationState::Pending
                | MigrationState::AboveTarget
                | MigrationState::BelowBaseline
                | MigrationState::BaselineIgnored
                | MigrationState::Ignored
        )
    }

    /// Whether a resolved migration backs this state.
    pub fn is_resolved(&self) -> bool {
        !matches!(
            self,
            MigrationState::MissingSuccess
                | MigrationState::MissingFailed
                | MigrationState::FutureSuccess
                | MigrationState::FutureFailed
        )
    }

    pub fn is_failed(&self) -> bool {
        matches!(
            self,
            MigrationState::Failed | MigrationState::MissingFailed | MigrationState::FutureFailed
        )
    }

    pub fn is_missing(&self) -> bool {
        matches!(
            self,
            MigrationState::MissingSuccess | MigrationState::MissingFailed
        )
    }

    pub fn is_future(&self) -> bool {
        matches!(
            self,
            MigrationState::FutureSuccess | MigrationState::FutureFailed
        )
    }
}

impl fmt::Display for MigrationState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.display_name())
    }
}
