//! Release snapshot model.
//!
//! A [`Release`] is a read-only snapshot of a deployed Helm release, fetched
//! fresh each cycle. The pruner never mutates a release in place; it only
//! reads snapshots and issues uninstalls.

use chrono::{DateTime, Utc};
use serde::Deserialize;

/// Status of a Helm release.
///
/// Mirrors the status strings Helm stores in release payloads. The pruner
/// considers releases in every status, not just `deployed`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ReleaseStatus {
    /// The release is live in the cluster.
    Deployed,
    /// The release install or upgrade failed.
    Failed,
    /// The release has been superseded by a newer revision.
    Superseded,
    /// An install is in progress.
    PendingInstall,
    /// An upgrade is in progress.
    PendingUpgrade,
    /// A rollback is in progress.
    PendingRollback,
    /// An uninstall is in progress.
    Uninstalling,
    /// The release has been uninstalled.
    Uninstalled,
    /// Any status this version does not recognize.
    #[serde(other)]
    Unknown,
}

impl ReleaseStatus {
    /// Returns the Helm status string for this status.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Deployed => "deployed",
            Self::Failed => "failed",
            Self::Superseded => "superseded",
            Self::PendingInstall => "pending-install",
            Self::PendingUpgrade => "pending-upgrade",
            Self::PendingRollback => "pending-rollback",
            Self::Uninstalling => "uninstalling",
            Self::Uninstalled => "uninstalled",
            Self::Unknown => "unknown",
        }
    }
}

impl std::fmt::Display for ReleaseStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A read-only snapshot of a Helm release.
///
/// Identified by the `(name, namespace)` pair, unique within a namespace.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Release {
    /// The release name.
    pub name: String,
    /// The namespace the release is installed in.
    pub namespace: String,
    /// When the release was last deployed (installed or upgraded).
    pub last_deployed: DateTime<Utc>,
    /// Current release status.
    pub status: ReleaseStatus,
}

impl Release {
    /// Returns the `(name, namespace)` identity key for deduplication.
    #[must_use]
    pub fn key(&self) -> (&str, &str) {
        (self.name.as_str(), self.namespace.as_str())
    }
}
