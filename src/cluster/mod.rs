//! Cluster access seams.
//!
//! The pruning engine talks to the cluster through two narrow traits so the
//! core never depends on transport details: [`ReleaseStore`] for Helm release
//! access and [`NamespaceStore`] for namespace access. Production wiring uses
//! the kube-backed implementations in this module; tests substitute in-memory
//! fakes.

mod helm;
mod namespaces;

pub use helm::HelmSecretStore;
pub use namespaces::KubeNamespaceStore;

use crate::Result;
use crate::release::Release;
use async_trait::async_trait;

/// Read and delete access to Helm releases.
#[async_trait]
pub trait ReleaseStore: Send + Sync {
    /// Returns every release in the cluster, across all namespaces and in
    /// all statuses (not just `deployed`).
    ///
    /// # Errors
    ///
    /// Returns an error if the underlying cluster call fails; the caller
    /// aborts the current phase rather than partially proceeding.
    async fn list_all(&self) -> Result<Vec<Release>>;

    /// Returns `true` if the namespace contains any release, in any status.
    ///
    /// # Errors
    ///
    /// Returns an error if the underlying cluster call fails.
    async fn namespace_has_releases(&self, namespace: &str) -> Result<bool>;

    /// Uninstalls one release within its namespace, with a bounded timeout.
    ///
    /// # Errors
    ///
    /// Returns an error if the uninstall fails or times out. This is a
    /// best-effort, per-item failure: the caller logs it, skips the release,
    /// and continues the cycle.
    async fn uninstall(&self, name: &str, namespace: &str) -> Result<()>;
}

/// List and delete access to cluster namespaces.
#[async_trait]
pub trait NamespaceStore: Send + Sync {
    /// Returns the names of all namespaces in the cluster.
    ///
    /// # Errors
    ///
    /// Returns an error if the underlying cluster call fails.
    async fn list_names(&self) -> Result<Vec<String>>;

    /// Deletes a namespace by name.
    ///
    /// # Errors
    ///
    /// Returns an error if the deletion fails.
    async fn delete(&self, name: &str) -> Result<()>;

    /// Lightweight connectivity probe: lists namespaces with a result cap
    /// of one. Used by readiness reporting.
    ///
    /// # Errors
    ///
    /// Returns an error if the cluster is unreachable.
    async fn probe(&self) -> Result<()>;
}
