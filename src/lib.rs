//! # helm-pruner
//!
//! A daemon that deletes stale Helm releases and orphaned namespaces from a
//! Kubernetes cluster.
//!
//! Releases are selected for deletion by age, by a global keep-count, and by
//! regex filters on release name and namespace. Namespaces left empty by a
//! deletion (or found empty during an orphan scan) are removed as well, with
//! a protected set of system namespaces that is never touched.
//!
//! ## Example
//!
//! ```rust,ignore
//! use helm_pruner::{Options, Pruner, Shutdown};
//! use std::sync::Arc;
//!
//! let opts = Options {
//!     older_than: Some(std::time::Duration::from_secs(14 * 24 * 3600)),
//!     ..Options::default()
//! }
//! .validate()?;
//!
//! let pruner = Pruner::new(opts, releases, namespaces);
//! let (_signal, shutdown) = Shutdown::channel();
//! pruner.run_once(&shutdown).await?;
//! ```

#![deny(clippy::all)]
#![warn(clippy::pedantic)]
#![warn(clippy::nursery)]
#![warn(missing_docs)]
#![forbid(unsafe_code)]
// multiple_crate_versions is inherently crate-level (detects duplicate transitive dependencies).
#![allow(clippy::multiple_crate_versions)]

use thiserror::Error as ThisError;

// Module declarations
pub mod cluster;
pub mod config;
pub mod health;
pub mod observability;
pub mod pruner;
pub mod release;
pub mod shutdown;

// Re-exports for convenience
pub use cluster::{HelmSecretStore, KubeNamespaceStore, NamespaceStore, ReleaseStore};
pub use config::Options;
pub use pruner::Pruner;
pub use release::{Release, ReleaseStatus};
pub use shutdown::{Shutdown, ShutdownSignal};

/// Error type for pruner operations.
///
/// Uses `thiserror` for automatic `Display` and `Error` trait implementations.
#[derive(Debug, ThisError)]
pub enum Error {
    /// Invalid configuration was provided.
    ///
    /// Raised at startup for invalid regex filters, unparseable durations,
    /// or a configuration with nothing to do. Fatal to process start.
    #[error("invalid configuration: {0}")]
    Config(String),

    /// A Kubernetes API call failed.
    ///
    /// Raised when listing or deleting cluster resources fails. A listing
    /// failure aborts the current phase; a per-item deletion failure is
    /// logged and skipped by the caller.
    #[error("kubernetes api error: {0}")]
    Kube(#[from] kube::Error),

    /// A Helm release secret payload could not be decoded.
    #[error("failed to decode release '{name}' in namespace '{namespace}': {cause}")]
    ReleaseDecode {
        /// The release name.
        name: String,
        /// The namespace the release secret lives in.
        namespace: String,
        /// The underlying cause.
        cause: String,
    },

    /// An operation exceeded its deadline.
    #[error("operation '{operation}' timed out after {seconds}s")]
    Timeout {
        /// The operation that timed out.
        operation: String,
        /// The configured deadline in seconds.
        seconds: u64,
    },

    /// Shutdown was requested.
    ///
    /// Not a true failure: it propagates up to stop the cycle and the daemon
    /// loop cleanly, and is never counted toward consecutive failures.
    #[error("operation cancelled by shutdown")]
    Cancelled,
}

impl Error {
    /// Returns `true` if this error was caused by shutdown cancellation.
    #[must_use]
    pub const fn is_cancelled(&self) -> bool {
        matches!(self, Self::Cancelled)
    }
}

/// Result type alias for pruner operations.
pub type Result<T> = std::result::Result<T, Error>;
