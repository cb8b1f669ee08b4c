//! Namespace reconciliation.
//!
//! Two independent entry points: the post-deletion empty-namespace check
//! (invoked from the release pruning phase for every namespace it touched)
//! and the orphan scan (an independent pass over every cluster namespace).
//! The protected-namespace check is absolute in both: it overrides any
//! filter match.

use super::Pruner;
use crate::shutdown::Shutdown;
use crate::{Error, Result};
use tracing::{debug, error, info};

impl Pruner {
    /// Returns `true` if the namespace is in the protected system set.
    pub(crate) fn is_system_namespace(&self, namespace: &str) -> bool {
        self.system_namespaces.contains(namespace)
    }

    /// Deletes a namespace if it no longer contains any release.
    ///
    /// Re-queries the cluster rather than trusting this cycle's bookkeeping;
    /// another release may have been installed meanwhile.
    pub(crate) async fn delete_namespace_if_empty(
        &self,
        shutdown: &Shutdown,
        namespace: &str,
    ) -> Result<()> {
        if self.is_system_namespace(namespace) {
            debug!(namespace, "not deleting system namespace");
            return Ok(());
        }

        if shutdown
            .guard(self.releases.namespace_has_releases(namespace))
            .await?
        {
            debug!(namespace, "namespace still has releases, not deleting");
            return Ok(());
        }

        if self.opts.dry_run {
            info!(namespace, "would delete empty namespace");
            return Ok(());
        }

        info!(namespace, "deleting empty namespace");
        shutdown.guard(self.namespaces.delete(namespace)).await?;
        metrics::counter!("helm_pruner_namespaces_deleted_total").increment(1);
        Ok(())
    }

    /// The orphan namespace phase: finds and deletes namespaces with no
    /// releases at all.
    ///
    /// A per-namespace query failure is logged and that namespace skipped;
    /// only the initial listing failure aborts the scan.
    pub(crate) async fn cleanup_orphan_namespaces(&self, shutdown: &Shutdown) -> Result<()> {
        info!("starting orphan namespace cleanup");

        let namespaces = shutdown.guard(self.namespaces.list_names()).await?;
        debug!(count = namespaces.len(), "found namespaces");

        // First pass: identify the orphans.
        let mut orphans = Vec::new();
        for namespace in namespaces {
            shutdown.check()?;

            if self.is_system_namespace(&namespace) {
                debug!(namespace = namespace.as_str(), "skipping system namespace");
                continue;
            }

            if let Some(filter) = &self.opts.orphan_namespace_filter
                && !filter.is_match(&namespace)
            {
                debug!(namespace = namespace.as_str(), "skipping namespace (does not match orphan filter)");
                continue;
            }

            if let Some(exclude) = &self.opts.orphan_namespace_exclude
                && exclude.is_match(&namespace)
            {
                debug!(namespace = namespace.as_str(), "skipping namespace (matches orphan exclude)");
                continue;
            }

            match shutdown.guard(self.releases.namespace_has_releases(&namespace)).await {
                Err(err) if err.is_cancelled() => return Err(err),
                Err(err) => {
                    error!(
                        namespace = namespace.as_str(),
                        error = %err,
                        "failed to check releases in namespace"
                    );
                    continue;
                }
                Ok(true) => {
                    debug!(namespace = namespace.as_str(), "namespace has releases, not orphaned");
                    continue;
                }
                Ok(false) => orphans.push(namespace),
            }
        }

        if orphans.is_empty() {
            info!("no orphan namespaces found");
            return Ok(());
        }
        info!(count = orphans.len(), "orphan namespaces to delete");

        // Second pass: delete with the same rate-limiting discipline as
        // release deletion.
        let last = orphans.len() - 1;
        for (i, namespace) in orphans.iter().enumerate() {
            shutdown.check()?;

            if self.opts.dry_run {
                info!(namespace = namespace.as_str(), "would delete orphan namespace");
                continue;
            }

            info!(namespace = namespace.as_str(), "deleting orphan namespace");
            match shutdown.guard(self.namespaces.delete(namespace)).await {
                Err(Error::Cancelled) => return Err(Error::Cancelled),
                Err(err) => {
                    error!(
                        namespace = namespace.as_str(),
                        error = %err,
                        "failed to delete orphan namespace"
                    );
                    continue;
                }
                Ok(()) => {}
            }
            metrics::counter!("helm_pruner_namespaces_deleted_total").increment(1);

            if !self.opts.delete_rate_limit.is_zero() && i < last {
                shutdown.sleep(self.opts.delete_rate_limit).await?;
            }
        }

        info!(count = orphans.len(), "orphan namespace cleanup complete");
        Ok(())
    }
}
