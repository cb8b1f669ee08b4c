//! Pruning cycle orchestration.
//!
//! [`Pruner`] drives the whole pass: list releases, filter them, select the
//! stale set, delete with rate limiting, then reconcile namespaces. A cycle
//! either runs once ([`Pruner::run_once`]) or continuously
//! ([`Pruner::run_daemon`]) with an immediate first tick, per-cycle
//! success/failure tracking, and exponential backoff on repeated failures.
//!
//! There is no per-item retry anywhere: "retry" means re-running the entire
//! cycle at the next tick, after backoff.

mod filter;
mod namespaces;
mod select;

use crate::cluster::{NamespaceStore, ReleaseStore};
use crate::config::Options;
use crate::shutdown::Shutdown;
use crate::{Error, Result};
use std::collections::{BTreeSet, HashSet};
use std::sync::Arc;
use std::sync::Mutex;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::{Duration, Instant};
use tokio::time::MissedTickBehavior;
use tracing::{debug, error, info, warn};

/// Namespaces that are never deleted, regardless of any filter.
pub const DEFAULT_SYSTEM_NAMESPACES: [&str; 4] =
    ["default", "kube-system", "kube-public", "kube-node-lease"];

/// Maximum backoff duration between failed cycles.
const MAX_BACKOFF: Duration = Duration::from_secs(5 * 60);

/// Maximum bit shift for backoff growth, to prevent overflow.
const MAX_BACKOFF_SHIFT: u32 = 10;

/// Safely converts Duration to milliseconds as u64, capping at `u64::MAX`.
#[inline]
fn duration_to_millis(duration: Duration) -> u64 {
    u64::try_from(duration.as_millis()).unwrap_or(u64::MAX)
}

/// Handles the deletion of old Helm releases and orphaned namespaces.
pub struct Pruner {
    opts: Options,
    releases: Arc<dyn ReleaseStore>,
    namespaces: Arc<dyn NamespaceStore>,
    system_namespaces: HashSet<String>,

    /// Set after the first successful cycle.
    ready: AtomicBool,
    /// Set after the first cycle attempt, success or failure.
    initialized: AtomicBool,
    /// Repeated-failure count for backoff. Mutated only by the cycle task,
    /// guarded because the health layer may read it concurrently.
    consecutive_failures: Mutex<u32>,
}

impl Pruner {
    /// Creates a new pruner over the given cluster stores.
    #[must_use]
    pub fn new(
        opts: Options,
        releases: Arc<dyn ReleaseStore>,
        namespaces: Arc<dyn NamespaceStore>,
    ) -> Self {
        let system_namespaces = DEFAULT_SYSTEM_NAMESPACES
            .iter()
            .map(ToString::to_string)
            .chain(opts.additional_system_namespaces.iter().cloned())
            .collect();

        Self {
            opts,
            releases,
            namespaces,
            system_namespaces,
            ready: AtomicBool::new(false),
            initialized: AtomicBool::new(false),
            consecutive_failures: Mutex::new(0),
        }
    }

    /// Returns `true` if at least one cycle has completed successfully.
    #[must_use]
    pub fn ready(&self) -> bool {
        self.ready.load(Ordering::SeqCst)
    }

    /// Returns `true` if at least one cycle has been attempted.
    ///
    /// Useful for readiness probes that want to pass after initialization
    /// even if the first cycle failed.
    #[must_use]
    pub fn initialized(&self) -> bool {
        self.initialized.load(Ordering::SeqCst)
    }

    /// Returns the current consecutive-failure count.
    #[must_use]
    pub fn consecutive_failures(&self) -> u32 {
        *self
            .consecutive_failures
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
    }

    /// Verifies connectivity to the Kubernetes cluster.
    ///
    /// # Errors
    ///
    /// Returns an error if the cluster is unreachable.
    pub async fn check_connectivity(&self) -> Result<()> {
        self.namespaces.probe().await
    }

    /// Executes a single pruning cycle.
    ///
    /// Runs the release pruning phase when any pruning rule is configured,
    /// then the orphan namespace phase when enabled. A phase error
    /// short-circuits the rest of the cycle.
    ///
    /// # Errors
    ///
    /// Returns the first phase-level error, or [`Error::Cancelled`] if
    /// shutdown fired mid-cycle.
    pub async fn run_once(&self, shutdown: &Shutdown) -> Result<()> {
        if self.opts.dry_run {
            info!("running in dry-run mode - nothing will be deleted");
        }

        if self.opts.has_release_pruning_filters() {
            self.prune_releases(shutdown).await?;
        }

        if self.opts.cleanup_orphan_namespaces {
            self.cleanup_orphan_namespaces(shutdown).await?;
        }

        Ok(())
    }

    /// Runs the pruner as a daemon: an immediate first cycle, then one per
    /// configured interval. The ticker only advances once the previous cycle,
    /// including any backoff sleep, has completed.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Cancelled`] when shutdown is requested; the caller
    /// treats that as a clean exit.
    pub async fn run_daemon(&self, shutdown: &Shutdown) -> Result<()> {
        info!(
            interval = %humantime::format_duration(self.opts.interval),
            dry_run = self.opts.dry_run,
            cleanup_orphan_namespaces = self.opts.cleanup_orphan_namespaces,
            "starting daemon"
        );

        // Run immediately on startup.
        self.run_cycle_with_backoff(shutdown).await;

        let mut ticker = tokio::time::interval(self.opts.interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        // Consume the tick that fires immediately; the first cycle already ran.
        ticker.tick().await;

        loop {
            tokio::select! {
                () = shutdown.cancelled() => {
                    info!("shutting down daemon");
                    return Err(Error::Cancelled);
                }
                _ = ticker.tick() => {
                    self.run_cycle_with_backoff(shutdown).await;
                }
            }
        }
    }

    /// Executes one cycle, updating failure counters, readiness flags, and
    /// sleeping the computed backoff after repeated failures.
    pub async fn run_cycle_with_backoff(&self, shutdown: &Shutdown) {
        info!("starting prune cycle");

        let start = Instant::now();
        let result = self.run_once(shutdown).await;
        let duration = start.elapsed();

        metrics::histogram!("helm_pruner_cycle_duration_seconds").record(duration.as_secs_f64());
        self.initialized.store(true, Ordering::SeqCst);

        match result {
            Err(err) if err.is_cancelled() => {
                // Shutdown, not a failure: stop without touching counters.
                debug!("prune cycle interrupted by shutdown");
            }
            Err(err) => {
                let failures = {
                    let mut count = self
                        .consecutive_failures
                        .lock()
                        .unwrap_or_else(std::sync::PoisonError::into_inner);
                    *count += 1;
                    *count
                };

                metrics::counter!("helm_pruner_cycle_failures_total").increment(1);
                error!(
                    error = %err,
                    duration_ms = duration_to_millis(duration),
                    consecutive_failures = failures,
                    "prune cycle failed"
                );

                let backoff = Self::calculate_backoff(failures);
                if !backoff.is_zero() {
                    warn!(
                        backoff = %humantime::format_duration(backoff),
                        "applying backoff due to repeated failures"
                    );
                    let _ = shutdown.sleep(backoff).await;
                }
            }
            Ok(()) => {
                *self
                    .consecutive_failures
                    .lock()
                    .unwrap_or_else(std::sync::PoisonError::into_inner) = 0;
                self.ready.store(true, Ordering::SeqCst);
                info!(
                    duration_ms = duration_to_millis(duration),
                    next_run = %(chrono::Utc::now()
                        + chrono::Duration::from_std(self.opts.interval)
                            .unwrap_or_else(|_| chrono::Duration::hours(1))),
                    "prune cycle complete"
                );
            }
        }
    }

    /// Computes the exponential backoff for a number of consecutive failures.
    ///
    /// Returns zero for the first failure; afterwards `2^(failures-1)`
    /// seconds, shift capped at [`MAX_BACKOFF_SHIFT`] and the result capped
    /// at [`MAX_BACKOFF`].
    #[must_use]
    pub fn calculate_backoff(consecutive_failures: u32) -> Duration {
        if consecutive_failures <= 1 {
            return Duration::ZERO;
        }

        let shift = (consecutive_failures - 1).min(MAX_BACKOFF_SHIFT);
        Duration::from_secs(1_u64 << shift).min(MAX_BACKOFF)
    }

    /// The release pruning phase: list, filter, select, delete, and then
    /// reconcile the namespaces touched by deletion.
    async fn prune_releases(&self, shutdown: &Shutdown) -> Result<()> {
        shutdown.check()?;

        let releases = shutdown.guard(self.releases.list_all()).await?;
        info!(count = releases.len(), "found releases");
        metrics::counter!("helm_pruner_releases_scanned_total").increment(releases.len() as u64);

        let candidates = filter::filter_releases(&self.opts, releases);
        debug!(count = candidates.len(), "releases after filtering");

        let to_delete = select::select_for_deletion(&self.opts, &candidates, chrono::Utc::now());
        if to_delete.is_empty() {
            info!("no stale Helm releases found");
            return Ok(());
        }
        info!(count = to_delete.len(), "releases to delete");

        // Namespaces that might become empty once these releases are gone.
        let mut affected: BTreeSet<String> = BTreeSet::new();

        let last = to_delete.len() - 1;
        for (i, release) in to_delete.iter().enumerate() {
            shutdown.check()?;
            affected.insert(release.namespace.clone());

            if self.opts.dry_run {
                info!(
                    name = release.name.as_str(),
                    namespace = release.namespace.as_str(),
                    last_deployed = %release.last_deployed,
                    status = %release.status,
                    "would delete release"
                );
                continue;
            }

            info!(
                name = release.name.as_str(),
                namespace = release.namespace.as_str(),
                "deleting release"
            );
            let uninstall = self.releases.uninstall(&release.name, &release.namespace);
            match shutdown.guard(uninstall).await {
                Err(err) if err.is_cancelled() => return Err(err),
                Err(err) => {
                    // Best-effort: skip this release, continue the cycle.
                    error!(
                        name = release.name.as_str(),
                        namespace = release.namespace.as_str(),
                        error = %err,
                        "failed to delete release"
                    );
                    continue;
                }
                Ok(()) => {}
            }
            metrics::counter!("helm_pruner_releases_deleted_total").increment(1);

            // Rate limit between deletions, never after the last one.
            if !self.opts.delete_rate_limit.is_zero() && i < last {
                shutdown.sleep(self.opts.delete_rate_limit).await?;
            }
        }

        if !self.opts.preserve_namespace {
            for namespace in &affected {
                shutdown.check()?;
                match self.delete_namespace_if_empty(shutdown, namespace).await {
                    Err(err) if err.is_cancelled() => return Err(err),
                    Err(err) => {
                        error!(
                            namespace = namespace.as_str(),
                            error = %err,
                            "failed to check/delete namespace"
                        );
                    }
                    Ok(()) => {}
                }
            }
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use test_case::test_case;

    #[test_case(0, 0; "no failures")]
    #[test_case(1, 0; "single failure has no backoff")]
    #[test_case(2, 2; "second failure")]
    #[test_case(3, 4; "third failure")]
    #[test_case(4, 8; "fourth failure")]
    #[test_case(9, 256; "ninth failure")]
    #[test_case(10, 300; "tenth failure capped at five minutes")]
    #[test_case(11, 300; "shift capped at ten")]
    #[test_case(100, 300; "large counts stay capped")]
    fn test_calculate_backoff(failures: u32, expected_secs: u64) {
        assert_eq!(
            Pruner::calculate_backoff(failures),
            Duration::from_secs(expected_secs)
        );
    }
}
