//! Binary entry point for helm-pruner.
//!
//! Parses flags into the immutable [`Options`] structure, wires up the
//! kube-backed cluster stores, and runs the daemon alongside the
//! health/metrics HTTP server until a termination signal arrives.

#![deny(clippy::all)]
#![warn(clippy::pedantic)]
#![warn(missing_docs)]
// Allow multiple crate versions from transitive dependencies
#![allow(clippy::multiple_crate_versions)]

use anyhow::Context;
use clap::Parser;
use helm_pruner::cluster::{HelmSecretStore, KubeNamespaceStore};
use helm_pruner::config::{self, Options};
use helm_pruner::health::{self, HealthState};
use helm_pruner::{Pruner, Shutdown, observability};
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tracing::info;

/// Automatically delete old Helm releases and orphan namespaces.
///
/// A daemon for deleting old Helm releases based on age, count limits, and
/// regex filters. Can also clean up orphaned namespaces that have no Helm
/// releases. Runs continuously and prunes at configurable intervals.
#[derive(Parser)]
#[command(name = "helm-pruner")]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// How often to run the pruning cycle.
    #[arg(long, default_value = "1h", value_parser = humantime::parse_duration)]
    interval: Duration,

    /// Address for health check and metrics endpoints.
    #[arg(long, default_value = "0.0.0.0:8080")]
    health_addr: SocketAddr,

    /// Minimum duration between delete operations (0 to disable).
    #[arg(long, default_value = "100ms", value_parser = humantime::parse_duration)]
    delete_rate_limit: Duration,

    /// Maximum number of releases to keep globally after filtering (0 = no limit).
    #[arg(long, default_value_t = 0)]
    max_releases_to_keep: usize,

    /// Delete releases older than this duration (e.g. '336h', '2w', '30d').
    #[arg(long)]
    older_than: Option<String>,

    /// Regex filter for release names (only matching releases are considered).
    #[arg(long)]
    release_filter: Option<String>,

    /// Regex filter for namespaces (only matching namespaces are considered).
    #[arg(long)]
    namespace_filter: Option<String>,

    /// Regex filter to exclude releases (matching releases are skipped).
    #[arg(long)]
    release_exclude: Option<String>,

    /// Regex filter to exclude namespaces (matching namespaces are skipped).
    #[arg(long)]
    namespace_exclude: Option<String>,

    /// Do not delete namespaces even when empty after release deletion.
    #[arg(long)]
    preserve_namespace: bool,

    /// Enable cleanup of namespaces that have no Helm releases
    /// (requires --orphan-namespace-filter).
    #[arg(long)]
    cleanup_orphan_namespaces: bool,

    /// Regex filter for namespaces to consider for orphan cleanup
    /// (REQUIRED when using --cleanup-orphan-namespaces).
    #[arg(long)]
    orphan_namespace_filter: Option<String>,

    /// Regex filter to exclude namespaces from orphan cleanup
    /// (e.g. 'kube-system|default').
    #[arg(long)]
    orphan_namespace_exclude: Option<String>,

    /// Comma-separated list of additional namespaces to treat as system
    /// namespaces (never deleted).
    #[arg(long, value_delimiter = ',')]
    system_namespaces: Vec<String>,

    /// Show what would be deleted without actually deleting.
    #[arg(long)]
    dry_run: bool,

    /// Enable debug logging.
    #[arg(long)]
    debug: bool,
}

impl Cli {
    /// Converts parsed flags into validated pruner options.
    fn into_options(self) -> helm_pruner::Result<Options> {
        let compile = |flag: &str, pattern: &Option<String>| {
            pattern
                .as_deref()
                .map(|p| config::compile_filter(flag, p))
                .transpose()
        };

        let opts = Options {
            interval: self.interval,
            older_than: self
                .older_than
                .as_deref()
                .map(config::parse_duration)
                .transpose()?,
            max_releases_to_keep: self.max_releases_to_keep,
            release_filter: compile("--release-filter", &self.release_filter)?,
            namespace_filter: compile("--namespace-filter", &self.namespace_filter)?,
            release_exclude: compile("--release-exclude", &self.release_exclude)?,
            namespace_exclude: compile("--namespace-exclude", &self.namespace_exclude)?,
            preserve_namespace: self.preserve_namespace,
            cleanup_orphan_namespaces: self.cleanup_orphan_namespaces,
            orphan_namespace_filter: compile(
                "--orphan-namespace-filter",
                &self.orphan_namespace_filter,
            )?,
            orphan_namespace_exclude: compile(
                "--orphan-namespace-exclude",
                &self.orphan_namespace_exclude,
            )?,
            delete_rate_limit: self.delete_rate_limit,
            additional_system_namespaces: self
                .system_namespaces
                .iter()
                .map(|ns| ns.trim().to_string())
                .filter(|ns| !ns.is_empty())
                .collect(),
            dry_run: self.dry_run,
            debug: self.debug,
        };

        opts.validate()
    }
}

/// Waits for a shutdown signal (SIGINT or SIGTERM).
async fn wait_for_shutdown_signal() {
    #[cfg(unix)]
    {
        use tokio::signal::unix::{SignalKind, signal};

        let mut sigint = match signal(SignalKind::interrupt()) {
            Ok(s) => s,
            Err(e) => {
                tracing::error!(error = %e, "failed to install SIGINT handler");
                return std::future::pending().await;
            }
        };
        let mut sigterm = match signal(SignalKind::terminate()) {
            Ok(s) => s,
            Err(e) => {
                tracing::error!(error = %e, "failed to install SIGTERM handler");
                return std::future::pending().await;
            }
        };

        tokio::select! {
            _ = sigint.recv() => info!("received SIGINT"),
            _ = sigterm.recv() => info!("received SIGTERM"),
        }
    }

    #[cfg(not(unix))]
    {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::error!(error = %e, "failed to listen for shutdown signal");
            return std::future::pending().await;
        }
        info!("received Ctrl+C");
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    observability::init_logging(cli.debug);

    let health_addr = cli.health_addr;
    let opts = cli.into_options().context("invalid configuration")?;

    let metrics_handle = observability::install_metrics_recorder()
        .context("failed to initialize metrics")?;

    let client = kube::Client::try_default()
        .await
        .context("failed to create kubernetes client")?;

    let pruner = Arc::new(Pruner::new(
        opts,
        Arc::new(HelmSecretStore::new(client.clone())),
        Arc::new(KubeNamespaceStore::new(client)),
    ));

    let (signal, shutdown) = Shutdown::channel();
    tokio::spawn(async move {
        wait_for_shutdown_signal().await;
        info!("shutting down...");
        signal.trigger();
    });

    let health = tokio::spawn(health::serve(
        health_addr,
        HealthState {
            pruner: Arc::clone(&pruner),
            metrics: metrics_handle,
        },
        shutdown.clone(),
    ));

    let result = pruner.run_daemon(&shutdown).await;

    // The health server stops on its own once the shutdown signal fires;
    // on a daemon error there is no signal, so stop it explicitly.
    health.abort();

    match result {
        Err(err) if err.is_cancelled() => Ok(()),
        other => other.map_err(Into::into),
    }
}
