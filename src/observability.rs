//! Logging and metrics initialization.
//!
//! Logging goes through `tracing` with an `EnvFilter` (the `RUST_LOG`
//! environment variable overrides the level chosen by `--debug`). Metrics
//! are recorded through the `metrics` facade and exposed by a Prometheus
//! recorder whose handle the health server renders on `/metrics`.

use crate::{Error, Result};
use metrics_exporter_prometheus::{Matcher, PrometheusBuilder, PrometheusHandle};
use tracing_subscriber::EnvFilter;

/// Bucket boundaries for the cycle duration histogram: 1s to ~17min,
/// doubling.
const CYCLE_DURATION_BUCKETS: [f64; 10] =
    [1.0, 2.0, 4.0, 8.0, 16.0, 32.0, 64.0, 128.0, 256.0, 512.0];

/// Initializes the global tracing subscriber.
///
/// `RUST_LOG` takes precedence; otherwise the default level is `debug` when
/// requested and `info` otherwise.
pub fn init_logging(debug: bool) {
    let default_level = if debug { "debug" } else { "info" };
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .init();
}

/// Installs the global Prometheus recorder and registers metric metadata.
///
/// # Errors
///
/// Returns an error if a recorder is already installed.
pub fn install_metrics_recorder() -> Result<PrometheusHandle> {
    let handle = PrometheusBuilder::new()
        .set_buckets_for_metric(
            Matcher::Full("helm_pruner_cycle_duration_seconds".to_string()),
            &CYCLE_DURATION_BUCKETS,
        )
        .map_err(|e| Error::Config(format!("invalid metrics buckets: {e}")))?
        .install_recorder()
        .map_err(|e| Error::Config(format!("failed to install metrics recorder: {e}")))?;

    describe_metrics();
    Ok(handle)
}

/// Registers help text for every metric the pruner emits.
fn describe_metrics() {
    metrics::describe_counter!(
        "helm_pruner_releases_deleted_total",
        "Total number of Helm releases deleted"
    );
    metrics::describe_counter!(
        "helm_pruner_namespaces_deleted_total",
        "Total number of namespaces deleted"
    );
    metrics::describe_counter!(
        "helm_pruner_cycle_failures_total",
        "Total number of failed prune cycles"
    );
    metrics::describe_counter!(
        "helm_pruner_releases_scanned_total",
        "Total number of releases scanned across all cycles"
    );
    metrics::describe_histogram!(
        "helm_pruner_cycle_duration_seconds",
        "Duration of prune cycles in seconds"
    );
}
