//! Immutable pruner configuration.
//!
//! [`Options`] is built once at startup (flag parsing lives in the binary)
//! and never mutated afterwards. Regex filters are compiled at configuration
//! time; the pruning engine only ever sees opaque, pre-validated matchers.

use crate::{Error, Result};
use regex::Regex;
use std::time::Duration;
use tracing::warn;

/// Configures the pruner behavior.
#[derive(Debug, Clone, Default)]
pub struct Options {
    /// How often to run the pruning loop. Only used in daemon mode.
    pub interval: Duration,

    /// Age threshold: releases whose last deploy is strictly older than this
    /// are deleted. `None` disables age-based selection.
    pub older_than: Option<Duration>,

    /// Maximum number of releases to keep globally. After filtering, the
    /// newest N releases are kept and the rest deleted. `0` disables
    /// count-based selection.
    pub max_releases_to_keep: usize,

    /// Release names must match this to be considered. `None` considers all.
    pub release_filter: Option<Regex>,

    /// Namespaces must match this to be considered. `None` considers all.
    pub namespace_filter: Option<Regex>,

    /// Releases whose name matches this are excluded.
    pub release_exclude: Option<Regex>,

    /// Releases whose namespace matches this are excluded.
    pub namespace_exclude: Option<Regex>,

    /// Do not delete namespaces left empty by release deletion.
    pub preserve_namespace: bool,

    /// Enable the orphan namespace scan. Requires `orphan_namespace_filter`.
    pub cleanup_orphan_namespaces: bool,

    /// Namespaces must match this to be considered for orphan cleanup.
    /// Required whenever `cleanup_orphan_namespaces` is set; the scan never
    /// runs unfiltered.
    pub orphan_namespace_filter: Option<Regex>,

    /// Namespaces matching this are excluded from orphan cleanup.
    pub orphan_namespace_exclude: Option<Regex>,

    /// Minimum duration between delete operations, to avoid overwhelming the
    /// API server. Zero disables rate limiting.
    pub delete_rate_limit: Duration,

    /// Namespace names treated as system namespaces and never deleted, in
    /// addition to the built-in defaults.
    pub additional_system_namespaces: Vec<String>,

    /// Log what would be deleted without deleting anything.
    pub dry_run: bool,

    /// Enable verbose logging.
    pub debug: bool,
}

impl Options {
    /// Returns `true` if any release pruning rule or filter is configured.
    ///
    /// When this is `false` the release pruning phase is skipped entirely.
    #[must_use]
    pub const fn has_release_pruning_filters(&self) -> bool {
        self.older_than.is_some()
            || self.max_releases_to_keep > 0
            || self.release_filter.is_some()
            || self.namespace_filter.is_some()
            || self.release_exclude.is_some()
            || self.namespace_exclude.is_some()
    }

    /// Validates the configuration, returning the (possibly adjusted) options.
    ///
    /// Orphan cleanup without an inclusion filter is forcibly disabled with a
    /// warning rather than allowed to run unfiltered.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Config`] if the interval is zero, or if neither
    /// release pruning rules nor (enabled) orphan cleanup remain configured.
    pub fn validate(mut self) -> Result<Self> {
        if self.cleanup_orphan_namespaces && self.orphan_namespace_filter.is_none() {
            warn!(
                "cleanup-orphan-namespaces requires orphan-namespace-filter for safety; \
                 orphan cleanup disabled"
            );
            self.cleanup_orphan_namespaces = false;
        }

        if !self.has_release_pruning_filters() && !self.cleanup_orphan_namespaces {
            return Err(Error::Config(
                "at least one release pruning filter or orphan namespace cleanup \
                 (with an orphan namespace filter) must be configured"
                    .to_string(),
            ));
        }

        // A zero period would panic the daemon ticker.
        if self.interval.is_zero() {
            return Err(Error::Config(
                "interval must be greater than zero".to_string(),
            ));
        }

        Ok(self)
    }
}

/// Parses a human-readable duration like `336h`, `2w`, or `30d`.
///
/// # Errors
///
/// Returns [`Error::Config`] if the string is not a valid duration.
pub fn parse_duration(s: &str) -> Result<Duration> {
    humantime::parse_duration(s).map_err(|e| Error::Config(format!("invalid duration '{s}': {e}")))
}

/// Compiles a regex filter, mapping failures to configuration errors.
///
/// # Errors
///
/// Returns [`Error::Config`] naming the offending flag if the pattern does
/// not compile.
pub fn compile_filter(flag: &str, pattern: &str) -> Result<Regex> {
    Regex::new(pattern).map_err(|e| Error::Config(format!("invalid {flag} regex: {e}")))
}
