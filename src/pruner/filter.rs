//! Regex filtering of release candidates.
//!
//! A release survives filtering iff it passes every configured test: the
//! four filters form a pure conjunction, so evaluation order never affects
//! the result. Absent filters impose no constraint.

use crate::config::Options;
use crate::release::Release;
use tracing::debug;

/// Applies the include/exclude regex filters to the release list.
pub(crate) fn filter_releases(opts: &Options, releases: Vec<Release>) -> Vec<Release> {
    releases
        .into_iter()
        .filter(|release| {
            if let Some(filter) = &opts.namespace_filter
                && !filter.is_match(&release.namespace)
            {
                debug!(
                    name = release.name.as_str(),
                    namespace = release.namespace.as_str(),
                    "skipping release (namespace filter)"
                );
                return false;
            }

            if let Some(exclude) = &opts.namespace_exclude
                && exclude.is_match(&release.namespace)
            {
                debug!(
                    name = release.name.as_str(),
                    namespace = release.namespace.as_str(),
                    "skipping release (namespace exclude)"
                );
                return false;
            }

            if let Some(filter) = &opts.release_filter
                && !filter.is_match(&release.name)
            {
                debug!(
                    name = release.name.as_str(),
                    namespace = release.namespace.as_str(),
                    "skipping release (release filter)"
                );
                return false;
            }

            if let Some(exclude) = &opts.release_exclude
                && exclude.is_match(&release.name)
            {
                debug!(
                    name = release.name.as_str(),
                    namespace = release.namespace.as_str(),
                    "skipping release (release exclude)"
                );
                return false;
            }

            true
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::release::ReleaseStatus;
    use chrono::Utc;
    use regex::Regex;

    fn release(name: &str, namespace: &str) -> Release {
        Release {
            name: name.to_string(),
            namespace: namespace.to_string(),
            last_deployed: Utc::now(),
            status: ReleaseStatus::Deployed,
        }
    }

    fn fixture() -> Vec<Release> {
        vec![
            release("feature-abc-web", "feature-abc"),
            release("feature-xyz-web", "feature-xyz"),
            release("production-web", "production"),
            release("staging-web", "staging"),
            release("feature-permanent-web", "feature-permanent"),
        ]
    }

    fn names(releases: &[Release]) -> Vec<&str> {
        releases.iter().map(|r| r.name.as_str()).collect()
    }

    #[test]
    fn test_no_filters_returns_all() {
        let filtered = filter_releases(&Options::default(), fixture());
        assert_eq!(filtered.len(), 5);
    }

    #[test]
    fn test_release_filter_only_matching() {
        let opts = Options {
            release_filter: Some(Regex::new(r"^feature-.+-web$").unwrap()),
            ..Options::default()
        };

        let filtered = filter_releases(&opts, fixture());
        assert_eq!(
            names(&filtered),
            vec!["feature-abc-web", "feature-xyz-web", "feature-permanent-web"]
        );
    }

    #[test]
    fn test_namespace_filter_only_matching() {
        let opts = Options {
            namespace_filter: Some(Regex::new(r"^feature-.+").unwrap()),
            ..Options::default()
        };

        let filtered = filter_releases(&opts, fixture());
        assert_eq!(filtered.len(), 3);
        assert!(filtered.iter().all(|r| r.namespace.starts_with("feature-")));
    }

    #[test]
    fn test_release_exclude() {
        let opts = Options {
            release_exclude: Some(Regex::new(r"-permanent-").unwrap()),
            ..Options::default()
        };

        let filtered = filter_releases(&opts, fixture());
        assert_eq!(filtered.len(), 4);
        assert!(!names(&filtered).contains(&"feature-permanent-web"));
    }

    #[test]
    fn test_namespace_exclude() {
        let opts = Options {
            namespace_exclude: Some(Regex::new(r"^production$").unwrap()),
            ..Options::default()
        };

        let filtered = filter_releases(&opts, fixture());
        assert_eq!(filtered.len(), 4);
        assert!(!names(&filtered).contains(&"production-web"));
    }

    #[test]
    fn test_combined_filters_are_a_conjunction() {
        let opts = Options {
            namespace_filter: Some(Regex::new(r"^feature-.+").unwrap()),
            release_exclude: Some(Regex::new(r"-permanent-").unwrap()),
            ..Options::default()
        };

        let filtered = filter_releases(&opts, fixture());
        assert_eq!(names(&filtered), vec!["feature-abc-web", "feature-xyz-web"]);
    }
}
