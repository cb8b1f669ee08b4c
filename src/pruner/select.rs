//! Deletion selection.
//!
//! Selection is the union of two independent rules, deduplicated:
//!
//! - **Count rule**: keep the N most recently deployed releases globally,
//!   mark everything beyond position N.
//! - **Age rule**: mark any release strictly older than the threshold.
//!
//! Releases with identical timestamps sort by `(namespace, name)` so that
//! count-rule selection is deterministic rather than left to incidental
//! ordering.

use crate::config::Options;
use crate::release::Release;
use chrono::{DateTime, Utc};
use std::collections::HashSet;
use tracing::debug;

/// Computes the set of releases to delete from the filtered candidates.
///
/// Returns releases in newest-first order. An empty input or a configuration
/// with neither rule active yields an empty result.
pub(crate) fn select_for_deletion(
    opts: &Options,
    releases: &[Release],
    now: DateTime<Utc>,
) -> Vec<Release> {
    if releases.is_empty() {
        return Vec::new();
    }

    // Newest first, with a deterministic tiebreak on identity.
    let mut sorted: Vec<&Release> = releases.iter().collect();
    sorted.sort_by(|a, b| {
        b.last_deployed
            .cmp(&a.last_deployed)
            .then_with(|| (&a.namespace, &a.name).cmp(&(&b.namespace, &b.name)))
    });

    let mut marked: HashSet<(&str, &str)> = HashSet::new();

    // Count rule: everything beyond the keep-count position goes.
    if opts.max_releases_to_keep > 0 && sorted.len() > opts.max_releases_to_keep {
        for (position, release) in sorted.iter().enumerate().skip(opts.max_releases_to_keep) {
            debug!(
                name = release.name.as_str(),
                namespace = release.namespace.as_str(),
                position,
                max = opts.max_releases_to_keep,
                "release exceeds global max count"
            );
            marked.insert(release.key());
        }
    }

    // Age rule: strictly older than the threshold. Skip already-marked
    // releases to avoid duplicate log lines; the set makes duplicates
    // structurally impossible either way.
    if let Some(threshold) = opts.older_than
        && let Ok(threshold) = chrono::Duration::from_std(threshold)
    {
        for release in &sorted {
            if marked.contains(&release.key()) {
                continue;
            }
            let age = now - release.last_deployed;
            if age > threshold {
                debug!(
                    name = release.name.as_str(),
                    namespace = release.namespace.as_str(),
                    age_hours = age.num_hours(),
                    "release exceeds age limit"
                );
                marked.insert(release.key());
            }
        }
    }

    sorted
        .into_iter()
        .filter(|release| marked.contains(&release.key()))
        .cloned()
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::release::ReleaseStatus;
    use chrono::Duration as ChronoDuration;
    use std::time::Duration;
    use test_case::test_case;

    fn release(name: &str, namespace: &str, age_hours: i64, now: DateTime<Utc>) -> Release {
        Release {
            name: name.to_string(),
            namespace: namespace.to_string(),
            last_deployed: now - ChronoDuration::hours(age_hours),
            status: ReleaseStatus::Deployed,
        }
    }

    fn fixture(now: DateTime<Utc>) -> Vec<Release> {
        vec![
            release("app-a", "ns-a", 1, now),
            release("app-b", "ns-b", 2, now),
            release("app-c", "ns-c", 3, now),
            release("app-d", "ns-d", 4, now),
            release("app-e", "ns-e", 5, now),
        ]
    }

    fn names(releases: &[Release]) -> Vec<&str> {
        releases.iter().map(|r| r.name.as_str()).collect()
    }

    #[test_case(2, 3, &["app-a", "app-b"]; "keep 2 delete 3 oldest")]
    #[test_case(3, 2, &["app-a", "app-b", "app-c"]; "keep 3 delete 2 oldest")]
    #[test_case(5, 0, &["app-a", "app-b", "app-c", "app-d", "app-e"]; "keep all")]
    #[test_case(10, 0, &["app-a", "app-b", "app-c", "app-d", "app-e"]; "keep more than exist")]
    #[test_case(1, 4, &["app-a"]; "keep 1 delete 4")]
    fn test_count_rule(keep: usize, expected_deleted: usize, expected_kept: &[&str]) {
        let now = Utc::now();
        let opts = Options {
            max_releases_to_keep: keep,
            ..Options::default()
        };

        let to_delete = select_for_deletion(&opts, &fixture(now), now);
        assert_eq!(to_delete.len(), expected_deleted);
        for kept in expected_kept {
            assert!(
                !names(&to_delete).contains(kept),
                "{kept} should be kept but was selected"
            );
        }
    }

    #[test]
    fn test_age_rule_strictly_greater_than() {
        let now = Utc::now();
        let releases = vec![
            release("young", "ns", 1, now),
            release("exactly", "ns", 72, now),
            release("past", "ns2", 73, now),
        ];
        let opts = Options {
            older_than: Some(Duration::from_secs(72 * 3600)),
            ..Options::default()
        };

        let to_delete = select_for_deletion(&opts, &releases, now);
        // Age exactly equal to the threshold is NOT deleted.
        assert_eq!(names(&to_delete), vec!["past"]);
    }

    #[test]
    fn test_age_rule_scenario() {
        let now = Utc::now();
        let releases = vec![
            release("r1", "ns", 1, now),
            release("r2", "ns", 24, now),
            release("r3", "ns", 48, now),
            release("r4", "ns", 168, now),
        ];
        let opts = Options {
            older_than: Some(Duration::from_secs(72 * 3600)),
            ..Options::default()
        };

        let to_delete = select_for_deletion(&opts, &releases, now);
        assert_eq!(names(&to_delete), vec!["r4"]);
    }

    #[test]
    fn test_union_of_both_rules_never_double_counts() {
        let now = Utc::now();
        let releases = vec![
            release("r1", "ns", 1, now),
            release("r2", "ns", 2, now),
            release("r3", "ns", 3, now),
            release("r4", "ns", 48, now),
            release("r5", "ns", 168, now),
        ];
        let opts = Options {
            max_releases_to_keep: 3,
            older_than: Some(Duration::from_secs(24 * 3600)),
            ..Options::default()
        };

        // Both rules agree on {r4, r5}; the union has size 2, not 4.
        let to_delete = select_for_deletion(&opts, &releases, now);
        assert_eq!(names(&to_delete), vec!["r4", "r5"]);
    }

    #[test]
    fn test_union_is_a_superset_of_each_rule_alone() {
        let now = Utc::now();
        let releases = fixture(now);

        let count_only = Options {
            max_releases_to_keep: 4,
            ..Options::default()
        };
        let age_only = Options {
            older_than: Some(Duration::from_secs(2 * 3600)),
            ..Options::default()
        };
        let both = Options {
            max_releases_to_keep: 4,
            older_than: Some(Duration::from_secs(2 * 3600)),
            ..Options::default()
        };

        let by_count = select_for_deletion(&count_only, &releases, now);
        let by_age = select_for_deletion(&age_only, &releases, now);
        let combined = select_for_deletion(&both, &releases, now);

        for selected in by_count.iter().chain(by_age.iter()) {
            assert!(combined.contains(selected));
        }
    }

    #[test]
    fn test_no_rules_selects_nothing() {
        let now = Utc::now();
        assert!(select_for_deletion(&Options::default(), &fixture(now), now).is_empty());
        assert!(select_for_deletion(&Options::default(), &[], now).is_empty());
    }

    #[test]
    fn test_selection_is_idempotent() {
        let now = Utc::now();
        let releases = fixture(now);
        let opts = Options {
            max_releases_to_keep: 2,
            older_than: Some(Duration::from_secs(4 * 3600)),
            ..Options::default()
        };

        let first = select_for_deletion(&opts, &releases, now);
        let second = select_for_deletion(&opts, &releases, now);
        assert_eq!(first, second);
    }

    #[test]
    fn test_equal_timestamps_break_ties_deterministically() {
        let now = Utc::now();
        let deployed = now - ChronoDuration::hours(1);
        let mut releases: Vec<Release> = ["zeta", "alpha", "mike"]
            .iter()
            .map(|name| Release {
                name: (*name).to_string(),
                namespace: "ns".to_string(),
                last_deployed: deployed,
                status: ReleaseStatus::Deployed,
            })
            .collect();
        let opts = Options {
            max_releases_to_keep: 1,
            ..Options::default()
        };

        let selected = select_for_deletion(&opts, &releases, now);
        // (namespace, name) ordering keeps "alpha" regardless of input order.
        assert_eq!(names(&selected), vec!["mike", "zeta"]);

        releases.reverse();
        let selected_again = select_for_deletion(&opts, &releases, now);
        assert_eq!(names(&selected_again), vec!["mike", "zeta"]);
    }
}
