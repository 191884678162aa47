use crate::annotations::{
    IGNORE_CONTAINERS_ANNOTATION, TRACK_CONTAINERS_ANNOTATION, TRACK_INIT_CONTAINERS_ANNOTATION,
};
use crate::workload::ContainerInfo;
use std::collections::{BTreeMap, BTreeSet};

/// Which containers of a workload are monitored for digest changes.
///
/// A non-empty `include` fully determines the tracked set; `exclude` is only
/// consulted when `include` is empty. Init containers are appended
/// unconditionally when `track_init` is set, regardless of include/exclude.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TrackingPolicy {
    pub include: BTreeSet<String>,
    pub exclude: BTreeSet<String>,
    pub track_init: bool,
}

impl TrackingPolicy {
    pub fn from_annotations(annotations: &BTreeMap<String, String>) -> Self {
        Self {
            include: parse_name_list(annotations.get(TRACK_CONTAINERS_ANNOTATION)),
            exclude: parse_name_list(annotations.get(IGNORE_CONTAINERS_ANNOTATION)),
            track_init: annotations
                .get(TRACK_INIT_CONTAINERS_ANNOTATION)
                .is_some_and(|v| v == "true"),
        }
    }
}

fn parse_name_list(value: Option<&String>) -> BTreeSet<String> {
    value
        .map(|v| {
            v.split(',')
                .map(str::trim)
                .filter(|name| !name.is_empty())
                .map(str::to_string)
                .collect()
        })
        .unwrap_or_default()
}

/// Applies the tracking policy to a workload's container lists. Names in the
/// policy that match no actual container are silently dropped. An empty
/// result means the cycle is a no-op for this workload.
pub fn select<'a>(
    containers: &'a [ContainerInfo],
    init_containers: &'a [ContainerInfo],
    policy: &TrackingPolicy,
) -> Vec<&'a ContainerInfo> {
    let mut tracked: Vec<&ContainerInfo> = if !policy.include.is_empty() {
        containers
            .iter()
            .filter(|c| policy.include.contains(&c.name))
            .collect()
    } else if !policy.exclude.is_empty() {
        containers
            .iter()
            .filter(|c| !policy.exclude.contains(&c.name))
            .collect()
    } else {
        containers.iter().collect()
    };

    if policy.track_init {
        tracked.extend(init_containers.iter());
    }

    tracked
}

#[cfg(test)]
mod tests {
    use super::*;

    fn container(name: &str) -> ContainerInfo {
        ContainerInfo {
            name: name.to_string(),
            image: format!("{}:latest", name),
            image_pull_policy: None,
            init: false,
        }
    }

    fn annotations(pairs: &[(&str, &str)]) -> BTreeMap<String, String> {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect()
    }

    fn sample_containers() -> Vec<ContainerInfo> {
        vec![
            container("nginx"),
            container("sidecar"),
            container("log-collector"),
            container("metrics-exporter"),
        ]
    }

    fn names(tracked: &[&ContainerInfo]) -> Vec<String> {
        tracked.iter().map(|c| c.name.clone()).collect()
    }

    #[test]
    fn test_select_all_containers_by_default() {
        let containers = sample_containers();
        let policy = TrackingPolicy::from_annotations(&BTreeMap::new());
        let tracked = select(&containers, &[], &policy);
        assert_eq!(tracked.len(), 4);
    }

    #[test]
    fn test_select_track_containers() {
        let containers = sample_containers();
        let policy = TrackingPolicy::from_annotations(&annotations(&[(
            TRACK_CONTAINERS_ANNOTATION,
            "nginx,sidecar",
        )]));
        let tracked = select(&containers, &[], &policy);
        assert_eq!(names(&tracked), vec!["nginx", "sidecar"]);
    }

    #[test]
    fn test_select_track_containers_whitespace_handling() {
        let containers = sample_containers();
        let policy = TrackingPolicy::from_annotations(&annotations(&[(
            TRACK_CONTAINERS_ANNOTATION,
            " nginx , sidecar ",
        )]));
        let tracked = select(&containers, &[], &policy);
        assert_eq!(names(&tracked), vec!["nginx", "sidecar"]);
    }

    #[test]
    fn test_select_ignore_containers() {
        let containers = sample_containers();
        let policy = TrackingPolicy::from_annotations(&annotations(&[(
            IGNORE_CONTAINERS_ANNOTATION,
            "log-collector,metrics-exporter",
        )]));
        let tracked = select(&containers, &[], &policy);
        assert_eq!(names(&tracked), vec!["nginx", "sidecar"]);
    }

    #[test]
    fn test_track_wins_over_ignore() {
        let containers = sample_containers();
        let policy = TrackingPolicy::from_annotations(&annotations(&[
            (TRACK_CONTAINERS_ANNOTATION, "nginx"),
            (IGNORE_CONTAINERS_ANNOTATION, "nginx,sidecar"),
        ]));
        let tracked = select(&containers, &[], &policy);
        assert_eq!(names(&tracked), vec!["nginx"]);
    }

    #[test]
    fn test_unknown_names_are_dropped() {
        let containers = sample_containers();
        let policy = TrackingPolicy::from_annotations(&annotations(&[(
            TRACK_CONTAINERS_ANNOTATION,
            "nginx,no-such-container",
        )]));
        let tracked = select(&containers, &[], &policy);
        assert_eq!(names(&tracked), vec!["nginx"]);
    }

    #[test]
    fn test_include_naming_nothing_yields_empty_set() {
        let containers = sample_containers();
        let policy = TrackingPolicy::from_annotations(&annotations(&[(
            TRACK_CONTAINERS_ANNOTATION,
            "no-such-container",
        )]));
        let tracked = select(&containers, &[], &policy);
        assert!(tracked.is_empty());
    }

    #[test]
    fn test_init_containers_appended_unconditionally() {
        let containers = sample_containers();
        let init_containers = vec![container("migrations")];
        let policy = TrackingPolicy::from_annotations(&annotations(&[
            (TRACK_CONTAINERS_ANNOTATION, "nginx"),
            (TRACK_INIT_CONTAINERS_ANNOTATION, "true"),
        ]));
        let tracked = select(&containers, &init_containers, &policy);
        assert_eq!(names(&tracked), vec!["nginx", "migrations"]);
    }

    #[test]
    fn test_init_containers_not_tracked_by_default() {
        let containers = sample_containers();
        let init_containers = vec![container("migrations")];
        let policy = TrackingPolicy::from_annotations(&BTreeMap::new());
        let tracked = select(&containers, &init_containers, &policy);
        assert_eq!(tracked.len(), 4);
    }
}
