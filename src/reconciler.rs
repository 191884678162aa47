use crate::annotations::{ENABLE_ANNOTATION, LAST_DIGEST_ANNOTATION};
use crate::digest_state::{DigestMap, StoredDigests};
use crate::image_reference::{ImageReference, ParsedImage};
use crate::oci_registry::DigestResolver;
use crate::selector::{self, TrackingPolicy};
use crate::workload::WorkloadSnapshot;
use chrono::{SecondsFormat, Utc};
use futures::future::join_all;
use std::collections::BTreeSet;
use tracing::{debug, info, warn};

/// Everything the external API client needs to apply in one atomic update:
/// the refreshed digest map, the pod-template restart trigger and any
/// pull-policy overrides.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PatchDescriptor {
    pub last_digest: String,
    pub restart_timestamp: String,
    pub pull_policy_containers: BTreeSet<String>,
}

/// Outcome of one reconciliation cycle for one workload.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Decision {
    /// Nothing to do; the workload is untouched this cycle.
    NoAction,
    /// The digest annotation needs a rewrite (legacy migration or stale
    /// entries) but no digest changed, so no rollout is triggered.
    UpdateState { last_digest: String },
    /// At least one tracked digest is new or changed.
    Restart(PatchDescriptor),
}

#[derive(Debug, Clone, Default)]
pub struct ReconcileOptions {
    pub force_pull_policy: bool,
}

/// Decides whether a workload snapshot warrants a rolling restart.
///
/// Per-container failures (unparseable image, registry error) are isolated:
/// the container keeps its previously persisted digest and sits out this
/// cycle's comparison. Only when every fetch fails is the cycle degraded to
/// NoAction with state untouched.
pub async fn reconcile<R: DigestResolver + Sync>(
    snapshot: &WorkloadSnapshot,
    resolver: &R,
    options: &ReconcileOptions,
) -> Decision {
    if snapshot.annotations.get(ENABLE_ANNOTATION).map(String::as_str) != Some("true") {
        debug!("{}: not enabled, skipping", snapshot);
        return Decision::NoAction;
    }

    let policy = TrackingPolicy::from_annotations(&snapshot.annotations);
    let tracked = selector::select(&snapshot.containers, &snapshot.init_containers, &policy);
    if tracked.is_empty() {
        debug!("{}: no tracked containers, skipping", snapshot);
        return Decision::NoAction;
    }

    let fetches = tracked.iter().map(|container| async move {
        let digest = fetch_container_digest(resolver, &container.name, &container.image).await;
        (container.name.as_str(), digest)
    });
    let results: Vec<(&str, Option<String>)> = join_all(fetches).await;

    if results.iter().all(|(_, digest)| digest.is_none()) {
        warn!("{}: all digest fetches failed, cycle degraded", snapshot);
        return Decision::NoAction;
    }

    let raw_state = snapshot
        .annotations
        .get(LAST_DIGEST_ANNOTATION)
        .map(String::as_str);
    let stored = match StoredDigests::decode(raw_state) {
        Ok(stored) => stored,
        Err(e) => {
            // Corrupt state gives no trustworthy baseline; treat it as
            // absent and let the resync restart rewrite it canonically
            warn!("{}: {}, forcing resync", snapshot, e);
            StoredDigests::Absent
        }
    };
    let (stored_map, migrated) = stored.into_map(&tracked[0].name);
    if migrated {
        info!("{}: migrating legacy digest format", snapshot);
    }

    let tracked_names: BTreeSet<String> =
        tracked.iter().map(|c| c.name.clone()).collect();

    let mut new_map = stored_map.clone();
    new_map.retain_names(&tracked_names);

    let mut changed = false;
    for (name, digest) in results {
        let Some(digest) = digest else {
            continue; // failed fetch keeps its stored entry untouched
        };
        if stored_map.get(name) != Some(digest.as_str()) {
            changed = true;
        }
        new_map.insert(name.to_string(), digest);
    }

    let encoded = new_map.encode();

    if changed {
        return Decision::Restart(PatchDescriptor {
            last_digest: encoded,
            restart_timestamp: Utc::now().to_rfc3339_opts(SecondsFormat::Secs, true),
            pull_policy_containers: pull_policy_overrides(snapshot, options),
        });
    }

    // Canonical encoding is a fixed point, so a byte-identical annotation
    // means there is nothing to persist
    if raw_state != Some(encoded.as_str()) {
        return Decision::UpdateState {
            last_digest: encoded,
        };
    }

    Decision::NoAction
}

async fn fetch_container_digest<R: DigestResolver + Sync>(
    resolver: &R,
    name: &str,
    image: &str,
) -> Option<String> {
    match ImageReference::parse(image) {
        // Pinned references are already content-addressed, nothing to fetch
        Ok(ParsedImage::Pinned { digest }) => Some(digest),
        Ok(ParsedImage::Tagged(reference)) => match resolver.resolve(&reference).await {
            Ok(digest) => Some(digest),
            Err(e) => {
                warn!("Failed to fetch digest for {} ({}): {}", name, image, e);
                None
            }
        },
        Err(e) => {
            warn!("Failed to parse image reference for {} ({}): {}", name, image, e);
            None
        }
    }
}

fn pull_policy_overrides(
    snapshot: &WorkloadSnapshot,
    options: &ReconcileOptions,
) -> BTreeSet<String> {
    if !options.force_pull_policy {
        return BTreeSet::new();
    }
    // Regular containers only; init containers are never forced to re-pull
    snapshot
        .containers
        .iter()
        .filter(|c| !c.init && c.needs_pull_policy_update())
        .map(|c| c.name.clone())
        .collect()
}
