use crate::annotations::{FIELD_MANAGER, LAST_DIGEST_ANNOTATION, RESTART_ANNOTATION};
use crate::reconciler::PatchDescriptor;
use anyhow::Context;
use k8s_openapi::NamespaceResourceScope;
use k8s_openapi::api::apps::v1::{DaemonSet, Deployment, StatefulSet};
use k8s_openapi::api::core::v1::{Container, PodTemplateSpec};
use kube::api::{Patch, PatchParams};
use kube::{Api, Resource};
use serde::de::DeserializeOwned;
use serde_json::{Value, json};
use std::collections::BTreeMap;
use std::fmt;
use std::fmt::Debug;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ContainerInfo {
    pub name: String,
    pub image: String,
    pub image_pull_policy: Option<String>,
    pub init: bool,
}

impl ContainerInfo {
    /// True when a restart with the force-pull feature enabled should set
    /// imagePullPolicy=Always on this container.
    pub fn needs_pull_policy_update(&self) -> bool {
        self.image_pull_policy.as_deref() != Some("Always")
    }
}

/// Point-in-time view of a workload, rebuilt from the live object on every
/// cycle. Nothing here is cached across cycles; the only persistent state is
/// the digest map inside `annotations`.
#[derive(Debug, Clone)]
pub struct WorkloadSnapshot {
    pub kind: &'static str,
    pub namespace: String,
    pub name: String,
    pub annotations: BTreeMap<String, String>,
    pub containers: Vec<ContainerInfo>,
    pub init_containers: Vec<ContainerInfo>,
}

impl fmt::Display for WorkloadSnapshot {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}/{}", self.kind, self.namespace, self.name)
    }
}

/// Builds the patch for a restart decision. The digest annotation and the
/// pod-template restart trigger always travel in the same patch so the API
/// server applies them atomically.
///
/// This must be a strategic merge patch: `containers` is a keyed list merged
/// by name under strategic semantics, while an RFC 7386 merge patch would
/// replace the whole array with the pull-policy override entries.
pub fn restart_patch(descriptor: &PatchDescriptor) -> Patch<Value> {
    let mut patch = json!({
        "metadata": {
            "annotations": {
                LAST_DIGEST_ANNOTATION: descriptor.last_digest,
            }
        },
        "spec": {
            "template": {
                "metadata": {
                    "annotations": {
                        RESTART_ANNOTATION: descriptor.restart_timestamp,
                    }
                }
            }
        }
    });

    if !descriptor.pull_policy_containers.is_empty() {
        let containers: Vec<Value> = descriptor
            .pull_policy_containers
            .iter()
            .map(|name| json!({"name": name, "imagePullPolicy": "Always"}))
            .collect();
        patch["spec"]["template"]["spec"] = json!({ "containers": containers });
    }

    Patch::Strategic(patch)
}

/// Annotation-only rewrite (legacy migration, stale-entry cleanup). Never
/// touches the pod template, so no rollout happens. A plain merge patch is
/// enough here since only scalar annotation values are written.
pub fn state_patch(last_digest: &str) -> Patch<Value> {
    Patch::Merge(json!({
        "metadata": {
            "annotations": {
                LAST_DIGEST_ANNOTATION: last_digest,
            }
        }
    }))
}

pub trait Workload
where
    Self: Resource<DynamicType = (), Scope = NamespaceResourceScope>
        + Clone
        + Debug
        + Send
        + Sync
        + DeserializeOwned
        + 'static,
{
    fn kind_name() -> &'static str {
        std::any::type_name::<Self>().split("::").last().unwrap()
    }

    fn annotations(&self) -> Option<&BTreeMap<String, String>>;
    fn pod_template(&self) -> Option<&PodTemplateSpec>;

    fn snapshot(&self) -> anyhow::Result<WorkloadSnapshot> {
        let meta = self.meta();
        let name = meta.name.clone().context("workload has no name")?;
        let namespace = meta.namespace.clone().unwrap_or_default();
        let pod_spec = self
            .pod_template()
            .and_then(|t| t.spec.as_ref())
            .with_context(|| format!("{} {} has no pod template spec", Self::kind_name(), name))?;

        Ok(WorkloadSnapshot {
            kind: Self::kind_name(),
            namespace,
            name,
            annotations: self.annotations().cloned().unwrap_or_default(),
            containers: parse_containers(&pod_spec.containers, false),
            init_containers: pod_spec
                .init_containers
                .as_deref()
                .map(|cs| parse_containers(cs, true))
                .unwrap_or_default(),
        })
    }

    async fn apply_patch(
        api: &Api<Self>,
        resource_name: &str,
        patch: &Patch<Value>,
    ) -> anyhow::Result<()> {
        tracing::debug!(
            "Patching {} {} with patch {:?}",
            Self::kind_name(),
            resource_name,
            patch
        );
        api.patch(resource_name, &PatchParams::apply(FIELD_MANAGER), patch)
            .await
            .with_context(|| format!("Failed to patch {} {}", Self::kind_name(), resource_name))?;
        Ok(())
    }
}

fn parse_containers(containers: &[Container], init: bool) -> Vec<ContainerInfo> {
    containers
        .iter()
        .filter_map(|c| {
            let image = c.image.clone()?;
            Some(ContainerInfo {
                name: c.name.clone(),
                image,
                image_pull_policy: c.image_pull_policy.clone(),
                init,
            })
        })
        .collect()
}

impl Workload for Deployment {
    fn annotations(&self) -> Option<&BTreeMap<String, String>> {
        self.metadata.annotations.as_ref()
    }

    fn pod_template(&self) -> Option<&PodTemplateSpec> {
        self.spec.as_ref().map(|s| &s.template)
    }
}

impl Workload for StatefulSet {
    fn annotations(&self) -> Option<&BTreeMap<String, String>> {
        self.metadata.annotations.as_ref()
    }

    fn pod_template(&self) -> Option<&PodTemplateSpec> {
        self.spec.as_ref().map(|s| &s.template)
    }
}

impl Workload for DaemonSet {
    fn annotations(&self) -> Option<&BTreeMap<String, String>> {
        self.metadata.annotations.as_ref()
    }

    fn pod_template(&self) -> Option<&PodTemplateSpec> {
        self.spec.as_ref().map(|s| &s.template)
    }
}
