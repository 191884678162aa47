use crate::config::Config;
use crate::oci_registry::{DigestResolver, RegistryClient};
use crate::reconciler::{Decision, ReconcileOptions, reconcile};
use crate::workload::{Workload, restart_patch, state_patch};
use k8s_openapi::api::apps::v1::{DaemonSet, Deployment, StatefulSet};
use kube::api::ListParams;
use kube::{Api, Client};
use tracing::{debug, error, info};

#[derive(Clone)]
pub struct ControllerContext {
    pub kube_client: Client,
    pub config: Config,
    pub http_client: reqwest::Client,
}

pub async fn create_client() -> anyhow::Result<Client> {
    info!("Initializing K8s controller");
    let client = Client::try_default().await?;
    let api_server_info = client.apiserver_version().await?;
    info!(
        "Connected to namespace {}, in-cluster Kubernetes API server with version {}.{}",
        client.default_namespace(),
        api_server_info.major,
        api_server_info.minor
    );
    Ok(client)
}

/// One scheduler tick: reconcile every supported workload kind in the
/// operated namespace. Errors are scoped to the kind or workload they hit
/// and never abort the tick; the next tick re-evaluates everything from
/// fresh state.
pub async fn run(ctx: ControllerContext) -> anyhow::Result<()> {
    let resolver = RegistryClient::new(ctx.http_client.clone(), ctx.config.clone());
    let options = ReconcileOptions {
        force_pull_policy: ctx.config.feature_flags.force_pull_policy,
    };

    // A kind whose list call fails must not keep the other kinds from
    // being reconciled this tick
    if let Err(e) = reconcile_kind::<Deployment>(&ctx, &resolver, &options).await {
        error!("Failed to reconcile Deployments: {:#}", e);
    }
    if let Err(e) = reconcile_kind::<StatefulSet>(&ctx, &resolver, &options).await {
        error!("Failed to reconcile StatefulSets: {:#}", e);
    }
    if let Err(e) = reconcile_kind::<DaemonSet>(&ctx, &resolver, &options).await {
        error!("Failed to reconcile DaemonSets: {:#}", e);
    }

    Ok(())
}

async fn reconcile_kind<W: Workload>(
    ctx: &ControllerContext,
    resolver: &(impl DigestResolver + Sync),
    options: &ReconcileOptions,
) -> anyhow::Result<()> {
    let api: Api<W> = Api::default_namespaced(ctx.kube_client.clone());
    let list = api.list(&ListParams::default()).await?;

    info!(
        "Scanning {} {} resource(s) for digest changes",
        list.items.len(),
        W::kind_name()
    );

    for item in list.items {
        // Each workload gets a fresh snapshot; nothing carries over between
        // cycles except its own annotations
        let snapshot = match item.snapshot() {
            Ok(snapshot) => snapshot,
            Err(e) => {
                debug!("Skipping {}: {:#}", W::kind_name(), e);
                continue;
            }
        };

        match reconcile(&snapshot, resolver, options).await {
            Decision::NoAction => debug!("{}: nothing to do", snapshot),
            Decision::UpdateState { last_digest } => {
                info!("{}: rewriting digest annotation without restart", snapshot);
                if let Err(e) =
                    W::apply_patch(&api, &snapshot.name, &state_patch(&last_digest)).await
                {
                    error!("{}: {:#}", snapshot, e);
                }
            }
            Decision::Restart(descriptor) => {
                info!(
                    "{}: image(s) changed, triggering rollout with digest map {}",
                    snapshot, descriptor.last_digest
                );
                if let Err(e) =
                    W::apply_patch(&api, &snapshot.name, &restart_patch(&descriptor)).await
                {
                    // Patch conflicts included; the next tick retries from
                    // fresh state
                    error!("{}: {:#}", snapshot, e);
                }
            }
        }
    }

    Ok(())
}
