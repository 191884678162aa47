use crate::controller::ControllerContext;
use std::env;
use tokio_cron_scheduler::{Job, JobScheduler};
use tracing::info;

mod annotations;
mod config;
mod controller;
mod digest_state;
mod image_reference;
mod oci_registry;
mod reconciler;
mod secret_string;
mod selector;
mod webserver;
mod workload;

#[cfg(target_env = "musl")]
#[global_allocator]
static GLOBAL: mimalloc::MiMalloc = mimalloc::MiMalloc;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt::init();
    info!("Starting kube-image-updater {}", env!("CARGO_PKG_VERSION"));

    let config_path = env::var("CONFIG_FILE").unwrap_or_else(|_| "config.yaml".to_string());
    let config = config::load_config(&config_path)?;

    let kube_client = controller::create_client().await?;
    let http_client = oci_registry::create_client(&config)?;
    let webserver_port = config.webserver.port;
    let ctx = ControllerContext {
        kube_client,
        config,
        http_client,
    };

    let cron_schedule = env::var("CRON_SCHEDULE").unwrap_or_else(|_| "0 */5 * * * *".to_string());
    info!("Executing job scheduler at cron schedule {}", cron_schedule);
    let scheduler = JobScheduler::new().await?;

    let job = Job::new_async(cron_schedule, move |_uuid, _l| {
        let ctx = ctx.clone();
        Box::pin(async move {
            if let Err(e) = controller::run(ctx).await {
                tracing::error!("Error running controller job: {:?}", e);
            }
        })
    })?;
    scheduler.add(job).await?;
    scheduler.start().await?;

    let app = webserver::create_app();
    let addr = std::net::SocketAddr::from(([0, 0, 0, 0], webserver_port));
    info!("Starting webserver on {}", addr);
    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}
