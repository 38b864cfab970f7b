//! convoy control plane
//!
//! The control plane is the submission and lifecycle service of the
//! orchestrator: it accepts job submissions, owns queue administration, and
//! mediates cancellation and reprioritization against the job store and the
//! event log.

use std::sync::Arc;

use anyhow::Result;
use tracing::info;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use convoy_control_plane::api;
use convoy_control_plane::auth::{ActionAuthorizer, PrincipalAuthorizer};
use convoy_control_plane::config::Config;
use convoy_control_plane::model::{Quantity, ResourceList};
use convoy_control_plane::repository::mem::{
    FixedSchedulingInfoRepository, MemEventStore, MemJobRepository, MemQueueRepository,
};
use convoy_control_plane::scheduling::{ClusterSchedulingInfo, NodeTypeCapacity};
use convoy_control_plane::state::AppState;

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize tracing
    tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| "info".into()))
        .with(tracing_subscriber::fmt::layer().json())
        .init();

    info!("Starting convoy control plane");

    let config = Config::from_env()?;
    info!(listen_addr = %config.listen_addr, dev_mode = config.dev_mode, "Configuration loaded");

    // The bundled in-memory backends serve development and testing;
    // production deployments wire real repository implementations here.
    let queue_repository = Arc::new(MemQueueRepository::new());
    let job_repository = Arc::new(MemJobRepository::new());
    let event_store = Arc::new(MemEventStore::new());
    let scheduling_info = Arc::new(FixedSchedulingInfoRepository::new(vec![dev_cluster()]));

    let authorizer: Arc<dyn ActionAuthorizer> = if config.dev_mode {
        info!("Dev mode: every principal holds every global permission");
        Arc::new(PrincipalAuthorizer::allow_everyone())
    } else {
        Arc::new(PrincipalAuthorizer::for_admin_groups(
            config.admin_groups.clone(),
        ))
    };

    let state = AppState::new(
        config.submission.clone(),
        config.scheduling.clone(),
        queue_repository,
        job_repository,
        event_store,
        scheduling_info,
        authorizer,
    );

    let app = api::create_router(state);

    let listener = tokio::net::TcpListener::bind(&config.listen_addr).await?;
    info!(addr = %config.listen_addr, "Listening for connections");

    axum::serve(listener, app).await?;

    Ok(())
}

/// A generously sized single-cluster profile for local development.
fn dev_cluster() -> ClusterSchedulingInfo {
    ClusterSchedulingInfo {
        cluster: "dev".to_string(),
        node_types: vec![NodeTypeCapacity {
            labels: Default::default(),
            allocatable: ResourceList::from([
                ("cpu".to_string(), Quantity(1024.0)),
                ("memory".to_string(), Quantity(4.0 * 1024.0 * 1024.0 * 1024.0 * 1024.0)),
            ]),
        }],
    }
}
