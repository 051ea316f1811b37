use std::sync::Arc;

use anyhow::Context;
use common_auth::IdentityBuilder;
use project_service::app_state::{AppState, RoutePolicy};
use project_service::config::ServiceConfig;
use project_service::metrics::ServiceMetrics;
use project_service::store::ProjectStore;
use project_service::{build_router, cors_layer};
use tokio::net::TcpListener;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let config = ServiceConfig::from_env()?;
    if !config.oidc.require_auth {
        warn!("REQUIRE_AUTH disabled; requests without credentials are served anonymously");
    }

    let identity = IdentityBuilder::from_config(&config.oidc)
        .context("failed to build identity builder")?;
    if identity.verifier().cache().is_configured() {
        // The provider may still be starting; the first request retries the fetch.
        if let Err(err) = identity.verifier().warm_up().await {
            warn!(error = %err, "initial JWKS fetch failed");
        }
    }

    let metrics = ServiceMetrics::new().context("failed to register metrics")?;
    let state = AppState::new(
        Arc::new(identity),
        Arc::new(ProjectStore::new()),
        Arc::new(metrics),
        RoutePolicy {
            workflow_roles: config.workflow_roles.clone(),
            admin_roles: config.admin_roles.clone(),
        },
    );
    let app = build_router(state).layer(cors_layer(&config.cors_allowed_origins));

    let addr = config.addr();
    let listener = TcpListener::bind(addr)
        .await
        .with_context(|| format!("failed to bind {addr}"))?;
    info!(%addr, "starting project-service");
    axum::serve(listener, app).await?;
    Ok(())
}
