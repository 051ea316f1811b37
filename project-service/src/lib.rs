pub mod app_state;
pub mod auth;
pub mod config;
pub mod handlers;
pub mod metrics;
pub mod store;

use axum::http::header::{ACCEPT, AUTHORIZATION, CONTENT_TYPE};
use axum::http::{HeaderValue, Method};
use axum::routing::{get, post};
use axum::Router;
use tower_http::cors::{AllowOrigin, CorsLayer};

use crate::app_state::AppState;
use crate::handlers::{
    create_project, health, list_projects, me, metrics, start_workflow, workflow_results,
};

pub fn build_router(state: AppState) -> Router {
    Router::new()
        .route("/", get(health))
        .route("/metrics", get(metrics))
        .route("/me", get(me))
        .route("/projects", get(list_projects).post(create_project))
        .route("/projects/:id/workflow-results", get(workflow_results))
        .route("/projects/:id/workflow", post(start_workflow))
        .with_state(state)
}

pub fn cors_layer(allowed_origins: &[String]) -> CorsLayer {
    CorsLayer::new()
        .allow_origin(AllowOrigin::list(
            allowed_origins
                .iter()
                .filter_map(|origin| origin.parse::<HeaderValue>().ok())
                .collect::<Vec<_>>(),
        ))
        .allow_methods([Method::GET, Method::POST, Method::OPTIONS])
        .allow_headers([ACCEPT, AUTHORIZATION, CONTENT_TYPE])
}
