use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::response::Response;
use axum::Json;
use common_auth::User;
use common_http_errors::{ApiError, ApiResult};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use tracing::info;

use crate::app_state::AppState;
use crate::auth::Caller;
use crate::store::{analyze, Project, WorkflowResult, DEFAULT_PAGE_SIZE};

pub async fn health() -> Json<Value> {
    Json(json!({ "status": "ok" }))
}

pub async fn metrics(State(state): State<AppState>) -> ApiResult<Response> {
    state
        .metrics
        .render()
        .map_err(|err| ApiError::internal(err, None))
}

#[derive(Debug, Deserialize)]
pub struct ListParams {
    #[serde(default)]
    pub skip: usize,
    #[serde(default = "default_limit")]
    pub limit: usize,
    pub owner: Option<String>,
}

fn default_limit() -> usize {
    DEFAULT_PAGE_SIZE
}

pub async fn list_projects(
    State(state): State<AppState>,
    _caller: Caller,
    Query(params): Query<ListParams>,
) -> Json<Vec<Project>> {
    let owner = params.owner.as_deref().map(str::trim).filter(|owner| !owner.is_empty());
    Json(state.store.list(params.skip, params.limit, owner).await)
}

pub async fn workflow_results(
    State(state): State<AppState>,
    _caller: Caller,
    Path(project_id): Path<u64>,
) -> Json<Vec<WorkflowResult>> {
    Json(state.store.results_for(project_id).await)
}

#[derive(Debug, Serialize)]
pub struct WorkflowStarted {
    pub message: String,
    pub result: WorkflowResult,
}

pub async fn start_workflow(
    State(state): State<AppState>,
    caller: Caller,
    Path(project_id): Path<u64>,
) -> ApiResult<(StatusCode, Json<WorkflowStarted>)> {
    caller.require(&state, "start_workflow", &state.policy.workflow_roles)?;

    let project = state
        .store
        .get(project_id)
        .await
        .ok_or_else(|| ApiError::not_found("project_not_found"))?;
    let result = analyze(&project);
    state.store.record_result(result.clone()).await;
    info!(
        project_id,
        subject = caller.0.subject().unwrap_or("anonymous"),
        location = %result.location,
        "workflow completed"
    );

    let message = format!(
        "Workflow started for project {project_id}, result: {}, stored at {}",
        result.analysis, result.location
    );
    Ok((StatusCode::ACCEPTED, Json(WorkflowStarted { message, result })))
}

#[derive(Debug, Deserialize)]
pub struct CreateProject {
    pub name: String,
}

pub async fn create_project(
    State(state): State<AppState>,
    caller: Caller,
    Json(body): Json<CreateProject>,
) -> ApiResult<(StatusCode, Json<Project>)> {
    caller.require(&state, "create_project", &state.policy.admin_roles)?;

    let name = body.name.trim();
    if name.is_empty() {
        return Err(ApiError::BadRequest {
            code: "invalid_project_name",
            trace_id: None,
            message: Some("name must not be empty".into()),
        });
    }
    let owner = caller
        .0
        .user
        .as_ref()
        .map(|user| user.username.clone().unwrap_or_else(|| user.subject.clone()))
        .unwrap_or_else(|| "anonymous".to_string());

    let project = state.store.create(name, owner).await;
    Ok((StatusCode::CREATED, Json(project)))
}

pub async fn me(caller: Caller) -> Json<Option<User>> {
    Json(caller.0.user)
}
