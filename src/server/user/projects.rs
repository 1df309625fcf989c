use std::sync::Arc;

use axum::{
    Json,
    extract::{Path, State},
    http::StatusCode,
    response::IntoResponse,
};

use crate::auth::RequireUser;
use crate::server::AppState;
use crate::server::dto::CreateProjectRequest;
use crate::server::response::{ApiError, ApiResponse};
use crate::server::validation::validate_project_name;
use crate::service::projects;

pub async fn create_project(
    auth: RequireUser,
    State(state): State<Arc<AppState>>,
    Json(req): Json<CreateProjectRequest>,
) -> impl IntoResponse {
    validate_project_name(&req.name)?;

    let project = projects::create(state.store.as_ref(), &auth.user, req.name, req.description)?;
    Ok::<_, ApiError>((StatusCode::CREATED, Json(ApiResponse::success(project))))
}

pub async fn list_projects(
    auth: RequireUser,
    State(state): State<Arc<AppState>>,
) -> impl IntoResponse {
    let summaries = projects::list(state.store.as_ref(), &auth.user)?;
    Ok::<_, ApiError>(Json(ApiResponse::success(summaries)))
}

pub async fn get_project(
    auth: RequireUser,
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> impl IntoResponse {
    let store = state.store.as_ref();
    let project = projects::get(store, &auth.user, &id)?;
    let summary = projects::summarize(store, project)?;
    Ok::<_, ApiError>(Json(ApiResponse::success(summary)))
}
