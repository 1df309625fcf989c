use std::sync::Arc;

use axum::{
    Extension, Json,
    extract::{Path, Query, State},
    http::StatusCode,
    response::IntoResponse,
};

use crate::auth::RequireUser;
use crate::server::AppState;
use crate::server::dto::{
    CreateResourceRequest, ListResourcesParams, PaginationParams, ProjectPlacementRequest,
    ResourceResponse, VisibilityRequest,
};
use crate::server::response::{ApiError, ApiResponse, paginate_by_id};
use crate::server::validation::validate_title;
use crate::service::resources::{self, NewResource, ResourcePatch};
use crate::types::{Resource, ResourceKind};

pub async fn create_resource(
    auth: RequireUser,
    Extension(kind): Extension<ResourceKind>,
    State(state): State<Arc<AppState>>,
    Json(req): Json<CreateResourceRequest>,
) -> impl IntoResponse {
    validate_title(&req.title)?;

    let resource = resources::create(
        state.store.as_ref(),
        &auth.user,
        NewResource {
            kind,
            title: req.title,
            body: req.body,
            is_public: req.is_public,
            project_id: req.project_id,
            estimated_budget: req.estimated_budget,
        },
    )?;

    Ok::<_, ApiError>((StatusCode::CREATED, Json(ApiResponse::success(resource))))
}

/// The caller's own resources of this kind.
pub async fn list_resources(
    auth: RequireUser,
    Extension(kind): Extension<ResourceKind>,
    State(state): State<Arc<AppState>>,
    Query(params): Query<ListResourcesParams>,
) -> impl IntoResponse {
    let store = state.store.as_ref();
    let page = paginate_by_id(
        params.cursor.as_deref(),
        |cursor, limit| {
            resources::list_owned(
                store,
                &auth.user,
                kind,
                params.project_id.as_deref(),
                cursor,
                limit,
            )
        },
        |r: &Resource| r.id.clone(),
    )?;

    Ok::<_, ApiError>(Json(page))
}

pub async fn list_shared_resources(
    auth: RequireUser,
    Extension(kind): Extension<ResourceKind>,
    State(state): State<Arc<AppState>>,
) -> impl IntoResponse {
    let shared = resources::list_shared_with(state.store.as_ref(), &auth.user, kind)?;
    Ok::<_, ApiError>(Json(ApiResponse::success(shared)))
}

pub async fn list_public_resources(
    _auth: RequireUser,
    Extension(kind): Extension<ResourceKind>,
    State(state): State<Arc<AppState>>,
    Query(params): Query<PaginationParams>,
) -> impl IntoResponse {
    let store = state.store.as_ref();
    let page = paginate_by_id(
        params.cursor.as_deref(),
        |cursor, limit| resources::list_public(store, kind, cursor, limit),
        |r: &Resource| r.id.clone(),
    )?;

    Ok::<_, ApiError>(Json(page))
}

pub async fn get_resource(
    auth: RequireUser,
    Extension(kind): Extension<ResourceKind>,
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> impl IntoResponse {
    let (resource, access) = resources::get(state.store.as_ref(), &auth.user, kind, &id)?;

    Ok::<_, ApiError>(Json(ApiResponse::success(ResourceResponse {
        resource,
        access: access.to_strings(),
    })))
}

pub async fn update_resource(
    auth: RequireUser,
    Extension(kind): Extension<ResourceKind>,
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
    Json(patch): Json<ResourcePatch>,
) -> impl IntoResponse {
    if let Some(title) = &patch.title {
        validate_title(title)?;
    }

    let resource = resources::update(state.store.as_ref(), &auth.user, kind, &id, patch)?;
    Ok::<_, ApiError>(Json(ApiResponse::success(resource)))
}

pub async fn delete_resource(
    auth: RequireUser,
    Extension(kind): Extension<ResourceKind>,
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> impl IntoResponse {
    resources::delete(state.store.as_ref(), &auth.user, kind, &id)?;
    Ok::<_, ApiError>(StatusCode::NO_CONTENT)
}

pub async fn set_visibility(
    auth: RequireUser,
    Extension(kind): Extension<ResourceKind>,
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
    Json(req): Json<VisibilityRequest>,
) -> impl IntoResponse {
    let resource =
        resources::set_visibility(state.store.as_ref(), &auth.user, kind, &id, req.is_public)?;
    Ok::<_, ApiError>(Json(ApiResponse::success(resource)))
}

pub async fn set_project(
    auth: RequireUser,
    Extension(kind): Extension<ResourceKind>,
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
    Json(req): Json<ProjectPlacementRequest>,
) -> impl IntoResponse {
    let resource = resources::set_project(
        state.store.as_ref(),
        &auth.user,
        kind,
        &id,
        req.project_id.as_deref(),
    )?;
    Ok::<_, ApiError>(Json(ApiResponse::success(resource)))
}
