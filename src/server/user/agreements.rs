use std::sync::Arc;

use axum::{
    Json,
    extract::{Path, Query, State},
    http::StatusCode,
    response::IntoResponse,
};
use chrono::Utc;

use crate::auth::RequireUser;
use crate::server::AppState;
use crate::server::dto::{AgreementLookupParams, ProposeAgreementRequest};
use crate::server::response::{ApiError, ApiResponse};
use crate::service::agreements::{self, NewAgreement};

pub async fn propose_agreement(
    auth: RequireUser,
    State(state): State<Arc<AppState>>,
    Json(req): Json<ProposeAgreementRequest>,
) -> impl IntoResponse {
    let agreement = agreements::propose(
        state.store.as_ref(),
        &auth.user,
        NewAgreement {
            request_id: req.request_id,
            developer_id: req.developer_id,
            client_id: req.client_id,
            price: req.price,
            terms: req.terms,
        },
    )?;
    Ok::<_, ApiError>((StatusCode::CREATED, Json(ApiResponse::success(agreement))))
}

pub async fn get_agreement(
    auth: RequireUser,
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> impl IntoResponse {
    let agreement = agreements::get(state.store.as_ref(), &auth.user, &id)?;
    Ok::<_, ApiError>(Json(ApiResponse::success(agreement)))
}

pub async fn get_agreement_by_request(
    auth: RequireUser,
    State(state): State<Arc<AppState>>,
    Query(params): Query<AgreementLookupParams>,
) -> impl IntoResponse {
    let agreement =
        agreements::get_by_request(state.store.as_ref(), &auth.user, &params.request_id)?;
    Ok::<_, ApiError>(Json(ApiResponse::success(agreement)))
}

pub async fn accept_agreement(
    auth: RequireUser,
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> impl IntoResponse {
    let agreement = agreements::accept(state.store.as_ref(), &auth.user, &id, Utc::now())?;
    Ok::<_, ApiError>(Json(ApiResponse::success(agreement)))
}
