use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    Json,
};
use serde::Deserialize;
use uuid::Uuid;

use crate::{
    entities::stock_correction::{self, CorrectionStatus},
    errors::ServiceError,
    services::corrections::CreateCorrectionRequest,
    AppState,
};

pub async fn create(
    State(state): State<AppState>,
    Json(req): Json<CreateCorrectionRequest>,
) -> Result<(StatusCode, Json<stock_correction::Model>), ServiceError> {
    let correction = state.services.corrections.create(req).await?;
    Ok((StatusCode::CREATED, Json(correction)))
}

pub async fn get(
    State(state): State<AppState>,
    Path(correction_id): Path<Uuid>,
) -> Result<Json<stock_correction::Model>, ServiceError> {
    let correction = state.services.corrections.get(correction_id).await?;
    Ok(Json(correction))
}

#[derive(Debug, Deserialize)]
pub struct ListQuery {
    pub business_id: Uuid,
    pub status: Option<CorrectionStatus>,
}

pub async fn list(
    State(state): State<AppState>,
    Query(query): Query<ListQuery>,
) -> Result<Json<Vec<stock_correction::Model>>, ServiceError> {
    let corrections = state
        .services
        .corrections
        .list(query.business_id, query.status)
        .await?;
    Ok(Json(corrections))
}

#[derive(Debug, Deserialize)]
pub struct ApproveRequest {
    pub approver_id: Uuid,
}

pub async fn approve(
    State(state): State<AppState>,
    Path(correction_id): Path<Uuid>,
    Json(req): Json<ApproveRequest>,
) -> Result<Json<stock_correction::Model>, ServiceError> {
    let correction = state
        .services
        .corrections
        .approve(correction_id, req.approver_id)
        .await?;
    Ok(Json(correction))
}

#[derive(Debug, Deserialize)]
pub struct DeleteRequest {
    pub actor_id: Uuid,
}

pub async fn delete(
    State(state): State<AppState>,
    Path(correction_id): Path<Uuid>,
    Json(req): Json<DeleteRequest>,
) -> Result<Json<stock_correction::Model>, ServiceError> {
    let correction = state
        .services
        .corrections
        .delete(correction_id, req.actor_id)
        .await?;
    Ok(Json(correction))
}
