use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    Json,
};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::{
    entities::stock_movement,
    errors::ServiceError,
    services::stock_operations::{
        AddStockRequest, RemoveStockRequest, TransferResult, TransferStockRequest,
    },
    AppState,
};

pub async fn add_stock(
    State(state): State<AppState>,
    Json(req): Json<AddStockRequest>,
) -> Result<(StatusCode, Json<stock_movement::Model>), ServiceError> {
    let movement = state.services.stock_ops.add_stock(req).await?;
    Ok((StatusCode::CREATED, Json(movement)))
}

pub async fn remove_stock(
    State(state): State<AppState>,
    Json(req): Json<RemoveStockRequest>,
) -> Result<(StatusCode, Json<stock_movement::Model>), ServiceError> {
    let movement = state.services.stock_ops.remove_stock(req).await?;
    Ok((StatusCode::CREATED, Json(movement)))
}

pub async fn transfer_stock(
    State(state): State<AppState>,
    Json(req): Json<TransferStockRequest>,
) -> Result<(StatusCode, Json<TransferResult>), ServiceError> {
    let result = state.services.stock_ops.transfer_stock(req).await?;
    Ok((StatusCode::CREATED, Json(result)))
}

#[derive(Debug, Deserialize)]
pub struct VoidMovementRequest {
    pub actor_id: Uuid,
    pub notes: Option<String>,
}

pub async fn void_movement(
    State(state): State<AppState>,
    Path(movement_id): Path<Uuid>,
    Json(req): Json<VoidMovementRequest>,
) -> Result<(StatusCode, Json<stock_movement::Model>), ServiceError> {
    let reversal = state
        .services
        .stock_ops
        .void_stock(movement_id, req.actor_id, req.notes)
        .await?;
    Ok((StatusCode::CREATED, Json(reversal)))
}

pub async fn get_movement(
    State(state): State<AppState>,
    Path(movement_id): Path<Uuid>,
) -> Result<Json<stock_movement::Model>, ServiceError> {
    let movement = state.services.stock_ops.get_movement(movement_id).await?;
    Ok(Json(movement))
}

#[derive(Debug, Deserialize)]
pub struct LevelQuery {
    pub variation_id: Uuid,
    pub location_id: Uuid,
}

#[derive(Debug, Serialize)]
pub struct LevelResponse {
    pub variation_id: Uuid,
    pub location_id: Uuid,
    pub qty_available: Decimal,
}

pub async fn get_level(
    State(state): State<AppState>,
    Query(query): Query<LevelQuery>,
) -> Result<Json<LevelResponse>, ServiceError> {
    let qty_available = state
        .services
        .stock_ops
        .current_balance(query.variation_id, query.location_id)
        .await?;
    Ok(Json(LevelResponse {
        variation_id: query.variation_id,
        location_id: query.location_id,
        qty_available,
    }))
}

#[derive(Debug, Serialize)]
pub struct PurgeResponse {
    pub purged: u64,
}

pub async fn purge_idempotency(
    State(state): State<AppState>,
) -> Result<Json<PurgeResponse>, ServiceError> {
    let purged = state.services.idempotency.purge_expired().await?;
    Ok(Json(PurgeResponse { purged }))
}
