use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    Json,
};
use serde::Deserialize;
use uuid::Uuid;

use crate::{
    entities::{
        serial_movement,
        serial_unit::{self, SerialStatus},
    },
    errors::ServiceError,
    services::serial_inventory::ReceiveSerializedRequest,
    AppState,
};

pub async fn receive(
    State(state): State<AppState>,
    Json(req): Json<ReceiveSerializedRequest>,
) -> Result<(StatusCode, Json<Vec<serial_unit::Model>>), ServiceError> {
    let units = state.services.serials.receive_serialized(req).await?;
    Ok((StatusCode::CREATED, Json(units)))
}

#[derive(Debug, Deserialize)]
pub struct FindUnitQuery {
    pub business_id: Uuid,
    pub variation_id: Uuid,
    pub serial_number: String,
}

pub async fn find_unit(
    State(state): State<AppState>,
    Query(query): Query<FindUnitQuery>,
) -> Result<Json<serial_unit::Model>, ServiceError> {
    let unit = state
        .services
        .serials
        .find_unit(query.business_id, query.variation_id, &query.serial_number)
        .await?;
    Ok(Json(unit))
}

#[derive(Debug, Deserialize)]
pub struct ListUnitsQuery {
    pub variation_id: Uuid,
    pub location_id: Uuid,
    pub status: Option<SerialStatus>,
}

pub async fn list_units(
    State(state): State<AppState>,
    Query(query): Query<ListUnitsQuery>,
) -> Result<Json<Vec<serial_unit::Model>>, ServiceError> {
    let units = state
        .services
        .serials
        .list_units(query.variation_id, query.location_id, query.status)
        .await?;
    Ok(Json(units))
}

pub async fn history(
    State(state): State<AppState>,
    Path(serial_unit_id): Path<Uuid>,
) -> Result<Json<Vec<serial_movement::Model>>, ServiceError> {
    let movements = state.services.serials.history(serial_unit_id).await?;
    Ok(Json(movements))
}
