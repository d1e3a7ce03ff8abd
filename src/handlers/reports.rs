use axum::{
    extract::{Query, State},
    Json,
};
use chrono::{DateTime, Utc};
use serde::Deserialize;
use uuid::Uuid;

use crate::{
    entities::{stock_level, stock_movement},
    errors::ServiceError,
    services::{
        ledger_report::LedgerReport,
        reconciliation::{AuditReport, LedgerSummary},
    },
    AppState,
};

#[derive(Debug, Deserialize)]
pub struct SummaryQuery {
    pub variation_id: Uuid,
    pub location_id: Uuid,
    pub from: Option<DateTime<Utc>>,
    pub to: Option<DateTime<Utc>>,
}

pub async fn reconciliation_summary(
    State(state): State<AppState>,
    Query(query): Query<SummaryQuery>,
) -> Result<Json<LedgerSummary>, ServiceError> {
    let summary = state
        .services
        .reconciliation
        .summarize(query.variation_id, query.location_id, query.from, query.to)
        .await?;
    Ok(Json(summary))
}

#[derive(Debug, Deserialize)]
pub struct AuditQuery {
    pub business_id: Uuid,
}

pub async fn reconciliation_audit(
    State(state): State<AppState>,
    Query(query): Query<AuditQuery>,
) -> Result<Json<AuditReport>, ServiceError> {
    let report = state
        .services
        .reconciliation
        .audit_all(query.business_id)
        .await?;
    Ok(Json(report))
}

#[derive(Debug, Deserialize)]
pub struct RebuildRequest {
    pub variation_id: Uuid,
    pub location_id: Uuid,
    pub actor_id: Uuid,
}

pub async fn rebuild_level(
    State(state): State<AppState>,
    Json(req): Json<RebuildRequest>,
) -> Result<Json<stock_level::Model>, ServiceError> {
    let level = state
        .services
        .reconciliation
        .rebuild_level(req.variation_id, req.location_id, req.actor_id)
        .await?;
    Ok(Json(level))
}

#[derive(Debug, Deserialize)]
pub struct LedgerReportQuery {
    pub variation_id: Uuid,
    pub location_id: Uuid,
    pub from: Option<DateTime<Utc>>,
    pub to: Option<DateTime<Utc>>,
}

pub async fn ledger_report(
    State(state): State<AppState>,
    Query(query): Query<LedgerReportQuery>,
) -> Result<Json<LedgerReport>, ServiceError> {
    let report = state
        .services
        .reports
        .report(query.variation_id, query.location_id, query.from, query.to)
        .await?;
    Ok(Json(report))
}

const DEFAULT_MOVEMENT_LIMIT: u64 = 50;

#[derive(Debug, Deserialize)]
pub struct RecentMovementsQuery {
    pub business_id: Uuid,
    pub limit: Option<u64>,
}

pub async fn recent_movements(
    State(state): State<AppState>,
    Query(query): Query<RecentMovementsQuery>,
) -> Result<Json<Vec<stock_movement::Model>>, ServiceError> {
    let movements = state
        .services
        .reports
        .recent_movements(
            query.business_id,
            query.limit.unwrap_or(DEFAULT_MOVEMENT_LIMIT),
        )
        .await?;
    Ok(Json(movements))
}
