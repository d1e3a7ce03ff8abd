use std::collections::BTreeMap;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use sea_orm::{ColumnTrait, EntityTrait, QueryFilter, QueryOrder, QuerySelect};
use serde::Serialize;
use uuid::Uuid;

use crate::{
    db::DbPool,
    entities::{
        stock_level,
        stock_movement::{self, MovementType},
    },
    errors::ServiceError,
};

use super::reconciliation::{build_summary, LedgerSummary};

/// One ledger row as it appears on a report.
#[derive(Debug, Clone, Serialize)]
pub struct LedgerLine {
    pub movement_id: Uuid,
    pub movement_type: MovementType,
    pub quantity: Decimal,
    pub balance_after: Decimal,
    pub unit_cost: Option<Decimal>,
    pub reference_type: Option<String>,
    pub reference_id: Option<Uuid>,
    pub notes: Option<String>,
    pub actor_id: Uuid,
    pub created_at: DateTime<Utc>,
}

/// Windowed statement for one (variation, location) key. The transaction
/// list comes exclusively from the movement ledger; the embedded summary
/// additionally compares it against the current cache value.
#[derive(Debug, Clone, Serialize)]
pub struct LedgerReport {
    pub variation_id: Uuid,
    pub location_id: Uuid,
    pub from: Option<DateTime<Utc>>,
    pub to: Option<DateTime<Utc>>,
    /// Signed quantity totals keyed by movement type.
    pub totals_by_type: BTreeMap<String, Decimal>,
    pub summary: LedgerSummary,
    pub lines: Vec<LedgerLine>,
}

/// Read-only reporting over `stock_movements`. Movement history never comes
/// from any other table; the cache is read only to fill the summary's
/// system quantity.
pub struct LedgerReportService {
    db: Arc<DbPool>,
}

impl LedgerReportService {
    pub fn new(db: Arc<DbPool>) -> Self {
        Self { db }
    }

    /// Builds the statement for a key over an optional inclusive time window.
    pub async fn report(
        &self,
        variation_id: Uuid,
        location_id: Uuid,
        from: Option<DateTime<Utc>>,
        to: Option<DateTime<Utc>>,
    ) -> Result<LedgerReport, ServiceError> {
        if let (Some(from), Some(to)) = (from, to) {
            if from > to {
                return Err(ServiceError::ValidationError(
                    "Report window start must not be after its end".to_string(),
                ));
            }
        }

        let movements = stock_movement::Entity::find()
            .filter(stock_movement::Column::VariationId.eq(variation_id))
            .filter(stock_movement::Column::LocationId.eq(location_id))
            .order_by_asc(stock_movement::Column::CreatedAt)
            .all(self.db.as_ref())
            .await
            .map_err(ServiceError::db_error)?;

        let current_system_quantity = stock_level::Entity::find()
            .filter(stock_level::Column::VariationId.eq(variation_id))
            .filter(stock_level::Column::LocationId.eq(location_id))
            .one(self.db.as_ref())
            .await
            .map_err(ServiceError::db_error)?
            .map(|l| l.qty_available)
            .unwrap_or(Decimal::ZERO);

        let summary = build_summary(
            variation_id,
            location_id,
            from,
            to,
            &movements,
            current_system_quantity,
        );

        let mut totals_by_type: BTreeMap<String, Decimal> = BTreeMap::new();
        let mut lines = Vec::new();

        for movement in movements {
            if from.is_some_and(|start| movement.created_at < start)
                || to.is_some_and(|end| movement.created_at > end)
            {
                continue;
            }
            *totals_by_type
                .entry(movement.movement_type.as_str().to_string())
                .or_insert(Decimal::ZERO) += movement.quantity;

            lines.push(LedgerLine {
                movement_id: movement.id,
                movement_type: movement.movement_type,
                quantity: movement.quantity,
                balance_after: movement.balance_after,
                unit_cost: movement.unit_cost,
                reference_type: movement.reference_type,
                reference_id: movement.reference_id,
                notes: movement.notes,
                actor_id: movement.actor_id,
                created_at: movement.created_at,
            });
        }

        Ok(LedgerReport {
            variation_id,
            location_id,
            from,
            to,
            totals_by_type,
            summary,
            lines,
        })
    }

    /// Latest movements of a business, newest first.
    pub async fn recent_movements(
        &self,
        business_id: Uuid,
        limit: u64,
    ) -> Result<Vec<stock_movement::Model>, ServiceError> {
        stock_movement::Entity::find()
            .filter(stock_movement::Column::BusinessId.eq(business_id))
            .order_by_desc(stock_movement::Column::CreatedAt)
            .limit(limit)
            .all(self.db.as_ref())
            .await
            .map_err(ServiceError::db_error)
    }
}
