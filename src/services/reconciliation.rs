use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use sea_orm::sea_query::Expr;
use sea_orm::{ColumnTrait, EntityTrait, QueryFilter, QueryOrder, TransactionTrait};
use serde::Serialize;
use serde_json::json;
use tracing::{info, warn};
use uuid::Uuid;

use crate::{
    audit::AuditEmitter,
    db::DbPool,
    entities::{product_variation, stock_level, stock_movement},
    errors::ServiceError,
};

use super::{map_txn_err, with_timeout};

/// Variances strictly below this are treated as reconciled.
pub const DRIFT_EPSILON: Decimal = Decimal::from_parts(1, 0, 0, false, 4);

/// Relative difference above 10% marks a discrepancy critical.
const CRITICAL_RELATIVE_DIFFERENCE: Decimal = Decimal::from_parts(1, 0, 0, false, 1);
/// Absolute difference above 5 units marks a discrepancy critical.
const CRITICAL_ABSOLUTE_DIFFERENCE: Decimal = Decimal::from_parts(5, 0, 0, false, 0);

/// Windowed ledger-versus-cache comparison for one (variation, location) key.
///
/// Two different ledger-derived quantities are compared against the cache:
/// `last_transaction_balance` (the snapshot of the last entry in the window)
/// drives `is_reconciled`, while `calculated_final_balance` (opening balance
/// plus the replayed net change) drives `variance`. A cache that tracks a
/// corrupt snapshot chain is therefore reconciled yet shows variance, and a
/// stale cache over a healthy chain shows both.
#[derive(Debug, Clone, Serialize)]
pub struct LedgerSummary {
    pub variation_id: Uuid,
    pub location_id: Uuid,
    pub from: Option<DateTime<Utc>>,
    pub to: Option<DateTime<Utc>>,
    /// Snapshot of the last entry strictly before the window; zero if none.
    pub opening_balance: Decimal,
    /// Sum of positive in-window quantities.
    pub total_in: Decimal,
    /// Sum of negative in-window quantities, reported as a positive number.
    pub total_out: Decimal,
    /// `total_in - total_out`.
    pub net_change: Decimal,
    pub movement_count: u64,
    /// `opening_balance + net_change`.
    pub calculated_final_balance: Decimal,
    /// Snapshot of the last in-window entry; `opening_balance` if none.
    pub last_transaction_balance: Decimal,
    pub current_system_quantity: Decimal,
    /// `current_system_quantity - calculated_final_balance`.
    pub variance: Decimal,
    /// `|current_system_quantity - last_transaction_balance| < epsilon`.
    pub is_reconciled: bool,
}

/// Builds the summary from a key's full chronological ledger. Pure; shared
/// with the report builder so both surfaces agree on the numbers.
pub(crate) fn build_summary(
    variation_id: Uuid,
    location_id: Uuid,
    from: Option<DateTime<Utc>>,
    to: Option<DateTime<Utc>>,
    movements: &[stock_movement::Model],
    current_system_quantity: Decimal,
) -> LedgerSummary {
    let mut opening_balance = Decimal::ZERO;
    let mut total_in = Decimal::ZERO;
    let mut total_out = Decimal::ZERO;
    let mut movement_count = 0u64;
    let mut last_in_window = None;

    for movement in movements {
        if from.is_some_and(|start| movement.created_at < start) {
            opening_balance = movement.balance_after;
            continue;
        }
        if to.is_some_and(|end| movement.created_at > end) {
            continue;
        }
        if movement.quantity > Decimal::ZERO {
            total_in += movement.quantity;
        } else {
            total_out += -movement.quantity;
        }
        movement_count += 1;
        last_in_window = Some(movement.balance_after);
    }

    let net_change = total_in - total_out;
    let calculated_final_balance = opening_balance + net_change;
    let last_transaction_balance = last_in_window.unwrap_or(opening_balance);

    LedgerSummary {
        variation_id,
        location_id,
        from,
        to,
        opening_balance,
        total_in,
        total_out,
        net_change,
        movement_count,
        calculated_final_balance,
        last_transaction_balance,
        current_system_quantity,
        variance: current_system_quantity - calculated_final_balance,
        is_reconciled: (current_system_quantity - last_transaction_balance).abs() < DRIFT_EPSILON,
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum DiscrepancySeverity {
    Minor,
    Critical,
}

/// One drifted key found by a full audit.
#[derive(Debug, Clone, Serialize)]
pub struct Discrepancy {
    pub variation_id: Uuid,
    pub location_id: Uuid,
    pub cached_quantity: Decimal,
    pub ledger_quantity: Decimal,
    /// `cached_quantity - ledger_quantity`.
    pub difference: Decimal,
    /// `|difference| / |ledger_quantity|`; absent when the ledger nets to zero.
    pub relative_difference: Option<Decimal>,
    /// `|difference|` valued at the variation's unit cost.
    pub monetary_impact: Decimal,
    pub severity: DiscrepancySeverity,
}

/// Business-wide audit result: the drifted keys plus their aggregate size.
#[derive(Debug, Clone, Serialize)]
pub struct AuditReport {
    pub business_id: Uuid,
    pub keys_checked: u64,
    /// Sum of `|difference|` over all discrepancies.
    pub total_unit_variance: Decimal,
    /// Sum of `monetary_impact` over all discrepancies.
    pub total_monetary_variance: Decimal,
    /// Sorted by monetary impact, largest first.
    pub discrepancies: Vec<Discrepancy>,
}

/// Read-side verification that the balance cache still agrees with the
/// ledger, plus the repair path when it does not.
pub struct ReconciliationService {
    db: Arc<DbPool>,
    audit: AuditEmitter,
    txn_budget: Duration,
}

impl ReconciliationService {
    pub fn new(db: Arc<DbPool>, audit: AuditEmitter, txn_budget: Duration) -> Self {
        Self {
            db,
            audit,
            txn_budget,
        }
    }

    /// Replays the ledger for one key over an optional inclusive window and
    /// compares against the cache.
    pub async fn summarize(
        &self,
        variation_id: Uuid,
        location_id: Uuid,
        from: Option<DateTime<Utc>>,
        to: Option<DateTime<Utc>>,
    ) -> Result<LedgerSummary, ServiceError> {
        if let (Some(from), Some(to)) = (from, to) {
            if from > to {
                return Err(ServiceError::ValidationError(
                    "Reconciliation window start must not be after its end".to_string(),
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

        Ok(build_summary(
            variation_id,
            location_id,
            from,
            to,
            &movements,
            current_system_quantity,
        ))
    }

    /// Audits every key of a business from genesis: the drifted ones come
    /// back ranked by monetary impact (largest first), with aggregate unit
    /// and monetary variance totals.
    pub async fn audit_all(&self, business_id: Uuid) -> Result<AuditReport, ServiceError> {
        let movements = stock_movement::Entity::find()
            .filter(stock_movement::Column::BusinessId.eq(business_id))
            .order_by_asc(stock_movement::Column::CreatedAt)
            .all(self.db.as_ref())
            .await
            .map_err(ServiceError::db_error)?;

        let mut ledger: HashMap<(Uuid, Uuid), Decimal> = HashMap::new();
        let mut last_movement_cost: HashMap<Uuid, Decimal> = HashMap::new();
        for movement in &movements {
            *ledger
                .entry((movement.variation_id, movement.location_id))
                .or_insert(Decimal::ZERO) += movement.quantity;
            if let Some(cost) = movement.unit_cost {
                last_movement_cost.insert(movement.variation_id, cost);
            }
        }

        let levels = stock_level::Entity::find()
            .filter(stock_level::Column::BusinessId.eq(business_id))
            .all(self.db.as_ref())
            .await
            .map_err(ServiceError::db_error)?;

        let variations = product_variation::Entity::find()
            .filter(product_variation::Column::BusinessId.eq(business_id))
            .all(self.db.as_ref())
            .await
            .map_err(ServiceError::db_error)?;
        let default_costs: HashMap<Uuid, Option<Decimal>> = variations
            .into_iter()
            .map(|v| (v.id, v.default_unit_cost))
            .collect();

        let mut cached: HashMap<(Uuid, Uuid), Decimal> = HashMap::new();
        for level in &levels {
            cached.insert((level.variation_id, level.location_id), level.qty_available);
        }
        // Keys with movements but no cache row count as cached zero.
        for key in ledger.keys() {
            cached.entry(*key).or_insert(Decimal::ZERO);
        }

        let keys_checked = cached.len() as u64;
        let mut discrepancies = Vec::new();
        for ((variation_id, location_id), cached_quantity) in cached {
            let ledger_quantity = ledger
                .get(&(variation_id, location_id))
                .copied()
                .unwrap_or(Decimal::ZERO);
            let difference = cached_quantity - ledger_quantity;
            if difference.abs() < DRIFT_EPSILON {
                continue;
            }

            let relative_difference = if ledger_quantity != Decimal::ZERO {
                Some(difference.abs() / ledger_quantity.abs())
            } else {
                None
            };
            let severity = if relative_difference.is_some_and(|r| r > CRITICAL_RELATIVE_DIFFERENCE)
                || difference.abs() > CRITICAL_ABSOLUTE_DIFFERENCE
            {
                DiscrepancySeverity::Critical
            } else {
                DiscrepancySeverity::Minor
            };
            // Valued at the variation's declared cost, falling back to the
            // cost on its most recent costed movement.
            let unit_cost = default_costs
                .get(&variation_id)
                .copied()
                .flatten()
                .or_else(|| last_movement_cost.get(&variation_id).copied())
                .unwrap_or(Decimal::ZERO);

            discrepancies.push(Discrepancy {
                variation_id,
                location_id,
                cached_quantity,
                ledger_quantity,
                difference,
                relative_difference,
                monetary_impact: difference.abs() * unit_cost,
                severity,
            });
        }

        discrepancies.sort_by(|a, b| b.monetary_impact.cmp(&a.monetary_impact));
        let total_unit_variance: Decimal = discrepancies.iter().map(|d| d.difference.abs()).sum();
        let total_monetary_variance: Decimal =
            discrepancies.iter().map(|d| d.monetary_impact).sum();

        if !discrepancies.is_empty() {
            warn!(
                "Reconciliation found {} drifted keys for business {}",
                discrepancies.len(),
                business_id
            );
        }
        Ok(AuditReport {
            business_id,
            keys_checked,
            total_unit_variance,
            total_monetary_variance,
            discrepancies,
        })
    }

    /// Overwrites the cache row for a key with the ledger truth. The ledger
    /// itself is never touched; this is the only cache write outside the
    /// stock operation path.
    pub async fn rebuild_level(
        &self,
        variation_id: Uuid,
        location_id: Uuid,
        actor_id: Uuid,
    ) -> Result<stock_level::Model, ServiceError> {
        let (level, previous_qty) = with_timeout(self.txn_budget, async {
            self.db
                .transaction::<_, (stock_level::Model, Option<Decimal>), ServiceError>(move |txn| {
                    Box::pin(async move {
                        let movements = stock_movement::Entity::find()
                            .filter(stock_movement::Column::VariationId.eq(variation_id))
                            .filter(stock_movement::Column::LocationId.eq(location_id))
                            .all(txn)
                            .await
                            .map_err(ServiceError::db_error)?;

                        let truth: Decimal = movements.iter().map(|m| m.quantity).sum();

                        let level = stock_level::Entity::find()
                            .filter(stock_level::Column::VariationId.eq(variation_id))
                            .filter(stock_level::Column::LocationId.eq(location_id))
                            .one(txn)
                            .await
                            .map_err(ServiceError::db_error)?;

                        match (level, movements.first()) {
                            (Some(level), _) => {
                                let updated = stock_level::Entity::update_many()
                                    .col_expr(
                                        stock_level::Column::QtyAvailable,
                                        Expr::value(truth),
                                    )
                                    .col_expr(
                                        stock_level::Column::Version,
                                        Expr::col(stock_level::Column::Version).add(1),
                                    )
                                    .col_expr(
                                        stock_level::Column::UpdatedAt,
                                        Expr::value(Utc::now()),
                                    )
                                    .filter(stock_level::Column::Id.eq(level.id))
                                    .filter(stock_level::Column::Version.eq(level.version))
                                    .exec(txn)
                                    .await
                                    .map_err(ServiceError::db_error)?;
                                if updated.rows_affected == 0 {
                                    return Err(ServiceError::ConcurrentModification(level.id));
                                }

                                let refreshed = stock_level::Entity::find_by_id(level.id)
                                    .one(txn)
                                    .await
                                    .map_err(ServiceError::db_error)?
                                    .ok_or_else(|| {
                                        ServiceError::NotFound(format!(
                                            "Stock level {} not found",
                                            level.id
                                        ))
                                    })?;
                                Ok((refreshed, Some(level.qty_available)))
                            }
                            (None, Some(first)) => {
                                use sea_orm::{ActiveModelTrait, Set};
                                let now = Utc::now();
                                let inserted = stock_level::ActiveModel {
                                    id: Set(Uuid::new_v4()),
                                    business_id: Set(first.business_id),
                                    product_id: Set(first.product_id),
                                    variation_id: Set(variation_id),
                                    location_id: Set(location_id),
                                    qty_available: Set(truth),
                                    selling_price: Set(None),
                                    version: Set(1),
                                    created_at: Set(now),
                                    updated_at: Set(now),
                                }
                                .insert(txn)
                                .await
                                .map_err(ServiceError::db_error)?;
                                Ok((inserted, None))
                            }
                            (None, None) => Err(ServiceError::NotFound(format!(
                                "No movements or stock level for variation {} at location {}",
                                variation_id, location_id
                            ))),
                        }
                    })
                })
                .await
                .map_err(map_txn_err)
        })
        .await?;

        info!(
            "Stock level rebuilt from ledger: variation={}, location={}, quantity={}",
            variation_id, location_id, level.qty_available
        );
        self.audit
            .record_change(
                "reconciliation.rebuild",
                actor_id,
                json!({
                    "variation_id": variation_id,
                    "location_id": location_id,
                    "qty_available": previous_qty,
                }),
                json!({
                    "variation_id": variation_id,
                    "location_id": location_id,
                    "qty_available": level.qty_available,
                }),
            )
            .await;

        Ok(level)
    }
}
