use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use rust_decimal::Decimal;
use sea_orm::sea_query::Expr;
use sea_orm::{
    ActiveModelTrait, ColumnTrait, ConnectionTrait, EntityTrait, QueryFilter, Set, TransactionTrait,
};
use serde::{Deserialize, Serialize};
use serde_json::json;
use tracing::info;
use uuid::Uuid;

use crate::{
    audit::AuditEmitter,
    db::DbPool,
    entities::{
        stock_level,
        stock_movement::{self, MovementType},
    },
    errors::ServiceError,
    events::{Event, EventSender},
};

use super::{
    ensure_active_location, ensure_variation, map_txn_err, serial_inventory, with_timeout,
    IdempotencyGuard,
};

pub const REFERENCE_TYPE_TRANSFER: &str = "stock_transfer";
pub const REFERENCE_TYPE_VOID: &str = "void";

/// What to do when a removal would drive a balance below zero.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum NegativeStockPolicy {
    /// Fail the operation; the balance never goes negative.
    #[default]
    Reject,
    /// Let the balance go negative (oversell / backorder).
    Backorder,
}

#[derive(Debug, Clone, Deserialize)]
pub struct AddStockRequest {
    pub business_id: Uuid,
    pub location_id: Uuid,
    pub variation_id: Uuid,
    /// Must be an inbound type: `purchase` or `customer_return`.
    pub movement_type: MovementType,
    pub quantity: Decimal,
    pub unit_cost: Option<Decimal>,
    pub reference_type: Option<String>,
    pub reference_id: Option<Uuid>,
    pub notes: Option<String>,
    pub actor_id: Uuid,
}

#[derive(Debug, Clone, Deserialize)]
pub struct RemoveStockRequest {
    pub business_id: Uuid,
    pub location_id: Uuid,
    pub variation_id: Uuid,
    /// Must be an outbound type: `sale` or `supplier_return`.
    pub movement_type: MovementType,
    /// Positive amount to remove; the ledger row is written with a negative sign.
    pub quantity: Decimal,
    pub unit_cost: Option<Decimal>,
    pub reference_type: Option<String>,
    pub reference_id: Option<Uuid>,
    pub notes: Option<String>,
    pub actor_id: Uuid,
    /// Required (and exactly matching quantity) for serialized variations.
    #[serde(default)]
    pub serial_numbers: Vec<String>,
    /// Overrides the service-wide negative-stock policy when set.
    pub policy: Option<NegativeStockPolicy>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct TransferStockRequest {
    pub business_id: Uuid,
    pub from_location_id: Uuid,
    pub to_location_id: Uuid,
    pub variation_id: Uuid,
    pub quantity: Decimal,
    pub notes: Option<String>,
    pub actor_id: Uuid,
    #[serde(default)]
    pub serial_numbers: Vec<String>,
}

/// Result of a transfer: the paired ledger rows, linked by a shared reference id.
#[derive(Debug, Clone, Serialize)]
pub struct TransferResult {
    pub transfer_id: Uuid,
    pub outbound: stock_movement::Model,
    pub inbound: stock_movement::Model,
}

/// Fully resolved movement ready to be applied inside a transaction.
pub(crate) struct MovementSpec {
    pub business_id: Uuid,
    pub location_id: Uuid,
    pub product_id: Uuid,
    pub variation_id: Uuid,
    pub movement_type: MovementType,
    /// Signed delta.
    pub quantity: Decimal,
    pub unit_cost: Option<Decimal>,
    pub reference: Option<(String, Uuid)>,
    pub notes: Option<String>,
    pub actor_id: Uuid,
    pub policy: NegativeStockPolicy,
}

/// The only writer of `stock_movements` and `stock_levels`. Every mutation is
/// one transaction: ledger row plus cache update commit together or not at all.
pub struct StockOperationService {
    db: Arc<DbPool>,
    events: EventSender,
    audit: AuditEmitter,
    idempotency: Arc<IdempotencyGuard>,
    txn_budget: Duration,
    default_policy: NegativeStockPolicy,
}

impl StockOperationService {
    pub fn new(
        db: Arc<DbPool>,
        events: EventSender,
        audit: AuditEmitter,
        idempotency: Arc<IdempotencyGuard>,
        txn_budget: Duration,
        default_policy: NegativeStockPolicy,
    ) -> Self {
        Self {
            db,
            events,
            audit,
            idempotency,
            txn_budget,
            default_policy,
        }
    }

    /// Records inbound stock (purchase or customer return) and raises the
    /// cached balance.
    pub async fn add_stock(
        &self,
        req: AddStockRequest,
    ) -> Result<stock_movement::Model, ServiceError> {
        if !matches!(
            req.movement_type,
            MovementType::Purchase | MovementType::CustomerReturn
        ) {
            return Err(ServiceError::InvalidOperation(format!(
                "Movement type '{}' is not an inbound type",
                req.movement_type.as_str()
            )));
        }
        ensure_positive_quantity(req.quantity)?;

        let scope = IdempotencyGuard::scope_key(&[
            "add",
            req.movement_type.as_str(),
            &req.actor_id.to_string(),
            &req.variation_id.to_string(),
            &req.location_id.to_string(),
            &req.quantity.to_string(),
        ]);

        let idempotency = self.idempotency.clone();
        let default_policy = self.default_policy;
        let txn_req = req.clone();

        let movement = with_timeout(self.txn_budget, async {
            self.db
                .transaction::<_, stock_movement::Model, ServiceError>(move |txn| {
                    Box::pin(async move {
                        idempotency.check_in(txn, &scope).await?;
                        let variation = ensure_variation(txn, txn_req.variation_id).await?;
                        ensure_active_location(txn, txn_req.location_id).await?;

                        let movement = apply_movement(
                            txn,
                            MovementSpec {
                                business_id: txn_req.business_id,
                                location_id: txn_req.location_id,
                                product_id: variation.product_id,
                                variation_id: txn_req.variation_id,
                                movement_type: txn_req.movement_type,
                                quantity: txn_req.quantity,
                                unit_cost: txn_req.unit_cost.or(variation.default_unit_cost),
                                reference: reference_pair(
                                    txn_req.reference_type,
                                    txn_req.reference_id,
                                ),
                                notes: txn_req.notes,
                                actor_id: txn_req.actor_id,
                                policy: default_policy,
                            },
                        )
                        .await?;

                        idempotency.record_in(txn, &scope, movement.id).await?;
                        Ok(movement)
                    })
                })
                .await
                .map_err(map_txn_err)
        })
        .await?;

        info!(
            "Stock added: movement={}, variation={}, location={}, quantity={}",
            movement.id, movement.variation_id, movement.location_id, movement.quantity
        );
        let _ = self
            .events
            .send(Event::StockAdded {
                movement_id: movement.id,
                variation_id: movement.variation_id,
                location_id: movement.location_id,
                quantity: movement.quantity,
                balance_after: movement.balance_after,
            })
            .await;
        self.audit
            .record(
                "stock.add",
                req.actor_id,
                json!({
                    "movement_id": movement.id,
                    "movement_type": movement.movement_type.as_str(),
                    "quantity": movement.quantity,
                    "balance_after": movement.balance_after,
                }),
            )
            .await;

        Ok(movement)
    }

    /// Records outbound stock (sale or supplier return). Serialized variations
    /// must list exactly `quantity` serial numbers; their units change status
    /// in the same transaction as the ledger row.
    pub async fn remove_stock(
        &self,
        req: RemoveStockRequest,
    ) -> Result<stock_movement::Model, ServiceError> {
        if !matches!(
            req.movement_type,
            MovementType::Sale | MovementType::SupplierReturn
        ) {
            return Err(ServiceError::InvalidOperation(format!(
                "Movement type '{}' is not an outbound type",
                req.movement_type.as_str()
            )));
        }
        ensure_positive_quantity(req.quantity)?;

        let scope = IdempotencyGuard::scope_key(&[
            "remove",
            req.movement_type.as_str(),
            &req.actor_id.to_string(),
            &req.variation_id.to_string(),
            &req.location_id.to_string(),
            &req.quantity.to_string(),
        ]);

        let idempotency = self.idempotency.clone();
        let policy = req.policy.unwrap_or(self.default_policy);
        let txn_req = req.clone();

        let movement = with_timeout(self.txn_budget, async {
            self.db
                .transaction::<_, stock_movement::Model, ServiceError>(move |txn| {
                    Box::pin(async move {
                        idempotency.check_in(txn, &scope).await?;
                        let variation = ensure_variation(txn, txn_req.variation_id).await?;
                        ensure_active_location(txn, txn_req.location_id).await?;

                        if variation.is_serialized {
                            ensure_serial_count(txn_req.quantity, &txn_req.serial_numbers)?;
                        } else if !txn_req.serial_numbers.is_empty() {
                            return Err(ServiceError::InvalidOperation(format!(
                                "Variation {} is not serialized",
                                variation.id
                            )));
                        }

                        let movement = apply_movement(
                            txn,
                            MovementSpec {
                                business_id: txn_req.business_id,
                                location_id: txn_req.location_id,
                                product_id: variation.product_id,
                                variation_id: txn_req.variation_id,
                                movement_type: txn_req.movement_type,
                                quantity: -txn_req.quantity,
                                unit_cost: txn_req.unit_cost.or(variation.default_unit_cost),
                                reference: reference_pair(
                                    txn_req.reference_type,
                                    txn_req.reference_id,
                                ),
                                notes: txn_req.notes,
                                actor_id: txn_req.actor_id,
                                policy,
                            },
                        )
                        .await?;

                        if variation.is_serialized {
                            serial_inventory::mark_units_removed(
                                txn,
                                txn_req.business_id,
                                txn_req.variation_id,
                                txn_req.location_id,
                                &txn_req.serial_numbers,
                                &movement,
                                txn_req.actor_id,
                            )
                            .await?;
                        }

                        idempotency.record_in(txn, &scope, movement.id).await?;
                        Ok(movement)
                    })
                })
                .await
                .map_err(map_txn_err)
        })
        .await?;

        info!(
            "Stock removed: movement={}, variation={}, location={}, quantity={}",
            movement.id, movement.variation_id, movement.location_id, movement.quantity
        );
        let _ = self
            .events
            .send(Event::StockRemoved {
                movement_id: movement.id,
                variation_id: movement.variation_id,
                location_id: movement.location_id,
                quantity: movement.quantity,
                balance_after: movement.balance_after,
            })
            .await;
        self.audit
            .record(
                "stock.remove",
                req.actor_id,
                json!({
                    "movement_id": movement.id,
                    "movement_type": movement.movement_type.as_str(),
                    "quantity": movement.quantity,
                    "balance_after": movement.balance_after,
                }),
            )
            .await;

        Ok(movement)
    }

    /// Moves stock between two locations atomically: a `transfer_out` row at
    /// the source and a `transfer_in` row at the destination share one
    /// transfer id. Transfers never oversell regardless of policy.
    pub async fn transfer_stock(
        &self,
        req: TransferStockRequest,
    ) -> Result<TransferResult, ServiceError> {
        if req.from_location_id == req.to_location_id {
            return Err(ServiceError::InvalidOperation(
                "Source and destination locations must differ".to_string(),
            ));
        }
        ensure_positive_quantity(req.quantity)?;

        let scope = IdempotencyGuard::scope_key(&[
            "transfer",
            &req.actor_id.to_string(),
            &req.variation_id.to_string(),
            &req.from_location_id.to_string(),
            &req.to_location_id.to_string(),
            &req.quantity.to_string(),
        ]);

        let idempotency = self.idempotency.clone();
        let transfer_id = Uuid::new_v4();
        let txn_req = req.clone();

        let result = with_timeout(self.txn_budget, async {
            self.db
                .transaction::<_, TransferResult, ServiceError>(move |txn| {
                    Box::pin(async move {
                        idempotency.check_in(txn, &scope).await?;
                        let variation = ensure_variation(txn, txn_req.variation_id).await?;
                        ensure_active_location(txn, txn_req.from_location_id).await?;
                        ensure_active_location(txn, txn_req.to_location_id).await?;

                        if variation.is_serialized {
                            ensure_serial_count(txn_req.quantity, &txn_req.serial_numbers)?;
                        } else if !txn_req.serial_numbers.is_empty() {
                            return Err(ServiceError::InvalidOperation(format!(
                                "Variation {} is not serialized",
                                variation.id
                            )));
                        }

                        let out_spec = MovementSpec {
                            business_id: txn_req.business_id,
                            location_id: txn_req.from_location_id,
                            product_id: variation.product_id,
                            variation_id: txn_req.variation_id,
                            movement_type: MovementType::TransferOut,
                            quantity: -txn_req.quantity,
                            unit_cost: variation.default_unit_cost,
                            reference: Some((REFERENCE_TYPE_TRANSFER.to_string(), transfer_id)),
                            notes: txn_req.notes.clone(),
                            actor_id: txn_req.actor_id,
                            policy: NegativeStockPolicy::Reject,
                        };
                        let in_spec = MovementSpec {
                            business_id: txn_req.business_id,
                            location_id: txn_req.to_location_id,
                            product_id: variation.product_id,
                            variation_id: txn_req.variation_id,
                            movement_type: MovementType::TransferIn,
                            quantity: txn_req.quantity,
                            unit_cost: variation.default_unit_cost,
                            reference: Some((REFERENCE_TYPE_TRANSFER.to_string(), transfer_id)),
                            notes: txn_req.notes.clone(),
                            actor_id: txn_req.actor_id,
                            policy: NegativeStockPolicy::Reject,
                        };

                        // Touch the two cache rows in a deterministic order so
                        // concurrent opposite transfers cannot deadlock.
                        let (outbound, inbound) =
                            if txn_req.from_location_id <= txn_req.to_location_id {
                                let out = apply_movement(txn, out_spec).await?;
                                let inb = apply_movement(txn, in_spec).await?;
                                (out, inb)
                            } else {
                                let inb = apply_movement(txn, in_spec).await?;
                                let out = apply_movement(txn, out_spec).await?;
                                (out, inb)
                            };

                        if variation.is_serialized {
                            serial_inventory::move_units(
                                txn,
                                txn_req.business_id,
                                txn_req.variation_id,
                                txn_req.from_location_id,
                                txn_req.to_location_id,
                                &txn_req.serial_numbers,
                                transfer_id,
                                txn_req.actor_id,
                            )
                            .await?;
                        }

                        idempotency.record_in(txn, &scope, transfer_id).await?;
                        Ok(TransferResult {
                            transfer_id,
                            outbound,
                            inbound,
                        })
                    })
                })
                .await
                .map_err(map_txn_err)
        })
        .await?;

        info!(
            "Stock transferred: transfer={}, variation={}, from={}, to={}, quantity={}",
            result.transfer_id,
            req.variation_id,
            req.from_location_id,
            req.to_location_id,
            req.quantity
        );
        let _ = self
            .events
            .send(Event::StockTransferred {
                out_movement_id: result.outbound.id,
                in_movement_id: result.inbound.id,
                variation_id: req.variation_id,
                from_location_id: req.from_location_id,
                to_location_id: req.to_location_id,
                quantity: req.quantity,
            })
            .await;
        self.audit
            .record(
                "stock.transfer",
                req.actor_id,
                json!({
                    "transfer_id": result.transfer_id,
                    "out_movement_id": result.outbound.id,
                    "in_movement_id": result.inbound.id,
                    "quantity": req.quantity,
                }),
            )
            .await;

        Ok(result)
    }

    /// Reverses a committed movement with an opposite-signed `adjustment` row.
    /// A movement can be voided at most once; transfer legs cannot be voided
    /// individually (issue a reverse transfer instead).
    pub async fn void_stock(
        &self,
        movement_id: Uuid,
        actor_id: Uuid,
        notes: Option<String>,
    ) -> Result<stock_movement::Model, ServiceError> {
        let reversal = with_timeout(self.txn_budget, async {
            self.db
                .transaction::<_, stock_movement::Model, ServiceError>(move |txn| {
                    Box::pin(async move {
                        let original = stock_movement::Entity::find_by_id(movement_id)
                            .one(txn)
                            .await
                            .map_err(ServiceError::db_error)?
                            .ok_or_else(|| {
                                ServiceError::NotFound(format!(
                                    "Stock movement {} not found",
                                    movement_id
                                ))
                            })?;

                        if original.reference_type.as_deref() == Some(REFERENCE_TYPE_VOID) {
                            return Err(ServiceError::InvalidOperation(
                                "A void reversal cannot itself be voided".to_string(),
                            ));
                        }
                        if matches!(
                            original.movement_type,
                            MovementType::TransferIn | MovementType::TransferOut
                        ) {
                            return Err(ServiceError::InvalidOperation(
                                "Transfer legs cannot be voided individually".to_string(),
                            ));
                        }

                        let already_voided = stock_movement::Entity::find()
                            .filter(
                                stock_movement::Column::ReferenceType.eq(REFERENCE_TYPE_VOID),
                            )
                            .filter(stock_movement::Column::ReferenceId.eq(original.id))
                            .one(txn)
                            .await
                            .map_err(ServiceError::db_error)?;
                        if already_voided.is_some() {
                            return Err(ServiceError::InvalidOperation(format!(
                                "Movement {} has already been voided",
                                original.id
                            )));
                        }

                        let reversal = apply_movement(
                            txn,
                            MovementSpec {
                                business_id: original.business_id,
                                location_id: original.location_id,
                                product_id: original.product_id,
                                variation_id: original.variation_id,
                                movement_type: MovementType::Adjustment,
                                quantity: -original.quantity,
                                unit_cost: original.unit_cost,
                                reference: Some((REFERENCE_TYPE_VOID.to_string(), original.id)),
                                notes,
                                actor_id,
                                // Reversals always apply; the ledger must stay invertible.
                                policy: NegativeStockPolicy::Backorder,
                            },
                        )
                        .await?;

                        serial_inventory::restore_removed_units(txn, &original, &reversal, actor_id)
                            .await?;

                        Ok(reversal)
                    })
                })
                .await
                .map_err(map_txn_err)
        })
        .await?;

        info!(
            "Stock movement voided: original={}, reversal={}",
            movement_id, reversal.id
        );
        let _ = self
            .events
            .send(Event::StockVoided {
                original_movement_id: movement_id,
                reversal_movement_id: reversal.id,
                variation_id: reversal.variation_id,
                location_id: reversal.location_id,
            })
            .await;
        self.audit
            .record(
                "stock.void",
                actor_id,
                json!({
                    "original_movement_id": movement_id,
                    "reversal_movement_id": reversal.id,
                    "quantity": reversal.quantity,
                }),
            )
            .await;

        Ok(reversal)
    }

    /// Current cached balance for a key, zero when the key has never moved.
    pub async fn current_balance(
        &self,
        variation_id: Uuid,
        location_id: Uuid,
    ) -> Result<Decimal, ServiceError> {
        let level = stock_level::Entity::find()
            .filter(stock_level::Column::VariationId.eq(variation_id))
            .filter(stock_level::Column::LocationId.eq(location_id))
            .one(self.db.as_ref())
            .await
            .map_err(ServiceError::db_error)?;
        Ok(level.map(|l| l.qty_available).unwrap_or(Decimal::ZERO))
    }

    pub async fn get_movement(
        &self,
        movement_id: Uuid,
    ) -> Result<stock_movement::Model, ServiceError> {
        stock_movement::Entity::find_by_id(movement_id)
            .one(self.db.as_ref())
            .await
            .map_err(ServiceError::db_error)?
            .ok_or_else(|| {
                ServiceError::NotFound(format!("Stock movement {} not found", movement_id))
            })
    }
}

fn ensure_positive_quantity(quantity: Decimal) -> Result<(), ServiceError> {
    if quantity <= Decimal::ZERO {
        return Err(ServiceError::ValidationError(
            "Quantity must be positive".to_string(),
        ));
    }
    Ok(())
}

fn ensure_serial_count(quantity: Decimal, serials: &[String]) -> Result<(), ServiceError> {
    if quantity.fract() != Decimal::ZERO {
        return Err(ServiceError::ValidationError(
            "Serialized quantities must be whole numbers".to_string(),
        ));
    }
    if Decimal::from(serials.len()) != quantity {
        return Err(ServiceError::ValidationError(format!(
            "Expected {} serial numbers, got {}",
            quantity,
            serials.len()
        )));
    }
    let mut seen = std::collections::HashSet::new();
    for serial in serials {
        if !seen.insert(serial.as_str()) {
            return Err(ServiceError::ValidationError(format!(
                "Duplicate serial number '{}'",
                serial
            )));
        }
    }
    Ok(())
}

fn reference_pair(
    reference_type: Option<String>,
    reference_id: Option<Uuid>,
) -> Option<(String, Uuid)> {
    match (reference_type, reference_id) {
        (Some(kind), Some(id)) => Some((kind, id)),
        _ => None,
    }
}

/// Applies one signed movement: writes the ledger row with its balance
/// snapshot and brings the cache row along under an optimistic version guard.
/// Callers own the surrounding transaction.
pub(crate) async fn apply_movement<C: ConnectionTrait>(
    conn: &C,
    spec: MovementSpec,
) -> Result<stock_movement::Model, ServiceError> {
    if spec.quantity == Decimal::ZERO {
        return Err(ServiceError::ValidationError(
            "Movement quantity must be non-zero".to_string(),
        ));
    }

    let level = stock_level::Entity::find()
        .filter(stock_level::Column::VariationId.eq(spec.variation_id))
        .filter(stock_level::Column::LocationId.eq(spec.location_id))
        .one(conn)
        .await
        .map_err(ServiceError::db_error)?;

    let current = level
        .as_ref()
        .map(|l| l.qty_available)
        .unwrap_or(Decimal::ZERO);
    let new_balance = current + spec.quantity;

    if new_balance < Decimal::ZERO && spec.policy == NegativeStockPolicy::Reject {
        return Err(ServiceError::InsufficientStock(format!(
            "Available {} at location {}, requested {}",
            current,
            spec.location_id,
            spec.quantity.abs()
        )));
    }

    let now = Utc::now();
    let movement = stock_movement::ActiveModel {
        id: Set(Uuid::new_v4()),
        business_id: Set(spec.business_id),
        location_id: Set(spec.location_id),
        product_id: Set(spec.product_id),
        variation_id: Set(spec.variation_id),
        movement_type: Set(spec.movement_type),
        quantity: Set(spec.quantity),
        balance_after: Set(new_balance),
        unit_cost: Set(spec.unit_cost),
        reference_type: Set(spec.reference.as_ref().map(|(kind, _)| kind.clone())),
        reference_id: Set(spec.reference.as_ref().map(|(_, id)| *id)),
        notes: Set(spec.notes),
        actor_id: Set(spec.actor_id),
        created_at: Set(now),
    }
    .insert(conn)
    .await
    .map_err(ServiceError::db_error)?;

    match level {
        Some(level) => {
            let updated = stock_level::Entity::update_many()
                .col_expr(stock_level::Column::QtyAvailable, Expr::value(new_balance))
                .col_expr(
                    stock_level::Column::Version,
                    Expr::col(stock_level::Column::Version).add(1),
                )
                .col_expr(stock_level::Column::UpdatedAt, Expr::value(now))
                .filter(stock_level::Column::Id.eq(level.id))
                .filter(stock_level::Column::Version.eq(level.version))
                .exec(conn)
                .await
                .map_err(ServiceError::db_error)?;

            if updated.rows_affected == 0 {
                return Err(ServiceError::ConcurrentModification(level.id));
            }
        }
        None => {
            stock_level::ActiveModel {
                id: Set(Uuid::new_v4()),
                business_id: Set(spec.business_id),
                product_id: Set(spec.product_id),
                variation_id: Set(spec.variation_id),
                location_id: Set(spec.location_id),
                qty_available: Set(new_balance),
                selling_price: Set(None),
                version: Set(1),
                created_at: Set(now),
                updated_at: Set(now),
            }
            .insert(conn)
            .await
            .map_err(ServiceError::db_error)?;
        }
    }

    Ok(movement)
}
