use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use rust_decimal::Decimal;
use sea_orm::{
    ActiveModelTrait, ColumnTrait, ConnectionTrait, EntityTrait, QueryFilter, QueryOrder, Set,
    TransactionTrait,
};
use serde::Deserialize;
use serde_json::json;
use tracing::info;
use uuid::Uuid;

use crate::{
    audit::AuditEmitter,
    db::DbPool,
    entities::{
        serial_movement::{self, SerialMovementType},
        serial_unit::{self, SerialStatus},
        stock_movement::{self, MovementType},
    },
    errors::ServiceError,
    events::{Event, EventSender},
};

use super::{
    ensure_active_location, ensure_variation, map_txn_err,
    stock_operations::{apply_movement, MovementSpec, NegativeStockPolicy, REFERENCE_TYPE_TRANSFER},
    with_timeout,
};

pub const REFERENCE_TYPE_STOCK_MOVEMENT: &str = "stock_movement";

#[derive(Debug, Clone, Deserialize)]
pub struct ReceiveSerializedRequest {
    pub business_id: Uuid,
    pub location_id: Uuid,
    pub variation_id: Uuid,
    pub serial_numbers: Vec<String>,
    pub unit_cost: Option<Decimal>,
    pub notes: Option<String>,
    pub actor_id: Uuid,
}

/// Per-unit tracking for serialized variations. Unit state transitions are
/// driven by the stock operations they accompany; this service owns receipt
/// and the read side.
pub struct SerialInventoryService {
    db: Arc<DbPool>,
    events: EventSender,
    audit: AuditEmitter,
    txn_budget: Duration,
}

impl SerialInventoryService {
    pub fn new(
        db: Arc<DbPool>,
        events: EventSender,
        audit: AuditEmitter,
        txn_budget: Duration,
    ) -> Self {
        Self {
            db,
            events,
            audit,
            txn_budget,
        }
    }

    /// Receives serialized units into a location: one `purchase` ledger row
    /// for the batch, one unit row plus `received` movement per serial. The
    /// unit row is inserted before its movement, always.
    pub async fn receive_serialized(
        &self,
        req: ReceiveSerializedRequest,
    ) -> Result<Vec<serial_unit::Model>, ServiceError> {
        if req.serial_numbers.is_empty() {
            return Err(ServiceError::ValidationError(
                "At least one serial number is required".to_string(),
            ));
        }
        let mut seen = std::collections::HashSet::new();
        for serial in &req.serial_numbers {
            if serial.trim().is_empty() {
                return Err(ServiceError::ValidationError(
                    "Serial numbers must not be empty".to_string(),
                ));
            }
            if !seen.insert(serial.as_str()) {
                return Err(ServiceError::ValidationError(format!(
                    "Duplicate serial number '{}'",
                    serial
                )));
            }
        }

        let txn_req = req.clone();
        let units = with_timeout(self.txn_budget, async {
            self.db
                .transaction::<_, Vec<serial_unit::Model>, ServiceError>(move |txn| {
                    Box::pin(async move {
                        let variation = ensure_variation(txn, txn_req.variation_id).await?;
                        if !variation.is_serialized {
                            return Err(ServiceError::InvalidOperation(format!(
                                "Variation {} is not serialized",
                                variation.id
                            )));
                        }
                        ensure_active_location(txn, txn_req.location_id).await?;

                        let existing = serial_unit::Entity::find()
                            .filter(serial_unit::Column::BusinessId.eq(txn_req.business_id))
                            .filter(serial_unit::Column::VariationId.eq(txn_req.variation_id))
                            .filter(
                                serial_unit::Column::SerialNumber
                                    .is_in(txn_req.serial_numbers.clone()),
                            )
                            .all(txn)
                            .await
                            .map_err(ServiceError::db_error)?;
                        if let Some(dup) = existing.first() {
                            return Err(ServiceError::InvalidOperation(format!(
                                "Serial number '{}' already exists for variation {}",
                                dup.serial_number, txn_req.variation_id
                            )));
                        }

                        let movement = apply_movement(
                            txn,
                            MovementSpec {
                                business_id: txn_req.business_id,
                                location_id: txn_req.location_id,
                                product_id: variation.product_id,
                                variation_id: txn_req.variation_id,
                                movement_type: MovementType::Purchase,
                                quantity: Decimal::from(txn_req.serial_numbers.len()),
                                unit_cost: txn_req.unit_cost.or(variation.default_unit_cost),
                                reference: None,
                                notes: txn_req.notes,
                                actor_id: txn_req.actor_id,
                                policy: NegativeStockPolicy::Reject,
                            },
                        )
                        .await?;

                        let now = Utc::now();
                        let mut units = Vec::with_capacity(txn_req.serial_numbers.len());
                        for serial in &txn_req.serial_numbers {
                            let unit = serial_unit::ActiveModel {
                                id: Set(Uuid::new_v4()),
                                business_id: Set(txn_req.business_id),
                                variation_id: Set(txn_req.variation_id),
                                serial_number: Set(serial.clone()),
                                status: Set(SerialStatus::InStock),
                                current_location_id: Set(txn_req.location_id),
                                origin_reference_type: Set(Some(
                                    REFERENCE_TYPE_STOCK_MOVEMENT.to_string(),
                                )),
                                origin_reference_id: Set(Some(movement.id)),
                                created_at: Set(now),
                                updated_at: Set(now),
                            }
                            .insert(txn)
                            .await
                            .map_err(ServiceError::db_error)?;

                            serial_movement::record(
                                &unit,
                                SerialMovementType::Received,
                                None,
                                Some(txn_req.location_id),
                                Some((REFERENCE_TYPE_STOCK_MOVEMENT, movement.id)),
                                txn_req.actor_id,
                            )
                            .insert(txn)
                            .await
                            .map_err(ServiceError::db_error)?;

                            units.push(unit);
                        }

                        Ok(units)
                    })
                })
                .await
                .map_err(map_txn_err)
        })
        .await?;

        info!(
            "Serial units received: variation={}, location={}, count={}",
            req.variation_id,
            req.location_id,
            units.len()
        );
        let _ = self
            .events
            .send(Event::SerialUnitsReceived {
                variation_id: req.variation_id,
                location_id: req.location_id,
                count: units.len(),
            })
            .await;
        self.audit
            .record(
                "serial.receive",
                req.actor_id,
                json!({
                    "variation_id": req.variation_id,
                    "location_id": req.location_id,
                    "serial_numbers": req.serial_numbers,
                }),
            )
            .await;

        Ok(units)
    }

    pub async fn find_unit(
        &self,
        business_id: Uuid,
        variation_id: Uuid,
        serial_number: &str,
    ) -> Result<serial_unit::Model, ServiceError> {
        serial_unit::Entity::find()
            .filter(serial_unit::Column::BusinessId.eq(business_id))
            .filter(serial_unit::Column::VariationId.eq(variation_id))
            .filter(serial_unit::Column::SerialNumber.eq(serial_number))
            .one(self.db.as_ref())
            .await
            .map_err(ServiceError::db_error)?
            .ok_or_else(|| {
                ServiceError::NotFound(format!("Serial unit '{}' not found", serial_number))
            })
    }

    /// Movement history of one unit, oldest first.
    pub async fn history(
        &self,
        serial_unit_id: Uuid,
    ) -> Result<Vec<serial_movement::Model>, ServiceError> {
        let unit = serial_unit::Entity::find_by_id(serial_unit_id)
            .one(self.db.as_ref())
            .await
            .map_err(ServiceError::db_error)?;
        if unit.is_none() {
            return Err(ServiceError::NotFound(format!(
                "Serial unit {} not found",
                serial_unit_id
            )));
        }

        serial_movement::Entity::find()
            .filter(serial_movement::Column::SerialUnitId.eq(serial_unit_id))
            .order_by_asc(serial_movement::Column::CreatedAt)
            .all(self.db.as_ref())
            .await
            .map_err(ServiceError::db_error)
    }

    /// Units of a variation currently at a location, optionally filtered by status.
    pub async fn list_units(
        &self,
        variation_id: Uuid,
        location_id: Uuid,
        status: Option<SerialStatus>,
    ) -> Result<Vec<serial_unit::Model>, ServiceError> {
        let mut query = serial_unit::Entity::find()
            .filter(serial_unit::Column::VariationId.eq(variation_id))
            .filter(serial_unit::Column::CurrentLocationId.eq(location_id));
        if let Some(status) = status {
            query = query.filter(serial_unit::Column::Status.eq(status));
        }
        query
            .order_by_asc(serial_unit::Column::SerialNumber)
            .all(self.db.as_ref())
            .await
            .map_err(ServiceError::db_error)
    }
}

/// Transitions units out of stock alongside an outbound ledger row. Runs in
/// the caller's transaction.
pub(crate) async fn mark_units_removed<C: ConnectionTrait>(
    conn: &C,
    business_id: Uuid,
    variation_id: Uuid,
    location_id: Uuid,
    serials: &[String],
    movement: &stock_movement::Model,
    actor_id: Uuid,
) -> Result<(), ServiceError> {
    let (target_status, serial_movement_type) = match movement.movement_type {
        MovementType::Sale => (SerialStatus::Sold, SerialMovementType::Sold),
        MovementType::SupplierReturn => (
            SerialStatus::ReturnedToSupplier,
            SerialMovementType::ReturnedToSupplier,
        ),
        other => {
            return Err(ServiceError::InvalidOperation(format!(
                "Movement type '{}' does not remove serialized units",
                other.as_str()
            )))
        }
    };

    for serial in serials {
        let unit = find_unit_in(conn, business_id, variation_id, serial).await?;
        if unit.current_location_id != location_id {
            return Err(ServiceError::InvalidOperation(format!(
                "Serial unit '{}' is not at location {}",
                serial, location_id
            )));
        }
        if !unit.status.can_transition_to(target_status) {
            return Err(ServiceError::InvalidOperation(format!(
                "Serial unit '{}' cannot move from '{:?}' to '{:?}'",
                serial, unit.status, target_status
            )));
        }

        let unit = update_unit_status(conn, unit, target_status, None).await?;
        serial_movement::record(
            &unit,
            serial_movement_type,
            Some(location_id),
            None,
            Some((REFERENCE_TYPE_STOCK_MOVEMENT, movement.id)),
            actor_id,
        )
        .insert(conn)
        .await
        .map_err(ServiceError::db_error)?;
    }
    Ok(())
}

/// Moves in-stock units between locations alongside a transfer pair.
pub(crate) async fn move_units<C: ConnectionTrait>(
    conn: &C,
    business_id: Uuid,
    variation_id: Uuid,
    from_location_id: Uuid,
    to_location_id: Uuid,
    serials: &[String],
    transfer_id: Uuid,
    actor_id: Uuid,
) -> Result<(), ServiceError> {
    for serial in serials {
        let unit = find_unit_in(conn, business_id, variation_id, serial).await?;
        if unit.status != SerialStatus::InStock {
            return Err(ServiceError::InvalidOperation(format!(
                "Serial unit '{}' is not in stock",
                serial
            )));
        }
        if unit.current_location_id != from_location_id {
            return Err(ServiceError::InvalidOperation(format!(
                "Serial unit '{}' is not at location {}",
                serial, from_location_id
            )));
        }

        let unit =
            update_unit_status(conn, unit, SerialStatus::InStock, Some(to_location_id)).await?;
        serial_movement::record(
            &unit,
            SerialMovementType::Transferred,
            Some(from_location_id),
            Some(to_location_id),
            Some((REFERENCE_TYPE_TRANSFER, transfer_id)),
            actor_id,
        )
        .insert(conn)
        .await
        .map_err(ServiceError::db_error)?;
    }
    Ok(())
}

/// Restores units taken out by a now-voided movement. No-op when the original
/// movement carried no serials. Supplier returns are terminal for a unit, so
/// voiding one is rejected.
pub(crate) async fn restore_removed_units<C: ConnectionTrait>(
    conn: &C,
    original: &stock_movement::Model,
    reversal: &stock_movement::Model,
    actor_id: Uuid,
) -> Result<(), ServiceError> {
    let removed = serial_movement::Entity::find()
        .filter(serial_movement::Column::ReferenceType.eq(REFERENCE_TYPE_STOCK_MOVEMENT))
        .filter(serial_movement::Column::ReferenceId.eq(original.id))
        .all(conn)
        .await
        .map_err(ServiceError::db_error)?;

    for removal in removed {
        let unit = serial_unit::Entity::find_by_id(removal.serial_unit_id)
            .one(conn)
            .await
            .map_err(ServiceError::db_error)?
            .ok_or_else(|| {
                ServiceError::NotFound(format!("Serial unit {} not found", removal.serial_unit_id))
            })?;

        if !unit.status.can_transition_to(SerialStatus::InStock) {
            return Err(ServiceError::InvalidOperation(format!(
                "Serial unit '{}' cannot be restored from '{:?}'",
                unit.serial_number, unit.status
            )));
        }

        let unit = update_unit_status(
            conn,
            unit,
            SerialStatus::InStock,
            Some(original.location_id),
        )
        .await?;
        serial_movement::record(
            &unit,
            SerialMovementType::Void,
            None,
            Some(original.location_id),
            Some((REFERENCE_TYPE_STOCK_MOVEMENT, reversal.id)),
            actor_id,
        )
        .insert(conn)
        .await
        .map_err(ServiceError::db_error)?;
    }
    Ok(())
}

async fn find_unit_in<C: ConnectionTrait>(
    conn: &C,
    business_id: Uuid,
    variation_id: Uuid,
    serial_number: &str,
) -> Result<serial_unit::Model, ServiceError> {
    serial_unit::Entity::find()
        .filter(serial_unit::Column::BusinessId.eq(business_id))
        .filter(serial_unit::Column::VariationId.eq(variation_id))
        .filter(serial_unit::Column::SerialNumber.eq(serial_number))
        .one(conn)
        .await
        .map_err(ServiceError::db_error)?
        .ok_or_else(|| ServiceError::NotFound(format!("Serial unit '{}' not found", serial_number)))
}

async fn update_unit_status<C: ConnectionTrait>(
    conn: &C,
    unit: serial_unit::Model,
    status: SerialStatus,
    new_location_id: Option<Uuid>,
) -> Result<serial_unit::Model, ServiceError> {
    let mut active: serial_unit::ActiveModel = unit.into();
    active.status = Set(status);
    if let Some(location_id) = new_location_id {
        active.current_location_id = Set(location_id);
    }
    active.updated_at = Set(Utc::now());
    active.update(conn).await.map_err(ServiceError::db_error)
}
