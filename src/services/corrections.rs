use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use rust_decimal::Decimal;
use sea_orm::{
    ActiveModelTrait, ColumnTrait, EntityTrait, QueryFilter, QueryOrder, Set, TransactionTrait,
};
use serde::Deserialize;
use serde_json::json;
use tracing::info;
use uuid::Uuid;

use crate::{
    audit::AuditEmitter,
    db::DbPool,
    entities::{
        stock_correction::{self, CorrectionStatus, REASON_BEGINNING_INVENTORY},
        stock_level,
        stock_movement::{self, MovementType},
    },
    errors::ServiceError,
    events::{Event, EventSender},
};

use super::{
    ensure_active_location, ensure_variation, map_txn_err,
    stock_operations::{apply_movement, MovementSpec, NegativeStockPolicy},
    with_timeout, IdempotencyGuard,
};

pub const REFERENCE_TYPE_CORRECTION: &str = "stock_correction";

#[derive(Debug, Clone, Deserialize)]
pub struct CreateCorrectionRequest {
    pub business_id: Uuid,
    pub location_id: Uuid,
    pub variation_id: Uuid,
    pub physical_count: Decimal,
    pub reason: String,
    pub remarks: Option<String>,
    pub actor_id: Uuid,
}

/// Physical-count corrections: requested as `pending`, then either approved
/// (which writes exactly one ledger movement for the counted difference) or
/// soft-deleted. Approval is terminal.
pub struct CorrectionService {
    db: Arc<DbPool>,
    events: EventSender,
    audit: AuditEmitter,
    idempotency: Arc<IdempotencyGuard>,
    txn_budget: Duration,
}

impl CorrectionService {
    pub fn new(
        db: Arc<DbPool>,
        events: EventSender,
        audit: AuditEmitter,
        idempotency: Arc<IdempotencyGuard>,
        txn_budget: Duration,
    ) -> Self {
        Self {
            db,
            events,
            audit,
            idempotency,
            txn_budget,
        }
    }

    /// Files a pending correction. The system count is snapshotted from the
    /// cached balance at request time. A key that has never moved is only
    /// accepted with the beginning-inventory reason, where the system count
    /// defaults to zero.
    pub async fn create(
        &self,
        req: CreateCorrectionRequest,
    ) -> Result<stock_correction::Model, ServiceError> {
        if req.physical_count < Decimal::ZERO {
            return Err(ServiceError::ValidationError(
                "Physical count cannot be negative".to_string(),
            ));
        }
        if req.reason.trim().is_empty() {
            return Err(ServiceError::ValidationError(
                "A correction reason is required".to_string(),
            ));
        }

        let scope = IdempotencyGuard::scope_key(&[
            "correction",
            &req.actor_id.to_string(),
            &req.variation_id.to_string(),
            &req.location_id.to_string(),
        ]);

        let idempotency = self.idempotency.clone();
        let txn_req = req.clone();

        let correction = with_timeout(self.txn_budget, async {
            self.db
                .transaction::<_, stock_correction::Model, ServiceError>(move |txn| {
                    Box::pin(async move {
                        idempotency.check_in(txn, &scope).await?;
                        let variation = ensure_variation(txn, txn_req.variation_id).await?;
                        ensure_active_location(txn, txn_req.location_id).await?;

                        let level = stock_level::Entity::find()
                            .filter(stock_level::Column::VariationId.eq(txn_req.variation_id))
                            .filter(stock_level::Column::LocationId.eq(txn_req.location_id))
                            .one(txn)
                            .await
                            .map_err(ServiceError::db_error)?;

                        let system_count = match &level {
                            Some(level) => level.qty_available,
                            None if txn_req.reason == REASON_BEGINNING_INVENTORY => Decimal::ZERO,
                            None => {
                                return Err(ServiceError::InvalidOperation(format!(
                                    "No stock has been recorded for variation {} at location {}; \
                                     use the '{}' reason to bootstrap it",
                                    txn_req.variation_id,
                                    txn_req.location_id,
                                    REASON_BEGINNING_INVENTORY
                                )))
                            }
                        };

                        let now = Utc::now();
                        let correction = stock_correction::ActiveModel {
                            id: Set(Uuid::new_v4()),
                            business_id: Set(txn_req.business_id),
                            location_id: Set(txn_req.location_id),
                            product_id: Set(variation.product_id),
                            variation_id: Set(txn_req.variation_id),
                            system_count: Set(system_count),
                            physical_count: Set(txn_req.physical_count),
                            difference: Set(txn_req.physical_count - system_count),
                            reason: Set(txn_req.reason),
                            remarks: Set(txn_req.remarks),
                            status: Set(CorrectionStatus::Pending),
                            requested_by: Set(txn_req.actor_id),
                            approved_by: Set(None),
                            created_at: Set(now),
                            updated_at: Set(now),
                        }
                        .insert(txn)
                        .await
                        .map_err(ServiceError::db_error)?;

                        idempotency.record_in(txn, &scope, correction.id).await?;
                        Ok(correction)
                    })
                })
                .await
                .map_err(map_txn_err)
        })
        .await?;

        info!(
            "Stock correction created: id={}, variation={}, location={}, difference={}",
            correction.id, correction.variation_id, correction.location_id, correction.difference
        );
        let _ = self.events.send(Event::CorrectionCreated(correction.id)).await;
        self.audit
            .record(
                "correction.create",
                req.actor_id,
                json!({
                    "correction_id": correction.id,
                    "system_count": correction.system_count,
                    "physical_count": correction.physical_count,
                    "difference": correction.difference,
                    "reason": correction.reason,
                }),
            )
            .await;

        Ok(correction)
    }

    /// Approves a pending correction. A non-zero difference becomes one
    /// ledger movement: `opening_stock` for beginning-inventory corrections,
    /// `correction` otherwise. The physical count is trusted even when the
    /// balance moved since the request, so the movement may drive the cached
    /// balance negative.
    pub async fn approve(
        &self,
        correction_id: Uuid,
        approver_id: Uuid,
    ) -> Result<stock_correction::Model, ServiceError> {
        let (correction, movement) = with_timeout(self.txn_budget, async {
            self.db
                .transaction::<_, (stock_correction::Model, Option<stock_movement::Model>), ServiceError>(
                    move |txn| {
                        Box::pin(async move {
                            let correction = stock_correction::Entity::find_by_id(correction_id)
                                .one(txn)
                                .await
                                .map_err(ServiceError::db_error)?
                                .ok_or_else(|| {
                                    ServiceError::NotFound(format!(
                                        "Stock correction {} not found",
                                        correction_id
                                    ))
                                })?;

                            if correction.status != CorrectionStatus::Pending {
                                return Err(ServiceError::InvalidOperation(format!(
                                    "Correction {} is not pending",
                                    correction_id
                                )));
                            }

                            let movement_type = if correction.is_beginning_inventory() {
                                MovementType::OpeningStock
                            } else {
                                MovementType::Correction
                            };

                            let movement = if correction.difference != Decimal::ZERO {
                                Some(
                                    apply_movement(
                                        txn,
                                        MovementSpec {
                                            business_id: correction.business_id,
                                            location_id: correction.location_id,
                                            product_id: correction.product_id,
                                            variation_id: correction.variation_id,
                                            movement_type,
                                            quantity: correction.difference,
                                            unit_cost: None,
                                            reference: Some((
                                                REFERENCE_TYPE_CORRECTION.to_string(),
                                                correction.id,
                                            )),
                                            notes: correction.remarks.clone(),
                                            actor_id: approver_id,
                                            policy: NegativeStockPolicy::Backorder,
                                        },
                                    )
                                    .await?,
                                )
                            } else {
                                None
                            };

                            let mut active: stock_correction::ActiveModel = correction.into();
                            active.status = Set(CorrectionStatus::Approved);
                            active.approved_by = Set(Some(approver_id));
                            active.updated_at = Set(Utc::now());
                            let correction =
                                active.update(txn).await.map_err(ServiceError::db_error)?;

                            Ok((correction, movement))
                        })
                    },
                )
                .await
                .map_err(map_txn_err)
        })
        .await?;

        info!(
            "Stock correction approved: id={}, movement={:?}",
            correction.id,
            movement.as_ref().map(|m| m.id)
        );
        let _ = self
            .events
            .send(Event::CorrectionApproved {
                correction_id: correction.id,
                movement_id: movement.as_ref().map(|m| m.id),
            })
            .await;
        self.audit
            .record(
                "correction.approve",
                approver_id,
                json!({
                    "correction_id": correction.id,
                    "movement_id": movement.as_ref().map(|m| m.id),
                    "difference": correction.difference,
                }),
            )
            .await;

        Ok(correction)
    }

    /// Soft-deletes a pending correction. Approved corrections are immutable.
    pub async fn delete(
        &self,
        correction_id: Uuid,
        actor_id: Uuid,
    ) -> Result<stock_correction::Model, ServiceError> {
        let correction = with_timeout(self.txn_budget, async {
            self.db
                .transaction::<_, stock_correction::Model, ServiceError>(move |txn| {
                    Box::pin(async move {
                        let correction = stock_correction::Entity::find_by_id(correction_id)
                            .one(txn)
                            .await
                            .map_err(ServiceError::db_error)?
                            .ok_or_else(|| {
                                ServiceError::NotFound(format!(
                                    "Stock correction {} not found",
                                    correction_id
                                ))
                            })?;

                        if correction.status != CorrectionStatus::Pending {
                            return Err(ServiceError::InvalidOperation(format!(
                                "Correction {} is not pending",
                                correction_id
                            )));
                        }

                        let mut active: stock_correction::ActiveModel = correction.into();
                        active.status = Set(CorrectionStatus::Deleted);
                        active.updated_at = Set(Utc::now());
                        active.update(txn).await.map_err(ServiceError::db_error)
                    })
                })
                .await
                .map_err(map_txn_err)
        })
        .await?;

        info!("Stock correction deleted: id={}", correction.id);
        let _ = self.events.send(Event::CorrectionDeleted(correction.id)).await;
        self.audit
            .record(
                "correction.delete",
                actor_id,
                json!({ "correction_id": correction.id }),
            )
            .await;

        Ok(correction)
    }

    pub async fn get(&self, correction_id: Uuid) -> Result<stock_correction::Model, ServiceError> {
        stock_correction::Entity::find_by_id(correction_id)
            .one(self.db.as_ref())
            .await
            .map_err(ServiceError::db_error)?
            .ok_or_else(|| {
                ServiceError::NotFound(format!("Stock correction {} not found", correction_id))
            })
    }

    /// Corrections for a business, newest first, optionally narrowed to one status.
    pub async fn list(
        &self,
        business_id: Uuid,
        status: Option<CorrectionStatus>,
    ) -> Result<Vec<stock_correction::Model>, ServiceError> {
        let mut query = stock_correction::Entity::find()
            .filter(stock_correction::Column::BusinessId.eq(business_id));
        if let Some(status) = status {
            query = query.filter(stock_correction::Column::Status.eq(status));
        }
        query
            .order_by_desc(stock_correction::Column::CreatedAt)
            .all(self.db.as_ref())
            .await
            .map_err(ServiceError::db_error)
    }
}
