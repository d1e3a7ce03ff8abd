use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use sea_orm::{ColumnTrait, ConnectionTrait, EntityTrait, QueryFilter, TransactionError};
use uuid::Uuid;

use crate::{
    audit::AuditEmitter,
    config::AppConfig,
    db::DbPool,
    entities::{location, product_variation},
    errors::ServiceError,
    events::EventSender,
};

pub mod corrections;
pub mod idempotency;
pub mod ledger_report;
pub mod reconciliation;
pub mod serial_inventory;
pub mod stock_operations;

pub use corrections::CorrectionService;
pub use idempotency::IdempotencyGuard;
pub use ledger_report::LedgerReportService;
pub use reconciliation::ReconciliationService;
pub use serial_inventory::SerialInventoryService;
pub use stock_operations::{NegativeStockPolicy, StockOperationService};

/// All services share the pool and the event channel; handlers only ever see
/// this container.
#[derive(Clone)]
pub struct AppServices {
    pub stock_ops: Arc<StockOperationService>,
    pub idempotency: Arc<IdempotencyGuard>,
    pub corrections: Arc<CorrectionService>,
    pub serials: Arc<SerialInventoryService>,
    pub reconciliation: Arc<ReconciliationService>,
    pub reports: Arc<LedgerReportService>,
}

impl AppServices {
    pub fn new(db: Arc<DbPool>, events: EventSender, config: &AppConfig) -> Self {
        let audit = AuditEmitter::new(events.clone());
        let idempotency = Arc::new(IdempotencyGuard::new(
            db.clone(),
            chrono::Duration::seconds(config.duplicate_window_secs),
        ));
        let default_policy = if config.allow_negative_stock {
            NegativeStockPolicy::Backorder
        } else {
            NegativeStockPolicy::Reject
        };
        let stock_ops = Arc::new(StockOperationService::new(
            db.clone(),
            events.clone(),
            audit.clone(),
            idempotency.clone(),
            config.transaction_timeout(),
            default_policy,
        ));
        let corrections = Arc::new(CorrectionService::new(
            db.clone(),
            events.clone(),
            audit.clone(),
            idempotency.clone(),
            config.transaction_timeout(),
        ));
        let serials = Arc::new(SerialInventoryService::new(
            db.clone(),
            events.clone(),
            audit.clone(),
            config.transaction_timeout(),
        ));
        let reconciliation = Arc::new(ReconciliationService::new(
            db.clone(),
            audit,
            config.transaction_timeout(),
        ));
        let reports = Arc::new(LedgerReportService::new(db));

        Self {
            stock_ops,
            idempotency,
            corrections,
            serials,
            reconciliation,
            reports,
        }
    }
}

/// Collapses sea-orm's two-layer transaction error back into the service
/// error raised inside the closure.
pub(crate) fn map_txn_err(err: TransactionError<ServiceError>) -> ServiceError {
    match err {
        TransactionError::Connection(e) => ServiceError::DatabaseError(e),
        TransactionError::Transaction(e) => e,
    }
}

/// Enforces the per-operation time budget. A future dropped here never
/// commits: the transaction rolls back when its guard is dropped.
pub(crate) async fn with_timeout<F, T>(budget: Duration, fut: F) -> Result<T, ServiceError>
where
    F: Future<Output = Result<T, ServiceError>>,
{
    tokio::time::timeout(budget, fut)
        .await
        .map_err(|_| ServiceError::TransactionTimeout)?
}

/// Loads a variation or fails with NotFound.
pub(crate) async fn ensure_variation<C: ConnectionTrait>(
    conn: &C,
    variation_id: Uuid,
) -> Result<product_variation::Model, ServiceError> {
    product_variation::Entity::find_by_id(variation_id)
        .one(conn)
        .await
        .map_err(ServiceError::db_error)?
        .ok_or_else(|| ServiceError::NotFound(format!("Product variation {} not found", variation_id)))
}

/// Loads a location, rejecting unknown or deactivated ones.
pub(crate) async fn ensure_active_location<C: ConnectionTrait>(
    conn: &C,
    location_id: Uuid,
) -> Result<location::Model, ServiceError> {
    let loc = location::Entity::find()
        .filter(location::Column::Id.eq(location_id))
        .one(conn)
        .await
        .map_err(ServiceError::db_error)?
        .ok_or_else(|| ServiceError::NotFound(format!("Location {} not found", location_id)))?;

    if !loc.is_active {
        return Err(ServiceError::InvalidOperation(format!(
            "Location {} is inactive",
            location_id
        )));
    }
    Ok(loc)
}
