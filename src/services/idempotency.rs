use std::sync::Arc;

use chrono::{Duration, Utc};
use sea_orm::{
    ActiveModelTrait, ColumnTrait, ConnectionTrait, EntityTrait, QueryFilter, QueryOrder, Set,
};
use tracing::{debug, info};
use uuid::Uuid;

use crate::{db::DbPool, entities::idempotency_record, errors::ServiceError};

/// Duplicate-request guard: a time-boxed lookback over recorded scope keys.
///
/// A scope key fingerprints the business intent of a request (operation,
/// actor, target, amount). A second request with the same key inside the
/// window is answered with `DuplicateRequest` carrying the id the first one
/// produced. The check-then-record pair runs inside the caller's transaction,
/// so a rolled-back operation leaves no record behind. Two identical requests
/// racing through the check concurrently can both pass; the window is a
/// guard against retries, not a uniqueness constraint.
pub struct IdempotencyGuard {
    db: Arc<DbPool>,
    window: Duration,
}

impl IdempotencyGuard {
    pub fn new(db: Arc<DbPool>, window: Duration) -> Self {
        Self { db, window }
    }

    /// Builds a scope key from its parts. Order matters.
    pub fn scope_key(parts: &[&str]) -> String {
        parts.join(":")
    }

    /// Fails with `DuplicateRequest` if the scope key was recorded inside the
    /// window.
    pub(crate) async fn check_in<C: ConnectionTrait>(
        &self,
        conn: &C,
        scope_key: &str,
    ) -> Result<(), ServiceError> {
        let cutoff = Utc::now() - self.window;
        let existing = idempotency_record::Entity::find()
            .filter(idempotency_record::Column::ScopeKey.eq(scope_key))
            .filter(idempotency_record::Column::CreatedAt.gt(cutoff))
            .order_by_desc(idempotency_record::Column::CreatedAt)
            .one(conn)
            .await
            .map_err(ServiceError::db_error)?;

        match existing {
            Some(record) => {
                debug!(
                    "Duplicate request for scope '{}': original entity {}",
                    scope_key, record.entity_id
                );
                Err(ServiceError::DuplicateRequest {
                    original_id: record.entity_id,
                })
            }
            None => Ok(()),
        }
    }

    /// Records a completed request under its scope key.
    pub(crate) async fn record_in<C: ConnectionTrait>(
        &self,
        conn: &C,
        scope_key: &str,
        entity_id: Uuid,
    ) -> Result<(), ServiceError> {
        idempotency_record::ActiveModel {
            id: Set(Uuid::new_v4()),
            scope_key: Set(scope_key.to_string()),
            entity_id: Set(entity_id),
            created_at: Set(Utc::now()),
        }
        .insert(conn)
        .await
        .map_err(ServiceError::db_error)?;
        Ok(())
    }

    /// Deletes records older than the window. Intended for a periodic sweep;
    /// expired rows are already invisible to `check_in`.
    pub async fn purge_expired(&self) -> Result<u64, ServiceError> {
        let cutoff = Utc::now() - self.window;
        let result = idempotency_record::Entity::delete_many()
            .filter(idempotency_record::Column::CreatedAt.lte(cutoff))
            .exec(self.db.as_ref())
            .await
            .map_err(ServiceError::db_error)?;

        if result.rows_affected > 0 {
            info!("Purged {} expired idempotency records", result.rows_affected);
        }
        Ok(result.rows_affected)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn scope_key_joins_parts_in_order() {
        assert_eq!(
            IdempotencyGuard::scope_key(&["add", "actor", "variation"]),
            "add:actor:variation"
        );
    }
}
