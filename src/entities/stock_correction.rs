use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};

/// Correction reason that permits creating a stock level row for a key that
/// has never moved before (system count defaults to zero).
pub const REASON_BEGINNING_INVENTORY: &str = "beginning_inventory";

#[derive(Debug, Clone, Copy, PartialEq, Eq, EnumIter, DeriveActiveEnum, Serialize, Deserialize)]
#[sea_orm(rs_type = "String", db_type = "String(StringLen::N(32))")]
#[serde(rename_all = "snake_case")]
pub enum CorrectionStatus {
    #[sea_orm(string_value = "pending")]
    Pending,
    #[sea_orm(string_value = "approved")]
    Approved,
    #[sea_orm(string_value = "deleted")]
    Deleted,
}

/// Physical-count correction request. `pending` until approved (terminal,
/// writes one ledger movement) or soft-deleted (only while pending).
#[derive(Clone, Debug, PartialEq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "stock_corrections")]
pub struct Model {
    #[sea_orm(primary_key, auto_increment = false)]
    pub id: Uuid,
    pub business_id: Uuid,
    pub location_id: Uuid,
    pub product_id: Uuid,
    pub variation_id: Uuid,
    /// Cached balance at request time.
    #[sea_orm(column_type = "Decimal(Some((19, 4)))")]
    pub system_count: Decimal,
    #[sea_orm(column_type = "Decimal(Some((19, 4)))")]
    pub physical_count: Decimal,
    /// `physical_count - system_count`; becomes the movement quantity.
    #[sea_orm(column_type = "Decimal(Some((19, 4)))")]
    pub difference: Decimal,
    pub reason: String,
    pub remarks: Option<String>,
    pub status: CorrectionStatus,
    pub requested_by: Uuid,
    pub approved_by: Option<Uuid>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Model {
    pub fn is_beginning_inventory(&self) -> bool {
        self.reason == REASON_BEGINNING_INVENTORY
    }
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {}

impl ActiveModelBehavior for ActiveModel {}
