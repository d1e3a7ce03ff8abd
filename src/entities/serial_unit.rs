use chrono::{DateTime, Utc};
use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, EnumIter, DeriveActiveEnum, Serialize, Deserialize)]
#[sea_orm(rs_type = "String", db_type = "String(StringLen::N(32))")]
#[serde(rename_all = "snake_case")]
pub enum SerialStatus {
    #[sea_orm(string_value = "in_stock")]
    InStock,
    #[sea_orm(string_value = "sold")]
    Sold,
    #[sea_orm(string_value = "returned_to_supplier")]
    ReturnedToSupplier,
}

impl SerialStatus {
    /// Legal transitions: in_stock -> sold -> in_stock (void) and
    /// in_stock -> returned_to_supplier. Everything else is rejected.
    pub fn can_transition_to(&self, next: SerialStatus) -> bool {
        matches!(
            (self, next),
            (SerialStatus::InStock, SerialStatus::Sold)
                | (SerialStatus::Sold, SerialStatus::InStock)
                | (SerialStatus::InStock, SerialStatus::ReturnedToSupplier)
        )
    }
}

/// One row per physical serial-numbered unit.
#[derive(Clone, Debug, PartialEq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "serial_units")]
pub struct Model {
    #[sea_orm(primary_key, auto_increment = false)]
    pub id: Uuid,
    pub business_id: Uuid,
    pub variation_id: Uuid,
    pub serial_number: String,
    pub status: SerialStatus,
    pub current_location_id: Uuid,
    pub origin_reference_type: Option<String>,
    pub origin_reference_id: Option<Uuid>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {
    #[sea_orm(has_many = "super::serial_movement::Entity")]
    SerialMovement,
}

impl Related<super::serial_movement::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::SerialMovement.def()
    }
}

impl ActiveModelBehavior for ActiveModel {}
