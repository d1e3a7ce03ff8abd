use chrono::{DateTime, Utc};
use sea_orm::entity::prelude::*;
use sea_orm::Set;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, EnumIter, DeriveActiveEnum, Serialize, Deserialize)]
#[sea_orm(rs_type = "String", db_type = "String(StringLen::N(32))")]
#[serde(rename_all = "snake_case")]
pub enum SerialMovementType {
    #[sea_orm(string_value = "received")]
    Received,
    #[sea_orm(string_value = "sold")]
    Sold,
    #[sea_orm(string_value = "void")]
    Void,
    #[sea_orm(string_value = "returned_to_supplier")]
    ReturnedToSupplier,
    #[sea_orm(string_value = "transferred")]
    Transferred,
}

/// Append-only movement log for serialized units. Every row corresponds 1:1
/// to a `serial_units` status transition.
#[derive(Clone, Debug, PartialEq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "serial_movements")]
pub struct Model {
    #[sea_orm(primary_key, auto_increment = false)]
    pub id: Uuid,
    pub serial_unit_id: Uuid,
    pub movement_type: SerialMovementType,
    pub from_location_id: Option<Uuid>,
    pub to_location_id: Option<Uuid>,
    pub reference_type: Option<String>,
    pub reference_id: Option<Uuid>,
    pub actor_id: Uuid,
    pub created_at: DateTime<Utc>,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {
    #[sea_orm(
        belongs_to = "super::serial_unit::Entity",
        from = "Column::SerialUnitId",
        to = "super::serial_unit::Column::Id"
    )]
    SerialUnit,
}

impl Related<super::serial_unit::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::SerialUnit.def()
    }
}

impl ActiveModelBehavior for ActiveModel {}

/// Build a movement row for an already-persisted unit. Taking the loaded
/// `serial_units` model (not a bare id) makes it impossible to log a movement
/// before the unit row exists.
pub fn record(
    unit: &super::serial_unit::Model,
    movement_type: SerialMovementType,
    from_location_id: Option<Uuid>,
    to_location_id: Option<Uuid>,
    reference: Option<(&str, Uuid)>,
    actor_id: Uuid,
) -> ActiveModel {
    ActiveModel {
        id: Set(Uuid::new_v4()),
        serial_unit_id: Set(unit.id),
        movement_type: Set(movement_type),
        from_location_id: Set(from_location_id),
        to_location_id: Set(to_location_id),
        reference_type: Set(reference.map(|(kind, _)| kind.to_string())),
        reference_id: Set(reference.map(|(_, id)| id)),
        actor_id: Set(actor_id),
        created_at: Set(Utc::now()),
    }
}
