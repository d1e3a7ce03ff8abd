mod common;

use assert_matches::assert_matches;
use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use sea_orm::{ColumnTrait, EntityTrait, QueryFilter};
use uuid::Uuid;

use sea_orm::QueryOrder;
use stockledger_api::{
    entities::{
        stock_correction::{CorrectionStatus, REASON_BEGINNING_INVENTORY},
        stock_movement::{self, MovementType},
    },
    errors::ServiceError,
    services::{
        corrections::CreateCorrectionRequest,
        stock_operations::{AddStockRequest, RemoveStockRequest},
    },
};

fn correction_req(
    business_id: Uuid,
    location_id: Uuid,
    variation_id: Uuid,
    physical_count: Decimal,
    reason: &str,
    actor_id: Uuid,
) -> CreateCorrectionRequest {
    CreateCorrectionRequest {
        business_id,
        location_id,
        variation_id,
        physical_count,
        reason: reason.to_string(),
        remarks: None,
        actor_id,
    }
}

async fn movement_count(db: &stockledger_api::db::DbPool, variation_id: Uuid) -> usize {
    stock_movement::Entity::find()
        .filter(stock_movement::Column::VariationId.eq(variation_id))
        .all(db)
        .await
        .expect("failed to load movements")
        .len()
}

#[tokio::test]
async fn beginning_inventory_bootstraps_a_fresh_key() {
    let (db, services) = common::setup().await;
    let business_id = Uuid::new_v4();
    let location = common::create_location(db.as_ref(), business_id, "Main").await;
    let variation =
        common::create_variation(db.as_ref(), business_id, "SKU-C1", dec!(12.00), false).await;

    let correction = services
        .corrections
        .create(correction_req(
            business_id,
            location.id,
            variation.id,
            dec!(50),
            REASON_BEGINNING_INVENTORY,
            Uuid::new_v4(),
        ))
        .await
        .expect("create failed");
    assert_eq!(correction.system_count, Decimal::ZERO);
    assert_eq!(correction.difference, dec!(50));
    assert_eq!(correction.status, CorrectionStatus::Pending);

    let approver = Uuid::new_v4();
    let approved = services
        .corrections
        .approve(correction.id, approver)
        .await
        .expect("approve failed");
    assert_eq!(approved.status, CorrectionStatus::Approved);
    assert_eq!(approved.approved_by, Some(approver));

    let movements = stock_movement::Entity::find()
        .filter(stock_movement::Column::VariationId.eq(variation.id))
        .all(db.as_ref())
        .await
        .expect("failed to load movements");
    assert_eq!(movements.len(), 1);
    assert_eq!(movements[0].movement_type, MovementType::OpeningStock);
    assert_eq!(movements[0].quantity, dec!(50));
    assert_eq!(movements[0].balance_after, dec!(50));

    let balance = services
        .stock_ops
        .current_balance(variation.id, location.id)
        .await
        .unwrap();
    assert_eq!(balance, dec!(50));
}

#[tokio::test]
async fn ordinary_correction_on_a_fresh_key_is_rejected() {
    let (db, services) = common::setup().await;
    let business_id = Uuid::new_v4();
    let location = common::create_location(db.as_ref(), business_id, "Main").await;
    let variation =
        common::create_variation(db.as_ref(), business_id, "SKU-C2", dec!(12.00), false).await;

    let err = services
        .corrections
        .create(correction_req(
            business_id,
            location.id,
            variation.id,
            dec!(10),
            "cycle_count",
            Uuid::new_v4(),
        ))
        .await
        .unwrap_err();
    assert_matches!(err, ServiceError::InvalidOperation(_));
}

#[tokio::test]
async fn approved_correction_writes_the_counted_difference() {
    let (db, services) = common::setup().await;
    let business_id = Uuid::new_v4();
    let location = common::create_location(db.as_ref(), business_id, "Main").await;
    let variation =
        common::create_variation(db.as_ref(), business_id, "SKU-C3", dec!(12.00), false).await;

    services
        .stock_ops
        .add_stock(AddStockRequest {
            business_id,
            location_id: location.id,
            variation_id: variation.id,
            movement_type: MovementType::Purchase,
            quantity: dec!(70),
            unit_cost: None,
            reference_type: None,
            reference_id: None,
            notes: None,
            actor_id: Uuid::new_v4(),
        })
        .await
        .expect("add failed");

    let correction = services
        .corrections
        .create(correction_req(
            business_id,
            location.id,
            variation.id,
            dec!(65),
            "cycle_count",
            Uuid::new_v4(),
        ))
        .await
        .expect("create failed");
    assert_eq!(correction.system_count, dec!(70));
    assert_eq!(correction.difference, dec!(-5));

    services
        .corrections
        .approve(correction.id, Uuid::new_v4())
        .await
        .expect("approve failed");

    let balance = services
        .stock_ops
        .current_balance(variation.id, location.id)
        .await
        .unwrap();
    assert_eq!(balance, dec!(65));

    let movements = stock_movement::Entity::find()
        .filter(stock_movement::Column::VariationId.eq(variation.id))
        .filter(stock_movement::Column::MovementType.eq(MovementType::Correction))
        .all(db.as_ref())
        .await
        .expect("failed to load movements");
    assert_eq!(movements.len(), 1);
    assert_eq!(movements[0].quantity, dec!(-5));
    assert_eq!(movements[0].reference_id, Some(correction.id));
}

#[tokio::test]
async fn zero_difference_approval_writes_no_movement() {
    let (db, services) = common::setup().await;
    let business_id = Uuid::new_v4();
    let location = common::create_location(db.as_ref(), business_id, "Main").await;
    let variation =
        common::create_variation(db.as_ref(), business_id, "SKU-C4", dec!(12.00), false).await;

    services
        .stock_ops
        .add_stock(AddStockRequest {
            business_id,
            location_id: location.id,
            variation_id: variation.id,
            movement_type: MovementType::Purchase,
            quantity: dec!(20),
            unit_cost: None,
            reference_type: None,
            reference_id: None,
            notes: None,
            actor_id: Uuid::new_v4(),
        })
        .await
        .expect("add failed");
    let before = movement_count(db.as_ref(), variation.id).await;

    let correction = services
        .corrections
        .create(correction_req(
            business_id,
            location.id,
            variation.id,
            dec!(20),
            "cycle_count",
            Uuid::new_v4(),
        ))
        .await
        .expect("create failed");
    assert_eq!(correction.difference, Decimal::ZERO);

    let approved = services
        .corrections
        .approve(correction.id, Uuid::new_v4())
        .await
        .expect("approve failed");
    assert_eq!(approved.status, CorrectionStatus::Approved);
    assert_eq!(movement_count(db.as_ref(), variation.id).await, before);
}

#[tokio::test]
async fn corrections_are_single_shot_state_machines() {
    let (db, services) = common::setup().await;
    let business_id = Uuid::new_v4();
    let location = common::create_location(db.as_ref(), business_id, "Main").await;
    let variation =
        common::create_variation(db.as_ref(), business_id, "SKU-C5", dec!(12.00), false).await;

    let correction = services
        .corrections
        .create(correction_req(
            business_id,
            location.id,
            variation.id,
            dec!(30),
            REASON_BEGINNING_INVENTORY,
            Uuid::new_v4(),
        ))
        .await
        .expect("create failed");

    services
        .corrections
        .approve(correction.id, Uuid::new_v4())
        .await
        .expect("approve failed");

    // Approval is terminal.
    let err = services
        .corrections
        .approve(correction.id, Uuid::new_v4())
        .await
        .unwrap_err();
    assert_matches!(err, ServiceError::InvalidOperation(_));
    let err = services
        .corrections
        .delete(correction.id, Uuid::new_v4())
        .await
        .unwrap_err();
    assert_matches!(err, ServiceError::InvalidOperation(_));
}

#[tokio::test]
async fn deleted_corrections_cannot_be_approved() {
    let (db, services) = common::setup().await;
    let business_id = Uuid::new_v4();
    let location = common::create_location(db.as_ref(), business_id, "Main").await;
    let variation =
        common::create_variation(db.as_ref(), business_id, "SKU-C6", dec!(12.00), false).await;

    let correction = services
        .corrections
        .create(correction_req(
            business_id,
            location.id,
            variation.id,
            dec!(30),
            REASON_BEGINNING_INVENTORY,
            Uuid::new_v4(),
        ))
        .await
        .expect("create failed");

    let deleted = services
        .corrections
        .delete(correction.id, Uuid::new_v4())
        .await
        .expect("delete failed");
    assert_eq!(deleted.status, CorrectionStatus::Deleted);

    let err = services
        .corrections
        .approve(correction.id, Uuid::new_v4())
        .await
        .unwrap_err();
    assert_matches!(err, ServiceError::InvalidOperation(_));

    // Nothing ever reached the ledger.
    assert_eq!(movement_count(db.as_ref(), variation.id).await, 0);
}

#[tokio::test]
async fn duplicate_correction_request_is_rejected_with_the_original_id() {
    let (db, services) = common::setup().await;
    let business_id = Uuid::new_v4();
    let location = common::create_location(db.as_ref(), business_id, "Main").await;
    let variation =
        common::create_variation(db.as_ref(), business_id, "SKU-C7", dec!(12.00), false).await;
    let actor_id = Uuid::new_v4();

    let first = services
        .corrections
        .create(correction_req(
            business_id,
            location.id,
            variation.id,
            dec!(30),
            REASON_BEGINNING_INVENTORY,
            actor_id,
        ))
        .await
        .expect("create failed");

    let err = services
        .corrections
        .create(correction_req(
            business_id,
            location.id,
            variation.id,
            dec!(31),
            REASON_BEGINNING_INVENTORY,
            actor_id,
        ))
        .await
        .unwrap_err();
    assert_matches!(err, ServiceError::DuplicateRequest { original_id } if original_id == first.id);

    // A different actor counting the same key is a distinct request.
    services
        .corrections
        .create(correction_req(
            business_id,
            location.id,
            variation.id,
            dec!(31),
            REASON_BEGINNING_INVENTORY,
            Uuid::new_v4(),
        ))
        .await
        .expect("create by another actor failed");
}

#[tokio::test]
async fn count_then_purchase_then_sale_keeps_the_chain_balanced() {
    let (db, services) = common::setup().await;
    let business_id = Uuid::new_v4();
    let location = common::create_location(db.as_ref(), business_id, "Main").await;
    let variation =
        common::create_variation(db.as_ref(), business_id, "SKU-C9", dec!(12.00), false).await;

    let correction = services
        .corrections
        .create(correction_req(
            business_id,
            location.id,
            variation.id,
            dec!(100),
            REASON_BEGINNING_INVENTORY,
            Uuid::new_v4(),
        ))
        .await
        .expect("create failed");
    services
        .corrections
        .approve(correction.id, Uuid::new_v4())
        .await
        .expect("approve failed");

    services
        .stock_ops
        .add_stock(AddStockRequest {
            business_id,
            location_id: location.id,
            variation_id: variation.id,
            movement_type: MovementType::Purchase,
            quantity: dec!(50),
            unit_cost: None,
            reference_type: None,
            reference_id: None,
            notes: None,
            actor_id: Uuid::new_v4(),
        })
        .await
        .expect("add failed");
    services
        .stock_ops
        .remove_stock(RemoveStockRequest {
            business_id,
            location_id: location.id,
            variation_id: variation.id,
            movement_type: MovementType::Sale,
            quantity: dec!(20),
            unit_cost: None,
            reference_type: None,
            reference_id: None,
            notes: None,
            actor_id: Uuid::new_v4(),
            serial_numbers: vec![],
            policy: None,
        })
        .await
        .expect("remove failed");

    let movements = stock_movement::Entity::find()
        .filter(stock_movement::Column::VariationId.eq(variation.id))
        .order_by_asc(stock_movement::Column::CreatedAt)
        .all(db.as_ref())
        .await
        .expect("failed to load movements");
    let balances: Vec<Decimal> = movements.iter().map(|m| m.balance_after).collect();
    assert_eq!(balances, vec![dec!(100), dec!(150), dec!(130)]);

    let balance = services
        .stock_ops
        .current_balance(variation.id, location.id)
        .await
        .unwrap();
    assert_eq!(balance, dec!(130));

    let summary = services
        .reconciliation
        .summarize(variation.id, location.id, None, None)
        .await
        .expect("summarize failed");
    assert_eq!(summary.variance, Decimal::ZERO);
    assert!(summary.is_reconciled);
}

#[tokio::test]
async fn negative_physical_count_is_rejected() {
    let (db, services) = common::setup().await;
    let business_id = Uuid::new_v4();
    let location = common::create_location(db.as_ref(), business_id, "Main").await;
    let variation =
        common::create_variation(db.as_ref(), business_id, "SKU-C8", dec!(12.00), false).await;

    let err = services
        .corrections
        .create(correction_req(
            business_id,
            location.id,
            variation.id,
            dec!(-1),
            REASON_BEGINNING_INVENTORY,
            Uuid::new_v4(),
        ))
        .await
        .unwrap_err();
    assert_matches!(err, ServiceError::ValidationError(_));
}
