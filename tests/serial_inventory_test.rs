mod common;

use assert_matches::assert_matches;
use rust_decimal_macros::dec;
use uuid::Uuid;

use stockledger_api::{
    entities::{
        serial_movement::SerialMovementType,
        serial_unit::SerialStatus,
        stock_movement::MovementType,
    },
    errors::ServiceError,
    services::{
        serial_inventory::ReceiveSerializedRequest,
        stock_operations::{RemoveStockRequest, TransferStockRequest},
    },
};

fn receive_req(
    business_id: Uuid,
    location_id: Uuid,
    variation_id: Uuid,
    serials: &[&str],
) -> ReceiveSerializedRequest {
    ReceiveSerializedRequest {
        business_id,
        location_id,
        variation_id,
        serial_numbers: serials.iter().map(|s| s.to_string()).collect(),
        unit_cost: None,
        notes: None,
        actor_id: Uuid::new_v4(),
    }
}

fn sale_req(
    business_id: Uuid,
    location_id: Uuid,
    variation_id: Uuid,
    quantity: rust_decimal::Decimal,
    serials: &[&str],
) -> RemoveStockRequest {
    RemoveStockRequest {
        business_id,
        location_id,
        variation_id,
        movement_type: MovementType::Sale,
        quantity,
        unit_cost: None,
        reference_type: None,
        reference_id: None,
        notes: None,
        actor_id: Uuid::new_v4(),
        serial_numbers: serials.iter().map(|s| s.to_string()).collect(),
        policy: None,
    }
}

#[tokio::test]
async fn receiving_serials_creates_units_and_one_ledger_row() {
    let (db, services) = common::setup().await;
    let business_id = Uuid::new_v4();
    let location = common::create_location(db.as_ref(), business_id, "Main").await;
    let variation =
        common::create_variation(db.as_ref(), business_id, "SER-1", dec!(99.00), true).await;

    let units = services
        .serials
        .receive_serialized(receive_req(
            business_id,
            location.id,
            variation.id,
            &["SN-001", "SN-002", "SN-003"],
        ))
        .await
        .expect("receive failed");
    assert_eq!(units.len(), 3);
    assert!(units.iter().all(|u| u.status == SerialStatus::InStock));
    assert!(units.iter().all(|u| u.current_location_id == location.id));

    let balance = services
        .stock_ops
        .current_balance(variation.id, location.id)
        .await
        .unwrap();
    assert_eq!(balance, dec!(3));

    // Every unit was received through exactly one movement.
    let history = services.serials.history(units[0].id).await.expect("history failed");
    assert_eq!(history.len(), 1);
    assert_eq!(history[0].movement_type, SerialMovementType::Received);
}

#[tokio::test]
async fn duplicate_serials_are_rejected_on_receipt() {
    let (db, services) = common::setup().await;
    let business_id = Uuid::new_v4();
    let location = common::create_location(db.as_ref(), business_id, "Main").await;
    let variation =
        common::create_variation(db.as_ref(), business_id, "SER-2", dec!(99.00), true).await;

    let err = services
        .serials
        .receive_serialized(receive_req(
            business_id,
            location.id,
            variation.id,
            &["SN-001", "SN-001"],
        ))
        .await
        .unwrap_err();
    assert_matches!(err, ServiceError::ValidationError(_));

    services
        .serials
        .receive_serialized(receive_req(business_id, location.id, variation.id, &["SN-001"]))
        .await
        .expect("receive failed");

    let err = services
        .serials
        .receive_serialized(receive_req(business_id, location.id, variation.id, &["SN-001"]))
        .await
        .unwrap_err();
    assert_matches!(err, ServiceError::InvalidOperation(_));

    let balance = services
        .stock_ops
        .current_balance(variation.id, location.id)
        .await
        .unwrap();
    assert_eq!(balance, dec!(1));
}

#[tokio::test]
async fn selling_serialized_stock_requires_matching_serials() {
    let (db, services) = common::setup().await;
    let business_id = Uuid::new_v4();
    let location = common::create_location(db.as_ref(), business_id, "Main").await;
    let variation =
        common::create_variation(db.as_ref(), business_id, "SER-3", dec!(99.00), true).await;

    services
        .serials
        .receive_serialized(receive_req(
            business_id,
            location.id,
            variation.id,
            &["SN-001", "SN-002", "SN-003"],
        ))
        .await
        .expect("receive failed");

    // Count mismatch.
    let err = services
        .stock_ops
        .remove_stock(sale_req(business_id, location.id, variation.id, dec!(2), &["SN-001"]))
        .await
        .unwrap_err();
    assert_matches!(err, ServiceError::ValidationError(_));

    let movement = services
        .stock_ops
        .remove_stock(sale_req(
            business_id,
            location.id,
            variation.id,
            dec!(2),
            &["SN-001", "SN-002"],
        ))
        .await
        .expect("sale failed");
    assert_eq!(movement.balance_after, dec!(1));

    let sold = services
        .serials
        .find_unit(business_id, variation.id, "SN-001")
        .await
        .expect("unit lookup failed");
    assert_eq!(sold.status, SerialStatus::Sold);

    // A sold unit cannot be sold again.
    let err = services
        .stock_ops
        .remove_stock(sale_req(business_id, location.id, variation.id, dec!(1), &["SN-001"]))
        .await
        .unwrap_err();
    assert_matches!(err, ServiceError::InvalidOperation(_));

    let in_stock = services
        .serials
        .list_units(variation.id, location.id, Some(SerialStatus::InStock))
        .await
        .expect("list failed");
    assert_eq!(in_stock.len(), 1);
    assert_eq!(in_stock[0].serial_number, "SN-003");
}

#[tokio::test]
async fn serials_on_a_non_serialized_variation_are_rejected() {
    let (db, services) = common::setup().await;
    let business_id = Uuid::new_v4();
    let location = common::create_location(db.as_ref(), business_id, "Main").await;
    let plain =
        common::create_variation(db.as_ref(), business_id, "PLAIN-1", dec!(5.00), false).await;

    let err = services
        .serials
        .receive_serialized(receive_req(business_id, location.id, plain.id, &["SN-001"]))
        .await
        .unwrap_err();
    assert_matches!(err, ServiceError::InvalidOperation(_));

    let err = services
        .stock_ops
        .remove_stock(sale_req(business_id, location.id, plain.id, dec!(1), &["SN-001"]))
        .await
        .unwrap_err();
    assert_matches!(err, ServiceError::InvalidOperation(_));
}

#[tokio::test]
async fn voiding_a_sale_restores_its_units() {
    let (db, services) = common::setup().await;
    let business_id = Uuid::new_v4();
    let location = common::create_location(db.as_ref(), business_id, "Main").await;
    let variation =
        common::create_variation(db.as_ref(), business_id, "SER-4", dec!(99.00), true).await;

    services
        .serials
        .receive_serialized(receive_req(
            business_id,
            location.id,
            variation.id,
            &["SN-001", "SN-002"],
        ))
        .await
        .expect("receive failed");

    let sale = services
        .stock_ops
        .remove_stock(sale_req(
            business_id,
            location.id,
            variation.id,
            dec!(2),
            &["SN-001", "SN-002"],
        ))
        .await
        .expect("sale failed");

    services
        .stock_ops
        .void_stock(sale.id, Uuid::new_v4(), None)
        .await
        .expect("void failed");

    let balance = services
        .stock_ops
        .current_balance(variation.id, location.id)
        .await
        .unwrap();
    assert_eq!(balance, dec!(2));

    let unit = services
        .serials
        .find_unit(business_id, variation.id, "SN-001")
        .await
        .expect("unit lookup failed");
    assert_eq!(unit.status, SerialStatus::InStock);
    assert_eq!(unit.current_location_id, location.id);

    let history = services.serials.history(unit.id).await.expect("history failed");
    let kinds: Vec<_> = history.iter().map(|m| m.movement_type).collect();
    assert_eq!(
        kinds,
        vec![
            SerialMovementType::Received,
            SerialMovementType::Sold,
            SerialMovementType::Void,
        ]
    );
}

#[tokio::test]
async fn transferring_serialized_stock_moves_the_units() {
    let (db, services) = common::setup().await;
    let business_id = Uuid::new_v4();
    let source = common::create_location(db.as_ref(), business_id, "Source").await;
    let destination = common::create_location(db.as_ref(), business_id, "Destination").await;
    let variation =
        common::create_variation(db.as_ref(), business_id, "SER-5", dec!(99.00), true).await;

    services
        .serials
        .receive_serialized(receive_req(
            business_id,
            source.id,
            variation.id,
            &["SN-001", "SN-002"],
        ))
        .await
        .expect("receive failed");

    services
        .stock_ops
        .transfer_stock(TransferStockRequest {
            business_id,
            from_location_id: source.id,
            to_location_id: destination.id,
            variation_id: variation.id,
            quantity: dec!(1),
            notes: None,
            actor_id: Uuid::new_v4(),
            serial_numbers: vec!["SN-002".to_string()],
        })
        .await
        .expect("transfer failed");

    let moved = services
        .serials
        .find_unit(business_id, variation.id, "SN-002")
        .await
        .expect("unit lookup failed");
    assert_eq!(moved.current_location_id, destination.id);
    assert_eq!(moved.status, SerialStatus::InStock);

    // Selling the moved unit at its old location must fail.
    let err = services
        .stock_ops
        .remove_stock(sale_req(business_id, source.id, variation.id, dec!(1), &["SN-002"]))
        .await
        .unwrap_err();
    assert_matches!(err, ServiceError::InvalidOperation(_));
}

#[tokio::test]
async fn supplier_returns_are_terminal_for_a_unit() {
    let (db, services) = common::setup().await;
    let business_id = Uuid::new_v4();
    let location = common::create_location(db.as_ref(), business_id, "Main").await;
    let variation =
        common::create_variation(db.as_ref(), business_id, "SER-6", dec!(99.00), true).await;

    services
        .serials
        .receive_serialized(receive_req(business_id, location.id, variation.id, &["SN-001"]))
        .await
        .expect("receive failed");

    let mut req = sale_req(business_id, location.id, variation.id, dec!(1), &["SN-001"]);
    req.movement_type = MovementType::SupplierReturn;
    let movement = services
        .stock_ops
        .remove_stock(req)
        .await
        .expect("supplier return failed");

    let unit = services
        .serials
        .find_unit(business_id, variation.id, "SN-001")
        .await
        .expect("unit lookup failed");
    assert_eq!(unit.status, SerialStatus::ReturnedToSupplier);

    // Voiding the return would need an illegal unit transition.
    let err = services
        .stock_ops
        .void_stock(movement.id, Uuid::new_v4(), None)
        .await
        .unwrap_err();
    assert_matches!(err, ServiceError::InvalidOperation(_));
}
