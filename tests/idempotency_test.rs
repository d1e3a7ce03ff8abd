mod common;

use chrono::{Duration, Utc};
use rust_decimal_macros::dec;
use sea_orm::sea_query::Expr;
use sea_orm::{ColumnTrait, EntityTrait, QueryFilter};
use uuid::Uuid;

use stockledger_api::{
    entities::{idempotency_record, stock_movement::MovementType},
    services::stock_operations::AddStockRequest,
};

fn add_req(
    business_id: Uuid,
    location_id: Uuid,
    variation_id: Uuid,
    actor_id: Uuid,
) -> AddStockRequest {
    AddStockRequest {
        business_id,
        location_id,
        variation_id,
        movement_type: MovementType::Purchase,
        quantity: dec!(10),
        unit_cost: None,
        reference_type: None,
        reference_id: None,
        notes: None,
        actor_id,
    }
}

/// Ages every guard record past the lookback window.
async fn age_records(db: &stockledger_api::db::DbPool, by: Duration) {
    idempotency_record::Entity::update_many()
        .col_expr(
            idempotency_record::Column::CreatedAt,
            Expr::value(Utc::now() - by),
        )
        .exec(db)
        .await
        .expect("failed to age records");
}

#[tokio::test]
async fn requests_outside_the_window_are_not_duplicates() {
    let (db, services) = common::setup().await;
    let business_id = Uuid::new_v4();
    let location = common::create_location(db.as_ref(), business_id, "Main").await;
    let variation =
        common::create_variation(db.as_ref(), business_id, "IDEM-1", dec!(10.00), false).await;
    let actor_id = Uuid::new_v4();

    services
        .stock_ops
        .add_stock(add_req(business_id, location.id, variation.id, actor_id))
        .await
        .expect("first add failed");

    // Same request again, but the original now predates the window.
    age_records(db.as_ref(), Duration::seconds(301)).await;
    services
        .stock_ops
        .add_stock(add_req(business_id, location.id, variation.id, actor_id))
        .await
        .expect("post-window add failed");

    let balance = services
        .stock_ops
        .current_balance(variation.id, location.id)
        .await
        .unwrap();
    assert_eq!(balance, dec!(20));
}

#[tokio::test]
async fn different_movement_types_are_distinct_requests() {
    let (db, services) = common::setup().await;
    let business_id = Uuid::new_v4();
    let location = common::create_location(db.as_ref(), business_id, "Main").await;
    let variation =
        common::create_variation(db.as_ref(), business_id, "IDEM-3", dec!(10.00), false).await;
    let actor_id = Uuid::new_v4();

    services
        .stock_ops
        .add_stock(add_req(business_id, location.id, variation.id, actor_id))
        .await
        .expect("purchase failed");

    // Same actor, key and quantity, but a different movement type.
    let mut return_req = add_req(business_id, location.id, variation.id, actor_id);
    return_req.movement_type = MovementType::CustomerReturn;
    services
        .stock_ops
        .add_stock(return_req)
        .await
        .expect("customer return failed");

    let balance = services
        .stock_ops
        .current_balance(variation.id, location.id)
        .await
        .unwrap();
    assert_eq!(balance, dec!(20));
}

#[tokio::test]
async fn purge_removes_only_expired_records() {
    let (db, services) = common::setup().await;
    let business_id = Uuid::new_v4();
    let location = common::create_location(db.as_ref(), business_id, "Main").await;
    let variation =
        common::create_variation(db.as_ref(), business_id, "IDEM-2", dec!(10.00), false).await;

    services
        .stock_ops
        .add_stock(add_req(business_id, location.id, variation.id, Uuid::new_v4()))
        .await
        .expect("add failed");
    age_records(db.as_ref(), Duration::seconds(301)).await;

    services
        .stock_ops
        .add_stock(add_req(business_id, location.id, variation.id, Uuid::new_v4()))
        .await
        .expect("add failed");

    let purged = services.idempotency.purge_expired().await.expect("purge failed");
    assert_eq!(purged, 1);

    let remaining = idempotency_record::Entity::find()
        .filter(idempotency_record::Column::CreatedAt.gt(Utc::now() - Duration::seconds(300)))
        .all(db.as_ref())
        .await
        .expect("query failed");
    assert_eq!(remaining.len(), 1);
}
