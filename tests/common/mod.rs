use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use rust_decimal::Decimal;
use sea_orm::{ActiveModelTrait, Set};
use uuid::Uuid;

use stockledger_api::{
    config::AppConfig,
    db::{establish_connection_with_config, run_migrations, DbConfig, DbPool},
    entities::{location, product_variation},
    events::event_channel,
    services::AppServices,
};

pub fn test_config() -> AppConfig {
    AppConfig {
        database_url: "sqlite::memory:".to_string(),
        host: "127.0.0.1".to_string(),
        port: 0,
        environment: "test".to_string(),
        log_level: "debug".to_string(),
        log_json: false,
        auto_migrate: true,
        transaction_timeout_secs: 30,
        duplicate_window_secs: 300,
        allow_negative_stock: false,
    }
}

/// Fresh in-memory database per test. A single pooled connection keeps the
/// sqlite memory database alive and visible to every query.
pub async fn setup() -> (Arc<DbPool>, AppServices) {
    let db_config = DbConfig {
        url: "sqlite::memory:".to_string(),
        max_connections: 1,
        min_connections: 1,
        connect_timeout: Duration::from_secs(5),
        idle_timeout: Duration::from_secs(600),
        acquire_timeout: Duration::from_secs(5),
    };
    let db = Arc::new(
        establish_connection_with_config(&db_config)
            .await
            .expect("failed to open in-memory database"),
    );
    run_migrations(db.as_ref())
        .await
        .expect("failed to run migrations");

    let (event_sender, event_receiver) = event_channel();
    tokio::spawn(stockledger_api::events::process_events(event_receiver));

    let services = AppServices::new(db.clone(), event_sender, &test_config());
    (db, services)
}

pub async fn create_location(db: &DbPool, business_id: Uuid, name: &str) -> location::Model {
    location::ActiveModel {
        id: Set(Uuid::new_v4()),
        business_id: Set(business_id),
        name: Set(name.to_string()),
        is_active: Set(true),
        created_at: Set(Utc::now()),
    }
    .insert(db)
    .await
    .expect("failed to create location")
}

pub async fn create_inactive_location(db: &DbPool, business_id: Uuid) -> location::Model {
    location::ActiveModel {
        id: Set(Uuid::new_v4()),
        business_id: Set(business_id),
        name: Set("Closed Warehouse".to_string()),
        is_active: Set(false),
        created_at: Set(Utc::now()),
    }
    .insert(db)
    .await
    .expect("failed to create location")
}

pub async fn create_variation(
    db: &DbPool,
    business_id: Uuid,
    sku: &str,
    selling_price: Decimal,
    is_serialized: bool,
) -> product_variation::Model {
    product_variation::ActiveModel {
        id: Set(Uuid::new_v4()),
        business_id: Set(business_id),
        product_id: Set(Uuid::new_v4()),
        sku: Set(sku.to_string()),
        name: Set(format!("Variation {}", sku)),
        selling_price: Set(selling_price),
        default_unit_cost: Set(None),
        is_serialized: Set(is_serialized),
        created_at: Set(Utc::now()),
    }
    .insert(db)
    .await
    .expect("failed to create product variation")
}

pub async fn create_variation_with_cost(
    db: &DbPool,
    business_id: Uuid,
    sku: &str,
    selling_price: Decimal,
    unit_cost: Decimal,
) -> product_variation::Model {
    product_variation::ActiveModel {
        id: Set(Uuid::new_v4()),
        business_id: Set(business_id),
        product_id: Set(Uuid::new_v4()),
        sku: Set(sku.to_string()),
        name: Set(format!("Variation {}", sku)),
        selling_price: Set(selling_price),
        default_unit_cost: Set(Some(unit_cost)),
        is_serialized: Set(false),
        created_at: Set(Utc::now()),
    }
    .insert(db)
    .await
    .expect("failed to create product variation")
}
