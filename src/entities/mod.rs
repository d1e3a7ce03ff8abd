pub mod idempotency_record;
pub mod location;
pub mod product_variation;
pub mod serial_movement;
pub mod serial_unit;
pub mod stock_correction;
pub mod stock_level;
pub mod stock_movement;
