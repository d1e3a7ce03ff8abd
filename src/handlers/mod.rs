use axum::routing::{get, post};
use axum::Router;

use crate::AppState;

pub mod corrections;
pub mod health;
pub mod reports;
pub mod serials;
pub mod stock;

/// All versioned API routes. Mounted under `/api/v1` by the binary.
pub fn api_routes() -> Router<AppState> {
    Router::new()
        .route("/stock/add", post(stock::add_stock))
        .route("/stock/remove", post(stock::remove_stock))
        .route("/stock/transfer", post(stock::transfer_stock))
        .route("/stock/movements/:id", get(stock::get_movement))
        .route("/stock/movements/:id/void", post(stock::void_movement))
        .route("/stock/levels", get(stock::get_level))
        .route(
            "/corrections",
            post(corrections::create).get(corrections::list),
        )
        .route("/corrections/:id", get(corrections::get))
        .route("/corrections/:id/approve", post(corrections::approve))
        .route("/corrections/:id/delete", post(corrections::delete))
        .route("/serials/receive", post(serials::receive))
        .route("/serials", get(serials::list_units))
        .route("/serials/unit", get(serials::find_unit))
        .route("/serials/:id/history", get(serials::history))
        .route("/reconciliation/summary", get(reports::reconciliation_summary))
        .route("/reconciliation/audit", get(reports::reconciliation_audit))
        .route("/reconciliation/rebuild", post(reports::rebuild_level))
        .route("/reports/ledger", get(reports::ledger_report))
        .route("/reports/movements", get(reports::recent_movements))
        .route("/idempotency/purge", post(stock::purge_idempotency))
}
