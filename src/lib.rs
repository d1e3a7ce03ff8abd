pub mod audit;
pub mod config;
pub mod db;
pub mod entities;
pub mod errors;
pub mod events;
pub mod handlers;
pub mod migrator;
pub mod services;

use std::sync::Arc;

use crate::config::AppConfig;
use crate::db::DbPool;
use crate::services::AppServices;

/// Shared state handed to every handler.
#[derive(Clone)]
pub struct AppState {
    pub db: Arc<DbPool>,
    pub config: Arc<AppConfig>,
    pub services: AppServices,
}

impl AppState {
    pub fn new(db: Arc<DbPool>, config: Arc<AppConfig>, services: AppServices) -> Self {
        Self {
            db,
            config,
            services,
        }
    }
}
