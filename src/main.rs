use std::net::SocketAddr;
use std::sync::Arc;

use anyhow::Context;
use axum::routing::get;
use axum::Router;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;
use tracing::info;

use stockledger_api::{
    config::{init_tracing, load_config},
    db::{establish_connection_from_app_config, run_migrations},
    events::{event_channel, process_events},
    handlers::{self, health},
    services::AppServices,
    AppState,
};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let config = load_config().context("failed to load configuration")?;
    init_tracing(config.log_level(), config.log_json);
    info!(
        "Starting stockledger-api in {} mode",
        config.environment
    );

    let db = Arc::new(
        establish_connection_from_app_config(&config)
            .await
            .context("failed to connect to database")?,
    );
    if config.auto_migrate {
        run_migrations(db.as_ref())
            .await
            .context("failed to run migrations")?;
    }

    let (event_sender, event_receiver) = event_channel();
    tokio::spawn(process_events(event_receiver));

    let config = Arc::new(config);
    let services = AppServices::new(db.clone(), event_sender, &config);
    let state = AppState::new(db, config.clone(), services);

    let app = Router::new()
        .route("/health", get(health::health))
        .nest("/api/v1", handlers::api_routes())
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
        .with_state(state);

    let addr: SocketAddr = format!("{}:{}", config.host, config.port)
        .parse()
        .context("invalid host/port configuration")?;
    info!("Listening on {}", addr);

    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .context("failed to bind listener")?;
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("server error")?;

    info!("Shutdown complete");
    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        let _ = tokio::signal::ctrl_c().await;
    };

    #[cfg(unix)]
    let terminate = async {
        use tokio::signal::unix::{signal, SignalKind};
        match signal(SignalKind::terminate()) {
            Ok(mut stream) => {
                stream.recv().await;
            }
            Err(_) => std::future::pending::<()>().await,
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
    info!("Shutdown signal received");
}
