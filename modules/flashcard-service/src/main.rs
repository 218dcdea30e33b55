//! Flashcard Store Service: standalone binary serving the card API and the
//! study UI's static files from one port.
//!
//! Default: http://127.0.0.1:8787/

mod config;
mod model;
mod queue;
mod routes;
mod service;
mod store;

use config::Config;
use routes::AppState;
use service::CardService;
use std::sync::Arc;
use std::time::Instant;
use store::StoreFile;

#[tokio::main]
async fn main() {
    dotenv::dotenv().ok();
    env_logger::init();

    let config = Config::from_env();

    log::info!(
        "Opening card store at: {} (on parse failure: {:?})",
        config.data_path.display(),
        config.on_parse_failure
    );
    let store = Arc::new(StoreFile::new(&config.data_path, config.on_parse_failure));
    store.init().expect("Failed to initialize card store");

    if config.write_token.is_none() {
        log::warn!("CARDS_WRITE_TOKEN not set, all write requests will be rejected");
    }

    let service = Arc::new(CardService::new(store));
    let state = Arc::new(AppState {
        service: service.clone(),
        write_token: config.write_token.clone(),
        start_time: Instant::now(),
    });

    let app = routes::router(
        state,
        config.static_dir.clone(),
        routes::cors_layer(&config.allowed_origin),
    );

    let addr = config.listen_addr();
    log::info!("Flashcard Store Service listening on http://{}", addr);

    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .expect("Failed to bind");

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .expect("Server error");

    log::info!("Flushing queued card writes");
    if let Err(e) = service.flush().await {
        log::error!("Failed to flush card writes on shutdown: {}", e);
    }
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        log::error!("Failed to listen for shutdown signal: {}", e);
        std::future::pending::<()>().await;
    }
    log::info!("Shutdown signal received");
}
