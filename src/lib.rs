//! Guest-facing photo intake service for a single event.
//!
//! Guests upload images over HTTP; the server validates, normalizes and
//! compresses them through the [`photo_ingest`] pipeline, stores them in
//! a SQLite-backed [`photo_ingest::PhotoStore`], and serves a paginated
//! gallery with storage-quota enforcement and an admin deletion path.

use std::net::SocketAddr;

use axum::{
    extract::DefaultBodyLimit,
    http::{header::CONTENT_TYPE, HeaderValue, Method},
    routing::{get, post},
    Router,
};
use log::info;
use tokio::net::TcpListener;
use tokio::signal::{
    ctrl_c,
    unix::{signal, SignalKind},
};
use tower_http::cors::{Any, CorsLayer};

pub mod config;
pub mod error;
pub mod routes;
pub mod state;

use routes::{
    delete_handler, file_handler, health_handler, latest_handler, photo_handler, photos_handler,
    stats_handler, upload_handler,
};
use state::AppState;

pub async fn start_server() {
    env_logger::init();

    info!("Initializing state...");
    let state = AppState::new();

    let cors = match &state.config.cors_origin {
        Some(origin) => CorsLayer::new()
            .allow_origin(
                origin
                    .parse::<HeaderValue>()
                    .expect("Invalid FOTOWAND_CORS_ORIGIN"),
            )
            .allow_methods([Method::GET, Method::POST, Method::DELETE, Method::OPTIONS])
            .allow_headers([CONTENT_TYPE]),
        None => CorsLayer::new()
            .allow_origin(Any)
            .allow_methods([Method::GET, Method::POST, Method::DELETE, Method::OPTIONS])
            .allow_headers(Any),
    };

    let app = Router::new()
        .route("/api/upload", post(upload_handler))
        .route("/api/photos", get(photos_handler))
        .route("/api/latest", get(latest_handler))
        .route("/api/photos/{id}", get(photo_handler).delete(delete_handler))
        .route("/api/photos/{id}/file", get(file_handler))
        .route("/api/stats", get(stats_handler))
        .route("/health", get(health_handler))
        .layer(DefaultBodyLimit::max(state.config.max_upload_bytes))
        .layer(cors)
        .with_state(state.clone());

    let address = format!("{}:{}", state.config.host, state.config.port);
    info!("Binding to {address}");

    let listener = TcpListener::bind(&address).await.expect("Bind failed");
    info!("Server running on {address}");

    axum::serve(
        listener,
        app.into_make_service_with_connect_info::<SocketAddr>(),
    )
    .with_graceful_shutdown(shutdown_signal())
    .await
    .expect("Server failed");

    info!("Server shut down");
}

async fn shutdown_signal() {
    let ctrl_c = async {
        ctrl_c().await.expect("Failed to install Ctrl+C handler");
        info!("Received Ctrl+C, shutting down");
    };

    #[cfg(unix)]
    let terminate = async {
        signal(SignalKind::terminate())
            .expect("Failed to install signal handler")
            .recv()
            .await;
        info!("Received terminate signal, shutting down");
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
}
