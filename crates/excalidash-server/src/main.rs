//! ExcaliDash Collaboration Server
//!
//! Groups live connections into per-document rooms and relays element updates,
//! cursors and presence between them. Drawings themselves are served from a
//! file store over plain HTTP.
//!
//! ## Protocol
//!
//! JSON text frames on `/ws`, tagged by `type`:
//! ```json
//! { "type": "join-room", "documentId": "d1", "user": { "id": "...", "name": "Jazz", ... } }
//! { "type": "user-activity", "documentId": "d1", "isActive": false }
//! { "type": "cursor-move", "documentId": "d1", "userId": "...", "pointer": { "x": 1, "y": 2 }, ... }
//! { "type": "element-update", "documentId": "d1", "elements": [...], "senderId": "..." }
//! { "type": "presence-update", "peers": [...] }
//! ```

mod config;
mod drawings;
mod rooms;
mod ws;

use std::sync::Arc;

use axum::{routing::get, Router};
use clap::Parser;
use excalidash_core::storage::FileStorage;
use tower_http::{cors::CorsLayer, trace::TraceLayer};
use tracing::info;

use crate::config::ServerConfig;
use crate::rooms::RoomCoordinator;

/// Shared application state
#[derive(Clone)]
pub struct AppState {
    pub rooms: Arc<RoomCoordinator>,
    pub storage: Arc<FileStorage>,
}

pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/", get(index))
        .route("/ws", get(ws::ws_handler))
        .route("/health", get(health))
        .route(
            "/drawings",
            get(drawings::list_drawings).post(drawings::create_drawing),
        )
        .route(
            "/drawings/{id}",
            get(drawings::get_drawing).put(drawings::update_drawing),
        )
        .layer(CorsLayer::permissive())
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "excalidash_server=info,tower_http=info".into()),
        )
        .init();

    let config = ServerConfig::parse();
    let storage = config.open_storage()?;
    info!("Drawings stored in {}", storage.base_path().display());

    let state = AppState {
        rooms: Arc::new(RoomCoordinator::new()),
        storage: Arc::new(storage),
    };

    let addr = config.addr();
    info!("ExcaliDash server listening on {}", addr);
    info!("WebSocket endpoint: ws://{}/ws", addr);

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, router(state)).await?;
    Ok(())
}

/// Index page
async fn index() -> &'static str {
    "ExcaliDash Server - Connect via WebSocket at /ws"
}

/// Health check
async fn health() -> &'static str {
    "ok"
}
