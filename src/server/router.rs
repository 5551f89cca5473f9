//! HTTP routes
//!
//! Each WebSocket route upgrades the request and hands the socket to the
//! matching [`Hub`] path. The upgrade task owns the connection for its whole
//! life.

use std::net::SocketAddr;
use std::sync::Arc;

use axum::extract::ws::{WebSocket, WebSocketUpgrade};
use axum::extract::{ConnectInfo, State};
use axum::response::IntoResponse;
use axum::routing::get;
use axum::Router;

use crate::hub::Hub;
use crate::server::config::ServerConfig;
use crate::transport::WsTransport;

/// Build the router for `hub` using the routes in `config`
///
/// Serve it with `into_make_service_with_connect_info::<SocketAddr>()` so the
/// handlers can see the peer address.
pub fn hub_router(hub: Arc<Hub>, config: &ServerConfig) -> Router {
    Router::new()
        .route(&config.chat_path, get(chat_handler))
        .route(&config.feed_path, get(feed_handler))
        .route(&config.health_path, get(health_handler))
        .with_state(hub)
}

async fn health_handler() -> &'static str {
    "ok"
}

async fn chat_handler(
    ws: WebSocketUpgrade,
    State(hub): State<Arc<Hub>>,
    ConnectInfo(peer): ConnectInfo<SocketAddr>,
) -> impl IntoResponse {
    ws.on_upgrade(move |socket| handle_chat(socket, hub, peer))
}

async fn feed_handler(
    ws: WebSocketUpgrade,
    State(hub): State<Arc<Hub>>,
    ConnectInfo(peer): ConnectInfo<SocketAddr>,
) -> impl IntoResponse {
    ws.on_upgrade(move |socket| handle_feed(socket, hub, peer))
}

async fn handle_chat(socket: WebSocket, hub: Arc<Hub>, peer: SocketAddr) {
    tracing::debug!(peer = %peer, "Chat upgrade complete");
    hub.on_chat_connection(WsTransport::new(socket, peer.to_string()))
        .await;
}

async fn handle_feed(socket: WebSocket, hub: Arc<Hub>, peer: SocketAddr) {
    tracing::debug!(peer = %peer, "Feed upgrade complete");
    hub.on_feed_connection(WsTransport::new(socket, peer.to_string()))
        .await;
}
