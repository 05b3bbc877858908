// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: Apache-2.0
//! Transport (spec.md §6): "one long-lived full-duplex message channel per
//! session carrying length-delimited UTF-8 JSON envelopes of shape
//! `{type, payload}`". This crate keeps the one responsibility spec.md §1
//! leaves in scope for the transport: upgrade a connection, mint a
//! session, and bridge `Inbound`/`Outbound` JSON frames to it. Bearer
//! tokens, pairing, chat-platform bridges, and TLS termination are out of
//! scope (spec.md §1 names auth and concrete framing as external
//! collaborators).

mod session_bridge;

use std::net::SocketAddr;
use std::sync::Arc;

use axum::extract::ws::WebSocketUpgrade;
use axum::extract::State;
use axum::response::Response;
use axum::routing::get;
use axum::Router;
use fenced_config::Config;
use fenced_core::SkillContext;
use tracing::info;

pub use session_bridge::handle_socket;

#[derive(Clone)]
struct AppState {
    config: Arc<Config>,
    skills: SkillContext,
}

/// Build the Axum router: a single `GET /ws` upgrade route. Exposed
/// separately from [`serve`] so tests can exercise it with `axum::serve`
/// against an ephemeral port, or embed it into a larger router.
pub fn router(config: Arc<Config>, skills: SkillContext) -> Router {
    Router::new()
        .route("/ws", get(ws_handler))
        .with_state(AppState { config, skills })
}

async fn ws_handler(ws: WebSocketUpgrade, State(state): State<AppState>) -> Response {
    ws.on_upgrade(move |socket| handle_socket(socket, state.config, state.skills))
}

/// Bind and serve forever (until the process is signalled). One session
/// (one dedicated interpreter thread, per spec.md §3) is minted per
/// accepted WebSocket connection.
pub async fn serve(bind: SocketAddr, config: Arc<Config>, skills: SkillContext) -> anyhow::Result<()> {
    let app = router(config, skills);
    let listener = tokio::net::TcpListener::bind(bind).await?;
    info!(%bind, "fenced gateway listening");
    axum::serve(listener, app).await?;
    Ok(())
}
