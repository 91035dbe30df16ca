use std::sync::Arc;

use futures::{SinkExt, StreamExt};
use shuttle_axum::axum::{
    extract::{
        ws::{Message, WebSocket, WebSocketUpgrade},
        State,
    },
    response::IntoResponse,
    routing::get,
    Json, Router,
};
use tower_http::cors::CorsLayer;

use crate::broadcast::Registry;
use crate::event::Event;
use crate::history::History;

#[derive(Clone)]
pub struct AppState {
    pub registry: Arc<Registry>,
    pub history: Arc<History>,
}

pub fn create_router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(|| async { "ok" }))
        .route("/ws/news", get(ws_news))
        .route("/debug/history", get(debug_history))
        .layer(CorsLayer::very_permissive())
        .with_state(state)
}

/// WebSocket upgrade for the live news stream: history replay first,
/// oldest to newest, then live events until either side goes away.
async fn ws_news(ws: WebSocketUpgrade, State(state): State<AppState>) -> impl IntoResponse {
    ws.on_upgrade(move |socket| handle_socket(socket, state))
}

async fn handle_socket(socket: WebSocket, state: AppState) {
    let (mut sender, mut receiver) = socket.split();

    // join() already queued the history snapshot into rx.
    let (id, mut rx) = state.registry.join();

    let send_task = tokio::spawn(async move {
        while let Some(event) = rx.recv().await {
            match serde_json::to_string(&event) {
                Ok(json) => {
                    if sender.send(Message::Text(json.into())).await.is_err() {
                        break; // client disconnected
                    }
                }
                Err(e) => {
                    tracing::warn!(error = ?e, "failed to serialize event");
                }
            }
        }
    });

    // We expect nothing useful from the client; reading only detects the
    // close/disconnect.
    let recv_task = tokio::spawn(async move {
        while let Some(msg) = receiver.next().await {
            match msg {
                Ok(Message::Close(_)) | Err(_) => break,
                _ => {}
            }
        }
    });

    tokio::select! {
        _ = send_task => {},
        _ = recv_task => {},
    }

    state.registry.leave(id);
    tracing::debug!(id, "websocket connection closed");
}

async fn debug_history(State(state): State<AppState>) -> Json<Vec<Event>> {
    Json(state.history.snapshot())
}
