//! WebSocket host for matches.

use crate::actor::Frame;
use crate::registry::MatchRegistry;
use crate::session::MatchId;
use axum::{
    Json, Router,
    extract::{
        Path, Query, State, WebSocketUpgrade,
        ws::{Message, WebSocket},
    },
    response::Response,
    routing::get,
};
use futures_util::{SinkExt, StreamExt};
use serde::Deserialize;
use tokio::sync::mpsc;
use tracing::{debug, info, instrument, warn};

/// Query parameters of a match connection.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ConnectParams {
    /// Identity the connection acts as.
    pub player_id: String,
    /// Name shown to others; defaults to the player ID.
    #[serde(default)]
    pub display_name: Option<String>,
}

/// Builds the HTTP router.
///
/// - `GET /health` answers `ok`
/// - `GET /matches` lists running match IDs
/// - `GET /matches/{match_id}/ws?playerId=..&displayName=..` joins a match
pub fn router(registry: MatchRegistry) -> Router {
    Router::new()
        .route("/health", get(health))
        .route("/matches", get(list_matches))
        .route("/matches/{match_id}/ws", get(match_socket))
        .with_state(registry)
}

async fn health() -> &'static str {
    "ok"
}

async fn list_matches(State(registry): State<MatchRegistry>) -> Json<Vec<MatchId>> {
    Json(registry.list().await)
}

async fn match_socket(
    ws: WebSocketUpgrade,
    Path(match_id): Path<MatchId>,
    Query(params): Query<ConnectParams>,
    State(registry): State<MatchRegistry>,
) -> Response {
    info!(%match_id, player_id = %params.player_id, "WebSocket upgrade requested");
    ws.on_upgrade(move |socket| handle_socket(socket, registry, match_id, params))
}

#[instrument(skip(socket, registry, params), fields(player_id = %params.player_id))]
async fn handle_socket(
    socket: WebSocket,
    registry: MatchRegistry,
    match_id: MatchId,
    params: ConnectParams,
) {
    let player_id = params.player_id;
    let display_name = params.display_name.unwrap_or_else(|| player_id.clone());
    let (mut sender, mut receiver) = socket.split();
    let (tx, mut rx) = mpsc::unbounded_channel::<Frame>();

    let (handle, connection) = match registry.join(&match_id, &player_id, &display_name, tx).await {
        Ok(joined) => joined,
        Err(e) => {
            warn!(%match_id, %player_id, error = %e, "Could not join match");
            return;
        }
    };

    let mut send_task = tokio::spawn(async move {
        while let Some(frame) = rx.recv().await {
            if sender.send(Message::Text(frame.to_string().into())).await.is_err() {
                break;
            }
        }
    });

    loop {
        tokio::select! {
            _ = &mut send_task => {
                debug!(%match_id, %player_id, "Outbound stream ended");
                break;
            }
            message = receiver.next() => {
                let bytes = match message {
                    Some(Ok(Message::Text(text))) => text.as_str().as_bytes().to_vec(),
                    Some(Ok(Message::Binary(data))) => data.to_vec(),
                    Some(Ok(Message::Close(_))) | None => {
                        debug!(%match_id, %player_id, "Connection closed");
                        break;
                    }
                    Some(Ok(_)) => continue,
                    Some(Err(e)) => {
                        warn!(%match_id, %player_id, error = %e, "WebSocket error");
                        break;
                    }
                };
                if handle.receive(&player_id, bytes).await.is_err() {
                    break;
                }
            }
        }
    }

    if let Err(e) = handle.disconnect(&player_id, connection).await {
        debug!(%match_id, %player_id, error = %e, "Match already closed");
    }
    send_task.abort();
    info!(%match_id, %player_id, "WebSocket connection finished");
}
