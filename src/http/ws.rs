use axum::{
    extract::{
        ws::{Message, WebSocket, WebSocketUpgrade},
        Query, State,
    },
    response::IntoResponse,
};
use futures::{SinkExt, StreamExt};
use serde::Deserialize;
use tokio::sync::mpsc;
use tokio_stream::wrappers::{errors::BroadcastStreamRecvError, BroadcastStream};
use tracing::{debug, info, warn};

use super::AppState;
use crate::sync::{self, ClientMessage, SyncEvent, SyncMessage};

#[derive(Deserialize)]
pub struct WsQuery {
    /// "msgpack" for binary frames, JSON text otherwise
    encoding: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Encoding {
    Json,
    MessagePack,
}

impl Encoding {
    fn from_query(query: &WsQuery) -> Self {
        match query.encoding.as_deref() {
            Some(e) if e.eq_ignore_ascii_case("msgpack") => Encoding::MessagePack,
            _ => Encoding::Json,
        }
    }

    fn encode(self, msg: &SyncMessage) -> Result<Message, String> {
        match self {
            Encoding::Json => sync::encode_json(msg).map(Message::Text),
            Encoding::MessagePack => sync::encode_msgpack(msg).map(Message::Binary),
        }
    }
}

pub async fn ws_handler(
    ws: WebSocketUpgrade,
    Query(query): Query<WsQuery>,
    State(state): State<AppState>,
) -> impl IntoResponse {
    let encoding = Encoding::from_query(&query);
    ws.on_upgrade(move |socket| handle_socket(socket, state, encoding))
}

async fn snapshot_message(state: &AppState) -> Option<SyncMessage> {
    match state.game.snapshot().await {
        Ok(snapshot) => {
            let revision = snapshot.revision;
            Some(SyncMessage::new(
                SyncEvent::StateSnapshot(Box::new(snapshot)),
                Some(revision),
            ))
        }
        Err(e) => {
            warn!("Failed to build state snapshot: {}", e);
            None
        }
    }
}

async fn handle_socket(socket: WebSocket, state: AppState, encoding: Encoding) {
    let (mut sender, mut receiver) = socket.split();

    // Subscribe before the snapshot so nothing committed after it is missed
    let mut events = BroadcastStream::new(state.game.broadcaster().subscribe());
    info!(
        "Dashboard connected ({:?}), {} listening",
        encoding,
        state.game.broadcaster().receiver_count()
    );

    if let Some(msg) = snapshot_message(&state).await {
        match encoding.encode(&msg) {
            Ok(frame) => {
                if sender.send(frame).await.is_err() {
                    return;
                }
            }
            Err(e) => warn!("{}", e),
        }
    }

    // Replies meant only for this client
    let (tx, mut rx) = mpsc::channel::<SyncMessage>(8);

    let mut send_task = tokio::spawn(async move {
        loop {
            let msg = tokio::select! {
                Some(msg) = rx.recv() => msg,
                Some(item) = events.next() => match item {
                    Ok(msg) => msg,
                    Err(BroadcastStreamRecvError::Lagged(skipped)) => {
                        warn!("Dashboard fell behind, {} events dropped", skipped);
                        continue;
                    }
                },
                else => break,
            };

            match encoding.encode(&msg) {
                Ok(frame) => {
                    if sender.send(frame).await.is_err() {
                        break;
                    }
                }
                Err(e) => warn!("{}", e),
            }
        }
    });

    let recv_state = state.clone();
    let mut recv_task = tokio::spawn(async move {
        while let Some(Ok(msg)) = receiver.next().await {
            let decoded = match msg {
                Message::Text(text) => sync::decode_client_text(&text),
                Message::Binary(data) => sync::decode_client_binary(&data),
                Message::Close(_) => break,
                _ => continue,
            };

            match decoded {
                Ok(ClientMessage::Refresh) => {
                    debug!("Dashboard requested a refresh");
                    if let Some(snapshot) = snapshot_message(&recv_state).await {
                        if tx.send(snapshot).await.is_err() {
                            break;
                        }
                    }
                }
                Err(e) => warn!("Error handling message: {}", e),
            }
        }
    });

    // Wait for either task to finish
    tokio::select! {
        _ = &mut send_task => recv_task.abort(),
        _ = &mut recv_task => send_task.abort(),
    }

    info!("Dashboard disconnected");
}
