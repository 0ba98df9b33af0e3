use std::sync::Arc;

use axum::{
    extract::{
        State,
        ws::{Message, WebSocket, WebSocketUpgrade},
    },
    response::Response,
};
use tracing::{error, info, warn};

use crate::{server::AppState, voice::protocol::RelayMessage};

/// GET /v1/voice: the bot shell attaches here.
pub async fn voice_handler(ws: WebSocketUpgrade, State(state): State<Arc<AppState>>) -> Response {
    ws.on_upgrade(move |socket| handle_socket(socket, state))
}

pub async fn handle_socket(mut socket: WebSocket, state: Arc<AppState>) {
    let bridge = state.bridge.clone();
    let (link_id, rx) = bridge.attach();

    let ready = RelayMessage::Ready {
        version: env!("CARGO_PKG_VERSION").to_string(),
    };
    if let Ok(json) = serde_json::to_string(&ready) {
        if let Err(e) = socket.send(Message::Text(json.into())).await {
            error!("Socket send error (ready): link={} err={}", link_id, e);
            bridge.detach(link_id);
            return;
        }
    }

    loop {
        tokio::select! {
            msg = rx.recv_async() => {
                let Ok(msg) = msg else {
                    info!("Voice bridge {} replaced; closing its socket", link_id);
                    break;
                };
                if let Err(e) = socket.send(msg).await {
                    error!("Socket send error: link={} err={}", link_id, e);
                    break;
                }
            }
            msg = socket.recv() => {
                let msg = match msg {
                    Some(Ok(msg)) => msg,
                    Some(Err(e)) => {
                        warn!("WebSocket error: link={} err={}", link_id, e);
                        break;
                    }
                    None => break,
                };

                match msg {
                    Message::Text(text) => bridge.handle_text(text.as_str()),
                    Message::Binary(_) => {
                        warn!("Ignoring binary frame from voice shell {}", link_id);
                    }
                    Message::Close(_) => break,
                    _ => {}
                }
            }
        }
    }

    bridge.detach(link_id);
    info!("Voice shell connection closed: {}", link_id);
}
