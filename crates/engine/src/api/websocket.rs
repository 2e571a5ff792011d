//! WebSocket handling for game client connections.
//!
//! Each connection owns one session. Frames are processed strictly
//! sequentially: a second `command` sent while a turn is in flight waits
//! in the socket until the current turn resolves, so a session never sees
//! interleaved turns.

use std::sync::Arc;

use axum::{
    extract::{
        ws::{Message, WebSocket, WebSocketUpgrade},
        State,
    },
    response::Response,
};
use futures_util::{SinkExt, StreamExt};
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

use dungeonterm_shared::{ClientMessage, ServerMessage};

use crate::app::App;
use crate::infrastructure::rewards::flush_rewards;
use crate::infrastructure::session::GameSession;
use crate::use_cases::turn::{opening_prompt, run_gm_turn};

/// Buffer size for the per-connection message channel.
const CONNECTION_CHANNEL_BUFFER: usize = 256;

/// WebSocket upgrade handler - entry point for new connections.
pub async fn ws_handler(ws: WebSocketUpgrade, State(app): State<Arc<App>>) -> Response {
    ws.on_upgrade(move |socket| handle_socket(socket, app))
}

/// Handle an individual WebSocket connection.
async fn handle_socket(socket: WebSocket, app: Arc<App>) {
    let (mut ws_sender, mut ws_receiver) = socket.split();

    let connection_id = Uuid::new_v4();
    let cancel = CancellationToken::new();
    let (tx, mut rx) = mpsc::channel::<ServerMessage>(CONNECTION_CHANNEL_BUFFER);

    tracing::info!(connection_id = %connection_id, "WebSocket connection established");

    // Forward messages from the channel to the socket.
    let send_task = tokio::spawn(async move {
        while let Some(msg) = rx.recv().await {
            if let Ok(json) = serde_json::to_string(&msg) {
                if ws_sender.send(Message::Text(json.into())).await.is_err() {
                    break;
                }
            }
        }
    });

    loop {
        tokio::select! {
            // The staleness sweep cancels idle connections.
            _ = cancel.cancelled() => {
                tracing::info!(connection_id = %connection_id, "Closing idle connection");
                break;
            }
            frame = ws_receiver.next() => {
                match frame {
                    Some(Ok(Message::Text(text))) => {
                        match serde_json::from_str::<ClientMessage>(&text) {
                            Ok(msg) => {
                                handle_message(&app, connection_id, &cancel, msg, &tx).await;
                            }
                            Err(e) => {
                                tracing::warn!(connection_id = %connection_id, error = %e, "Failed to parse client message");
                                send(&tx, ServerMessage::Error {
                                    text: format!("Invalid message: {}", e),
                                });
                            }
                        }
                    }
                    Some(Ok(Message::Close(_))) => {
                        tracing::info!(connection_id = %connection_id, "WebSocket closed by client");
                        break;
                    }
                    Some(Ok(_)) => {}
                    Some(Err(e)) => {
                        tracing::error!(connection_id = %connection_id, error = %e, "WebSocket error");
                        break;
                    }
                    None => break,
                }
            }
        }
    }

    // A single session's teardown must never affect other sessions: flush
    // rewards off the connection path and drop the registry entry.
    if let Some(session) = app.sessions.destroy(connection_id) {
        let mut s = session.lock().await;
        let grants = s.flush_pending_xp();
        let record = s.adventure_record(0);
        drop(s);
        if !record.token_ids.is_empty() {
            tokio::spawn(flush_rewards(app.rewards.clone(), grants, record));
        }
    }
    send_task.abort();

    tracing::info!(connection_id = %connection_id, "WebSocket connection terminated");
}

fn send(tx: &mpsc::Sender<ServerMessage>, msg: ServerMessage) {
    if tx.try_send(msg).is_err() {
        tracing::warn!("Failed to send message, channel full or closed");
    }
}

async fn handle_message(
    app: &Arc<App>,
    connection_id: Uuid,
    cancel: &CancellationToken,
    msg: ClientMessage,
    tx: &mpsc::Sender<ServerMessage>,
) {
    match msg {
        ClientMessage::Init {
            party,
            locale,
            floor,
            stage_name,
        } => {
            let game = GameSession::new(party, locale, floor, stage_name);
            let (floor, stage) = (game.floor, game.stage_name.clone());
            let session = app.sessions.create(connection_id, game, cancel.clone());

            session
                .lock()
                .await
                .add_user_message(&opening_prompt(floor, stage.as_deref()));

            run_gm_turn(app, &session, tx).await;
        }
        ClientMessage::Command { text } => {
            let Some(session) = app.sessions.lookup(connection_id) else {
                send(
                    tx,
                    ServerMessage::Error {
                        text: "No active session. Send init first.".to_string(),
                    },
                );
                return;
            };

            // Prepend scene + HP context so the GM stays synchronized with
            // the authoritative state.
            {
                let mut s = session.lock().await;
                let context = s.full_context();
                s.add_user_message(&format!("{}\nPlayer: {}", context, text));
            }

            run_gm_turn(app, &session, tx).await;
        }
    }
}
