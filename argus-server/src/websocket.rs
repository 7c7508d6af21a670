// WebSocket handler for real-time frame analysis

use crate::connection_manager::Outgoing;
use crate::messages::{decode_base64_frame, ClientMessage, ServerMessage};
use crate::AppState;
use axum::{
    extract::{
        ws::{close_code, CloseFrame, Message, WebSocket, WebSocketUpgrade},
        Path, State,
    },
    response::Response,
};
use futures_util::{SinkExt, StreamExt};
use metrics::counter;
use tokio::sync::mpsc;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

/// WebSocket upgrade handler for `/ws/:session_id`
pub async fn websocket_handler(
    ws: WebSocketUpgrade,
    Path(session_id): Path<String>,
    State(state): State<AppState>,
) -> Response {
    ws.on_upgrade(move |socket| handle_socket(socket, state, session_id))
}

async fn handle_socket(socket: WebSocket, state: AppState, session_id: String) {
    let connection_id = Uuid::new_v4().to_string();
    let (mut sender, mut receiver) = socket.split();
    let (tx, mut rx) = mpsc::unbounded_channel::<Outgoing>();

    if let Err(e) = state
        .connections
        .register(&session_id, &connection_id, tx.clone())
    {
        warn!("Rejected WebSocket connection for {}: {}", session_id, e);
        if let Ok(json) = ServerMessage::error(e.clone()).to_json() {
            let _ = sender.send(Message::Text(json)).await;
        }
        let _ = sender
            .send(Message::Close(Some(CloseFrame {
                code: close_code::POLICY,
                reason: e.into(),
            })))
            .await;
        return;
    }

    counter!("argus_ws_connections_total").increment(1);
    state
        .connections
        .send(&session_id, ServerMessage::connected(&session_id));

    // Outbound: serialize queued messages onto the socket
    let send_session = session_id.clone();
    let mut send_task = tokio::spawn(async move {
        while let Some(outgoing) = rx.recv().await {
            match outgoing {
                Outgoing::Message(message) => {
                    let json = match message.to_json() {
                        Ok(json) => json,
                        Err(e) => {
                            error!("Failed to serialize message for {}: {}", send_session, e);
                            continue;
                        }
                    };
                    if let Err(e) = sender.send(Message::Text(json)).await {
                        warn!("Failed to send to {}: {}", send_session, e);
                        break;
                    }
                }
                Outgoing::Close { reason } => {
                    let _ = sender
                        .send(Message::Close(Some(CloseFrame {
                            code: close_code::NORMAL,
                            reason: reason.into(),
                        })))
                        .await;
                    break;
                }
            }
        }
    });

    // Inbound: frames are handled one at a time, in arrival order
    let recv_state = state.clone();
    let recv_session = session_id.clone();
    let mut recv_task = tokio::spawn(async move {
        while let Some(msg) = receiver.next().await {
            let reply = match msg {
                Ok(Message::Text(text)) => handle_text(&text, &recv_session, &recv_state).await,
                Ok(Message::Binary(bytes)) => {
                    process_frame(&bytes, None, &recv_session, &recv_state).await
                }
                Ok(Message::Close(_)) => {
                    debug!("WebSocket for {} closed by client", recv_session);
                    break;
                }
                Ok(Message::Ping(_)) | Ok(Message::Pong(_)) => continue,
                Err(e) => {
                    warn!("WebSocket error for {}: {}", recv_session, e);
                    break;
                }
            };

            if tx.send(Outgoing::Message(reply)).is_err() {
                break;
            }
        }
    });

    tokio::select! {
        _ = &mut send_task => {
            debug!("Send task finished for {}", session_id);
            recv_task.abort();
        }
        _ = &mut recv_task => {
            debug!("Receive task finished for {}", session_id);
            send_task.abort();
        }
    }

    state.connections.unregister(&session_id, &connection_id);
    state.pipeline.clear_session(&session_id);
    info!("WebSocket session ended: {}", session_id);
}

async fn handle_text(text: &str, session_id: &str, state: &AppState) -> ServerMessage {
    match ClientMessage::parse(text) {
        Ok(ClientMessage::Frame { data, timestamp }) => match decode_base64_frame(&data) {
            Ok(bytes) => process_frame(&bytes, timestamp, session_id, state).await,
            Err(e) => {
                warn!("Undecodable frame payload from {}: {:?}", session_id, e);
                ServerMessage::error(e.client_message())
            }
        },
        Ok(ClientMessage::Ping) => ServerMessage::pong(),
        Ok(ClientMessage::GetStats) => match state.pipeline.session_summary(session_id) {
            Ok(summary) => ServerMessage::stats(session_id, summary),
            Err(e) => ServerMessage::error(e.to_string()),
        },
        Err(e) => {
            debug!("Unhandled message from {}: {:?}", session_id, e);
            ServerMessage::error(e.client_message())
        }
    }
}

async fn process_frame(
    bytes: &[u8],
    timestamp: Option<f64>,
    session_id: &str,
    state: &AppState,
) -> ServerMessage {
    match state.pipeline.process_encoded(session_id, bytes, timestamp).await {
        Ok(analysis) => {
            state.connections.record_frame(session_id);
            debug!(
                "Analysis for {}: risk={:.1} level={} skipped={}",
                session_id,
                analysis.risk.risk_score,
                analysis.risk.alert_level,
                analysis.metadata.frame_skipped
            );
            ServerMessage::analysis(session_id, analysis)
        }
        Err(e) => {
            warn!("Frame from {} rejected: {}", session_id, e);
            ServerMessage::error("Invalid frame format")
        }
    }
}
