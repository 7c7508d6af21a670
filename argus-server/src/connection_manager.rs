// WebSocket Connection Manager
// One live connection per exam session; tracks metadata and outbound channels

use crate::messages::ServerMessage;
use argus_core::SessionId;
use argus_eye::frame::now_secs;
use metrics::gauge;
use parking_lot::RwLock;
use serde::Serialize;
use std::collections::HashMap;
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

/// Item queued for a connection's send task
#[derive(Debug, Clone)]
pub enum Outgoing {
    Message(ServerMessage),
    Close { reason: String },
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ConnectionMetadata {
    pub connection_id: String,
    pub connected_at: f64,
    pub frames_processed: u64,
}

struct Connection {
    metadata: ConnectionMetadata,
    sender: mpsc::UnboundedSender<Outgoing>,
}

pub struct ConnectionManager {
    connections: RwLock<HashMap<SessionId, Connection>>,
    max_connections: usize,
}

impl ConnectionManager {
    pub fn new(max_connections: usize) -> Self {
        Self {
            connections: RwLock::new(HashMap::new()),
            max_connections,
        }
    }

    /// Register a connection for `session_id`.
    ///
    /// Fails when the server is full or the session already has a live
    /// connection.
    pub fn register(
        &self,
        session_id: &str,
        connection_id: &str,
        sender: mpsc::UnboundedSender<Outgoing>,
    ) -> Result<(), String> {
        let mut connections = self.connections.write();

        if connections.contains_key(session_id) {
            return Err(format!("Session {} already has an active connection", session_id));
        }
        if connections.len() >= self.max_connections {
            return Err(format!(
                "Maximum connections ({}) reached",
                self.max_connections
            ));
        }

        connections.insert(
            session_id.to_string(),
            Connection {
                metadata: ConnectionMetadata {
                    connection_id: connection_id.to_string(),
                    connected_at: now_secs(),
                    frames_processed: 0,
                },
                sender,
            },
        );
        gauge!("argus_ws_connections").set(connections.len() as f64);

        info!(
            "WebSocket connected: {} ({} active)",
            session_id,
            connections.len()
        );
        Ok(())
    }

    /// Remove the connection if it is still the one identified by
    /// `connection_id`
    pub fn unregister(&self, session_id: &str, connection_id: &str) -> bool {
        let mut connections = self.connections.write();

        let owned = connections
            .get(session_id)
            .is_some_and(|c| c.metadata.connection_id == connection_id);
        if !owned {
            return false;
        }

        connections.remove(session_id);
        gauge!("argus_ws_connections").set(connections.len() as f64);
        info!(
            "WebSocket disconnected: {} ({} active)",
            session_id,
            connections.len()
        );
        true
    }

    /// Queue a message for the session's connection
    pub fn send(&self, session_id: &str, message: ServerMessage) -> bool {
        let connections = self.connections.read();
        let Some(connection) = connections.get(session_id) else {
            warn!("No connection for session {}", session_id);
            return false;
        };

        connection.sender.send(Outgoing::Message(message)).is_ok()
    }

    pub fn record_frame(&self, session_id: &str) {
        if let Some(connection) = self.connections.write().get_mut(session_id) {
            connection.metadata.frames_processed += 1;
        }
    }

    pub fn metadata(&self, session_id: &str) -> Option<ConnectionMetadata> {
        self.connections
            .read()
            .get(session_id)
            .map(|c| c.metadata.clone())
    }

    /// Active sessions with their metadata, ordered by session id
    pub fn sessions(&self) -> Vec<(SessionId, ConnectionMetadata)> {
        let mut sessions: Vec<_> = self
            .connections
            .read()
            .iter()
            .map(|(id, c)| (id.clone(), c.metadata.clone()))
            .collect();
        sessions.sort_by(|a, b| a.0.cmp(&b.0));
        sessions
    }

    pub fn is_connected(&self, session_id: &str) -> bool {
        self.connections.read().contains_key(session_id)
    }

    pub fn count(&self) -> usize {
        self.connections.read().len()
    }

    /// Ask every connection to close and forget them all
    pub fn close_all(&self, reason: &str) -> usize {
        let drained: Vec<(SessionId, Connection)> = self.connections.write().drain().collect();

        for (session_id, connection) in &drained {
            let close = Outgoing::Close {
                reason: reason.to_string(),
            };
            if connection.sender.send(close).is_err() {
                debug!("Connection for {} already gone", session_id);
            }
        }

        gauge!("argus_ws_connections").set(0.0);
        info!("Closed {} WebSocket connections", drained.len());
        drained.len()
    }
}
