//! argus-server: HTTP and WebSocket transport for the proctoring pipeline

pub mod connection_manager;
pub mod http;
pub mod messages;
pub mod websocket;

use argus_eye::ProctorPipeline;
use connection_manager::ConnectionManager;
use std::sync::Arc;
use tracing::info;

pub use http::build_router;

/// Shared handler state
#[derive(Clone)]
pub struct AppState {
    pub pipeline: Arc<ProctorPipeline>,
    pub connections: Arc<ConnectionManager>,
}

impl AppState {
    pub fn new(pipeline: ProctorPipeline) -> Self {
        let max_connections = pipeline.config().server.max_connections;
        Self {
            pipeline: Arc::new(pipeline),
            connections: Arc::new(ConnectionManager::new(max_connections)),
        }
    }

    /// Close every connection and release all sessions
    pub fn shutdown(&self) {
        let closed = self.connections.close_all("Server shutdown");
        self.pipeline.shutdown();
        info!("Server state released ({} connections closed)", closed);
    }
}
