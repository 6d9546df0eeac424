//! API server lifecycle.
//!
//! bind → spawn background task → return handle with shutdown channel.

use std::net::SocketAddr;

use thiserror::Error;
use tokio::sync::oneshot;
use tokio::task::JoinHandle;

use crate::api::router::api_router;
use crate::api::types::AppState;

#[derive(Error, Debug)]
pub enum ServerError {
    #[error("Failed to bind {addr}: {source}")]
    Bind {
        addr: String,
        source: std::io::Error,
    },

    #[error("Failed to get server address: {0}")]
    LocalAddr(std::io::Error),
}

/// Handle to a running API server.
#[derive(Debug)]
pub struct ApiServer {
    pub addr: SocketAddr,
    shutdown_tx: Option<oneshot::Sender<()>>,
    task: Option<JoinHandle<()>>,
}

impl ApiServer {
    /// Signal graceful shutdown. Safe to call more than once.
    pub fn shutdown(&mut self) {
        if let Some(tx) = self.shutdown_tx.take() {
            let _ = tx.send(());
            tracing::info!("API server shutdown signal sent");
        }
    }

    /// Wait for the server task to finish.
    pub async fn stopped(mut self) {
        if let Some(task) = self.task.take() {
            if let Err(e) = task.await {
                tracing::error!("API server task failed: {e}");
            }
        }
    }
}

/// Bind `bind_addr` and serve the API in a background task.
pub async fn start_api_server(state: AppState, bind_addr: &str) -> Result<ApiServer, ServerError> {
    let listener = tokio::net::TcpListener::bind(bind_addr)
        .await
        .map_err(|source| ServerError::Bind {
            addr: bind_addr.to_string(),
            source,
        })?;
    let addr = listener.local_addr().map_err(ServerError::LocalAddr)?;

    let app = api_router(state);
    let (shutdown_tx, shutdown_rx) = oneshot::channel::<()>();

    let task = tokio::spawn(async move {
        let shutdown_signal = async move {
            let _ = shutdown_rx.await;
            tracing::info!("API server received shutdown signal");
        };

        tracing::info!(%addr, "API server started");

        if let Err(e) = axum::serve(listener, app)
            .with_graceful_shutdown(shutdown_signal)
            .await
        {
            tracing::error!("API server error: {e}");
        }

        tracing::info!("API server stopped");
    });

    Ok(ApiServer {
        addr,
        shutdown_tx: Some(shutdown_tx),
        task: Some(task),
    })
}

// ═══════════════════════════════════════════════════════════
// Tests
// ═══════════════════════════════════════════════════════════

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use tokio::io::{AsyncReadExt, AsyncWriteExt};

    use super::*;
    use crate::config::AppConfig;
    use crate::pipeline::gateway::mock::ScriptedClient;
    use crate::pipeline::segmentation::PdfExtractSource;
    use crate::report::PdfReportAssembler;

    fn test_state() -> AppState {
        let tmp = std::env::temp_dir().join("soc2_server_test");
        AppState::new(
            &AppConfig::default(),
            Arc::new(PdfExtractSource),
            Arc::new(ScriptedClient::new(vec![])),
            Arc::new(PdfReportAssembler::new(tmp)),
        )
    }

    async fn raw_get(addr: SocketAddr, path: &str) -> String {
        let mut stream = tokio::net::TcpStream::connect(addr).await.unwrap();
        let request = format!("GET {path} HTTP/1.1\r\nHost: localhost\r\nConnection: close\r\n\r\n");
        stream.write_all(request.as_bytes()).await.unwrap();
        let mut response = String::new();
        stream.read_to_string(&mut response).await.unwrap();
        response
    }

    #[tokio::test]
    async fn serves_health_and_stops() {
        let mut server = start_api_server(test_state(), "127.0.0.1:0").await.unwrap();
        assert!(server.addr.port() > 0);

        let response = raw_get(server.addr, "/health").await;
        assert!(response.starts_with("HTTP/1.1 200"));
        assert!(response.contains("\"status\":\"ok\""));

        let response = raw_get(server.addr, "/nonexistent").await;
        assert!(response.starts_with("HTTP/1.1 404"));

        server.shutdown();
        server.shutdown();
        server.stopped().await;
    }

    #[tokio::test]
    async fn bind_failure_is_reported() {
        let err = start_api_server(test_state(), "not-an-address").await.unwrap_err();
        assert!(matches!(err, ServerError::Bind { .. }));
    }
}
