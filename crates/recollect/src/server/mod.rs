//! HTTP binding of the memory store
//!
//! One store per server process. Every engine operation is exposed as a
//! JSON endpoint; engine errors map onto HTTP status codes.

pub mod handlers;

use std::net::SocketAddr;
use std::sync::Arc;

use axum::{
    Json, Router,
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, post},
};
use tokio::net::TcpListener;
use tokio::signal;
use tower_http::trace::TraceLayer;

use crate::config::ServerConfig;
use crate::error::{RecollectError, Result};
use crate::memory::MemoryStore;

use handlers::*;

/// An engine error rendered as `{"error": <kind>, "message": <text>}`
#[derive(Debug)]
pub struct ApiError(pub RecollectError);

impl From<RecollectError> for ApiError {
    fn from(err: RecollectError) -> Self {
        Self(err)
    }
}

impl ApiError {
    pub fn status(&self) -> StatusCode {
        match self.0 {
            RecollectError::NotFound(_) => StatusCode::NOT_FOUND,
            RecollectError::InvalidFilter(_) => StatusCode::BAD_REQUEST,
            RecollectError::Storage(_) | RecollectError::Config(_) => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
        }
    }

    pub fn kind(&self) -> &'static str {
        match self.0 {
            RecollectError::NotFound(_) => "not_found",
            RecollectError::InvalidFilter(_) => "invalid_filter",
            RecollectError::Storage(_) => "storage",
            RecollectError::Config(_) => "config",
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status();
        if status.is_server_error() {
            tracing::error!(error = %self.0, "Request failed");
        } else {
            tracing::debug!(error = %self.0, "Request rejected");
        }

        let body = serde_json::json!({
            "error": self.kind(),
            "message": self.0.to_string(),
        });
        (status, Json(body)).into_response()
    }
}

/// Create the router with all routes configured
pub fn create_router(store: Arc<MemoryStore>) -> Router {
    Router::new()
        .route("/health", get(health_handler))
        .route("/memories", post(store_handler).get(list_handler))
        .route(
            "/memories/{id}",
            get(get_handler)
                .patch(update_handler)
                .delete(delete_handler),
        )
        .route("/memories/delete", post(bulk_delete_handler))
        .route("/memories/archive", post(archive_handler))
        .route("/memories/restore", post(restore_handler))
        .route("/memories/categorize", post(categorize_handler))
        .route("/memories/consolidate", post(consolidate_handler))
        .route("/memories/{id}/related", get(related_handler))
        .route("/memories/{id}/validate", post(validate_handler))
        .route("/search", post(search_handler))
        .route("/links", post(link_handler))
        .route("/reflect", post(reflect_handler))
        .route("/stats", get(stats_handler))
        .route("/maintenance/decay", post(decay_handler))
        .route("/maintenance/expire", post(expire_handler))
        .route("/maintenance/compact", post(compact_handler))
        .layer(TraceLayer::new_for_http())
        .with_state(store)
}

/// Serve on an already bound listener until `shutdown` resolves
pub async fn serve_on<F>(listener: TcpListener, store: Arc<MemoryStore>, shutdown: F) -> Result<()>
where
    F: std::future::Future<Output = ()> + Send + 'static,
{
    axum::serve(listener, create_router(store))
        .with_graceful_shutdown(shutdown)
        .await
        .map_err(|e| RecollectError::Storage(format!("Server error: {e}")))
}

/// Bind `config.listen_addr` and serve until Ctrl+C or SIGTERM
pub async fn serve(config: &ServerConfig, store: Arc<MemoryStore>) -> Result<()> {
    let addr: SocketAddr = config
        .listen_addr
        .parse()
        .map_err(|e| RecollectError::Config(format!("Invalid listen address: {e}")))?;

    let listener = TcpListener::bind(addr)
        .await
        .map_err(|e| RecollectError::Storage(format!("Failed to bind to {addr}: {e}")))?;

    tracing::info!("Serving memory API on {addr}");
    serve_on(listener, store, shutdown_signal()).await?;

    tracing::info!("Server shut down gracefully");
    Ok(())
}

/// Wait for shutdown signal (Ctrl+C or SIGTERM)
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            tracing::error!("Failed to install Ctrl+C handler: {e}");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut stream) => {
                stream.recv().await;
            }
            Err(e) => {
                tracing::error!("Failed to install SIGTERM handler: {e}");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            tracing::info!("Received Ctrl+C, initiating graceful shutdown");
        },
        _ = terminate => {
            tracing::info!("Received SIGTERM, initiating graceful shutdown");
        },
    }
}
