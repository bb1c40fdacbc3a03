//! Static fixture server for the demo pages
//!
//! Serves a directory over HTTP with a `/health` endpoint the test runner
//! polls before starting a suite.

use std::net::SocketAddr;
use std::path::Path;

use axum::{response::IntoResponse, routing::get, Json, Router};
use tower_http::services::ServeDir;
use tower_http::trace::TraceLayer;
use tracing::info;

/// Router serving `root`, with `/health` taking precedence over files
pub fn router(root: impl AsRef<Path>) -> Router {
    Router::new()
        .route("/health", get(health_handler))
        .fallback_service(ServeDir::new(root.as_ref()).append_index_html_on_directories(true))
        .layer(TraceLayer::new_for_http())
}

/// Bind `addr` and serve `root` until the process is stopped
pub async fn serve(addr: SocketAddr, root: impl AsRef<Path>) -> anyhow::Result<()> {
    let root = root.as_ref();
    if !root.is_dir() {
        anyhow::bail!("fixture root {} is not a directory", root.display());
    }

    let listener = tokio::net::TcpListener::bind(addr).await?;
    info!(
        "Serving {} on http://{}",
        root.display(),
        listener.local_addr()?
    );
    axum::serve(listener, router(root)).await?;

    Ok(())
}

async fn health_handler() -> impl IntoResponse {
    Json(serde_json::json!({
        "status": "ok",
        "service": "vizcheck-fixtures"
    }))
}
