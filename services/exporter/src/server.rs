use crate::error::{ExporterError, Result};
use axum::{extract::State, http::header, response::IntoResponse, routing::get, Json, Router};
use metrics_exporter_prometheus::PrometheusHandle;
use std::net::SocketAddr;
use tokio::net::TcpListener;
use tower_http::trace::TraceLayer;
use tracing::{error, info};

/// Prometheus text exposition content type
const EXPOSITION_CONTENT_TYPE: &str = "text/plain; version=0.0.4";

/// Create the exposition router
pub fn create_router(handle: PrometheusHandle) -> Router {
    Router::new()
        .route("/metrics", get(render_metrics))
        .route("/health", get(health_check))
        .layer(TraceLayer::new_for_http())
        .with_state(handle)
}

/// Current value of every published series
async fn render_metrics(State(handle): State<PrometheusHandle>) -> impl IntoResponse {
    ([(header::CONTENT_TYPE, EXPOSITION_CONTENT_TYPE)], handle.render())
}

/// Health check endpoint
async fn health_check() -> impl IntoResponse {
    Json(serde_json::json!({
        "status": "healthy",
        "service": "s3-bucket-exporter"
    }))
}

/// Bind the exposition listener and serve it in the background
///
/// Returns once the listener is bound. Failing to bind is the only fatal
/// error of the exporter.
pub async fn start_metrics_server(handle: PrometheusHandle, port: u16) -> Result<SocketAddr> {
    let addr = SocketAddr::from(([0, 0, 0, 0], port));

    let listener = TcpListener::bind(addr)
        .await
        .map_err(|e| ExporterError::Bind {
            addr: addr.to_string(),
            message: e.to_string(),
        })?;

    let local_addr = listener.local_addr().unwrap_or(addr);
    let app = create_router(handle);

    tokio::spawn(async move {
        if let Err(e) = axum::serve(listener, app).await {
            error!(error = %e, "Metrics server error");
        }
    });

    info!(addr = %local_addr, "Metrics server listening");

    Ok(local_addr)
}
