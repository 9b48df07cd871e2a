use std::{net::SocketAddr, sync::Arc};

use axum::{
    body::{to_bytes, Body},
    extract::State,
    http::{header, HeaderMap, StatusCode},
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use serde_json::{json, Value};
use tokio::net::TcpListener;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use c3poh_core::{errors::Error, ports::NotifySink, Result};

use crate::payload::normalize;

/// Largest accepted request body.
pub const MAX_BODY_BYTES: usize = 64 * 1024;

#[derive(Clone)]
struct ListenerState {
    sink: Arc<dyn NotifySink>,
}

/// Routes: `POST /notify`, `GET /health`, 404 for everything else.
pub fn router(sink: Arc<dyn NotifySink>) -> Router {
    Router::new()
        .route("/notify", post(notify).fallback(not_found))
        .route("/health", get(health).fallback(not_found))
        .fallback(not_found)
        .with_state(ListenerState { sink })
}

/// Bind the listener socket. Non-loopback addresses are refused.
pub async fn bind(addr: SocketAddr) -> Result<TcpListener> {
    if !addr.ip().is_loopback() {
        return Err(Error::Config(format!(
            "refusing to bind notification listener on non-loopback address {addr}"
        )));
    }
    Ok(TcpListener::bind(addr).await?)
}

/// Serve on an already-bound socket until `shutdown` is cancelled.
pub async fn serve_on(
    listener: TcpListener,
    sink: Arc<dyn NotifySink>,
    shutdown: CancellationToken,
) -> Result<()> {
    if let Ok(local) = listener.local_addr() {
        info!(addr = %local, "notification listener started");
    }
    axum::serve(listener, router(sink))
        .with_graceful_shutdown(async move { shutdown.cancelled().await })
        .await?;
    info!("notification listener stopped");
    Ok(())
}

pub async fn serve(
    addr: SocketAddr,
    sink: Arc<dyn NotifySink>,
    shutdown: CancellationToken,
) -> Result<()> {
    let listener = bind(addr).await?;
    serve_on(listener, sink, shutdown).await
}

async fn notify(State(state): State<ListenerState>, headers: HeaderMap, body: Body) -> Response {
    let declared = headers
        .get(header::CONTENT_LENGTH)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.trim().parse::<usize>().ok());
    if declared.is_some_and(|len| len > MAX_BODY_BYTES) {
        return too_large();
    }

    let raw = match to_bytes(body, MAX_BODY_BYTES).await {
        Ok(raw) => raw,
        Err(e) => {
            debug!(error = %e, "notify body rejected while reading");
            return too_large();
        }
    };

    let payload: Value = match serde_json::from_slice(&raw) {
        Ok(v) => v,
        Err(_) => return error_response(StatusCode::BAD_REQUEST, "Invalid JSON"),
    };

    let Some(text) = normalize(&payload) else {
        return error_response(StatusCode::BAD_REQUEST, "No message content found");
    };

    match state.sink.deliver(text).await {
        Ok(()) => (StatusCode::OK, Json(json!({ "ok": true }))).into_response(),
        Err(e) => {
            warn!(error = %e, "notification delivery failed");
            error_response(StatusCode::INTERNAL_SERVER_ERROR, &e.to_string())
        }
    }
}

async fn health() -> Json<Value> {
    Json(json!({ "status": "ok", "service": "c3poh" }))
}

async fn not_found() -> Response {
    error_response(StatusCode::NOT_FOUND, "Not found")
}

fn too_large() -> Response {
    error_response(StatusCode::PAYLOAD_TOO_LARGE, "Payload too large")
}

fn error_response(status: StatusCode, message: &str) -> Response {
    (status, Json(json!({ "error": message }))).into_response()
}
