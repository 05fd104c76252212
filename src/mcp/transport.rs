//! HTTP transport for the MCP server.
//!
//! Routes, on both `/` and `/mcp`:
//!
//! - `POST`: the body is one JSON-RPC message. A reply is written as
//!   `200 OK` with a JSON body (errors included); a notification gets
//!   `202 Accepted` with an empty body. A body over the configured size
//!   limit is answered with a JSON-RPC `-32600` error and a `null` id.
//! - `GET`: opens a `text/event-stream`. The first event is `endpoint`,
//!   whose data is the POST path. The stream then stays open, sending
//!   keep-alive comments, until the client leaves or the server shuts down.
//! - Anything else: `405` with `{"detail": "Method Not Allowed"}`.
//!
//! Unknown paths get `404` with `{"detail": "Not Found"}`.

use std::convert::Infallible;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use axum::body::Bytes;
use axum::extract::rejection::BytesRejection;
use axum::extract::{DefaultBodyLimit, State};
use axum::http::{header, StatusCode, Uri};
use axum::response::sse::{Event, KeepAlive, Sse};
use axum::response::{IntoResponse, Response};
use axum::routing::{get, MethodRouter};
use axum::{Json, Router};
use futures::stream::{self, Stream, StreamExt};
use serde_json::json;
use tokio::net::TcpListener;
use tokio_util::sync::CancellationToken;

use crate::error::ServerError;
use crate::mcp::protocol::JsonRpcError;
use crate::mcp::server::McpServer;

/// Alternative path serving the same endpoints as `/`.
pub const MCP_PATH: &str = "/mcp";

/// Largest POST body accepted unless configured otherwise (64 MiB).
pub const DEFAULT_MAX_BODY_BYTES: usize = 64 * 1024 * 1024;

/// State shared by all HTTP handlers.
#[derive(Clone)]
pub struct AppState {
    server: Arc<McpServer>,
    keepalive: Duration,
    max_body_bytes: usize,
    shutdown: CancellationToken,
    sse_connections: Arc<AtomicU64>,
}

impl AppState {
    /// Creates the state for `server`, sending SSE keep-alives every `keepalive`.
    #[must_use]
    pub fn new(server: Arc<McpServer>, keepalive: Duration) -> Self {
        Self {
            server,
            keepalive,
            max_body_bytes: DEFAULT_MAX_BODY_BYTES,
            shutdown: CancellationToken::new(),
            sse_connections: Arc::new(AtomicU64::new(0)),
        }
    }

    /// Caps POST bodies at `bytes`; `0` removes the cap.
    #[must_use]
    pub const fn with_max_body_bytes(mut self, bytes: usize) -> Self {
        self.max_body_bytes = bytes;
        self
    }

    /// Token that ends open SSE streams and stops [`serve`] when cancelled.
    #[must_use]
    pub fn shutdown_token(&self) -> CancellationToken {
        self.shutdown.clone()
    }

    /// Number of SSE streams currently open.
    #[must_use]
    pub fn active_connections(&self) -> u64 {
        self.sse_connections.load(Ordering::Relaxed)
    }
}

impl std::fmt::Debug for AppState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AppState")
            .field("server", &self.server)
            .field("keepalive", &self.keepalive)
            .field("max_body_bytes", &self.max_body_bytes)
            .field("active_connections", &self.active_connections())
            .finish_non_exhaustive()
    }
}

/// Counts one open SSE stream for as long as it lives.
struct ConnectionGuard {
    connections: Arc<AtomicU64>,
}

impl ConnectionGuard {
    fn new(connections: Arc<AtomicU64>) -> Self {
        let count = connections.fetch_add(1, Ordering::Relaxed) + 1;
        tracing::info!(connections = count, "SSE client connected");
        Self { connections }
    }
}

impl Drop for ConnectionGuard {
    fn drop(&mut self) {
        let count = self
            .connections
            .fetch_sub(1, Ordering::Relaxed)
            .saturating_sub(1);
        tracing::info!(connections = count, "SSE client disconnected");
    }
}

/// Builds the router serving `/` and [`MCP_PATH`].
pub fn router(state: AppState) -> Router {
    let body_limit = match state.max_body_bytes {
        0 => DefaultBodyLimit::disable(),
        bytes => DefaultBodyLimit::max(bytes),
    };

    Router::new()
        .route("/", mcp_routes())
        .route(MCP_PATH, mcp_routes())
        .fallback(not_found)
        .layer(body_limit)
        .with_state(state)
}

fn mcp_routes() -> MethodRouter<AppState> {
    get(handle_sse)
        .post(handle_post)
        .fallback(method_not_allowed)
}

/// Serves HTTP on `listener` until SIGINT/SIGTERM or until the state's
/// shutdown token is cancelled.
///
/// Open SSE streams are closed first; in-flight POSTs are allowed to finish.
///
/// # Errors
///
/// Returns an error if the server fails while accepting connections.
pub async fn serve(listener: TcpListener, state: AppState) -> Result<(), ServerError> {
    let shutdown = state.shutdown_token();

    let signal_token = shutdown.clone();
    let signals = tokio::spawn(async move {
        tokio::select! {
            () = shutdown_signal() => signal_token.cancel(),
            () = signal_token.cancelled() => {}
        }
    });

    if let Ok(addr) = listener.local_addr() {
        tracing::info!(%addr, "Listening for MCP clients");
    }

    let result = axum::serve(listener, router(state))
        .with_graceful_shutdown(async move { shutdown.cancelled().await })
        .await;

    signals.abort();
    result.map_err(ServerError::from)
}

/// Completes on the first shutdown signal.
#[cfg(unix)]
async fn shutdown_signal() {
    use tokio::signal::unix::{signal, SignalKind};

    let (mut sigint, mut sigterm) = match (
        signal(SignalKind::interrupt()),
        signal(SignalKind::terminate()),
    ) {
        (Ok(sigint), Ok(sigterm)) => (sigint, sigterm),
        (Err(e), _) | (_, Err(e)) => {
            tracing::warn!(error = %e, "Cannot install signal handlers, falling back to Ctrl+C");
            if tokio::signal::ctrl_c().await.is_ok() {
                tracing::info!("Received Ctrl+C, initiating graceful shutdown");
            }
            return;
        }
    };

    tokio::select! {
        _ = sigint.recv() => tracing::info!("Received SIGINT, initiating graceful shutdown"),
        _ = sigterm.recv() => tracing::info!("Received SIGTERM, initiating graceful shutdown"),
    }
}

/// Completes on the first shutdown signal.
#[cfg(windows)]
async fn shutdown_signal() {
    if tokio::signal::ctrl_c().await.is_ok() {
        tracing::info!("Received Ctrl+C, initiating graceful shutdown");
    }
}

async fn handle_post(
    State(state): State<AppState>,
    body: Result<Bytes, BytesRejection>,
) -> Response {
    let body = match body {
        Ok(body) => body,
        Err(rejection) => return body_rejected(&state, &rejection),
    };

    let Some(reply) = state.server.handle_message(&body).await else {
        return StatusCode::ACCEPTED.into_response();
    };

    json_reply(&reply)
}

/// Answers an unreadable body with a JSON-RPC error instead of axum's
/// plain-text rejection.
fn body_rejected(state: &AppState, rejection: &BytesRejection) -> Response {
    let error = if rejection.status() == StatusCode::PAYLOAD_TOO_LARGE {
        tracing::warn!(limit = state.max_body_bytes, "Rejected oversized POST body");
        JsonRpcError::invalid_request(
            None,
            format!(
                "Invalid Request: body exceeds {} bytes",
                state.max_body_bytes
            ),
        )
    } else {
        tracing::warn!(error = %rejection, "Failed to read POST body");
        JsonRpcError::parse_error(None, format!("Parse error: {}", rejection.body_text()))
    };

    json_reply(&error)
}

fn json_reply<T: serde::Serialize>(reply: &T) -> Response {
    match serde_json::to_vec(reply) {
        Ok(json) => (
            StatusCode::OK,
            [(header::CONTENT_TYPE, "application/json")],
            json,
        )
            .into_response(),
        Err(e) => {
            tracing::error!(error = %e, "Failed to serialise JSON-RPC reply");
            detail(StatusCode::INTERNAL_SERVER_ERROR, "Internal Server Error")
        }
    }
}

async fn handle_sse(
    State(state): State<AppState>,
    uri: Uri,
) -> Sse<impl Stream<Item = Result<Event, Infallible>>> {
    let guard = ConnectionGuard::new(Arc::clone(&state.sse_connections));

    let endpoint = Event::default().event("endpoint").data(uri.path());

    let closed = state.shutdown.clone().cancelled_owned();
    let until_shutdown = async move {
        closed.await;
        drop(guard);
    };

    let events = stream::once(async move { Ok::<_, Infallible>(endpoint) })
        .chain(stream::pending())
        .take_until(until_shutdown);

    Sse::new(events).keep_alive(
        KeepAlive::new()
            .interval(state.keepalive)
            .text("keep-alive"),
    )
}

async fn method_not_allowed() -> Response {
    detail(StatusCode::METHOD_NOT_ALLOWED, "Method Not Allowed")
}

async fn not_found() -> Response {
    detail(StatusCode::NOT_FOUND, "Not Found")
}

fn detail(status: StatusCode, message: &str) -> Response {
    (status, Json(json!({ "detail": message }))).into_response()
}
