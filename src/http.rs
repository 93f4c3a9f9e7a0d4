//! Streamable HTTP transport.
//!
//! ## Endpoints
//!
//! | Method   | Path      | Description                                          |
//! |----------|-----------|------------------------------------------------------|
//! | `POST`   | `/mcp`    | One JSON-RPC message; JSON response or 202           |
//! | `GET`    | `/mcp`    | Server-sent event stream of the session's responses  |
//! | `DELETE` | `/mcp`    | End the session                                      |
//! | `GET`    | `/health` | Liveness plus session statistics                     |
//!
//! ## Sessions
//!
//! The session id comes from the `Mcp-Session-Id` header, else the
//! `sessionId` query parameter. A request carrying neither starts a new
//! session with a server-generated id. Every POST response echoes the id in
//! `Mcp-Session-Id`. Each session owns its cluster registry; see
//! [`SessionStore`].

use std::convert::Infallible;
use std::future::IntoFuture;
use std::sync::Arc;
use std::time::Duration;

use axum::body::Bytes;
use axum::extract::{Query, State};
use axum::http::{header, HeaderMap, HeaderName, HeaderValue, Method, StatusCode};
use axum::response::sse::{Event, KeepAlive, Sse};
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use futures::StreamExt;
use serde::Deserialize;
use serde_json::{json, Value};
use tokio::net::TcpListener;
use tokio::sync::broadcast;
use tokio_util::sync::CancellationToken;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;
use tracing::{debug, info, warn};

use crate::mcp::{McpServer, SERVER_TITLE, SERVER_VERSION};
use crate::sessions::SessionStore;

pub const SESSION_HEADER: &str = "mcp-session-id";
pub const PROTOCOL_HEADER: &str = "mcp-protocol-version";

/// Shared state for all HTTP handlers.
#[derive(Clone)]
pub struct HttpState {
    pub server: Arc<McpServer>,
    pub sessions: SessionStore,
    /// Cancelled to begin graceful shutdown. Also ends open event streams.
    pub shutdown: CancellationToken,
}

#[derive(Debug, Default, Deserialize)]
struct SessionQuery {
    #[serde(rename = "sessionId")]
    session_id: Option<String>,
}

/// Build the router with CORS and request tracing.
pub fn router(state: HttpState) -> Router {
    let session_header = HeaderName::from_static(SESSION_HEADER);
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods([Method::GET, Method::POST, Method::OPTIONS, Method::DELETE])
        .allow_headers([
            header::CONTENT_TYPE,
            header::ACCEPT,
            HeaderName::from_static(PROTOCOL_HEADER),
            session_header.clone(),
        ])
        .expose_headers([session_header]);

    Router::new()
        .route("/mcp", post(post_mcp).get(get_mcp).delete(delete_mcp))
        .route("/health", get(health))
        .layer(cors)
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

/// Bind `addr` and serve until `state.shutdown` fires, then give in-flight
/// requests `drain` to finish.
pub async fn serve(addr: &str, state: HttpState, drain: Duration) -> std::io::Result<()> {
    let listener = TcpListener::bind(addr).await?;
    info!("Serving MCP over HTTP on http://{}/mcp", listener.local_addr()?);
    serve_on(listener, state, drain).await
}

/// Serve on an already-bound listener.
pub async fn serve_on(
    listener: TcpListener,
    state: HttpState,
    drain: Duration,
) -> std::io::Result<()> {
    let shutdown = state.shutdown.clone();
    let sweeper = state.sessions.spawn_sweeper(shutdown.clone());

    let server = axum::serve(listener, router(state))
        .with_graceful_shutdown(shutdown.clone().cancelled_owned())
        .into_future();
    tokio::pin!(server);

    let drained = async {
        shutdown.cancelled().await;
        info!("Shutting down HTTP transport ({}s drain)", drain.as_secs());
        tokio::time::sleep(drain).await;
    };

    let result = tokio::select! {
        res = &mut server => res,
        () = drained => {
            warn!("Drain period elapsed with requests still in flight");
            Ok(())
        }
    };

    sweeper.abort();
    result
}

/// Session id from the header, else the query string. Empty values count as absent.
fn requested_session(headers: &HeaderMap, query: &SessionQuery) -> Option<String> {
    headers
        .get(SESSION_HEADER)
        .and_then(|v| v.to_str().ok())
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::to_string)
        .or_else(|| query.session_id.clone().filter(|s| !s.is_empty()))
}

fn bad_request(message: &str) -> Response {
    (
        StatusCode::BAD_REQUEST,
        Json(json!({ "error": message })),
    )
        .into_response()
}

async fn post_mcp(
    State(state): State<HttpState>,
    headers: HeaderMap,
    Query(query): Query<SessionQuery>,
    body: Bytes,
) -> Response {
    let id = requested_session(&headers, &query).unwrap_or_else(|| uuid::Uuid::new_v4().to_string());
    let Ok(id_header) = HeaderValue::from_str(&id) else {
        return bad_request("session id must be visible ASCII");
    };

    let session = state.sessions.get_or_create(&id).await;
    if session.created {
        info!(session = %session.id, "New MCP session");
    }

    // Fires if the client disconnects and this future is dropped.
    let cancel = CancellationToken::new();
    let _guard = cancel.clone().drop_guard();

    let response = state
        .server
        .handle_message(&body, &session.clusters, &cancel)
        .await;

    let session_header = [(HeaderName::from_static(SESSION_HEADER), id_header)];
    match response {
        Some(response) => {
            if let Ok(value) = serde_json::to_value(&response) {
                // No subscribers is fine.
                let _ = session.events.send(value);
            }
            (StatusCode::OK, session_header, Json(response)).into_response()
        }
        None => (StatusCode::ACCEPTED, session_header).into_response(),
    }
}

async fn get_mcp(
    State(state): State<HttpState>,
    headers: HeaderMap,
    Query(query): Query<SessionQuery>,
) -> Response {
    let Some(id) = requested_session(&headers, &query) else {
        return bad_request("missing Mcp-Session-Id");
    };
    let Some(session) = state.sessions.get(&id).await else {
        return (StatusCode::NOT_FOUND, Json(json!({ "error": "unknown session" }))).into_response();
    };
    debug!(session = %id, "Event stream opened");

    let events = futures::stream::unfold(session.events.subscribe(), |mut rx| async move {
        loop {
            match rx.recv().await {
                Ok(value) => match Event::default().event("message").json_data(&value) {
                    Ok(event) => return Some((Ok::<_, Infallible>(event), rx)),
                    Err(e) => warn!("Dropping unencodable event: {e}"),
                },
                Err(broadcast::error::RecvError::Lagged(skipped)) => {
                    debug!(skipped, "Event stream lagged");
                }
                Err(broadcast::error::RecvError::Closed) => return None,
            }
        }
    })
    .take_until(state.shutdown.clone().cancelled_owned());

    Sse::new(events).keep_alive(KeepAlive::default()).into_response()
}

async fn delete_mcp(
    State(state): State<HttpState>,
    headers: HeaderMap,
    Query(query): Query<SessionQuery>,
) -> StatusCode {
    let Some(id) = requested_session(&headers, &query) else {
        return StatusCode::BAD_REQUEST;
    };
    if state.sessions.remove(&id).await {
        StatusCode::NO_CONTENT
    } else {
        StatusCode::NOT_FOUND
    }
}

async fn health(State(state): State<HttpState>) -> Json<Value> {
    let sessions = &state.sessions;
    Json(json!({
        "status": "healthy",
        "server": SERVER_TITLE,
        "version": SERVER_VERSION,
        "tools": state.server.tools().len(),
        "sessions": {
            "active": sessions.len().await,
            "distribution": sessions.age_distribution().await,
        },
        "sessionConfig": {
            "idleTimeoutSecs": sessions.idle_timeout().as_secs(),
            "maxLifetimeSecs": sessions.max_lifetime().as_secs(),
            "cleanupIntervalSecs": sessions.sweep_interval().as_secs(),
        },
    }))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn header_wins_over_query() {
        let mut headers = HeaderMap::new();
        headers.insert(SESSION_HEADER, HeaderValue::from_static("from-header"));
        let query = SessionQuery {
            session_id: Some("from-query".into()),
        };
        assert_eq!(requested_session(&headers, &query).as_deref(), Some("from-header"));
        assert_eq!(
            requested_session(&HeaderMap::new(), &query).as_deref(),
            Some("from-query")
        );
    }

    #[test]
    fn blank_ids_are_absent() {
        let mut headers = HeaderMap::new();
        headers.insert(SESSION_HEADER, HeaderValue::from_static("  "));
        let query = SessionQuery {
            session_id: Some(String::new()),
        };
        assert_eq!(requested_session(&headers, &query), None);
    }
}
