//! MCP over HTTP with Server-Sent Events.
//!
//! A client opens `GET /sse` and receives an `endpoint` event naming its
//! private `POST /messages?session_id=..` URL. Each JSON-RPC message posted
//! there is acknowledged with 202 and its response, if any, is delivered as a
//! `message` event on the open stream. Closing the stream ends the session.

use crate::app::App;
use crate::constants::network::{SSE_KEEPALIVE_SECS, SSE_SESSION_QUEUE};
use crate::errors::ServiceError;
use crate::mcp::server::McpServer;
use crate::services::logger::Logger;
use axum::extract::{Query, State};
use axum::http::StatusCode;
use axum::response::sse::{Event, KeepAlive, Sse};
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use dashmap::DashMap;
use futures::stream::{self, Stream, StreamExt};
use serde::Deserialize;
use serde_json::{json, Value};
use std::convert::Infallible;
use std::sync::Arc;
use std::time::Duration;
use tokio::net::TcpListener;
use tokio::sync::mpsc;

type Sessions = Arc<DashMap<String, mpsc::Sender<String>>>;

#[derive(Clone)]
struct SseState {
    server: Arc<McpServer>,
    sessions: Sessions,
    logger: Logger,
}

#[derive(Debug, Deserialize)]
struct MessageQuery {
    session_id: String,
}

/// Removes the session when its event stream is dropped.
struct SessionGuard {
    id: String,
    sessions: Sessions,
    logger: Logger,
}

impl Drop for SessionGuard {
    fn drop(&mut self) {
        if self.sessions.remove(&self.id).is_some() {
            self.logger
                .info("SSE session closed", Some(&json!({"session_id": self.id})));
        }
    }
}

async fn root() -> Json<Value> {
    Json(json!({
        "name": "netshow",
        "transport": "sse",
        "version": env!("CARGO_PKG_VERSION"),
        "endpoints": {
            "sse": "/sse",
            "messages": "/messages?session_id=<id> (POST)",
            "health": "/health",
        },
        "documentation": "Connect MCP clients to /sse",
    }))
}

async fn health() -> Json<Value> {
    Json(json!({"status": "healthy", "transport": "sse"}))
}

async fn open_stream(
    State(state): State<SseState>,
) -> Sse<impl Stream<Item = Result<Event, Infallible>>> {
    let id = uuid::Uuid::new_v4().to_string();
    let (tx, rx) = mpsc::channel::<String>(SSE_SESSION_QUEUE);
    state.sessions.insert(id.clone(), tx);
    state
        .logger
        .info("SSE session opened", Some(&json!({"session_id": id})));

    let endpoint = Event::default()
        .event("endpoint")
        .data(format!("/messages?session_id={}", id));
    let guard = SessionGuard {
        id,
        sessions: state.sessions.clone(),
        logger: state.logger.clone(),
    };
    let messages = stream::unfold((rx, guard), |(mut rx, guard)| async move {
        let payload = rx.recv().await?;
        Some((
            Ok::<_, Infallible>(Event::default().event("message").data(payload)),
            (rx, guard),
        ))
    });
    let events = stream::once(async move { Ok::<_, Infallible>(endpoint) }).chain(messages);
    Sse::new(events)
        .keep_alive(KeepAlive::new().interval(Duration::from_secs(SSE_KEEPALIVE_SECS)))
}

async fn post_message(
    State(state): State<SseState>,
    Query(query): Query<MessageQuery>,
    body: String,
) -> Response {
    let Some(sender) = state
        .sessions
        .get(&query.session_id)
        .map(|entry| entry.value().clone())
    else {
        return (
            StatusCode::NOT_FOUND,
            Json(json!({"detail": "Unknown or expired session"})),
        )
            .into_response();
    };

    let server = state.server.clone();
    let logger = state.logger.clone();
    let session_id = query.session_id;
    tokio::spawn(async move {
        let Some(response) = server.handle_line(body.trim()).await else {
            return;
        };
        if sender.send(response.to_line()).await.is_err() {
            logger.warn(
                "SSE session went away before its response was delivered",
                Some(&json!({"session_id": session_id})),
            );
        }
    });
    (StatusCode::ACCEPTED, "Accepted").into_response()
}

/// Routes for the SSE transport, independent of the REST API.
pub fn router(app: App) -> Router {
    let logger = app.logger.child("mcp-sse");
    let state = SseState {
        server: Arc::new(McpServer::new(app)),
        sessions: Arc::new(DashMap::new()),
        logger,
    };
    Router::new()
        .route("/", get(root))
        .route("/health", get(health))
        .route("/sse", get(open_stream))
        .route("/messages", post(post_message))
        .with_state(state)
}

pub struct SseServer {
    app: App,
    host: String,
    port: u16,
}

impl SseServer {
    pub fn new(app: App, host: impl Into<String>, port: u16) -> Self {
        Self {
            app,
            host: host.into(),
            port,
        }
    }

    pub async fn run(self) -> Result<(), ServiceError> {
        let addr = format!("{}:{}", self.host, self.port);
        let listener = TcpListener::bind(&addr).await.map_err(|err| {
            ServiceError::configuration(format!(
                "Failed to bind MCP SSE server on {}: {}",
                addr, err
            ))
        })?;
        let logger = self.app.logger.child("mcp-sse");
        logger.info(
            "MCP SSE server listening",
            Some(&json!({"addr": addr, "sse": "/sse"})),
        );
        axum::serve(listener, router(self.app))
            .await
            .map_err(|err| ServiceError::internal(format!("MCP SSE server error: {}", err)))?;
        Ok(())
    }
}
