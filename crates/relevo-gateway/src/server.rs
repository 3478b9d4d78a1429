//! Gateway HTTP server: Axum router over the request handler

use std::future::Future;
use std::net::SocketAddr;
use std::sync::Arc;

use axum::extract::State;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use tower_http::cors::CorsLayer;
use tracing::{debug, error, info};

use relevo_core::{HandoffError, RequestHandler};

use crate::protocol::{ChatRequest, ErrorBody, MSG_REQUEST_FAILED, MSG_REQUEST_TIMED_OUT};

/// Shared state for all HTTP handlers
#[derive(Clone)]
pub struct GatewayState {
    pub handler: Arc<RequestHandler>,
    pub start_time: std::time::Instant,
}

/// The gateway server
pub struct GatewayServer {
    state: GatewayState,
    bind: SocketAddr,
}

impl GatewayServer {
    /// Create a new gateway server
    pub fn new(bind: SocketAddr, handler: Arc<RequestHandler>) -> Self {
        let state = GatewayState {
            handler,
            start_time: std::time::Instant::now(),
        };
        Self { state, bind }
    }

    /// Build the Axum router
    pub fn router(&self) -> Router {
        Router::new()
            .route("/chat", post(chat_handler))
            .route("/api/status", get(status_handler))
            .route("/api/sessions", get(sessions_handler))
            .layer(CorsLayer::permissive())
            .with_state(self.state.clone())
    }

    /// Serve until `shutdown` resolves
    pub async fn run<F>(self, shutdown: F) -> anyhow::Result<()>
    where
        F: Future<Output = ()> + Send + 'static,
    {
        let router = self.router();
        let listener = tokio::net::TcpListener::bind(self.bind).await?;
        info!("Gateway listening on {}", self.bind);

        axum::serve(listener, router)
            .with_graceful_shutdown(shutdown)
            .await?;

        info!("Gateway stopped");
        Ok(())
    }
}

// ── HTTP Handlers ──

async fn chat_handler(
    State(state): State<GatewayState>,
    Json(req): Json<ChatRequest>,
) -> Response {
    debug!(
        "POST /chat session '{}' ({} chars)",
        req.session_id,
        req.message.len()
    );
    match state.handler.handle(&req.session_id, &req.message).await {
        Ok(reply) => Json(reply).into_response(),
        Err(e) => {
            error!("Chat request for session '{}' failed: {}", req.session_id, e);
            error_response(&e).into_response()
        }
    }
}

async fn status_handler(State(state): State<GatewayState>) -> impl IntoResponse {
    let sessions = state.handler.store().count().await;
    let uptime = state.start_time.elapsed().as_secs();

    Json(serde_json::json!({
        "status": "ok",
        "sessions": sessions,
        "uptime_secs": uptime,
    }))
}

async fn sessions_handler(State(state): State<GatewayState>) -> impl IntoResponse {
    let sessions = state.handler.store().list().await;
    Json(serde_json::json!({ "sessions": sessions }))
}

fn error_response(err: &HandoffError) -> (StatusCode, Json<ErrorBody>) {
    if err.is_timeout() {
        (
            StatusCode::GATEWAY_TIMEOUT,
            Json(ErrorBody::new(MSG_REQUEST_TIMED_OUT)),
        )
    } else {
        (
            StatusCode::INTERNAL_SERVER_ERROR,
            Json(ErrorBody::new(MSG_REQUEST_FAILED)),
        )
    }
}
