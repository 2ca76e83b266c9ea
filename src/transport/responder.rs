use std::net::SocketAddr;
use std::sync::Arc;

use axum::extract::State;
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use serde_json::Value;
use tokio::net::TcpListener;
use tokio::sync::RwLock;

use crate::error::TransportError;
use crate::transport::callback::{Callback, CallbackResult};

type Slot = Arc<RwLock<Option<Arc<dyn Callback>>>>;

/// Inbound half of the Transport: an axum HTTP server exposing the fixed
/// set of RPC endpoints described in the transport contract, dispatching
/// each request to whichever [`Callback`] is currently registered for it.
///
/// Endpoints are registered up front with empty slots and filled in later
/// by the Consensus Engine (or left empty, e.g. `/raft/register`, which
/// `Cluster::new` never wires up and which always takes its unregistered-
/// endpoint default response) — this mirrors the contract's separation
/// between "server exists" and "server has been wired to logic".
#[derive(Clone)]
pub struct Responder {
    heartbeat: Slot,
    request_vote: Slot,
    register: Slot,
}

#[derive(Clone)]
struct AppState {
    heartbeat: Slot,
    request_vote: Slot,
    register: Slot,
}

impl Responder {
    pub fn new() -> Self {
        Self {
            heartbeat: Arc::new(RwLock::new(None)),
            request_vote: Arc::new(RwLock::new(None)),
            register: Arc::new(RwLock::new(None)),
        }
    }

    pub async fn set_heartbeat_callback(&self, callback: Arc<dyn Callback>) {
        *self.heartbeat.write().await = Some(callback);
    }

    pub async fn set_request_vote_callback(&self, callback: Arc<dyn Callback>) {
        *self.request_vote.write().await = Some(callback);
    }

    pub async fn set_register_callback(&self, callback: Arc<dyn Callback>) {
        *self.register.write().await = Some(callback);
    }

    fn router(&self) -> Router {
        let state = AppState {
            heartbeat: self.heartbeat.clone(),
            request_vote: self.request_vote.clone(),
            register: self.register.clone(),
        };
        Router::new()
            .route("/ping", get(ping_handler))
            .route("/raft/heartbeat", post(heartbeat_handler))
            .route("/raft/request_vote", post(request_vote_handler))
            .route("/raft/register", post(register_handler))
            .with_state(state)
    }

    /// Binds the listener and drives the server until `shutdown` resolves.
    pub async fn serve(
        &self,
        addr: SocketAddr,
        shutdown: impl std::future::Future<Output = ()> + Send + 'static,
    ) -> Result<(), TransportError> {
        let listener = TcpListener::bind(addr)
            .await
            .map_err(|source| TransportError::BindFailed { addr, source })?;
        tracing::info!(%addr, "responder listening");
        axum::serve(listener, self.router())
            .with_graceful_shutdown(shutdown)
            .await
            .map_err(TransportError::ServerError)
    }
}

impl Default for Responder {
    fn default() -> Self {
        Self::new()
    }
}

async fn ping_handler() -> &'static str {
    "pong"
}

async fn heartbeat_handler(State(state): State<AppState>, Json(body): Json<Value>) -> Response {
    // No callback registered yet: the contract says a heartbeat with nothing
    // listening still succeeds (there is simply nothing to do with it).
    dispatch(&state.heartbeat, body, CallbackResult::ok_empty).await
}

async fn request_vote_handler(State(state): State<AppState>, Json(body): Json<Value>) -> Response {
    // Unlike heartbeat, an unanswered vote request must fail closed — no
    // callback means no vote can be granted.
    dispatch(&state.request_vote, body, CallbackResult::fail).await
}

async fn register_handler(State(state): State<AppState>, Json(body): Json<Value>) -> Response {
    // Scaffolding endpoint: with nothing registered to handle it, register
    // still answers 200 per the wire contract.
    dispatch(&state.register, body, CallbackResult::ok_empty).await
}

async fn dispatch(slot: &Slot, data: Value, default: fn() -> CallbackResult) -> Response {
    let callback = slot.read().await.clone();
    let result = match callback {
        Some(callback) => callback.call(data).await,
        None => default(),
    };
    respond(result)
}

/// Renders a callback's result the way the wire contract describes: an
/// object body goes out verbatim as JSON, anything else goes out as a plain
/// text body of its string form.
fn respond(result: CallbackResult) -> Response {
    let status = if result.success {
        axum::http::StatusCode::OK
    } else {
        axum::http::StatusCode::BAD_REQUEST
    };
    match result.data {
        Value::Object(map) => (status, Json(Value::Object(map))).into_response(),
        Value::String(text) => (status, text).into_response(),
        other => (status, other.to_string()).into_response(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;

    struct Echo;

    #[async_trait]
    impl Callback for Echo {
        async fn call(&self, data: Value) -> CallbackResult {
            CallbackResult::ok(data)
        }
    }

    #[tokio::test]
    async fn unregistered_request_vote_fails_closed() {
        let responder = Responder::new();
        let response = dispatch(&responder.request_vote, serde_json::json!({}), CallbackResult::fail).await;
        assert_eq!(response.status(), axum::http::StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn unregistered_heartbeat_succeeds() {
        let responder = Responder::new();
        let response = dispatch(&responder.heartbeat, serde_json::json!({}), CallbackResult::ok_empty).await;
        assert_eq!(response.status(), axum::http::StatusCode::OK);
    }

    #[tokio::test]
    async fn unregistered_register_succeeds() {
        let responder = Responder::new();
        let response = dispatch(&responder.register, serde_json::json!({}), CallbackResult::ok_empty).await;
        assert_eq!(response.status(), axum::http::StatusCode::OK);
    }

    #[tokio::test]
    async fn registered_callback_is_invoked() {
        let responder = Responder::new();
        responder.set_heartbeat_callback(Arc::new(Echo)).await;
        let response = dispatch(&responder.heartbeat, serde_json::json!({"term": 3}), CallbackResult::ok_empty).await;
        assert_eq!(response.status(), axum::http::StatusCode::OK);
    }
}
