use crate::dispatch::Dispatcher;
use crate::envelope::Envelope;
use axum::extract::rejection::JsonRejection;
use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::routing::{get, post};
use axum::{Json, Router};
use ragraph_core::error::ErrorCode;
use serde::Deserialize;
use serde_json::Value;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::{error, info};

#[derive(Clone)]
pub struct AppState {
    pub dispatcher: Arc<Dispatcher>,
    /// Cancelled on shutdown; every request runs under a child of it.
    pub shutdown: CancellationToken,
}

impl AppState {
    pub fn new(dispatcher: Dispatcher) -> Self {
        Self {
            dispatcher: Arc::new(dispatcher),
            shutdown: CancellationToken::new(),
        }
    }
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub struct InvokeRequest {
    pub arguments: Value,
}

async fn invoke_api(
    State(state): State<AppState>,
    Path(operation): Path<String>,
    request: Result<Json<InvokeRequest>, JsonRejection>,
) -> (StatusCode, Json<Value>) {
    let envelope = match request {
        Ok(Json(request)) => {
            let cancel = state.shutdown.child_token();
            state
                .dispatcher
                .handle(&operation, request.arguments, &cancel)
                .await
        }
        Err(rejection) => bad_request(&rejection.body_text()),
    };
    to_response(envelope)
}

fn to_response(envelope: Envelope) -> (StatusCode, Json<Value>) {
    let status = StatusCode::from_u16(envelope.status_code)
        .unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
    match envelope.to_transport() {
        Ok(payload) => (status, Json(payload)),
        Err(err) => {
            error!("failed to encode envelope: {err}");
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                Json(serde_json::json!({ "data": Value::Null })),
            )
        }
    }
}

async fn health_api() -> &'static str {
    "ok"
}

pub fn make_router(state: AppState) -> Router {
    Router::new()
        .route("/healthz", get(health_api))
        .route("/v1/{operation}", post(invoke_api))
        .with_state(state)
}

/// Resolves on ctrl-c and cancels `shutdown`, which aborts in-flight operations.
pub async fn shutdown_signal(shutdown: CancellationToken) {
    tokio::select! {
        result = tokio::signal::ctrl_c() => {
            if let Err(err) = result {
                error!("failed to listen for ctrl-c: {err}");
                std::future::pending::<()>().await;
            }
            info!("shutdown requested");
        }
        _ = shutdown.cancelled() => {}
    }
    shutdown.cancel();
}

fn bad_request(message: &str) -> Envelope {
    Envelope::failure(400, ErrorCode::InvalidArgument, message)
}
