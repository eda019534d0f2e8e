// src/server/routes.rs

//! The HTTP surface: the WebSocket endpoint, status and manual-trigger
//! endpoints for the live feed, vote ingestion, health, and log-level control.

use super::context::AppState;
use crate::connection::ConnectionHandler;
use crate::core::LiveResultError;
use crate::core::model::VoteResult;
use crate::core::protocol::{MessageKind, SubscriptionKind};
use axum::extract::ws::WebSocketUpgrade;
use axum::extract::{Query, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use serde::Deserialize;
use serde_json::{Value, json};
use std::time::Duration;
use tower_http::timeout::TimeoutLayer;
use tracing::{error, info, warn};
use tracing_subscriber::filter::EnvFilter;

impl IntoResponse for LiveResultError {
    fn into_response(self) -> Response {
        let status = match &self {
            LiveResultError::NotFound { .. } => StatusCode::NOT_FOUND,
            LiveResultError::InvalidRequest(_) | LiveResultError::MalformedControl(_) => {
                StatusCode::BAD_REQUEST
            }
            LiveResultError::HubUnavailable => StatusCode::SERVICE_UNAVAILABLE,
            _ => StatusCode::INTERNAL_SERVER_ERROR,
        };
        if status == StatusCode::INTERNAL_SERVER_ERROR {
            error!("Request failed: {}", self);
        }
        (status, Json(json!({ "error": self.to_string() }))).into_response()
    }
}

/// Builds the application router with every route under `api.base_path`.
pub fn router(state: AppState) -> Router {
    let handshake_timeout = state.config.connection.handshake_timeout;
    let base_path = state.config.api.base_path.trim_end_matches('/').to_string();

    let api = Router::new()
        .route(
            "/live/ws",
            get(live_ws).layer(handshake_timeout_layer(handshake_timeout)),
        )
        .route("/live/status", get(live_status))
        .route("/live/broadcast", post(trigger_broadcast))
        .route("/live/votes", post(ingest_vote))
        .route("/health", get(health))
        .route("/admin/log-level", get(get_log_level).put(set_log_level))
        .with_state(state);

    if base_path.is_empty() {
        api
    } else {
        Router::new().nest(&base_path, api)
    }
}

/// Upgrades that stall past `timeout` are answered with 408.
fn handshake_timeout_layer(timeout: Duration) -> TimeoutLayer {
    TimeoutLayer::with_status_code(StatusCode::REQUEST_TIMEOUT, timeout)
}

async fn live_ws(State(state): State<AppState>, ws: WebSocketUpgrade) -> Response {
    let clients = state.service.get_connected_clients();
    if clients >= state.config.max_clients {
        warn!(
            connected_clients = clients,
            max_clients = state.config.max_clients,
            "Refusing WebSocket upgrade: client limit reached."
        );
        return (
            StatusCode::SERVICE_UNAVAILABLE,
            Json(json!({ "error": "Too many connected clients" })),
        )
            .into_response();
    }

    let hub = state.service.hub().clone();
    let connection_config = state.config.connection.clone();
    ws.max_message_size(connection_config.max_message_size)
        .on_failed_upgrade(|e| warn!("WebSocket upgrade failed: {}", e))
        .on_upgrade(move |socket| ConnectionHandler::new(hub, connection_config).run(socket))
}

async fn live_status(State(state): State<AppState>) -> Json<Value> {
    let base_path = state.config.api.base_path.trim_end_matches('/');
    Json(json!({
        "status": "active",
        "connected_clients": state.service.get_connected_clients(),
        "websocket_endpoint": format!("{base_path}/live/ws"),
        "supported_subscriptions": SubscriptionKind::ALL_KINDS
            .iter()
            .map(|k| k.as_str())
            .collect::<Vec<_>>(),
        "message_types": MessageKind::BROADCAST_KINDS
            .iter()
            .map(|k| k.as_str())
            .collect::<Vec<_>>(),
    }))
}

#[derive(Deserialize, Debug, Default)]
struct BroadcastParams {
    #[serde(rename = "type")]
    kind: Option<String>,
    election_pair_id: Option<String>,
    region: Option<String>,
}

async fn trigger_broadcast(
    State(state): State<AppState>,
    Query(params): Query<BroadcastParams>,
) -> Result<Json<Value>, LiveResultError> {
    let kind = params.kind.unwrap_or_else(|| "all".to_string());
    let election_pair_id = params.election_pair_id.unwrap_or_default();
    let region = params.region.unwrap_or_default();

    let clients = state.service.get_connected_clients();
    if clients == 0 {
        return Ok(Json(json!({
            "message": "No connected clients, broadcast skipped",
            "clients": 0,
        })));
    }

    let service = &state.service;
    match kind.as_str() {
        "statistics" => service.broadcast_statistics_update().await?,
        "election" => {
            if election_pair_id.is_empty() {
                return Err(LiveResultError::InvalidRequest(
                    "election_pair_id is required for election broadcast".into(),
                ));
            }
            service.broadcast_election_update(&election_pair_id).await?
        }
        "region" => {
            if region.is_empty() {
                return Err(LiveResultError::InvalidRequest(
                    "region is required for region broadcast".into(),
                ));
            }
            service.broadcast_region_update(&region).await?
        }
        "all" => {
            service
                .broadcast_all_updates(Some(&election_pair_id), Some(&region))
                .await?
        }
        other => {
            return Err(LiveResultError::InvalidRequest(format!(
                "Invalid broadcast type '{other}'"
            )));
        }
    }

    info!(kind = %kind, clients, "Manual broadcast triggered.");
    Ok(Json(json!({
        "message": "Broadcast triggered successfully",
        "type": kind,
        "election_pair_id": election_pair_id,
        "region": region,
        "clients": clients,
    })))
}

async fn ingest_vote(
    State(state): State<AppState>,
    Json(vote): Json<VoteResult>,
) -> Result<(StatusCode, Json<Value>), LiveResultError> {
    let vote_id = vote.vote_id;
    state.service.ingest_vote(vote).await?;
    Ok((
        StatusCode::ACCEPTED,
        Json(json!({ "message": "Vote result accepted", "vote_id": vote_id })),
    ))
}

async fn health(State(state): State<AppState>) -> Json<Value> {
    Json(json!({
        "status": "ok",
        "version": crate::VERSION,
        "connected_clients": state.service.get_connected_clients(),
    }))
}

#[derive(Deserialize, Debug)]
struct LogLevelRequest {
    level: String,
}

async fn get_log_level(State(state): State<AppState>) -> Json<Value> {
    let level = state.log_level.lock().clone();
    Json(json!({ "level": level }))
}

async fn set_log_level(
    State(state): State<AppState>,
    Json(request): Json<LogLevelRequest>,
) -> Result<Json<Value>, LiveResultError> {
    let new_filter = EnvFilter::try_new(&request.level).map_err(|e| {
        LiveResultError::InvalidRequest(format!("Invalid log level '{}': {e}", request.level))
    })?;
    let Some(handle) = &state.log_reload_handle else {
        return Err(LiveResultError::Internal(
            "log level reloading is not available".into(),
        ));
    };
    handle.reload(new_filter).map_err(|e| {
        LiveResultError::Internal(format!("Failed to reload log level: {e}"))
    })?;
    *state.log_level.lock() = request.level.clone();
    info!("Log level dynamically changed to '{}'", request.level);
    Ok(Json(json!({ "level": request.level })))
}
