//! HTTP surface.
//!
//! - `GET /health` is open
//! - `POST /deliver`, `GET /queue` and `POST /queue/{order_id}/resolve` need
//!   `Authorization: Bearer <admin token>`
//! - `POST /player/join` and `POST /player/leave` need `x-listener-token`
//!
//! An unset token disables its check. Token checks run as route layers, so a
//! rejected request never reaches a handler.

use axum::{
    extract::{rejection::JsonRejection, Path, Query, Request, State},
    http::StatusCode,
    middleware::{self, Next},
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use log::{error, warn};
use serde::{Deserialize, Serialize};
use serde_json::json;
use shared::{DeliveryMode, DeliveryReport, DeliveryStatus};
use std::fmt;
use thiserror::Error;

use crate::delivery::{DeliveryOrchestrator, RetryOutcome};
use crate::error::DeliveryError;
use crate::presence::{parse_event_time, PresenceTracker};
use crate::queue::QueueError;
use crate::store::{DatabaseError, QueueEntry};

#[derive(Debug, Error)]
pub enum ApiError {
    #[error("Unauthorized")]
    Unauthorized,

    #[error("{0}")]
    BadRequest(String),

    #[error(transparent)]
    Delivery(#[from] DeliveryError),

    #[error(transparent)]
    Queue(#[from] QueueError),

    #[error(transparent)]
    Database(#[from] DatabaseError),
}

impl ApiError {
    fn status(&self) -> StatusCode {
        match self {
            Self::Unauthorized => StatusCode::UNAUTHORIZED,
            Self::BadRequest(_) => StatusCode::BAD_REQUEST,
            Self::Delivery(e) => match e {
                DeliveryError::OrderNotFound(_) | DeliveryError::ProductNotFound(_) => StatusCode::NOT_FOUND,
                DeliveryError::PaymentNotCompleted => StatusCode::BAD_REQUEST,
                DeliveryError::InProgress { .. } => StatusCode::CONFLICT,
                DeliveryError::NoServersAvailable | DeliveryError::Database(_) => {
                    StatusCode::INTERNAL_SERVER_ERROR
                }
            },
            Self::Queue(e) => match e {
                QueueError::InvalidOutcome(_) => StatusCode::BAD_REQUEST,
                QueueError::NotFound(_) => StatusCode::NOT_FOUND,
                QueueError::Database(_) => StatusCode::INTERNAL_SERVER_ERROR,
            },
            Self::Database(DatabaseError::NotFound(_)) => StatusCode::NOT_FOUND,
            Self::Database(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status();
        if status.is_server_error() {
            error!("Request failed: {}", self);
        }
        (status, Json(json!({ "error": self.to_string() }))).into_response()
    }
}

impl From<JsonRejection> for ApiError {
    fn from(rejection: JsonRejection) -> Self {
        Self::BadRequest(rejection.body_text())
    }
}

/// Shared secrets guarding the two caller groups.
#[derive(Clone, Default)]
pub struct ApiTokens {
    pub admin: Option<String>,
    pub listener: Option<String>,
}

impl fmt::Debug for ApiTokens {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ApiTokens")
            .field("admin", &self.admin.as_ref().map(|_| "[redacted]"))
            .field("listener", &self.listener.as_ref().map(|_| "[redacted]"))
            .finish()
    }
}

impl ApiTokens {
    /// Logs a warning for every check that is switched off.
    pub fn warn_if_open(&self) {
        if self.admin.is_none() {
            warn!("No admin token configured; delivery and queue endpoints are open");
        }
        if self.listener.is_none() {
            warn!("No listener token configured; presence endpoints are open");
        }
    }
}

#[derive(Clone)]
pub struct ApiState {
    pub orchestrator: DeliveryOrchestrator,
    pub presence: PresenceTracker,
}

impl ApiState {
    pub fn new(orchestrator: DeliveryOrchestrator) -> Self {
        Self {
            presence: PresenceTracker::new(orchestrator.clone()),
            orchestrator,
        }
    }
}

pub fn router(state: ApiState, tokens: ApiTokens) -> Router {
    let admin_routes = Router::new()
        .route("/deliver", post(deliver))
        .route("/queue", get(list_queue))
        .route("/queue/{order_id}/resolve", post(resolve_queue))
        .route_layer(middleware::from_fn_with_state(tokens.clone(), require_admin));

    let listener_routes = Router::new()
        .route("/player/join", post(player_join))
        .route("/player/leave", post(player_leave))
        .route_layer(middleware::from_fn_with_state(tokens, require_listener));

    Router::new()
        .route("/health", get(health))
        .merge(admin_routes)
        .merge(listener_routes)
        .with_state(state)
}

async fn require_admin(State(tokens): State<ApiTokens>, request: Request, next: Next) -> Response {
    if let Some(expected) = tokens.admin.as_deref() {
        let presented = request
            .headers()
            .get("authorization")
            .and_then(|v| v.to_str().ok())
            .and_then(|v| v.strip_prefix("Bearer "));
        if presented != Some(expected) {
            warn!("Rejected admin request to {}", request.uri().path());
            return ApiError::Unauthorized.into_response();
        }
    }
    next.run(request).await
}

async fn require_listener(State(tokens): State<ApiTokens>, request: Request, next: Next) -> Response {
    if let Some(expected) = tokens.listener.as_deref() {
        let presented = request
            .headers()
            .get("x-listener-token")
            .and_then(|v| v.to_str().ok());
        if presented != Some(expected) {
            warn!("Rejected presence event to {}", request.uri().path());
            return ApiError::Unauthorized.into_response();
        }
    }
    next.run(request).await
}

async fn health() -> Json<serde_json::Value> {
    Json(json!({ "status": "ok" }))
}

#[derive(Debug, Deserialize)]
pub struct DeliverRequest {
    #[serde(rename = "orderId", default)]
    pub order_id: Option<String>,
    #[serde(default)]
    pub action: DeliveryMode,
}

async fn deliver(
    State(state): State<ApiState>,
    payload: Result<Json<DeliverRequest>, JsonRejection>,
) -> Result<Json<DeliveryReport>, ApiError> {
    let Json(request) = payload?;
    let order_id = request
        .order_id
        .filter(|id| !id.trim().is_empty())
        .ok_or_else(|| ApiError::BadRequest("Order ID is required".to_string()))?;

    let report = state.orchestrator.deliver(&order_id, request.action).await?;
    Ok(Json(report))
}

#[derive(Debug, Deserialize)]
pub struct PresenceEvent {
    #[serde(default)]
    pub minecraft_ign: Option<String>,
    #[serde(default)]
    pub server_name: Option<String>,
    #[serde(default)]
    pub timestamp: Option<String>,
}

impl PresenceEvent {
    fn player(&self) -> Result<&str, ApiError> {
        self.minecraft_ign
            .as_deref()
            .map(str::trim)
            .filter(|ign| !ign.is_empty())
            .ok_or_else(|| ApiError::BadRequest("minecraft_ign is required".to_string()))
    }
}

#[derive(Debug, Serialize)]
pub struct JoinResponse {
    pub success: bool,
    pub event: &'static str,
    pub player: String,
    pub server: Option<String>,
    pub deliveries_processed: usize,
    pub delivery_results: Vec<RetryOutcome>,
}

#[derive(Debug, Serialize)]
pub struct LeaveResponse {
    pub success: bool,
    pub event: &'static str,
    pub player: String,
}

async fn player_join(
    State(state): State<ApiState>,
    payload: Result<Json<PresenceEvent>, JsonRejection>,
) -> Result<Json<JoinResponse>, ApiError> {
    let Json(event) = payload?;
    let player = event.player()?;
    let at = parse_event_time(event.timestamp.as_deref());

    let summary = state
        .presence
        .join(player, event.server_name.as_deref(), at)
        .await?;

    Ok(Json(JoinResponse {
        success: true,
        event: "join",
        player: summary.player,
        server: summary.server,
        deliveries_processed: summary.delivery_results.len(),
        delivery_results: summary.delivery_results,
    }))
}

async fn player_leave(
    State(state): State<ApiState>,
    payload: Result<Json<PresenceEvent>, JsonRejection>,
) -> Result<Json<LeaveResponse>, ApiError> {
    let Json(event) = payload?;
    let player = event.player()?;
    let at = parse_event_time(event.timestamp.as_deref());

    state.presence.leave(player, at).await?;

    Ok(Json(LeaveResponse {
        success: true,
        event: "leave",
        player: player.to_string(),
    }))
}

#[derive(Debug, Deserialize)]
pub struct QueueQuery {
    #[serde(default)]
    pub status: Option<String>,
}

async fn list_queue(
    State(state): State<ApiState>,
    Query(query): Query<QueueQuery>,
) -> Result<Json<Vec<QueueEntry>>, ApiError> {
    let status = match query.status.as_deref() {
        None | Some("") | Some("all") => None,
        Some(raw) => Some(raw.parse::<DeliveryStatus>().map_err(ApiError::BadRequest)?),
    };

    Ok(Json(state.orchestrator.queue().list(status).await?))
}

#[derive(Debug, Deserialize)]
pub struct ResolveRequest {
    pub status: DeliveryStatus,
}

async fn resolve_queue(
    State(state): State<ApiState>,
    Path(order_id): Path<String>,
    payload: Result<Json<ResolveRequest>, JsonRejection>,
) -> Result<Json<QueueEntry>, ApiError> {
    let Json(request) = payload?;
    let entry = state.orchestrator.queue().resolve(&order_id, request.status).await?;
    Ok(Json(entry))
}
