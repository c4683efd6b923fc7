//! Advisor-facing routes: manual broadcast and welcome-template management.

use std::sync::Arc;

use axum::Router;
use axum::extract::State;
use axum::http::StatusCode;
use axum::response::IntoResponse;
use axum::routing::{get, post};
use axum::Json;
use serde::{Deserialize, Serialize};
use tokio::sync::RwLock;
use tracing::{info, warn};

use crate::error::MessagingError;
use crate::store::Database;

use super::dispatcher::OutboundDispatcher;
use super::provider::Recipient;

/// Shared state for outbound routes.
#[derive(Clone)]
pub struct OutboundState {
    pub db: Arc<dyn Database>,
    /// Absent when Twilio credentials are not configured.
    pub dispatcher: Option<Arc<OutboundDispatcher>>,
    /// Welcome template content SID, runtime-mutable.
    pub welcome_sid: Arc<RwLock<Option<String>>>,
}

#[derive(Debug, Deserialize)]
pub struct BroadcastRequest {
    pub content_sid: String,
    pub advisor_id: i64,
    /// When present, narrows the broadcast to these leads.
    pub user_ids: Option<Vec<i64>>,
}

#[derive(Debug, Serialize)]
pub struct BroadcastResponse {
    pub message_sids: Vec<String>,
}

/// POST /broadcast
///
/// Fans a content template out to an advisor's leads. Per-recipient
/// failures are logged and dropped; the response lists successful
/// delivery ids only.
async fn broadcast(
    State(state): State<OutboundState>,
    Json(req): Json<BroadcastRequest>,
) -> impl IntoResponse {
    let Some(dispatcher) = state.dispatcher.as_ref() else {
        let e = MessagingError::NotConfigured("Twilio credentials are not set".to_string());
        warn!(error = %e, "Broadcast rejected");
        return (
            StatusCode::SERVICE_UNAVAILABLE,
            Json(serde_json::json!({"error": e.to_string()})),
        )
            .into_response();
    };

    let users = match state
        .db
        .users_for_advisor(req.advisor_id, req.user_ids.as_deref())
        .await
    {
        Ok(users) => users,
        Err(e) => {
            warn!(advisor_id = req.advisor_id, error = %e, "Broadcast user lookup failed");
            return (
                StatusCode::INTERNAL_SERVER_ERROR,
                Json(serde_json::json!({"error": "Internal server error"})),
            )
                .into_response();
        }
    };

    if users.is_empty() {
        warn!(advisor_id = req.advisor_id, "No users found for broadcast");
        return Json(BroadcastResponse {
            message_sids: Vec::new(),
        })
        .into_response();
    }

    let recipients: Vec<Recipient> = users
        .into_iter()
        .map(|user| Recipient {
            to_number: user.mobile_number,
            name: user.name,
        })
        .collect();

    info!(
        advisor_id = req.advisor_id,
        recipients = recipients.len(),
        "Broadcast started"
    );
    let message_sids = dispatcher.broadcast(&req.content_sid, &recipients).await;
    Json(BroadcastResponse { message_sids }).into_response()
}

#[derive(Debug, Deserialize)]
pub struct WelcomeTemplateRequest {
    pub content_sid: String,
}

/// GET /templates/welcome
async fn get_welcome_template(State(state): State<OutboundState>) -> impl IntoResponse {
    match state.welcome_sid.read().await.clone() {
        Some(sid) => Json(serde_json::json!({
            "success": true,
            "welcome_content_sid": sid,
        }))
        .into_response(),
        None => (
            StatusCode::NOT_FOUND,
            Json(serde_json::json!({"error": "Welcome template not configured"})),
        )
            .into_response(),
    }
}

/// PUT /templates/welcome
async fn set_welcome_template(
    State(state): State<OutboundState>,
    Json(req): Json<WelcomeTemplateRequest>,
) -> impl IntoResponse {
    let cleaned = req.content_sid.trim().trim_matches(['\'', '"']).to_string();
    if cleaned.is_empty() {
        return (
            StatusCode::BAD_REQUEST,
            Json(serde_json::json!({"error": "content_sid must not be empty"})),
        )
            .into_response();
    }

    *state.welcome_sid.write().await = Some(cleaned.clone());
    info!("Welcome template updated");
    Json(serde_json::json!({
        "success": true,
        "welcome_content_sid": cleaned,
    }))
    .into_response()
}

/// Build the outbound routes.
pub fn outbound_routes(state: OutboundState) -> Router {
    Router::new()
        .route("/broadcast", post(broadcast))
        .route(
            "/templates/welcome",
            get(get_welcome_template).put(set_welcome_template),
        )
        .with_state(state)
}
