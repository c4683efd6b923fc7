//! REST endpoints for listing leads, their recorded answers, and deletion.

use std::sync::Arc;

use axum::Router;
use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::response::IntoResponse;
use axum::routing::get;
use axum::Json;
use serde::Deserialize;
use tracing::{error, info};

use crate::store::Database;

/// Shared state for user routes.
#[derive(Clone)]
pub struct UsersState {
    pub db: Arc<dyn Database>,
}

#[derive(Debug, Deserialize)]
pub struct AdvisorQuery {
    pub advisor_id: i64,
}

fn internal_error() -> axum::response::Response {
    (
        StatusCode::INTERNAL_SERVER_ERROR,
        Json(serde_json::json!({"detail": "Internal server error"})),
    )
        .into_response()
}

/// GET /users?advisor_id=N
async fn list_users(
    State(state): State<UsersState>,
    Query(query): Query<AdvisorQuery>,
) -> impl IntoResponse {
    match state.db.users_for_advisor(query.advisor_id, None).await {
        Ok(users) => Json(users).into_response(),
        Err(e) => {
            error!(advisor_id = query.advisor_id, error = %e, "Failed to list users");
            internal_error()
        }
    }
}

/// GET /users/{id}/replies?advisor_id=N
///
/// Question/reply pairs for one lead, in question order.
async fn user_replies(
    State(state): State<UsersState>,
    Path(user_id): Path<i64>,
    Query(query): Query<AdvisorQuery>,
) -> impl IntoResponse {
    match state
        .db
        .answered_questions(query.advisor_id, user_id)
        .await
    {
        Ok(replies) => Json(serde_json::json!({"replies": replies})).into_response(),
        Err(e) => {
            error!(user_id, error = %e, "Failed to fetch replies");
            internal_error()
        }
    }
}

/// DELETE /users/{id}?advisor_id=N
///
/// Deletes the lead and all recorded replies.
async fn delete_user(
    State(state): State<UsersState>,
    Path(user_id): Path<i64>,
    Query(query): Query<AdvisorQuery>,
) -> impl IntoResponse {
    match state.db.delete_user(query.advisor_id, user_id).await {
        Ok(true) => {
            info!(user_id, advisor_id = query.advisor_id, "User deleted");
            Json(serde_json::json!({
                "message": "User deleted successfully",
                "user_id": user_id,
            }))
            .into_response()
        }
        Ok(false) => (
            StatusCode::NOT_FOUND,
            Json(serde_json::json!({"detail": "User not found"})),
        )
            .into_response(),
        Err(e) => {
            error!(user_id, error = %e, "Failed to delete user");
            internal_error()
        }
    }
}

/// Build the user routes.
pub fn users_routes(state: UsersState) -> Router {
    Router::new()
        .route("/users", get(list_users))
        .route("/users/{user_id}/replies", get(user_replies))
        .route("/users/{user_id}", axum::routing::delete(delete_user))
        .with_state(state)
}
