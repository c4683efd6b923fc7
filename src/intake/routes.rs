//! Lead-intake entry point.
//!
//! A successful submission creates the user, seeds a session with no
//! current step, and sends the welcome template. Messaging being
//! unconfigured degrades the response; it never fails the request.

use std::sync::Arc;

use axum::Router;
use axum::extract::State;
use axum::http::StatusCode;
use axum::response::IntoResponse;
use axum::routing::post;
use axum::Json;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::sync::RwLock;
use tracing::{error, info, warn};

use crate::outbound::{OutboundDispatcher, Recipient};
use crate::session::{Session, SessionStore};
use crate::store::{Database, NewUser};

use super::recaptcha::RecaptchaVerifier;

const CREATED_NOT_SENT: &str = "User created, but message not sent";
const CREATED_AND_SENT: &str = "Thanks for filling out the form. Check WhatsApp to continue.";

/// Shared state for the intake route.
#[derive(Clone)]
pub struct IntakeState {
    pub db: Arc<dyn Database>,
    pub sessions: Arc<SessionStore>,
    pub recaptcha: Option<Arc<RecaptchaVerifier>>,
    pub dispatcher: Option<Arc<OutboundDispatcher>>,
    pub welcome_sid: Arc<RwLock<Option<String>>>,
}

#[derive(Debug, Deserialize)]
pub struct SubmitFormRequest {
    pub advisor_id: i64,
    pub salutation: Option<String>,
    pub first_name: String,
    pub last_name: String,
    pub mobile_number: String,
    pub email: Option<String>,
    pub age_group: Option<String>,
    pub recaptcha_token: String,
}

#[derive(Debug, Serialize)]
pub struct SubmitFormResponse {
    pub success: bool,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message_sid: Option<String>,
    pub timestamp: DateTime<Utc>,
}

fn error_body(status: StatusCode, detail: &str) -> axum::response::Response {
    (status, Json(serde_json::json!({"detail": detail}))).into_response()
}

/// POST /submit_form
async fn submit_form(
    State(state): State<IntakeState>,
    Json(req): Json<SubmitFormRequest>,
) -> impl IntoResponse {
    info!(advisor_id = req.advisor_id, "Submit form request received");

    // Fail closed when recaptcha is unconfigured.
    let verified = match state.recaptcha.as_ref() {
        Some(verifier) => verifier.verify(&req.recaptcha_token).await,
        None => {
            error!("reCAPTCHA configuration missing");
            false
        }
    };
    if !verified {
        warn!("Invalid reCAPTCHA token");
        return error_body(StatusCode::BAD_REQUEST, "Invalid reCAPTCHA");
    }

    // Duplicate lead: refresh the session so the conversation can restart,
    // but report the conflict.
    match state
        .db
        .find_user_by_mobile(req.advisor_id, &req.mobile_number)
        .await
    {
        Ok(Some(existing)) => {
            info!(user_id = existing.id, "User already exists, re-seeding session");
            state
                .sessions
                .set(
                    &existing.mobile_number,
                    Session::new(existing.mobile_number.clone(), existing.advisor_id, existing.id),
                )
                .await;
            return error_body(StatusCode::CONFLICT, "User already exists");
        }
        Ok(None) => {}
        Err(e) => {
            error!(error = %e, "User lookup failed");
            return error_body(StatusCode::INTERNAL_SERVER_ERROR, "Internal server error");
        }
    }

    let display_name = match &req.salutation {
        Some(salutation) => format!("{salutation} {} {}", req.first_name, req.last_name),
        None => format!("{} {}", req.first_name, req.last_name),
    };
    let user = match state
        .db
        .insert_user(NewUser {
            salutation: req.salutation.clone(),
            name: display_name,
            mobile_number: req.mobile_number.clone(),
            email: req.email.clone(),
            advisor_id: req.advisor_id,
            age_group: req.age_group.clone(),
        })
        .await
    {
        Ok(user) => user,
        Err(e) => {
            error!(error = %e, "Failed to create user");
            return error_body(StatusCode::INTERNAL_SERVER_ERROR, "Internal server error");
        }
    };
    info!(user_id = user.id, "New user created");

    state
        .sessions
        .set(
            &user.mobile_number,
            Session::new(user.mobile_number.clone(), user.advisor_id, user.id),
        )
        .await;

    // Welcome send is best-effort: missing configuration or a provider
    // failure degrades the response instead of failing the intake.
    let welcome_sid = state.welcome_sid.read().await.clone();
    let (message, message_sid) = match (state.dispatcher.as_ref(), welcome_sid) {
        (Some(dispatcher), Some(content_sid)) => {
            let recipient = Recipient {
                to_number: user.mobile_number.clone(),
                name: match &req.salutation {
                    Some(salutation) => format!("{salutation} {}", req.first_name),
                    None => req.first_name.clone(),
                },
            };
            match dispatcher.send_one(&recipient, &content_sid).await {
                Ok(sid) => (CREATED_AND_SENT, Some(sid)),
                Err(e) => {
                    error!(user_id = user.id, error = %e, "Welcome message failed");
                    (CREATED_NOT_SENT, None)
                }
            }
        }
        _ => {
            warn!("Messaging not configured, skipping welcome message");
            (CREATED_NOT_SENT, None)
        }
    };

    Json(SubmitFormResponse {
        success: true,
        message: message.to_string(),
        message_sid,
        timestamp: user.created_at,
    })
    .into_response()
}

/// Build the intake routes.
pub fn intake_routes(state: IntakeState) -> Router {
    Router::new()
        .route("/submit_form", post(submit_form))
        .with_state(state)
}
