//! Transport route for the inbound Twilio webhook.

use std::sync::Arc;

use axum::Router;
use axum::extract::{Form, State};
use axum::http::header;
use axum::response::IntoResponse;
use axum::routing::post;
use serde::Deserialize;
use tracing::info;

use super::engine::ConversationEngine;
use super::twiml;

/// Scheme prefix Twilio puts on WhatsApp addresses.
const WHATSAPP_SCHEME: &str = "whatsapp:";

/// Shared state for the webhook route.
#[derive(Clone)]
pub struct WebhookState {
    pub engine: Arc<ConversationEngine>,
}

/// Form-encoded payload Twilio posts for each inbound message.
#[derive(Debug, Deserialize)]
pub struct InboundForm {
    #[serde(rename = "From", default)]
    pub from: String,
    #[serde(rename = "Body", default)]
    pub body: String,
}

/// POST /webhook
///
/// Runs the conversation engine and answers with TwiML. Always 200: every
/// failure mode maps to a reply message for the end user.
async fn handle_webhook(
    State(state): State<WebhookState>,
    Form(form): Form<InboundForm>,
) -> impl IntoResponse {
    let phone_key = form
        .from
        .strip_prefix(WHATSAPP_SCHEME)
        .unwrap_or(&form.from)
        .to_string();
    info!(phone = %phone_key, "Inbound webhook message");

    let reply = state.engine.handle_inbound(&phone_key, &form.body).await;
    (
        [(header::CONTENT_TYPE, "application/xml")],
        twiml::message_response(&reply),
    )
}

/// Build the webhook routes.
pub fn webhook_routes(state: WebhookState) -> Router {
    Router::new()
        .route("/webhook", post(handle_webhook))
        .with_state(state)
}
