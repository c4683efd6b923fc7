//! Inbound WhatsApp webhook — conversation engine and transport route.

pub mod engine;
pub mod routes;
pub mod twiml;

pub use engine::{ConversationEngine, EngineDeps};
pub use routes::{WebhookState, webhook_routes};
