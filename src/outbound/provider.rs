//! Messaging provider seam.

use async_trait::async_trait;

use crate::error::MessagingError;

/// A templated message to deliver.
#[derive(Debug, Clone)]
pub struct TemplateMessage {
    /// Provider-side content template identifier.
    pub content_sid: String,
    /// Template variable slots, keyed by position ("1", "2", ...).
    pub variables: serde_json::Value,
}

impl TemplateMessage {
    /// Template with the recipient's display name in slot 1.
    pub fn with_name(content_sid: impl Into<String>, name: &str) -> Self {
        Self {
            content_sid: content_sid.into(),
            variables: serde_json::json!({ "1": name }),
        }
    }
}

/// One delivery target.
#[derive(Debug, Clone)]
pub struct Recipient {
    /// Phone number in E.164 form, without the `whatsapp:` scheme.
    pub to_number: String,
    /// Display name, substituted into template slot 1.
    pub name: String,
}

/// Sends templated messages through an external transport.
#[async_trait]
pub trait MessagingProvider: Send + Sync {
    /// Send one templated message; returns the provider's delivery id.
    async fn send_template(
        &self,
        to_number: &str,
        message: &TemplateMessage,
    ) -> Result<String, MessagingError>;
}
