//! Twilio WhatsApp implementation of [`MessagingProvider`].

use async_trait::async_trait;
use secrecy::ExposeSecret;
use serde::Deserialize;
use tracing::info;

use crate::config::TwilioConfig;
use crate::error::MessagingError;

use super::provider::{MessagingProvider, TemplateMessage};

const WHATSAPP_SCHEME: &str = "whatsapp:";

/// Twilio Messages API client for WhatsApp template sends.
pub struct TwilioWhatsApp {
    config: TwilioConfig,
    client: reqwest::Client,
}

#[derive(Debug, Deserialize)]
struct MessageCreated {
    sid: String,
}

impl TwilioWhatsApp {
    pub fn new(config: TwilioConfig, send_timeout: std::time::Duration) -> Self {
        let client = reqwest::Client::builder()
            .timeout(send_timeout)
            .build()
            .unwrap_or_default();
        Self { config, client }
    }

    fn messages_url(&self) -> String {
        format!(
            "https://api.twilio.com/2010-04-01/Accounts/{}/Messages.json",
            self.config.account_sid
        )
    }
}

#[async_trait]
impl MessagingProvider for TwilioWhatsApp {
    async fn send_template(
        &self,
        to_number: &str,
        message: &TemplateMessage,
    ) -> Result<String, MessagingError> {
        let mut form = vec![
            ("To", format!("{WHATSAPP_SCHEME}{to_number}")),
            (
                "From",
                format!("{WHATSAPP_SCHEME}{}", self.config.from_number),
            ),
            ("ContentSid", message.content_sid.clone()),
            ("ContentVariables", message.variables.to_string()),
        ];
        if let Some(service_sid) = &self.config.messaging_service_sid {
            form.push(("MessagingServiceSid", service_sid.clone()));
        }

        let resp = self
            .client
            .post(self.messages_url())
            .basic_auth(
                &self.config.account_sid,
                Some(self.config.auth_token.expose_secret()),
            )
            .form(&form)
            .send()
            .await
            .map_err(|e| MessagingError::SendFailed {
                to: to_number.to_string(),
                reason: e.to_string(),
            })?;

        if !resp.status().is_success() {
            let status = resp.status();
            let body = resp.text().await.unwrap_or_default();
            return Err(MessagingError::SendFailed {
                to: to_number.to_string(),
                reason: format!("Twilio returned {status}: {body}"),
            });
        }

        let created: MessageCreated = resp
            .json()
            .await
            .map_err(|e| MessagingError::InvalidResponse(e.to_string()))?;
        info!(to = %to_number, sid = %created.sid, "Message sent");
        Ok(created.sid)
    }
}
