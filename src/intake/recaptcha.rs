//! reCAPTCHA proof verification for the intake form.

use std::time::Duration;

use secrecy::ExposeSecret;
use serde::Deserialize;
use tracing::{info, warn};

use crate::config::RecaptchaConfig;

/// Verifies recaptcha tokens against the configured verify endpoint.
///
/// Fails closed: a network error, a non-2xx status, or missing
/// configuration all count as verification failure.
pub struct RecaptchaVerifier {
    config: RecaptchaConfig,
    client: reqwest::Client,
}

#[derive(Debug, Deserialize)]
struct VerifyResponse {
    #[serde(default)]
    success: bool,
}

impl RecaptchaVerifier {
    pub fn new(config: RecaptchaConfig) -> Self {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(5))
            .build()
            .unwrap_or_default();
        Self { config, client }
    }

    /// Check a token; true only when the endpoint confirms it.
    pub async fn verify(&self, token: &str) -> bool {
        let form = [
            ("secret", self.config.secret_key.expose_secret()),
            ("response", token),
        ];

        let resp = match self
            .client
            .post(&self.config.verify_url)
            .form(&form)
            .send()
            .await
        {
            Ok(resp) => resp,
            Err(e) => {
                warn!(error = %e, "reCAPTCHA verification request failed");
                return false;
            }
        };

        if !resp.status().is_success() {
            warn!(status = %resp.status(), "reCAPTCHA endpoint returned an error");
            return false;
        }

        match resp.json::<VerifyResponse>().await {
            Ok(body) => {
                info!(success = body.success, "reCAPTCHA verified");
                body.success
            }
            Err(e) => {
                warn!(error = %e, "reCAPTCHA response was not valid JSON");
                false
            }
        }
    }
}
