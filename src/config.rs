//! Configuration types, read from the environment at startup.

use std::time::Duration;

use secrecy::SecretString;

use crate::error::ConfigError;

/// Twilio WhatsApp credentials and sender identity.
///
/// The whole block is optional: when absent the service still accepts
/// intake requests but degrades to "created, message not sent".
#[derive(Debug, Clone)]
pub struct TwilioConfig {
    pub account_sid: String,
    pub auth_token: SecretString,
    /// Sender phone number (E.164, without the `whatsapp:` scheme).
    pub from_number: String,
    /// Optional Twilio messaging service to route sends through.
    pub messaging_service_sid: Option<String>,
}

/// reCAPTCHA verification settings for the intake form.
#[derive(Debug, Clone)]
pub struct RecaptchaConfig {
    pub secret_key: SecretString,
    pub verify_url: String,
}

/// Outbound dispatcher tunables.
#[derive(Debug, Clone)]
pub struct DispatchConfig {
    /// Maximum provider requests per sliding window.
    pub max_requests: usize,
    /// Sliding window width.
    pub window: Duration,
    /// Recipients per concurrent batch.
    pub chunk_size: usize,
    /// Pause between batches.
    pub chunk_pause: Duration,
    /// Timeout for a single provider request.
    pub send_timeout: Duration,
}

impl Default for DispatchConfig {
    fn default() -> Self {
        Self {
            max_requests: 5,
            window: Duration::from_secs(1),
            chunk_size: 20,
            chunk_pause: Duration::from_millis(500),
            send_timeout: Duration::from_secs(30),
        }
    }
}

/// Session store tunables.
#[derive(Debug, Clone)]
pub struct SessionConfig {
    /// Sessions idle longer than this are expired.
    pub expiration: Duration,
    /// Interval between background expiry sweeps.
    pub sweep_interval: Duration,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            expiration: Duration::from_secs(86_400), // 24 hours
            sweep_interval: Duration::from_secs(3_600),
        }
    }
}

/// Full service configuration.
#[derive(Debug, Clone)]
pub struct AppConfig {
    pub bind_addr: String,
    pub db_path: String,
    pub session: SessionConfig,
    pub dispatch: DispatchConfig,
    pub twilio: Option<TwilioConfig>,
    pub recaptcha: Option<RecaptchaConfig>,
    /// Welcome template content SID, if configured.
    pub welcome_content_sid: Option<String>,
    /// Allowed CORS origin for the advisor admin frontend.
    pub cors_origin: Option<String>,
    /// When true, a duplicate webhook delivery of a free-text answer does
    /// not record a second reply row (it still advances the step).
    pub dedupe_replies: bool,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            bind_addr: "0.0.0.0:5000".to_string(),
            db_path: "./data/leadflow.db".to_string(),
            session: SessionConfig::default(),
            dispatch: DispatchConfig::default(),
            twilio: None,
            recaptcha: None,
            welcome_content_sid: None,
            cors_origin: None,
            dedupe_replies: false,
        }
    }
}

impl AppConfig {
    /// Build the configuration from environment variables.
    ///
    /// Twilio and reCAPTCHA blocks are optional as a whole; partial blocks
    /// (e.g. an account SID without an auth token) are an error.
    pub fn from_env() -> Result<Self, ConfigError> {
        let defaults = Self::default();

        let session = SessionConfig {
            expiration: duration_secs_var("SESSION_EXPIRATION_SECS", defaults.session.expiration)?,
            sweep_interval: duration_secs_var(
                "SESSION_SWEEP_INTERVAL_SECS",
                defaults.session.sweep_interval,
            )?,
        };

        let dispatch = DispatchConfig {
            max_requests: parse_var("SEND_RATE_MAX_REQUESTS", defaults.dispatch.max_requests)?,
            window: duration_millis_var("SEND_RATE_WINDOW_MS", defaults.dispatch.window)?,
            chunk_size: parse_var("SEND_CHUNK_SIZE", defaults.dispatch.chunk_size)?,
            chunk_pause: duration_millis_var("SEND_CHUNK_PAUSE_MS", defaults.dispatch.chunk_pause)?,
            send_timeout: duration_secs_var("SEND_TIMEOUT_SECS", defaults.dispatch.send_timeout)?,
        };

        let twilio = match (
            env_opt("TWILIO_ACCOUNT_SID"),
            env_opt("TWILIO_AUTH_TOKEN"),
            env_opt("TWILIO_PHONE_NUMBER"),
        ) {
            (None, None, None) => None,
            (Some(account_sid), Some(auth_token), Some(from_number)) => Some(TwilioConfig {
                account_sid,
                auth_token: SecretString::from(auth_token),
                from_number,
                messaging_service_sid: env_opt("MESSAGING_SERVICE_SID"),
            }),
            _ => {
                return Err(ConfigError::InvalidValue {
                    key: "TWILIO_*".to_string(),
                    message: "TWILIO_ACCOUNT_SID, TWILIO_AUTH_TOKEN and TWILIO_PHONE_NUMBER \
                              must be set together"
                        .to_string(),
                });
            }
        };

        let recaptcha = match (env_opt("CAPTCHA_SECRET_KEY"), env_opt("CAPTCHA_URL")) {
            (None, None) => None,
            (Some(secret_key), Some(verify_url)) => Some(RecaptchaConfig {
                secret_key: SecretString::from(secret_key),
                verify_url,
            }),
            _ => {
                return Err(ConfigError::InvalidValue {
                    key: "CAPTCHA_*".to_string(),
                    message: "CAPTCHA_SECRET_KEY and CAPTCHA_URL must be set together".to_string(),
                });
            }
        };

        Ok(Self {
            bind_addr: env_opt("LEADFLOW_BIND_ADDR").unwrap_or(defaults.bind_addr),
            db_path: env_opt("LEADFLOW_DB_PATH").unwrap_or(defaults.db_path),
            session,
            dispatch,
            twilio,
            recaptcha,
            welcome_content_sid: env_opt("CONTENT_SID"),
            cors_origin: env_opt("LEADFLOW_CORS_ORIGIN"),
            dedupe_replies: parse_var("LEADFLOW_DEDUPE_REPLIES", defaults.dedupe_replies)?,
        })
    }
}

fn env_opt(key: &str) -> Option<String> {
    std::env::var(key).ok().filter(|v| !v.trim().is_empty())
}

fn parse_var<T: std::str::FromStr>(key: &str, default: T) -> Result<T, ConfigError> {
    match env_opt(key) {
        Some(raw) => raw.parse().map_err(|_| ConfigError::InvalidValue {
            key: key.to_string(),
            message: format!("cannot parse '{raw}'"),
        }),
        None => Ok(default),
    }
}

fn duration_secs_var(key: &str, default: Duration) -> Result<Duration, ConfigError> {
    Ok(Duration::from_secs(parse_var(key, default.as_secs())?))
}

fn duration_millis_var(key: &str, default: Duration) -> Result<Duration, ConfigError> {
    Ok(Duration::from_millis(parse_var(
        key,
        default.as_millis() as u64,
    )?))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_documented_values() {
        let config = AppConfig::default();
        assert_eq!(config.session.expiration, Duration::from_secs(86_400));
        assert_eq!(config.session.sweep_interval, Duration::from_secs(3_600));
        assert_eq!(config.dispatch.max_requests, 5);
        assert_eq!(config.dispatch.window, Duration::from_secs(1));
        assert_eq!(config.dispatch.chunk_size, 20);
        assert_eq!(config.dispatch.chunk_pause, Duration::from_millis(500));
        assert!(!config.dedupe_replies);
    }
}
