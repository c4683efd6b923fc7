//! Error types for LeadFlow.
//!
//! Per-domain enums only; there is no top-level wrapper because no call
//! path crosses domains — routes map each error straight to a response
//! and the webhook flow maps state problems to reply strings instead.

/// Configuration-related errors.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Invalid configuration value for {key}: {message}")]
    InvalidValue { key: String, message: String },
}

/// Database-related errors.
#[derive(Debug, thiserror::Error)]
pub enum DatabaseError {
    #[error("Connection error: {0}")]
    Connection(String),

    #[error("Query failed: {0}")]
    Query(String),

    #[error("Migration failed: {0}")]
    Migration(String),
}

/// Outbound messaging errors.
#[derive(Debug, thiserror::Error)]
pub enum MessagingError {
    #[error("Messaging provider is not configured: {0}")]
    NotConfigured(String),

    #[error("Failed to send message to {to}: {reason}")]
    SendFailed { to: String, reason: String },

    #[error("Provider returned an invalid response: {0}")]
    InvalidResponse(String),
}
