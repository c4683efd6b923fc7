//! Session record — per-phone-number conversation progress.

use serde::{Deserialize, Serialize};

/// Ephemeral conversation state for one lead.
///
/// Held only in the [`SessionStore`](super::SessionStore); never persisted.
/// `current_step = None` means the lead has submitted the form but has not
/// yet sent the start token.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Session {
    /// Phone number in E.164 form, without the `whatsapp:` scheme.
    pub phone_key: String,
    /// Advisor whose question sequence applies.
    pub advisor_id: i64,
    /// Persisted user record owning this conversation.
    pub user_id: i64,
    /// 1-based position in the advisor's question sequence.
    pub current_step: Option<u32>,
}

impl Session {
    /// A freshly seeded session, before the start token arrives.
    pub fn new(phone_key: impl Into<String>, advisor_id: i64, user_id: i64) -> Self {
        Self {
            phone_key: phone_key.into(),
            advisor_id,
            user_id,
            current_step: None,
        }
    }

    /// Copy of this session positioned at `step`.
    pub fn at_step(&self, step: u32) -> Self {
        Self {
            current_step: Some(step),
            ..self.clone()
        }
    }
}
