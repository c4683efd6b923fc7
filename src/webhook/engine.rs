//! Conversation engine — the per-sender decision-tree state machine.
//!
//! Given an inbound message and the sender's session, decides the reply
//! text and performs at most two side effects: a session mutation and a
//! reply append. Both happen only on the success path, so a transport
//! retry of the same inbound event is safe to replay. State problems
//! (no session, missing question, invalid step) are never errors — each
//! maps to a fixed user-facing reply and a no-op transition.

use std::sync::Arc;

use tracing::{error, info, warn};

use crate::session::{Session, SessionStore};
use crate::store::{QuestionProvider, ReplyRecorder};

/// Token that moves a seeded session onto step 1.
const START_TOKEN: &str = "start";

pub const NO_SESSION_REPLY: &str = "Please submit the form to start the session.";
pub const NO_QUESTIONS_REPLY: &str = "No questions found.";
pub const COMPLETED_REPLY: &str = "Thank you! You've completed all questions.";
pub const REPLY_WRITE_ERROR_REPLY: &str = "An error occurred while processing your reply.";
pub const PROCESSING_ERROR_REPLY: &str = "An error occurred while processing your response.";
pub const START_ERROR_REPLY: &str = "An error occurred while starting the session.";
pub const INVALID_STATE_REPLY: &str = "Invalid session state. Please start again.";

/// Re-prompt for a predefined-answer question.
pub fn keyword_prompt(keyword: &str) -> String {
    format!("Please respond with '{keyword}'.")
}

/// Collaborators the engine reads and writes through.
#[derive(Clone)]
pub struct EngineDeps {
    pub sessions: Arc<SessionStore>,
    pub questions: Arc<dyn QuestionProvider>,
    pub replies: Arc<dyn ReplyRecorder>,
}

/// The webhook state machine.
pub struct ConversationEngine {
    sessions: Arc<SessionStore>,
    questions: Arc<dyn QuestionProvider>,
    replies: Arc<dyn ReplyRecorder>,
    /// When true, a free-text answer already recorded for the current
    /// question is not recorded again on a duplicate webhook delivery.
    /// Off by default: without an idempotency key from the transport, a
    /// double-delivered message records two rows (known gap, kept visible).
    dedupe_replies: bool,
}

impl ConversationEngine {
    pub fn new(deps: EngineDeps, dedupe_replies: bool) -> Self {
        Self {
            sessions: deps.sessions,
            questions: deps.questions,
            replies: deps.replies,
            dedupe_replies,
        }
    }

    /// Process one inbound message and return the reply text.
    ///
    /// `phone_key` is the sender's number with the transport scheme already
    /// stripped; `body` is the raw message text.
    pub async fn handle_inbound(&self, phone_key: &str, body: &str) -> String {
        let normalized = body.trim().to_lowercase();

        let Some(session) = self.sessions.get(phone_key).await else {
            warn!(phone = %phone_key, "Inbound message without a session");
            return NO_SESSION_REPLY.to_string();
        };

        match session.current_step {
            None if normalized == START_TOKEN => self.start(phone_key, &session).await,
            None => {
                warn!(phone = %phone_key, "Message before start token");
                INVALID_STATE_REPLY.to_string()
            }
            Some(step) => self.step(phone_key, &session, step, &normalized).await,
        }
    }

    /// Start token received: move to step 1 and ask the first question.
    async fn start(&self, phone_key: &str, session: &Session) -> String {
        self.sessions.set(phone_key, session.at_step(1)).await;
        match self.questions.question_at(session.advisor_id, 1).await {
            Ok(Some(question)) => {
                info!(phone = %phone_key, advisor_id = session.advisor_id, "Conversation started");
                question.text
            }
            Ok(None) => {
                warn!(advisor_id = session.advisor_id, "Advisor has no questions configured");
                NO_QUESTIONS_REPLY.to_string()
            }
            Err(e) => {
                error!(phone = %phone_key, error = %e, "Failed to start conversation");
                START_ERROR_REPLY.to_string()
            }
        }
    }

    /// Session is at step N: gate or record, then advance.
    async fn step(&self, phone_key: &str, session: &Session, step: u32, body: &str) -> String {
        let question = match self.questions.question_at(session.advisor_id, step).await {
            Ok(Some(question)) => question,
            Ok(None) => {
                // Configuration gap, not an error: the sequence has a hole
                // at the session's current step.
                warn!(advisor_id = session.advisor_id, step, "No question at current step");
                return NO_QUESTIONS_REPLY.to_string();
            }
            Err(e) => {
                error!(phone = %phone_key, step, error = %e, "Question lookup failed");
                return PROCESSING_ERROR_REPLY.to_string();
            }
        };

        if question.is_predefined_answer {
            let keyword = question.trigger_keyword.as_deref().unwrap_or_default();
            if !keyword.is_empty() && body == keyword.to_lowercase() {
                self.advance(phone_key, session, step + 1).await
            } else {
                warn!(phone = %phone_key, step, "Keyword mismatch, re-prompting");
                keyword_prompt(keyword)
            }
        } else {
            // Free text: record first, advance only after a durable write.
            let already_recorded = self.dedupe_replies
                && self
                    .replies
                    .has_reply(session.user_id, question.id)
                    .await
                    .unwrap_or(false);

            if already_recorded {
                info!(
                    user_id = session.user_id,
                    question_id = question.id,
                    "Duplicate delivery, reply already recorded"
                );
            } else if let Err(e) = self
                .replies
                .append_reply(session.user_id, question.id, body)
                .await
            {
                error!(
                    user_id = session.user_id,
                    question_id = question.id,
                    error = %e,
                    "Failed to record reply"
                );
                return REPLY_WRITE_ERROR_REPLY.to_string();
            }

            self.advance(phone_key, session, step + 1).await
        }
    }

    /// Move the session to `next_step`; a missing question there means the
    /// sequence is exhausted and the conversation ends.
    async fn advance(&self, phone_key: &str, session: &Session, next_step: u32) -> String {
        let next = match self.questions.question_at(session.advisor_id, next_step).await {
            Ok(next) => next,
            Err(e) => {
                error!(phone = %phone_key, step = next_step, error = %e, "Question lookup failed");
                return PROCESSING_ERROR_REPLY.to_string();
            }
        };

        self.sessions.set(phone_key, session.at_step(next_step)).await;
        match next {
            Some(question) => {
                info!(phone = %phone_key, step = next_step, "Advanced to next step");
                question.text
            }
            None => {
                self.sessions.clear(phone_key).await;
                info!(phone = %phone_key, "Conversation completed");
                COMPLETED_REPLY.to_string()
            }
        }
    }
}
