//! Storage traits and entity models.
//!
//! The conversation engine consumes only the two narrow traits
//! ([`QuestionProvider`], [`ReplyRecorder`]); the HTTP layer uses the full
//! [`Database`] supertrait. Keeping the seams narrow lets engine tests run
//! against in-memory stubs.

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use crate::error::DatabaseError;

/// A lead captured through the intake form.
#[derive(Debug, Clone, serde::Serialize)]
pub struct User {
    pub id: i64,
    pub salutation: Option<String>,
    pub name: String,
    pub mobile_number: String,
    pub email: Option<String>,
    pub advisor_id: i64,
    pub age_group: Option<String>,
    pub created_at: DateTime<Utc>,
}

/// Fields for inserting a new lead.
#[derive(Debug, Clone)]
pub struct NewUser {
    pub salutation: Option<String>,
    pub name: String,
    pub mobile_number: String,
    pub email: Option<String>,
    pub advisor_id: i64,
    pub age_group: Option<String>,
}

/// One step of an advisor's decision-tree question sequence.
///
/// Steps for a given advisor form a contiguous sequence starting at 1;
/// "no question at step N+1" is the sequence-complete signal.
#[derive(Debug, Clone, serde::Serialize)]
pub struct Question {
    pub id: i64,
    pub advisor_id: i64,
    pub step: u32,
    pub text: String,
    /// Case-insensitive gate token; only meaningful when
    /// `is_predefined_answer` is true.
    pub trigger_keyword: Option<String>,
    pub is_predefined_answer: bool,
}

/// A question/reply pair for the advisor-facing replies view.
#[derive(Debug, Clone, serde::Serialize)]
pub struct AnsweredQuestion {
    pub question: String,
    pub reply: String,
}

/// Read-only lookup of an advisor's question sequence.
#[async_trait]
pub trait QuestionProvider: Send + Sync {
    /// Fetch the question at `step` for `advisor_id`, if one exists.
    async fn question_at(
        &self,
        advisor_id: i64,
        step: u32,
    ) -> Result<Option<Question>, DatabaseError>;
}

/// Durable append of recorded free-text answers.
#[async_trait]
pub trait ReplyRecorder: Send + Sync {
    /// Append one reply row. Rows are never updated or deleted by the
    /// conversation flow.
    async fn append_reply(
        &self,
        user_id: i64,
        question_id: i64,
        reply: &str,
    ) -> Result<(), DatabaseError>;

    /// Whether a reply already exists for this (user, question) pair.
    /// Backs the optional duplicate-delivery dedupe policy.
    async fn has_reply(&self, user_id: i64, question_id: i64) -> Result<bool, DatabaseError>;
}

/// Full persistence interface for the HTTP layer.
#[async_trait]
pub trait Database: QuestionProvider + ReplyRecorder {
    /// Insert a lead and return it with its generated id.
    async fn insert_user(&self, user: NewUser) -> Result<User, DatabaseError>;

    /// Look up a lead by mobile number within an advisor's tenancy.
    async fn find_user_by_mobile(
        &self,
        advisor_id: i64,
        mobile_number: &str,
    ) -> Result<Option<User>, DatabaseError>;

    /// All leads for an advisor; `user_ids` narrows the result when given.
    async fn users_for_advisor(
        &self,
        advisor_id: i64,
        user_ids: Option<&[i64]>,
    ) -> Result<Vec<User>, DatabaseError>;

    /// Question/reply pairs for one lead, in question order.
    async fn answered_questions(
        &self,
        advisor_id: i64,
        user_id: i64,
    ) -> Result<Vec<AnsweredQuestion>, DatabaseError>;

    /// Delete a lead and all of its replies. Returns false when the lead
    /// does not exist under this advisor.
    async fn delete_user(&self, advisor_id: i64, user_id: i64) -> Result<bool, DatabaseError>;

    /// Insert a question into an advisor's sequence (operational/seed use;
    /// sequence contiguity is the caller's responsibility).
    async fn insert_question(
        &self,
        advisor_id: i64,
        step: u32,
        text: &str,
        trigger_keyword: Option<&str>,
        is_predefined_answer: bool,
    ) -> Result<Question, DatabaseError>;
}
