//! libSQL backend — async `Database` trait implementation.
//!
//! Supports local file and in-memory databases. A single connection is
//! reused for all operations; `libsql::Connection` is `Send + Sync` and
//! safe for concurrent async use.

use std::path::Path;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use libsql::{Connection, Database as LibSqlDatabase, Row, params};
use tracing::info;

use crate::error::DatabaseError;
use crate::store::migrations;
use crate::store::traits::{
    AnsweredQuestion, Database, NewUser, Question, QuestionProvider, ReplyRecorder, User,
};

/// libSQL database backend.
pub struct LibSqlBackend {
    #[allow(dead_code)]
    db: Arc<LibSqlDatabase>,
    conn: Connection,
}

impl LibSqlBackend {
    /// Open (or create) a local database file and run migrations.
    pub async fn new_local(path: &Path) -> Result<Self, DatabaseError> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).map_err(|e| {
                DatabaseError::Connection(format!("Failed to create database directory: {e}"))
            })?;
        }

        let db = libsql::Builder::new_local(path)
            .build()
            .await
            .map_err(|e| DatabaseError::Connection(format!("Failed to open database: {e}")))?;
        let conn = db
            .connect()
            .map_err(|e| DatabaseError::Connection(format!("Failed to create connection: {e}")))?;

        let backend = Self {
            db: Arc::new(db),
            conn,
        };
        migrations::run_migrations(&backend.conn).await?;
        info!(path = %path.display(), "Database opened");
        Ok(backend)
    }

    /// Create an in-memory database (for tests).
    pub async fn new_memory() -> Result<Self, DatabaseError> {
        let db = libsql::Builder::new_local(":memory:")
            .build()
            .await
            .map_err(|e| {
                DatabaseError::Connection(format!("Failed to create in-memory database: {e}"))
            })?;
        let conn = db
            .connect()
            .map_err(|e| DatabaseError::Connection(format!("Failed to create connection: {e}")))?;

        let backend = Self {
            db: Arc::new(db),
            conn,
        };
        migrations::run_migrations(&backend.conn).await?;
        Ok(backend)
    }

    fn conn(&self) -> &Connection {
        &self.conn
    }
}

/// Parse an RFC 3339 timestamp from the DB; falls back to the epoch on a
/// malformed row rather than failing the whole query.
fn parse_datetime(s: &str) -> DateTime<Utc> {
    DateTime::parse_from_rfc3339(s)
        .map(|dt| dt.with_timezone(&Utc))
        .unwrap_or(DateTime::<Utc>::MIN_UTC)
}

/// Map a row to a User.
///
/// Column order: 0:id, 1:salutation, 2:name, 3:mobile_number, 4:email,
/// 5:advisor_id, 6:age_group, 7:created_at
fn row_to_user(row: &Row) -> Result<User, DatabaseError> {
    let created_str: String = row
        .get(7)
        .map_err(|e| DatabaseError::Query(e.to_string()))?;
    Ok(User {
        id: row.get(0).map_err(|e| DatabaseError::Query(e.to_string()))?,
        salutation: row.get::<String>(1).ok(),
        name: row.get(2).map_err(|e| DatabaseError::Query(e.to_string()))?,
        mobile_number: row.get(3).map_err(|e| DatabaseError::Query(e.to_string()))?,
        email: row.get::<String>(4).ok(),
        advisor_id: row.get(5).map_err(|e| DatabaseError::Query(e.to_string()))?,
        age_group: row.get::<String>(6).ok(),
        created_at: parse_datetime(&created_str),
    })
}

const USER_COLUMNS: &str =
    "id, salutation, name, mobile_number, email, advisor_id, age_group, created_at";

/// Map a row to a Question.
///
/// Column order: 0:id, 1:advisor_id, 2:step, 3:question, 4:trigger_keyword,
/// 5:is_predefined_answer
fn row_to_question(row: &Row) -> Result<Question, DatabaseError> {
    let step: i64 = row.get(2).map_err(|e| DatabaseError::Query(e.to_string()))?;
    let predefined: i64 = row.get(5).map_err(|e| DatabaseError::Query(e.to_string()))?;
    Ok(Question {
        id: row.get(0).map_err(|e| DatabaseError::Query(e.to_string()))?,
        advisor_id: row.get(1).map_err(|e| DatabaseError::Query(e.to_string()))?,
        step: step as u32,
        text: row.get(3).map_err(|e| DatabaseError::Query(e.to_string()))?,
        trigger_keyword: row.get::<String>(4).ok(),
        is_predefined_answer: predefined != 0,
    })
}

const QUESTION_COLUMNS: &str =
    "id, advisor_id, step, question, trigger_keyword, is_predefined_answer";

/// Convert `Option<&str>` to a libsql Value.
fn opt_text(s: Option<&str>) -> libsql::Value {
    match s {
        Some(s) => libsql::Value::Text(s.to_string()),
        None => libsql::Value::Null,
    }
}

#[async_trait]
impl QuestionProvider for LibSqlBackend {
    async fn question_at(
        &self,
        advisor_id: i64,
        step: u32,
    ) -> Result<Option<Question>, DatabaseError> {
        let mut rows = self
            .conn()
            .query(
                &format!(
                    "SELECT {QUESTION_COLUMNS} FROM decision_tree_questions
                     WHERE advisor_id = ?1 AND step = ?2"
                ),
                params![advisor_id, step as i64],
            )
            .await
            .map_err(|e| DatabaseError::Query(e.to_string()))?;

        match rows.next().await {
            Ok(Some(row)) => Ok(Some(row_to_question(&row)?)),
            Ok(None) => Ok(None),
            Err(e) => Err(DatabaseError::Query(e.to_string())),
        }
    }
}

#[async_trait]
impl ReplyRecorder for LibSqlBackend {
    async fn append_reply(
        &self,
        user_id: i64,
        question_id: i64,
        reply: &str,
    ) -> Result<(), DatabaseError> {
        self.conn()
            .execute(
                "INSERT INTO user_replies (user_id, question_id, reply, created_at)
                 VALUES (?1, ?2, ?3, ?4)",
                params![user_id, question_id, reply, Utc::now().to_rfc3339()],
            )
            .await
            .map_err(|e| DatabaseError::Query(e.to_string()))?;
        Ok(())
    }

    async fn has_reply(&self, user_id: i64, question_id: i64) -> Result<bool, DatabaseError> {
        let mut rows = self
            .conn()
            .query(
                "SELECT 1 FROM user_replies WHERE user_id = ?1 AND question_id = ?2 LIMIT 1",
                params![user_id, question_id],
            )
            .await
            .map_err(|e| DatabaseError::Query(e.to_string()))?;

        match rows.next().await {
            Ok(row) => Ok(row.is_some()),
            Err(e) => Err(DatabaseError::Query(e.to_string())),
        }
    }
}

#[async_trait]
impl Database for LibSqlBackend {
    async fn insert_user(&self, user: NewUser) -> Result<User, DatabaseError> {
        let created_at = Utc::now();
        self.conn()
            .execute(
                "INSERT INTO users
                     (salutation, name, mobile_number, email, advisor_id, age_group, created_at)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
                params![
                    opt_text(user.salutation.as_deref()),
                    user.name.clone(),
                    user.mobile_number.clone(),
                    opt_text(user.email.as_deref()),
                    user.advisor_id,
                    opt_text(user.age_group.as_deref()),
                    created_at.to_rfc3339(),
                ],
            )
            .await
            .map_err(|e| DatabaseError::Query(e.to_string()))?;

        let id = self.conn().last_insert_rowid();
        Ok(User {
            id,
            salutation: user.salutation,
            name: user.name,
            mobile_number: user.mobile_number,
            email: user.email,
            advisor_id: user.advisor_id,
            age_group: user.age_group,
            created_at,
        })
    }

    async fn find_user_by_mobile(
        &self,
        advisor_id: i64,
        mobile_number: &str,
    ) -> Result<Option<User>, DatabaseError> {
        let mut rows = self
            .conn()
            .query(
                &format!(
                    "SELECT {USER_COLUMNS} FROM users
                     WHERE advisor_id = ?1 AND mobile_number = ?2"
                ),
                params![advisor_id, mobile_number],
            )
            .await
            .map_err(|e| DatabaseError::Query(e.to_string()))?;

        match rows.next().await {
            Ok(Some(row)) => Ok(Some(row_to_user(&row)?)),
            Ok(None) => Ok(None),
            Err(e) => Err(DatabaseError::Query(e.to_string())),
        }
    }

    async fn users_for_advisor(
        &self,
        advisor_id: i64,
        user_ids: Option<&[i64]>,
    ) -> Result<Vec<User>, DatabaseError> {
        // libsql has no array binding; an inline id list is fine at this
        // cardinality and the ids are integers, not user input strings.
        let sql = match user_ids {
            Some(ids) => {
                let id_list = ids
                    .iter()
                    .map(|id| id.to_string())
                    .collect::<Vec<_>>()
                    .join(", ");
                format!(
                    "SELECT {USER_COLUMNS} FROM users
                     WHERE advisor_id = ?1 AND id IN ({id_list}) ORDER BY id"
                )
            }
            None => {
                format!("SELECT {USER_COLUMNS} FROM users WHERE advisor_id = ?1 ORDER BY id")
            }
        };

        let mut rows = self
            .conn()
            .query(&sql, params![advisor_id])
            .await
            .map_err(|e| DatabaseError::Query(e.to_string()))?;

        let mut users = Vec::new();
        while let Ok(Some(row)) = rows.next().await {
            users.push(row_to_user(&row)?);
        }
        Ok(users)
    }

    async fn answered_questions(
        &self,
        advisor_id: i64,
        user_id: i64,
    ) -> Result<Vec<AnsweredQuestion>, DatabaseError> {
        let mut rows = self
            .conn()
            .query(
                "SELECT q.question, r.reply
                 FROM user_replies r
                 JOIN decision_tree_questions q ON q.id = r.question_id
                 WHERE r.user_id = ?1 AND q.advisor_id = ?2
                 ORDER BY q.step",
                params![user_id, advisor_id],
            )
            .await
            .map_err(|e| DatabaseError::Query(e.to_string()))?;

        let mut answers = Vec::new();
        while let Ok(Some(row)) = rows.next().await {
            answers.push(AnsweredQuestion {
                question: row.get(0).map_err(|e| DatabaseError::Query(e.to_string()))?,
                reply: row.get(1).map_err(|e| DatabaseError::Query(e.to_string()))?,
            });
        }
        Ok(answers)
    }

    async fn delete_user(&self, advisor_id: i64, user_id: i64) -> Result<bool, DatabaseError> {
        let replies_deleted = self
            .conn()
            .execute(
                "DELETE FROM user_replies WHERE user_id IN
                     (SELECT id FROM users WHERE id = ?1 AND advisor_id = ?2)",
                params![user_id, advisor_id],
            )
            .await
            .map_err(|e| DatabaseError::Query(e.to_string()))?;

        let users_deleted = self
            .conn()
            .execute(
                "DELETE FROM users WHERE id = ?1 AND advisor_id = ?2",
                params![user_id, advisor_id],
            )
            .await
            .map_err(|e| DatabaseError::Query(e.to_string()))?;

        if users_deleted > 0 {
            info!(user_id, advisor_id, replies_deleted, "User deleted");
        }
        Ok(users_deleted > 0)
    }

    async fn insert_question(
        &self,
        advisor_id: i64,
        step: u32,
        text: &str,
        trigger_keyword: Option<&str>,
        is_predefined_answer: bool,
    ) -> Result<Question, DatabaseError> {
        self.conn()
            .execute(
                "INSERT INTO decision_tree_questions
                     (advisor_id, step, question, trigger_keyword, is_predefined_answer)
                 VALUES (?1, ?2, ?3, ?4, ?5)",
                params![
                    advisor_id,
                    step as i64,
                    text,
                    opt_text(trigger_keyword),
                    is_predefined_answer as i64,
                ],
            )
            .await
            .map_err(|e| DatabaseError::Query(e.to_string()))?;

        Ok(Question {
            id: self.conn().last_insert_rowid(),
            advisor_id,
            step,
            text: text.to_string(),
            trigger_keyword: trigger_keyword.map(|k| k.to_string()),
            is_predefined_answer,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn new_user(advisor_id: i64, mobile: &str) -> NewUser {
        NewUser {
            salutation: Some("Mr".into()),
            name: "Mr Alex Tan".into(),
            mobile_number: mobile.into(),
            email: Some("alex@example.com".into()),
            advisor_id,
            age_group: Some("30-39".into()),
        }
    }

    #[tokio::test]
    async fn migrations_run_on_fresh_and_existing_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("leadflow.db");
        {
            let _db = LibSqlBackend::new_local(&path).await.unwrap();
        }
        // Re-opening must not re-apply migration 1.
        let _db = LibSqlBackend::new_local(&path).await.unwrap();
    }

    #[tokio::test]
    async fn question_lookup_by_advisor_and_step() {
        let db = LibSqlBackend::new_memory().await.unwrap();
        db.insert_question(7, 1, "What's your age?", None, false)
            .await
            .unwrap();
        db.insert_question(7, 2, "Ready to proceed?", Some("YES"), true)
            .await
            .unwrap();

        let q1 = db.question_at(7, 1).await.unwrap().unwrap();
        assert_eq!(q1.text, "What's your age?");
        assert!(!q1.is_predefined_answer);

        let q2 = db.question_at(7, 2).await.unwrap().unwrap();
        assert_eq!(q2.trigger_keyword.as_deref(), Some("YES"));
        assert!(q2.is_predefined_answer);

        // Other advisor, or past the end: nothing.
        assert!(db.question_at(8, 1).await.unwrap().is_none());
        assert!(db.question_at(7, 3).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn reply_append_and_lookup() {
        let db = LibSqlBackend::new_memory().await.unwrap();
        let q = db
            .insert_question(7, 1, "What's your age?", None, false)
            .await
            .unwrap();
        let user = db.insert_user(new_user(7, "+6591234567")).await.unwrap();

        assert!(!db.has_reply(user.id, q.id).await.unwrap());
        db.append_reply(user.id, q.id, "30").await.unwrap();
        assert!(db.has_reply(user.id, q.id).await.unwrap());

        let answers = db.answered_questions(7, user.id).await.unwrap();
        assert_eq!(answers.len(), 1);
        assert_eq!(answers[0].question, "What's your age?");
        assert_eq!(answers[0].reply, "30");
    }

    #[tokio::test]
    async fn user_roundtrip_and_tenant_isolation() {
        let db = LibSqlBackend::new_memory().await.unwrap();
        let user = db.insert_user(new_user(7, "+6591234567")).await.unwrap();

        let found = db
            .find_user_by_mobile(7, "+6591234567")
            .await
            .unwrap()
            .unwrap();
        assert_eq!(found.id, user.id);
        assert_eq!(found.name, "Mr Alex Tan");

        // Same mobile under another advisor is a different tenancy.
        assert!(
            db.find_user_by_mobile(8, "+6591234567")
                .await
                .unwrap()
                .is_none()
        );
    }

    #[tokio::test]
    async fn users_for_advisor_filters_by_ids() {
        let db = LibSqlBackend::new_memory().await.unwrap();
        let a = db.insert_user(new_user(7, "+6591111111")).await.unwrap();
        let _b = db.insert_user(new_user(7, "+6592222222")).await.unwrap();
        let _other = db.insert_user(new_user(8, "+6593333333")).await.unwrap();

        assert_eq!(db.users_for_advisor(7, None).await.unwrap().len(), 2);

        let filtered = db.users_for_advisor(7, Some(&[a.id])).await.unwrap();
        assert_eq!(filtered.len(), 1);
        assert_eq!(filtered[0].id, a.id);
    }

    #[tokio::test]
    async fn delete_user_cascades_replies() {
        let db = LibSqlBackend::new_memory().await.unwrap();
        let q = db
            .insert_question(7, 1, "What's your age?", None, false)
            .await
            .unwrap();
        let user = db.insert_user(new_user(7, "+6591234567")).await.unwrap();
        db.append_reply(user.id, q.id, "30").await.unwrap();

        // Wrong advisor cannot delete.
        assert!(!db.delete_user(8, user.id).await.unwrap());
        assert!(db.delete_user(7, user.id).await.unwrap());

        assert!(
            db.find_user_by_mobile(7, "+6591234567")
                .await
                .unwrap()
                .is_none()
        );
        assert!(db.answered_questions(7, user.id).await.unwrap().is_empty());
    }
}
