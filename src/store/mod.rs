//! Persistence layer — libSQL-backed storage for users, questions, replies.

pub mod libsql_backend;
pub mod migrations;
pub mod traits;

pub use libsql_backend::LibSqlBackend;
pub use traits::{
    AnsweredQuestion, Database, NewUser, Question, QuestionProvider, ReplyRecorder, User,
};
