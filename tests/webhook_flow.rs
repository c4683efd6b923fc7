//! Integration test for the inbound webhook route.
//!
//! Spins up the real axum router on a random port, posts form-encoded
//! Twilio payloads with reqwest, and walks the full decision-tree
//! conversation, asserting the TwiML replies.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use tokio::net::TcpListener;
use tokio::time::timeout;

use leadflow::config::SessionConfig;
use leadflow::error::DatabaseError;
use leadflow::session::{Session, SessionStore};
use leadflow::store::{Question, QuestionProvider, ReplyRecorder};
use leadflow::webhook::{ConversationEngine, EngineDeps, WebhookState, webhook_routes};

/// Maximum time any test is allowed to run before we consider it hung.
const TEST_TIMEOUT: Duration = Duration::from_secs(5);

const ADVISOR: i64 = 7;
const USER: i64 = 42;
const PHONE: &str = "+6591234567";

struct StubQuestions {
    by_step: HashMap<u32, Question>,
}

#[async_trait]
impl QuestionProvider for StubQuestions {
    async fn question_at(
        &self,
        advisor_id: i64,
        step: u32,
    ) -> Result<Option<Question>, DatabaseError> {
        if advisor_id != ADVISOR {
            return Ok(None);
        }
        Ok(self.by_step.get(&step).cloned())
    }
}

#[derive(Default)]
struct MemoryReplies {
    rows: Mutex<Vec<(i64, i64, String)>>,
}

#[async_trait]
impl ReplyRecorder for MemoryReplies {
    async fn append_reply(
        &self,
        user_id: i64,
        question_id: i64,
        reply: &str,
    ) -> Result<(), DatabaseError> {
        self.rows
            .lock()
            .unwrap()
            .push((user_id, question_id, reply.to_string()));
        Ok(())
    }

    async fn has_reply(&self, user_id: i64, question_id: i64) -> Result<bool, DatabaseError> {
        Ok(self
            .rows
            .lock()
            .unwrap()
            .iter()
            .any(|(u, q, _)| *u == user_id && *q == question_id))
    }
}

/// Start the webhook server on a random port.
async fn start_server() -> (u16, Arc<SessionStore>, Arc<MemoryReplies>) {
    let questions = Arc::new(StubQuestions {
        by_step: HashMap::from([
            (
                1,
                Question {
                    id: 1,
                    advisor_id: ADVISOR,
                    step: 1,
                    text: "What's your age?".to_string(),
                    trigger_keyword: None,
                    is_predefined_answer: false,
                },
            ),
            (
                2,
                Question {
                    id: 2,
                    advisor_id: ADVISOR,
                    step: 2,
                    text: "Shall we proceed?".to_string(),
                    trigger_keyword: Some("YES".to_string()),
                    is_predefined_answer: true,
                },
            ),
        ]),
    });
    let replies = Arc::new(MemoryReplies::default());
    let sessions = SessionStore::new(SessionConfig::default());
    let engine = Arc::new(ConversationEngine::new(
        EngineDeps {
            sessions: Arc::clone(&sessions),
            questions,
            replies: Arc::clone(&replies) as Arc<dyn ReplyRecorder>,
        },
        false,
    ));
    let app = webhook_routes(WebhookState { engine });

    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let port = listener.local_addr().unwrap().port();
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });

    // Give the server a moment to start accepting connections.
    tokio::time::sleep(Duration::from_millis(50)).await;

    (port, sessions, replies)
}

async fn post_message(client: &reqwest::Client, port: u16, from: &str, body: &str) -> String {
    let resp = client
        .post(format!("http://127.0.0.1:{port}/webhook"))
        .form(&[("From", from), ("Body", body)])
        .send()
        .await
        .unwrap();
    assert!(resp.status().is_success());
    assert_eq!(
        resp.headers()
            .get(reqwest::header::CONTENT_TYPE)
            .unwrap()
            .to_str()
            .unwrap(),
        "application/xml"
    );
    resp.text().await.unwrap()
}

fn message_body(twiml: &str) -> &str {
    let start = twiml.find("<Message>").expect("has Message element") + "<Message>".len();
    let end = twiml.find("</Message>").expect("has closing Message");
    &twiml[start..end]
}

#[tokio::test]
async fn webhook_without_session_prompts_for_form() {
    timeout(TEST_TIMEOUT, async {
        let (port, _sessions, _replies) = start_server().await;
        let client = reqwest::Client::new();

        let twiml = post_message(&client, port, "whatsapp:+6500000000", "hello").await;
        assert_eq!(
            message_body(&twiml),
            "Please submit the form to start the session."
        );
    })
    .await
    .unwrap();
}

#[tokio::test]
async fn webhook_walks_the_full_conversation() {
    timeout(TEST_TIMEOUT, async {
        let (port, sessions, replies) = start_server().await;
        let client = reqwest::Client::new();
        let from = format!("whatsapp:{PHONE}");

        sessions.set(PHONE, Session::new(PHONE, ADVISOR, USER)).await;

        // Anything but the start token is rejected.
        let twiml = post_message(&client, port, &from, "hi").await;
        assert_eq!(
            message_body(&twiml),
            "Invalid session state. Please start again."
        );

        let twiml = post_message(&client, port, &from, " Start ").await;
        assert_eq!(message_body(&twiml), "What&apos;s your age?");

        let twiml = post_message(&client, port, &from, "30").await;
        assert_eq!(message_body(&twiml), "Shall we proceed?");
        assert_eq!(
            replies.rows.lock().unwrap().as_slice(),
            &[(USER, 1, "30".to_string())]
        );

        // Keyword gate holds until the trigger arrives.
        let twiml = post_message(&client, port, &from, "no").await;
        assert_eq!(message_body(&twiml), "Please respond with &apos;YES&apos;.");

        let twiml = post_message(&client, port, &from, "yes").await;
        assert_eq!(
            message_body(&twiml),
            "Thank you! You&apos;ve completed all questions."
        );

        // Sequence exhausted: the session is gone.
        assert!(sessions.get(PHONE).await.is_none());
        let twiml = post_message(&client, port, &from, "yes").await;
        assert_eq!(
            message_body(&twiml),
            "Please submit the form to start the session."
        );
    })
    .await
    .unwrap();
}
