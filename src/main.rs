use std::sync::Arc;

use axum::Router;
use axum::http::HeaderValue;
use tokio::sync::RwLock;
use tower_http::cors::{Any, CorsLayer};

use leadflow::config::AppConfig;
use leadflow::intake::{IntakeState, RecaptchaVerifier, intake_routes};
use leadflow::outbound::{
    MessagingProvider, OutboundDispatcher, OutboundState, TwilioWhatsApp, outbound_routes,
};
use leadflow::session::SessionStore;
use leadflow::store::{Database, LibSqlBackend, QuestionProvider, ReplyRecorder};
use leadflow::users::{UsersState, users_routes};
use leadflow::webhook::{ConversationEngine, EngineDeps, WebhookState, webhook_routes};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize tracing
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .with_target(false)
        .init();

    let config = AppConfig::from_env().unwrap_or_else(|e| {
        eprintln!("Error: {e}");
        std::process::exit(1);
    });

    eprintln!("📋 LeadFlow v{}", env!("CARGO_PKG_VERSION"));
    eprintln!("   Bind: http://{}", config.bind_addr);
    eprintln!("   Database: {}", config.db_path);
    eprintln!(
        "   Messaging: {}",
        if config.twilio.is_some() {
            "configured"
        } else {
            "NOT configured (degraded mode)"
        }
    );

    // ── Database ─────────────────────────────────────────────────────
    let backend = Arc::new(
        LibSqlBackend::new_local(std::path::Path::new(&config.db_path))
            .await
            .unwrap_or_else(|e| {
                eprintln!("Error: Failed to open database at {}: {e}", config.db_path);
                std::process::exit(1);
            }),
    );
    let db: Arc<dyn Database> = backend.clone();
    let questions: Arc<dyn QuestionProvider> = backend.clone();
    let replies: Arc<dyn ReplyRecorder> = backend.clone();

    // ── Sessions ─────────────────────────────────────────────────────
    let sessions = SessionStore::new(config.session.clone());

    // ── Outbound messaging ───────────────────────────────────────────
    let dispatcher = config.twilio.clone().map(|twilio| {
        let provider: Arc<dyn MessagingProvider> =
            Arc::new(TwilioWhatsApp::new(twilio, config.dispatch.send_timeout));
        Arc::new(OutboundDispatcher::new(provider, config.dispatch.clone()))
    });
    let welcome_sid = Arc::new(RwLock::new(config.welcome_content_sid.clone()));
    let recaptcha = config
        .recaptcha
        .clone()
        .map(|rc| Arc::new(RecaptchaVerifier::new(rc)));

    // ── Conversation engine ──────────────────────────────────────────
    let engine = Arc::new(ConversationEngine::new(
        EngineDeps {
            sessions: Arc::clone(&sessions),
            questions,
            replies,
        },
        config.dedupe_replies,
    ));

    // ── HTTP surface ─────────────────────────────────────────────────
    let cors = match config.cors_origin.as_deref() {
        Some(origin) => match origin.parse::<HeaderValue>() {
            Ok(value) => CorsLayer::new()
                .allow_origin(value)
                .allow_methods(Any)
                .allow_headers(Any),
            Err(_) => {
                tracing::warn!(origin, "Invalid CORS origin, allowing any");
                CorsLayer::permissive()
            }
        },
        None => CorsLayer::permissive(),
    };

    let app = Router::new()
        .merge(webhook_routes(WebhookState {
            engine: Arc::clone(&engine),
        }))
        .merge(intake_routes(IntakeState {
            db: Arc::clone(&db),
            sessions: Arc::clone(&sessions),
            recaptcha,
            dispatcher: dispatcher.clone(),
            welcome_sid: Arc::clone(&welcome_sid),
        }))
        .merge(outbound_routes(OutboundState {
            db: Arc::clone(&db),
            dispatcher,
            welcome_sid,
        }))
        .merge(users_routes(UsersState { db }))
        .layer(cors);

    let listener = tokio::net::TcpListener::bind(&config.bind_addr).await?;
    tracing::info!(addr = %config.bind_addr, "Listening");

    axum::serve(listener, app)
        .with_graceful_shutdown(async {
            let _ = tokio::signal::ctrl_c().await;
            tracing::info!("Shutdown signal received");
        })
        .await?;

    // Stop the session expiry sweep before exit.
    sessions.shutdown();
    Ok(())
}
