//! # Interview Backend - Main Application Entry Point
//!
//! This is the main entry point for the voice interview web server.
//! A client starts a session, hears a spoken greeting, then answers with
//! recorded audio; each answer is transcribed, sent to a language model
//! together with the whole conversation, and the reply is spoken back.
//!
//! ## Key Rust Concepts Used:
//! - **async/await**: every request runs as its own lightweight task
//! - **Trait objects (`Arc<dyn Trait>`)**: the store, AI provider and greeting
//!   assets are chosen at startup and shared by all workers
//! - **Result<T, E>**: startup errors bubble up through `?` and end the process
//!
//! ## Application Architecture:
//! - **config**: configuration (TOML file + environment variables)
//! - **state**: shared services and metrics
//! - **session**: conversation model, session store and session start
//! - **auth**: bearer secrets and the `Authorization` header extractor
//! - **ai**: OpenAI adapter, greeting assets and speech text cleanup
//! - **pipeline**: one answer turn from upload to stored reply
//! - **handlers**: HTTP endpoints and the response envelope
//! - **middleware**: metrics and the optional access key
//! - **health**: health and metrics endpoints
//! - **error**: HTTP error mapping

mod ai;
mod auth;
mod config;
mod error;
mod handlers;
mod health;
mod middleware;
mod pipeline;
mod session;
mod state;
#[cfg(test)]
mod testing;

use crate::ai::{FileGreetingSource, OpenAiClient};
use crate::config::{AppConfig, StoreBackend};
use crate::middleware::access_key::ACCESS_KEY_HEADER;
use crate::pipeline::TurnPipeline;
use crate::session::{InMemorySessionStore, SessionLifecycle, SessionStore, SledSessionStore};
use crate::state::AppState;
use actix_cors::Cors;
use actix_web::http::header;
use actix_web::{web, App, HttpServer};
use anyhow::{Context, Result};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tracing::{error, info};
use tracing_actix_web::TracingLogger;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

/// Global shutdown signal, set by the signal handler task.
static SHUTDOWN_SIGNAL: AtomicBool = AtomicBool::new(false);

/// The main application entry point.
///
/// ## What this function does:
/// 1. **Loads configuration** from files and environment variables
/// 2. **Sets up logging** for debugging and monitoring
/// 3. **Builds the services**: session store, OpenAI client, greeting assets
/// 4. **Configures the HTTP server** with middleware and routes
/// 5. **Handles graceful shutdown** when receiving system signals
#[actix_web::main]
async fn main() -> Result<()> {
    // It's fine if there's no .env file
    dotenv::dotenv().ok();

    init_tracing()?;

    let config = AppConfig::load()?;
    config.validate()?;

    info!("Starting {} v{}", env!("CARGO_PKG_NAME"), env!("CARGO_PKG_VERSION"));
    info!("Configuration loaded: {}:{}", config.server.host, config.server.port);

    let store = build_store(&config)?;
    info!("Session store: {}", store.backend_name());

    let ai = Arc::new(OpenAiClient::new(config.openai.clone()).context("failed to build OpenAI client")?);
    info!(
        "OpenAI models: chat={}, transcript={}, tts={} ({})",
        config.openai.chat_model,
        config.openai.transcript_model,
        config.openai.tts_model,
        config.openai.tts_voice
    );

    let greetings = FileGreetingSource::new(config.assets.dir.clone());
    info!("Greeting assets: {}", greetings.dir().display());

    let lifecycle = Arc::new(SessionLifecycle::new(
        store.clone(),
        Arc::new(greetings),
        config.session.secret_length,
    ));
    let pipeline = Arc::new(TurnPipeline::new(ai, store.clone()));

    if config.server.access_key.is_some() {
        info!("Access key required on /chat endpoints");
    }

    let app_state = AppState::new(config.clone(), lifecycle, pipeline, store.backend_name());
    let access_key = config.server.access_key.clone();
    let bind_addr = format!("{}:{}", config.server.host, config.server.port);

    setup_signal_handlers();

    info!("Starting HTTP server on {}", bind_addr);

    let server = HttpServer::new(move || {
        let cors = Cors::default()
            .allow_any_origin()
            .allowed_methods(vec!["GET", "POST", "OPTIONS"])
            .allowed_headers(vec![header::ACCEPT, header::AUTHORIZATION, header::CONTENT_TYPE])
            .allowed_header(ACCESS_KEY_HEADER)
            .max_age(3600);

        // Middleware execute in reverse order of wrapping: CORS sees the request first
        App::new()
            .app_data(web::Data::new(app_state.clone()))
            .wrap(middleware::AccessKey::new(access_key.clone()))
            .wrap(middleware::MetricsMiddleware)
            .wrap(TracingLogger::default())
            .wrap(cors)
            .service(
                web::scope("/chat")
                    .route("/start", web::get().to(handlers::start_chat))
                    .route("/answer", web::post().to(handlers::answer_chat)),
            )
            .route("/health", web::get().to(health::health_check))
            .route("/metrics", web::get().to(health::detailed_metrics))
    })
    .bind(&bind_addr)?
    .run();

    let server_handle = server.handle();
    let server_task = tokio::spawn(server);

    tokio::select! {
        result = server_task => {
            match result {
                Ok(Err(e)) => error!("Server error: {}", e),
                Err(e) => error!("Server task error: {}", e),
                Ok(Ok(())) => {}
            }
        }
        _ = wait_for_shutdown() => {
            info!("Shutdown signal received, stopping server...");
            // In-flight turns finish, including their history writes
            server_handle.stop(true).await;
        }
    }

    info!("Server stopped gracefully");
    Ok(())
}

/// Pick the session store named in the configuration.
fn build_store(config: &AppConfig) -> Result<Arc<dyn SessionStore>> {
    let store: Arc<dyn SessionStore> = match config.store.backend {
        StoreBackend::Memory => Arc::new(InMemorySessionStore::new()),
        StoreBackend::Sled => {
            let path = config
                .store
                .path
                .as_ref()
                .context("store.path is required for the sled backend")?;
            let store = SledSessionStore::open(path)
                .with_context(|| format!("failed to open session database at {}", path.display()))?;
            Arc::new(store)
        }
    };
    Ok(store)
}

/// Initialize the tracing (logging) system for the application.
///
/// ## Environment Variables:
/// - `RUST_LOG`: controls what gets logged (e.g., "debug", "interview_backend=trace")
/// - If not set, defaults to "interview_backend=debug,actix_web=info,tracing_actix_web=info"
fn init_tracing() -> Result<()> {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| {
                "interview_backend=debug,actix_web=info,tracing_actix_web=info".into()
            }),
        )
        .with(tracing_subscriber::fmt::layer())
        .try_init()
        .context("failed to initialize tracing")?;

    Ok(())
}

/// Set up signal handlers for graceful shutdown (SIGTERM and SIGINT).
///
/// If the handlers can't be installed the server still runs; it just can't be
/// stopped gracefully through this path.
fn setup_signal_handlers() {
    tokio::spawn(async {
        use tokio::signal::unix::{signal, SignalKind};

        let (mut sigterm, mut sigint) = match (signal(SignalKind::terminate()), signal(SignalKind::interrupt())) {
            (Ok(sigterm), Ok(sigint)) => (sigterm, sigint),
            (Err(e), _) | (_, Err(e)) => {
                error!("Failed to install signal handlers: {}", e);
                return;
            }
        };

        tokio::select! {
            _ = sigterm.recv() => {
                info!("Received SIGTERM");
            }
            _ = sigint.recv() => {
                info!("Received SIGINT");
            }
        }

        SHUTDOWN_SIGNAL.store(true, Ordering::SeqCst);
    });
}

/// Wait for the shutdown signal to be set, checking every 100ms.
async fn wait_for_shutdown() {
    while !SHUTDOWN_SIGNAL.load(Ordering::SeqCst) {
        tokio::time::sleep(tokio::time::Duration::from_millis(100)).await;
    }
}
