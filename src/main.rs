//! # Voice Relay Backend - Main Application Entry Point
//!
//! An actix-web server that relays voice (and optional camera) captures from
//! embedded clients through remote model collaborators and streams the
//! synthesized reply back over the same connection.
//!
//! ## Application Architecture:
//! - **config**: layered configuration (TOML file + environment variables)
//! - **state**: shared application state and metrics
//! - **storage**: filesystem artifact store under the uploads root
//! - **protocol**: the media-exchange state machine (classifier, assembler,
//!   coordinator, transmitter)
//! - **processing**: collaborator traits and their remote HTTP backends
//! - **broadcast**: observer fan-out hub with bounded history replay
//! - **chat**: process-wide chat session registry
//! - **websocket**: actix actors bridging connections to the protocol
//! - **handlers / health / middleware**: the REST surface around it all

mod broadcast;
mod chat;
mod config;
mod error;
mod handlers;
mod health;
mod middleware;
mod processing;
mod protocol;
mod state;
mod storage;
mod websocket;

use actix_cors::Cors;
use actix_web::{web, App, HttpServer};
use anyhow::Result;
use config::AppConfig;
use processing::remote::{RemoteGenerator, RemoteSynthesizer, RemoteTranscriber};
use processing::ProcessingPipeline;
use state::AppState;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tracing::{error, info};
use tracing_actix_web::TracingLogger;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

/// Global shutdown signal, set by the signal handler task.
static SHUTDOWN_SIGNAL: AtomicBool = AtomicBool::new(false);

#[actix_web::main]
async fn main() -> Result<()> {
    dotenv::dotenv().ok();

    init_tracing()?;

    let config = AppConfig::load()?;
    config.validate()?;

    info!("Starting voice-relay-backend v{}", env!("CARGO_PKG_VERSION"));
    info!("Configuration loaded: {}:{}", config.server.host, config.server.port);

    // Storage bootstrap creates the artifact folders up front.
    let store = Arc::new(storage::MediaStore::bootstrap(&config.storage.upload_dir).await?);

    let pipeline = Arc::new(ProcessingPipeline::new(
        Arc::new(RemoteTranscriber::new(config.collaborators.clone())?),
        Arc::new(RemoteGenerator::new(config.collaborators.clone())?),
        Arc::new(RemoteSynthesizer::new(config.collaborators.clone())?),
    ));
    let hub = Arc::new(broadcast::BroadcastHub::new(config.broadcast.history_capacity));
    let chat = Arc::new(chat::ChatRegistry::new());

    let app_state = AppState::new(config.clone(), store, hub, pipeline, chat);
    let bind_addr = format!("{}:{}", config.server.host, config.server.port);

    setup_signal_handlers();

    info!("Upload endpoint: ws://{}/upload", bind_addr);
    info!("Observer endpoint: ws://{}/ws/events", bind_addr);
    info!("Starting HTTP server on {}", bind_addr);

    let server = HttpServer::new(move || {
        let cors = Cors::default()
            .allow_any_origin()
            .allow_any_method()
            .allow_any_header()
            .max_age(3600);

        App::new()
            .app_data(web::Data::new(app_state.clone()))
            .wrap(cors)
            .wrap(TracingLogger::default())
            .wrap(middleware::MetricsMiddleware)
            .wrap(middleware::RequestLogging)
            // Protocol endpoints; /ws/upload is a legacy alias for older
            // clients, same state machine behind both.
            .route("/upload", web::get().to(websocket::media_exchange))
            .route("/ws/upload", web::get().to(websocket::media_exchange))
            .route("/ws/events", web::get().to(websocket::event_stream))
            // REST surface
            .route("/", web::get().to(handlers::index))
            .route("/health", web::get().to(health::health_check))
            .service(
                web::scope("/api/v1")
                    .route("/health", web::get().to(health::health_check))
                    .route("/metrics", web::get().to(health::detailed_metrics))
                    .route("/config", web::get().to(handlers::get_config))
                    .route("/config", web::put().to(handlers::update_config))
                    .route("/files", web::get().to(handlers::list_files))
                    .route("/chat/end", web::post().to(handlers::end_chat)),
            )
    })
    .bind(&bind_addr)?
    .run();

    let server_handle = server.handle();
    let server_task = tokio::spawn(server);

    tokio::select! {
        result = server_task => {
            match result {
                Ok(server_result) => {
                    if let Err(e) = server_result {
                        error!("Server error: {}", e);
                    }
                }
                Err(e) => {
                    error!("Server task error: {}", e);
                }
            }
        }
        _ = wait_for_shutdown() => {
            info!("Shutdown signal received, stopping server...");
            server_handle.stop(true).await;
        }
    }

    info!("Server stopped gracefully");
    Ok(())
}

fn init_tracing() -> Result<()> {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "voice_relay_backend=debug,actix_web=info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    Ok(())
}

fn setup_signal_handlers() {
    tokio::spawn(async {
        let mut sigterm = tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())
            .expect("Failed to install SIGTERM handler");
        let mut sigint = tokio::signal::unix::signal(tokio::signal::unix::SignalKind::interrupt())
            .expect("Failed to install SIGINT handler");

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

async fn wait_for_shutdown() {
    while !SHUTDOWN_SIGNAL.load(Ordering::SeqCst) {
        tokio::time::sleep(tokio::time::Duration::from_millis(100)).await;
    }
}
