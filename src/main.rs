//! # Voice Relay Backend - Main Application Entry Point
//!
//! Starts two HTTP servers on one Actix runtime:
//! - the **ingestion endpoint** (websocket, default port 8765) the browser
//!   extension streams PCM audio to
//! - the **control API** (JSON, default port 48766) used to join and leave a
//!   voice channel and to read status
//!
//! plus the orchestrator task that starts relaying once audio arrives.
//!
//! ## Startup Order:
//! 1. Load `.env`, set up tracing, load and validate configuration
//! 2. Probe the encoder; a binary without codec support exits here
//! 3. Build relay, ingestion hub and application state
//! 4. Bind both servers and spawn the orchestrator
//! 5. Wait for a shutdown signal, then stop servers and leave the voice channel

use actix_cors::Cors;
use actix_web::{middleware::Logger, web, App, HttpServer};
use anyhow::{Context, Result};
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::{error, info};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use voice_relay_backend::codec;
use voice_relay_backend::config::AppConfig;
use voice_relay_backend::credential::StaticCredentialProvider;
use voice_relay_backend::handlers;
use voice_relay_backend::health;
use voice_relay_backend::ingest::{websocket, IngestEndpoint, IngestHub};
use voice_relay_backend::middleware::{local_origin, LocalOriginGuard, RequestLogging};
use voice_relay_backend::orchestrator::Orchestrator;
use voice_relay_backend::relay::VoiceRelay;
use voice_relay_backend::state::AppState;
use voice_relay_backend::voice::{LoopbackGateway, LoopbackSettings};

#[actix_web::main]
async fn main() -> Result<()> {
    dotenv::dotenv().ok();
    init_tracing()?;

    let config = AppConfig::load().context("failed to load configuration")?;
    config.validate()?;

    info!("Starting voice-relay-backend v{}", env!("CARGO_PKG_VERSION"));

    let encoders = codec::default_encoder_factory();
    if let Err(err) = codec::probe(encoders.as_ref()) {
        error!("Audio encoder check failed: {}", err);
        return Err(err).context("this build cannot encode audio");
    }
    info!(codec = encoders.name(), bitrate = config.audio.bitrate, "Audio encoder ready");

    let gateway = Arc::new(LoopbackGateway::new(LoopbackSettings {
        channel_capacity: config.voice.sink_capacity,
        ..Default::default()
    }));
    let relay = Arc::new(VoiceRelay::new(gateway, encoders, config.relay_settings()));
    let hub = Arc::new(IngestHub::new(config.hub_settings(), relay.subscribe_connected()));
    let credentials = Arc::new(StaticCredentialProvider::new(config.voice.bot_token.clone()));
    if !credentials.is_configured() {
        info!("No DISCORD_BOT_TOKEN configured; connect requests must carry a token");
    }

    let endpoint = IngestEndpoint {
        hub: hub.clone(),
        heartbeat: config.heartbeat_settings(),
    };
    let ingest_addr = format!("{}:{}", config.ingest.host, config.ingest.port);
    let ingest_server = HttpServer::new(move || {
        App::new()
            .wrap(Logger::default())
            .configure(websocket::configure(endpoint.clone()))
    })
    .bind(&ingest_addr)
    .with_context(|| format!("failed to bind websocket endpoint on {}", ingest_addr))?
    .run();
    info!("WebSocket endpoint listening on ws://{}", ingest_addr);

    let control_port = config.server.port;
    let poll_interval = config.poll_interval();
    let control_addr = format!("{}:{}", config.server.host, control_port);
    let app_state = AppState::new(config, hub.clone(), relay.clone(), credentials);
    let control_server = HttpServer::new(move || {
        let cors = Cors::default()
            .allowed_origin_fn(move |origin, _req| {
                origin
                    .to_str()
                    .map(|o| local_origin::is_local_request(Some(o), None, control_port))
                    .unwrap_or(false)
            })
            .allow_any_method()
            .allow_any_header()
            .max_age(3600);

        App::new()
            .app_data(web::Data::new(app_state.clone()))
            .wrap(LocalOriginGuard::new(control_port))
            .wrap(cors)
            .wrap(Logger::default())
            .wrap(RequestLogging)
            .configure(handlers::configure)
            .route("/health", web::get().to(health::health_check))
    })
    .bind(&control_addr)
    .with_context(|| format!("failed to bind control API on {}", control_addr))?
    .run();
    info!("Control API listening on http://{}", control_addr);

    let shutdown = CancellationToken::new();
    spawn_signal_handler(shutdown.clone());

    let orchestrator = Orchestrator::new(hub, relay.clone(), poll_interval);
    let orchestrator_task = tokio::spawn(orchestrator.run(shutdown.clone()));

    let ingest_handle = ingest_server.handle();
    let control_handle = control_server.handle();
    let ingest_task = tokio::spawn(ingest_server);
    let control_task = tokio::spawn(control_server);

    tokio::select! {
        result = ingest_task => log_server_exit("WebSocket endpoint", result),
        result = control_task => log_server_exit("Control API", result),
        _ = shutdown.cancelled() => info!("Shutdown signal received, stopping servers..."),
    }

    shutdown.cancel();
    ingest_handle.stop(true).await;
    control_handle.stop(true).await;
    if let Err(err) = orchestrator_task.await {
        error!("Orchestrator task error: {}", err);
    }
    relay.shutdown().await;

    info!("Server stopped gracefully");
    Ok(())
}

/// Set up structured logging. `RUST_LOG` overrides the default filter.
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

/// Cancel `shutdown` on Ctrl+C, or SIGTERM on unix.
fn spawn_signal_handler(shutdown: CancellationToken) {
    tokio::spawn(async move {
        #[cfg(unix)]
        {
            use tokio::signal::unix::{signal, SignalKind};
            match signal(SignalKind::terminate()) {
                Ok(mut sigterm) => {
                    tokio::select! {
                        _ = sigterm.recv() => info!("Received SIGTERM"),
                        _ = tokio::signal::ctrl_c() => info!("Received SIGINT"),
                    }
                }
                Err(err) => {
                    error!("Failed to install SIGTERM handler: {}", err);
                    if tokio::signal::ctrl_c().await.is_ok() {
                        info!("Received SIGINT");
                    }
                }
            }
        }

        #[cfg(not(unix))]
        {
            if let Err(err) = tokio::signal::ctrl_c().await {
                error!("Failed to listen for Ctrl+C: {}", err);
                return;
            }
            info!("Received Ctrl+C");
        }

        shutdown.cancel();
    });
}

fn log_server_exit(
    name: &str,
    result: std::result::Result<std::io::Result<()>, tokio::task::JoinError>,
) {
    match result {
        Ok(Ok(())) => info!("{} stopped", name),
        Ok(Err(e)) => error!("{} error: {}", name, e),
        Err(e) => error!("{} task error: {}", name, e),
    }
}
