//! Main Entrypoint for the Omnicall API Service
//!
//! This binary is responsible for:
//! 1. Loading configuration from the environment.
//! 2. Building the completion client, session store and relay.
//! 3. Starting the idle-session reaper.
//! 4. Constructing the Axum router and applying middleware.
//! 5. Starting the web server and handling graceful shutdown.

use anyhow::Context;
use async_openai::config::OpenAIConfig;
use omnicall_api::{config::Config, router::create_router, state::AppState};
use omnicall_core::{
    CompletionClient, ExpiryReaper, OpenAICompatibleClient, ReaperConfig, SessionStore,
    StreamRelay, llm_client::CompletionSettings,
};
use std::{net::SocketAddr, sync::Arc};
use tokio_util::sync::CancellationToken;
use tower_http::cors::{Any, CorsLayer};
use tracing::{error, info};

/// Waits for `Ctrl+C`, then cancels background tasks so the server can drain.
async fn shutdown_signal(shutdown: CancellationToken) {
    if let Err(e) = tokio::signal::ctrl_c().await {
        error!(error = %e, "Failed to listen for the shutdown signal");
    }
    info!("Received shutdown signal. Shutting down gracefully...");
    shutdown.cancel();
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // --- 1. Load Configuration ---
    let config = Config::from_env().context("Failed to load configuration")?;

    // --- 2. Initialize Logging ---
    tracing_subscriber::fmt()
        .with_max_level(config.log_level)
        .with_timer(tracing_subscriber::fmt::time::ChronoLocal::rfc_3339())
        .init();
    info!("Configuration loaded. Initializing application state...");

    // --- 3. Initialize Shared Services ---
    let openai_config = OpenAIConfig::new()
        .with_api_key(&config.api_key)
        .with_api_base(&config.api_base);
    let client: Arc<dyn CompletionClient> = Arc::new(OpenAICompatibleClient::new(
        openai_config,
        CompletionSettings {
            model: config.chat_model.clone(),
            voice: config.voice.clone(),
            audio_format: config.audio_output_format.clone(),
        },
    ));

    let sessions = Arc::new(SessionStore::new());
    let relay = StreamRelay::new(client, sessions.clone(), config.audio_strategy)
        .with_idle_timeout(config.upstream_idle_timeout);
    let app_state = Arc::new(AppState::new(relay));

    // --- 4. Start the Reaper ---
    let shutdown = CancellationToken::new();
    let reaper = ExpiryReaper::new(
        sessions,
        ReaperConfig {
            interval: config.reaper_interval,
            timeout: config.session_timeout,
        },
    )
    .spawn(shutdown.clone());

    // --- 5. Create Router and Apply Middleware ---
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    let app = create_router(app_state).layer(cors);

    // --- 6. Start Server ---
    info!(
        model = %config.chat_model,
        voice = %config.voice,
        audio = ?config.audio_strategy,
        session_timeout_secs = config.session_timeout.as_secs(),
        bind_address = %config.bind_address,
        "Service configured. Starting server..."
    );
    let listener = tokio::net::TcpListener::bind(config.bind_address).await?;

    axum::serve(
        listener,
        app.into_make_service_with_connect_info::<SocketAddr>(),
    )
    .with_graceful_shutdown(shutdown_signal(shutdown.clone()))
    .await?;

    shutdown.cancel();
    reaper.await.context("Reaper task panicked")?;
    info!("Server has shut down.");
    Ok(())
}
