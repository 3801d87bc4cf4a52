use anyhow::Result;
use std::net::SocketAddr;
use std::sync::Arc;
use tracing::info;

use chat_relay::config::Settings;
use chat_relay::router::build_router;
use chat_relay::services::completion::{CompletionGateway, GatewayConfig};
use chat_relay::services::llm_service::{load_system_prompt, LlmService};
use chat_relay::services::{ConversationManager, ConversationStore};
use chat_relay::state::AppState;

#[tokio::main]
async fn main() -> Result<()> {
    // Load configuration
    let settings = Settings::load()?;

    // Initialize logging (guard flushes the file writer on exit)
    let _log_guard = chat_relay::logging::init_logger(&settings.logging)?;

    info!("==================================================");
    info!("Chat relay starting...");
    info!("==================================================");
    info!("Configuration loaded (model={})", settings.llm.model);

    // Conversation history
    let store = Arc::new(ConversationStore::new(
        settings.history.max_messages,
        settings.history.session_ttl(),
    ));

    // Completion pipeline
    let backend = Arc::new(LlmService::new(&settings.llm)?);
    let system_prompt = load_system_prompt(&settings.llm.system_prompt_path);
    let gateway = Arc::new(CompletionGateway::new(
        backend,
        GatewayConfig::from_llm(&settings.llm),
        system_prompt,
    ));

    let conversation_manager = Arc::new(ConversationManager::new(store, gateway));

    let sweeper = conversation_manager
        .clone()
        .spawn_idle_sweeper(settings.history.sweep_interval());
    info!(
        "Idle session sweeper started (every {}s, ttl {}s)",
        settings.history.sweep_interval_seconds, settings.history.session_ttl_seconds
    );

    let app = build_router(AppState::new(conversation_manager));

    // Server address
    let addr = SocketAddr::from((
        settings.server.host.parse::<std::net::IpAddr>()?,
        settings.server.port,
    ));

    info!("Server listening on {}", addr);

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    sweeper.abort();
    info!("Chat relay stopped");

    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!("Failed to listen for shutdown signal: {}", e);
        std::future::pending::<()>().await;
    }
    info!("Shutdown signal received");
}
