//! HacxGPT relay bot.
//!
//! Relays Telegram chats to an OpenAI-compatible completion API while
//! keeping a bounded, persisted conversation history per chat.
//!
//! ## Architecture
//!
//! ```text
//! Telegram ─ getUpdates ─→ TelegramChannel ─ mpsc ─→ Dispatcher
//!                                                        │
//!                             SessionManager ←───────────┘
//!                              │          │
//!                   CompletionGateway   SessionStore ─→ data.json
//! ```
//!
//! A liveness HTTP server and an hourly expiry sweeper run alongside.

#![warn(clippy::all)]
#![allow(clippy::pedantic)]

pub mod dispatcher;
pub mod message;
pub mod provider;
pub mod routes;
pub mod session;
pub mod telegram;
pub mod traits;

// Re-export commonly used types
pub use dispatcher::{chunk_text, Command, Dispatcher, CHUNK_DELAY, MAX_CHUNK_CHARS};
pub use message::ChannelMessage;
pub use provider::{CompatibleProvider, CompletionGateway, ProviderError};
pub use routes::build_router;
pub use session::{
    ExchangeOutcome, JsonFileStore, MemorySnapshot, Role, Session, SessionManager, SessionStore,
    SnapshotStore, Turn,
};
pub use telegram::TelegramChannel;
pub use traits::{Channel, ChannelError, ChannelResult};

use anyhow::Context;
use hacx_common::config::Config;
use std::sync::Arc;
use tokio::sync::mpsc;

/// Capacity of the inbound message queue between listener and dispatcher.
const INBOUND_QUEUE: usize = 100;

/// Start the bot and run until interrupted.
///
/// Configuration must already be validated; a missing token or API key is
/// still reported as an error rather than a panic.
pub async fn start_server(config: &Config) -> anyhow::Result<()> {
    let endpoint = config.provider_endpoint()?;
    let token = config
        .telegram_bot_token()
        .context("TELEGRAM_BOT_TOKEN is not defined")?;

    let backend = Arc::new(JsonFileStore::new(config.storage.data_path.clone()));
    let store = Arc::new(SessionStore::open(backend).await);
    tracing::info!(
        path = %config.storage.data_path.display(),
        sessions = store.len().await,
        "Session store ready"
    );

    let gateway: Arc<dyn CompletionGateway> = Arc::new(CompatibleProvider::from_endpoint(&endpoint));
    tracing::info!(provider = %endpoint.name, model = %endpoint.model, "Completion gateway ready");

    let manager = Arc::new(SessionManager::new(store.clone(), gateway));
    let sweeper_handle = manager.clone().spawn_sweeper(session::SWEEP_INTERVAL);

    // Liveness server
    let addr = config.bind_address();
    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .with_context(|| format!("Failed to bind {addr}"))?;
    tracing::info!("Server running on {}", addr);
    let server_handle = tokio::spawn(async move {
        if let Err(e) = axum::serve(listener, build_router()).await {
            tracing::error!(error = %e, "Liveness server stopped");
        }
    });

    // Telegram
    let mut telegram = TelegramChannel::new(token);
    match telegram.init().await {
        Ok(()) => {}
        Err(e @ ChannelError::Auth(_)) => {
            server_handle.abort();
            sweeper_handle.abort();
            return Err(e).context("Telegram rejected the bot token");
        }
        Err(e) => tracing::warn!(error = %e, "Telegram not reachable yet, polling anyway"),
    }
    let channel: Arc<dyn Channel> = Arc::new(telegram);

    let (tx, rx) = mpsc::channel(INBOUND_QUEUE);
    let dispatcher = Arc::new(Dispatcher::new(channel.clone(), manager));
    let processor_handle = Dispatcher::spawn_processor(dispatcher, rx);

    let listen_channel = channel.clone();
    let listener_handle = tokio::spawn(async move {
        if let Err(e) = listen_channel.listen(tx).await {
            tracing::error!(error = %e, "Telegram listener stopped");
        }
    });

    tracing::info!("Bot started successfully!");

    tokio::signal::ctrl_c()
        .await
        .context("Failed to listen for shutdown signal")?;
    tracing::info!("Shutdown requested");

    // Clean up on shutdown
    listener_handle.abort();
    processor_handle.abort();
    sweeper_handle.abort();
    server_handle.abort();
    store.save().await;

    Ok(())
}
