//! Channel trait for chat platform adapters.

use crate::message::ChannelMessage;
use async_trait::async_trait;
use tokio::sync::mpsc;

/// Result type for channel operations.
pub type ChannelResult<T> = Result<T, ChannelError>;

/// Channel error type.
#[derive(Debug, thiserror::Error)]
pub enum ChannelError {
    #[error("Authentication failed: {0}")]
    Auth(String),

    #[error("Connection failed: {0}")]
    Connection(String),

    #[error("Rate limited: retry after {retry_after_secs} seconds")]
    RateLimited { retry_after_secs: u64 },

    #[error("Message send failed: {0}")]
    SendFailed(String),

    #[error("Channel not ready")]
    NotReady,
}

/// A chat platform the bot talks through.
#[async_trait]
pub trait Channel: Send + Sync {
    /// Get the channel name.
    fn name(&self) -> &'static str;

    /// Verify credentials and connectivity.
    async fn init(&mut self) -> ChannelResult<()>;

    /// Send one text message to a chat.
    async fn send(&self, chat_id: &str, text: &str) -> ChannelResult<()>;

    /// Show a "typing" indicator in a chat.
    async fn send_typing(&self, chat_id: &str) -> ChannelResult<()>;

    /// Receive messages and forward them to `tx`.
    ///
    /// Runs until `tx` is closed.
    async fn listen(&self, tx: mpsc::Sender<ChannelMessage>) -> ChannelResult<()>;

    /// Check if the channel is healthy.
    async fn health_check(&self) -> ChannelResult<()>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        assert_eq!(
            ChannelError::RateLimited { retry_after_secs: 3 }.to_string(),
            "Rate limited: retry after 3 seconds"
        );
        assert_eq!(
            ChannelError::SendFailed("boom".into()).to_string(),
            "Message send failed: boom"
        );
    }
}
