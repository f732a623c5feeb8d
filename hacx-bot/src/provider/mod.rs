//! Completion gateway: the remote model behind the bot.
//!
//! The lifecycle manager only sees [`CompletionGateway`]; the HTTP details
//! live in [`CompatibleProvider`].

mod compatible;

pub use compatible::CompatibleProvider;
pub use hacx_common::config::{ProviderEndpoint, ProviderPreset, PROVIDERS};

use crate::session::Turn;
use async_trait::async_trait;

/// Sampling temperature sent with every completion request.
pub const TEMPERATURE: f64 = 0.7;

/// Sends an ordered history to a model and returns the generated text.
#[async_trait]
pub trait CompletionGateway: Send + Sync {
    /// Provider name, for logs and `/about`.
    fn name(&self) -> &str;

    /// Model identifier requested from the provider.
    fn model(&self) -> &str;

    /// Request a completion for `history`.
    async fn complete(&self, history: &[Turn]) -> Result<String, ProviderError>;
}

/// Error from a provider.
#[derive(Debug, Clone)]
pub struct ProviderError {
    pub provider: String,
    pub model: String,
    pub message: String,
    pub status_code: Option<u16>,
}

impl std::fmt::Display for ProviderError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "[{}:{}] {}", self.provider, self.model, self.message)
    }
}

impl std::error::Error for ProviderError {}
