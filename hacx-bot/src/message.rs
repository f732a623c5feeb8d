//! Inbound message type shared by channels and the dispatcher.

use serde::{Deserialize, Serialize};

/// A text message received from a chat.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChannelMessage {
    /// Message ID (channel-specific)
    pub id: String,
    /// Conversation identifier; keys the session store
    pub chat_id: String,
    /// Sender identifier
    pub user_id: String,
    /// Sender display name, used in the welcome message
    #[serde(default)]
    pub first_name: Option<String>,
    /// Message text
    pub text: String,
    /// Timestamp (Unix millis)
    pub timestamp: i64,
}

impl ChannelMessage {
    pub fn new(chat_id: impl Into<String>, text: impl Into<String>) -> Self {
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            chat_id: chat_id.into(),
            user_id: String::new(),
            first_name: None,
            text: text.into(),
            timestamp: crate::session::now_millis(),
        }
    }

    pub fn with_sender(mut self, user_id: impl Into<String>, first_name: Option<String>) -> Self {
        self.user_id = user_id.into();
        self.first_name = first_name;
        self
    }

    /// Whether the text looks like a bot command.
    pub fn is_command(&self) -> bool {
        self.text.starts_with('/')
    }

    /// Command word without the leading slash or `@botname` suffix.
    ///
    /// `"/start@HacxBot hi"` yields `Some("start")`.
    pub fn command(&self) -> Option<&str> {
        let word = self.text.strip_prefix('/')?.split_whitespace().next()?;
        let name = word.split('@').next().unwrap_or(word);
        (!name.is_empty()).then_some(name)
    }

    /// Name to greet the sender with.
    pub fn display_name(&self) -> &str {
        self.first_name
            .as_deref()
            .filter(|n| !n.trim().is_empty())
            .unwrap_or("")
    }
}
