//! Message dispatcher: routes inbound chat messages to commands or the
//! session manager and relays replies back in Telegram-sized chunks.

use crate::message::ChannelMessage;
use crate::session::SessionManager;
use crate::traits::{Channel, ChannelResult};
use hacx_common::logging::generate_trace_id;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tracing::Instrument;

/// Maximum characters per outbound message.
pub const MAX_CHUNK_CHARS: usize = 4000;

/// Pause between consecutive chunks of one reply.
pub const CHUNK_DELAY: Duration = Duration::from_millis(500);

/// Sent when handling a message fails outright.
pub const PROCESSING_ERROR_REPLY: &str = "❌ حدث خطأ أثناء معالجة رسالتك. الرجاء المحاولة مرة أخرى.";

pub const NEW_SESSION_REPLY: &str = "✨ *تم بدء محادثة جديدة!*\nيمكنك البدء في الكتابة...";

const HELP_TEXT: &str = "*🎯 تعليمات HacxGPT*\n\n\
1. اكتب رسالتك مباشرة للبدء في المحادثة\n\
2. استخدم /new لبدء محادثة جديدة\n\
3. البوت يحتفظ بسياق المحادثة\n\
4. دعم تنسيق Markdown في الردود\n\n\
*ملاحظة:* الجلسات تنتهي بعد ساعة من عدم النشاط.";

/// Bot commands understood by the dispatcher.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Command {
    Start,
    Help,
    New,
    About,
}

impl Command {
    pub fn parse(word: &str) -> Option<Self> {
        match word {
            "start" => Some(Self::Start),
            "help" => Some(Self::Help),
            "new" => Some(Self::New),
            "about" => Some(Self::About),
            _ => None,
        }
    }
}

/// Split `text` into consecutive slices of at most `max_chars` characters.
///
/// Cuts fall on character boundaries only; words and lines may be split.
/// Empty text yields no chunks.
pub fn chunk_text(text: &str, max_chars: usize) -> Vec<String> {
    let max_chars = max_chars.max(1);
    let chars: Vec<char> = text.chars().collect();
    chars
        .chunks(max_chars)
        .map(|c| c.iter().collect())
        .collect()
}

fn welcome_text(first_name: &str) -> String {
    let greeting = if first_name.is_empty() {
        "🚀 *مرحباً!*".to_string()
    } else {
        format!("🚀 *مرحباً {first_name}!*")
    };
    format!(
        "{greeting}\n\n\
أنا *HacxGPT*، مساعد ذكي متطور.\n\n\
*الأوامر المتاحة:*\n\
↪ /new - بدء محادثة جديدة\n\
↪ /help - عرض التعليمات\n\
↪ /about - معلومات عن البوت\n\n\
يمكنك بدء المحادثة مباشرة بكتابة رسالتك."
    )
}

fn about_text(provider: &str, model: &str) -> String {
    format!(
        "*🤖 HacxGPT Telegram Bot*\n\n\
*المطور:* BlackTechX\n\
*الإصدار:* {}\n\
*الموفر:* {provider}\n\
*النموذج:* {model}\n\n\
مشروع مفتوح المصدر متطور للمساعدة الذكية.",
        env!("CARGO_PKG_VERSION")
    )
}

/// Routes messages from a channel to the session manager.
pub struct Dispatcher {
    channel: Arc<dyn Channel>,
    manager: Arc<SessionManager>,
    chunk_delay: Duration,
}

impl Dispatcher {
    pub fn new(channel: Arc<dyn Channel>, manager: Arc<SessionManager>) -> Self {
        Self {
            channel,
            manager,
            chunk_delay: CHUNK_DELAY,
        }
    }

    /// Override the pause between reply chunks.
    pub fn with_chunk_delay(mut self, delay: Duration) -> Self {
        self.chunk_delay = delay;
        self
    }

    pub fn manager(&self) -> &Arc<SessionManager> {
        &self.manager
    }

    /// Handle one inbound message. Failures are logged and reported in-chat.
    pub async fn handle(&self, message: ChannelMessage) {
        let chat_id = message.chat_id.clone();
        if let Err(e) = self.process(message).await {
            tracing::error!(chat_id = %chat_id, error = %e, "Error processing message");
            if let Err(e) = self.channel.send(&chat_id, PROCESSING_ERROR_REPLY).await {
                tracing::error!(chat_id = %chat_id, error = %e, "Failed to send error notice");
            }
        }
    }

    async fn process(&self, message: ChannelMessage) -> ChannelResult<()> {
        if message.is_command() {
            return match message.command().and_then(Command::parse) {
                Some(command) => self.run_command(command, &message).await,
                None => {
                    tracing::debug!(chat_id = %message.chat_id, text = %message.text, "Ignoring unknown command");
                    Ok(())
                }
            };
        }

        if message.text.is_empty() {
            return Ok(());
        }

        if let Err(e) = self.channel.send_typing(&message.chat_id).await {
            tracing::warn!(chat_id = %message.chat_id, error = %e, "Failed to send typing indicator");
        }

        let outcome = self
            .manager
            .record_exchange(&message.chat_id, &message.text)
            .await;
        self.relay(&message.chat_id, outcome.text()).await;
        Ok(())
    }

    async fn run_command(&self, command: Command, message: &ChannelMessage) -> ChannelResult<()> {
        let chat_id = message.chat_id.as_str();
        tracing::info!(chat_id = %chat_id, command = ?command, "Command received");

        match command {
            Command::Start => {
                self.channel
                    .send(chat_id, &welcome_text(message.display_name()))
                    .await
            }
            Command::Help => self.channel.send(chat_id, HELP_TEXT).await,
            Command::New => {
                self.manager.reset(chat_id).await;
                self.channel.send(chat_id, NEW_SESSION_REPLY).await
            }
            Command::About => {
                let gateway = self.manager.gateway();
                self.channel
                    .send(chat_id, &about_text(gateway.name(), gateway.model()))
                    .await
            }
        }
    }

    /// Send `text` to a chat in chunks of at most [`MAX_CHUNK_CHARS`] characters.
    ///
    /// A failed chunk is logged and the remaining chunks are still sent.
    /// Returns the number of chunks delivered.
    pub async fn relay(&self, chat_id: &str, text: &str) -> usize {
        let chunks = chunk_text(text, MAX_CHUNK_CHARS);
        if chunks.is_empty() {
            tracing::warn!(chat_id = %chat_id, "Empty reply, nothing to relay");
            return 0;
        }

        let total = chunks.len();
        let mut delivered = 0;

        for (i, chunk) in chunks.iter().enumerate() {
            match self.channel.send(chat_id, chunk).await {
                Ok(()) => delivered += 1,
                Err(e) => tracing::error!(
                    chat_id = %chat_id,
                    chunk = i + 1,
                    total,
                    error = %e,
                    "Failed to send reply chunk"
                ),
            }
            if i + 1 < total {
                tokio::time::sleep(self.chunk_delay).await;
            }
        }

        delivered
    }

    /// Start a background processor that handles messages from a channel.
    pub fn spawn_processor(
        dispatcher: Arc<Self>,
        mut rx: mpsc::Receiver<ChannelMessage>,
    ) -> tokio::task::JoinHandle<()> {
        tokio::spawn(async move {
            tracing::info!("Dispatcher processor started");

            while let Some(message) = rx.recv().await {
                let dispatcher = dispatcher.clone();
                let span = tracing::info_span!(
                    "message",
                    trace_id = %generate_trace_id(),
                    chat_id = %message.chat_id
                );

                // Process each message in its own task
                tokio::spawn(
                    async move {
                        dispatcher.handle(message).await;
                    }
                    .instrument(span),
                );
            }

            tracing::info!("Dispatcher processor stopped");
        })
    }
}
