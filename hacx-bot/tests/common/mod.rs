//! Shared fakes for integration tests.

#![allow(dead_code)]

use async_trait::async_trait;
use hacx_bot::{
    Channel, ChannelError, ChannelMessage, ChannelResult, CompletionGateway, MemorySnapshot,
    ProviderError, SessionManager, SessionStore, Turn,
};
use std::collections::HashSet;
use std::sync::{Arc, Mutex};
use tokio::sync::mpsc;

/// Something the fake channel was asked to do.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Sent {
    Text { chat_id: String, text: String },
    Typing { chat_id: String },
}

/// Channel that records outbound traffic and can fail chosen sends.
#[derive(Default)]
pub struct RecordingChannel {
    sent: Mutex<Vec<Sent>>,
    /// 1-based indices of `send` calls that should fail
    failing_sends: HashSet<usize>,
    send_calls: Mutex<usize>,
}

impl RecordingChannel {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn failing_on(sends: &[usize]) -> Arc<Self> {
        Arc::new(Self {
            failing_sends: sends.iter().copied().collect(),
            ..Self::default()
        })
    }

    pub fn sent(&self) -> Vec<Sent> {
        self.sent.lock().unwrap().clone()
    }

    pub fn texts(&self) -> Vec<String> {
        self.sent()
            .into_iter()
            .filter_map(|s| match s {
                Sent::Text { text, .. } => Some(text),
                Sent::Typing { .. } => None,
            })
            .collect()
    }
}

#[async_trait]
impl Channel for RecordingChannel {
    fn name(&self) -> &'static str {
        "recording"
    }

    async fn init(&mut self) -> ChannelResult<()> {
        Ok(())
    }

    async fn send(&self, chat_id: &str, text: &str) -> ChannelResult<()> {
        let call = {
            let mut calls = self.send_calls.lock().unwrap();
            *calls += 1;
            *calls
        };
        if self.failing_sends.contains(&call) {
            return Err(ChannelError::SendFailed(format!("send #{call} refused")));
        }
        self.sent.lock().unwrap().push(Sent::Text {
            chat_id: chat_id.to_string(),
            text: text.to_string(),
        });
        Ok(())
    }

    async fn send_typing(&self, chat_id: &str) -> ChannelResult<()> {
        self.sent.lock().unwrap().push(Sent::Typing {
            chat_id: chat_id.to_string(),
        });
        Ok(())
    }

    async fn listen(&self, _tx: mpsc::Sender<ChannelMessage>) -> ChannelResult<()> {
        Ok(())
    }

    async fn health_check(&self) -> ChannelResult<()> {
        Ok(())
    }
}

/// Gateway returning a fixed reply and recording every history it saw.
pub struct FixedGateway {
    reply: Option<String>,
    seen: Mutex<Vec<Vec<Turn>>>,
}

impl FixedGateway {
    pub fn replying(reply: impl Into<String>) -> Arc<Self> {
        Arc::new(Self {
            reply: Some(reply.into()),
            seen: Mutex::new(Vec::new()),
        })
    }

    pub fn failing() -> Arc<Self> {
        Arc::new(Self {
            reply: None,
            seen: Mutex::new(Vec::new()),
        })
    }

    pub fn seen(&self) -> Vec<Vec<Turn>> {
        self.seen.lock().unwrap().clone()
    }
}

#[async_trait]
impl CompletionGateway for FixedGateway {
    fn name(&self) -> &str {
        "fixed"
    }

    fn model(&self) -> &str {
        "fixed-model"
    }

    async fn complete(&self, history: &[Turn]) -> Result<String, ProviderError> {
        self.seen.lock().unwrap().push(history.to_vec());
        self.reply.clone().ok_or_else(|| ProviderError {
            provider: "fixed".into(),
            model: "fixed-model".into(),
            message: "upstream unavailable".into(),
            status_code: Some(503),
        })
    }
}

pub async fn memory_manager(gateway: Arc<dyn CompletionGateway>) -> Arc<SessionManager> {
    let store = Arc::new(SessionStore::open(Arc::new(MemorySnapshot::new())).await);
    Arc::new(SessionManager::new(store, gateway))
}
