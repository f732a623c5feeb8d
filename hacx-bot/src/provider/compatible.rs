//! OpenAI-compatible chat completion provider.
//!
//! Both OpenRouter and DeepSeek accept the same `/chat/completions` request,
//! so one implementation serves every entry of the provider table.

use super::{CompletionGateway, ProviderEndpoint, ProviderError, TEMPERATURE};
use crate::session::Turn;
use async_trait::async_trait;
use hacx_common::util::{sanitize_for_log, truncate_with_ellipsis};
use reqwest::Client;
use serde::{Deserialize, Serialize};
use std::time::{Duration, Instant};

/// Attribution headers sent to OpenRouter-style gateways.
const REFERER: &str = "https://github.com/BlackHisoka";
const TITLE: &str = "HacxGPT-TelegramBot";

/// A provider that speaks the OpenAI-compatible chat completions API.
pub struct CompatibleProvider {
    name: String,
    base_url: String,
    api_key: String,
    model: String,
    client: Client,
}

#[derive(Debug, Serialize)]
struct CompletionRequest<'a> {
    model: &'a str,
    messages: &'a [Turn],
    stream: bool,
    temperature: f64,
}

#[derive(Debug, Deserialize)]
struct CompletionResponse {
    #[serde(default)]
    choices: Vec<CompletionChoice>,
}

#[derive(Debug, Deserialize)]
struct CompletionChoice {
    message: CompletionMessage,
}

#[derive(Debug, Deserialize)]
struct CompletionMessage {
    #[serde(default)]
    content: Option<String>,
}

impl CompatibleProvider {
    /// Create a provider for an explicit endpoint.
    pub fn new(name: &str, base_url: &str, api_key: &str, model: &str) -> Self {
        Self {
            name: name.to_string(),
            base_url: base_url.trim_end_matches('/').to_string(),
            api_key: api_key.to_string(),
            model: model.to_string(),
            client: Client::builder()
                .timeout(Duration::from_secs(120))
                .connect_timeout(Duration::from_secs(10))
                .build()
                .unwrap_or_else(|_| Client::new()),
        }
    }

    /// Create a provider from a resolved configuration endpoint.
    pub fn from_endpoint(endpoint: &ProviderEndpoint) -> Self {
        Self::new(
            &endpoint.name,
            &endpoint.base_url,
            &endpoint.api_key,
            &endpoint.model,
        )
    }

    fn completions_url(&self) -> String {
        format!("{}/chat/completions", self.base_url)
    }

    fn error(&self, message: String, status_code: Option<u16>) -> ProviderError {
        ProviderError {
            provider: self.name.clone(),
            model: self.model.clone(),
            message,
            status_code,
        }
    }
}

#[async_trait]
impl CompletionGateway for CompatibleProvider {
    fn name(&self) -> &str {
        &self.name
    }

    fn model(&self) -> &str {
        &self.model
    }

    async fn complete(&self, history: &[Turn]) -> Result<String, ProviderError> {
        let start = Instant::now();

        let request = CompletionRequest {
            model: &self.model,
            messages: history,
            stream: false,
            temperature: TEMPERATURE,
        };

        let response = self
            .client
            .post(self.completions_url())
            .header("Authorization", format!("Bearer {}", self.api_key))
            .header("HTTP-Referer", REFERER)
            .header("X-Title", TITLE)
            .json(&request)
            .send()
            .await
            .map_err(|e| self.error(format!("Request failed: {e}"), None))?;

        let status = response.status();
        if !status.is_success() {
            let error_text = response.text().await.unwrap_or_default();
            let error_text = sanitize_for_log(&truncate_with_ellipsis(&error_text, 500));
            return Err(self.error(
                format!("API error ({}): {}", status.as_u16(), error_text),
                Some(status.as_u16()),
            ));
        }

        let result: CompletionResponse = response
            .json()
            .await
            .map_err(|e| self.error(format!("Failed to parse response: {e}"), None))?;

        let content = result
            .choices
            .into_iter()
            .next()
            .and_then(|c| c.message.content)
            .ok_or_else(|| self.error(format!("No response content from {}", self.name), None))?;

        tracing::debug!(
            provider = %self.name,
            model = %self.model,
            turns = history.len(),
            latency_ms = start.elapsed().as_millis() as u64,
            reply_chars = content.chars().count(),
            "Completion received"
        );

        Ok(content)
    }
}
