use std::time::Duration;

use reqwest::Client;
use serde::Serialize;
use serde_json::Value;

use crate::config::ChatConfig;
use crate::error::{NewsError, NewsResult};

const COMPLETIONS_PATH: &str = "/v1/chat/completions";
const API_KEY_HEADER: &str = "api-subscription-key";

#[derive(Debug, Serialize)]
struct ChatMessage<'a> {
    role: &'a str,
    content: &'a str,
}

#[derive(Debug, Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    temperature: f32,
    max_tokens: u32,
    messages: [ChatMessage<'a>; 2],
}

/// Client for the chat-completion endpoint used by summarization and
/// translation.
pub struct ChatClient {
    client: Client,
    base_url: String,
    model: String,
    api_key: Option<String>,
}

impl ChatClient {
    pub fn new(config: &ChatConfig) -> NewsResult<Self> {
        let client = Client::builder()
            .timeout(Duration::from_secs(60))
            .build()?;

        Ok(Self {
            client,
            base_url: config.base_url.trim_end_matches('/').to_string(),
            model: config.model.clone(),
            api_key: config.api_key(),
        })
    }

    /// Replace the key read from the environment.
    pub fn with_api_key(mut self, api_key: Option<String>) -> Self {
        self.api_key = api_key.filter(|key| !key.trim().is_empty());
        self
    }

    pub fn is_enabled(&self) -> bool {
        self.api_key.is_some()
    }

    /// Run one completion and return the assistant's message text.
    pub async fn complete(
        &self,
        system: &str,
        user: &str,
        temperature: f32,
        max_tokens: u32,
    ) -> NewsResult<String> {
        let api_key = self
            .api_key
            .as_deref()
            .ok_or(NewsError::MissingConfig("chat API key"))?;

        let request = ChatRequest {
            model: &self.model,
            temperature,
            max_tokens,
            messages: [
                ChatMessage {
                    role: "system",
                    content: system,
                },
                ChatMessage {
                    role: "user",
                    content: user,
                },
            ],
        };

        let response = self
            .client
            .post(format!("{}{}", self.base_url, COMPLETIONS_PATH))
            .header(API_KEY_HEADER, api_key)
            .json(&request)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            return Err(NewsError::Api {
                status: status.as_u16(),
                message: format!("Chat completion request failed ({})", status),
            });
        }

        let payload: Value = response.json().await?;
        assistant_content(&payload)
            .ok_or_else(|| NewsError::Parse("Chat completion response is empty".to_string()))
    }
}

fn assistant_content(payload: &Value) -> Option<String> {
    payload
        .pointer("/choices/0/message/content")
        .and_then(Value::as_str)
        .map(str::trim)
        .filter(|content| !content.is_empty())
        .map(str::to_string)
}

/// The outermost `{...}` span of a model reply, which often wraps its JSON in
/// prose or code fences.
pub fn extract_json_object(text: &str) -> Option<&str> {
    let start = text.find('{')?;
    let end = text.rfind('}')?;
    (end > start).then(|| &text[start..=end])
}
