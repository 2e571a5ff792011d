//! Anthropic Messages API provider (SSE streaming).

use std::time::Duration;

use async_trait::async_trait;
use futures_util::StreamExt;
use reqwest::Client;
use serde::{Deserialize, Serialize};

use crate::infrastructure::ports::{GmError, GmPort, GmTurn, MessageSink};
use crate::infrastructure::session::{ConversationTurn, Role};

use super::stream::LineStreamer;

/// Default Anthropic API base URL.
pub const DEFAULT_ANTHROPIC_BASE_URL: &str = "https://api.anthropic.com";

const ANTHROPIC_VERSION: &str = "2023-06-01";
const MAX_TOKENS: u32 = 1024;

pub struct AnthropicProvider {
    client: Client,
    base_url: String,
    model: String,
    api_key: String,
}

impl AnthropicProvider {
    pub fn new(base_url: &str, model: &str, api_key: &str) -> Self {
        // LLM requests can be slow; allow well over the turn timeout.
        let client = Client::builder()
            .timeout(Duration::from_secs(300))
            .build()
            .unwrap_or_else(|_| Client::new());

        Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
            model: model.to_string(),
            api_key: api_key.to_string(),
        }
    }
}

#[async_trait]
impl GmPort for AnthropicProvider {
    async fn invoke(
        &self,
        system_prompt: &str,
        history: &[ConversationTurn],
        on_message: &MessageSink,
        _resume_id: Option<&str>,
    ) -> GmTurn {
        match self.stream(system_prompt, history, on_message).await {
            Ok(turn) => turn,
            Err(e) => {
                tracing::error!(error = %e, "Anthropic request failed");
                let mut turn = GmTurn::default();
                turn.push_error(e.to_string(), on_message);
                turn
            }
        }
    }
}

impl AnthropicProvider {
    async fn stream(
        &self,
        system_prompt: &str,
        history: &[ConversationTurn],
        on_message: &MessageSink,
    ) -> Result<GmTurn, GmError> {
        let request = MessagesRequest {
            model: self.model.clone(),
            max_tokens: MAX_TOKENS,
            system: system_prompt.to_string(),
            messages: history
                .iter()
                .map(|turn| ApiMessage {
                    role: match turn.role {
                        Role::User => "user",
                        Role::Assistant => "assistant",
                    },
                    content: turn.content.clone(),
                })
                .collect(),
            stream: true,
        };

        let response = self
            .client
            .post(format!("{}/v1/messages", self.base_url))
            .header("x-api-key", &self.api_key)
            .header("anthropic-version", ANTHROPIC_VERSION)
            .json(&request)
            .send()
            .await
            .map_err(|e| GmError::Request(e.to_string()))?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(GmError::Request(format!("{}: {}", status, body)));
        }

        let mut streamer = LineStreamer::new();
        let mut sse_buffer: Vec<u8> = Vec::new();
        let mut body = response.bytes_stream();

        while let Some(chunk) = body.next().await {
            let chunk = match chunk {
                Ok(bytes) => bytes,
                Err(e) => {
                    tracing::warn!(error = %e, "Anthropic stream interrupted");
                    break;
                }
            };
            sse_buffer.extend_from_slice(&chunk);

            // SSE frames are newline-delimited; only complete lines are
            // decoded so multi-byte characters never split.
            while let Some(pos) = sse_buffer.iter().position(|&b| b == b'\n') {
                let line: Vec<u8> = sse_buffer.drain(..=pos).collect();
                let line = String::from_utf8_lossy(&line);
                let line = line.trim();
                if let Some(data) = line.strip_prefix("data: ") {
                    if let Some(text) = delta_text(data) {
                        streamer.push_chunk(&text, on_message);
                    }
                }
            }
        }

        Ok(streamer.finish(on_message))
    }
}

/// Extract the text delta from one SSE data payload, if it carries one.
fn delta_text(data: &str) -> Option<String> {
    let event: StreamEvent = serde_json::from_str(data).ok()?;
    if event.kind != "content_block_delta" {
        return None;
    }
    let delta = event.delta?;
    if delta.kind.as_deref() != Some("text_delta") {
        return None;
    }
    delta.text
}

// =============================================================================
// Messages API types
// =============================================================================

#[derive(Debug, Serialize)]
struct MessagesRequest {
    model: String,
    max_tokens: u32,
    system: String,
    messages: Vec<ApiMessage>,
    stream: bool,
}

#[derive(Debug, Serialize)]
struct ApiMessage {
    role: &'static str,
    content: String,
}

#[derive(Debug, Deserialize)]
struct StreamEvent {
    #[serde(rename = "type")]
    kind: String,
    delta: Option<StreamDelta>,
}

#[derive(Debug, Deserialize)]
struct StreamDelta {
    #[serde(rename = "type")]
    kind: Option<String>,
    text: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn delta_text_extracts_text_deltas_only() {
        let data = r#"{"type":"content_block_delta","index":0,"delta":{"type":"text_delta","text":"[GM] Hi"}}"#;
        assert_eq!(delta_text(data).as_deref(), Some("[GM] Hi"));

        let data = r#"{"type":"message_start","message":{}}"#;
        assert!(delta_text(data).is_none());

        let data = r#"{"type":"content_block_delta","delta":{"type":"input_json_delta","partial_json":"{}"}}"#;
        assert!(delta_text(data).is_none());

        assert!(delta_text("not json").is_none());
    }
}
