//! OpenRouter chat completions client and the wire message format.

use crate::{ContentBlock, Message, MessageRole};
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::{debug, trace};

pub const OPENROUTER_URL: &str = "https://openrouter.ai/api/v1/chat/completions";

/// Output budget for summarization calls.
pub const SUMMARY_MAX_TOKENS: u32 = 8192;

// ── Request types ──────────────────────────────────────────────────

/// Streaming chat completion request body.
#[derive(Serialize, Debug)]
pub struct ChatRequest {
    pub model: String,
    pub messages: Vec<WireMessage>,
    #[serde(skip_serializing_if = "is_zero_u32")]
    pub max_tokens: u32,
    #[serde(skip_serializing_if = "is_zero_f32")]
    pub temperature: f32,
    pub stream: bool,
    /// Ask OpenRouter to report the request cost in the final chunk.
    pub usage: UsageRequest,
}

#[derive(Serialize, Debug, Clone, Copy)]
pub struct UsageRequest {
    pub include: bool,
}

fn is_zero_u32(v: &u32) -> bool {
    *v == 0
}
fn is_zero_f32(v: &f32) -> bool {
    *v == 0.0
}

/// A message in OpenAI chat format.
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
pub struct WireMessage {
    pub role: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub content: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tool_calls: Option<Vec<ToolCall>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tool_call_id: Option<String>,
}

impl WireMessage {
    fn text(role: &str, content: String) -> Self {
        Self {
            role: role.to_string(),
            content: Some(content),
            tool_calls: None,
            tool_call_id: None,
        }
    }
}

#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
pub struct ToolCall {
    pub id: String,
    #[serde(rename = "type")]
    pub call_type: String,
    pub function: FunctionCallData,
}

#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
pub struct FunctionCallData {
    pub name: String,
    pub arguments: String,
}

/// Convert the conversation into OpenAI chat format.
///
/// The system prompt goes first. `tool_use` blocks become assistant
/// `tool_calls`, `tool_result` blocks become `tool` messages. Images and
/// private reasoning are not sent, and neither are soft-deletion tags.
pub fn to_wire_messages(system_prompt: &str, messages: &[Message]) -> Vec<WireMessage> {
    let mut wire = vec![WireMessage::text("system", system_prompt.to_string())];
    for msg in messages {
        let blocks = msg.content.to_blocks();
        let text = msg.content.text();
        match msg.role {
            MessageRole::System => wire.push(WireMessage::text("system", text)),
            MessageRole::User => {
                for block in &blocks {
                    if let ContentBlock::ToolResult {
                        tool_use_id,
                        content,
                    } = block
                    {
                        wire.push(WireMessage {
                            tool_call_id: Some(tool_use_id.clone()),
                            ..WireMessage::text("tool", content.clone())
                        });
                    }
                }
                if !text.is_empty() {
                    wire.push(WireMessage::text("user", text));
                }
            }
            MessageRole::Assistant => {
                let calls: Vec<ToolCall> = blocks
                    .iter()
                    .filter_map(|b| match b {
                        ContentBlock::ToolUse { id, name, input } => Some(ToolCall {
                            id: id.clone(),
                            call_type: "function".into(),
                            function: FunctionCallData {
                                name: name.clone(),
                                arguments: input.to_string(),
                            },
                        }),
                        _ => None,
                    })
                    .collect();
                wire.push(WireMessage {
                    role: "assistant".into(),
                    content: (!text.is_empty()).then_some(text),
                    tool_calls: (!calls.is_empty()).then_some(calls),
                    tool_call_id: None,
                });
            }
        }
    }
    wire
}

// ── Client ─────────────────────────────────────────────────────────

/// Async HTTP client for the OpenRouter chat completions API.
#[derive(Clone)]
pub struct OpenRouterClient {
    pub(crate) client: reqwest::Client,
    pub(crate) api_key: String,
    pub(crate) referer: String,
    pub(crate) title: String,
}

impl OpenRouterClient {
    /// Create a new client with the given API key and default headers.
    pub fn new(api_key: impl Into<String>) -> Result<Self, String> {
        Self::with_headers(api_key, "https://github.com/tacryt-socryp/condense-rs", "condense-rs")
    }

    /// Create a client from the `OPENROUTER_KEY` environment variable.
    pub fn from_env() -> Result<Self, String> {
        let api_key =
            std::env::var("OPENROUTER_KEY").map_err(|_| "OPENROUTER_KEY not set".to_string())?;
        Self::new(api_key)
    }

    /// Create a new client with custom Referer and X-Title headers.
    pub fn with_headers(
        api_key: impl Into<String>,
        referer: impl Into<String>,
        title: impl Into<String>,
    ) -> Result<Self, String> {
        let client = reqwest::Client::builder()
            .user_agent("condense-rs/0.1")
            .connect_timeout(Duration::from_secs(30))
            .build()
            .map_err(|e| format!("failed to build HTTP client: {e}"))?;
        Ok(Self {
            client,
            api_key: api_key.into(),
            referer: referer.into(),
            title: title.into(),
        })
    }

    /// Send a streaming request and return the open response.
    pub async fn send_stream(&self, body: &ChatRequest) -> Result<reqwest::Response, String> {
        debug!(
            "Summary request: model={}, messages={}, max_tokens={}",
            body.model,
            body.messages.len(),
            body.max_tokens,
        );
        trace!(
            "Request payload size: {} bytes",
            serde_json::to_string(body).map_or(0, |s| s.len())
        );

        let resp = self
            .client
            .post(OPENROUTER_URL)
            .header("Authorization", format!("Bearer {}", self.api_key))
            .header("HTTP-Referer", &self.referer)
            .header("X-Title", &self.title)
            .json(body)
            .send()
            .await
            .map_err(|e| format!("streaming request failed: {e}"))?;

        if !resp.status().is_success() {
            let status = resp.status();
            let text = resp.text().await.unwrap_or_default();
            return Err(format!("OpenRouter API HTTP {status}: {text}"));
        }
        Ok(resp)
    }
}
