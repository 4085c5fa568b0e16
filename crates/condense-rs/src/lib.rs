//! Context management engine for long-running LLM conversations.
//!
//! `condense-rs` keeps an append-only conversation inside a bounded token
//! budget without ever losing the ability to rewind it. Nothing is deleted:
//! older turns are *tagged* as hidden by a summary or a truncation marker,
//! and the view actually sent to the model is a projection over the tagged
//! log. Removing the summary (or the marker) makes the hidden turns visible
//! again.
//!
//! # Getting started
//!
//! ```ignore
//! use condense_rs::prelude::*;
//!
//! let summarizer = OpenRouterSummarizer::new(OpenRouterClient::from_env()?, "anthropic/claude-sonnet-4");
//! let result = manage_context(
//!     ManageRequest::new(&messages, &summarizer, 150_000, 200_000)
//!         .with_auto_condense(true, 75.0)
//!         .with_system_prompt("You are a helpful coding assistant.")
//!         .with_task_id("task-1"),
//!     &ContextConfig::default(),
//!     &LoggingHandler,
//! )
//! .await;
//!
//! let outbound = effective_history(&result.messages);
//! ```
//!
//! # Where to find things
//!
//! - **The tagged data model:** [`Message`], [`MessageContent`], [`ContentBlock`].
//! - **What the model sees:** [`context::projection`]: effective history,
//!   the slice since the last summary, and orphan repair.
//! - **LLM condensation:** [`context::condense`], driven by any
//!   [`Summarizer`](context::summarizer::Summarizer) implementation.
//! - **Deterministic fallback:** [`context::truncation`].
//! - **Per-turn decision:** [`context::budget`] (`manage_context`,
//!   `will_manage_context`).
//! - **Rewind:** [`context::rewind`] over the UI event log and the API log,
//!   persisted through a [`ConversationStore`](session::ConversationStore).
//! - **OpenRouter-backed summarizer:** [`api`].
//!
//! # Modules
//!
//! | Module | Description |
//! |--------|-------------|
//! | [`context`] | Projection, condensation, truncation, budget orchestration, rewind |
//! | [`config`] | [`ContextConfig`](config::ContextConfig) with every tunable constant |
//! | [`events`] | Telemetry events and handlers |
//! | [`session`] | UI event log and JSON file persistence |
//! | [`api`] | OpenRouter client, SSE streaming, summarizer adapter, pricing |

pub mod api;
pub mod config;
pub mod context;
pub mod events;
pub mod prelude;
pub mod session;

use serde::{Deserialize, Serialize};

// ── Message types ──────────────────────────────────────────────────

/// Role of a message in the conversation.
#[derive(Serialize, Deserialize, Clone, Copy, Debug, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum MessageRole {
    User,
    Assistant,
    System,
}

impl std::fmt::Display for MessageRole {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            MessageRole::User => write!(f, "user"),
            MessageRole::Assistant => write!(f, "assistant"),
            MessageRole::System => write!(f, "system"),
        }
    }
}

/// One block of structured message content.
///
/// `Reasoning` is the plain-text private reasoning dialect ("style A").
/// `Thinking` and `RedactedThinking` are the signed / encrypted dialect
/// ("style B"); providers using it reject assistant turns that lack one.
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ContentBlock {
    Text {
        text: String,
    },
    Image {
        media_type: String,
        data: String,
    },
    ToolUse {
        id: String,
        name: String,
        input: serde_json::Value,
    },
    ToolResult {
        tool_use_id: String,
        content: String,
    },
    Reasoning {
        text: String,
    },
    Thinking {
        thinking: String,
        signature: String,
    },
    RedactedThinking {
        data: String,
    },
}

impl ContentBlock {
    pub fn text(text: impl Into<String>) -> Self {
        ContentBlock::Text { text: text.into() }
    }

    pub fn tool_use(
        id: impl Into<String>,
        name: impl Into<String>,
        input: serde_json::Value,
    ) -> Self {
        ContentBlock::ToolUse {
            id: id.into(),
            name: name.into(),
            input,
        }
    }

    pub fn tool_result(tool_use_id: impl Into<String>, content: impl Into<String>) -> Self {
        ContentBlock::ToolResult {
            tool_use_id: tool_use_id.into(),
            content: content.into(),
        }
    }

    /// Any of the three private-reasoning dialects.
    pub fn is_private_reasoning(&self) -> bool {
        matches!(
            self,
            ContentBlock::Reasoning { .. }
                | ContentBlock::Thinking { .. }
                | ContentBlock::RedactedThinking { .. }
        )
    }

    /// Signed or redacted reasoning (style B).
    pub fn is_style_b_reasoning(&self) -> bool {
        matches!(
            self,
            ContentBlock::Thinking { .. } | ContentBlock::RedactedThinking { .. }
        )
    }
}

/// Message content: either plain text or an ordered list of blocks.
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
#[serde(untagged)]
pub enum MessageContent {
    Text(String),
    Blocks(Vec<ContentBlock>),
}

impl MessageContent {
    /// Content as a block list. Plain text becomes a single text block.
    pub fn to_blocks(&self) -> Vec<ContentBlock> {
        match self {
            MessageContent::Text(text) => vec![ContentBlock::text(text.clone())],
            MessageContent::Blocks(blocks) => blocks.clone(),
        }
    }

    /// Borrow the blocks, or an empty slice for plain text.
    pub fn blocks(&self) -> &[ContentBlock] {
        match self {
            MessageContent::Text(_) => &[],
            MessageContent::Blocks(blocks) => blocks,
        }
    }

    /// Concatenated text of all text blocks.
    pub fn text(&self) -> String {
        match self {
            MessageContent::Text(text) => text.clone(),
            MessageContent::Blocks(blocks) => blocks
                .iter()
                .filter_map(|b| match b {
                    ContentBlock::Text { text } => Some(text.as_str()),
                    _ => None,
                })
                .collect::<Vec<_>>()
                .join("\n"),
        }
    }
}

impl From<&str> for MessageContent {
    fn from(text: &str) -> Self {
        MessageContent::Text(text.to_string())
    }
}

impl From<String> for MessageContent {
    fn from(text: String) -> Self {
        MessageContent::Text(text)
    }
}

impl From<Vec<ContentBlock>> for MessageContent {
    fn from(blocks: Vec<ContentBlock>) -> Self {
        MessageContent::Blocks(blocks)
    }
}

fn is_false(v: &bool) -> bool {
    !*v
}

/// One turn in the conversation log, including its soft-deletion tags.
///
/// The serialized form is the persisted wire shape: every tag is written
/// verbatim, so a log reloaded from disk projects to exactly the same view.
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Message {
    pub role: MessageRole,
    pub content: MessageContent,
    /// Milliseconds timestamp. Identity and total order of the log.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ts: Option<i64>,

    /// This message is a summary produced by a condensation.
    #[serde(default, skip_serializing_if = "is_false")]
    pub is_summary: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub condense_id: Option<String>,
    /// Hidden by the summary whose `condense_id` equals this value.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub condense_parent: Option<String>,

    /// This message marks a sliding-window truncation boundary.
    #[serde(default, skip_serializing_if = "is_false")]
    pub is_truncation_marker: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub truncation_id: Option<String>,
    /// Hidden by the truncation whose `truncation_id` equals this value.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub truncation_parent: Option<String>,
}

impl Message {
    pub fn new(role: MessageRole, content: impl Into<MessageContent>) -> Self {
        Self {
            role,
            content: content.into(),
            ts: None,
            is_summary: false,
            condense_id: None,
            condense_parent: None,
            is_truncation_marker: false,
            truncation_id: None,
            truncation_parent: None,
        }
    }

    pub fn user(content: impl Into<MessageContent>) -> Self {
        Self::new(MessageRole::User, content)
    }

    pub fn assistant(content: impl Into<MessageContent>) -> Self {
        Self::new(MessageRole::Assistant, content)
    }

    pub fn system(content: impl Into<MessageContent>) -> Self {
        Self::new(MessageRole::System, content)
    }

    /// Set the timestamp (builder style).
    pub fn at(mut self, ts: i64) -> Self {
        self.ts = Some(ts);
        self
    }

    pub fn has_tool_results(&self) -> bool {
        self.content
            .blocks()
            .iter()
            .any(|b| matches!(b, ContentBlock::ToolResult { .. }))
    }

    /// Ids referenced by this message's `tool_result` blocks, in order.
    pub fn tool_result_ids(&self) -> Vec<&str> {
        self.content
            .blocks()
            .iter()
            .filter_map(|b| match b {
                ContentBlock::ToolResult { tool_use_id, .. } => Some(tool_use_id.as_str()),
                _ => None,
            })
            .collect()
    }

    /// Ids of this message's `tool_use` blocks, in order.
    pub fn tool_use_ids(&self) -> Vec<&str> {
        self.content
            .blocks()
            .iter()
            .filter_map(|b| match b {
                ContentBlock::ToolUse { id, .. } => Some(id.as_str()),
                _ => None,
            })
            .collect()
    }

    /// The `tool_use` block with the given id, if this message carries it.
    pub fn find_tool_use(&self, id: &str) -> Option<&ContentBlock> {
        self.content
            .blocks()
            .iter()
            .find(|b| matches!(b, ContentBlock::ToolUse { id: block_id, .. } if block_id == id))
    }

    /// Private-reasoning blocks of any dialect carried by this message.
    pub fn reasoning_blocks(&self) -> Vec<ContentBlock> {
        self.content
            .blocks()
            .iter()
            .filter(|b| b.is_private_reasoning())
            .cloned()
            .collect()
    }

    /// Copy without soft-deletion tags or timestamp, for outbound requests.
    pub fn to_api(&self) -> Message {
        Message::new(self.role, self.content.clone())
    }

    /// Copy with image blocks removed.
    pub fn without_images(&self) -> Message {
        let mut msg = self.clone();
        if let MessageContent::Blocks(ref mut blocks) = msg.content {
            blocks.retain(|b| !matches!(b, ContentBlock::Image { .. }));
        }
        msg
    }
}

/// Current time in milliseconds, used for synthetic entries without a neighbor.
pub fn now_millis() -> i64 {
    chrono::Utc::now().timestamp_millis()
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn message_constructors() {
        let user = Message::user("hello").at(10);
        assert_eq!(user.role, MessageRole::User);
        assert_eq!(user.ts, Some(10));
        assert_eq!(user.content.text(), "hello");

        let assistant = Message::assistant(vec![
            ContentBlock::text("calling"),
            ContentBlock::tool_use("t1", "read_file", json!({"path": "a.rs"})),
        ]);
        assert_eq!(assistant.tool_use_ids(), vec!["t1"]);
        assert!(assistant.find_tool_use("t1").is_some());
        assert!(assistant.find_tool_use("t2").is_none());
    }

    #[test]
    fn persisted_shape_uses_camel_case_tags() {
        let mut msg = Message::assistant("summary").at(5);
        msg.is_summary = true;
        msg.condense_id = Some("c-1".into());

        let value = serde_json::to_value(&msg).unwrap();
        assert_eq!(value["isSummary"], true);
        assert_eq!(value["condenseId"], "c-1");
        assert_eq!(value["content"], "summary");
        assert!(value.get("condenseParent").is_none());
        assert!(value.get("isTruncationMarker").is_none());
    }

    #[test]
    fn block_content_round_trips_through_persisted_shape() {
        let raw = json!({
            "role": "user",
            "ts": 7,
            "truncationParent": "t-9",
            "content": [
                {"type": "tool_result", "tool_use_id": "t1", "content": "ok"},
                {"type": "text", "text": "next"}
            ]
        });
        let msg: Message = serde_json::from_value(raw).unwrap();
        assert_eq!(msg.truncation_parent.as_deref(), Some("t-9"));
        assert!(!msg.is_summary);
        assert_eq!(msg.tool_result_ids(), vec!["t1"]);
        assert_eq!(msg.content.text(), "next");
    }

    #[test]
    fn to_api_strips_tags_and_images() {
        let mut msg = Message::user(vec![
            ContentBlock::Image {
                media_type: "image/png".into(),
                data: "AAAA".into(),
            },
            ContentBlock::text("look"),
        ])
        .at(3);
        msg.condense_parent = Some("c-1".into());

        let api = msg.without_images().to_api();
        assert_eq!(api.ts, None);
        assert_eq!(api.condense_parent, None);
        assert_eq!(api.content.blocks().len(), 1);
    }

    #[test]
    fn reasoning_dialects_are_classified() {
        let a = ContentBlock::Reasoning { text: "r".into() };
        let b = ContentBlock::Thinking {
            thinking: "t".into(),
            signature: "s".into(),
        };
        let redacted = ContentBlock::RedactedThinking { data: "x".into() };
        assert!(a.is_private_reasoning() && !a.is_style_b_reasoning());
        assert!(b.is_style_b_reasoning());
        assert!(redacted.is_style_b_reasoning());
        assert!(!ContentBlock::text("hi").is_private_reasoning());
    }
}
