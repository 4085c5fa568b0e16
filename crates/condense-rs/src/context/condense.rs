//! Condensation: replace older history with an LLM-written summary.
//!
//! Nothing is deleted. The summary message is inserted just before the keep
//! window and every older message (except the first) is tagged with the
//! summary's `condense_id`, which hides it from [`effective_history`] for as
//! long as the summary exists.
//!
//! Every failure returns the input log unchanged together with a
//! [`CondenseError`] and whatever cost was already incurred.
//!
//! [`effective_history`]: crate::context::projection::effective_history

use crate::config::ContextConfig;
use crate::context::ids::generate_condense_id;
use crate::context::projection::messages_since_last_summary;
use crate::context::summarizer::{
    SUMMARY_PROMPT, SUMMARY_REQUEST, SummaryAccumulator, Summarizer,
};
use crate::events::{ContextEvent, EventHandler};
use crate::{ContentBlock, Message, MessageRole, now_millis};
use futures::StreamExt;
use std::collections::HashSet;
use tracing::{debug, info, warn};

/// Style-A reasoning placed at the head of a summary when no signed
/// reasoning is available.
pub const SYNTHETIC_SUMMARY_REASONING: &str =
    "Condensing the earlier conversation into a summary to free context space.";

/// Why a condensation attempt did not change the log.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum CondenseError {
    #[error("not enough messages to condense")]
    InsufficientHistory,
    #[error("context was condensed recently; not enough new messages to condense again")]
    RecentCondenseExists,
    #[error("no summarizer able to issue completion requests is configured")]
    HandlerInvalid,
    #[error("the summarizer returned an empty summary")]
    EmptySummary,
    #[error("condensing did not shrink the context ({prev} -> {new} tokens)")]
    ContextGrew { prev: u64, new: u64 },
    #[error("the model requires signed reasoning on assistant turns but none was available")]
    ExtendedThinkingIncompatible,
    #[error("summarizer request failed: {0}")]
    SummarizerFailed(String),
}

// ── Keep window ─────────────────────────────────────────────────────

/// The most recent messages, plus the blocks that must travel with the
/// summary so the kept tool results stay paired.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct KeepWindow {
    pub keep_messages: Vec<Message>,
    /// `tool_use` blocks whose results sit in the keep window.
    pub tool_use_blocks_to_preserve: Vec<ContentBlock>,
    /// Private reasoning from the messages those `tool_use` blocks came from.
    pub reasoning_blocks_to_preserve: Vec<ContentBlock>,
}

impl KeepWindow {
    fn plain(messages: &[Message], keep_count: usize) -> Self {
        let start = messages.len().saturating_sub(keep_count);
        Self {
            keep_messages: messages[start..].to_vec(),
            ..Self::default()
        }
    }
}

/// Split off the last `keep_count` messages and rescue the `tool_use`
/// blocks their `tool_result`s answer.
///
/// Each matching `tool_use` is looked up in at most `keep_count` messages
/// immediately before the window, newest first. Results without a match in
/// that range are left as they are. Reasoning blocks are collected once per
/// source message.
pub fn keep_messages_with_tool_blocks(messages: &[Message], keep_count: usize) -> KeepWindow {
    if messages.len() <= keep_count {
        return KeepWindow::plain(messages, keep_count);
    }

    let start = messages.len() - keep_count;
    let search_from = start.saturating_sub(keep_count);
    let mut window = KeepWindow::plain(messages, keep_count);
    let mut rescued: HashSet<&str> = HashSet::new();
    let mut reasoning_sources: HashSet<usize> = HashSet::new();

    for msg in &messages[start..] {
        for id in msg.tool_result_ids() {
            if rescued.contains(id) {
                continue;
            }
            let found = (search_from..start)
                .rev()
                .find_map(|i| messages[i].find_tool_use(id).map(|block| (i, block)));
            let Some((source, block)) = found else {
                debug!(tool_use_id = id, "No matching tool_use before keep window");
                continue;
            };
            rescued.insert(id);
            window.tool_use_blocks_to_preserve.push(block.clone());
            if reasoning_sources.insert(source) {
                window
                    .reasoning_blocks_to_preserve
                    .extend(messages[source].reasoning_blocks());
            }
        }
    }

    window
}

// ── Summarization ───────────────────────────────────────────────────

/// Inputs to [`summarize_conversation`].
pub struct CondenseRequest<'a> {
    pub messages: &'a [Message],
    /// The conversation's main model. Always used for token counting.
    pub summarizer: &'a dyn Summarizer,
    /// Dedicated summarization model, used when it can issue completions.
    pub custom_summarizer: Option<&'a dyn Summarizer>,
    pub system_prompt: &'a str,
    pub task_id: &'a str,
    /// Context size before condensing; the result must come in below it.
    pub prev_context_tokens: u64,
    pub is_automatic: bool,
    pub custom_prompt: Option<&'a str>,
    /// Tool calls are exchanged as structured blocks.
    pub uses_native_tool_protocol: bool,
}

/// Outcome of a condensation attempt.
#[derive(Debug, Clone, PartialEq)]
pub struct CondenseResult {
    pub messages: Vec<Message>,
    pub summary: String,
    pub cost: f64,
    pub new_context_tokens: Option<u64>,
    pub condense_id: Option<String>,
    pub error: Option<CondenseError>,
}

impl CondenseResult {
    fn unchanged(messages: &[Message], error: CondenseError, cost: f64) -> Self {
        Self {
            messages: messages.to_vec(),
            summary: String::new(),
            cost,
            new_context_tokens: None,
            condense_id: None,
            error: Some(error),
        }
    }

    pub fn is_ok(&self) -> bool {
        self.error.is_none()
    }
}

fn select_summarizer<'a>(
    main: &'a dyn Summarizer,
    custom: Option<&'a dyn Summarizer>,
) -> Option<&'a dyn Summarizer> {
    match custom {
        Some(custom) if custom.supports_completion() => Some(custom),
        Some(_) => {
            warn!("Custom summarizer cannot issue completions, falling back to main model");
            main.supports_completion().then_some(main)
        }
        None => main.supports_completion().then_some(main),
    }
}

/// Summarize everything before the keep window and hide it behind the
/// summary.
///
/// Emits [`ContextEvent::Condensed`] before any check runs.
pub async fn summarize_conversation(
    request: CondenseRequest<'_>,
    config: &ContextConfig,
    events: &dyn EventHandler,
) -> CondenseResult {
    let CondenseRequest {
        messages,
        summarizer,
        custom_summarizer,
        system_prompt,
        task_id,
        prev_context_tokens,
        is_automatic,
        custom_prompt,
        uses_native_tool_protocol,
    } = request;
    let custom_prompt = custom_prompt.map(str::trim).filter(|p| !p.is_empty());

    events.on_event(&ContextEvent::Condensed {
        task_id,
        is_automatic,
        used_custom_prompt: custom_prompt.is_some(),
        used_custom_summarizer: custom_summarizer.is_some(),
    });

    let keep_count = config.keep_messages;
    let keep_start = messages.len().saturating_sub(keep_count);
    let window = if uses_native_tool_protocol {
        keep_messages_with_tool_blocks(messages, keep_count)
    } else {
        KeepWindow::plain(messages, keep_count)
    };

    // Rescued tool_use blocks move into the summary, so the first kept
    // message (which answers them) is summarized as well.
    let slice_end = if window.tool_use_blocks_to_preserve.is_empty() {
        keep_start
    } else {
        (keep_start + 1).min(messages.len())
    };
    let mut to_summarize = messages_since_last_summary(&messages[..slice_end]);
    if to_summarize
        .last()
        .is_some_and(|m| m.role == MessageRole::Assistant && !m.tool_use_ids().is_empty())
    {
        to_summarize.pop();
    }

    if to_summarize.len() < 2 {
        debug!(task_id, count = to_summarize.len(), "Not enough messages to condense");
        return CondenseResult::unchanged(messages, CondenseError::InsufficientHistory, 0.0);
    }
    if window.keep_messages.iter().any(|m| m.is_summary) {
        debug!(task_id, "Summary already inside keep window");
        return CondenseResult::unchanged(messages, CondenseError::RecentCondenseExists, 0.0);
    }
    let Some(handler) = select_summarizer(summarizer, custom_summarizer) else {
        warn!(task_id, "No summarizer can issue completion requests");
        return CondenseResult::unchanged(messages, CondenseError::HandlerInvalid, 0.0);
    };

    let prompt = custom_prompt.unwrap_or(SUMMARY_PROMPT);
    let mut request_messages: Vec<Message> = to_summarize
        .iter()
        .map(|m| m.without_images().to_api())
        .collect();
    request_messages.push(Message::user(SUMMARY_REQUEST));

    info!(
        task_id,
        summarizing = to_summarize.len(),
        keeping = window.keep_messages.len(),
        model = %handler.describe_model().id,
        "Condensing conversation"
    );

    let mut acc = SummaryAccumulator::default();
    {
        let mut stream = handler.create_completion(prompt, &request_messages);
        while let Some(item) = stream.next().await {
            match item {
                Ok(chunk) => acc = acc.reduce(chunk),
                Err(e) => {
                    warn!(task_id, error = %e, "Summarizer stream failed");
                    return CondenseResult::unchanged(
                        messages,
                        CondenseError::SummarizerFailed(e),
                        acc.cost,
                    );
                }
            }
        }
    }

    let summary = acc.text.trim().to_string();
    if summary.is_empty() {
        warn!(task_id, "Summarizer returned no text");
        return CondenseResult::unchanged(messages, CondenseError::EmptySummary, acc.cost);
    }

    let streamed_b = acc.style_b_blocks();
    let rescued_b: Vec<ContentBlock> = window
        .reasoning_blocks_to_preserve
        .iter()
        .filter(|b| b.is_style_b_reasoning())
        .cloned()
        .collect();
    let mut content = if !streamed_b.is_empty() {
        streamed_b
    } else if !rescued_b.is_empty() {
        rescued_b
    } else {
        vec![ContentBlock::Reasoning {
            text: SYNTHETIC_SUMMARY_REASONING.into(),
        }]
    };

    if summarizer.describe_model().requires_style_b_reasoning
        && !content.iter().any(ContentBlock::is_style_b_reasoning)
    {
        warn!(task_id, "Model requires signed reasoning; summary has none");
        return CondenseResult::unchanged(
            messages,
            CondenseError::ExtendedThinkingIncompatible,
            acc.cost,
        );
    }

    content.push(ContentBlock::text(summary.clone()));
    content.extend(window.tool_use_blocks_to_preserve.iter().cloned());

    let condense_id = generate_condense_id();
    let first_kept_ts = messages
        .get(keep_start)
        .and_then(|m| m.ts)
        .unwrap_or_else(now_millis);
    let summary_message = Message {
        is_summary: true,
        condense_id: Some(condense_id.clone()),
        ..Message::assistant(content).at(first_kept_ts - 1)
    };

    let mut context_blocks = vec![ContentBlock::text(system_prompt)];
    if acc.output_tokens == 0 {
        context_blocks.extend(summary_message.content.to_blocks());
    }
    for msg in &window.keep_messages {
        context_blocks.extend(msg.content.to_blocks());
    }
    let new_context_tokens = acc.output_tokens + summarizer.count_tokens(&context_blocks).await;
    if new_context_tokens >= prev_context_tokens {
        warn!(
            task_id,
            prev = prev_context_tokens,
            new = new_context_tokens,
            "Condensing would not shrink the context"
        );
        return CondenseResult::unchanged(
            messages,
            CondenseError::ContextGrew {
                prev: prev_context_tokens,
                new: new_context_tokens,
            },
            acc.cost,
        );
    }

    let mut new_messages = Vec::with_capacity(messages.len() + 1);
    for (i, msg) in messages[..keep_start].iter().enumerate() {
        if i == 0 || msg.condense_parent.is_some() {
            new_messages.push(msg.clone());
        } else {
            new_messages.push(Message {
                condense_parent: Some(condense_id.clone()),
                ..msg.clone()
            });
        }
    }
    new_messages.push(summary_message);
    new_messages.extend_from_slice(&messages[keep_start..]);

    info!(
        task_id,
        condense_id = %condense_id,
        prev = prev_context_tokens,
        new = new_context_tokens,
        cost = acc.cost,
        "Conversation condensed"
    );

    CondenseResult {
        messages: new_messages,
        summary,
        cost: acc.cost,
        new_context_tokens: Some(new_context_tokens),
        condense_id: Some(condense_id),
        error: None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::context::projection::effective_history;
    use crate::context::summarizer::{ScriptedSummarizer, SummaryChunk};
    use crate::events::{FnEventHandler, NoopHandler};
    use serde_json::json;
    use std::sync::{Arc, Mutex};

    /// Seven messages; the tool call at ts 4 is answered at ts 5.
    fn tool_conversation() -> Vec<Message> {
        vec![
            Message::user("task").at(1),
            Message::assistant("looking").at(2),
            Message::user("go on").at(3),
            Message::assistant(vec![
                ContentBlock::Thinking {
                    thinking: "need the file".into(),
                    signature: "sig-4".into(),
                },
                ContentBlock::text("reading"),
                ContentBlock::tool_use("t1", "read_file", json!({"path": "a.rs"})),
            ])
            .at(4),
            Message::user(vec![ContentBlock::tool_result("t1", "fn main() {}")]).at(5),
            Message::assistant("done reading").at(6),
            Message::user("thanks").at(7),
        ]
    }

    fn plain_conversation(n: i64) -> Vec<Message> {
        (1..=n)
            .map(|ts| {
                if ts % 2 == 1 {
                    Message::user(format!("user {ts}")).at(ts)
                } else {
                    Message::assistant(format!("assistant {ts}")).at(ts)
                }
            })
            .collect()
    }

    fn request<'a>(
        messages: &'a [Message],
        summarizer: &'a dyn Summarizer,
        native: bool,
    ) -> CondenseRequest<'a> {
        CondenseRequest {
            messages,
            summarizer,
            custom_summarizer: None,
            system_prompt: "You are helpful.",
            task_id: "task-1",
            prev_context_tokens: 100_000,
            is_automatic: false,
            custom_prompt: None,
            uses_native_tool_protocol: native,
        }
    }

    fn summarizer() -> ScriptedSummarizer {
        ScriptedSummarizer::with_summary("The user asked for a.rs.", 20, 0.05).with_token_count(500)
    }

    #[test]
    fn keep_window_rescues_tool_use_and_reasoning() {
        let window = keep_messages_with_tool_blocks(&tool_conversation(), 3);
        let kept: Vec<_> = window.keep_messages.iter().filter_map(|m| m.ts).collect();
        assert_eq!(kept, vec![5, 6, 7]);
        assert_eq!(window.tool_use_blocks_to_preserve.len(), 1);
        assert!(matches!(
            &window.tool_use_blocks_to_preserve[0],
            ContentBlock::ToolUse { id, .. } if id == "t1"
        ));
        assert_eq!(window.reasoning_blocks_to_preserve.len(), 1);
    }

    #[test]
    fn keep_window_ignores_results_without_nearby_call() {
        let mut messages = plain_conversation(6);
        messages.push(Message::user(vec![ContentBlock::tool_result("far", "x")]).at(7));
        let window = keep_messages_with_tool_blocks(&messages, 3);
        assert!(window.tool_use_blocks_to_preserve.is_empty());
        assert!(window.reasoning_blocks_to_preserve.is_empty());
    }

    #[test]
    fn keep_window_dedupes_reasoning_per_source() {
        let messages = vec![
            Message::user("task").at(1),
            Message::assistant("a").at(2),
            Message::assistant(vec![
                ContentBlock::Reasoning { text: "plan".into() },
                ContentBlock::tool_use("t1", "ls", json!({})),
                ContentBlock::tool_use("t2", "pwd", json!({})),
            ])
            .at(3),
            Message::user(vec![
                ContentBlock::tool_result("t1", "files"),
                ContentBlock::tool_result("t2", "/"),
            ])
            .at(4),
            Message::assistant("b").at(5),
            Message::user("c").at(6),
        ];
        let window = keep_messages_with_tool_blocks(&messages, 3);
        assert_eq!(window.tool_use_blocks_to_preserve.len(), 2);
        assert_eq!(window.reasoning_blocks_to_preserve.len(), 1);
    }

    #[test]
    fn short_log_is_kept_whole() {
        let window = keep_messages_with_tool_blocks(&plain_conversation(2), 3);
        assert_eq!(window.keep_messages.len(), 2);
    }

    #[tokio::test]
    async fn condense_moves_tool_use_into_summary() {
        let messages = tool_conversation();
        let summarizer = summarizer();
        let result = summarize_conversation(
            request(&messages, &summarizer, true),
            &ContextConfig::default(),
            &NoopHandler,
        )
        .await;

        assert!(result.is_ok(), "{:?}", result.error);
        assert_eq!(result.new_context_tokens, Some(520));
        assert_eq!(result.cost, 0.05);

        let summary = &result.messages[4];
        assert!(summary.is_summary);
        assert_eq!(summary.role, MessageRole::Assistant);
        assert_eq!(summary.ts, Some(4));
        assert_eq!(summary.condense_id, result.condense_id);
        let blocks = summary.content.blocks();
        assert!(matches!(blocks[0], ContentBlock::Thinking { .. }));
        assert_eq!(blocks[1], ContentBlock::text("The user asked for a.rs."));
        assert!(matches!(&blocks[2], ContentBlock::ToolUse { id, .. } if id == "t1"));

        // The kept tool_result is still paired in the model's view.
        let view = effective_history(&result.messages);
        let ts: Vec<_> = view.iter().filter_map(|m| m.ts).collect();
        assert_eq!(ts, vec![1, 4, 5, 6, 7]);
        assert!(view[1].is_summary);
        assert_eq!(view[1].tool_use_ids(), vec!["t1"]);
        assert_eq!(view[2].tool_result_ids(), vec!["t1"]);
    }

    #[tokio::test]
    async fn summarization_input_includes_answering_message() {
        let messages = tool_conversation();
        let summarizer = summarizer();
        summarize_conversation(
            request(&messages, &summarizer, true),
            &ContextConfig::default(),
            &NoopHandler,
        )
        .await;

        let (prompt, sent) = summarizer.last_request().unwrap();
        assert_eq!(prompt, SUMMARY_PROMPT);
        assert_eq!(sent.len(), 6);
        assert_eq!(sent[4].tool_result_ids(), vec!["t1"]);
        assert_eq!(sent[5].content.text(), SUMMARY_REQUEST);
        assert!(sent.iter().all(|m| m.ts.is_none()));
    }

    #[tokio::test]
    async fn text_protocol_drops_trailing_unanswered_call() {
        let messages = tool_conversation();
        let summarizer = summarizer();
        let result = summarize_conversation(
            request(&messages, &summarizer, false),
            &ContextConfig::default(),
            &NoopHandler,
        )
        .await;
        assert!(result.is_ok());

        let (_, sent) = summarizer.last_request().unwrap();
        let sent_texts: Vec<_> = sent.iter().map(|m| m.content.text()).collect();
        assert_eq!(sent_texts, vec!["task", "looking", "go on", SUMMARY_REQUEST]);

        let summary = &result.messages[4];
        assert!(summary.tool_use_ids().is_empty());
        assert!(matches!(
            &summary.content.blocks()[0],
            ContentBlock::Reasoning { text } if text == SYNTHETIC_SUMMARY_REASONING
        ));
    }

    #[tokio::test]
    async fn tags_everything_between_first_and_keep_window() {
        let messages = plain_conversation(8);
        let summarizer = summarizer();
        let result = summarize_conversation(
            request(&messages, &summarizer, true),
            &ContextConfig::default(),
            &NoopHandler,
        )
        .await;
        let id = result.condense_id.clone().unwrap();

        assert_eq!(result.messages.len(), 9);
        assert_eq!(result.messages[0].condense_parent, None);
        for msg in &result.messages[1..5] {
            assert_eq!(msg.condense_parent.as_deref(), Some(id.as_str()));
        }
        assert!(result.messages[5].is_summary);
        for msg in &result.messages[6..] {
            assert_eq!(msg.condense_parent, None);
        }
    }

    #[tokio::test]
    async fn nested_condense_keeps_existing_tags() {
        let messages = plain_conversation(8);
        let summarizer = summarizer();
        let config = ContextConfig::default();
        let first = summarize_conversation(request(&messages, &summarizer, true), &config, &NoopHandler)
            .await;

        let mut extended = first.messages.clone();
        extended.extend((9..=12).map(|ts| Message::user(format!("more {ts}")).at(ts)));
        let second =
            summarize_conversation(request(&extended, &summarizer, true), &config, &NoopHandler)
                .await;
        assert!(second.is_ok(), "{:?}", second.error);

        let first_id = first.condense_id.unwrap();
        let second_id = second.condense_id.unwrap();
        assert_eq!(
            second.messages[1].condense_parent.as_deref(),
            Some(first_id.as_str())
        );
        // The first summary itself is now hidden by the second.
        let old_summary = second
            .messages
            .iter()
            .find(|m| m.condense_id.as_deref() == Some(first_id.as_str()))
            .unwrap();
        assert_eq!(old_summary.condense_parent.as_deref(), Some(second_id.as_str()));

        let view = effective_history(&second.messages);
        assert_eq!(view.iter().filter(|m| m.is_summary).count(), 1);
    }

    #[tokio::test]
    async fn rejects_short_history() {
        let messages = plain_conversation(4);
        let summarizer = summarizer();
        let result = summarize_conversation(
            request(&messages, &summarizer, true),
            &ContextConfig::default(),
            &NoopHandler,
        )
        .await;
        assert_eq!(result.error, Some(CondenseError::InsufficientHistory));
        assert_eq!(result.messages, messages);
        assert_eq!(summarizer.calls(), 0);
    }

    #[tokio::test]
    async fn rejects_summary_in_keep_window() {
        let mut messages = plain_conversation(6);
        messages.insert(
            5,
            Message {
                is_summary: true,
                condense_id: Some("old".into()),
                ..Message::assistant("earlier summary").at(5)
            },
        );
        let summarizer = summarizer();
        let result = summarize_conversation(
            request(&messages, &summarizer, true),
            &ContextConfig::default(),
            &NoopHandler,
        )
        .await;
        assert_eq!(result.error, Some(CondenseError::RecentCondenseExists));
        assert_eq!(result.messages, messages);
    }

    #[tokio::test]
    async fn rejects_when_no_summarizer_can_complete() {
        let messages = plain_conversation(8);
        let main = summarizer().without_completion();
        let custom = summarizer().without_completion();
        let mut req = request(&messages, &main, true);
        req.custom_summarizer = Some(&custom);
        let result = summarize_conversation(req, &ContextConfig::default(), &NoopHandler).await;
        assert_eq!(result.error, Some(CondenseError::HandlerInvalid));
    }

    #[tokio::test]
    async fn prefers_valid_custom_summarizer_and_prompt() {
        let messages = plain_conversation(8);
        let main = summarizer();
        let custom = summarizer();
        let mut req = request(&messages, &main, true);
        req.custom_summarizer = Some(&custom);
        req.custom_prompt = Some("  Be brief.  ");
        let result = summarize_conversation(req, &ContextConfig::default(), &NoopHandler).await;
        assert!(result.is_ok());
        assert_eq!(main.calls(), 0);
        assert_eq!(custom.calls(), 1);
        assert_eq!(custom.last_request().unwrap().0, "Be brief.");
    }

    #[tokio::test]
    async fn falls_back_to_main_when_custom_cannot_complete() {
        let messages = plain_conversation(8);
        let main = summarizer();
        let custom = summarizer().without_completion();
        let mut req = request(&messages, &main, true);
        req.custom_summarizer = Some(&custom);
        let result = summarize_conversation(req, &ContextConfig::default(), &NoopHandler).await;
        assert!(result.is_ok());
        assert_eq!(main.calls(), 1);
    }

    #[tokio::test]
    async fn empty_summary_still_reports_cost() {
        let messages = plain_conversation(8);
        let summarizer = ScriptedSummarizer::with_summary("   ", 3, 0.02);
        let result = summarize_conversation(
            request(&messages, &summarizer, true),
            &ContextConfig::default(),
            &NoopHandler,
        )
        .await;
        assert_eq!(result.error, Some(CondenseError::EmptySummary));
        assert_eq!(result.cost, 0.02);
        assert_eq!(result.messages, messages);
    }

    #[tokio::test]
    async fn stream_failure_is_reported() {
        let messages = plain_conversation(8);
        let summarizer =
            ScriptedSummarizer::failing(vec![SummaryChunk::Text("partial".into())], "timeout");
        let result = summarize_conversation(
            request(&messages, &summarizer, true),
            &ContextConfig::default(),
            &NoopHandler,
        )
        .await;
        assert_eq!(
            result.error,
            Some(CondenseError::SummarizerFailed("timeout".into()))
        );
        assert_eq!(result.messages, messages);
    }

    #[tokio::test]
    async fn rejects_summary_that_does_not_shrink_context() {
        let messages = plain_conversation(8);
        let summarizer = summarizer();
        let mut req = request(&messages, &summarizer, true);
        req.prev_context_tokens = 520;
        let result = summarize_conversation(req, &ContextConfig::default(), &NoopHandler).await;
        assert_eq!(
            result.error,
            Some(CondenseError::ContextGrew { prev: 520, new: 520 })
        );
        assert_eq!(result.cost, 0.05);
        assert_eq!(result.messages, messages);
    }

    #[tokio::test]
    async fn style_b_model_uses_streamed_reasoning() {
        let messages = plain_conversation(8);
        let summarizer = ScriptedSummarizer::new(vec![
            SummaryChunk::ReasoningB {
                thinking: "summarizing".into(),
                signature: "sig".into(),
            },
            SummaryChunk::Text("summary".into()),
        ])
        .with_model("anthropic/claude-sonnet-4", true)
        .with_token_count(10);
        let result = summarize_conversation(
            request(&messages, &summarizer, true),
            &ContextConfig::default(),
            &NoopHandler,
        )
        .await;
        assert!(result.is_ok(), "{:?}", result.error);
        let summary = result.messages.iter().find(|m| m.is_summary).unwrap();
        assert!(matches!(
            &summary.content.blocks()[0],
            ContentBlock::Thinking { signature, .. } if signature == "sig"
        ));
    }

    #[tokio::test]
    async fn style_b_model_falls_back_to_rescued_reasoning() {
        let messages = tool_conversation();
        let summarizer = ScriptedSummarizer::with_summary("summary", 10, 0.0)
            .with_model("anthropic/claude-sonnet-4", true)
            .with_token_count(10);
        let result = summarize_conversation(
            request(&messages, &summarizer, true),
            &ContextConfig::default(),
            &NoopHandler,
        )
        .await;
        assert!(result.is_ok(), "{:?}", result.error);
        let summary = result.messages.iter().find(|m| m.is_summary).unwrap();
        assert!(matches!(
            &summary.content.blocks()[0],
            ContentBlock::Thinking { signature, .. } if signature == "sig-4"
        ));
    }

    #[tokio::test]
    async fn style_b_model_without_reasoning_is_rejected() {
        let messages = plain_conversation(8);
        let summarizer = ScriptedSummarizer::with_summary("summary", 10, 0.01)
            .with_model("anthropic/claude-sonnet-4", true);
        let result = summarize_conversation(
            request(&messages, &summarizer, true),
            &ContextConfig::default(),
            &NoopHandler,
        )
        .await;
        assert_eq!(result.error, Some(CondenseError::ExtendedThinkingIncompatible));
        assert_eq!(result.cost, 0.01);
        assert_eq!(result.messages, messages);
        assert_eq!(result.condense_id, None);
    }

    #[tokio::test]
    async fn event_is_emitted_even_when_rejected() {
        let seen = Arc::new(Mutex::new(Vec::new()));
        let sink = seen.clone();
        let handler = FnEventHandler::new(move |event| {
            if let ContextEvent::Condensed {
                is_automatic,
                used_custom_prompt,
                ..
            } = event
            {
                sink.lock().unwrap().push((*is_automatic, *used_custom_prompt));
            }
        });

        let messages = plain_conversation(2);
        let summarizer = summarizer();
        let mut req = request(&messages, &summarizer, true);
        req.is_automatic = true;
        req.custom_prompt = Some("   ");
        let result = summarize_conversation(req, &ContextConfig::default(), &handler).await;

        assert!(result.error.is_some());
        assert_eq!(*seen.lock().unwrap(), vec![(true, false)]);
    }
}
