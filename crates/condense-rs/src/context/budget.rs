//! Context budget orchestration: decide between condensing, truncating, or
//! leaving the log alone.
//!
//! Each turn the caller reports the current token total. [`manage_context`]
//! adds the newest message, compares the result to the usable window
//! (`window * (1 - buffer) - reserved`) and to the condense threshold, and
//! then:
//!
//! 1. tries an automatic condensation when enabled and either limit is hit;
//! 2. falls back to sliding-window truncation when the usable window is
//!    still exceeded;
//! 3. otherwise returns the log unchanged.
//!
//! [`will_manage_context`] runs the same math without side effects, for UI
//! indicators.
//!
//! # Example
//!
//! ```ignore
//! let result = manage_context(
//!     ManageRequest::new(&messages, &summarizer, 150_000, 200_000)
//!         .with_auto_condense(true, 75.0)
//!         .with_task_id("task-42"),
//!     &ContextConfig::default(),
//!     &LoggingHandler,
//! )
//! .await;
//! if let Some(err) = &result.error {
//!     warn!("condense failed: {err}");
//! }
//! ```

use crate::config::{ContextConfig, INHERIT_THRESHOLD};
use crate::context::condense::{CondenseError, CondenseRequest, summarize_conversation};
use crate::context::summarizer::Summarizer;
use crate::context::truncation::truncate_conversation;
use crate::events::EventHandler;
use crate::{ContentBlock, Message};
use std::collections::HashMap;
use tracing::{debug, info, warn};

/// Fixed token cost of one image block in local estimates.
pub const IMAGE_TOKEN_ESTIMATE: u64 = 1_000;

/// Estimate tokens for a list of blocks from their character counts.
///
/// Text, tool input JSON, tool results and reasoning are divided by
/// `chars_per_token` and rounded up. Images count [`IMAGE_TOKEN_ESTIMATE`].
pub fn estimate_tokens(blocks: &[ContentBlock], chars_per_token: f64) -> u64 {
    let mut chars = 0usize;
    let mut images = 0u64;
    for block in blocks {
        match block {
            ContentBlock::Text { text } | ContentBlock::Reasoning { text } => chars += text.len(),
            ContentBlock::Image { .. } => images += 1,
            ContentBlock::ToolUse { name, input, .. } => {
                chars += name.len() + input.to_string().len();
            }
            ContentBlock::ToolResult { content, .. } => chars += content.len(),
            ContentBlock::Thinking { thinking, .. } => chars += thinking.len(),
            ContentBlock::RedactedThinking { data } => chars += data.len(),
        }
    }
    let text_tokens = if chars == 0 || chars_per_token <= 0.0 {
        0
    } else {
        (chars as f64 / chars_per_token).ceil() as u64
    };
    text_tokens + images * IMAGE_TOKEN_ESTIMATE
}

/// A snapshot of context usage for logging and display.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ContextUsage {
    pub tokens: u64,
    pub context_window: u64,
    /// Usage as a percentage of the window (0.0 to 100.0+).
    pub percent: f64,
}

impl ContextUsage {
    pub fn new(tokens: u64, context_window: u64) -> Self {
        Self {
            tokens,
            context_window,
            percent: context_percent(tokens, context_window),
        }
    }

    /// Format as a short log-friendly string.
    pub fn to_log_string(&self) -> String {
        format!(
            "context: ~{} tokens ({:.0}% of {})",
            self.tokens, self.percent, self.context_window,
        )
    }
}

fn context_percent(tokens: u64, context_window: u64) -> f64 {
    if context_window == 0 {
        return 100.0;
    }
    100.0 * tokens as f64 / context_window as f64
}

/// Tokens usable before the buffer and output reserve.
///
/// May be negative for tiny windows, in which case every non-empty context
/// is over budget.
pub fn allowed_tokens(context_window: u64, reserved: u64, config: &ContextConfig) -> f64 {
    context_window as f64 * (1.0 - config.buffer_fraction) - reserved as f64
}

/// The condense threshold in effect for `profile_id`.
///
/// A profile override wins unless it is the inherit sentinel or falls
/// outside the configured range.
pub fn effective_threshold(
    global_percent: f64,
    profile_thresholds: &HashMap<String, f64>,
    profile_id: Option<&str>,
    config: &ContextConfig,
) -> f64 {
    let Some(&value) = profile_id.and_then(|id| profile_thresholds.get(id)) else {
        return global_percent;
    };
    if value == INHERIT_THRESHOLD {
        return global_percent;
    }
    if (config.min_condense_threshold..=config.max_condense_threshold).contains(&value) {
        value
    } else {
        warn!(
            profile = profile_id.unwrap_or_default(),
            threshold = value,
            "Invalid profile condense threshold, using global setting"
        );
        global_percent
    }
}

/// Inputs to [`will_manage_context`].
#[derive(Debug, Clone, Default)]
pub struct WillManageParams<'a> {
    pub total_tokens: u64,
    pub last_message_tokens: u64,
    pub context_window: u64,
    pub max_tokens: Option<u64>,
    pub auto_condense_enabled: bool,
    pub auto_condense_percent: f64,
    pub profile_thresholds: Option<&'a HashMap<String, f64>>,
    pub current_profile_id: Option<&'a str>,
}

/// Whether [`manage_context`] would condense or truncate with these numbers.
pub fn will_manage_context(params: &WillManageParams<'_>, config: &ContextConfig) -> bool {
    let reserved = params.max_tokens.unwrap_or(config.default_reserved_tokens);
    let prev = params.total_tokens + params.last_message_tokens;
    let over_budget = prev as f64 > allowed_tokens(params.context_window, reserved, config);
    if over_budget {
        return true;
    }
    if !params.auto_condense_enabled {
        return false;
    }
    let empty = HashMap::new();
    let threshold = effective_threshold(
        params.auto_condense_percent,
        params.profile_thresholds.unwrap_or(&empty),
        params.current_profile_id,
        config,
    );
    context_percent(prev, params.context_window) >= threshold
}

// ── Orchestration ───────────────────────────────────────────────────

/// Inputs to [`manage_context`].
pub struct ManageRequest<'a> {
    pub messages: &'a [Message],
    /// Tokens used by everything except the newest message.
    pub total_tokens: u64,
    pub context_window: u64,
    pub max_tokens: Option<u64>,
    pub summarizer: &'a dyn Summarizer,
    pub custom_summarizer: Option<&'a dyn Summarizer>,
    pub auto_condense_enabled: bool,
    pub auto_condense_percent: f64,
    pub system_prompt: &'a str,
    pub task_id: &'a str,
    pub custom_prompt: Option<&'a str>,
    pub profile_thresholds: HashMap<String, f64>,
    pub current_profile_id: Option<&'a str>,
    pub uses_native_tool_protocol: bool,
}

impl<'a> ManageRequest<'a> {
    /// A request with auto-condense on at 100%, no profile overrides, and
    /// the text tool protocol.
    pub fn new(
        messages: &'a [Message],
        summarizer: &'a dyn Summarizer,
        total_tokens: u64,
        context_window: u64,
    ) -> Self {
        Self {
            messages,
            total_tokens,
            context_window,
            max_tokens: None,
            summarizer,
            custom_summarizer: None,
            auto_condense_enabled: true,
            auto_condense_percent: 100.0,
            system_prompt: "",
            task_id: "",
            custom_prompt: None,
            profile_thresholds: HashMap::new(),
            current_profile_id: None,
            uses_native_tool_protocol: false,
        }
    }

    pub fn with_max_tokens(mut self, max_tokens: u64) -> Self {
        self.max_tokens = Some(max_tokens);
        self
    }

    pub fn with_auto_condense(mut self, enabled: bool, percent: f64) -> Self {
        self.auto_condense_enabled = enabled;
        self.auto_condense_percent = percent;
        self
    }

    pub fn with_custom_summarizer(mut self, summarizer: &'a dyn Summarizer) -> Self {
        self.custom_summarizer = Some(summarizer);
        self
    }

    pub fn with_system_prompt(mut self, prompt: &'a str) -> Self {
        self.system_prompt = prompt;
        self
    }

    pub fn with_task_id(mut self, task_id: &'a str) -> Self {
        self.task_id = task_id;
        self
    }

    pub fn with_custom_prompt(mut self, prompt: &'a str) -> Self {
        self.custom_prompt = Some(prompt);
        self
    }

    /// Per-profile thresholds and the active profile.
    pub fn with_profile(mut self, thresholds: HashMap<String, f64>, current: &'a str) -> Self {
        self.profile_thresholds = thresholds;
        self.current_profile_id = Some(current);
        self
    }

    pub fn with_native_tool_protocol(mut self, native: bool) -> Self {
        self.uses_native_tool_protocol = native;
        self
    }
}

/// Outcome of one orchestration pass.
#[derive(Debug, Clone, PartialEq)]
pub struct ManageResult {
    pub messages: Vec<Message>,
    /// Summary text when condensation succeeded, else empty.
    pub summary: String,
    pub cost: f64,
    pub prev_context_tokens: u64,
    /// Token count after condensing or truncating; `None` when unchanged.
    pub new_context_tokens: Option<u64>,
    /// Condensation failure, kept even when truncation ran afterwards.
    pub error: Option<CondenseError>,
    pub condense_id: Option<String>,
    pub truncation_id: Option<String>,
    pub messages_removed: usize,
}

/// Run one context-management pass over the log.
pub async fn manage_context(
    request: ManageRequest<'_>,
    config: &ContextConfig,
    events: &dyn EventHandler,
) -> ManageResult {
    let ManageRequest {
        messages,
        total_tokens,
        context_window,
        max_tokens,
        summarizer,
        custom_summarizer,
        auto_condense_enabled,
        auto_condense_percent,
        system_prompt,
        task_id,
        custom_prompt,
        profile_thresholds,
        current_profile_id,
        uses_native_tool_protocol,
    } = request;

    let reserved = max_tokens.unwrap_or(config.default_reserved_tokens);
    let last_blocks = messages
        .last()
        .map(|m| m.content.to_blocks())
        .unwrap_or_default();
    let last_message_tokens = if last_blocks.is_empty() {
        0
    } else {
        summarizer.count_tokens(&last_blocks).await
    };
    let prev_context_tokens = total_tokens + last_message_tokens;
    let allowed = allowed_tokens(context_window, reserved, config);
    let over_budget = prev_context_tokens as f64 > allowed;
    let usage = ContextUsage::new(prev_context_tokens, context_window);

    debug!(task_id, allowed, "{}", usage.to_log_string());

    let mut error = None;
    let mut cost = 0.0;

    if auto_condense_enabled {
        let threshold = effective_threshold(
            auto_condense_percent,
            &profile_thresholds,
            current_profile_id,
            config,
        );
        if usage.percent >= threshold || over_budget {
            info!(
                task_id,
                threshold,
                over_budget,
                "{}, condensing",
                usage.to_log_string()
            );
            let result = summarize_conversation(
                CondenseRequest {
                    messages,
                    summarizer,
                    custom_summarizer,
                    system_prompt,
                    task_id,
                    prev_context_tokens,
                    is_automatic: true,
                    custom_prompt,
                    uses_native_tool_protocol,
                },
                config,
                events,
            )
            .await;
            if result.error.is_none() {
                return ManageResult {
                    messages: result.messages,
                    summary: result.summary,
                    cost: result.cost,
                    prev_context_tokens,
                    new_context_tokens: result.new_context_tokens,
                    error: None,
                    condense_id: result.condense_id,
                    truncation_id: None,
                    messages_removed: 0,
                };
            }
            warn!(
                task_id,
                error = ?result.error,
                "Automatic condense failed"
            );
            error = result.error;
            cost = result.cost;
        }
    }

    if over_budget {
        info!(task_id, allowed, "{}, truncating", usage.to_log_string());
        let truncated =
            truncate_conversation(messages, config.truncation_fraction, task_id, events);
        let visible_blocks: Vec<ContentBlock> = truncated
            .messages
            .iter()
            .filter(|m| m.truncation_parent.is_none() && !m.is_truncation_marker)
            .flat_map(|m| m.content.to_blocks())
            .collect();
        let new_context_tokens = summarizer.count_tokens(&visible_blocks).await;
        return ManageResult {
            messages: truncated.messages,
            summary: String::new(),
            cost,
            prev_context_tokens,
            new_context_tokens: Some(new_context_tokens),
            error,
            condense_id: None,
            truncation_id: truncated.truncation_id,
            messages_removed: truncated.messages_removed,
        };
    }

    ManageResult {
        messages: messages.to_vec(),
        summary: String::new(),
        cost,
        prev_context_tokens,
        new_context_tokens: None,
        error,
        condense_id: None,
        truncation_id: None,
        messages_removed: 0,
    }
}
