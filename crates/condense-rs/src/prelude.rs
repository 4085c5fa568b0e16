//! Convenience re-exports for common `condense-rs` types.
//!
//! ```ignore
//! use condense_rs::prelude::*;
//! ```
//!
//! Covers the data model, the engine entry points, the summarizer trait and
//! its OpenRouter implementation, event handlers, and persistence. Parsing
//! internals (SSE parser, wire messages) stay in their modules.

// ── Core types ──────────────────────────────────────────────────────
pub use crate::{ContentBlock, Message, MessageContent, MessageRole};

// ── Configuration and telemetry ─────────────────────────────────────
pub use crate::config::ContextConfig;
pub use crate::events::{ContextEvent, EventHandler, FnEventHandler, LoggingHandler, NoopHandler};

// ── Context management ──────────────────────────────────────────────
pub use crate::context::{
    CondenseError, CondenseRequest, CondenseResult, ContextUsage, ConversationLog, ManageRequest,
    ManageResult, RewindError, RewindOptions, ScriptedSummarizer, Summarizer, TruncationResult,
    WillManageParams, effective_history, manage_context, messages_since_last_summary,
    repair_orphans, summarize_conversation, truncate_conversation, will_manage_context,
};

// ── Backends and persistence ────────────────────────────────────────
pub use crate::api::{OpenRouterClient, OpenRouterSummarizer};
pub use crate::session::{ConversationStore, FileStore, UiEvent, UiEventKind};
