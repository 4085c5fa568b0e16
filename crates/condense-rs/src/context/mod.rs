//! Context window management over the tagged conversation log.
//!
//! 1. **[`projection`]**: the view sent to the model, the slice since the
//!    last summary, and orphan repair.
//! 2. **[`condense`]**: LLM summarization that hides older turns behind a
//!    summary message while keeping tool calls paired with their results.
//! 3. **[`truncation`]**: deterministic sliding-window fallback.
//! 4. **[`budget`]**: per-turn orchestration between the two, plus token
//!    estimation.
//! 5. **[`rewind`]**: cut the UI and API logs back to an earlier point and
//!    restore whatever the removed summaries and markers were hiding.
//!
//! [`summarizer`] defines the model collaborator used by condensation.

pub mod budget;
pub mod condense;
pub mod ids;
pub mod projection;
pub mod rewind;
pub mod summarizer;
pub mod truncation;

pub use budget::{
    ContextUsage, ManageRequest, ManageResult, WillManageParams, estimate_tokens, manage_context,
    will_manage_context,
};
pub use condense::{CondenseError, CondenseRequest, CondenseResult, summarize_conversation};
pub use projection::{effective_history, messages_since_last_summary, repair_orphans};
pub use rewind::{ConversationLog, RewindError, RewindOptions, RewindOutcome};
pub use summarizer::{ScriptedSummarizer, Summarizer, SummaryAccumulator, SummaryChunk};
pub use truncation::{TruncationResult, truncate_conversation};
