//! Rewind: cut both logs back to a point in the UI timeline.
//!
//! Condense and truncation events in the UI log carry the same ids as the
//! summaries and markers in the API log. Rewinding past such an event
//! deletes the matching summary or marker, and orphan repair then restores
//! the messages it was hiding.

use crate::context::projection::repair_orphans;
use crate::session::{ConversationStore, FileStore, UiEvent};
use crate::{Message, now_millis};
use std::collections::HashSet;
use tracing::{debug, info};

#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum RewindError {
    #[error("no UI event at timestamp {0}")]
    TimestampNotFound(i64),
    #[error("failed to persist rewound logs: {0}")]
    Persistence(String),
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RewindOptions {
    /// Keep the target UI event itself.
    pub include_target: bool,
    /// Leave stale `condense_parent` / `truncation_parent` tags in place.
    pub skip_cleanup: bool,
}

/// What a rewind removed.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RewindOutcome {
    pub ui_events_removed: usize,
    pub api_messages_removed: usize,
    pub removed_condense_ids: Vec<String>,
    pub removed_truncation_ids: Vec<String>,
    /// Whether the API log was rewritten.
    pub api_log_changed: bool,
}

/// The two parallel logs of one conversation.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ConversationLog {
    pub ui_events: Vec<UiEvent>,
    pub api_messages: Vec<Message>,
}

impl ConversationLog {
    pub fn new(ui_events: Vec<UiEvent>, api_messages: Vec<Message>) -> Self {
        Self {
            ui_events,
            api_messages,
        }
    }

    /// Load both logs from a task directory.
    pub fn load(store: &FileStore) -> Result<Self, String> {
        Ok(Self::new(store.load_ui_events()?, store.load_api_messages()?))
    }

    /// Rewind to the UI event at `ts`.
    ///
    /// The target event is removed too unless `include_target` is set. API
    /// messages at or after `ts` are always removed.
    pub fn rewind_to_timestamp(
        &mut self,
        ts: i64,
        options: RewindOptions,
        store: &dyn ConversationStore,
    ) -> Result<RewindOutcome, RewindError> {
        let position = self
            .ui_events
            .iter()
            .position(|e| e.ts == ts)
            .ok_or(RewindError::TimestampNotFound(ts))?;
        let cutoff_index = if options.include_target {
            position + 1
        } else {
            position
        };
        self.rewind(cutoff_index, ts, options, store)
    }

    /// Rewind to the UI event at `index`.
    ///
    /// An index past the end uses the current time as the API cutoff.
    pub fn rewind_to_index(
        &mut self,
        index: usize,
        options: RewindOptions,
        store: &dyn ConversationStore,
    ) -> Result<RewindOutcome, RewindError> {
        let cutoff_ts = self
            .ui_events
            .get(index)
            .map(|e| e.ts)
            .unwrap_or_else(now_millis);
        let cutoff_index = if options.include_target {
            index.saturating_add(1)
        } else {
            index
        };
        self.rewind(cutoff_index.min(self.ui_events.len()), cutoff_ts, options, store)
    }

    fn rewind(
        &mut self,
        cutoff_index: usize,
        cutoff_ts: i64,
        options: RewindOptions,
        store: &dyn ConversationStore,
    ) -> Result<RewindOutcome, RewindError> {
        let removed_events = &self.ui_events[cutoff_index..];
        let condense_ids: HashSet<&str> =
            removed_events.iter().filter_map(UiEvent::condense_id).collect();
        let truncation_ids: HashSet<&str> =
            removed_events.iter().filter_map(UiEvent::truncation_id).collect();

        let kept: Vec<Message> = self
            .api_messages
            .iter()
            .filter(|m| m.ts.is_none_or(|ts| ts < cutoff_ts))
            .filter(|m| {
                let dead_summary = m.is_summary
                    && m.condense_id
                        .as_deref()
                        .is_some_and(|id| condense_ids.contains(id));
                let dead_marker = m.is_truncation_marker
                    && m.truncation_id
                        .as_deref()
                        .is_some_and(|id| truncation_ids.contains(id));
                !dead_summary && !dead_marker
            })
            .cloned()
            .collect();
        let api_messages = if options.skip_cleanup {
            kept
        } else {
            repair_orphans(&kept)
        };

        let ui_events = self.ui_events[..cutoff_index].to_vec();
        let api_log_changed = api_messages != self.api_messages;

        // API log first, so a failed write leaves the UI log on disk untouched.
        if api_log_changed {
            store
                .replace_api_message_log(&api_messages)
                .map_err(RewindError::Persistence)?;
        } else {
            debug!("API log unchanged by rewind, skipping write");
        }
        store
            .replace_ui_event_log(&ui_events)
            .map_err(RewindError::Persistence)?;

        let mut removed_condense_ids: Vec<String> =
            condense_ids.into_iter().map(String::from).collect();
        let mut removed_truncation_ids: Vec<String> =
            truncation_ids.into_iter().map(String::from).collect();
        removed_condense_ids.sort();
        removed_truncation_ids.sort();

        let outcome = RewindOutcome {
            ui_events_removed: self.ui_events.len() - ui_events.len(),
            api_messages_removed: self.api_messages.len() - api_messages.len(),
            removed_condense_ids,
            removed_truncation_ids,
            api_log_changed,
        };
        info!(
            cutoff_ts,
            ui_removed = outcome.ui_events_removed,
            api_removed = outcome.api_messages_removed,
            condense_ids = ?outcome.removed_condense_ids,
            truncation_ids = ?outcome.removed_truncation_ids,
            api_log_changed,
            "Rewound conversation"
        );

        self.ui_events = ui_events;
        self.api_messages = api_messages;
        Ok(outcome)
    }
}
