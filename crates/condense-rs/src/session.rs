//! Conversation persistence: the UI event log and the API message log.
//!
//! A task directory holds two JSON files:
//!
//! ```text
//! <task_dir>/
//!   ui_messages.json                 # Vec<UiEvent>
//!   api_conversation_history.json    # Vec<Message>, tags included
//! ```
//!
//! Both are replaced wholesale on every save. Writes go to a temp file that
//! is renamed into place, so a crash never leaves a half-written log.

use crate::Message;
use crate::context::budget::ManageResult;
use crate::context::condense::CondenseResult;
use crate::context::truncation::TruncationResult;
use serde::{Deserialize, Serialize};
use serde::de::DeserializeOwned;
use std::path::{Path, PathBuf};
use tracing::warn;

pub const UI_MESSAGES_FILE: &str = "ui_messages.json";
pub const API_HISTORY_FILE: &str = "api_conversation_history.json";

/// One entry in the UI-facing event log.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct UiEvent {
    pub ts: i64,
    #[serde(flatten)]
    pub kind: UiEventKind,
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum UiEventKind {
    /// Ordinary chat text shown to the user.
    Say { text: String },
    /// "Context condensed here" marker.
    ContextCondensed {
        condense_id: String,
        summary: String,
        cost: f64,
        prev_context_tokens: u64,
        new_context_tokens: u64,
    },
    /// "Context truncated here" marker.
    SlidingWindowTruncation {
        truncation_id: String,
        messages_removed: usize,
        prev_context_tokens: u64,
    },
}

impl UiEvent {
    pub fn say(ts: i64, text: impl Into<String>) -> Self {
        Self {
            ts,
            kind: UiEventKind::Say { text: text.into() },
        }
    }

    /// The marker event for a successful condensation; `None` on failure.
    pub fn from_condense(ts: i64, result: &CondenseResult, prev_context_tokens: u64) -> Option<Self> {
        if result.error.is_some() {
            return None;
        }
        Some(Self {
            ts,
            kind: UiEventKind::ContextCondensed {
                condense_id: result.condense_id.clone()?,
                summary: result.summary.clone(),
                cost: result.cost,
                prev_context_tokens,
                new_context_tokens: result.new_context_tokens.unwrap_or_default(),
            },
        })
    }

    /// The marker event for a truncation that hid something.
    pub fn from_truncation(
        ts: i64,
        result: &TruncationResult,
        prev_context_tokens: u64,
    ) -> Option<Self> {
        Some(Self {
            ts,
            kind: UiEventKind::SlidingWindowTruncation {
                truncation_id: result.truncation_id.clone()?,
                messages_removed: result.messages_removed,
                prev_context_tokens,
            },
        })
    }

    /// The marker event for whatever an orchestration pass did, if anything.
    pub fn from_manage(ts: i64, result: &ManageResult) -> Option<Self> {
        if let Some(ref condense_id) = result.condense_id {
            return Some(Self {
                ts,
                kind: UiEventKind::ContextCondensed {
                    condense_id: condense_id.clone(),
                    summary: result.summary.clone(),
                    cost: result.cost,
                    prev_context_tokens: result.prev_context_tokens,
                    new_context_tokens: result.new_context_tokens.unwrap_or_default(),
                },
            });
        }
        Some(Self {
            ts,
            kind: UiEventKind::SlidingWindowTruncation {
                truncation_id: result.truncation_id.clone()?,
                messages_removed: result.messages_removed,
                prev_context_tokens: result.prev_context_tokens,
            },
        })
    }

    /// Id of the summary this event marks.
    pub fn condense_id(&self) -> Option<&str> {
        match &self.kind {
            UiEventKind::ContextCondensed { condense_id, .. } => Some(condense_id),
            _ => None,
        }
    }

    /// Id of the truncation marker this event marks.
    pub fn truncation_id(&self) -> Option<&str> {
        match &self.kind {
            UiEventKind::SlidingWindowTruncation { truncation_id, .. } => Some(truncation_id),
            _ => None,
        }
    }
}

/// Where rewinds write the two logs.
pub trait ConversationStore {
    fn replace_ui_event_log(&self, events: &[UiEvent]) -> Result<(), String>;
    fn replace_api_message_log(&self, messages: &[Message]) -> Result<(), String>;
}

/// JSON files in a task directory.
#[derive(Debug, Clone)]
pub struct FileStore {
    dir: PathBuf,
}

impl FileStore {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    pub fn ui_events_path(&self) -> PathBuf {
        self.dir.join(UI_MESSAGES_FILE)
    }

    pub fn api_messages_path(&self) -> PathBuf {
        self.dir.join(API_HISTORY_FILE)
    }

    /// Load the UI event log. A missing file is an empty log.
    pub fn load_ui_events(&self) -> Result<Vec<UiEvent>, String> {
        load_json(&self.ui_events_path())
    }

    /// Load the API message log. A missing file is an empty log.
    pub fn load_api_messages(&self) -> Result<Vec<Message>, String> {
        load_json(&self.api_messages_path())
    }

    /// Atomic write: serialize to a temp file, then rename into place.
    fn save_json<T: Serialize + ?Sized>(&self, file_name: &str, value: &T) -> Result<(), String> {
        std::fs::create_dir_all(&self.dir)
            .map_err(|e| format!("Failed to create task dir: {e}"))?;

        let final_path = self.dir.join(file_name);
        let tmp_path = self.dir.join(format!(".{file_name}.tmp"));

        let json = serde_json::to_string_pretty(value)
            .map_err(|e| format!("Failed to serialize {file_name}: {e}"))?;
        std::fs::write(&tmp_path, json)
            .map_err(|e| format!("Failed to write temp {file_name}: {e}"))?;
        std::fs::rename(&tmp_path, &final_path)
            .map_err(|e| format!("Failed to rename {file_name}: {e}"))?;

        Ok(())
    }
}

impl ConversationStore for FileStore {
    fn replace_ui_event_log(&self, events: &[UiEvent]) -> Result<(), String> {
        self.save_json(UI_MESSAGES_FILE, events)
    }

    fn replace_api_message_log(&self, messages: &[Message]) -> Result<(), String> {
        self.save_json(API_HISTORY_FILE, messages)
    }
}

fn load_json<T: DeserializeOwned>(path: &Path) -> Result<Vec<T>, String> {
    if !path.exists() {
        return Ok(Vec::new());
    }
    let json = std::fs::read_to_string(path)
        .map_err(|e| format!("Failed to read {}: {e}", path.display()))?;
    serde_json::from_str(&json).map_err(|e| {
        warn!(path = %path.display(), error = %e, "Malformed conversation log");
        format!("Failed to parse {}: {e}", path.display())
    })
}
