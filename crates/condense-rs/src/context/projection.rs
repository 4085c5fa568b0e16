//! Effective-history projection over the tagged conversation log.
//!
//! A message tagged `condense_parent = X` is hidden only while a summary with
//! `condense_id = X` exists somewhere in the log; the same holds for
//! `truncation_parent` and truncation markers. Deleting the summary or marker
//! therefore restores every message it was hiding, with no other bookkeeping.

use crate::{Message, MessageRole, now_millis};
use std::collections::HashSet;

/// Text of the synthetic turn prepended when the slice since the last
/// summary does not start with a user message.
pub const CONTINUATION_PROMPT: &str = "Please continue from the following summary:";

/// Ids of every summary and truncation marker present in the log.
#[derive(Debug, Default)]
pub(crate) struct AnchorIds<'a> {
    pub(crate) summaries: HashSet<&'a str>,
    pub(crate) truncations: HashSet<&'a str>,
}

impl<'a> AnchorIds<'a> {
    pub(crate) fn collect(messages: &'a [Message]) -> Self {
        let mut ids = Self::default();
        for msg in messages {
            if msg.is_summary
                && let Some(ref id) = msg.condense_id
            {
                ids.summaries.insert(id.as_str());
            }
            if msg.is_truncation_marker
                && let Some(ref id) = msg.truncation_id
            {
                ids.truncations.insert(id.as_str());
            }
        }
        ids
    }

    fn hides(&self, msg: &Message) -> bool {
        msg.condense_parent
            .as_deref()
            .is_some_and(|id| self.summaries.contains(id))
            || msg
                .truncation_parent
                .as_deref()
                .is_some_and(|id| self.truncations.contains(id))
    }
}

/// The messages actually sent to the model.
///
/// Drops every message whose `condense_parent` / `truncation_parent` resolves
/// to an existing summary / marker. Orphaned tags do not hide anything.
pub fn effective_history(messages: &[Message]) -> Vec<Message> {
    let ids = AnchorIds::collect(messages);
    messages
        .iter()
        .filter(|msg| !ids.hides(msg))
        .cloned()
        .collect()
}

/// The suffix starting at the most recent summary (inclusive).
///
/// Returns the whole log when it holds no summary. The suffix must open with
/// a user turn, so when it does not, the log's original first message is
/// prepended if it is a user turn, otherwise a synthetic continuation prompt.
pub fn messages_since_last_summary(messages: &[Message]) -> Vec<Message> {
    let Some(last_summary) = messages.iter().rposition(|m| m.is_summary) else {
        return messages.to_vec();
    };

    let since = &messages[last_summary..];
    if since.first().is_some_and(|m| m.role == MessageRole::User) {
        return since.to_vec();
    }

    let lead = match messages.first() {
        Some(first) if first.role == MessageRole::User && !first.is_summary => first.clone(),
        first => {
            let ts = first.and_then(|m| m.ts).unwrap_or_else(now_millis) - 1;
            Message::user(CONTINUATION_PROMPT).at(ts)
        }
    };

    let mut result = Vec::with_capacity(since.len() + 1);
    result.push(lead);
    result.extend_from_slice(since);
    result
}

/// Clear `condense_parent` / `truncation_parent` tags whose summary or marker
/// no longer exists, making those messages visible again.
///
/// Tags that still resolve are left untouched. Applying this twice is the
/// same as applying it once.
pub fn repair_orphans(messages: &[Message]) -> Vec<Message> {
    let ids = AnchorIds::collect(messages);
    messages
        .iter()
        .map(|msg| {
            let orphan_condense = msg
                .condense_parent
                .as_deref()
                .is_some_and(|id| !ids.summaries.contains(id));
            let orphan_truncation = msg
                .truncation_parent
                .as_deref()
                .is_some_and(|id| !ids.truncations.contains(id));
            if !orphan_condense && !orphan_truncation {
                return msg.clone();
            }
            let mut repaired = msg.clone();
            if orphan_condense {
                repaired.condense_parent = None;
            }
            if orphan_truncation {
                repaired.truncation_parent = None;
            }
            repaired
        })
        .collect()
}

/// Number of tags that `repair_orphans` would clear.
pub fn count_orphans(messages: &[Message]) -> usize {
    let ids = AnchorIds::collect(messages);
    messages
        .iter()
        .map(|msg| {
            usize::from(
                msg.condense_parent
                    .as_deref()
                    .is_some_and(|id| !ids.summaries.contains(id)),
            ) + usize::from(
                msg.truncation_parent
                    .as_deref()
                    .is_some_and(|id| !ids.truncations.contains(id)),
            )
        })
        .sum()
}
