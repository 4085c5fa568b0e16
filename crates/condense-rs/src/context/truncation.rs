//! Sliding-window truncation: the no-LLM fallback.
//!
//! Hides the oldest visible messages behind a marker instead of deleting
//! them. The first visible message (the original task) is never hidden, and
//! an even number of messages is hidden so user/assistant alternation
//! survives.

use crate::context::ids::generate_truncation_id;
use crate::events::{ContextEvent, EventHandler};
use crate::{Message, now_millis};
use tracing::{debug, info};

/// Outcome of a truncation pass.
#[derive(Debug, Clone, PartialEq)]
pub struct TruncationResult {
    pub messages: Vec<Message>,
    /// Id of the inserted marker; `None` when nothing was hidden.
    pub truncation_id: Option<String>,
    pub messages_removed: usize,
}

/// Text of the marker inserted in place of `hidden` messages.
pub fn marker_text(hidden: usize) -> String {
    format!("[Sliding window truncation: {hidden} messages hidden to reduce context]")
}

/// Hide `fraction` of the visible history, excluding the first visible
/// message, rounded down to an even count.
///
/// `fraction` is clamped to `0.0..=1.0`.
///
/// Always emits [`ContextEvent::SlidingWindowTruncation`]. Returns the log
/// unchanged with `messages_removed == 0` when the count rounds to zero.
pub fn truncate_conversation(
    messages: &[Message],
    fraction: f64,
    task_id: &str,
    events: &dyn EventHandler,
) -> TruncationResult {
    events.on_event(&ContextEvent::SlidingWindowTruncation { task_id });

    let visible: Vec<usize> = messages
        .iter()
        .enumerate()
        .filter(|(_, m)| m.truncation_parent.is_none() && !m.is_truncation_marker)
        .map(|(i, _)| i)
        .collect();

    let candidates = visible.len().saturating_sub(1);
    let raw = (candidates as f64 * fraction.clamp(0.0, 1.0)).floor() as usize;
    let raw = raw.min(candidates);
    let to_remove = raw - raw % 2;
    if to_remove == 0 {
        debug!(task_id, visible = visible.len(), "Nothing to truncate");
        return TruncationResult {
            messages: messages.to_vec(),
            truncation_id: None,
            messages_removed: 0,
        };
    }

    let truncation_id = generate_truncation_id();
    let hidden = &visible[1..=to_remove];
    let mut result: Vec<Message> = messages.to_vec();
    for &i in hidden {
        result[i].truncation_parent = Some(truncation_id.clone());
    }

    let first_kept = visible.get(to_remove + 1).copied();
    let marker_ts = first_kept
        .and_then(|i| messages[i].ts)
        .unwrap_or_else(now_millis)
        - 1;
    let marker = Message {
        is_truncation_marker: true,
        truncation_id: Some(truncation_id.clone()),
        ..Message::user(marker_text(to_remove)).at(marker_ts)
    };
    result.insert(first_kept.unwrap_or(result.len()), marker);

    info!(
        task_id,
        truncation_id = %truncation_id,
        hidden = to_remove,
        visible = visible.len(),
        "Sliding window truncation applied"
    );

    TruncationResult {
        messages: result,
        truncation_id: Some(truncation_id),
        messages_removed: to_remove,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::MessageRole;
    use crate::context::projection::effective_history;
    use crate::events::{FnEventHandler, NoopHandler};
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn conversation(n: i64) -> Vec<Message> {
        (1..=n)
            .map(|ts| {
                if ts % 2 == 1 {
                    Message::user(format!("u{ts}")).at(ts * 10)
                } else {
                    Message::assistant(format!("a{ts}")).at(ts * 10)
                }
            })
            .collect()
    }

    #[test]
    fn hides_half_of_eleven_visible() {
        let messages = conversation(11);
        let result = truncate_conversation(&messages, 0.5, "t", &NoopHandler);

        assert_eq!(result.messages_removed, 4);
        assert_eq!(result.messages.len(), 12);
        let id = result.truncation_id.clone().unwrap();
        for msg in &result.messages[1..5] {
            assert_eq!(msg.truncation_parent.as_deref(), Some(id.as_str()));
        }

        let marker = &result.messages[5];
        assert!(marker.is_truncation_marker);
        assert_eq!(marker.role, MessageRole::User);
        assert_eq!(marker.ts, Some(59));
        assert_eq!(
            marker.content.text(),
            "[Sliding window truncation: 4 messages hidden to reduce context]"
        );

        let view = effective_history(&result.messages);
        assert_eq!(view.len(), 8);
        assert_eq!(view[0].ts, Some(10));
        assert!(view[1].is_truncation_marker);
        assert_eq!(view[2].ts, Some(60));
    }

    #[test]
    fn five_visible_hides_two() {
        let result = truncate_conversation(&conversation(5), 0.5, "t", &NoopHandler);
        assert_eq!(result.messages_removed, 2);
        let tagged: Vec<_> = result
            .messages
            .iter()
            .map(|m| m.truncation_parent.is_some())
            .collect();
        assert_eq!(tagged, vec![false, true, true, false, false, false]);
        assert!(result.messages[3].is_truncation_marker);
        assert_eq!(result.messages[4].ts, Some(40));
    }

    #[test]
    fn rounds_down_to_even() {
        let result = truncate_conversation(&conversation(8), 0.5, "t", &NoopHandler);
        // floor(7 * 0.5) = 3, rounded down to 2.
        assert_eq!(result.messages_removed, 2);
    }

    #[test]
    fn tiny_history_is_unchanged() {
        let messages = conversation(2);
        let result = truncate_conversation(&messages, 0.5, "t", &NoopHandler);
        assert_eq!(result.messages_removed, 0);
        assert_eq!(result.truncation_id, None);
        assert_eq!(result.messages, messages);
    }

    #[test]
    fn second_pass_ignores_hidden_messages() {
        let first = truncate_conversation(&conversation(11), 0.5, "t", &NoopHandler);
        let second = truncate_conversation(&first.messages, 0.5, "t", &NoopHandler);

        // Visible after the first pass: 7 originals (marker excluded).
        assert_eq!(second.messages_removed, 2);
        assert_eq!(second.messages.iter().filter(|m| m.is_truncation_marker).count(), 2);
        let view = effective_history(&second.messages);
        assert_eq!(view[0].ts, Some(10));
        assert_eq!(view.len(), 7);
    }

    #[test]
    fn full_fraction_marker_goes_last() {
        let messages = conversation(5);
        let result = truncate_conversation(&messages, 1.0, "t", &NoopHandler);
        assert_eq!(result.messages_removed, 4);
        assert!(result.messages.last().unwrap().is_truncation_marker);
    }

    #[test]
    fn out_of_range_fraction_is_clamped() {
        let messages = conversation(5);
        let result = truncate_conversation(&messages, 2.0, "t", &NoopHandler);
        assert_eq!(result.messages_removed, 4);
        assert!(result.messages.last().unwrap().is_truncation_marker);

        let negative = truncate_conversation(&messages, -0.5, "t", &NoopHandler);
        assert_eq!(negative.messages_removed, 0);
        assert_eq!(negative.messages, messages);
    }

    #[test]
    fn emits_event_on_every_call() {
        let count = AtomicUsize::new(0);
        let handler = FnEventHandler::new(|event| {
            if matches!(event, ContextEvent::SlidingWindowTruncation { .. }) {
                count.fetch_add(1, Ordering::Relaxed);
            }
        });
        truncate_conversation(&conversation(2), 0.5, "t", &handler);
        truncate_conversation(&conversation(9), 0.5, "t", &handler);
        assert_eq!(count.load(Ordering::Relaxed), 2);
    }
}
