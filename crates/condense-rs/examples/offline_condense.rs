//! Condense, truncate and rewind a conversation without a network call.
//!
//! Uses [`ScriptedSummarizer`] in place of a model, so the whole lifecycle
//! runs offline. Swap in `OpenRouterSummarizer` to summarize for real.
//!
//! # Usage
//!
//! ```bash
//! cargo run --example offline_condense
//! ```

use condense_rs::prelude::*;

#[tokio::main]
async fn main() -> Result<(), String> {
    let config = ContextConfig::default();
    let summarizer = ScriptedSummarizer::with_summary(
        "The user asked for a tour of the repository; the layout was listed.",
        60,
        0.003,
    );
    let handler = FnEventHandler::new(|event| println!("event: {event:?}"));

    // 1. A conversation long enough to condense.
    let mut messages: Vec<Message> = (0..12)
        .map(|i| {
            let ts = 1_000 + i;
            if i % 2 == 0 {
                Message::user(format!("question {i}")).at(ts)
            } else {
                Message::assistant(format!("answer {i}")).at(ts)
            }
        })
        .collect();

    // 2. At 80% of the window with a 70% threshold, the pass condenses.
    let result = manage_context(
        ManageRequest::new(&messages, &summarizer, 160_000, 200_000)
            .with_auto_condense(true, 70.0)
            .with_task_id("demo"),
        &config,
        &handler,
    )
    .await;
    if let Some(ref err) = result.error {
        return Err(format!("condense failed: {err}"));
    }
    println!(
        "condensed {} -> {} tokens for ${:.4}",
        result.prev_context_tokens,
        result.new_context_tokens.unwrap_or_default(),
        result.cost,
    );
    let mut ui_events: Vec<UiEvent> = messages
        .iter()
        .filter_map(|m| m.ts.map(|ts| UiEvent::say(ts, m.content.text())))
        .collect();
    ui_events.extend(UiEvent::from_manage(2_000, &result));
    messages = result.messages;

    // 3. The model sees the summary plus the kept tail.
    for msg in effective_history(&messages) {
        println!("  [{}] {}", msg.role, msg.content.text());
    }

    // 4. Persist, then rewind to the condense event to restore everything.
    let dir = std::env::temp_dir().join("condense-rs-demo");
    let store = FileStore::new(&dir);
    store.replace_ui_event_log(&ui_events)?;
    store.replace_api_message_log(&messages)?;

    let mut log = ConversationLog::load(&store)?;
    let outcome = log
        .rewind_to_timestamp(2_000, RewindOptions::default(), &store)
        .map_err(|e| e.to_string())?;
    println!(
        "rewind removed {} summaries, {} messages visible again (logs in {})",
        outcome.removed_condense_ids.len(),
        effective_history(&log.api_messages).len(),
        dir.display(),
    );
    Ok(())
}
