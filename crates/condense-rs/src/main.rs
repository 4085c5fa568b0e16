//! Inspect and manage the context of a persisted conversation.
//!
//! Operates on a task directory holding `ui_messages.json` and
//! `api_conversation_history.json`, and prints JSON to stdout. Commands that
//! call a model read the API key from the `OPENROUTER_KEY` environment
//! variable.
//!
//! # Examples
//!
//! ```sh
//! # Counts of visible, hidden and orphaned messages
//! condense --dir tasks/42 inspect
//!
//! # The history actually sent to the model
//! condense --dir tasks/42 project
//!
//! # Hide half of the visible history behind a truncation marker
//! condense --dir tasks/42 truncate --fraction 0.5
//!
//! # Rewind to a UI event, restoring anything its removal un-hides
//! condense --dir tasks/42 rewind --ts 1718000000000
//!
//! # Condense now with a specific model
//! condense --dir tasks/42 condense --model anthropic/claude-sonnet-4 --native-tools
//!
//! # One orchestration pass, as an agent loop would run it each turn
//! condense --dir tasks/42 manage --context-window 200000 --total-tokens 170000 \
//!   --model anthropic/claude-sonnet-4
//! ```

use clap::{Parser, Subcommand};
use condense_rs::api::{OpenRouterClient, OpenRouterSummarizer};
use condense_rs::config::ContextConfig;
use condense_rs::context::budget::{ContextUsage, estimate_tokens};
use condense_rs::context::projection::count_orphans;
use condense_rs::context::{
    CondenseRequest, ConversationLog, ManageRequest, RewindOptions, Summarizer, effective_history,
    manage_context, repair_orphans, summarize_conversation, truncate_conversation,
};
use condense_rs::events::LoggingHandler;
use condense_rs::session::{ConversationStore, FileStore, UiEvent};
use condense_rs::{ContentBlock, Message, now_millis};
use serde_json::{Value, json};
use std::path::PathBuf;
use std::process;
use tracing_subscriber::EnvFilter;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;

/// Inspect and manage the context of a persisted conversation.
#[derive(Parser)]
#[command(name = "condense")]
struct Cli {
    /// Task directory holding the UI and API logs
    #[arg(long, global = true, default_value = ".")]
    dir: PathBuf,

    /// JSON file overriding context-management settings
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Task id reported in logs and telemetry (defaults to the directory name)
    #[arg(long, global = true)]
    task_id: Option<String>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Count total, visible and hidden messages, summaries, markers and orphans
    Inspect {
        /// Context window used for the usage percentage
        #[arg(long, default_value_t = 200_000)]
        context_window: u64,
    },
    /// Print the effective history
    Project,
    /// Clear tags whose summary or marker no longer exists
    Repair,
    /// Hide a fraction of the visible history behind a marker
    Truncate {
        /// Share of the visible history to hide, between 0 and 1
        #[arg(long, default_value_t = 0.5, value_parser = parse_fraction)]
        fraction: f64,
    },
    /// Cut both logs back to a UI event
    Rewind {
        /// Timestamp of the target UI event
        #[arg(long, conflicts_with = "index", required_unless_present = "index")]
        ts: Option<i64>,
        /// Position of the target UI event
        #[arg(long)]
        index: Option<usize>,
        /// Keep the target UI event itself
        #[arg(long)]
        include_target: bool,
        /// Leave stale hide tags in place
        #[arg(long)]
        skip_cleanup: bool,
    },
    /// Summarize older history now
    Condense {
        #[command(flatten)]
        model: ModelArgs,
        /// Custom summarization instructions
        #[arg(long)]
        prompt: Option<String>,
        /// System prompt counted toward the new context size
        #[arg(long, default_value = "")]
        system_prompt: String,
    },
    /// Run one context-management pass
    Manage {
        #[command(flatten)]
        model: ModelArgs,
        #[arg(long)]
        context_window: u64,
        /// Tokens used by everything except the newest message
        #[arg(long)]
        total_tokens: u64,
        /// Output tokens reserved for the next response
        #[arg(long)]
        max_tokens: Option<u64>,
        /// Condense once usage reaches this percentage of the window
        #[arg(long, default_value_t = 100.0)]
        auto_percent: f64,
        #[arg(long)]
        no_auto_condense: bool,
        #[arg(long)]
        prompt: Option<String>,
        #[arg(long, default_value = "")]
        system_prompt: String,
    },
}

#[derive(clap::Args)]
struct ModelArgs {
    /// OpenRouter model id
    #[arg(long)]
    model: String,
    /// Tool calls are exchanged as structured blocks
    #[arg(long)]
    native_tools: bool,
    /// The model rejects assistant turns without signed reasoning
    #[arg(long)]
    requires_style_b: bool,
}

impl ModelArgs {
    fn summarizer(&self, config: &ContextConfig) -> Result<OpenRouterSummarizer, String> {
        Ok(OpenRouterSummarizer::new(OpenRouterClient::from_env()?, &self.model)
            .with_style_b_reasoning(self.requires_style_b)
            .with_chars_per_token(config.chars_per_token))
    }
}

fn parse_fraction(s: &str) -> Result<f64, String> {
    let value: f64 = s.parse().map_err(|e| format!("invalid fraction '{s}': {e}"))?;
    if (0.0..=1.0).contains(&value) {
        Ok(value)
    } else {
        Err(format!("fraction must be between 0 and 1, got {value}"))
    }
}

fn load_config(cli: &Cli) -> Result<ContextConfig, String> {
    match cli.config {
        Some(ref path) => ContextConfig::load(path),
        None => Ok(ContextConfig::default()),
    }
}

fn estimate_visible_tokens(messages: &[Message], config: &ContextConfig) -> u64 {
    let blocks: Vec<ContentBlock> = effective_history(messages)
        .iter()
        .flat_map(|m| m.content.to_blocks())
        .collect();
    estimate_tokens(&blocks, config.chars_per_token)
}

async fn run(cli: &Cli) -> Result<Value, String> {
    let config = load_config(cli)?;
    let store = FileStore::new(&cli.dir);
    let mut log = ConversationLog::load(&store)?;
    let task_id = cli.task_id.clone().unwrap_or_else(|| {
        cli.dir
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| "task".into())
    });

    match cli.command {
        Command::Inspect { context_window } => {
            let view = effective_history(&log.api_messages);
            let usage = ContextUsage::new(
                estimate_visible_tokens(&log.api_messages, &config),
                context_window,
            );
            Ok(json!({
                "total": log.api_messages.len(),
                "visible": view.len(),
                "summaries": log.api_messages.iter().filter(|m| m.is_summary).count(),
                "truncation_markers": log.api_messages.iter().filter(|m| m.is_truncation_marker).count(),
                "orphans": count_orphans(&log.api_messages),
                "ui_events": log.ui_events.len(),
                "estimated_tokens": usage.tokens,
                "usage": usage.to_log_string(),
            }))
        }
        Command::Project => serde_json::to_value(effective_history(&log.api_messages))
            .map_err(|e| format!("Failed to serialize history: {e}")),
        Command::Repair => {
            let repaired = repair_orphans(&log.api_messages);
            let cleared = count_orphans(&log.api_messages);
            if cleared > 0 {
                store.replace_api_message_log(&repaired)?;
            }
            Ok(json!({ "cleared": cleared }))
        }
        Command::Truncate { fraction } => {
            let prev_context_tokens = estimate_visible_tokens(&log.api_messages, &config);
            let result =
                truncate_conversation(&log.api_messages, fraction, &task_id, &LoggingHandler);
            if let Some(event) = UiEvent::from_truncation(now_millis(), &result, prev_context_tokens)
            {
                log.ui_events.push(event);
                store.replace_api_message_log(&result.messages)?;
                store.replace_ui_event_log(&log.ui_events)?;
            }
            Ok(json!({
                "truncation_id": result.truncation_id,
                "messages_removed": result.messages_removed,
            }))
        }
        Command::Rewind {
            ts,
            index,
            include_target,
            skip_cleanup,
        } => {
            let options = RewindOptions {
                include_target,
                skip_cleanup,
            };
            let outcome = match (ts, index) {
                (Some(ts), _) => log.rewind_to_timestamp(ts, options, &store),
                (None, Some(index)) => log.rewind_to_index(index, options, &store),
                (None, None) => return Err("one of --ts or --index is required".into()),
            }
            .map_err(|e| e.to_string())?;
            Ok(json!({
                "ui_events_removed": outcome.ui_events_removed,
                "api_messages_removed": outcome.api_messages_removed,
                "removed_condense_ids": outcome.removed_condense_ids,
                "removed_truncation_ids": outcome.removed_truncation_ids,
                "api_log_changed": outcome.api_log_changed,
            }))
        }
        Command::Condense {
            ref model,
            ref prompt,
            ref system_prompt,
        } => {
            let summarizer = model.summarizer(&config)?;
            let mut blocks = vec![ContentBlock::text(system_prompt.as_str())];
            for msg in effective_history(&log.api_messages) {
                blocks.extend(msg.content.to_blocks());
            }
            let prev_context_tokens = summarizer.count_tokens(&blocks).await;

            let result = summarize_conversation(
                CondenseRequest {
                    messages: &log.api_messages,
                    summarizer: &summarizer,
                    custom_summarizer: None,
                    system_prompt,
                    task_id: &task_id,
                    prev_context_tokens,
                    is_automatic: false,
                    custom_prompt: prompt.as_deref(),
                    uses_native_tool_protocol: model.native_tools,
                },
                &config,
                &LoggingHandler,
            )
            .await;
            if let Some(ref err) = result.error {
                return Err(format!("Condense failed: {err} (cost ${:.4})", result.cost));
            }
            if let Some(event) = UiEvent::from_condense(now_millis(), &result, prev_context_tokens) {
                log.ui_events.push(event);
            }
            store.replace_api_message_log(&result.messages)?;
            store.replace_ui_event_log(&log.ui_events)?;
            Ok(json!({
                "condense_id": result.condense_id,
                "summary": result.summary,
                "cost": result.cost,
                "prev_context_tokens": prev_context_tokens,
                "new_context_tokens": result.new_context_tokens,
            }))
        }
        Command::Manage {
            ref model,
            context_window,
            total_tokens,
            max_tokens,
            auto_percent,
            no_auto_condense,
            ref prompt,
            ref system_prompt,
        } => {
            let summarizer = model.summarizer(&config)?;
            let mut request =
                ManageRequest::new(&log.api_messages, &summarizer, total_tokens, context_window)
                    .with_auto_condense(!no_auto_condense, auto_percent)
                    .with_system_prompt(system_prompt)
                    .with_task_id(&task_id)
                    .with_native_tool_protocol(model.native_tools);
            if let Some(max_tokens) = max_tokens {
                request = request.with_max_tokens(max_tokens);
            }
            if let Some(ref prompt) = *prompt {
                request = request.with_custom_prompt(prompt);
            }

            let result = manage_context(request, &config, &LoggingHandler).await;
            if let Some(event) = UiEvent::from_manage(now_millis(), &result) {
                log.ui_events.push(event);
                store.replace_api_message_log(&result.messages)?;
                store.replace_ui_event_log(&log.ui_events)?;
            }
            Ok(json!({
                "condense_id": result.condense_id,
                "truncation_id": result.truncation_id,
                "messages_removed": result.messages_removed,
                "cost": result.cost,
                "prev_context_tokens": result.prev_context_tokens,
                "new_context_tokens": result.new_context_tokens,
                "error": result.error.map(|e| e.to_string()),
            }))
        }
    }
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    tracing_subscriber::registry()
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    match run(&cli).await {
        Ok(output) => match serde_json::to_string_pretty(&output) {
            Ok(text) => println!("{text}"),
            Err(e) => {
                eprintln!("Error: failed to format output: {e}");
                process::exit(1);
            }
        },
        Err(e) => {
            eprintln!("Error: {e}");
            process::exit(1);
        }
    }
}
