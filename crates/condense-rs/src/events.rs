//! Telemetry events emitted by the context management engine.
//!
//! The engine reports what it did through [`ContextEvent`] variants. Callers
//! implement [`EventHandler`] to forward them to metrics, a UI, or logs.
//!
//! | Handler | Use case |
//! |---------|----------|
//! | [`NoopHandler`] | Tests or callers without telemetry |
//! | [`LoggingHandler`] | Structured logging via `tracing` |
//! | [`FnEventHandler`] | Quick closures, e.g. recording events in tests |
//! | Custom `impl EventHandler` | Metrics backends, UI notifications |

use tracing::info;

/// Events emitted by condensation and truncation.
#[derive(Debug, Clone, PartialEq)]
pub enum ContextEvent<'a> {
    /// A condensation attempt started. Emitted before any guard runs, so it
    /// is also sent for attempts that end up rejected.
    Condensed {
        task_id: &'a str,
        is_automatic: bool,
        used_custom_prompt: bool,
        used_custom_summarizer: bool,
    },
    /// A sliding-window truncation pass ran.
    SlidingWindowTruncation { task_id: &'a str },
}

/// Handler for engine telemetry.
///
/// The default implementation ignores every event.
///
/// # Example
///
/// ```ignore
/// struct Metrics;
///
/// impl EventHandler for Metrics {
///     fn on_event(&self, event: &ContextEvent<'_>) {
///         if let ContextEvent::Condensed { is_automatic, .. } = event {
///             counter!("condense_total", "automatic" => is_automatic.to_string());
///         }
///     }
/// }
/// ```
pub trait EventHandler: Send + Sync {
    fn on_event(&self, event: &ContextEvent<'_>) {
        let _ = event;
    }
}

/// A handler that drops every event.
pub struct NoopHandler;
impl EventHandler for NoopHandler {}

/// An event handler backed by a closure.
///
/// ```ignore
/// let handler = FnEventHandler::new(|event| println!("{event:?}"));
/// ```
pub struct FnEventHandler<F>(F)
where
    F: Fn(&ContextEvent<'_>) + Send + Sync;

impl<F> FnEventHandler<F>
where
    F: Fn(&ContextEvent<'_>) + Send + Sync,
{
    pub fn new(f: F) -> Self {
        Self(f)
    }
}

impl<F> EventHandler for FnEventHandler<F>
where
    F: Fn(&ContextEvent<'_>) + Send + Sync,
{
    fn on_event(&self, event: &ContextEvent<'_>) {
        (self.0)(event)
    }
}

/// Logs every event through `tracing`.
pub struct LoggingHandler;

impl EventHandler for LoggingHandler {
    fn on_event(&self, event: &ContextEvent<'_>) {
        match event {
            ContextEvent::Condensed {
                task_id,
                is_automatic,
                used_custom_prompt,
                used_custom_summarizer,
            } => {
                info!(
                    task_id = %task_id,
                    "Context condense requested (automatic={is_automatic}, \
                     custom_prompt={used_custom_prompt}, custom_summarizer={used_custom_summarizer})"
                );
            }
            ContextEvent::SlidingWindowTruncation { task_id } => {
                info!(task_id = %task_id, "Sliding window truncation");
            }
        }
    }
}
