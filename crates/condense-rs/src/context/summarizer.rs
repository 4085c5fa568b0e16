//! The summarizer collaborator and the fold over its response stream.
//!
//! Condensation talks to a model only through the [`Summarizer`] trait:
//! one streaming completion, one token count, and a description of the
//! model. The response stream is reduced by [`SummaryAccumulator`], a pure
//! fold that keeps the summary text, the usage totals, and the *last
//! complete* private-reasoning chunk of each dialect.

use crate::config::DEFAULT_CHARS_PER_TOKEN;
use crate::context::budget::estimate_tokens;
use crate::{ContentBlock, Message};
use futures::Stream;
use std::future::Future;
use std::pin::Pin;
use std::sync::Mutex;
use std::sync::atomic::{AtomicUsize, Ordering};

/// Built-in instructions for the summarization call.
pub const SUMMARY_PROMPT: &str = "\
Your task is to create a detailed summary of the conversation so far, paying close \
attention to the user's explicit requests and your previous actions. This summary \
replaces the summarized turns entirely, so it must let work continue without loss \
of context.

Structure the summary with these sections:
1. Previous Conversation: high-level overview of what was discussed and done.
2. Current Work: precisely what was being worked on immediately before this \
summary, with the most recent messages in the most detail.
3. Key Technical Concepts: technologies, conventions, and frameworks involved.
4. Relevant Files and Code: every file examined, modified, or created, with the \
important code snippets and why they matter.
5. Problem Solving: problems solved and troubleshooting still in progress.
6. Pending Tasks and Next Steps: outstanding work and the exact next step, quoting \
the latest user request verbatim where it applies.

Rules:
- Only include facts stated in the conversation. Do not infer or extrapolate.
- Preserve file paths, function names, and error messages verbatim.
- Output only the summary, without preamble or closing remarks.";

/// Closing user turn appended to the summarization request.
pub const SUMMARY_REQUEST: &str =
    "Summarize the conversation so far, as described in the prompt instructions.";

/// Boxed stream returned by [`Summarizer::create_completion`].
pub type SummaryStream<'a> =
    Pin<Box<dyn Stream<Item = Result<SummaryChunk, String>> + Send + 'a>>;

/// Boxed future returned by [`Summarizer::count_tokens`].
pub type TokenCountFuture<'a> = Pin<Box<dyn Future<Output = u64> + Send + 'a>>;

/// One chunk of a streamed summarizer response.
#[derive(Debug, Clone, PartialEq)]
pub enum SummaryChunk {
    /// Summary text delta.
    Text(String),
    /// Usage for this part of the response, normally sent once at the end.
    /// Repeated chunks are summed.
    Usage {
        input_tokens: u64,
        output_tokens: u64,
        cost: f64,
    },
    /// Plain-text private reasoning (style A).
    ReasoningA { text: String },
    /// Signed private reasoning (style B).
    ReasoningB { thinking: String, signature: String },
    /// Encrypted private reasoning (style B, redacted).
    RedactedReasoningB { data: String },
}

/// What condensation needs to know about a model.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ModelInfo {
    pub id: String,
    /// Every assistant turn sent to this model must carry a style-B block.
    pub requires_style_b_reasoning: bool,
}

/// A model backend able to stream a summary and count tokens.
///
/// Uses boxed futures and streams so the trait stays dyn-compatible.
pub trait Summarizer: Send + Sync {
    /// Stream a completion for `messages` under the given system prompt.
    fn create_completion<'a>(
        &'a self,
        system_prompt: &'a str,
        messages: &'a [Message],
    ) -> SummaryStream<'a>;

    /// Count tokens for a list of content blocks.
    ///
    /// The default is a character-based estimate.
    fn count_tokens<'a>(&'a self, blocks: &'a [ContentBlock]) -> TokenCountFuture<'a> {
        let tokens = estimate_tokens(blocks, DEFAULT_CHARS_PER_TOKEN);
        Box::pin(async move { tokens })
    }

    fn describe_model(&self) -> ModelInfo;

    /// Whether this backend can issue completion requests at all.
    fn supports_completion(&self) -> bool {
        true
    }
}

/// Reduced state of a summarizer response stream.
#[derive(Debug, Default, Clone, PartialEq)]
pub struct SummaryAccumulator {
    pub text: String,
    pub cost: f64,
    pub input_tokens: u64,
    pub output_tokens: u64,
    /// Last complete style-A reasoning block.
    pub reasoning: Option<ContentBlock>,
    /// Last complete signed style-B block.
    pub thinking: Option<ContentBlock>,
    /// Last complete redacted style-B block.
    pub redacted_thinking: Option<ContentBlock>,
}

impl SummaryAccumulator {
    /// Fold one chunk into the state.
    ///
    /// Reasoning chunks with missing data (an early partial emission) never
    /// replace a previously accepted one.
    pub fn reduce(mut self, chunk: SummaryChunk) -> Self {
        match chunk {
            SummaryChunk::Text(delta) => self.text.push_str(&delta),
            SummaryChunk::Usage {
                input_tokens,
                output_tokens,
                cost,
            } => {
                self.input_tokens += input_tokens;
                self.output_tokens += output_tokens;
                self.cost += cost;
            }
            SummaryChunk::ReasoningA { text } => {
                if !text.is_empty() {
                    self.reasoning = Some(ContentBlock::Reasoning { text });
                }
            }
            SummaryChunk::ReasoningB {
                thinking,
                signature,
            } => {
                if !thinking.is_empty() && !signature.is_empty() {
                    self.thinking = Some(ContentBlock::Thinking {
                        thinking,
                        signature,
                    });
                }
            }
            SummaryChunk::RedactedReasoningB { data } => {
                if !data.is_empty() {
                    self.redacted_thinking = Some(ContentBlock::RedactedThinking { data });
                }
            }
        }
        self
    }

    /// Fold a finished sequence of chunks.
    pub fn from_chunks(chunks: impl IntoIterator<Item = SummaryChunk>) -> Self {
        chunks.into_iter().fold(Self::default(), Self::reduce)
    }

    /// The style-B blocks produced by the stream, signed block first.
    pub fn style_b_blocks(&self) -> Vec<ContentBlock> {
        self.thinking
            .iter()
            .chain(self.redacted_thinking.iter())
            .cloned()
            .collect()
    }
}

/// A summarizer that replays a fixed list of chunks.
///
/// Makes no network calls; useful in tests and offline runs. Counts how
/// many completions it served.
#[derive(Debug)]
pub struct ScriptedSummarizer {
    chunks: Vec<Result<SummaryChunk, String>>,
    model: ModelInfo,
    supports_completion: bool,
    fixed_token_count: Option<u64>,
    calls: AtomicUsize,
    last_request: Mutex<Option<(String, Vec<Message>)>>,
}

impl ScriptedSummarizer {
    pub fn new(chunks: Vec<SummaryChunk>) -> Self {
        Self {
            chunks: chunks.into_iter().map(Ok).collect(),
            model: ModelInfo {
                id: "scripted".into(),
                requires_style_b_reasoning: false,
            },
            supports_completion: true,
            fixed_token_count: None,
            calls: AtomicUsize::new(0),
            last_request: Mutex::new(None),
        }
    }

    /// Replay a stream that ends in a transport error after `chunks`.
    pub fn failing(chunks: Vec<SummaryChunk>, error: impl Into<String>) -> Self {
        let mut summarizer = Self::new(chunks);
        summarizer.chunks.push(Err(error.into()));
        summarizer
    }

    /// Shorthand for a stream with one text chunk and a usage chunk.
    pub fn with_summary(text: impl Into<String>, output_tokens: u64, cost: f64) -> Self {
        Self::new(vec![
            SummaryChunk::Text(text.into()),
            SummaryChunk::Usage {
                input_tokens: 0,
                output_tokens,
                cost,
            },
        ])
    }

    pub fn with_model(mut self, id: impl Into<String>, requires_style_b_reasoning: bool) -> Self {
        self.model = ModelInfo {
            id: id.into(),
            requires_style_b_reasoning,
        };
        self
    }

    /// Report every token count as `tokens` instead of estimating.
    pub fn with_token_count(mut self, tokens: u64) -> Self {
        self.fixed_token_count = Some(tokens);
        self
    }

    /// Mark this backend as unable to issue completions.
    pub fn without_completion(mut self) -> Self {
        self.supports_completion = false;
        self
    }

    /// Number of completion requests served so far.
    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::Relaxed)
    }

    /// System prompt and messages of the most recent completion request.
    pub fn last_request(&self) -> Option<(String, Vec<Message>)> {
        self.last_request
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .clone()
    }
}

impl Summarizer for ScriptedSummarizer {
    fn create_completion<'a>(
        &'a self,
        system_prompt: &'a str,
        messages: &'a [Message],
    ) -> SummaryStream<'a> {
        self.calls.fetch_add(1, Ordering::Relaxed);
        *self.last_request.lock().unwrap_or_else(|e| e.into_inner()) =
            Some((system_prompt.to_string(), messages.to_vec()));
        Box::pin(futures::stream::iter(self.chunks.clone()))
    }

    fn count_tokens<'a>(&'a self, blocks: &'a [ContentBlock]) -> TokenCountFuture<'a> {
        let tokens = self
            .fixed_token_count
            .unwrap_or_else(|| estimate_tokens(blocks, DEFAULT_CHARS_PER_TOKEN));
        Box::pin(async move { tokens })
    }

    fn describe_model(&self) -> ModelInfo {
        self.model.clone()
    }

    fn supports_completion(&self) -> bool {
        self.supports_completion
    }
}
