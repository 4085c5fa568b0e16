//! [`Summarizer`] backed by an OpenRouter model.

use crate::api::client::{
    ChatRequest, OpenRouterClient, SUMMARY_MAX_TOKENS, UsageRequest, to_wire_messages,
};
use crate::api::pricing::pricing_for_model;
use crate::api::streaming::chunk_stream;
use crate::config::DEFAULT_CHARS_PER_TOKEN;
use crate::context::budget::estimate_tokens;
use crate::context::summarizer::{
    ModelInfo, Summarizer, SummaryChunk, SummaryStream, TokenCountFuture,
};
use crate::{ContentBlock, Message};
use futures::StreamExt;

/// Streams summaries from one OpenRouter model.
///
/// ```ignore
/// let summarizer = OpenRouterSummarizer::new(OpenRouterClient::from_env()?, "anthropic/claude-sonnet-4")
///     .with_style_b_reasoning(true);
/// ```
#[derive(Clone)]
pub struct OpenRouterSummarizer {
    client: OpenRouterClient,
    model: String,
    max_tokens: u32,
    requires_style_b_reasoning: bool,
    chars_per_token: f64,
}

impl OpenRouterSummarizer {
    pub fn new(client: OpenRouterClient, model: impl Into<String>) -> Self {
        Self {
            client,
            model: model.into(),
            max_tokens: SUMMARY_MAX_TOKENS,
            requires_style_b_reasoning: false,
            chars_per_token: DEFAULT_CHARS_PER_TOKEN,
        }
    }

    /// Declare that this model rejects assistant turns without signed
    /// reasoning.
    pub fn with_style_b_reasoning(mut self, required: bool) -> Self {
        self.requires_style_b_reasoning = required;
        self
    }

    pub fn with_max_tokens(mut self, max_tokens: u32) -> Self {
        self.max_tokens = max_tokens;
        self
    }

    /// Characters per token for the local token estimate.
    pub fn with_chars_per_token(mut self, cpt: f64) -> Self {
        self.chars_per_token = cpt;
        self
    }
}

impl Summarizer for OpenRouterSummarizer {
    fn create_completion<'a>(
        &'a self,
        system_prompt: &'a str,
        messages: &'a [Message],
    ) -> SummaryStream<'a> {
        let body = ChatRequest {
            model: self.model.clone(),
            messages: to_wire_messages(system_prompt, messages),
            max_tokens: self.max_tokens,
            temperature: 0.0,
            stream: true,
            usage: UsageRequest { include: true },
        };
        let pricing = pricing_for_model(&self.model);
        let opened = async move { self.client.send_stream(&body).await };
        Box::pin(
            futures::stream::once(opened).flat_map(move |result| match result {
                Ok(resp) => chunk_stream(resp, pricing).left_stream(),
                Err(e) => futures::stream::iter(vec![Err::<SummaryChunk, String>(e)]).right_stream(),
            }),
        )
    }

    fn count_tokens<'a>(&'a self, blocks: &'a [ContentBlock]) -> TokenCountFuture<'a> {
        let tokens = estimate_tokens(blocks, self.chars_per_token);
        Box::pin(async move { tokens })
    }

    fn describe_model(&self) -> ModelInfo {
        ModelInfo {
            id: self.model.clone(),
            requires_style_b_reasoning: self.requires_style_b_reasoning,
        }
    }
}
