//! OpenRouter-backed summarization.
//!
//! - [`client`]: HTTP client and the OpenAI-style wire format.
//! - [`streaming`]: SSE parser producing [`SummaryChunk`](crate::context::summarizer::SummaryChunk)s,
//!   including both private-reasoning dialects and usage with cost.
//! - [`summarizer`]: [`OpenRouterSummarizer`], the
//!   [`Summarizer`](crate::context::summarizer::Summarizer) implementation.
//! - [`pricing`]: per-model prices for responses that omit a cost.

pub mod client;
pub mod pricing;
pub mod streaming;
pub mod summarizer;

pub use client::{OPENROUTER_URL, OpenRouterClient};
pub use pricing::{ModelPricing, pricing_for_model};
pub use summarizer::OpenRouterSummarizer;
