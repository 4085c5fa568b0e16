//! Server-Sent Events (SSE) parsing for OpenRouter streaming responses.
//!
//! [`SseParser`] turns raw response bytes into [`SummaryChunk`]s and is
//! independent of the network, so it can be fed test fixtures directly.
//! [`chunk_stream`] drives it from a live `reqwest::Response`, reading with
//! `chunk()` so long responses never hit a single-body timeout.
//!
//! Reasoning arrives in fragments. The parser accumulates them and emits the
//! cumulative text each time, so the consumer can simply keep the last
//! complete chunk of each kind.

use crate::api::pricing::ModelPricing;
use crate::context::summarizer::SummaryChunk;
use futures::Stream;
use serde::Deserialize;
use std::collections::VecDeque;
use tracing::{debug, trace, warn};

/// Raw SSE data chunk from the OpenRouter API.
#[derive(Deserialize, Debug)]
struct StreamChunk {
    choices: Option<Vec<StreamChoice>>,
    usage: Option<StreamUsage>,
}

#[derive(Deserialize, Debug)]
struct StreamChoice {
    delta: Option<StreamDelta>,
    finish_reason: Option<String>,
}

#[derive(Deserialize, Debug)]
struct StreamDelta {
    content: Option<String>,
    reasoning: Option<String>,
    reasoning_details: Option<Vec<ReasoningDetail>>,
}

#[derive(Deserialize, Debug)]
struct ReasoningDetail {
    #[serde(rename = "type")]
    detail_type: String,
    text: Option<String>,
    signature: Option<String>,
    data: Option<String>,
}

#[derive(Deserialize, Debug)]
struct StreamUsage {
    prompt_tokens: Option<u64>,
    completion_tokens: Option<u64>,
    cost: Option<f64>,
}

/// Incremental SSE parser producing summary chunks.
#[derive(Debug, Default)]
pub struct SseParser {
    buffer: Vec<u8>,
    pricing: ModelPricing,
    reasoning_text: String,
    thinking_text: String,
    done: bool,
}

impl SseParser {
    /// A parser that prices usage without a reported cost with `pricing`.
    pub fn new(pricing: ModelPricing) -> Self {
        Self {
            pricing,
            ..Self::default()
        }
    }

    /// Whether `data: [DONE]` has been seen.
    pub fn is_done(&self) -> bool {
        self.done
    }

    /// Feed raw bytes, returning the chunks from every completed line.
    ///
    /// Lines are decoded only once complete, so a multi-byte character split
    /// across reads is kept intact.
    pub fn push(&mut self, bytes: &[u8]) -> Vec<SummaryChunk> {
        self.buffer.extend_from_slice(bytes);
        let mut chunks = Vec::new();
        while !self.done
            && let Some(newline_pos) = self.buffer.iter().position(|&b| b == b'\n')
        {
            let line: Vec<u8> = self.buffer.drain(..=newline_pos).collect();
            self.parse_line(String::from_utf8_lossy(&line).trim(), &mut chunks);
        }
        chunks
    }

    /// Process an incomplete final line left in the buffer.
    pub fn finish(&mut self) -> Vec<SummaryChunk> {
        let mut chunks = Vec::new();
        if !self.done {
            let remaining = std::mem::take(&mut self.buffer);
            self.parse_line(String::from_utf8_lossy(&remaining).trim(), &mut chunks);
        }
        self.done = true;
        chunks
    }

    fn parse_line(&mut self, line: &str, chunks: &mut Vec<SummaryChunk>) {
        if line.is_empty() || line.starts_with(':') {
            return;
        }
        if line == "data: [DONE]" {
            self.done = true;
            return;
        }
        if let Some(data) = line.strip_prefix("data: ") {
            self.parse_data(data, chunks);
        }
    }

    /// Parse a single SSE `data:` payload.
    fn parse_data(&mut self, data: &str, chunks: &mut Vec<SummaryChunk>) {
        let chunk = match serde_json::from_str::<StreamChunk>(data) {
            Ok(chunk) => chunk,
            Err(e) => {
                warn!("Failed to parse SSE chunk: {e} (data: {data})");
                return;
            }
        };

        for choice in chunk.choices.unwrap_or_default() {
            if let Some(delta) = choice.delta {
                if let Some(content) = delta.content
                    && !content.is_empty()
                {
                    chunks.push(SummaryChunk::Text(content));
                }
                if let Some(reasoning) = delta.reasoning
                    && !reasoning.is_empty()
                {
                    self.reasoning_text.push_str(&reasoning);
                    chunks.push(SummaryChunk::ReasoningA {
                        text: self.reasoning_text.clone(),
                    });
                }
                for detail in delta.reasoning_details.unwrap_or_default() {
                    self.parse_reasoning_detail(detail, chunks);
                }
            }
            if choice.finish_reason.is_some() {
                trace!("Stream finish_reason: {:?}", choice.finish_reason);
            }
        }

        if let Some(usage) = chunk.usage {
            let input_tokens = usage.prompt_tokens.unwrap_or(0);
            let output_tokens = usage.completion_tokens.unwrap_or(0);
            let cost = usage
                .cost
                .unwrap_or_else(|| self.pricing.estimate_cost(input_tokens, output_tokens));
            chunks.push(SummaryChunk::Usage {
                input_tokens,
                output_tokens,
                cost,
            });
        }
    }

    fn parse_reasoning_detail(&mut self, detail: ReasoningDetail, chunks: &mut Vec<SummaryChunk>) {
        match detail.detail_type.as_str() {
            "reasoning.text" => {
                if let Some(text) = detail.text {
                    self.thinking_text.push_str(&text);
                }
                // Only the fragment carrying the signature completes the block.
                if let Some(signature) = detail.signature
                    && !signature.is_empty()
                {
                    chunks.push(SummaryChunk::ReasoningB {
                        thinking: std::mem::take(&mut self.thinking_text),
                        signature,
                    });
                }
            }
            "reasoning.encrypted" => {
                if let Some(data) = detail.data
                    && !data.is_empty()
                {
                    chunks.push(SummaryChunk::RedactedReasoningB { data });
                }
            }
            other => trace!("Ignoring reasoning detail type {other}"),
        }
    }
}

struct StreamState {
    resp: reqwest::Response,
    parser: SseParser,
    pending: VecDeque<SummaryChunk>,
    finished: bool,
}

/// Stream summary chunks off a live SSE response.
///
/// A transport error ends the stream after yielding one `Err`.
pub fn chunk_stream(
    resp: reqwest::Response,
    pricing: ModelPricing,
) -> impl Stream<Item = Result<SummaryChunk, String>> + Send {
    let state = StreamState {
        resp,
        parser: SseParser::new(pricing),
        pending: VecDeque::new(),
        finished: false,
    };
    futures::stream::unfold(state, |mut st| async move {
        loop {
            if let Some(chunk) = st.pending.pop_front() {
                return Some((Ok(chunk), st));
            }
            if st.finished {
                return None;
            }
            match st.resp.chunk().await {
                Ok(Some(bytes)) => {
                    st.pending.extend(st.parser.push(&bytes));
                    if st.parser.is_done() {
                        debug!("Summary stream completed");
                        st.finished = true;
                    }
                }
                Ok(None) => {
                    st.pending.extend(st.parser.finish());
                    st.finished = true;
                }
                Err(e) => {
                    st.finished = true;
                    st.pending.clear();
                    return Some((Err(format!("failed to read streaming chunk: {e}")), st));
                }
            }
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::context::summarizer::SummaryAccumulator;

    fn parse_all(input: &str) -> Vec<SummaryChunk> {
        let mut parser = SseParser::new(ModelPricing::default());
        let mut chunks = parser.push(input.as_bytes());
        chunks.extend(parser.finish());
        chunks
    }

    #[test]
    fn text_deltas_and_usage() {
        let chunks = parse_all(concat!(
            ": OPENROUTER PROCESSING\n",
            "data: {\"choices\":[{\"delta\":{\"content\":\"Hello \"}}]}\n\n",
            "data: {\"choices\":[{\"delta\":{\"content\":\"world\"},\"finish_reason\":\"stop\"}]}\n\n",
            "data: {\"choices\":[],\"usage\":{\"prompt_tokens\":100,\"completion_tokens\":20,\"cost\":0.004}}\n\n",
            "data: [DONE]\n\n",
        ));
        let acc = SummaryAccumulator::from_chunks(chunks);
        assert_eq!(acc.text, "Hello world");
        assert_eq!(acc.input_tokens, 100);
        assert_eq!(acc.output_tokens, 20);
        assert_eq!(acc.cost, 0.004);
    }

    #[test]
    fn missing_cost_is_priced_from_table() {
        let chunks = parse_all(
            "data: {\"usage\":{\"prompt_tokens\":1000000,\"completion_tokens\":0}}\n",
        );
        assert_eq!(
            chunks,
            vec![SummaryChunk::Usage {
                input_tokens: 1_000_000,
                output_tokens: 0,
                cost: 3.0,
            }]
        );
    }

    #[test]
    fn signed_reasoning_accumulates_until_signature() {
        let chunks = parse_all(concat!(
            "data: {\"choices\":[{\"delta\":{\"reasoning_details\":[{\"type\":\"reasoning.text\",\"text\":\"Let me \"}]}}]}\n",
            "data: {\"choices\":[{\"delta\":{\"reasoning_details\":[{\"type\":\"reasoning.text\",\"text\":\"think.\",\"signature\":\"sig\"}]}}]}\n",
            "data: {\"choices\":[{\"delta\":{\"reasoning_details\":[{\"type\":\"reasoning.encrypted\",\"data\":\"enc\"}]}}]}\n",
        ));
        assert_eq!(
            chunks,
            vec![
                SummaryChunk::ReasoningB {
                    thinking: "Let me think.".into(),
                    signature: "sig".into(),
                },
                SummaryChunk::RedactedReasoningB { data: "enc".into() },
            ]
        );
    }

    #[test]
    fn plain_reasoning_is_cumulative() {
        let chunks = parse_all(concat!(
            "data: {\"choices\":[{\"delta\":{\"reasoning\":\"a\"}}]}\n",
            "data: {\"choices\":[{\"delta\":{\"reasoning\":\"b\"}}]}\n",
        ));
        let acc = SummaryAccumulator::from_chunks(chunks);
        assert_eq!(
            acc.reasoning,
            Some(crate::ContentBlock::Reasoning { text: "ab".into() })
        );
    }

    #[test]
    fn lines_split_across_pushes() {
        let mut parser = SseParser::new(ModelPricing::default());
        assert!(parser.push(b"data: {\"choices\":[{\"delta\":").is_empty());
        let chunks = parser.push(b"{\"content\":\"hi\"}}]}\n");
        assert_eq!(chunks, vec![SummaryChunk::Text("hi".into())]);
    }

    #[test]
    fn multibyte_char_split_across_pushes() {
        let line = "data: {\"choices\":[{\"delta\":{\"content\":\"h\u{e9}llo\"}}]}\n";
        let bytes = line.as_bytes();
        let split = bytes.iter().position(|&b| b == 0xC3).unwrap() + 1;

        let mut parser = SseParser::new(ModelPricing::default());
        assert!(parser.push(&bytes[..split]).is_empty());
        let chunks = parser.push(&bytes[split..]);
        assert_eq!(chunks, vec![SummaryChunk::Text("h\u{e9}llo".into())]);
    }

    #[test]
    fn second_signed_block_starts_fresh() {
        let chunks = parse_all(concat!(
            "data: {\"choices\":[{\"delta\":{\"reasoning_details\":[{\"type\":\"reasoning.text\",\"text\":\"first\",\"signature\":\"s1\"}]}}]}\n",
            "data: {\"choices\":[{\"delta\":{\"reasoning_details\":[{\"type\":\"reasoning.text\",\"text\":\"second\",\"signature\":\"s2\"}]}}]}\n",
        ));
        assert_eq!(
            chunks,
            vec![
                SummaryChunk::ReasoningB {
                    thinking: "first".into(),
                    signature: "s1".into(),
                },
                SummaryChunk::ReasoningB {
                    thinking: "second".into(),
                    signature: "s2".into(),
                },
            ]
        );
    }

    #[test]
    fn final_line_without_newline_is_parsed() {
        let chunks = parse_all("data: {\"choices\":[{\"delta\":{\"content\":\"tail\"}}]}");
        assert_eq!(chunks, vec![SummaryChunk::Text("tail".into())]);
    }

    #[test]
    fn stops_at_done_and_skips_garbage() {
        let chunks = parse_all(concat!(
            "data: not json\n",
            "data: [DONE]\n",
            "data: {\"choices\":[{\"delta\":{\"content\":\"late\"}}]}\n",
        ));
        assert!(chunks.is_empty());
    }
}
