//! The chat-service boundary: requests, responses, chunks, and memory.
//!
//! Everything the generation controller needs from a model provider is
//! behind the [`ChatService`] trait; adapters live outside this crate.

use async_trait::async_trait;
use futures::Stream;
use serde::Serialize;
use std::pin::Pin;

use crate::errors::GenerateError;

mod memory;
mod turn;

pub use memory::{InMemory, Memory};
pub use turn::{FunctionCall, Turn, UserPart};

/// Why the model stopped producing output.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum FinishReason {
    /// Natural end of output.
    Stop,
    /// Token limit reached; the output is truncated.
    Length,
    /// The model stopped to request tool calls.
    ToolCalls,
    /// Provider-specific reason.
    Other(String),
}

/// Token usage counters reported by the provider.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct ModelUsage {
    /// Tokens consumed by the prompt.
    pub prompt_tokens: u32,
    /// Tokens produced by the completion.
    pub completion_tokens: u32,
    /// Total tokens billed.
    pub total_tokens: u32,
}

/// One usage record, tagged with the service and model that produced it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct UsageReport {
    /// Service name.
    pub service: String,
    /// Model name.
    pub model: String,
    /// The usage counters.
    pub usage: ModelUsage,
}

/// One completion inside a buffered response.
#[derive(Debug, Clone, Default)]
pub struct ChatResult {
    /// Completion index, for multi-completion responses.
    pub index: usize,
    /// Full response text.
    pub content: Option<String>,
    /// Tool calls requested by the model.
    pub function_calls: Vec<FunctionCall>,
    /// Why this completion stopped.
    pub finish_reason: Option<FinishReason>,
}

/// A complete, buffered model response.
#[derive(Debug, Clone, Default)]
pub struct ChatResponse {
    /// The completions.
    pub results: Vec<ChatResult>,
    /// Usage counters, if reported.
    pub usage: Option<ModelUsage>,
}

/// A partial tool-call fragment inside a streamed chunk. Fragments are
/// merged by call position as they arrive.
#[derive(Debug, Clone, Default)]
pub struct FunctionCallDelta {
    /// Position of the call in the response's call list.
    pub index: usize,
    /// Call id, when first announced.
    pub id: Option<String>,
    /// Tool name, when first announced.
    pub name: Option<String>,
    /// Argument text fragment to append.
    pub args: Option<String>,
}

/// One completion's delta inside a streamed chunk.
#[derive(Debug, Clone, Default)]
pub struct ChatResultDelta {
    /// Completion index.
    pub index: usize,
    /// Text fragment to append.
    pub content: Option<String>,
    /// Tool-call fragments.
    pub function_calls: Vec<FunctionCallDelta>,
    /// Present on the final chunk of a completion.
    pub finish_reason: Option<FinishReason>,
}

/// One streamed chunk.
#[derive(Debug, Clone, Default)]
pub struct ChatChunk {
    /// Per-completion deltas.
    pub results: Vec<ChatResultDelta>,
    /// Usage counters, if reported on this chunk.
    pub usage: Option<ModelUsage>,
}

/// Merges streamed tool-call fragments into the accumulated call list.
pub fn merge_function_calls(calls: &mut Vec<FunctionCall>, deltas: &[FunctionCallDelta]) {
    for delta in deltas {
        while calls.len() <= delta.index {
            calls.push(FunctionCall::default());
        }
        let call = &mut calls[delta.index];
        if let Some(id) = &delta.id {
            call.id.clone_from(id);
        }
        if let Some(name) = &delta.name {
            call.name.clone_from(name);
        }
        if let Some(args) = &delta.args {
            call.args.push_str(args);
        }
    }
}

/// Model sampling configuration. Unset fields defer to the layer below
/// (forward options → generator options → service defaults).
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct ModelConfig {
    /// Completion token limit.
    pub max_tokens: Option<u32>,
    /// Sampling temperature.
    pub temperature: Option<f64>,
    /// Nucleus sampling cutoff.
    pub top_p: Option<f64>,
    /// Sequences that stop generation.
    pub stop_sequences: Option<Vec<String>>,
}

/// Merges an override config onto a base config. Scalar fields override
/// individually; stop sequences replace as a whole rather than merging.
#[must_use]
pub fn merge_model_configs(base: &ModelConfig, overrides: &ModelConfig) -> ModelConfig {
    ModelConfig {
        max_tokens: overrides.max_tokens.or(base.max_tokens),
        temperature: overrides.temperature.or(base.temperature),
        top_p: overrides.top_p.or(base.top_p),
        stop_sequences: overrides
            .stop_sequences
            .clone()
            .or_else(|| base.stop_sequences.clone()),
    }
}

/// A tool made visible to the model: name, description, and JSON-schema
/// parameters. Execution stays behind the tool registry.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ToolSpec {
    /// Tool name.
    pub name: String,
    /// What the tool does.
    pub description: String,
    /// JSON schema of the arguments object.
    pub parameters: serde_json::Value,
}

/// A request to the chat service.
#[derive(Debug, Clone)]
pub struct ChatRequest {
    /// Conversation history, oldest first.
    pub turns: Vec<Turn>,
    /// Tools the model may call.
    pub tools: Vec<ToolSpec>,
    /// Sampling configuration.
    pub config: ModelConfig,
    /// Whether an incremental chunk sequence is preferred over a buffered
    /// response.
    pub stream: bool,
}

/// Capabilities a service reports.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ServiceFeatures {
    /// The service can deliver incremental chunk sequences.
    pub streaming: bool,
    /// The service supports tool calls.
    pub tools: bool,
}

impl Default for ServiceFeatures {
    fn default() -> Self {
        Self {
            streaming: false,
            tools: true,
        }
    }
}

/// A stream of response chunks from the model.
pub type ChunkStream = Pin<Box<dyn Stream<Item = Result<ChatChunk, GenerateError>> + Send>>;

/// A model reply: buffered or incremental.
pub enum ChatFeed {
    /// One complete response.
    Complete(ChatResponse),
    /// A sequence of chunks arriving over time.
    Incremental(ChunkStream),
}

impl std::fmt::Debug for ChatFeed {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Complete(response) => f.debug_tuple("Complete").field(response).finish(),
            Self::Incremental(_) => f.debug_tuple("Incremental").field(&"..").finish(),
        }
    }
}

/// The model/chat transport consumed by the generation controller.
#[async_trait]
pub trait ChatService: Send + Sync {
    /// Service name, for usage records.
    fn name(&self) -> &str;

    /// Model name, for usage records.
    fn model(&self) -> &str;

    /// Capabilities of this service.
    fn features(&self) -> ServiceFeatures {
        ServiceFeatures::default()
    }

    /// Base sampling configuration for this service.
    fn default_config(&self) -> ModelConfig {
        ModelConfig::default()
    }

    /// Sends the conversation and returns the model's reply.
    async fn chat(&self, request: ChatRequest) -> Result<ChatFeed, GenerateError>;
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_merge_function_calls_by_index() {
        let mut calls = Vec::new();
        merge_function_calls(
            &mut calls,
            &[FunctionCallDelta {
                index: 0,
                id: Some("call_1".into()),
                name: Some("search".into()),
                args: Some("{\"q\":".into()),
            }],
        );
        merge_function_calls(
            &mut calls,
            &[FunctionCallDelta {
                index: 0,
                id: None,
                name: None,
                args: Some("\"rust\"}".into()),
            }],
        );

        assert_eq!(calls.len(), 1);
        assert_eq!(calls[0].name, "search");
        assert_eq!(calls[0].args, "{\"q\":\"rust\"}");
    }

    #[test]
    fn test_merge_function_calls_fills_gaps() {
        let mut calls = Vec::new();
        merge_function_calls(
            &mut calls,
            &[FunctionCallDelta {
                index: 1,
                id: Some("call_2".into()),
                name: Some("lookup".into()),
                args: Some("{}".into()),
            }],
        );
        assert_eq!(calls.len(), 2);
        assert_eq!(calls[1].name, "lookup");
    }

    #[test]
    fn test_merge_model_configs() {
        let base = ModelConfig {
            max_tokens: Some(1024),
            temperature: Some(0.7),
            top_p: None,
            stop_sequences: Some(vec!["<END>".into()]),
        };
        let overrides = ModelConfig {
            temperature: Some(0.0),
            ..ModelConfig::default()
        };

        let merged = merge_model_configs(&base, &overrides);
        assert_eq!(merged.max_tokens, Some(1024));
        assert_eq!(merged.temperature, Some(0.0));
        // Stop sequences carry over as a whole when not overridden.
        assert_eq!(merged.stop_sequences, Some(vec!["<END>".to_string()]));
    }
}
