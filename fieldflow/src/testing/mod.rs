//! Test support: a scripted chat service.

use async_trait::async_trait;
use parking_lot::Mutex;
use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};

use crate::chat::{
    ChatChunk, ChatFeed, ChatRequest, ChatResponse, ChatResult, ChatResultDelta, ChatService,
    FinishReason, FunctionCall, ModelUsage, ServiceFeatures,
};
use crate::errors::GenerateError;

/// One scripted model reply.
#[derive(Debug, Clone)]
pub enum ScriptedReply {
    /// A buffered text response.
    Text(String),
    /// An incremental response delivered as these text chunks.
    Chunks(Vec<String>),
    /// A buffered response requesting tool calls.
    FunctionCalls(Vec<FunctionCall>),
    /// A length-limited (truncated) response.
    Truncated(String),
}

impl ScriptedReply {
    /// A buffered text reply.
    #[must_use]
    pub fn text(content: impl Into<String>) -> Self {
        Self::Text(content.into())
    }

    /// An incremental reply from string chunks.
    #[must_use]
    pub fn chunks<I, S>(chunks: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self::Chunks(chunks.into_iter().map(Into::into).collect())
    }
}

/// A [`ChatService`] that replays scripted replies in order.
///
/// Each `chat` call consumes the next reply; running out of script is a
/// service error, which keeps runaway retry loops visible in tests.
pub struct MockChatService {
    replies: Mutex<VecDeque<ScriptedReply>>,
    calls: AtomicUsize,
}

impl MockChatService {
    /// Creates a service from scripted replies.
    #[must_use]
    pub fn new(replies: Vec<ScriptedReply>) -> Self {
        Self {
            replies: Mutex::new(replies.into()),
            calls: AtomicUsize::new(0),
        }
    }

    /// Convenience constructor for buffered text replies.
    #[must_use]
    pub fn buffered<I, S>(texts: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self::new(texts.into_iter().map(|t| ScriptedReply::Text(t.into())).collect())
    }

    /// How many chat calls the service has served.
    #[must_use]
    pub fn call_count(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

impl std::fmt::Debug for MockChatService {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MockChatService")
            .field("remaining", &self.replies.lock().len())
            .field("calls", &self.call_count())
            .finish()
    }
}

#[async_trait]
impl ChatService for MockChatService {
    fn name(&self) -> &str {
        "mock"
    }

    fn model(&self) -> &str {
        "scripted-1"
    }

    fn features(&self) -> ServiceFeatures {
        ServiceFeatures {
            streaming: true,
            tools: true,
        }
    }

    async fn chat(&self, _request: ChatRequest) -> Result<ChatFeed, GenerateError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let reply = self
            .replies
            .lock()
            .pop_front()
            .ok_or_else(|| GenerateError::Service("no scripted reply remaining".to_string()))?;

        let usage = ModelUsage {
            prompt_tokens: 10,
            completion_tokens: 5,
            total_tokens: 15,
        };

        match reply {
            ScriptedReply::Text(content) => Ok(ChatFeed::Complete(ChatResponse {
                results: vec![ChatResult {
                    index: 0,
                    content: Some(content),
                    function_calls: Vec::new(),
                    finish_reason: Some(FinishReason::Stop),
                }],
                usage: Some(usage),
            })),
            ScriptedReply::Truncated(content) => Ok(ChatFeed::Complete(ChatResponse {
                results: vec![ChatResult {
                    index: 0,
                    content: Some(content),
                    function_calls: Vec::new(),
                    finish_reason: Some(FinishReason::Length),
                }],
                usage: Some(usage),
            })),
            ScriptedReply::FunctionCalls(calls) => Ok(ChatFeed::Complete(ChatResponse {
                results: vec![ChatResult {
                    index: 0,
                    content: None,
                    function_calls: calls,
                    finish_reason: Some(FinishReason::ToolCalls),
                }],
                usage: Some(usage),
            })),
            ScriptedReply::Chunks(chunks) => {
                let last = chunks.len().saturating_sub(1);
                let items: Vec<Result<ChatChunk, GenerateError>> = chunks
                    .into_iter()
                    .enumerate()
                    .map(|(i, text)| {
                        Ok(ChatChunk {
                            results: vec![ChatResultDelta {
                                index: 0,
                                content: Some(text),
                                function_calls: Vec::new(),
                                finish_reason: (i == last).then_some(FinishReason::Stop),
                            }],
                            usage: (i == last).then_some(usage),
                        })
                    })
                    .collect();
                Ok(ChatFeed::Incremental(Box::pin(futures::stream::iter(items))))
            }
        }
    }
}
