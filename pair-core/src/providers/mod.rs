// pair-core/src/providers/mod.rs
use crate::errors::Result;
use crate::models::chat::ChatMessage;
use async_trait::async_trait;
use futures::Stream;
use serde::Serialize;
use std::pin::Pin;

/// Incremental text fragments of one streamed completion. The stream ends once the
/// provider signals completion.
pub type FragmentStream = Pin<Box<dyn Stream<Item = Result<String>> + Send>>;

/// One chat-completion request as sent to the provider.
#[derive(Serialize, Debug, Clone, PartialEq)]
pub struct CompletionRequest {
    pub model: String,
    pub messages: Vec<ChatMessage>,
    pub temperature: f64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub max_tokens: Option<u32>,
    pub stream: bool,
}

impl CompletionRequest {
    pub fn new(model: impl Into<String>, messages: Vec<ChatMessage>, temperature: f64) -> Self {
        Self {
            model: model.into(),
            messages,
            temperature,
            max_tokens: None,
            stream: false,
        }
    }

    pub fn with_max_tokens(mut self, max_tokens: Option<u32>) -> Self {
        self.max_tokens = max_tokens;
        self
    }

    pub fn streaming(mut self, stream: bool) -> Self {
        self.stream = stream;
        self
    }
}

/// Adapter to a remote chat-completion service.
#[async_trait]
pub trait CompletionProvider: Send + Sync {
    /// Returns the single assistant message of a non-streaming completion.
    async fn complete(&self, request: &CompletionRequest) -> Result<ChatMessage>;

    /// Starts a streaming completion.
    async fn stream(&self, request: &CompletionRequest) -> Result<FragmentStream>;

    fn name(&self) -> &str;
}

pub mod openai;

#[cfg(test)]
pub(crate) mod scripted;
