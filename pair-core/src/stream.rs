// pair-core/src/stream.rs

//! Turns provider fragments into progressive [`CompletionResult`] snapshots.

use crate::errors::{PairError, Result};
use crate::models::chat::ChatMessage;
use crate::providers::{CompletionProvider, CompletionRequest};
use crate::tokens::TokenAccountant;
use futures::{Stream, StreamExt};
use std::pin::Pin;
use std::sync::Arc;
use tracing::{debug, error, info, warn};

/// State of one model interaction, either in progress or final.
#[derive(Debug, Clone, PartialEq)]
pub struct CompletionResult {
    /// Cumulative response text.
    pub text: String,
    /// The fragment that produced this snapshot; empty on the terminal snapshot.
    pub delta: String,
    pub model: String,
    pub temperature: f64,
    /// The exact message list submitted.
    pub inputs: Arc<Vec<ChatMessage>>,
    pub input_tokens: usize,
    /// Only valid once `done` is set.
    pub response_tokens: usize,
    /// Dollars. Only valid once `done` is set.
    pub price: f64,
    pub done: bool,
}

pub type CompletionStream = Pin<Box<dyn Stream<Item = Result<CompletionResult>> + Send>>;

fn log_stream_error(err: PairError) -> PairError {
    match &err {
        PairError::RateLimited(msg) => warn!(error = %msg, "Provider rate limited the stream."),
        PairError::RequestTooLarge(msg) => error!(error = %msg, "Provider rejected the request."),
        other => error!(error = %other, "Completion stream failed."),
    }
    err
}

/// Streams completions and prices them.
#[derive(Clone)]
pub struct StreamConsumer {
    provider: Arc<dyn CompletionProvider>,
    accountant: Arc<TokenAccountant>,
    max_tokens: Option<u32>,
}

impl StreamConsumer {
    pub fn new(provider: Arc<dyn CompletionProvider>, accountant: Arc<TokenAccountant>) -> Self {
        Self {
            provider,
            accountant,
            max_tokens: None,
        }
    }

    pub fn with_max_tokens(mut self, max_tokens: Option<u32>) -> Self {
        self.max_tokens = max_tokens;
        self
    }

    /// Starts a streamed completion over `messages`.
    ///
    /// Nothing is sent until the returned stream is first polled. Each fragment yields a
    /// snapshot; the last snapshot has `done` set with final token and price figures.
    /// Errors end the stream. Dropping the stream cancels the request.
    pub fn completions(
        &self,
        messages: Vec<ChatMessage>,
        model: &str,
        temperature: f64,
    ) -> CompletionStream {
        let provider = Arc::clone(&self.provider);
        let accountant = Arc::clone(&self.accountant);
        let request = CompletionRequest::new(model, messages, temperature)
            .with_max_tokens(self.max_tokens)
            .streaming(true);

        Box::pin(async_stream::try_stream! {
            accountant.rates().get(&request.model)?;
            let input_tokens = accountant.request_tokens(&request.messages)?;
            debug!(
                provider = provider.name(),
                model = %request.model,
                num_messages = request.messages.len(),
                input_tokens,
                "Starting completion stream."
            );

            let mut result = CompletionResult {
                text: String::new(),
                delta: String::new(),
                model: request.model.clone(),
                temperature: request.temperature,
                inputs: Arc::new(request.messages.clone()),
                input_tokens,
                response_tokens: 0,
                price: 0.0,
                done: false,
            };

            let mut fragments = provider.stream(&request).await.map_err(log_stream_error)?;
            while let Some(fragment) = fragments.next().await {
                let fragment = fragment.map_err(log_stream_error)?;
                result.text.push_str(&fragment);
                result.delta = fragment;
                yield result.clone();
            }

            result.delta.clear();
            result.response_tokens = accountant.text_tokens(&result.text);
            result.price = accountant.price(&result.model, result.input_tokens, result.response_tokens)?;
            result.done = true;
            info!(
                model = %result.model,
                input_tokens = result.input_tokens,
                response_tokens = result.response_tokens,
                price = result.price,
                "Completion finished."
            );
            yield result;
        })
    }
}

/// Drains a completion stream and returns its terminal snapshot.
pub async fn finish(mut stream: CompletionStream) -> Result<CompletionResult> {
    let mut last = None;
    while let Some(snapshot) = stream.next().await {
        last = Some(snapshot?);
    }
    last.filter(|r| r.done)
        .ok_or_else(|| PairError::Transport("Completion stream ended without a result".to_string()))
}
