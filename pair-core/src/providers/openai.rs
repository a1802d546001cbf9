// pair-core/src/providers/openai.rs
use super::{CompletionProvider, CompletionRequest, FragmentStream};
use crate::errors::{PairError, Result};
use crate::models::chat::{ApiResponse, ChatMessage};
use async_trait::async_trait;
use eventsource_stream::Eventsource;
use futures::StreamExt;
use reqwest::{Client, Response, StatusCode};
use serde::Deserialize;
use tracing::{debug, trace, warn};

pub const DEFAULT_OPENAI_ENDPOINT: &str = "https://api.openai.com/v1/chat/completions";

const DONE_MARKER: &str = "[DONE]";

#[derive(Deserialize)]
struct StreamChunk {
    #[serde(default)]
    choices: Vec<StreamChoice>,
}

#[derive(Deserialize)]
struct StreamChoice {
    #[serde(default)]
    delta: StreamDelta,
}

#[derive(Deserialize, Default)]
struct StreamDelta {
    #[serde(default)]
    content: Option<String>,
}

/// Chat completions over the OpenAI HTTP API.
#[derive(Clone)]
pub struct OpenAiProvider {
    http_client: Client,
    endpoint: String,
    api_key: String,
}

impl OpenAiProvider {
    pub fn new(http_client: Client, endpoint: Option<String>, api_key: String) -> Self {
        let endpoint = endpoint.unwrap_or_else(|| {
            debug!("No endpoint configured, using default: {}", DEFAULT_OPENAI_ENDPOINT);
            DEFAULT_OPENAI_ENDPOINT.to_string()
        });
        if api_key.is_empty() {
            warn!("API key is empty for OpenAI provider. Requests will likely fail.");
        }
        Self {
            http_client,
            endpoint,
            api_key,
        }
    }

    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }

    async fn send(&self, request: &CompletionRequest) -> Result<Response> {
        trace!(
            endpoint = %self.endpoint,
            model = %request.model,
            num_messages = request.messages.len(),
            stream = request.stream,
            "Sending chat completion request."
        );
        let mut builder = self.http_client.post(&self.endpoint).json(request);
        if !self.api_key.is_empty() {
            builder = builder.bearer_auth(&self.api_key);
        }
        let response = builder.send().await?;

        let status = response.status();
        if status.is_success() {
            return Ok(response);
        }
        let body = response.text().await.unwrap_or_default();
        Err(status_error(status, body))
    }
}

/// Maps a non-success HTTP status onto the engine's error taxonomy.
fn status_error(status: StatusCode, body: String) -> PairError {
    match status {
        StatusCode::TOO_MANY_REQUESTS => PairError::RateLimited(body),
        StatusCode::BAD_REQUEST | StatusCode::PAYLOAD_TOO_LARGE => PairError::RequestTooLarge(body),
        other => PairError::Transport(format!("API call failed with status {}: {}", other, body)),
    }
}

/// Extracts the text delta of one SSE data payload, if it carries any.
fn parse_stream_chunk(data: &str) -> Result<Option<String>> {
    let chunk: StreamChunk = serde_json::from_str(data)
        .map_err(|e| PairError::Transport(format!("Malformed stream chunk ({}): {}", e, data)))?;
    Ok(chunk
        .choices
        .into_iter()
        .next()
        .and_then(|choice| choice.delta.content)
        .filter(|content| !content.is_empty()))
}

#[async_trait]
impl CompletionProvider for OpenAiProvider {
    fn name(&self) -> &str {
        "openai"
    }

    async fn complete(&self, request: &CompletionRequest) -> Result<ChatMessage> {
        let request = CompletionRequest {
            stream: false,
            ..request.clone()
        };
        let response = self.send(&request).await?;
        let body = response.text().await?;
        let parsed: ApiResponse = serde_json::from_str(&body).map_err(|e| {
            PairError::Transport(format!("Failed to parse OpenAI response ({}): {}", e, body))
        })?;
        if let Some(usage) = &parsed.usage {
            debug!(
                prompt_tokens = usage.prompt_tokens,
                completion_tokens = usage.completion_tokens,
                "Provider reported usage."
            );
        }
        parsed
            .choices
            .into_iter()
            .next()
            .map(|choice| choice.message)
            .ok_or_else(|| PairError::Transport("API response contained no choices".to_string()))
    }

    async fn stream(&self, request: &CompletionRequest) -> Result<FragmentStream> {
        let request = CompletionRequest {
            stream: true,
            ..request.clone()
        };
        let response = self.send(&request).await?;

        let fragments: FragmentStream = Box::pin(async_stream::try_stream! {
            let mut events = response.bytes_stream().eventsource();
            let mut finished = false;
            while let Some(event) = events.next().await {
                let event = event.map_err(|e| PairError::Transport(e.to_string()))?;
                let data = event.data.trim();
                if data.is_empty() {
                    continue;
                }
                if data == DONE_MARKER {
                    finished = true;
                    break;
                }
                if let Some(fragment) = parse_stream_chunk(data)? {
                    yield fragment;
                }
            }
            if !finished {
                Err::<(), PairError>(PairError::Transport(
                    "Stream ended before the completion signal".to_string(),
                ))?;
            }
        });
        Ok(fragments)
    }
}
