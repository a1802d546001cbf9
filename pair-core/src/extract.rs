// pair-core/src/extract.rs

//! Schema-constrained extraction with self-correcting retries.

use crate::errors::{PairError, Result};
use crate::models::chat::ChatMessage;
use crate::models::schema::{FieldType, Schema};
use crate::providers::{CompletionProvider, CompletionRequest};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;
use std::sync::Arc;
use tracing::{debug, info, warn};

pub const DEFAULT_RETRY_BOUND: usize = 2;

/// Caller check run on a schema-valid value and the raw response it came from.
pub type Validator<'a, T> =
    &'a (dyn Fn(&T, &str) -> std::result::Result<(), String> + Send + Sync);

/// Project files the model says it needs for the current task.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FileSelection {
    pub filenames: Vec<String>,
}

impl FileSelection {
    pub fn schema() -> Schema {
        Schema::new("FileSelection")
            .with_description("Files to read before answering the user's request.")
            .field(
                "filenames",
                FieldType::array(FieldType::String),
                "Paths exactly as they appear in the project listing.",
            )
    }
}

/// Removes a surrounding markdown code fence, if present.
pub fn strip_code_fence(text: &str) -> &str {
    let trimmed = text.trim();
    let Some(rest) = trimmed.strip_prefix("```") else {
        return trimmed;
    };
    // drop the info string (e.g. "json") on the opening line
    let body = match rest.find('\n') {
        Some(newline) => &rest[newline + 1..],
        None => rest,
    };
    body.strip_suffix("```").unwrap_or(body).trim()
}

pub struct StructuredExtractor {
    provider: Arc<dyn CompletionProvider>,
    model: String,
    temperature: f64,
    retry_bound: usize,
}

impl StructuredExtractor {
    pub fn new(provider: Arc<dyn CompletionProvider>, model: impl Into<String>) -> Self {
        Self {
            provider,
            model: model.into(),
            temperature: 0.0,
            retry_bound: DEFAULT_RETRY_BOUND,
        }
    }

    pub fn with_temperature(mut self, temperature: f64) -> Self {
        self.temperature = temperature;
        self
    }

    /// Number of corrective round-trips after the first attempt.
    pub fn with_retry_bound(mut self, retry_bound: usize) -> Self {
        self.retry_bound = retry_bound;
        self
    }

    pub fn retry_bound(&self) -> usize {
        self.retry_bound
    }

    /// Asks the model for a `T` conforming to `schema`.
    ///
    /// Parse, schema and validator failures are fed back into the conversation as the
    /// rejected assistant reply plus a system message carrying the diagnostic, then the
    /// request is repeated. After `retry_bound + 1` failed attempts the last failure is
    /// returned wrapped in [`PairError::ExtractionExhausted`]. Provider errors are not retried.
    pub async fn extract<T: DeserializeOwned>(
        &self,
        messages: Vec<ChatMessage>,
        schema: &Schema,
        validator: Option<Validator<'_, T>>,
    ) -> Result<T> {
        let mut messages = messages;
        messages.push(ChatMessage::system(schema.instruction()));

        let attempts = self.retry_bound + 1;
        let mut last_error = None;
        for attempt in 1..=attempts {
            debug!(attempt, schema = %schema.name, "Requesting structured completion.");
            let request =
                CompletionRequest::new(self.model.clone(), messages.clone(), self.temperature);
            let reply = self.provider.complete(&request).await?;
            let raw = reply.text();

            match self.check(&raw, schema, validator) {
                Ok(value) => {
                    info!(attempt, schema = %schema.name, "Structured extraction succeeded.");
                    return Ok(value);
                }
                Err(err) if !err.is_validation() => return Err(err),
                Err(err) => {
                    warn!(attempt, error = %err, "Extraction attempt rejected.");
                    debug!(attempt, response = %raw, "Rejected response.");
                    messages.push(reply);
                    messages.push(ChatMessage::system(err.to_string()));
                    last_error = Some(err);
                }
            }
        }

        let last = last_error.unwrap_or_else(|| {
            PairError::ParseFailure("no extraction attempt was made".to_string())
        });
        Err(PairError::ExtractionExhausted {
            attempts,
            last: Box::new(last),
        })
    }

    fn check<T: DeserializeOwned>(
        &self,
        raw: &str,
        schema: &Schema,
        validator: Option<Validator<'_, T>>,
    ) -> Result<T> {
        let json: JsonValue = serde_json::from_str(strip_code_fence(raw))
            .map_err(|e| PairError::ParseFailure(e.to_string()))?;
        schema
            .validate_report(&json)
            .map_err(PairError::SchemaValidationFailure)?;
        let value: T = serde_json::from_value(json)
            .map_err(|e| PairError::SchemaValidationFailure(e.to_string()))?;
        if let Some(validate) = validator {
            validate(&value, raw).map_err(PairError::SemanticValidationFailure)?;
        }
        Ok(value)
    }
}
