// pair-core/src/errors.rs
use thiserror::Error;

/// Errors raised by the model-interaction engine.
#[derive(Error, Debug)]
pub enum PairError {
    /// The model has no entry in the rate table.
    #[error("Unsupported model: {0}")]
    UnsupportedModel(String),

    /// An image reference could not be decoded into pixel dimensions.
    #[error("Invalid image data: {0}")]
    InvalidImageData(String),

    /// The provider signalled a rate limit.
    #[error("Rate limited by provider: {0}")]
    RateLimited(String),

    /// The provider rejected the request, usually because the context is too large.
    #[error("Request too large or invalid: {0}")]
    RequestTooLarge(String),

    /// Any other failure talking to the provider.
    #[error("Transport error: {0}")]
    Transport(String),

    /// The response was not well-formed JSON.
    #[error("Parse failure: {0}")]
    ParseFailure(String),

    /// The response parsed but does not conform to the schema.
    #[error("Schema validation failure: {0}")]
    SchemaValidationFailure(String),

    /// The caller's validator rejected the value.
    #[error("Semantic validation failure: {0}")]
    SemanticValidationFailure(String),

    /// The extraction retry budget ran out.
    #[error("Extraction failed after {attempts} attempts: {last}")]
    ExtractionExhausted {
        attempts: usize,
        #[source]
        last: Box<PairError>,
    },

    /// Error related to configuration loading or validation.
    #[error("Configuration Error: {0}")]
    Config(String),

    /// Failure reading a project file.
    #[error("I/O error on {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },
}

impl PairError {
    pub fn config(msg: impl Into<String>) -> Self {
        PairError::Config(msg.into())
    }

    /// True for the three failure kinds the extractor recovers from.
    pub fn is_validation(&self) -> bool {
        matches!(
            self,
            PairError::ParseFailure(_)
                | PairError::SchemaValidationFailure(_)
                | PairError::SemanticValidationFailure(_)
        )
    }

    /// True when a later retry by the caller may succeed. The engine itself never retries these.
    pub fn is_retryable(&self) -> bool {
        matches!(self, PairError::RateLimited(_))
    }

    /// Number of attempts behind an exhausted extraction, if this is one.
    pub fn attempts(&self) -> Option<usize> {
        match self {
            PairError::ExtractionExhausted { attempts, .. } => Some(*attempts),
            _ => None,
        }
    }
}

impl From<reqwest::Error> for PairError {
    fn from(e: reqwest::Error) -> Self {
        PairError::Transport(e.to_string())
    }
}

/// Result alias used throughout the engine.
pub type Result<T> = std::result::Result<T, PairError>;
