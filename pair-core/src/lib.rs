// pair-core/src/lib.rs

#![doc = include_str!("../../README.md")]

pub mod config;
pub mod context;
pub mod errors;
pub mod extract;
pub mod images;
pub mod project;
pub mod providers;
pub mod session;
pub mod stream;
pub mod tokens;

pub mod models {
    pub mod chat;
    pub mod schema;
}

pub use config::PairConfig;
pub use context::{ContextAssembler, FileContent, TurnContext};
pub use errors::{PairError, Result};
pub use extract::{FileSelection, StructuredExtractor};
pub use models::chat::{ChatMessage, ContentPart, ImageDetail, MessageContent, Role};
pub use models::schema::{FieldType, Schema};
pub use providers::openai::OpenAiProvider;
pub use providers::{CompletionProvider, CompletionRequest, FragmentStream};
pub use session::{Session, Turn};
pub use stream::{CompletionResult, CompletionStream, StreamConsumer};
pub use tokens::{RateTable, Rates, TokenAccountant};

pub use async_trait::async_trait;
