// pair-core/src/models/chat.rs
use serde::{Deserialize, Deserializer, Serialize};

/// Who authored a message.
#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    System,
    User,
    Assistant,
}

impl Role {
    pub fn as_str(&self) -> &'static str {
        match self {
            Role::System => "system",
            Role::User => "user",
            Role::Assistant => "assistant",
        }
    }
}

/// Resolution the provider should use when looking at an image.
#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum ImageDetail {
    High,
    Low,
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
pub struct ImageUrl {
    pub url: String,
    pub detail: ImageDetail,
}

/// One typed piece of a multi-part message.
///
/// A text part always carries non-empty text and an image part always carries a
/// non-empty reference; both constructors and deserialization enforce this.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
#[serde(tag = "type", rename_all = "snake_case", try_from = "RawContentPart")]
pub enum ContentPart {
    Text { text: String },
    ImageUrl { image_url: ImageUrl },
}

// Unchecked mirror of ContentPart used only while deserializing.
#[derive(Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
enum RawContentPart {
    Text { text: Option<String> },
    ImageUrl { image_url: Option<ImageUrl> },
}

impl TryFrom<RawContentPart> for ContentPart {
    type Error = String;

    fn try_from(raw: RawContentPart) -> Result<Self, Self::Error> {
        match raw {
            RawContentPart::Text { text } => ContentPart::text(text.unwrap_or_default()),
            RawContentPart::ImageUrl { image_url } => match image_url {
                Some(image_url) => ContentPart::image(image_url.url, image_url.detail),
                None => Err("image_url must be provided when type is \"image_url\"".to_string()),
            },
        }
    }
}

impl ContentPart {
    pub fn text(text: impl Into<String>) -> Result<Self, String> {
        let text = text.into();
        if text.is_empty() {
            return Err("text must be provided when type is \"text\"".to_string());
        }
        Ok(ContentPart::Text { text })
    }

    pub fn image(url: impl Into<String>, detail: ImageDetail) -> Result<Self, String> {
        let url = url.into();
        if url.is_empty() {
            return Err("image_url must be provided when type is \"image_url\"".to_string());
        }
        Ok(ContentPart::ImageUrl {
            image_url: ImageUrl { url, detail },
        })
    }
}

/// Either a plain string or an ordered list of typed parts.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
#[serde(untagged)]
pub enum MessageContent {
    Text(String),
    Parts(Vec<ContentPart>),
}

impl Default for MessageContent {
    fn default() -> Self {
        MessageContent::Text(String::new())
    }
}

/// Replies carrying `"content": null` (or no content at all) read as empty text.
fn null_as_empty_text<'de, D>(deserializer: D) -> Result<MessageContent, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(Option::<MessageContent>::deserialize(deserializer)?.unwrap_or_default())
}

/// Represents a message in the chat history sequence sent to/from the AI.
///
/// Messages are immutable once built; history only ever grows or loses its tail.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
pub struct ChatMessage {
    role: Role,
    #[serde(default, deserialize_with = "null_as_empty_text")]
    content: MessageContent,
}

impl ChatMessage {
    pub fn new(role: Role, text: impl Into<String>) -> Self {
        Self {
            role,
            content: MessageContent::Text(text.into()),
        }
    }

    pub fn system(text: impl Into<String>) -> Self {
        Self::new(Role::System, text)
    }

    pub fn user(text: impl Into<String>) -> Self {
        Self::new(Role::User, text)
    }

    pub fn assistant(text: impl Into<String>) -> Self {
        Self::new(Role::Assistant, text)
    }

    /// Builds a multi-part message. Parts are already validated by their constructors.
    pub fn with_parts(role: Role, parts: Vec<ContentPart>) -> Self {
        Self {
            role,
            content: MessageContent::Parts(parts),
        }
    }

    pub fn role(&self) -> Role {
        self.role
    }

    pub fn content(&self) -> &MessageContent {
        &self.content
    }

    /// The text of a plain message, or the text parts joined by newlines.
    pub fn text(&self) -> String {
        match &self.content {
            MessageContent::Text(text) => text.clone(),
            MessageContent::Parts(parts) => parts
                .iter()
                .filter_map(|part| match part {
                    ContentPart::Text { text } => Some(text.as_str()),
                    ContentPart::ImageUrl { .. } => None,
                })
                .collect::<Vec<_>>()
                .join("\n"),
        }
    }
}

/// Represents one of the choices returned by the AI API.
#[derive(Serialize, Deserialize, Debug, Clone)]
pub struct Choice {
    pub index: u32,
    pub message: ChatMessage,
    #[serde(default)]
    pub finish_reason: Option<String>,
}

/// Token usage reported by the provider.
#[derive(Serialize, Deserialize, Debug, Clone, Default, PartialEq, Eq)]
pub struct Usage {
    pub prompt_tokens: u64,
    pub completion_tokens: u64,
    pub total_tokens: u64,
}

/// Represents the overall structure of the AI API response.
#[derive(Serialize, Deserialize, Debug, Clone)]
pub struct ApiResponse {
    #[serde(default)]
    pub id: String,
    pub choices: Vec<Choice>,
    #[serde(default)]
    pub usage: Option<Usage>,
}
