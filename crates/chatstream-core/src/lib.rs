use futures::stream::BoxStream;
use serde::{Deserialize, Serialize};
use thiserror::Error;

pub mod conversation;
pub mod tokens;

pub use conversation::{
    ChatConfig, Conversation, ConversationStatus, Message, MessageRole, Model,
};
pub use tokens::estimate_tokens;

#[derive(Error, Debug)]
pub enum ChatError {
    #[error("Conversation not found: {0}")]
    NotFound(String),

    #[error("Validation failed: {0}")]
    Validation(String),

    #[error("Provider error: {0}")]
    Transport(String),

    #[error("Persistence error: {0}")]
    Persistence(String),

    #[error("Configuration error: {0}")]
    ConfigError(String),

    #[error("Serialization error: {0}")]
    SerializationError(#[from] serde_json::Error),
}

impl ChatError {
    pub fn is_not_found(&self) -> bool {
        matches!(self, ChatError::NotFound(_))
    }
}

pub type Result<T> = std::result::Result<T, ChatError>;

/// One `{role, content}` entry of a provider request
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChatMessage {
    pub role: MessageRole,
    pub content: String,
}

impl From<&Message> for ChatMessage {
    fn from(message: &Message) -> Self {
        Self {
            role: message.role,
            content: message.content.clone(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CompletionRequest {
    pub model: String,
    pub messages: Vec<ChatMessage>,
    pub max_tokens: u32,
    pub temperature: f32,
    pub top_p: f32,
    pub stop: Vec<String>,
    pub presence_penalty: f32,
    pub frequency_penalty: f32,
}

impl CompletionRequest {
    /// Build a request carrying every message of `conversation` in order
    pub fn for_conversation(conversation: &Conversation) -> Self {
        let config = &conversation.config;
        Self {
            model: config.model.name.clone(),
            messages: conversation.messages().iter().map(ChatMessage::from).collect(),
            max_tokens: config.max_tokens,
            temperature: config.temperature,
            top_p: config.top_p,
            stop: config.stop.clone(),
            presence_penalty: config.presence_penalty,
            frequency_penalty: config.frequency_penalty,
        }
    }
}

/// One incremental piece of a streamed completion
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Fragment {
    pub delta: String,
}

impl Fragment {
    pub fn new(delta: impl Into<String>) -> Self {
        Self { delta: delta.into() }
    }
}

/// Fragments in receipt order. The stream ending is the clean end-of-stream
/// signal; an `Err` item is a receive failure.
pub type FragmentStream = BoxStream<'static, Result<Fragment>>;

/// Persistence gateway for conversations.
///
/// `find_by_id` must report a miss as [`ChatError::NotFound`] so callers can
/// tell it apart from other failures.
#[async_trait::async_trait]
pub trait ConversationStore: Send + Sync {
    async fn find_by_id(&self, id: &str) -> Result<Conversation>;
    async fn create(&self, conversation: &Conversation) -> Result<()>;
    async fn save(&self, conversation: &Conversation) -> Result<()>;
}

#[async_trait::async_trait]
pub trait CompletionProvider: Send + Sync {
    /// Issue a streaming completion request. Errors building or sending the
    /// request are returned here, errors while receiving come through the stream.
    async fn stream_completion(&self, request: CompletionRequest) -> Result<FragmentStream>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_request_preserves_message_order() {
        let config = ChatConfig {
            model: Model::new("gpt-4o-mini", 1000),
            temperature: 0.2,
            top_p: 0.9,
            n: 1,
            stop: vec!["END".into()],
            max_tokens: 128,
            presence_penalty: 0.1,
            frequency_penalty: 0.3,
        };
        let system = Message::new(MessageRole::System, "be brief", &config.model).unwrap();
        let mut conv = Conversation::new("c-1", "u-1", system, config).unwrap();
        let model = conv.config.model.clone();
        conv.add_message(Message::new(MessageRole::User, "hi", &model).unwrap()).unwrap();

        let request = CompletionRequest::for_conversation(&conv);
        assert_eq!(request.model, "gpt-4o-mini");
        assert_eq!(
            request.messages,
            vec![
                ChatMessage { role: MessageRole::System, content: "be brief".into() },
                ChatMessage { role: MessageRole::User, content: "hi".into() },
            ]
        );
        assert_eq!(request.stop, vec!["END".to_string()]);
        assert_eq!(request.frequency_penalty, 0.3);
        assert_eq!(request.presence_penalty, 0.1);
    }

    #[test]
    fn test_not_found_is_typed() {
        assert!(ChatError::NotFound("x".into()).is_not_found());
        assert!(!ChatError::Persistence("x".into()).is_not_found());
    }
}
