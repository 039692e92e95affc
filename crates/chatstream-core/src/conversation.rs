use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::tokens::estimate_tokens;
use crate::{ChatError, Result};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MessageRole {
    System,
    User,
    Assistant,
}

impl MessageRole {
    pub fn as_str(&self) -> &'static str {
        match self {
            MessageRole::System => "system",
            MessageRole::User => "user",
            MessageRole::Assistant => "assistant",
        }
    }
}

impl std::fmt::Display for MessageRole {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for MessageRole {
    type Err = ChatError;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "system" => Ok(MessageRole::System),
            "user" => Ok(MessageRole::User),
            "assistant" => Ok(MessageRole::Assistant),
            other => Err(ChatError::Validation(format!("invalid role: {other}"))),
        }
    }
}

/// Target model and the size of its context window in tokens
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Model {
    pub name: String,
    pub max_tokens: usize,
}

impl Model {
    pub fn new(name: impl Into<String>, max_tokens: usize) -> Self {
        Self {
            name: name.into(),
            max_tokens,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Message {
    pub id: Uuid,
    pub role: MessageRole,
    pub content: String,
    pub tokens: usize,
    pub model: Model,
    pub created_at: DateTime<Utc>,
}

impl Message {
    /// Create a message, rejecting empty content and content that cannot fit
    /// in the model's context window on its own
    pub fn new(role: MessageRole, content: impl Into<String>, model: &Model) -> Result<Self> {
        let content = content.into();
        if content.is_empty() {
            return Err(ChatError::Validation("content is empty".into()));
        }

        let tokens = estimate_tokens(&content, &model.name);
        if tokens > model.max_tokens {
            return Err(ChatError::Validation(format!(
                "message needs {} tokens but model '{}' allows {}",
                tokens, model.name, model.max_tokens
            )));
        }

        Ok(Self {
            id: Uuid::new_v4(),
            role,
            content,
            tokens,
            model: model.clone(),
            created_at: Utc::now(),
        })
    }
}

/// Sampling parameters fixed at conversation creation
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChatConfig {
    pub model: Model,
    pub temperature: f32,
    pub top_p: f32,
    pub n: u32,
    #[serde(default)]
    pub stop: Vec<String>,
    pub max_tokens: u32,
    pub presence_penalty: f32,
    pub frequency_penalty: f32,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ConversationStatus {
    Active,
    Ended,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Conversation {
    pub id: String,
    pub user_id: String,
    pub status: ConversationStatus,
    pub config: ChatConfig,
    pub token_usage: usize,
    messages: Vec<Message>,
    #[serde(default)]
    erased_messages: Vec<Message>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Conversation {
    /// Start a conversation seeded with its system message
    pub fn new(
        id: impl Into<String>,
        user_id: impl Into<String>,
        system_message: Message,
        config: ChatConfig,
    ) -> Result<Self> {
        let now = Utc::now();
        let mut conversation = Self {
            id: id.into(),
            user_id: user_id.into(),
            status: ConversationStatus::Active,
            config,
            token_usage: 0,
            messages: Vec::new(),
            erased_messages: Vec::new(),
            created_at: now,
            updated_at: now,
        };

        conversation.validate()?;
        conversation.add_message(system_message)?;
        Ok(conversation)
    }

    pub fn validate(&self) -> Result<()> {
        if self.id.is_empty() {
            return Err(ChatError::Validation("conversation id is empty".into()));
        }
        if self.user_id.is_empty() {
            return Err(ChatError::Validation("user id is empty".into()));
        }
        if !(0.0..=2.0).contains(&self.config.temperature) {
            return Err(ChatError::Validation(format!(
                "invalid temperature {}",
                self.config.temperature
            )));
        }
        Ok(())
    }

    pub fn messages(&self) -> &[Message] {
        &self.messages
    }

    /// Messages evicted from the context window, oldest first
    pub fn erased_messages(&self) -> &[Message] {
        &self.erased_messages
    }

    pub fn is_ended(&self) -> bool {
        self.status == ConversationStatus::Ended
    }

    pub fn end(&mut self) {
        self.status = ConversationStatus::Ended;
        self.updated_at = Utc::now();
    }

    /// Append a message, evicting the oldest non-system messages while the
    /// window would overflow. The leading system message always stays.
    pub fn add_message(&mut self, message: Message) -> Result<()> {
        if self.is_ended() {
            return Err(ChatError::Validation(
                "conversation has ended, no more messages allowed".into(),
            ));
        }

        let budget = self.config.model.max_tokens;
        let pinned = self.pinned_tokens();
        if pinned + message.tokens > budget {
            return Err(ChatError::Validation(format!(
                "message needs {} tokens but only {} remain in the context window",
                message.tokens,
                budget.saturating_sub(pinned)
            )));
        }

        while self.token_usage + message.tokens > budget {
            let Some(index) = self.first_evictable() else {
                break;
            };
            let erased = self.messages.remove(index);
            self.erased_messages.push(erased);
            self.refresh_token_usage();
        }

        self.messages.push(message);
        self.refresh_token_usage();
        self.updated_at = Utc::now();
        Ok(())
    }

    /// Tokens held by the leading system message, which is never evicted
    fn pinned_tokens(&self) -> usize {
        match self.messages.first() {
            Some(first) if first.role == MessageRole::System => first.tokens,
            _ => 0,
        }
    }

    fn first_evictable(&self) -> Option<usize> {
        self.messages
            .iter()
            .enumerate()
            .find(|(i, m)| !(*i == 0 && m.role == MessageRole::System))
            .map(|(i, _)| i)
    }

    fn refresh_token_usage(&mut self) {
        self.token_usage = self.messages.iter().map(|m| m.tokens).sum();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config(max_tokens: usize) -> ChatConfig {
        ChatConfig {
            model: Model::new("gpt-4o-mini", max_tokens),
            temperature: 0.7,
            top_p: 1.0,
            n: 1,
            stop: vec![],
            max_tokens: 256,
            presence_penalty: 0.0,
            frequency_penalty: 0.0,
        }
    }

    fn conversation(max_tokens: usize) -> Conversation {
        let config = config(max_tokens);
        let system = Message::new(MessageRole::System, "You are helpful", &config.model).unwrap();
        Conversation::new("c-1", "u-1", system, config).unwrap()
    }

    #[test]
    fn test_new_conversation_starts_with_system_message() {
        let conv = conversation(1000);
        assert_eq!(conv.messages().len(), 1);
        assert_eq!(conv.messages()[0].role, MessageRole::System);
        assert_eq!(conv.status, ConversationStatus::Active);
        assert_eq!(conv.token_usage, conv.messages()[0].tokens);
    }

    #[test]
    fn test_empty_user_id_rejected() {
        let config = config(1000);
        let system = Message::new(MessageRole::System, "sys", &config.model).unwrap();
        let result = Conversation::new("c-1", "", system, config);
        assert!(matches!(result, Err(ChatError::Validation(_))));
    }

    #[test]
    fn test_temperature_out_of_range_rejected() {
        let mut config = config(1000);
        config.temperature = 2.5;
        let system = Message::new(MessageRole::System, "sys", &config.model).unwrap();
        assert!(Conversation::new("c-1", "u-1", system, config).is_err());
    }

    #[test]
    fn test_message_validation() {
        let model = Model::new("gpt-4o-mini", 2);
        assert!(Message::new(MessageRole::User, "", &model).is_err());
        assert!(Message::new(MessageRole::User, "this is far too long", &model).is_err());
        assert!(Message::new(MessageRole::User, "hi", &model).is_ok());
    }

    #[test]
    fn test_role_parsing() {
        assert_eq!("assistant".parse::<MessageRole>().unwrap(), MessageRole::Assistant);
        assert!("tool".parse::<MessageRole>().is_err());
    }

    #[test]
    fn test_eviction_keeps_system_message() {
        // "You are helpful" is 4 tokens, each 8-char message is 2 tokens
        let mut conv = conversation(8);
        let model = conv.config.model.clone();
        conv.add_message(Message::new(MessageRole::User, "aaaaaaaa", &model).unwrap()).unwrap();
        conv.add_message(Message::new(MessageRole::Assistant, "bbbbbbbb", &model).unwrap()).unwrap();
        conv.add_message(Message::new(MessageRole::User, "cccccccc", &model).unwrap()).unwrap();

        let contents: Vec<&str> = conv.messages().iter().map(|m| m.content.as_str()).collect();
        assert_eq!(contents, vec!["You are helpful", "bbbbbbbb", "cccccccc"]);
        assert_eq!(conv.erased_messages().len(), 1);
        assert_eq!(conv.erased_messages()[0].content, "aaaaaaaa");
        assert_eq!(conv.token_usage, 8);
    }

    #[test]
    fn test_message_larger_than_remaining_window_rejected() {
        let mut conv = conversation(6);
        let model = conv.config.model.clone();
        let big = Message::new(MessageRole::User, "aaaaaaaaaaaaaaaaaaaa", &model).unwrap();
        assert!(matches!(conv.add_message(big), Err(ChatError::Validation(_))));
        assert_eq!(conv.messages().len(), 1);
    }

    #[test]
    fn test_rejected_append_leaves_window_untouched() {
        // 4-token system message, 2-token turns, 10-token newcomer in a 12-token window
        let mut conv = conversation(12);
        let model = conv.config.model.clone();
        conv.add_message(Message::new(MessageRole::User, "aaaaaaaa", &model).unwrap()).unwrap();
        conv.add_message(Message::new(MessageRole::Assistant, "bbbbbbbb", &model).unwrap()).unwrap();
        let usage = conv.token_usage;

        let big = Message::new(MessageRole::User, "c".repeat(40), &model).unwrap();
        assert!(matches!(conv.add_message(big), Err(ChatError::Validation(_))));

        assert_eq!(conv.messages().len(), 3);
        assert!(conv.erased_messages().is_empty());
        assert_eq!(conv.token_usage, usage);
    }

    #[test]
    fn test_ended_conversation_rejects_messages() {
        let mut conv = conversation(1000);
        conv.end();
        let model = conv.config.model.clone();
        let msg = Message::new(MessageRole::User, "hi", &model).unwrap();
        assert!(conv.add_message(msg).is_err());
        assert!(conv.is_ended());
    }
}
