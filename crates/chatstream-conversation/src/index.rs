use chatstream_core::{Conversation, ConversationStatus};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Summary of a conversation for listing
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConversationSummary {
    pub id: String,
    pub user_id: String,
    pub model: String,
    pub status: ConversationStatus,
    pub message_count: usize,
    pub token_usage: usize,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl From<&Conversation> for ConversationSummary {
    fn from(conv: &Conversation) -> Self {
        Self {
            id: conv.id.clone(),
            user_id: conv.user_id.clone(),
            model: conv.config.model.name.clone(),
            status: conv.status,
            message_count: conv.messages().len(),
            token_usage: conv.token_usage,
            created_at: conv.created_at,
            updated_at: conv.updated_at,
        }
    }
}

/// Index of all conversations in a store directory
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConversationIndex {
    pub conversations: Vec<ConversationSummary>,
    pub last_updated: DateTime<Utc>,
}

impl Default for ConversationIndex {
    fn default() -> Self {
        Self::new()
    }
}

impl ConversationIndex {
    pub fn new() -> Self {
        Self {
            conversations: Vec::new(),
            last_updated: Utc::now(),
        }
    }

    pub fn update_conversation(&mut self, conv: &Conversation) {
        let summary = ConversationSummary::from(conv);
        if let Some(existing) = self.conversations.iter_mut().find(|c| c.id == conv.id) {
            *existing = summary;
        } else {
            self.conversations.push(summary);
        }
        self.last_updated = Utc::now();
    }

    pub fn remove_conversation(&mut self, id: &str) {
        self.conversations.retain(|c| c.id != id);
        self.last_updated = Utc::now();
    }
}
