use async_trait::async_trait;
use chatstream_core::{ChatError, Conversation, ConversationStore, Result};
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::Mutex;

/// In-process conversation store. Clones share the same map.
#[derive(Debug, Clone, Default)]
pub struct MemoryConversationStore {
    conversations: Arc<Mutex<HashMap<String, Conversation>>>,
}

impl MemoryConversationStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn len(&self) -> usize {
        self.conversations.lock().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.conversations.lock().await.is_empty()
    }
}

#[async_trait]
impl ConversationStore for MemoryConversationStore {
    async fn find_by_id(&self, id: &str) -> Result<Conversation> {
        let locked = self.conversations.lock().await;
        locked
            .get(id)
            .cloned()
            .ok_or_else(|| ChatError::NotFound(id.to_string()))
    }

    async fn create(&self, conversation: &Conversation) -> Result<()> {
        let mut locked = self.conversations.lock().await;
        if locked.contains_key(&conversation.id) {
            return Err(ChatError::Persistence(format!(
                "conversation {} already exists",
                conversation.id
            )));
        }
        locked.insert(conversation.id.clone(), conversation.clone());
        Ok(())
    }

    async fn save(&self, conversation: &Conversation) -> Result<()> {
        let mut locked = self.conversations.lock().await;
        locked.insert(conversation.id.clone(), conversation.clone());
        Ok(())
    }
}
