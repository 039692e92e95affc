use async_trait::async_trait;
use chatstream_core::{ChatError, Conversation, ConversationStore, Result};
use sha2::{Digest, Sha256};
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use tokio::fs;
use tokio::sync::Mutex;
use tracing::{debug, info};

use crate::index::{ConversationIndex, ConversationSummary};

/// File-based conversation storage, one JSON snapshot per conversation
pub struct FileConversationStore {
    base_dir: PathBuf,
    index_lock: Mutex<()>,
}

impl FileConversationStore {
    /// Create a store rooted at `<data_dir>/conversations`
    pub fn new(data_dir: impl AsRef<Path>) -> Self {
        let base_dir = data_dir.as_ref().join("conversations");
        debug!("FileConversationStore initialized: base_dir={:?}", base_dir);

        Self {
            base_dir,
            index_lock: Mutex::new(()),
        }
    }

    pub fn base_dir(&self) -> &Path {
        &self.base_dir
    }

    /// File name for an opaque conversation id: hash prefix + sanitized id
    fn file_key(id: &str) -> String {
        let mut hasher = Sha256::new();
        hasher.update(id.as_bytes());
        let hash = format!("{:x}", hasher.finalize());

        let safe_name = id
            .chars()
            .take(40)
            .map(|c| if c.is_ascii_alphanumeric() || c == '-' || c == '_' {
                c
            } else {
                '_'
            })
            .collect::<String>();

        format!("{}-{}", &hash[..16], safe_name)
    }

    fn conversation_path(&self, id: &str) -> PathBuf {
        self.base_dir.join(format!("{}.json", Self::file_key(id)))
    }

    fn index_path(&self) -> PathBuf {
        self.base_dir.join("index.json")
    }

    async fn ensure_base_dir(&self) -> Result<()> {
        fs::create_dir_all(&self.base_dir)
            .await
            .map_err(|e| ChatError::Persistence(format!("cannot create {:?}: {}", self.base_dir, e)))
    }

    /// Write via a temp file and rename so readers never see a partial snapshot
    async fn write_atomic(path: &Path, contents: &[u8]) -> Result<()> {
        let tmp = path.with_extension("json.tmp");
        fs::write(&tmp, contents)
            .await
            .map_err(|e| ChatError::Persistence(format!("cannot write {:?}: {}", tmp, e)))?;
        fs::rename(&tmp, path)
            .await
            .map_err(|e| ChatError::Persistence(format!("cannot replace {:?}: {}", path, e)))
    }

    async fn write_conversation(&self, conversation: &Conversation) -> Result<()> {
        let json = serde_json::to_vec_pretty(conversation)?;
        Self::write_atomic(&self.conversation_path(&conversation.id), &json).await?;
        self.update_index(conversation).await
    }

    async fn read_index(&self) -> Result<ConversationIndex> {
        match fs::read(self.index_path()).await {
            Ok(bytes) => Ok(serde_json::from_slice(&bytes)?),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(ConversationIndex::new()),
            Err(e) => Err(ChatError::Persistence(format!("cannot read index: {}", e))),
        }
    }

    async fn update_index(&self, conversation: &Conversation) -> Result<()> {
        let _guard = self.index_lock.lock().await;
        let mut index = self.read_index().await?;
        index.update_conversation(conversation);

        let json = serde_json::to_vec_pretty(&index)?;
        Self::write_atomic(&self.index_path(), &json).await
    }

    /// List all conversations known to this store
    pub async fn list_conversations(&self) -> Result<Vec<ConversationSummary>> {
        Ok(self.read_index().await?.conversations)
    }

    /// Delete a conversation snapshot and its index entry
    pub async fn delete_conversation(&self, id: &str) -> Result<()> {
        match fs::remove_file(self.conversation_path(id)).await {
            Ok(()) => {}
            Err(e) if e.kind() == ErrorKind::NotFound => {
                return Err(ChatError::NotFound(id.to_string()));
            }
            Err(e) => return Err(ChatError::Persistence(format!("cannot delete {}: {}", id, e))),
        }

        let _guard = self.index_lock.lock().await;
        let mut index = self.read_index().await?;
        index.remove_conversation(id);
        let json = serde_json::to_vec_pretty(&index)?;
        Self::write_atomic(&self.index_path(), &json).await?;

        info!("Deleted conversation {}", id);
        Ok(())
    }
}

#[async_trait]
impl ConversationStore for FileConversationStore {
    async fn find_by_id(&self, id: &str) -> Result<Conversation> {
        let path = self.conversation_path(id);
        let bytes = match fs::read(&path).await {
            Ok(bytes) => bytes,
            Err(e) if e.kind() == ErrorKind::NotFound => {
                return Err(ChatError::NotFound(id.to_string()));
            }
            Err(e) => return Err(ChatError::Persistence(format!("cannot read {:?}: {}", path, e))),
        };

        let conversation: Conversation = serde_json::from_slice(&bytes)?;
        debug!("Loaded conversation {} with {} messages", id, conversation.messages().len());
        Ok(conversation)
    }

    async fn create(&self, conversation: &Conversation) -> Result<()> {
        self.ensure_base_dir().await?;
        if fs::try_exists(self.conversation_path(&conversation.id))
            .await
            .map_err(|e| ChatError::Persistence(e.to_string()))?
        {
            return Err(ChatError::Persistence(format!(
                "conversation {} already exists",
                conversation.id
            )));
        }

        self.write_conversation(conversation).await?;
        info!("Created new conversation: {}", conversation.id);
        Ok(())
    }

    async fn save(&self, conversation: &Conversation) -> Result<()> {
        self.ensure_base_dir().await?;
        self.write_conversation(conversation).await?;
        debug!("Saved conversation {}", conversation.id);
        Ok(())
    }
}
