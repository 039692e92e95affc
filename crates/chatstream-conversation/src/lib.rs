pub mod index;
pub mod memory;
pub mod storage;

pub use index::{ConversationIndex, ConversationSummary};
pub use memory::MemoryConversationStore;
pub use storage::FileConversationStore;
