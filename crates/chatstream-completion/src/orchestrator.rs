use chatstream_core::{
    ChatError, CompletionProvider, CompletionRequest, Conversation, ConversationStore, Message,
    MessageRole,
};
use futures::StreamExt;
use std::sync::Arc;
use tokio::sync::mpsc;
use tracing::{debug, info, instrument, warn};
use uuid::Uuid;

use crate::dto::{ChatCompletionInput, ChatCompletionOutput, PartialResult};
use crate::error::CompletionError;

pub type Result<T> = std::result::Result<T, CompletionError>;

/// Runs one chat round: resolve the conversation, stream a completion to the
/// sink, then persist user and assistant turns together.
pub struct CompletionOrchestrator {
    store: Arc<dyn ConversationStore>,
    provider: Arc<dyn CompletionProvider>,
    sink: mpsc::Sender<PartialResult>,
}

impl CompletionOrchestrator {
    pub fn new(
        store: Arc<dyn ConversationStore>,
        provider: Arc<dyn CompletionProvider>,
        sink: mpsc::Sender<PartialResult>,
    ) -> Self {
        Self {
            store,
            provider,
            sink,
        }
    }

    /// Execute one completion round.
    ///
    /// Partial results are sent to the sink after every fragment and the send
    /// waits while the sink is full. The conversation is saved only after the
    /// stream has ended cleanly.
    #[instrument(skip(self, input), fields(conversation_id = %input.conversation_id, user_id = %input.user_id))]
    pub async fn execute(&self, input: ChatCompletionInput) -> Result<ChatCompletionOutput> {
        let mut conversation = self.resolve_conversation(&input).await?;

        let model = conversation.config.model.clone();
        let user_message = Message::new(MessageRole::User, input.user_message, &model)
            .map_err(CompletionError::UserMessage)?;
        conversation
            .add_message(user_message)
            .map_err(CompletionError::AddUserMessage)?;

        let request = CompletionRequest::for_conversation(&conversation);
        let mut stream = self
            .provider
            .stream_completion(request)
            .await
            .map_err(CompletionError::StartCompletion)?;

        let mut full_response = String::new();
        let mut sink_open = true;
        let mut fragments = 0usize;

        while let Some(fragment) = stream.next().await {
            let fragment = fragment.map_err(CompletionError::StreamResponse)?;
            full_response.push_str(&fragment.delta);
            fragments += 1;
            debug!("Fragment {} received ({} bytes)", fragments, fragment.delta.len());

            if sink_open {
                let partial = PartialResult {
                    conversation_id: conversation.id.clone(),
                    user_id: conversation.user_id.clone(),
                    content: full_response.clone(),
                };
                if self.sink.send(partial).await.is_err() {
                    warn!("Partial result receiver dropped, continuing without forwarding");
                    sink_open = false;
                }
            }
        }

        let assistant_message = Message::new(MessageRole::Assistant, full_response.clone(), &model)
            .map_err(CompletionError::AssistantMessage)?;
        conversation
            .add_message(assistant_message)
            .map_err(CompletionError::AddAssistantMessage)?;

        self.store
            .save(&conversation)
            .await
            .map_err(CompletionError::SaveChat)?;

        info!(
            "Completed round for conversation {} ({} fragments, {} messages)",
            conversation.id,
            fragments,
            conversation.messages().len()
        );

        Ok(ChatCompletionOutput {
            conversation_id: conversation.id,
            user_id: conversation.user_id,
            content: full_response,
        })
    }

    async fn resolve_conversation(&self, input: &ChatCompletionInput) -> Result<Conversation> {
        if !input.conversation_id.is_empty() {
            match self.store.find_by_id(&input.conversation_id).await {
                Ok(conversation) => return Ok(conversation),
                Err(ChatError::NotFound(_)) => {
                    debug!("Conversation {} not found, creating it", input.conversation_id);
                }
                Err(e) => return Err(CompletionError::FetchChat(e)),
            }
        }

        let conversation = new_conversation(input).map_err(CompletionError::CreateChat)?;
        self.store
            .create(&conversation)
            .await
            .map_err(CompletionError::PersistNewChat)?;

        info!("Created conversation {} for user {}", conversation.id, conversation.user_id);
        Ok(conversation)
    }
}

fn new_conversation(input: &ChatCompletionInput) -> chatstream_core::Result<Conversation> {
    let id = if input.conversation_id.is_empty() {
        Uuid::new_v4().to_string()
    } else {
        input.conversation_id.clone()
    };

    let config = input.config.chat_config();
    let system_message = Message::new(
        MessageRole::System,
        input.config.initial_system_message.clone(),
        &config.model,
    )?;

    Conversation::new(id, input.user_id.clone(), system_message, config)
}
