use chatstream_core::ChatError;
use thiserror::Error;

/// Failure of one completion round, tagged with the step that failed
#[derive(Error, Debug)]
pub enum CompletionError {
    #[error("error fetching existing chat: {0}")]
    FetchChat(#[source] ChatError),

    #[error("error creating new chat: {0}")]
    CreateChat(#[source] ChatError),

    #[error("error persisting new chat: {0}")]
    PersistNewChat(#[source] ChatError),

    #[error("error creating user message: {0}")]
    UserMessage(#[source] ChatError),

    #[error("error adding user message: {0}")]
    AddUserMessage(#[source] ChatError),

    #[error("error creating chat completion: {0}")]
    StartCompletion(#[source] ChatError),

    #[error("error streaming response: {0}")]
    StreamResponse(#[source] ChatError),

    #[error("error creating assistant message: {0}")]
    AssistantMessage(#[source] ChatError),

    #[error("error adding assistant message: {0}")]
    AddAssistantMessage(#[source] ChatError),

    #[error("error saving chat: {0}")]
    SaveChat(#[source] ChatError),
}

impl CompletionError {
    /// The underlying domain error
    pub fn kind(&self) -> &ChatError {
        match self {
            CompletionError::FetchChat(e)
            | CompletionError::CreateChat(e)
            | CompletionError::PersistNewChat(e)
            | CompletionError::UserMessage(e)
            | CompletionError::AddUserMessage(e)
            | CompletionError::StartCompletion(e)
            | CompletionError::StreamResponse(e)
            | CompletionError::AssistantMessage(e)
            | CompletionError::AddAssistantMessage(e)
            | CompletionError::SaveChat(e) => e,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_prefix_and_kind() {
        let err = CompletionError::FetchChat(ChatError::Persistence("disk on fire".into()));
        assert_eq!(
            err.to_string(),
            "error fetching existing chat: Persistence error: disk on fire"
        );
        assert!(matches!(err.kind(), ChatError::Persistence(_)));
    }
}
