use async_trait::async_trait;
use aws_config::Region;
use aws_sdk_bedrockruntime as bedrock;
use aws_sdk_bedrockruntime::types::{
    ContentBlock, ConversationRole, ConverseStreamOutput, InferenceConfiguration, Message,
    SystemContentBlock,
};
use chatstream_config::ProviderSettings;
use chatstream_core::{
    ChatError, ChatMessage, CompletionProvider, CompletionRequest, Fragment, FragmentStream,
    MessageRole, Result,
};
use futures::StreamExt;
use tracing::{debug, info};

pub struct BedrockProvider {
    client: bedrock::Client,
    region: Region,
}

impl BedrockProvider {
    pub async fn new(settings: &ProviderSettings) -> Result<Self> {
        let aws_config = Self::build_aws_config(settings).await;
        let client = bedrock::Client::new(&aws_config);
        let region = aws_config
            .region()
            .cloned()
            .unwrap_or_else(|| Region::new(settings.region.clone()));

        info!("Using Bedrock provider in region {}", region);
        Ok(Self { client, region })
    }

    pub fn region(&self) -> &Region {
        &self.region
    }

    async fn build_aws_config(settings: &ProviderSettings) -> aws_config::SdkConfig {
        let mut config_loader = aws_config::defaults(aws_config::BehaviorVersion::latest())
            .region(Region::new(settings.region.clone()));

        if let Some(profile) = &settings.profile {
            info!("Using AWS profile: {}", profile);
            config_loader = config_loader.profile_name(profile);
        }

        let aws_config = config_loader.load().await;

        debug!("AWS config loaded for region: {}", settings.region);
        aws_config
    }

    /// Split chat history into Bedrock system blocks and conversation turns.
    /// Bedrock requires the first turn to come from the user, so assistant
    /// turns left at the head of a trimmed window are skipped.
    fn build_messages(messages: &[ChatMessage]) -> Result<(Vec<SystemContentBlock>, Vec<Message>)> {
        let mut system = Vec::new();
        let mut turns = Vec::new();

        for message in messages {
            let role = match message.role {
                MessageRole::System => {
                    system.push(SystemContentBlock::Text(message.content.clone()));
                    continue;
                }
                MessageRole::Assistant if turns.is_empty() => {
                    debug!("Skipping leading assistant turn");
                    continue;
                }
                MessageRole::User => ConversationRole::User,
                MessageRole::Assistant => ConversationRole::Assistant,
            };

            let turn = Message::builder()
                .role(role)
                .content(ContentBlock::Text(message.content.clone()))
                .build()
                .map_err(|e| ChatError::Transport(format!("Failed to build message: {e}")))?;
            turns.push(turn);
        }

        Ok((system, turns))
    }

    fn inference_config(request: &CompletionRequest) -> Result<InferenceConfiguration> {
        let max_tokens = i32::try_from(request.max_tokens).map_err(|_| {
            ChatError::Validation(format!(
                "max_tokens {} exceeds what Bedrock accepts",
                request.max_tokens
            ))
        })?;

        let stop_sequences = if request.stop.is_empty() {
            None
        } else {
            Some(request.stop.clone())
        };

        Ok(InferenceConfiguration::builder()
            .max_tokens(max_tokens)
            .temperature(request.temperature)
            .top_p(request.top_p)
            .set_stop_sequences(stop_sequences)
            .build())
    }
}

#[async_trait]
impl CompletionProvider for BedrockProvider {
    async fn stream_completion(&self, request: CompletionRequest) -> Result<FragmentStream> {
        let (system, messages) = Self::build_messages(&request.messages)?;
        let inference_config = Self::inference_config(&request)?;

        if request.presence_penalty != 0.0 || request.frequency_penalty != 0.0 {
            debug!("Bedrock does not support presence/frequency penalties, ignoring them");
        }

        let mut converse_request = self
            .client
            .converse_stream()
            .model_id(&request.model)
            .set_messages(Some(messages))
            .inference_config(inference_config);

        if !system.is_empty() {
            converse_request = converse_request.set_system(Some(system));
        }

        let stream_output = converse_request
            .send()
            .await
            .map_err(|e| ChatError::Transport(format!("Bedrock streaming error: {e}")))?;

        let stream = async_stream::stream! {
            let mut event_stream = stream_output.stream;
            loop {
                match event_stream.recv().await {
                    Ok(Some(ConverseStreamOutput::ContentBlockDelta(event))) => {
                        if let Some(Ok(text)) = event.delta().map(|delta| delta.as_text()) {
                            yield Ok(Fragment::new(text.clone()));
                        }
                    }
                    Ok(Some(ConverseStreamOutput::MessageStop(stop))) => {
                        debug!("Streaming completed with stop reason: {:?}", stop.stop_reason());
                    }
                    Ok(Some(_)) => {}
                    Ok(None) => break,
                    Err(e) => {
                        yield Err(ChatError::Transport(format!("Bedrock stream error: {e}")));
                        break;
                    }
                }
            }
        };

        Ok(stream.boxed())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn message(role: MessageRole, content: &str) -> ChatMessage {
        ChatMessage { role, content: content.to_string() }
    }

    #[test]
    fn test_build_messages_splits_system() {
        let history = vec![
            message(MessageRole::System, "be brief"),
            message(MessageRole::User, "hi"),
            message(MessageRole::Assistant, "hello"),
            message(MessageRole::User, "bye"),
        ];

        let (system, turns) = BedrockProvider::build_messages(&history).unwrap();
        assert_eq!(system.len(), 1);
        assert_eq!(turns.len(), 3);
        assert_eq!(turns[0].role(), &ConversationRole::User);
        assert_eq!(turns[1].role(), &ConversationRole::Assistant);
    }

    #[test]
    fn test_build_messages_skips_leading_assistant() {
        let history = vec![
            message(MessageRole::System, "sys"),
            message(MessageRole::Assistant, "orphaned"),
            message(MessageRole::User, "hi"),
        ];

        let (_, turns) = BedrockProvider::build_messages(&history).unwrap();
        assert_eq!(turns.len(), 1);
        assert_eq!(turns[0].role(), &ConversationRole::User);
    }

    #[test]
    fn test_inference_config() {
        let request = CompletionRequest {
            model: "anthropic.claude-3-haiku".into(),
            messages: vec![],
            max_tokens: 256,
            temperature: 0.3,
            top_p: 0.9,
            stop: vec!["END".into()],
            presence_penalty: 0.0,
            frequency_penalty: 0.0,
        };

        let config = BedrockProvider::inference_config(&request).unwrap();
        assert_eq!(config.max_tokens(), Some(256));
        assert_eq!(config.temperature(), Some(0.3));
        assert_eq!(config.stop_sequences(), &["END".to_string()]);
    }

    #[test]
    fn test_inference_config_rejects_oversized_max_tokens() {
        let request = CompletionRequest {
            model: "anthropic.claude-3-haiku".into(),
            messages: vec![],
            max_tokens: u32::MAX,
            temperature: 0.3,
            top_p: 0.9,
            stop: vec![],
            presence_penalty: 0.0,
            frequency_penalty: 0.0,
        };

        let result = BedrockProvider::inference_config(&request);
        assert!(matches!(result, Err(ChatError::Validation(_))));
    }
}
