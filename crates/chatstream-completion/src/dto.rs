use chatstream_config::ChatSettings;
use chatstream_core::{ChatConfig, Model};
use serde::{Deserialize, Serialize};

/// Configuration applied when a conversation has to be created
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChatCompletionConfigInput {
    pub model: String,
    pub model_max_tokens: usize,
    pub temperature: f32,
    pub top_p: f32,
    pub n: u32,
    pub stop: Vec<String>,
    pub max_tokens: u32,
    pub presence_penalty: f32,
    pub frequency_penalty: f32,
    pub initial_system_message: String,
}

impl ChatCompletionConfigInput {
    pub fn model(&self) -> Model {
        Model::new(self.model.clone(), self.model_max_tokens)
    }

    pub fn chat_config(&self) -> ChatConfig {
        ChatConfig {
            model: self.model(),
            temperature: self.temperature,
            top_p: self.top_p,
            n: self.n,
            stop: self.stop.clone(),
            max_tokens: self.max_tokens,
            presence_penalty: self.presence_penalty,
            frequency_penalty: self.frequency_penalty,
        }
    }
}

impl From<&ChatSettings> for ChatCompletionConfigInput {
    fn from(settings: &ChatSettings) -> Self {
        Self {
            model: settings.model.clone(),
            model_max_tokens: settings.model_max_tokens,
            temperature: settings.temperature,
            top_p: settings.top_p,
            n: settings.n,
            stop: settings.stop.clone(),
            max_tokens: settings.max_tokens,
            presence_penalty: settings.presence_penalty,
            frequency_penalty: settings.frequency_penalty,
            initial_system_message: settings.initial_system_message.clone(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChatCompletionInput {
    /// Empty to start a conversation under a generated id
    pub conversation_id: String,
    pub user_id: String,
    pub user_message: String,
    pub config: ChatCompletionConfigInput,
}

/// Cumulative reply text for one conversation. Sent to the sink after every
/// fragment and returned once the round completes.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PartialResult {
    pub conversation_id: String,
    pub user_id: String,
    pub content: String,
}

pub type ChatCompletionOutput = PartialResult;
