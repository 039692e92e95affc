use chatstream_core::{ChatError, Result};
use serde::{Deserialize, Serialize};
use std::env;
use std::path::{Path, PathBuf};

pub mod env_substitution;

pub use env_substitution::substitute_env_vars;

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AppConfig {
    #[serde(default)]
    pub provider: ProviderSettings,
    #[serde(default)]
    pub chat: ChatSettings,
    #[serde(default)]
    pub storage: StorageSettings,
    #[serde(default)]
    pub stream: StreamSettings,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ProviderKind {
    OpenAi,
    Bedrock,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProviderSettings {
    #[serde(default = "default_provider_kind")]
    pub kind: ProviderKind,
    #[serde(default = "default_base_url")]
    pub base_url: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub api_key: Option<String>,
    #[serde(default = "default_region")]
    pub region: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub profile: Option<String>,
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
}

/// Defaults used when a conversation is created
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChatSettings {
    #[serde(default = "default_model")]
    pub model: String,
    #[serde(default = "default_model_max_tokens")]
    pub model_max_tokens: usize,
    #[serde(default = "default_temperature")]
    pub temperature: f32,
    #[serde(default = "default_top_p")]
    pub top_p: f32,
    #[serde(default = "default_n")]
    pub n: u32,
    #[serde(default)]
    pub stop: Vec<String>,
    #[serde(default = "default_max_tokens")]
    pub max_tokens: u32,
    #[serde(default)]
    pub presence_penalty: f32,
    #[serde(default)]
    pub frequency_penalty: f32,
    #[serde(default = "default_system_message")]
    pub initial_system_message: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StorageSettings {
    #[serde(default = "default_data_dir")]
    pub data_dir: PathBuf,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StreamSettings {
    /// Capacity of the partial result channel
    #[serde(default = "default_buffer")]
    pub buffer: usize,
}

impl AppConfig {
    pub fn from_yaml(path: impl AsRef<Path>) -> Result<Self> {
        let content = std::fs::read_to_string(path.as_ref())
            .map_err(|e| ChatError::ConfigError(format!("Failed to read config file: {}", e)))?;

        Self::from_yaml_str(&content)
    }

    pub fn from_yaml_str(yaml: &str) -> Result<Self> {
        let mut raw: serde_yaml::Value = serde_yaml::from_str(yaml)
            .map_err(|e| ChatError::ConfigError(format!("Failed to parse YAML: {}", e)))?;
        substitute_env_vars(&mut raw)?;

        // An empty document parses as null
        let mut config: AppConfig = if raw.is_null() {
            AppConfig::default()
        } else {
            serde_yaml::from_value(raw)
                .map_err(|e| ChatError::ConfigError(format!("Invalid configuration: {}", e)))?
        };

        config.expand_env_vars();
        config.validate()?;

        Ok(config)
    }

    fn expand_env_vars(&mut self) {
        if let Ok(home_dir) = env::var("HOME_DIR") {
            self.storage.data_dir = PathBuf::from(home_dir).join(".chatstream");
        }
    }

    pub fn validate(&self) -> Result<()> {
        if self.chat.model.is_empty() {
            return Err(ChatError::ConfigError("Model cannot be empty".into()));
        }
        if self.chat.model_max_tokens == 0 {
            return Err(ChatError::ConfigError("Model max tokens must be positive".into()));
        }
        if !(0.0..=2.0).contains(&self.chat.temperature) {
            return Err(ChatError::ConfigError("Temperature must be between 0.0 and 2.0".into()));
        }
        if !(0.0..=1.0).contains(&self.chat.top_p) {
            return Err(ChatError::ConfigError("Top-p must be between 0.0 and 1.0".into()));
        }
        if self.stream.buffer == 0 {
            return Err(ChatError::ConfigError("Stream buffer must be at least 1".into()));
        }
        if self.provider.kind == ProviderKind::Bedrock && self.provider.region.is_empty() {
            return Err(ChatError::ConfigError("AWS region cannot be empty".into()));
        }
        Ok(())
    }
}

impl Default for ProviderSettings {
    fn default() -> Self {
        Self {
            kind: default_provider_kind(),
            base_url: default_base_url(),
            api_key: env::var("OPENAI_API_KEY").ok(),
            region: default_region(),
            profile: None,
            timeout_secs: default_timeout_secs(),
        }
    }
}

impl Default for ChatSettings {
    fn default() -> Self {
        Self {
            model: default_model(),
            model_max_tokens: default_model_max_tokens(),
            temperature: default_temperature(),
            top_p: default_top_p(),
            n: default_n(),
            stop: Vec::new(),
            max_tokens: default_max_tokens(),
            presence_penalty: 0.0,
            frequency_penalty: 0.0,
            initial_system_message: default_system_message(),
        }
    }
}

impl Default for StorageSettings {
    fn default() -> Self {
        Self {
            data_dir: default_data_dir(),
        }
    }
}

impl Default for StreamSettings {
    fn default() -> Self {
        Self {
            buffer: default_buffer(),
        }
    }
}

fn default_provider_kind() -> ProviderKind { ProviderKind::OpenAi }
fn default_base_url() -> String { "https://api.openai.com/v1".to_string() }
fn default_region() -> String { "us-east-1".to_string() }
fn default_timeout_secs() -> u64 { 120 }
fn default_model() -> String { "gpt-4o-mini".to_string() }
fn default_model_max_tokens() -> usize { 16_384 }
fn default_temperature() -> f32 { 0.7 }
fn default_top_p() -> f32 { 1.0 }
fn default_n() -> u32 { 1 }
fn default_max_tokens() -> u32 { 1024 }
fn default_system_message() -> String { "You are a helpful assistant.".to_string() }
fn default_buffer() -> usize { 32 }

fn default_data_dir() -> PathBuf {
    env::var("HOME_DIR")
        .map(PathBuf::from)
        .ok()
        .or_else(dirs::home_dir)
        .unwrap_or_else(|| PathBuf::from("."))
        .join(".chatstream")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_config() {
        let yaml = r#"
provider:
  kind: bedrock
  region: eu-west-1
  profile: dev

chat:
  model: anthropic.claude-3-haiku
  model_max_tokens: 200000
  temperature: 0.5
  stop: ["\n\nHuman:"]
  initial_system_message: You are terse.

stream:
  buffer: 4
"#;

        let config = AppConfig::from_yaml_str(yaml).unwrap();
        assert_eq!(config.provider.kind, ProviderKind::Bedrock);
        assert_eq!(config.provider.region, "eu-west-1");
        assert_eq!(config.chat.model, "anthropic.claude-3-haiku");
        assert_eq!(config.chat.temperature, 0.5);
        assert_eq!(config.chat.top_p, 1.0);
        assert_eq!(config.chat.stop.len(), 1);
        assert_eq!(config.chat.initial_system_message, "You are terse.");
        assert_eq!(config.stream.buffer, 4);
    }

    #[test]
    fn test_validation() {
        let yaml = r#"
provider:
  kind: openai
  api_key: sk-test
chat:
  temperature: 3.5
"#;
        assert!(AppConfig::from_yaml_str(yaml).is_err());

        let yaml = r#"
chat:
  top_p: 1.5
"#;
        assert!(AppConfig::from_yaml_str(yaml).is_err());

        let yaml = r#"
stream:
  buffer: 0
"#;
        assert!(AppConfig::from_yaml_str(yaml).is_err());
    }

    #[test]
    fn test_from_yaml_file() {
        let dir = tempfile::TempDir::new().unwrap();
        let path = dir.path().join("config.yaml");
        std::fs::write(&path, "provider:\n  kind: openai\n  api_key: sk-file\n").unwrap();

        let config = AppConfig::from_yaml(&path).unwrap();
        assert_eq!(config.provider.api_key.as_deref(), Some("sk-file"));
        assert_eq!(config.chat.model, "gpt-4o-mini");

        assert!(AppConfig::from_yaml(dir.path().join("missing.yaml")).is_err());
    }
}
