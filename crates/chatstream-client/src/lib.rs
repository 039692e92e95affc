use chatstream_config::{ProviderKind, ProviderSettings};
use chatstream_core::{CompletionProvider, Result};
use std::sync::Arc;

pub mod bedrock;
pub mod openai;

pub use bedrock::BedrockProvider;
pub use openai::OpenAiProvider;

/// Construct the completion provider selected by `settings.kind`
pub async fn build_provider(settings: &ProviderSettings) -> Result<Arc<dyn CompletionProvider>> {
    let provider: Arc<dyn CompletionProvider> = match settings.kind {
        ProviderKind::OpenAi => Arc::new(OpenAiProvider::new(settings)?),
        ProviderKind::Bedrock => Arc::new(BedrockProvider::new(settings).await?),
    };
    Ok(provider)
}
