pub mod dto;
pub mod error;
pub mod orchestrator;

pub use dto::{ChatCompletionConfigInput, ChatCompletionInput, ChatCompletionOutput, PartialResult};
pub use error::CompletionError;
pub use orchestrator::CompletionOrchestrator;
