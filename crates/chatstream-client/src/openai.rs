//! OpenAI-compatible chat completions over server-sent events

use async_trait::async_trait;
use chatstream_config::ProviderSettings;
use chatstream_core::{
    ChatError, CompletionProvider, CompletionRequest, Fragment, FragmentStream, Result,
};
use futures::StreamExt;
use reqwest_eventsource::{retry::Never, Error as EventSourceError, Event, EventSource};
use serde::Deserialize;
use serde_json::{json, Value};
use std::time::Duration;
use tracing::{debug, info};

const DONE_MARKER: &str = "[DONE]";

pub struct OpenAiProvider {
    client: reqwest::Client,
    base_url: String,
    api_key: String,
}

impl std::fmt::Debug for OpenAiProvider {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("OpenAiProvider")
            .field("base_url", &self.base_url)
            .finish()
    }
}

#[derive(Debug, Deserialize)]
struct ChunkResponse {
    #[serde(default)]
    choices: Vec<ChunkChoice>,
}

#[derive(Debug, Deserialize)]
struct ChunkChoice {
    #[serde(default)]
    delta: ChunkDelta,
}

#[derive(Debug, Default, Deserialize)]
struct ChunkDelta {
    #[serde(default)]
    content: Option<String>,
}

impl OpenAiProvider {
    pub fn new(settings: &ProviderSettings) -> Result<Self> {
        let api_key = settings
            .api_key
            .clone()
            .filter(|k| !k.is_empty())
            .ok_or_else(|| ChatError::ConfigError("OpenAI provider requires an api_key".into()))?;

        if !settings.base_url.starts_with("http://") && !settings.base_url.starts_with("https://") {
            return Err(ChatError::ConfigError(
                "Provider base_url must start with http:// or https://".into(),
            ));
        }

        // Only the connect phase is bounded; a streamed body may legitimately run long
        let client = reqwest::Client::builder()
            .connect_timeout(Duration::from_secs(settings.timeout_secs))
            .build()
            .map_err(|e| ChatError::Transport(format!("Failed to build HTTP client: {}", e)))?;

        info!("Using OpenAI-compatible provider at {}", settings.base_url);
        Ok(Self {
            client,
            base_url: settings.base_url.trim_end_matches('/').to_string(),
            api_key,
        })
    }

    fn request_body(request: &CompletionRequest) -> Value {
        let messages: Vec<Value> = request
            .messages
            .iter()
            .map(|m| json!({ "role": m.role.as_str(), "content": m.content }))
            .collect();

        let mut body = json!({
            "model": request.model,
            "messages": messages,
            "max_tokens": request.max_tokens,
            "temperature": request.temperature,
            "top_p": request.top_p,
            "presence_penalty": request.presence_penalty,
            "frequency_penalty": request.frequency_penalty,
            "stream": true,
        });
        if !request.stop.is_empty() {
            body["stop"] = json!(request.stop);
        }
        body
    }
}

/// Decode one SSE `data:` payload. `None` marks the end of the stream.
fn parse_chunk(data: &str) -> Result<Option<Fragment>> {
    if data.trim() == DONE_MARKER {
        return Ok(None);
    }

    let chunk: ChunkResponse = serde_json::from_str(data)?;
    let delta = chunk
        .choices
        .into_iter()
        .next()
        .and_then(|choice| choice.delta.content)
        .unwrap_or_default();
    Ok(Some(Fragment::new(delta)))
}

#[async_trait]
impl CompletionProvider for OpenAiProvider {
    async fn stream_completion(&self, request: CompletionRequest) -> Result<FragmentStream> {
        let url = format!("{}/chat/completions", self.base_url);
        debug!("POST {} with {} messages", url, request.messages.len());

        let builder = self
            .client
            .post(&url)
            .bearer_auth(&self.api_key)
            .json(&Self::request_body(&request));

        let mut source = EventSource::new(builder)
            .map_err(|e| ChatError::Transport(format!("Failed to create event source: {}", e)))?;
        source.set_retry_policy(Box::new(Never));

        // Open the connection up front so request failures surface here
        match source.next().await {
            Some(Ok(Event::Open)) => debug!("SSE connection opened"),
            Some(Ok(Event::Message(msg))) => {
                source.close();
                return Err(ChatError::Transport(format!(
                    "Unexpected event before open: {}",
                    msg.event
                )));
            }
            Some(Err(e)) => {
                source.close();
                return Err(ChatError::Transport(describe_error(e).await));
            }
            None => {
                return Err(ChatError::Transport("Event source closed before opening".into()));
            }
        }

        let stream = async_stream::stream! {
            while let Some(event) = source.next().await {
                match event {
                    Ok(Event::Open) => {}
                    Ok(Event::Message(msg)) => match parse_chunk(&msg.data) {
                        Ok(Some(fragment)) => yield Ok(fragment),
                        Ok(None) => break,
                        Err(e) => {
                            yield Err(ChatError::Transport(format!("Malformed stream chunk: {}", e)));
                            break;
                        }
                    },
                    Err(EventSourceError::StreamEnded) => break,
                    Err(e) => {
                        yield Err(ChatError::Transport(describe_error(e).await));
                        break;
                    }
                }
            }
            source.close();
        };

        Ok(stream.boxed())
    }
}

async fn describe_error(error: EventSourceError) -> String {
    match error {
        EventSourceError::InvalidStatusCode(status, response) => {
            let body = response.text().await.unwrap_or_default();
            format!("HTTP {}: {}", status, body)
        }
        other => other.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chatstream_core::{ChatMessage, MessageRole};

    #[test]
    fn test_parse_chunk() {
        let data = r#"{"id":"x","choices":[{"index":0,"delta":{"content":"He"}}]}"#;
        assert_eq!(parse_chunk(data).unwrap(), Some(Fragment::new("He")));

        let role_only = r#"{"choices":[{"index":0,"delta":{"role":"assistant"}}]}"#;
        assert_eq!(parse_chunk(role_only).unwrap(), Some(Fragment::new("")));

        let usage_only = r#"{"choices":[],"usage":{"total_tokens":3}}"#;
        assert_eq!(parse_chunk(usage_only).unwrap(), Some(Fragment::new("")));

        assert_eq!(parse_chunk("[DONE]").unwrap(), None);
        assert!(parse_chunk("not json").is_err());
    }

    #[test]
    fn test_request_body() {
        let request = CompletionRequest {
            model: "gpt-4o-mini".into(),
            messages: vec![
                ChatMessage { role: MessageRole::System, content: "sys".into() },
                ChatMessage { role: MessageRole::User, content: "hi".into() },
            ],
            max_tokens: 64,
            temperature: 0.5,
            top_p: 1.0,
            stop: vec![],
            presence_penalty: 0.25,
            frequency_penalty: 0.5,
        };

        let body = OpenAiProvider::request_body(&request);
        assert_eq!(body["model"], "gpt-4o-mini");
        assert_eq!(body["stream"], true);
        assert_eq!(body["messages"][0]["role"], "system");
        assert_eq!(body["messages"][1]["content"], "hi");
        assert_eq!(body["frequency_penalty"], 0.5);
        assert!(body.get("stop").is_none());
    }

    #[test]
    fn test_requires_api_key() {
        let settings = ProviderSettings {
            api_key: None,
            ..ProviderSettings::default()
        };
        assert!(OpenAiProvider::new(&settings).is_err());

        let settings = ProviderSettings {
            api_key: Some("sk-test".into()),
            base_url: "ftp://example.com".into(),
            ..ProviderSettings::default()
        };
        assert!(OpenAiProvider::new(&settings).is_err());
    }
}
