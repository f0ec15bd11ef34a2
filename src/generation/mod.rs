//! Text generation clients.
//!
//! The Ollama adapter calls `/api/chat` with a single user message. Streaming responses arrive
//! as newline-delimited JSON objects; each carries a content fragment until the final object
//! reports `done: true`. The stream is pull-driven: no request is sent until the first poll,
//! and dropping the stream drops the HTTP response.

use crate::config::Config;
use async_stream::try_stream;
use async_trait::async_trait;
use futures_core::Stream;
use futures_util::StreamExt;
use reqwest::{Client, StatusCode};
use serde::Deserialize;
use serde_json::json;
use std::pin::Pin;
use std::time::Duration;
use thiserror::Error;

/// Lazy, finite sequence of generated text fragments.
pub type FragmentStream = Pin<Box<dyn Stream<Item = Result<String, GenerationError>> + Send>>;

/// Errors surfaced while generating completions.
#[derive(Debug, Error)]
pub enum GenerationError {
    /// Provider could not be reached.
    #[error("Generation provider unavailable: {0}")]
    Unavailable(String),
    /// Provider returned an error response.
    #[error("Failed to generate completion: {0}")]
    Failed(String),
    /// Provider response could not be parsed.
    #[error("Malformed provider response: {0}")]
    InvalidResponse(String),
    /// Stream ended before the provider signalled completion.
    #[error("Generation stream interrupted: {0}")]
    Interrupted(String),
}

/// Interface implemented by completion providers.
#[async_trait]
pub trait GenerationClient: Send + Sync {
    /// Identity of the chat model.
    fn model(&self) -> &str;

    /// Generate the whole completion for `prompt`.
    async fn complete(&self, prompt: String) -> Result<String, GenerationError>;

    /// Generate the completion for `prompt` as a stream of fragments.
    fn complete_streaming(&self, prompt: String) -> FragmentStream;
}

/// Chat client backed by a local Ollama runtime.
#[derive(Clone)]
pub struct OllamaChatClient {
    http: Client,
    streaming_http: Client,
    base_url: String,
    model: String,
}

impl OllamaChatClient {
    /// Construct a client for `model` served at `base_url`.
    ///
    /// `timeout` bounds non-streaming calls; streaming calls only bound the connect phase.
    pub fn new(
        base_url: impl Into<String>,
        model: impl Into<String>,
        timeout: Duration,
    ) -> Result<Self, GenerationError> {
        let http = Client::builder()
            .user_agent("pdf-rag/chat")
            .timeout(timeout)
            .build()
            .map_err(|error| GenerationError::Unavailable(error.to_string()))?;
        let streaming_http = Client::builder()
            .user_agent("pdf-rag/chat")
            .connect_timeout(timeout)
            .build()
            .map_err(|error| GenerationError::Unavailable(error.to_string()))?;
        Ok(Self {
            http,
            streaming_http,
            base_url: base_url.into(),
            model: model.into(),
        })
    }

    /// Build a client from the chat settings in `config`.
    pub fn from_config(config: &Config) -> Result<Self, GenerationError> {
        Self::new(
            config.ollama_url.clone(),
            config.chat_model.clone(),
            Duration::from_secs(config.request_timeout_secs),
        )
    }

    fn endpoint(&self) -> String {
        format!("{}/api/chat", self.base_url.trim_end_matches('/'))
    }

    fn payload(&self, prompt: &str, stream: bool) -> serde_json::Value {
        json!({
            "model": self.model,
            "messages": [{ "role": "user", "content": prompt }],
            "stream": stream,
        })
    }
}

#[derive(Debug, Deserialize)]
struct ChatChunk {
    #[serde(default)]
    message: Option<ChatMessage>,
    #[serde(default)]
    done: bool,
    #[serde(default)]
    error: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ChatMessage {
    #[serde(default)]
    content: String,
}

async fn check_status(
    response: reqwest::Response,
    model: &str,
) -> Result<reqwest::Response, GenerationError> {
    if response.status() == StatusCode::NOT_FOUND {
        let body = response.text().await.unwrap_or_default();
        return Err(GenerationError::Failed(format!(
            "model '{model}' not found: {body}"
        )));
    }
    if !response.status().is_success() {
        let status = response.status();
        let body = response.text().await.unwrap_or_default();
        return Err(GenerationError::Failed(format!(
            "Ollama returned {status}: {body}"
        )));
    }
    Ok(response)
}

fn parse_line(line: &[u8]) -> Result<ChatChunk, GenerationError> {
    let chunk: ChatChunk = serde_json::from_slice(line).map_err(|error| {
        GenerationError::InvalidResponse(format!("failed to decode stream line: {error}"))
    })?;
    if let Some(message) = chunk.error.as_deref() {
        return Err(GenerationError::Interrupted(message.to_string()));
    }
    Ok(chunk)
}

#[async_trait]
impl GenerationClient for OllamaChatClient {
    fn model(&self) -> &str {
        &self.model
    }

    async fn complete(&self, prompt: String) -> Result<String, GenerationError> {
        tracing::debug!(model = %self.model, prompt_chars = prompt.len(), "Requesting completion");
        let response = self
            .http
            .post(self.endpoint())
            .json(&self.payload(&prompt, false))
            .send()
            .await
            .map_err(|error| {
                GenerationError::Unavailable(format!(
                    "failed to reach Ollama at {}: {error}",
                    self.base_url
                ))
            })?;
        let response = check_status(response, &self.model).await?;

        let body: ChatChunk = response.json().await.map_err(|error| {
            GenerationError::InvalidResponse(format!("failed to decode Ollama response: {error}"))
        })?;
        if let Some(message) = body.error {
            return Err(GenerationError::Failed(message));
        }
        if !body.done {
            return Err(GenerationError::InvalidResponse(
                "Ollama response incomplete".into(),
            ));
        }

        Ok(body.message.map(|message| message.content).unwrap_or_default())
    }

    fn complete_streaming(&self, prompt: String) -> FragmentStream {
        Box::pin(stream_chat(self.clone(), prompt))
    }
}

fn stream_chat(
    client: OllamaChatClient,
    prompt: String,
) -> impl Stream<Item = Result<String, GenerationError>> + Send {
    try_stream! {
        tracing::debug!(model = %client.model, prompt_chars = prompt.len(), "Requesting streamed completion");
        let response = client
            .streaming_http
            .post(client.endpoint())
            .json(&client.payload(&prompt, true))
            .send()
            .await
            .map_err(|error| {
                GenerationError::Unavailable(format!(
                    "failed to reach Ollama at {}: {error}",
                    client.base_url
                ))
            })?;
        let response = check_status(response, &client.model).await?;

        let mut body = response.bytes_stream();
        let mut buffer: Vec<u8> = Vec::new();
        let mut finished = false;

        'read: while let Some(bytes) = body.next().await {
            let bytes = bytes.map_err(|error| GenerationError::Interrupted(error.to_string()))?;
            buffer.extend_from_slice(&bytes);

            while let Some(newline) = buffer.iter().position(|byte| *byte == b'\n') {
                let line: Vec<u8> = buffer.drain(..=newline).collect();
                let line = line.trim_ascii();
                if line.is_empty() {
                    continue;
                }
                let chunk = parse_line(line)?;
                if let Some(message) = chunk.message
                    && !message.content.is_empty()
                {
                    yield message.content;
                }
                if chunk.done {
                    finished = true;
                    break 'read;
                }
            }
        }

        if !finished {
            let trailing = buffer.trim_ascii();
            if !trailing.is_empty() {
                let chunk = parse_line(trailing)?;
                if let Some(message) = chunk.message
                    && !message.content.is_empty()
                {
                    yield message.content;
                }
                finished = chunk.done;
            }
        }

        if !finished {
            Err::<(), _>(GenerationError::Interrupted(
                "stream closed before completion".to_string(),
            ))?;
        }
    }
}
