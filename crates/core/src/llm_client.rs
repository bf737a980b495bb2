use crate::turn::Turn;
use async_openai::{Client, config::OpenAIConfig, error::OpenAIError};
use async_trait::async_trait;
use futures::{Stream, StreamExt};
use serde::Serialize;
use serde_json::Value;
use std::pin::Pin;

#[derive(Debug, thiserror::Error)]
pub enum UpstreamError {
    #[error("Completion request failed: {0}")]
    Api(#[from] OpenAIError),
    #[error("Completion stream failed: {0}")]
    Stream(String),
}

/// Raw chunks of a streamed completion, in upstream order.
pub type DeltaStream = Pin<Box<dyn Stream<Item = Result<Value, UpstreamError>> + Send>>;

/// The streaming multimodal completion service a call is relayed to.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait CompletionClient: Send + Sync {
    /// Opens one streaming completion for the ordered message list, asking
    /// for both text and audio output.
    async fn stream_turn(&self, messages: Vec<Turn>) -> Result<DeltaStream, UpstreamError>;
}

/// Voice and model settings sent with every request.
#[derive(Debug, Clone)]
pub struct CompletionSettings {
    pub model: String,
    pub voice: String,
    pub audio_format: String,
}

#[derive(Serialize)]
struct AudioOutput {
    voice: String,
    format: String,
}

#[derive(Serialize)]
struct StreamOptions {
    include_usage: bool,
}

#[derive(Serialize)]
struct StreamRequest {
    model: String,
    messages: Vec<Turn>,
    modalities: [&'static str; 2],
    audio: AudioOutput,
    stream: bool,
    stream_options: StreamOptions,
}

/// An implementation of `CompletionClient` for any OpenAI-compatible API that
/// supports audio output (e.g. DashScope's compatible mode).
pub struct OpenAICompatibleClient {
    client: Client<OpenAIConfig>,
    settings: CompletionSettings,
}

impl OpenAICompatibleClient {
    /// Creates a new client.
    ///
    /// # Arguments
    ///
    /// * `config` - API key and base URL of the compatible endpoint.
    /// * `settings` - Model, voice and output audio format.
    pub fn new(config: OpenAIConfig, settings: CompletionSettings) -> Self {
        Self {
            client: Client::with_config(config),
            settings,
        }
    }

    fn request(&self, messages: Vec<Turn>) -> StreamRequest {
        StreamRequest {
            model: self.settings.model.clone(),
            messages,
            modalities: ["text", "audio"],
            audio: AudioOutput {
                voice: self.settings.voice.clone(),
                format: self.settings.audio_format.clone(),
            },
            stream: true,
            stream_options: StreamOptions {
                include_usage: true,
            },
        }
    }
}

#[async_trait]
impl CompletionClient for OpenAICompatibleClient {
    async fn stream_turn(&self, messages: Vec<Turn>) -> Result<DeltaStream, UpstreamError> {
        let request = self.request(messages);
        let stream: Pin<Box<dyn Stream<Item = Result<Value, OpenAIError>> + Send>> =
            self.client.chat().create_stream_byot(request).await?;
        Ok(Box::pin(stream.map(|chunk| chunk.map_err(UpstreamError::from))))
    }
}
