// Generation module
// Chat-style text generation used to justify and extend retrieved segments


pub mod ollama;
pub mod openai;

use std::sync::Arc;

use anyhow::Result;
use async_trait::async_trait;

use crate::config::{Config, GenerationBackend};

pub use ollama::OllamaChat;
pub use openai::OpenAiChat;

/// Produces free-form text from a system and a user prompt.
///
/// No structure is guaranteed in the returned text.
#[async_trait]
pub trait TextGenerator: Send + Sync {
    fn model_name(&self) -> &str;

    async fn generate(&self, system_prompt: &str, user_prompt: &str) -> Result<String>;
}

#[derive(Debug, serde::Serialize)]
struct ChatMessage<'a> {
    role: &'static str,
    content: &'a str,
}

fn chat_messages<'a>(system_prompt: &'a str, user_prompt: &'a str) -> [ChatMessage<'a>; 2] {
    [
        ChatMessage {
            role: "system",
            content: system_prompt,
        },
        ChatMessage {
            role: "user",
            content: user_prompt,
        },
    ]
}

/// Build the generator selected by `config.generation.backend`, or `None`
/// when generation is disabled
#[inline]
pub fn create_generator(config: &Config) -> crate::Result<Option<Arc<dyn TextGenerator>>> {
    match config.generation.backend {
        GenerationBackend::OpenAi => Ok(Some(Arc::new(OpenAiChat::new(config)?))),
        GenerationBackend::Ollama => Ok(Some(Arc::new(OllamaChat::new(config)?))),
        GenerationBackend::Disabled => Ok(None),
    }
}
