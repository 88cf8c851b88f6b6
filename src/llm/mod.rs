//! Model client integration.
//!
//! The gate only needs single-prompt completions, so the surface is one
//! trait (`ModelClient`) and one HTTP implementation speaking the
//! OpenAI-compatible chat-completions protocol.

pub mod chat_completions;
pub mod provider;

pub use chat_completions::ChatCompletionsClient;
pub use provider::ModelClient;

use std::sync::Arc;

use crate::config::ModelConfig;
use crate::error::LlmError;

/// Create the model client from configuration.
pub fn create_client(config: &ModelConfig) -> Result<Arc<dyn ModelClient>, LlmError> {
    let client = ChatCompletionsClient::new(config)?;
    tracing::info!(model = %config.model, url = %config.url, "Using chat-completions endpoint");
    Ok(Arc::new(client))
}
