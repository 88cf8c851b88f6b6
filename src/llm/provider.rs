//! Model client trait.

use async_trait::async_trait;

use crate::error::LlmError;

/// A hosted chat model answering one prompt at a time.
///
/// Only the current input is sent; no earlier turns are forwarded.
#[async_trait]
pub trait ModelClient: Send + Sync {
    /// Model identifier, for logs and status lines.
    fn model_name(&self) -> &str;

    /// Send `prompt` as a single user message and return the reply text.
    async fn complete(&self, prompt: &str) -> Result<String, LlmError>;
}
