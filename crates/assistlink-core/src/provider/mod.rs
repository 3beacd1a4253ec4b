//! Remote chat-completion backend.
//!
//! Defines the `ChatBackend` trait the turn engine and connection validator
//! talk to. The `openai` module implements it over HTTP for any endpoint that
//! speaks the OpenAI chat completions protocol; tests substitute scripted
//! backends.

pub mod arguments;
pub mod codec;
pub mod error;
pub mod openai;
pub mod types;

use async_trait::async_trait;

use error::ProviderError;
use types::{ChatMessage, CompletionRequest, ModelInfo};

/// Long-lived handle to a remote chat-completion endpoint.
///
/// Shared read-only across concurrent turns.
#[async_trait]
pub trait ChatBackend: Send + Sync {
    /// Send one non-streaming completion and return `choices[0].message`.
    async fn complete(&self, request: &CompletionRequest) -> Result<ChatMessage, ProviderError>;

    /// List the models the endpoint advertises.
    async fn list_models(&self) -> Result<Vec<ModelInfo>, ProviderError>;
}
