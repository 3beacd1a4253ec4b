//! OpenAI-compatible chat completions client.
//!
//! Covers every endpoint exposing `/chat/completions` and `/models`:
//! DashScope compatible mode, OpenAI, OpenRouter, Azure, local gateways.
//! Calls are non-streaming and never retried here; retry policy belongs to
//! the connection validator.

use std::fmt;

use async_trait::async_trait;
use reqwest::Client;
use serde::Deserialize;
use tracing::{debug, warn};

use super::error::{ProviderError, ProviderErrorKind};
use super::types::{ChatMessage, CompletionRequest, ModelInfo};
use super::ChatBackend;
use crate::config::ClientSettings;

/// Client bound to one credential and endpoint.
///
/// Created once at entry setup and shared by every turn.
pub struct OpenAiClient {
    client: Client,
    api_key: String,
    base_url: String,
    settings: ClientSettings,
}

impl OpenAiClient {
    /// Create a client on top of a shared `reqwest::Client`.
    pub fn new(client: Client, api_key: &str, base_url: &str, settings: ClientSettings) -> Self {
        let base_url = base_url.trim().trim_end_matches('/').to_string();
        debug!(base_url = %base_url, "Initialized chat client");
        Self {
            client,
            api_key: api_key.trim().to_string(),
            base_url,
            settings,
        }
    }

    /// Build the shared HTTP transport for `settings`.
    pub fn http_client(settings: &ClientSettings) -> Client {
        Client::builder()
            .timeout(settings.timeout)
            .build()
            .unwrap_or_else(|_| Client::new())
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    pub fn settings(&self) -> &ClientSettings {
        &self.settings
    }

    fn apply_headers(&self, mut builder: reqwest::RequestBuilder) -> reqwest::RequestBuilder {
        builder = builder.bearer_auth(&self.api_key);
        for (name, value) in &self.settings.headers {
            builder = builder.header(name.as_str(), value.as_str());
        }
        builder
    }

    async fn read_body(response: reqwest::Response) -> Result<String, ProviderError> {
        let status = response.status();
        if !status.is_success() {
            // The status alone decides the kind; an unreadable body only loses the message.
            let body = response.text().await.unwrap_or_default();
            let err = status_error(status, body);
            warn!(status = %status, kind = %err.kind, error = %err.message, "Chat API returned an error");
            return Err(err);
        }

        response
            .text()
            .await
            .map_err(|e| ProviderError::from_transport(&e))
    }
}

fn status_error(status: reqwest::StatusCode, body: String) -> ProviderError {
    let message = serde_json::from_str::<ErrorResponse>(&body)
        .map(|e| e.message())
        .unwrap_or(body);
    let kind = ProviderErrorKind::from_status(status);
    if message.trim().is_empty() {
        ProviderError::new(kind, status.to_string())
    } else {
        ProviderError::new(kind, format!("{status}: {message}"))
    }
}

impl fmt::Debug for OpenAiClient {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("OpenAiClient")
            .field("api_key", &"[REDACTED]")
            .field("base_url", &self.base_url)
            .field("settings", &self.settings)
            .finish()
    }
}

// ── Response types ──────────────────────────────────────────────────

#[derive(Deserialize)]
struct CompletionResponse {
    #[serde(default)]
    choices: Vec<Choice>,
}

#[derive(Deserialize)]
struct Choice {
    message: ChatMessage,
    #[serde(default)]
    finish_reason: Option<String>,
}

#[derive(Deserialize)]
struct ModelsResponse {
    #[serde(default)]
    data: Vec<ModelEntry>,
}

#[derive(Deserialize)]
struct ModelEntry {
    id: String,
    #[serde(default)]
    name: Option<String>,
    #[serde(default)]
    description: Option<String>,
}

impl From<ModelEntry> for ModelInfo {
    fn from(entry: ModelEntry) -> Self {
        Self {
            name: entry.name.unwrap_or_else(|| entry.id.clone()),
            description: entry.description.unwrap_or_default(),
            id: entry.id,
        }
    }
}

#[derive(Deserialize)]
#[serde(untagged)]
enum ErrorResponse {
    Single(ErrorBody),
    Multiple(Vec<ErrorBody>),
}

#[derive(Deserialize)]
struct ErrorBody {
    error: ErrorDetail,
}

#[derive(Deserialize)]
struct ErrorDetail {
    message: String,
}

impl ErrorResponse {
    fn message(&self) -> String {
        match self {
            Self::Single(b) => b.error.message.clone(),
            Self::Multiple(v) => v
                .first()
                .map(|b| b.error.message.clone())
                .unwrap_or_else(|| "Unknown error".into()),
        }
    }
}

fn parse_completion(body: &str) -> Result<ChatMessage, ProviderError> {
    let completion: CompletionResponse = serde_json::from_str(body).map_err(|e| {
        ProviderError::new(
            ProviderErrorKind::Unknown,
            format!("Failed to parse chat response: {e}"),
        )
    })?;

    let choice = completion.choices.into_iter().next().ok_or_else(|| {
        ProviderError::new(ProviderErrorKind::Unknown, "Chat API returned no choices")
    })?;

    debug!(
        finish_reason = choice.finish_reason.as_deref().unwrap_or("unknown"),
        tool_calls = choice.message.tool_calls.as_ref().map_or(0, Vec::len),
        "Received chat response"
    );
    Ok(choice.message)
}

fn parse_models(body: &str) -> Result<Vec<ModelInfo>, ProviderError> {
    let models: ModelsResponse = serde_json::from_str(body).map_err(|e| {
        ProviderError::new(
            ProviderErrorKind::Unknown,
            format!("Failed to parse model list: {e}"),
        )
    })?;
    Ok(models.data.into_iter().map(ModelInfo::from).collect())
}

// ── ChatBackend implementation ──────────────────────────────────────

#[async_trait]
impl ChatBackend for OpenAiClient {
    async fn complete(&self, request: &CompletionRequest) -> Result<ChatMessage, ProviderError> {
        let url = format!("{}/chat/completions", self.base_url);
        debug!(
            model = %request.model,
            url = %url,
            msg_count = request.messages.len(),
            tools = request.tools.as_ref().map_or(0, Vec::len),
            "Sending chat completion request"
        );

        let response = self
            .apply_headers(self.client.post(&url))
            .timeout(self.settings.timeout)
            .json(request)
            .send()
            .await
            .map_err(|e| {
                let err = ProviderError::from_transport(&e);
                warn!(kind = %err.kind, error = %err.message, "Chat request failed");
                err
            })?;

        let body = Self::read_body(response).await?;
        parse_completion(&body)
    }

    async fn list_models(&self) -> Result<Vec<ModelInfo>, ProviderError> {
        let url = format!("{}/models", self.base_url);
        debug!(url = %url, "Listing models");

        let response = self
            .apply_headers(self.client.get(&url))
            .timeout(self.settings.validation_timeout)
            .send()
            .await
            .map_err(|e| ProviderError::from_transport(&e))?;

        let body = Self::read_body(response).await?;
        parse_models(&body)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::provider::types::Role;

    fn client(base_url: &str) -> OpenAiClient {
        OpenAiClient::new(
            Client::new(),
            "sk-test-secret-key",
            base_url,
            ClientSettings::default(),
        )
    }

    #[test]
    fn test_base_url_is_trimmed() {
        let c = client("https://api.openai.com/v1/");
        assert_eq!(c.base_url(), "https://api.openai.com/v1");
    }

    #[test]
    fn test_debug_redacts_key() {
        let c = client("http://localhost:8000/v1");
        let printed = format!("{c:?}");
        assert!(!printed.contains("sk-test-secret-key"));
        assert!(printed.contains("[REDACTED]"));
    }

    #[test]
    fn test_parse_completion_with_tool_calls() {
        let body = r#"{
            "id": "chatcmpl-1",
            "choices": [{
                "index": 0,
                "finish_reason": "tool_calls",
                "message": {
                    "role": "assistant",
                    "content": null,
                    "tool_calls": [{
                        "id": "call_abc",
                        "type": "function",
                        "function": {"name": "HassTurnOff", "arguments": "{\"name\": \"kitchen\"}"}
                    }]
                }
            }]
        }"#;
        let msg = parse_completion(body).unwrap();
        assert_eq!(msg.role, Role::Assistant);
        assert!(msg.content.is_none());
        assert_eq!(msg.tool_calls.unwrap()[0].id, "call_abc");
    }

    #[tokio::test]
    async fn test_null_arguments_decode_to_empty_object() {
        use futures::StreamExt;

        let body = r#"{"choices": [{"message": {
            "role": "assistant",
            "content": null,
            "tool_calls": [{
                "id": "call_ctx",
                "type": "function",
                "function": {"name": "GetLiveContext", "arguments": null}
            }]
        }}]}"#;
        let msg = parse_completion(body).unwrap();
        let deltas: Vec<_> = crate::provider::codec::wire_response_to_entries(msg)
            .collect()
            .await;
        let call = &deltas[0].tool_calls.as_ref().unwrap()[0];
        assert_eq!(call.tool_name, "GetLiveContext");
        assert_eq!(call.tool_args, serde_json::json!({}));
    }

    #[test]
    fn test_parse_completion_without_choices() {
        let err = parse_completion(r#"{"choices": []}"#).unwrap_err();
        assert_eq!(err.kind, ProviderErrorKind::Unknown);

        let err = parse_completion("<html>bad gateway</html>").unwrap_err();
        assert_eq!(err.kind, ProviderErrorKind::Unknown);
    }

    #[test]
    fn test_parse_models_falls_back_to_id() {
        let body = r#"{"object": "list", "data": [
            {"id": "qwen-plus"},
            {"id": "qwen-max", "name": "Qwen Max", "description": "Largest"}
        ]}"#;
        let models = parse_models(body).unwrap();
        assert_eq!(models.len(), 2);
        assert_eq!(models[0].name, "qwen-plus");
        assert_eq!(models[0].description, "");
        assert_eq!(models[1].name, "Qwen Max");
    }

    #[test]
    fn test_status_error_classifies_by_status() {
        use reqwest::StatusCode;

        let err = status_error(StatusCode::UNAUTHORIZED, String::new());
        assert_eq!(err.kind, ProviderErrorKind::AuthFailed);
        assert_eq!(err.message, "401 Unauthorized");

        let err = status_error(
            StatusCode::TOO_MANY_REQUESTS,
            r#"{"error": {"message": "slow down"}}"#.into(),
        );
        assert_eq!(err.kind, ProviderErrorKind::RateLimited);
        assert!(err.message.ends_with("slow down"));
    }

    #[test]
    fn test_error_response_message() {
        let single: ErrorResponse =
            serde_json::from_str(r#"{"error": {"message": "Invalid API key"}}"#).unwrap();
        assert_eq!(single.message(), "Invalid API key");

        let multiple: ErrorResponse =
            serde_json::from_str(r#"[{"error": {"message": "quota"}}]"#).unwrap();
        assert_eq!(multiple.message(), "quota");
    }
}
