//! Turn engine: the core processing loop.
//!
//! One turn runs a bounded number of rounds against the chat backend:
//! 1. Build the request once (tools, transcript, structured output)
//! 2. Send it
//! 3. Append the response to the chat log, which runs any requested tools
//! 4. Repeat while tool results are waiting for the model, up to the cap

pub mod ai_task;
pub mod conversation;

use std::sync::Arc;

use futures::StreamExt;
use serde_json::{json, Map};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use crate::config::ClientSettings;
use crate::conversation::ChatLog;
use crate::provider::codec;
use crate::provider::error::ProviderErrorKind;
use crate::provider::types::{ChatMessage, CompletionRequest, ResponseFormat, Role};
use crate::provider::ChatBackend;
use crate::tools::schema::{self, ParameterSchema, SchemaSerializer, SelectorSerializer};

const JSON_USER_SUFFIX: &str = "\n\nPlease respond in JSON format as specified.";
const JSON_SYSTEM_INSTRUCTION: &str = "You must respond in JSON format as requested.";

/// Failure of a turn, safe to show to the user.
///
/// `Display` never includes provider detail; it is logged instead.
#[derive(Debug, thiserror::Error)]
pub enum TurnError {
    #[error("Sorry, I had a problem talking to the AI service")]
    Provider {
        kind: ProviderErrorKind,
        detail: String,
    },
    #[error("Sorry, I could not update the conversation")]
    Host(#[source] anyhow::Error),
    #[error("The request was cancelled")]
    Cancelled,
}

/// Response schema the final answer must follow.
#[derive(Debug, Clone)]
pub struct StructuredOutput {
    pub name: String,
    pub schema: ParameterSchema,
}

/// Per-engine request settings.
#[derive(Debug, Clone)]
pub struct TurnOptions {
    pub model: String,
    /// Identifies the agent in appended entries.
    pub agent_id: String,
    pub max_tokens: Option<u32>,
    pub temperature: Option<f32>,
    pub top_p: Option<f32>,
    pub max_iterations: usize,
}

impl TurnOptions {
    pub fn new(model: &str, agent_id: &str, settings: &ClientSettings) -> Self {
        Self {
            model: model.into(),
            agent_id: agent_id.into(),
            max_tokens: None,
            temperature: None,
            top_p: None,
            max_iterations: settings.max_tool_iterations,
        }
    }
}

/// Drives turns against one backend. Holds no per-turn state.
pub struct TurnEngine {
    backend: Arc<dyn ChatBackend>,
    options: TurnOptions,
    cancel: Option<CancellationToken>,
}

impl TurnEngine {
    pub fn new(backend: Arc<dyn ChatBackend>, options: TurnOptions) -> Self {
        Self {
            backend,
            options,
            cancel: None,
        }
    }

    /// Abandon turns when `token` fires. Checked between rounds and while a
    /// request is in flight; a round's tool execution always completes.
    pub fn with_cancellation(mut self, token: CancellationToken) -> Self {
        self.cancel = Some(token);
        self
    }

    pub fn options(&self) -> &TurnOptions {
        &self.options
    }

    /// Run one turn, appending the model's replies and tool results to `log`.
    pub async fn run_turn(
        &self,
        log: &mut dyn ChatLog,
        structure: Option<&StructuredOutput>,
    ) -> Result<(), TurnError> {
        let mut request = self.build_request(&*log, structure);
        let max_iterations = self.options.max_iterations;

        for round in 1..=max_iterations {
            if self.is_cancelled() {
                info!(round, "Turn cancelled");
                return Err(TurnError::Cancelled);
            }

            debug!(round, msg_count = request.messages.len(), "Calling chat API");
            let response = self.send(&request).await?;

            let deltas = codec::wire_response_to_entries(response).boxed();
            let appended = log
                .append_delta_stream(&self.options.agent_id, deltas)
                .await
                .map_err(|e| {
                    error!(error = %e, "Failed to append response to chat log");
                    TurnError::Host(e)
                })?;
            request
                .messages
                .extend(appended.iter().filter_map(codec::entry_to_wire));

            if !log.has_unresponded_tool_results() {
                info!(round, conversation_id = log.conversation_id(), "Turn complete");
                return Ok(());
            }
        }

        warn!(iterations = max_iterations, "Hit max tool iterations, stopping turn");
        Ok(())
    }

    fn is_cancelled(&self) -> bool {
        self.cancel.as_ref().is_some_and(|t| t.is_cancelled())
    }

    async fn send(&self, request: &CompletionRequest) -> Result<ChatMessage, TurnError> {
        let call = self.backend.complete(request);
        let result = match &self.cancel {
            Some(token) => tokio::select! {
                _ = token.cancelled() => return Err(TurnError::Cancelled),
                r = call => r,
            },
            None => call.await,
        };

        result.map_err(|e| {
            error!(kind = %e.kind, error = %e.message, "Chat request failed");
            TurnError::Provider {
                kind: e.kind,
                detail: e.message,
            }
        })
    }

    fn build_request(
        &self,
        log: &dyn ChatLog,
        structure: Option<&StructuredOutput>,
    ) -> CompletionRequest {
        let api = log.tool_api();
        let tools = api.map(|a| a.definitions()).filter(|d| !d.is_empty());
        let mut messages = codec::transcript_to_wire(log.content());

        let response_format = structure.map(|s| {
            let serializer: &dyn SchemaSerializer = match api {
                Some(a) => a.serializer(),
                None => &SelectorSerializer,
            };
            let format = schema::format_structured_output(&s.name, &s.schema, serializer);
            ensure_json_mention(&mut messages);
            ResponseFormat::JsonSchema {
                json_schema: format,
            }
        });

        let mut extra_body = Map::new();
        extra_body.insert("enable_thinking".into(), json!(false));

        CompletionRequest {
            model: self.options.model.clone(),
            messages,
            user: Some(log.conversation_id().to_string()),
            tool_choice: tools.as_ref().map(|_| "auto".to_string()),
            tools,
            response_format,
            max_tokens: self.options.max_tokens,
            temperature: self.options.temperature,
            top_p: self.options.top_p,
            extra_body,
        }
    }
}

/// Structured output requires the word "json" somewhere in the prompt.
///
/// When no system or user message mentions it, append an instruction to a
/// trailing user message, or else insert a leading system message.
fn ensure_json_mention(messages: &mut Vec<ChatMessage>) {
    let mentioned = messages.iter().any(|m| {
        matches!(m.role, Role::System | Role::User)
            && m
                .content
                .as_deref()
                .is_some_and(|c| c.to_lowercase().contains("json"))
    });
    if mentioned {
        return;
    }

    if let Some(last) = messages.last_mut().filter(|m| m.role == Role::User) {
        last.content
            .get_or_insert_with(String::new)
            .push_str(JSON_USER_SUFFIX);
    } else {
        messages.insert(0, ChatMessage::system(JSON_SYSTEM_INSTRUCTION));
    }
}
