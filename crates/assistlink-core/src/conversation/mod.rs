//! Host-side conversation log.
//!
//! `ConversationEntry` is the neutral transcript representation the turn
//! engine reads and appends to. `ChatLog` is the host interface the engine
//! drives; `MemoryChatLog` is an in-process implementation that executes
//! requested tools through its `ToolApi`.

use std::sync::Arc;

use async_trait::async_trait;
use futures::stream::{BoxStream, StreamExt};
use serde_json::{json, Value};
use tracing::{debug, warn};

use crate::provider::types::Role;
use crate::tools::ToolApi;

/// A tool invocation requested by the model.
#[derive(Debug, Clone, PartialEq)]
pub struct ToolCall {
    /// Provider-assigned, opaque.
    pub id: String,
    pub tool_name: String,
    pub tool_args: Value,
}

/// One entry of the transcript.
#[derive(Debug, Clone, PartialEq)]
pub enum ConversationEntry {
    System {
        content: String,
    },
    User {
        content: String,
    },
    Assistant {
        agent_id: String,
        content: Option<String>,
        tool_calls: Vec<ToolCall>,
    },
    ToolResult {
        agent_id: String,
        tool_call_id: String,
        tool_name: String,
        tool_result: Value,
    },
}

impl ConversationEntry {
    pub fn system(content: &str) -> Self {
        Self::System {
            content: content.into(),
        }
    }

    pub fn user(content: &str) -> Self {
        Self::User {
            content: content.into(),
        }
    }

    pub fn role(&self) -> Role {
        match self {
            Self::System { .. } => Role::System,
            Self::User { .. } => Role::User,
            Self::Assistant { .. } => Role::Assistant,
            Self::ToolResult { .. } => Role::Tool,
        }
    }

    /// Free-text content, if the entry has any.
    pub fn content(&self) -> Option<&str> {
        match self {
            Self::System { content } | Self::User { content } => Some(content),
            Self::Assistant { content, .. } => content.as_deref(),
            Self::ToolResult { .. } => None,
        }
    }
}

/// Incremental assistant content produced from one model response.
#[derive(Debug, Clone, PartialEq)]
pub struct AssistantDelta {
    pub role: Role,
    pub content: Option<String>,
    pub tool_calls: Option<Vec<ToolCall>>,
}

/// Host transcript interface driven by the turn engine.
#[async_trait]
pub trait ChatLog: Send {
    fn conversation_id(&self) -> &str;

    fn content(&self) -> &[ConversationEntry];

    /// Capability API whose tools are offered to the model, if any.
    fn tool_api(&self) -> Option<&ToolApi>;

    /// Append assistant deltas, run any tool calls they carry, and return
    /// every entry appended (assistant entries and tool results, in order).
    async fn append_delta_stream(
        &mut self,
        agent_id: &str,
        deltas: BoxStream<'static, AssistantDelta>,
    ) -> anyhow::Result<Vec<ConversationEntry>>;

    /// Whether tool results exist that the model has not answered yet.
    fn has_unresponded_tool_results(&self) -> bool;
}

/// In-memory transcript for one conversation.
pub struct MemoryChatLog {
    conversation_id: String,
    entries: Vec<ConversationEntry>,
    tool_api: Option<Arc<ToolApi>>,
}

impl MemoryChatLog {
    pub fn new(conversation_id: &str) -> Self {
        Self {
            conversation_id: conversation_id.into(),
            entries: Vec::new(),
            tool_api: None,
        }
    }

    pub fn with_tool_api(mut self, api: Arc<ToolApi>) -> Self {
        self.tool_api = Some(api);
        self
    }

    pub fn push(&mut self, entry: ConversationEntry) {
        self.entries.push(entry);
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Text of the most recent assistant entry that has content.
    pub fn last_assistant_text(&self) -> Option<&str> {
        self.entries.iter().rev().find_map(|e| match e {
            ConversationEntry::Assistant {
                content: Some(text),
                ..
            } => Some(text.as_str()),
            _ => None,
        })
    }

    async fn run_tool(&self, call: &ToolCall) -> Value {
        let Some(api) = &self.tool_api else {
            warn!(tool = %call.tool_name, "Tool requested but no tool API is enabled");
            return json!({
                "error": "ToolNotAvailable",
                "error_text": "No tools are enabled for this conversation",
            });
        };

        match api.call(&call.tool_name, call.tool_args.clone()).await {
            Ok(result) => result,
            Err(e) => {
                warn!(tool = %call.tool_name, error = %e, "Tool call failed");
                json!({"error": e.kind(), "error_text": e.to_string()})
            }
        }
    }
}

#[async_trait]
impl ChatLog for MemoryChatLog {
    fn conversation_id(&self) -> &str {
        &self.conversation_id
    }

    fn content(&self) -> &[ConversationEntry] {
        &self.entries
    }

    fn tool_api(&self) -> Option<&ToolApi> {
        self.tool_api.as_deref()
    }

    async fn append_delta_stream(
        &mut self,
        agent_id: &str,
        mut deltas: BoxStream<'static, AssistantDelta>,
    ) -> anyhow::Result<Vec<ConversationEntry>> {
        let mut appended = Vec::new();

        while let Some(delta) = deltas.next().await {
            if delta.role != Role::Assistant {
                anyhow::bail!("Unexpected {} delta in assistant stream", delta.role.as_str());
            }

            let tool_calls = delta.tool_calls.unwrap_or_default();
            let entry = ConversationEntry::Assistant {
                agent_id: agent_id.to_string(),
                content: delta.content,
                tool_calls: tool_calls.clone(),
            };
            self.entries.push(entry.clone());
            appended.push(entry);

            for call in &tool_calls {
                debug!(tool = %call.tool_name, id = %call.id, "Running tool call");
                let tool_result = self.run_tool(call).await;
                let entry = ConversationEntry::ToolResult {
                    agent_id: agent_id.to_string(),
                    tool_call_id: call.id.clone(),
                    tool_name: call.tool_name.clone(),
                    tool_result,
                };
                self.entries.push(entry.clone());
                appended.push(entry);
            }
        }

        Ok(appended)
    }

    fn has_unresponded_tool_results(&self) -> bool {
        matches!(self.entries.last(), Some(ConversationEntry::ToolResult { .. }))
    }
}
