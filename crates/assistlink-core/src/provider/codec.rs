//! Mapping between transcript entries and wire messages.

use futures::stream::{self, Stream};
use tracing::debug;

use super::arguments;
use super::types::{ChatMessage, FunctionCall, ToolCallMessage};
use crate::conversation::{AssistantDelta, ConversationEntry, ToolCall};

/// Convert one transcript entry to a wire message.
///
/// System and user entries without content carry nothing for the model and
/// yield `None`.
pub fn entry_to_wire(entry: &ConversationEntry) -> Option<ChatMessage> {
    match entry {
        ConversationEntry::ToolResult {
            tool_call_id,
            tool_result,
            ..
        } => Some(ChatMessage::tool_result(tool_call_id, &tool_result.to_string())),
        ConversationEntry::System { content } if !content.is_empty() => {
            Some(ChatMessage::system(content))
        }
        ConversationEntry::User { content } if !content.is_empty() => {
            Some(ChatMessage::user(content))
        }
        ConversationEntry::Assistant {
            content,
            tool_calls,
            ..
        } => {
            if tool_calls.is_empty() {
                return Some(ChatMessage::assistant(content.as_deref()));
            }
            let calls = tool_calls.iter().map(tool_call_to_wire).collect();
            Some(ChatMessage::assistant_with_tool_calls(content.as_deref(), calls))
        }
        ConversationEntry::System { .. } | ConversationEntry::User { .. } => {
            debug!(role = entry.role().as_str(), "Skipping empty entry");
            None
        }
    }
}

/// Convert a transcript, dropping entries with no wire form.
pub fn transcript_to_wire(entries: &[ConversationEntry]) -> Vec<ChatMessage> {
    entries.iter().filter_map(entry_to_wire).collect()
}

fn tool_call_to_wire(call: &ToolCall) -> ToolCallMessage {
    ToolCallMessage {
        id: call.id.clone(),
        call_type: "function".into(),
        function: FunctionCall {
            name: call.tool_name.clone(),
            arguments: call.tool_args.to_string(),
        },
    }
}

fn tool_call_from_wire(call: ToolCallMessage) -> ToolCall {
    ToolCall {
        tool_args: arguments::decode(&call.function.arguments),
        id: call.id,
        tool_name: call.function.name,
    }
}

/// Decode a response message into the delta sequence the chat log appends.
///
/// Always exactly one delta; the sequence shape leaves room for streaming.
pub fn wire_response_to_entries(message: ChatMessage) -> impl Stream<Item = AssistantDelta> {
    let tool_calls = message
        .tool_calls
        .map(|calls| calls.into_iter().map(tool_call_from_wire).collect());

    stream::once(async move {
        AssistantDelta {
            role: message.role,
            content: message.content,
            tool_calls,
        }
    })
}
