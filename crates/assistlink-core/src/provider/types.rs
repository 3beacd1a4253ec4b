//! Wire types for the OpenAI-compatible chat completions protocol.
//!
//! These types define the contract between the turn engine and the remote
//! endpoint. Everything here serializes to exactly what goes over HTTP.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// Role of a wire message.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    System,
    User,
    Assistant,
    Tool,
}

impl Role {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::System => "system",
            Self::User => "user",
            Self::Assistant => "assistant",
            Self::Tool => "tool",
        }
    }
}

/// A single message in a conversation.
///
/// Used both for request messages and for the assistant message returned in
/// `choices[0].message`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChatMessage {
    pub role: Role,
    #[serde(default)]
    pub content: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tool_calls: Option<Vec<ToolCallMessage>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tool_call_id: Option<String>,
}

impl ChatMessage {
    pub fn system(content: &str) -> Self {
        Self {
            role: Role::System,
            content: Some(content.into()),
            tool_calls: None,
            tool_call_id: None,
        }
    }

    pub fn user(content: &str) -> Self {
        Self {
            role: Role::User,
            content: Some(content.into()),
            tool_calls: None,
            tool_call_id: None,
        }
    }

    pub fn assistant(content: Option<&str>) -> Self {
        Self {
            role: Role::Assistant,
            content: content.map(Into::into),
            tool_calls: None,
            tool_call_id: None,
        }
    }

    pub fn assistant_with_tool_calls(
        content: Option<&str>,
        tool_calls: Vec<ToolCallMessage>,
    ) -> Self {
        Self {
            role: Role::Assistant,
            content: content.map(Into::into),
            tool_calls: Some(tool_calls),
            tool_call_id: None,
        }
    }

    pub fn tool_result(tool_call_id: &str, result: &str) -> Self {
        Self {
            role: Role::Tool,
            content: Some(result.into()),
            tool_calls: None,
            tool_call_id: Some(tool_call_id.into()),
        }
    }

    /// Get the content as a string slice, if any.
    pub fn content_as_str(&self) -> Option<&str> {
        self.content.as_deref()
    }
}

/// A tool call embedded in an assistant message.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolCallMessage {
    pub id: String,
    #[serde(rename = "type", default = "function_type")]
    pub call_type: String,
    pub function: FunctionCall,
}

fn function_type() -> String {
    "function".into()
}

/// The function name + raw JSON arguments within a tool call.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FunctionCall {
    pub name: String,
    #[serde(default, deserialize_with = "raw_arguments")]
    pub arguments: String,
}

/// Accept `null` and already-decoded objects as well as the usual string.
fn raw_arguments<'de, D>(deserializer: D) -> Result<String, D::Error>
where
    D: serde::Deserializer<'de>,
{
    Ok(match Option::<Value>::deserialize(deserializer)? {
        None | Some(Value::Null) => String::new(),
        Some(Value::String(s)) => s,
        Some(other) => other.to_string(),
    })
}

/// Tool definition in function-calling format.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolDefinition {
    #[serde(rename = "type")]
    pub def_type: String,
    pub function: FunctionDefinition,
}

/// Function metadata within a tool definition.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FunctionDefinition {
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    pub parameters: Value,
}

/// `response_format` request field.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ResponseFormat {
    JsonSchema { json_schema: JsonSchemaFormat },
}

/// Named, strict JSON Schema for structured output.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JsonSchemaFormat {
    pub name: String,
    pub strict: bool,
    pub schema: Value,
}

/// Body of a `POST /chat/completions` request.
///
/// `extra_body` is flattened into the top-level object, which is how
/// provider-specific flags such as `enable_thinking` reach the endpoint.
#[derive(Debug, Clone, Default, Serialize)]
pub struct CompletionRequest {
    pub model: String,
    pub messages: Vec<ChatMessage>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub user: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tools: Option<Vec<ToolDefinition>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tool_choice: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub response_format: Option<ResponseFormat>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub max_tokens: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub temperature: Option<f32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub top_p: Option<f32>,
    #[serde(flatten)]
    pub extra_body: Map<String, Value>,
}

/// A model advertised by `GET /models`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ModelInfo {
    pub id: String,
    pub name: String,
    pub description: String,
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_chat_message_constructors() {
        let sys = ChatMessage::system("You are helpful.");
        assert_eq!(sys.role, Role::System);
        assert_eq!(sys.content_as_str(), Some("You are helpful."));

        let user = ChatMessage::user("Hello");
        assert_eq!(user.role, Role::User);

        let asst = ChatMessage::assistant(None);
        assert_eq!(asst.role, Role::Assistant);
        assert!(asst.content.is_none());
    }

    #[test]
    fn test_tool_result_message() {
        let msg = ChatMessage::tool_result("call_123", r#"{"ok":true}"#);
        assert_eq!(msg.role, Role::Tool);
        assert_eq!(msg.tool_call_id.as_deref(), Some("call_123"));

        let wire = serde_json::to_value(&msg).unwrap();
        assert_eq!(wire["role"], "tool");
        assert_eq!(wire["tool_call_id"], "call_123");
        assert!(wire.get("tool_calls").is_none());
    }

    #[test]
    fn test_request_flattens_extra_body() {
        let mut extra = Map::new();
        extra.insert("enable_thinking".into(), json!(false));
        let request = CompletionRequest {
            model: "qwen-plus".into(),
            messages: vec![ChatMessage::user("hi")],
            user: Some("conv-1".into()),
            extra_body: extra,
            ..Default::default()
        };

        let wire = serde_json::to_value(&request).unwrap();
        assert_eq!(wire["enable_thinking"], json!(false));
        assert_eq!(wire["user"], "conv-1");
        assert!(wire.get("tools").is_none());
        assert!(wire.get("response_format").is_none());
    }

    #[test]
    fn test_response_format_shape() {
        let format = ResponseFormat::JsonSchema {
            json_schema: JsonSchemaFormat {
                name: "task".into(),
                strict: true,
                schema: json!({"type": "object"}),
            },
        };
        let wire = serde_json::to_value(&format).unwrap();
        assert_eq!(wire["type"], "json_schema");
        assert_eq!(wire["json_schema"]["name"], "task");
        assert_eq!(wire["json_schema"]["strict"], true);
    }

    #[test]
    fn test_deserialize_assistant_with_tool_calls() {
        let raw = json!({
            "role": "assistant",
            "content": null,
            "tool_calls": [{
                "id": "call_1",
                "type": "function",
                "function": {"name": "HassTurnOn", "arguments": "{\"name\":\"kitchen\"}"}
            }]
        });
        let msg: ChatMessage = serde_json::from_value(raw).unwrap();
        assert_eq!(msg.role, Role::Assistant);
        let calls = msg.tool_calls.unwrap();
        assert_eq!(calls[0].function.name, "HassTurnOn");
        assert_eq!(calls[0].call_type, "function");
    }

    #[test]
    fn test_function_call_arguments_null_or_object() {
        let call: FunctionCall =
            serde_json::from_value(json!({"name": "GetLiveContext", "arguments": null})).unwrap();
        assert_eq!(call.arguments, "");

        let call: FunctionCall = serde_json::from_value(json!({"name": "GetLiveContext"})).unwrap();
        assert_eq!(call.arguments, "");

        let call: FunctionCall =
            serde_json::from_value(json!({"name": "HassTurnOn", "arguments": {"name": "den"}}))
                .unwrap();
        assert_eq!(call.arguments, r#"{"name":"den"}"#);
    }
}
