//! AI tasks: one-shot data generation, optionally structured.

use std::sync::Arc;

use serde_json::Value;
use tracing::{debug, error};

use super::{StructuredOutput, TurnEngine, TurnError, TurnOptions};
use crate::config::{AiTaskOptions, ClientSettings};
use crate::conversation::{ChatLog, ConversationEntry, MemoryChatLog};
use crate::provider::ChatBackend;
use crate::tools::schema::ParameterSchema;

pub const AI_TASK_AGENT_ID: &str = "ai_task.assistlink";

#[derive(Debug, thiserror::Error)]
pub enum TaskError {
    #[error(transparent)]
    Turn(#[from] TurnError),
    #[error("Last content in chat log is not an assistant reply")]
    NoReply,
    #[error("The AI service returned an invalid structured response")]
    InvalidJson,
}

/// A data-generation request.
#[derive(Debug, Clone)]
pub struct GenDataTask {
    /// Names the structured-output schema.
    pub name: String,
    pub instructions: String,
    pub structure: Option<ParameterSchema>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct GenDataResult {
    pub conversation_id: String,
    /// Parsed JSON with a structure, the reply text otherwise.
    pub data: Value,
}

pub struct AiTaskAgent {
    engine: TurnEngine,
}

impl AiTaskAgent {
    pub fn new(
        backend: Arc<dyn ChatBackend>,
        options: &AiTaskOptions,
        settings: &ClientSettings,
    ) -> Self {
        let turn = TurnOptions::new(&options.model, AI_TASK_AGENT_ID, settings);
        Self {
            engine: TurnEngine::new(backend, turn),
        }
    }

    pub async fn generate_data(&self, task: &GenDataTask) -> Result<GenDataResult, TaskError> {
        let mut log = MemoryChatLog::new(&uuid::Uuid::new_v4().to_string());
        log.push(ConversationEntry::user(&task.instructions));

        let structure = task.structure.as_ref().map(|schema| StructuredOutput {
            name: task.name.clone(),
            schema: schema.clone(),
        });
        debug!(task = %task.name, structured = structure.is_some(), "Generating data");
        self.engine.run_turn(&mut log, structure.as_ref()).await?;

        let Some(ConversationEntry::Assistant {
            content: Some(text),
            ..
        }) = log.content().last()
        else {
            return Err(TaskError::NoReply);
        };

        let data = if structure.is_some() {
            serde_json::from_str(text).map_err(|e| {
                error!(error = %e, response = %text, "Failed to parse structured response");
                TaskError::InvalidJson
            })?
        } else {
            Value::String(text.clone())
        };

        Ok(GenDataResult {
            conversation_id: log.conversation_id().to_string(),
            data,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::agent::tests::{Script, ScriptedBackend};
    use crate::provider::error::ProviderErrorKind;
    use crate::provider::types::ResponseFormat;
    use crate::tools::schema::Field;
    use serde_json::json;

    fn agent(backend: Arc<ScriptedBackend>) -> AiTaskAgent {
        AiTaskAgent::new(backend, &AiTaskOptions::default(), &ClientSettings::default())
    }

    fn task(structure: Option<ParameterSchema>) -> GenDataTask {
        GenDataTask {
            name: "weather".into(),
            instructions: "Describe the weather".into(),
            structure,
        }
    }

    #[tokio::test]
    async fn test_plain_text_task() {
        let backend = ScriptedBackend::new(Script::Text("Sunny and warm"));
        let result = agent(backend.clone()).generate_data(&task(None)).await.unwrap();
        assert_eq!(result.data, json!("Sunny and warm"));
        assert!(backend.requests()[0].response_format.is_none());
    }

    #[tokio::test]
    async fn test_structured_task() {
        let backend = ScriptedBackend::new(Script::Text(r#"{"summary": "Sunny"}"#));
        let schema = ParameterSchema::Object(vec![Field::required("summary", ParameterSchema::String)]);
        let result = agent(backend.clone())
            .generate_data(&task(Some(schema)))
            .await
            .unwrap();
        assert_eq!(result.data, json!({"summary": "Sunny"}));

        let request = &backend.requests()[0];
        let Some(ResponseFormat::JsonSchema { json_schema }) = &request.response_format else {
            panic!("expected response_format");
        };
        assert_eq!(json_schema.name, "weather");
        assert!(request.messages[0]
            .content_as_str()
            .unwrap()
            .to_lowercase()
            .contains("json"));
    }

    #[tokio::test]
    async fn test_structured_task_rejects_non_json() {
        let backend = ScriptedBackend::new(Script::Text("not json"));
        let schema = ParameterSchema::Object(vec![]);
        let err = agent(backend).generate_data(&task(Some(schema))).await.unwrap_err();
        assert!(matches!(err, TaskError::InvalidJson));
    }

    #[tokio::test]
    async fn test_provider_failure_propagates() {
        let backend = ScriptedBackend::new(Script::Fail(ProviderErrorKind::ServerError));
        let err = agent(backend).generate_data(&task(None)).await.unwrap_err();
        assert!(matches!(
            err,
            TaskError::Turn(TurnError::Provider {
                kind: ProviderErrorKind::ServerError,
                ..
            })
        ));
    }
}
