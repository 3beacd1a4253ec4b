//! Conversation agent: the per-utterance entry point.

use std::sync::Arc;

use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

use super::{TurnEngine, TurnError, TurnOptions};
use crate::config::{ClientSettings, ConversationOptions};
use crate::conversation::{ChatLog, ConversationEntry, MemoryChatLog};
use crate::provider::ChatBackend;
use crate::tools::ToolApi;

pub const CONVERSATION_AGENT_ID: &str = "conversation.assistlink";

/// Reply to one user utterance.
#[derive(Debug, Clone, PartialEq)]
pub struct ConversationResult {
    pub response: String,
    pub conversation_id: String,
}

pub struct ConversationAgent {
    engine: TurnEngine,
    prompt: String,
    tool_api: Option<Arc<ToolApi>>,
}

impl ConversationAgent {
    /// `tool_api` is offered to the model only if its id is among the
    /// enabled `llm_apis`.
    pub fn new(
        backend: Arc<dyn ChatBackend>,
        options: &ConversationOptions,
        settings: &ClientSettings,
        tool_api: Option<Arc<ToolApi>>,
    ) -> Self {
        let mut turn = TurnOptions::new(&options.model, CONVERSATION_AGENT_ID, settings);
        turn.max_tokens = options.max_tokens;
        turn.temperature = options.temperature;
        turn.top_p = options.top_p;

        let tool_api = tool_api.filter(|api| options.llm_apis.iter().any(|id| id == api.id()));
        debug!(
            model = %options.model,
            tools = tool_api.is_some(),
            "Initialized conversation agent"
        );

        Self {
            engine: TurnEngine::new(backend, turn),
            prompt: options.effective_prompt().to_string(),
            tool_api,
        }
    }

    pub fn with_cancellation(mut self, token: CancellationToken) -> Self {
        self.engine = self.engine.with_cancellation(token);
        self
    }

    /// Open a conversation log, generating an id when none is given.
    pub fn start(&self, conversation_id: Option<&str>) -> MemoryChatLog {
        let id = conversation_id
            .map(str::to_string)
            .unwrap_or_else(|| uuid::Uuid::new_v4().to_string());
        let log = MemoryChatLog::new(&id);
        match &self.tool_api {
            Some(api) => log.with_tool_api(api.clone()),
            None => log,
        }
    }

    /// Handle one user utterance.
    pub async fn process(
        &self,
        log: &mut MemoryChatLog,
        text: &str,
    ) -> Result<ConversationResult, TurnError> {
        if log.is_empty() {
            log.push(ConversationEntry::system(&self.prompt));
        }
        log.push(ConversationEntry::user(text));
        let start = log.content().len();

        info!(conversation_id = log.conversation_id(), "Processing user message");
        self.engine.run_turn(log, None).await?;

        let response = log.content()[start..]
            .iter()
            .rev()
            .find_map(|e| match e {
                ConversationEntry::Assistant {
                    content: Some(text),
                    ..
                } => Some(text.clone()),
                _ => None,
            })
            .unwrap_or_default();

        Ok(ConversationResult {
            response,
            conversation_id: log.conversation_id().to_string(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::agent::tests::{ping_api, Script, ScriptedBackend};
    use crate::config::{RECOMMENDED_PROMPT, LLM_API_ASSIST};
    use crate::provider::types::Role;

    fn options(llm_apis: &[&str]) -> ConversationOptions {
        ConversationOptions {
            llm_apis: llm_apis.iter().map(|s| s.to_string()).collect(),
            ..ConversationOptions::recommended()
        }
    }

    #[tokio::test]
    async fn test_first_turn_seeds_prompt() {
        let backend = ScriptedBackend::new(Script::Text("The kitchen light is on."));
        let agent = ConversationAgent::new(
            backend.clone(),
            &options(&[]),
            &ClientSettings::default(),
            None,
        );
        let mut log = agent.start(Some("conv-7"));

        let result = agent.process(&mut log, "Is the kitchen light on?").await.unwrap();
        assert_eq!(result.response, "The kitchen light is on.");
        assert_eq!(result.conversation_id, "conv-7");

        let request = &backend.requests()[0];
        assert_eq!(request.messages[0].role, Role::System);
        assert_eq!(request.messages[0].content_as_str(), Some(RECOMMENDED_PROMPT));
        assert_eq!(request.max_tokens, Some(1024));
        assert_eq!(request.temperature, Some(0.7));
    }

    #[tokio::test]
    async fn test_follow_up_does_not_reseed_prompt() {
        let backend = ScriptedBackend::new(Script::Text("ok"));
        let agent = ConversationAgent::new(
            backend.clone(),
            &options(&[]),
            &ClientSettings::default(),
            None,
        );
        let mut log = agent.start(None);
        agent.process(&mut log, "one").await.unwrap();
        agent.process(&mut log, "two").await.unwrap();

        let systems = log
            .content()
            .iter()
            .filter(|e| matches!(e, ConversationEntry::System { .. }))
            .count();
        assert_eq!(systems, 1);
        assert!(!log.conversation_id().is_empty());
    }

    #[tokio::test]
    async fn test_tools_only_when_api_enabled() {
        let backend = ScriptedBackend::new(Script::Text("ok"));
        let disabled = ConversationAgent::new(
            backend.clone(),
            &options(&[]),
            &ClientSettings::default(),
            Some(ping_api()),
        );
        let mut log = disabled.start(None);
        disabled.process(&mut log, "hi").await.unwrap();
        assert!(backend.requests()[0].tools.is_none());

        let backend = ScriptedBackend::new(Script::Text("ok"));
        let enabled = ConversationAgent::new(
            backend.clone(),
            &options(&["test", LLM_API_ASSIST]),
            &ClientSettings::default(),
            Some(ping_api()),
        );
        let mut log = enabled.start(None);
        enabled.process(&mut log, "hi").await.unwrap();
        assert_eq!(backend.requests()[0].tools.as_ref().map(Vec::len), Some(1));
    }

    #[tokio::test]
    async fn test_tool_round_then_reply() {
        let backend = ScriptedBackend::new(Script::ToolThenText("Pinged."));
        let agent = ConversationAgent::new(
            backend.clone(),
            &options(&["test"]),
            &ClientSettings::default(),
            Some(ping_api()),
        );
        let mut log = agent.start(None);
        let result = agent.process(&mut log, "ping").await.unwrap();
        assert_eq!(result.response, "Pinged.");
        assert_eq!(backend.calls(), 2);
    }
}
