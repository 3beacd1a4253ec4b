//! Tool system: trait, registry, and the capability API handed to a turn.
//!
//! Every device-control tool implements the `Tool` trait and registers in a
//! `ToolRegistry`. A `ToolApi` bundles a registry with the schema serializer
//! its tools expect; the turn engine formats its tools once per turn and the
//! chat log dispatches tool calls through it by name.

pub mod home;
pub mod schema;

use std::collections::BTreeMap;
use std::sync::Arc;

use async_trait::async_trait;
use serde_json::Value;
use tracing::{debug, error};

use crate::provider::types::ToolDefinition;
use schema::{ParameterSchema, SchemaSerializer, SelectorSerializer};

/// Host description of one tool, read-only for the duration of a turn.
#[derive(Debug, Clone, PartialEq)]
pub struct ToolSpec {
    pub name: String,
    pub description: Option<String>,
    pub parameters: ParameterSchema,
}

/// Trait that all device-control tools implement.
#[async_trait]
pub trait Tool: Send + Sync {
    /// Unique tool name used in function calls (e.g., "HassTurnOn").
    fn name(&self) -> &str;

    fn description(&self) -> Option<&str> {
        None
    }

    /// Parameter schema, converted to JSON Schema when formatted.
    fn parameters(&self) -> ParameterSchema;

    fn spec(&self) -> ToolSpec {
        ToolSpec {
            name: self.name().to_string(),
            description: self.description().map(str::to_string),
            parameters: self.parameters(),
        }
    }

    /// Execute the tool with decoded arguments.
    async fn execute(&self, args: Value) -> anyhow::Result<Value>;
}

/// Failure to run a requested tool.
#[derive(Debug, thiserror::Error)]
pub enum ToolError {
    #[error("Tool '{0}' not found")]
    NotFound(String),
    #[error(transparent)]
    Failed(#[from] anyhow::Error),
}

impl ToolError {
    /// Short type name reported back to the model.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::NotFound(_) => "ToolNotFound",
            Self::Failed(_) => "ToolExecutionError",
        }
    }
}

/// Registry of tools keyed by name, iterated in name order.
#[derive(Default)]
pub struct ToolRegistry {
    tools: BTreeMap<String, Box<dyn Tool>>,
}

impl ToolRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a tool. Replaces any existing tool with the same name.
    pub fn register(&mut self, tool: Box<dyn Tool>) {
        debug!(tool = tool.name(), "Registered tool");
        self.tools.insert(tool.name().to_string(), tool);
    }

    pub fn get(&self, name: &str) -> Option<&dyn Tool> {
        self.tools.get(name).map(|t| t.as_ref())
    }

    pub fn has(&self, name: &str) -> bool {
        self.tools.contains_key(name)
    }

    /// Execute a tool by name with the given arguments.
    pub async fn execute(&self, name: &str, args: Value) -> Result<Value, ToolError> {
        match self.tools.get(name) {
            Some(tool) => {
                debug!(tool = name, "Executing tool");
                Ok(tool.execute(args).await?)
            }
            None => {
                error!(tool = name, "Tool not found");
                Err(ToolError::NotFound(name.to_string()))
            }
        }
    }

    pub fn specs(&self) -> Vec<ToolSpec> {
        self.tools.values().map(|t| t.spec()).collect()
    }

    pub fn names(&self) -> Vec<&str> {
        self.tools.keys().map(String::as_str).collect()
    }

    pub fn len(&self) -> usize {
        self.tools.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tools.is_empty()
    }
}

/// A capability API: the tools exposed to the model plus the serializer
/// their selector parameters need.
pub struct ToolApi {
    id: String,
    registry: ToolRegistry,
    serializer: Option<Arc<dyn SchemaSerializer>>,
}

impl ToolApi {
    pub fn new(id: &str, registry: ToolRegistry) -> Self {
        Self {
            id: id.into(),
            registry,
            serializer: None,
        }
    }

    /// Use a host-specific serializer instead of [`SelectorSerializer`].
    pub fn with_serializer(mut self, serializer: Arc<dyn SchemaSerializer>) -> Self {
        self.serializer = Some(serializer);
        self
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn registry(&self) -> &ToolRegistry {
        &self.registry
    }

    pub fn serializer(&self) -> &dyn SchemaSerializer {
        match &self.serializer {
            Some(s) => s.as_ref(),
            None => &SelectorSerializer,
        }
    }

    /// Wire definitions for every registered tool.
    pub fn definitions(&self) -> Vec<ToolDefinition> {
        let serializer = self.serializer();
        self.registry
            .specs()
            .iter()
            .map(|spec| schema::format_tool(spec, serializer))
            .collect()
    }

    pub async fn call(&self, name: &str, args: Value) -> Result<Value, ToolError> {
        self.registry.execute(name, args).await
    }
}
