//! Built-in `assist` capability API over an in-memory entity table.
//!
//! Exposes the device-control intents a voice assistant needs: list what is
//! in the home, turn things on, turn things off.

use std::collections::BTreeMap;
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use serde_json::{json, Value};
use tracing::info;

use super::schema::{Field, ParameterSchema};
use super::{Tool, ToolApi, ToolRegistry};
use crate::config::{EntityConfig, HomeConfig, LLM_API_ASSIST};

/// Shared entity table keyed by entity id.
#[derive(Debug, Clone, Default)]
pub struct HomeState {
    entities: Arc<Mutex<BTreeMap<String, EntityConfig>>>,
}

impl HomeState {
    pub fn from_config(config: &HomeConfig) -> Self {
        let entities = config
            .entities
            .iter()
            .map(|e| (e.entity_id.clone(), e.clone()))
            .collect();
        Self {
            entities: Arc::new(Mutex::new(entities)),
        }
    }

    pub fn snapshot(&self) -> Vec<EntityConfig> {
        self.lock().values().cloned().collect()
    }

    pub fn state_of(&self, entity_id: &str) -> Option<String> {
        self.lock().get(entity_id).map(|e| e.state.clone())
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, BTreeMap<String, EntityConfig>> {
        // A poisoned table still holds valid states.
        self.entities.lock().unwrap_or_else(|p| p.into_inner())
    }

    /// Set `state` on every entity matching the target arguments.
    fn apply(&self, args: &Value, state: &str) -> anyhow::Result<Vec<Value>> {
        let target = Target::from_args(args);
        if target.is_empty() {
            anyhow::bail!("Specify a name or an area");
        }

        let mut entities = self.lock();
        let mut changed = Vec::new();
        for entity in entities.values_mut().filter(|e| target.matches(e)) {
            let domain = domain_of(&entity.entity_id);
            // Scenes only activate.
            entity.state = if domain == "scene" { "on".into() } else { state.into() };
            info!(entity_id = %entity.entity_id, state = %entity.state, "Entity updated");
            changed.push(json!({
                "entity_id": entity.entity_id,
                "name": entity.name,
                "state": entity.state,
            }));
        }

        if changed.is_empty() {
            anyhow::bail!("No entity matched {}", target.describe());
        }
        Ok(changed)
    }
}

fn domain_of(entity_id: &str) -> &str {
    entity_id.split_once('.').map_or(entity_id, |(d, _)| d)
}

struct Target {
    name: Option<String>,
    area: Option<String>,
    domains: Vec<String>,
}

impl Target {
    fn from_args(args: &Value) -> Self {
        let text = |key: &str| {
            args.get(key)
                .and_then(Value::as_str)
                .map(|s| s.trim().to_lowercase())
                .filter(|s| !s.is_empty())
        };
        let domains = match args.get("domain") {
            Some(Value::String(d)) => vec![d.to_lowercase()],
            Some(Value::Array(ds)) => ds
                .iter()
                .filter_map(Value::as_str)
                .map(str::to_lowercase)
                .collect(),
            _ => Vec::new(),
        };
        Self {
            name: text("name"),
            area: text("area"),
            domains,
        }
    }

    fn is_empty(&self) -> bool {
        self.name.is_none() && self.area.is_none()
    }

    fn matches(&self, entity: &EntityConfig) -> bool {
        let name_ok = self.name.as_ref().map_or(true, |n| {
            entity.name.to_lowercase() == *n || entity.entity_id.to_lowercase() == *n
        });
        let area_ok = self.area.as_ref().map_or(true, |a| {
            entity
                .area
                .as_ref()
                .is_some_and(|ea| ea.to_lowercase() == *a)
        });
        let domain_ok = self.domains.is_empty()
            || self
                .domains
                .iter()
                .any(|d| d == domain_of(&entity.entity_id));
        name_ok && area_ok && domain_ok
    }

    fn describe(&self) -> String {
        match (&self.name, &self.area) {
            (Some(n), Some(a)) => format!("name '{n}' in area '{a}'"),
            (Some(n), None) => format!("name '{n}'"),
            (None, Some(a)) => format!("area '{a}'"),
            (None, None) => "nothing".into(),
        }
    }
}

fn target_parameters() -> ParameterSchema {
    ParameterSchema::Object(vec![
        Field::optional("name", ParameterSchema::String).describe("Name of the device or entity"),
        Field::optional("area", ParameterSchema::Selector(json!({"area": {}})))
            .describe("Name of the area"),
        Field::optional(
            "domain",
            ParameterSchema::Array(Box::new(ParameterSchema::String)),
        ),
    ])
}

// ── Tools ───────────────────────────────────────────────────────────

pub struct TurnOnTool {
    home: HomeState,
}

#[async_trait]
impl Tool for TurnOnTool {
    fn name(&self) -> &str {
        "HassTurnOn"
    }

    fn description(&self) -> Option<&str> {
        Some("Turns on/opens/activates a device, entity or scene")
    }

    fn parameters(&self) -> ParameterSchema {
        target_parameters()
    }

    async fn execute(&self, args: Value) -> anyhow::Result<Value> {
        let changed = self.home.apply(&args, "on")?;
        Ok(json!({"response_type": "action_done", "success": changed}))
    }
}

pub struct TurnOffTool {
    home: HomeState,
}

#[async_trait]
impl Tool for TurnOffTool {
    fn name(&self) -> &str {
        "HassTurnOff"
    }

    fn description(&self) -> Option<&str> {
        Some("Turns off/closes a device or entity")
    }

    fn parameters(&self) -> ParameterSchema {
        target_parameters()
    }

    async fn execute(&self, args: Value) -> anyhow::Result<Value> {
        let changed = self.home.apply(&args, "off")?;
        Ok(json!({"response_type": "action_done", "success": changed}))
    }
}

pub struct LiveContextTool {
    home: HomeState,
}

#[async_trait]
impl Tool for LiveContextTool {
    fn name(&self) -> &str {
        "GetLiveContext"
    }

    fn description(&self) -> Option<&str> {
        Some("Provides real-time information about the names, areas and states of all devices")
    }

    fn parameters(&self) -> ParameterSchema {
        ParameterSchema::Object(vec![])
    }

    async fn execute(&self, _args: Value) -> anyhow::Result<Value> {
        let entities: Vec<Value> = self
            .home
            .snapshot()
            .into_iter()
            .map(|e| {
                json!({
                    "entity_id": e.entity_id,
                    "name": e.name,
                    "area": e.area,
                    "state": e.state,
                })
            })
            .collect();
        Ok(json!({"success": true, "entities": entities}))
    }
}

/// Build the `assist` API over `home`.
pub fn assist_api(home: &HomeState) -> ToolApi {
    let mut registry = ToolRegistry::new();
    registry.register(Box::new(TurnOnTool { home: home.clone() }));
    registry.register(Box::new(TurnOffTool { home: home.clone() }));
    registry.register(Box::new(LiveContextTool { home: home.clone() }));
    ToolApi::new(LLM_API_ASSIST, registry)
}
