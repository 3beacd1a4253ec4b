//! Configuration module for assistlink.
//!
//! Loads typed configuration from `~/.assistlink/config.json`. The layout
//! mirrors a host config entry: `data` holds what was entered at setup,
//! `options` holds later user overrides, and the per-platform sections hold
//! conversation and AI-task settings.

use std::collections::BTreeMap;
use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::LazyLock;
use std::time::Duration;

use anyhow::Context;
use regex::Regex;
use serde::{Deserialize, Serialize};
use tracing::warn;

/// Built-in endpoint used when neither options nor data name one.
pub const DEFAULT_BASE_URL: &str = "https://dashscope.aliyuncs.com/compatible-mode/v1";
pub const DEFAULT_MODEL: &str = "qwen-plus";

pub const DEFAULT_TIMEOUT_SECS: u64 = 30;
pub const VALIDATION_TIMEOUT_SECS: u64 = 10;
pub const MAX_RETRIES: u32 = 3;
pub const BACKOFF_FACTOR_SECS: f64 = 1.0;

/// Max number of back-and-forth rounds with the model per turn.
pub const MAX_TOOL_ITERATIONS: usize = 10;

pub const DEFAULT_MAX_TOKENS: u32 = 1024;
pub const DEFAULT_TEMPERATURE: f32 = 0.7;
pub const DEFAULT_TOP_P: f32 = 1.0;

/// Identifier of the built-in device-control capability API.
pub const LLM_API_ASSIST: &str = "assist";

pub const APP_REFERER: &str = "https://www.home-assistant.io/integrations/qwenai";
pub const APP_TITLE: &str = "Home Assistant";

/// Popular OpenAI-compatible endpoints.
pub const KNOWN_ENDPOINTS: &[(&str, &str)] = &[
    ("qwen", "https://dashscope.aliyuncs.com/compatible-mode/v1"),
    ("openai", "https://api.openai.com/v1"),
    ("azure", "https://your-resource.openai.azure.com/"),
    ("openrouter", "https://openrouter.ai/api/v1"),
    ("anthropic", "https://api.anthropic.com/v1"),
];

/// Instructions used when no prompt is configured.
pub const RECOMMENDED_PROMPT: &str = "You are a voice assistant for Home Assistant. You have access to control devices, scenes, and get information from this smart home.

IMPORTANT INTERACTION RULES:
1. Always use the available tools to find entities before saying they don't exist
2. For lighting control, prioritize using scenes over individual lights when available
3. Use groups when controlling multiple similar devices
4. Be specific about entity names - check available entities first
5. When asked to turn off/on lights in a room, look for both individual lights and room scenes
6. If a scene doesn't exist, suggest available alternatives or use individual light controls

COMMON ENTITY PATTERNS IN THIS HOME:
- Scenes: room_name_on, room_name_off, room_name_ceiling_on, room_name_cozy, room_name_dim
- Light groups: room_name_lights (e.g., living_room_lights)
- Individual lights: usually have long entity IDs with device identifiers

Answer questions about the world truthfully. Keep responses simple and to the point.
When controlling devices, always confirm what action was taken.";

static OPENAI_KEY_PATTERN: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^sk-[a-zA-Z0-9]{32,}$").expect("valid regex"));
static GENERIC_KEY_PATTERN: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^[a-zA-Z0-9_-]{20,}$").expect("valid regex"));

/// Root configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct Config {
    pub data: EntryData,
    pub options: EntryOptions,
    pub conversation: ConversationOptions,
    pub ai_task: AiTaskOptions,
    pub client: ClientConfig,
    pub home: HomeConfig,
}

impl Config {
    /// Load from `path`, or from the default path when `None`.
    ///
    /// A missing default file yields the default configuration; a missing
    /// explicit path is an error.
    pub fn load(path: Option<&Path>) -> anyhow::Result<Self> {
        match path {
            Some(p) => Self::load_from(p),
            None => {
                let p = Self::default_path();
                if p.exists() {
                    Self::load_from(&p)
                } else {
                    Ok(Config::default())
                }
            }
        }
    }

    /// Load configuration from a specific path.
    pub fn load_from(path: &Path) -> anyhow::Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file {}", path.display()))?;
        let config: Config = serde_json::from_str(&content)
            .with_context(|| format!("Failed to parse config file {}", path.display()))?;
        tracing::debug!(path = %path.display(), "Loaded configuration");
        Ok(config)
    }

    /// Write this configuration as pretty JSON, creating parent directories.
    pub fn save_to(&self, path: &Path) -> anyhow::Result<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        std::fs::write(path, serde_json::to_string_pretty(self)?)?;
        Ok(())
    }

    /// Get the default config file path.
    pub fn default_path() -> PathBuf {
        Self::config_dir().join("config.json")
    }

    /// Get the default config directory path.
    pub fn config_dir() -> PathBuf {
        dirs::home_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join(".assistlink")
    }

    /// Build the onboarding template for one of [`KNOWN_ENDPOINTS`].
    pub fn template(provider: &str) -> anyhow::Result<Self> {
        let (_, url) = KNOWN_ENDPOINTS
            .iter()
            .find(|(name, _)| *name == provider)
            .with_context(|| format!("Unknown provider '{provider}'"))?;

        Ok(Self {
            data: EntryData {
                api_key: "YOUR_API_KEY_HERE".into(),
                base_url: Some((*url).to_string()),
            },
            conversation: ConversationOptions::recommended(),
            home: HomeConfig::example(),
            ..Config::default()
        })
    }

    /// Effective endpoint: user options override, then stored data, then
    /// the built-in default.
    pub fn effective_base_url(&self) -> &str {
        self.options
            .base_url
            .as_deref()
            .or(self.data.base_url.as_deref())
            .unwrap_or(DEFAULT_BASE_URL)
    }

    /// Immutable settings handed to the client, engine and validator.
    pub fn client_settings(&self) -> ClientSettings {
        let c = &self.client;
        ClientSettings {
            timeout: Duration::from_secs(c.timeout_secs),
            validation_timeout: Duration::from_secs(c.validation_timeout_secs),
            max_retries: c.max_retries,
            backoff_factor: Duration::from_secs_f64(c.backoff_factor_secs.max(0.0)),
            max_tool_iterations: c.max_tool_iterations.max(1),
            headers: c.headers.clone().into_iter().collect(),
        }
    }

    /// Validate configuration and return actionable error messages.
    pub fn validate(&self) -> std::result::Result<(), Vec<String>> {
        let mut errors = Vec::new();

        if self.data.api_key.trim().is_empty() || self.data.api_key.contains("YOUR_") {
            errors.push(
                "data.apiKey is missing or a placeholder. Edit config.json and set your API key."
                    .into(),
            );
        } else if !validate_api_key(&self.data.api_key) {
            errors.push("data.apiKey does not look like a valid API key.".into());
        }

        let base_url = self.effective_base_url();
        if !validate_base_url(base_url) {
            errors.push(format!(
                "Base URL '{base_url}' is invalid or insecure. Use https (http is only allowed for localhost)."
            ));
        }

        if self.conversation.model.trim().is_empty() {
            errors.push("conversation.model is empty. Specify a model name.".into());
        }
        if self.ai_task.model.trim().is_empty() {
            errors.push("aiTask.model is empty. Specify a model name.".into());
        }

        if errors.is_empty() {
            Ok(())
        } else {
            Err(errors)
        }
    }
}

// ── Entry ───────────────────────────────────────────────────────────

/// Data captured when the entry was created.
#[derive(Clone, Default, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct EntryData {
    pub api_key: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub base_url: Option<String>,
}

impl fmt::Debug for EntryData {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EntryData")
            .field("api_key", &"[REDACTED]")
            .field("base_url", &self.base_url)
            .finish()
    }
}

/// User overrides applied after setup.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct EntryOptions {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub base_url: Option<String>,
}

// ── Platforms ───────────────────────────────────────────────────────

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct ConversationOptions {
    pub model: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub prompt: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub max_tokens: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub temperature: Option<f32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub top_p: Option<f32>,
    /// Enabled capability APIs; empty means the model gets no tools.
    pub llm_apis: Vec<String>,
    pub recommended: bool,
}

impl Default for ConversationOptions {
    fn default() -> Self {
        Self {
            model: DEFAULT_MODEL.into(),
            prompt: None,
            max_tokens: None,
            temperature: None,
            top_p: None,
            llm_apis: Vec::new(),
            recommended: false,
        }
    }
}

impl ConversationOptions {
    pub fn recommended() -> Self {
        Self {
            model: DEFAULT_MODEL.into(),
            prompt: Some(RECOMMENDED_PROMPT.into()),
            max_tokens: Some(DEFAULT_MAX_TOKENS),
            temperature: Some(DEFAULT_TEMPERATURE),
            top_p: Some(DEFAULT_TOP_P),
            llm_apis: vec![LLM_API_ASSIST.into()],
            recommended: true,
        }
    }

    /// The configured prompt, or the recommended one.
    pub fn effective_prompt(&self) -> &str {
        self.prompt
            .as_deref()
            .filter(|p| !p.trim().is_empty())
            .unwrap_or(RECOMMENDED_PROMPT)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct AiTaskOptions {
    pub model: String,
}

impl Default for AiTaskOptions {
    fn default() -> Self {
        Self {
            model: DEFAULT_MODEL.into(),
        }
    }
}

// ── Home ────────────────────────────────────────────────────────────

/// Entities exposed to the built-in `assist` capability API.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct HomeConfig {
    pub entities: Vec<EntityConfig>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EntityConfig {
    /// `domain.object_id`, e.g. `light.kitchen`.
    pub entity_id: String,
    pub name: String,
    #[serde(default = "default_entity_state")]
    pub state: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub area: Option<String>,
}

fn default_entity_state() -> String {
    "off".into()
}

impl HomeConfig {
    fn example() -> Self {
        let entity = |id: &str, name: &str, area: &str| EntityConfig {
            entity_id: id.into(),
            name: name.into(),
            state: default_entity_state(),
            area: Some(area.into()),
        };
        Self {
            entities: vec![
                entity("light.kitchen", "Kitchen Light", "Kitchen"),
                entity("light.living_room_lights", "Living Room Lights", "Living Room"),
                entity("scene.living_room_cozy", "Living Room Cozy", "Living Room"),
                entity("switch.coffee_maker", "Coffee Maker", "Kitchen"),
            ],
        }
    }
}

// ── Client ──────────────────────────────────────────────────────────

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct ClientConfig {
    pub timeout_secs: u64,
    pub validation_timeout_secs: u64,
    pub max_retries: u32,
    pub backoff_factor_secs: f64,
    pub max_tool_iterations: usize,
    pub headers: BTreeMap<String, String>,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            timeout_secs: DEFAULT_TIMEOUT_SECS,
            validation_timeout_secs: VALIDATION_TIMEOUT_SECS,
            max_retries: MAX_RETRIES,
            backoff_factor_secs: BACKOFF_FACTOR_SECS,
            max_tool_iterations: MAX_TOOL_ITERATIONS,
            headers: default_headers().into_iter().collect(),
        }
    }
}

fn default_headers() -> Vec<(String, String)> {
    vec![
        ("HTTP-Referer".into(), APP_REFERER.into()),
        ("X-Title".into(), APP_TITLE.into()),
    ]
}

/// Immutable runtime settings shared by every component of one entry.
#[derive(Debug, Clone, PartialEq)]
pub struct ClientSettings {
    /// Timeout applied to every chat completion call.
    pub timeout: Duration,
    /// Timeout applied to the reachability probe.
    pub validation_timeout: Duration,
    pub max_retries: u32,
    pub backoff_factor: Duration,
    pub max_tool_iterations: usize,
    /// Fixed headers identifying the calling application.
    pub headers: Vec<(String, String)>,
}

impl Default for ClientSettings {
    fn default() -> Self {
        Self {
            timeout: Duration::from_secs(DEFAULT_TIMEOUT_SECS),
            validation_timeout: Duration::from_secs(VALIDATION_TIMEOUT_SECS),
            max_retries: MAX_RETRIES,
            backoff_factor: Duration::from_secs_f64(BACKOFF_FACTOR_SECS),
            max_tool_iterations: MAX_TOOL_ITERATIONS,
            headers: default_headers(),
        }
    }
}

impl ClientSettings {
    /// Backoff before retry number `attempt + 1`: `factor × 2^attempt`.
    pub fn backoff_delay(&self, attempt: u32) -> Duration {
        self.backoff_factor.saturating_mul(2u32.saturating_pow(attempt))
    }
}

// ── Format validation ───────────────────────────────────────────────

/// Basic credential format check. Never logs the key.
pub fn validate_api_key(api_key: &str) -> bool {
    let key = api_key.trim();
    if key.len() < 10 {
        return false;
    }
    OPENAI_KEY_PATTERN.is_match(key) || GENERIC_KEY_PATTERN.is_match(key)
}

/// Accept https endpoints, and plain http only on loopback hosts.
pub fn validate_base_url(base_url: &str) -> bool {
    let Ok(parsed) = reqwest::Url::parse(base_url.trim()) else {
        return false;
    };

    let Some(host) = parsed.host_str() else {
        return false;
    };
    let loopback = matches!(host, "localhost" | "127.0.0.1");

    match parsed.scheme() {
        "https" => {}
        "http" if loopback => {}
        "http" => {
            warn!("HTTP connections are only allowed for localhost development");
            return false;
        }
        _ => return false,
    }

    if !loopback && ["192.168.", "10.", "172."].iter().any(|p| host.starts_with(p)) {
        warn!(host, "Private network URLs may not be secure in production");
    }
    true
}
