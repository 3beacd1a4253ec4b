//! assistlink CLI: onboarding, connection checks, chat and AI tasks.
//!
//! Usage:
//!   assistlink onboard   Create a configuration for a known endpoint
//!   assistlink status    Show configuration and validation problems
//!   assistlink check     Validate credentials and reach the endpoint
//!   assistlink models    List models the endpoint offers
//!   assistlink chat      Start an interactive conversation
//!   assistlink task      Run a one-shot data generation task

use anyhow::Result;
use clap::{Parser, Subcommand};
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::io::{AsyncBufRead, AsyncBufReadExt, BufReader, Lines};
use tokio_util::sync::CancellationToken;

use assistlink_core::agent::ai_task::{AiTaskAgent, GenDataTask};
use assistlink_core::agent::conversation::ConversationAgent;
use assistlink_core::agent::TurnError;
use assistlink_core::config::{Config, KNOWN_ENDPOINTS};
use assistlink_core::conversation::ChatLog;
use assistlink_core::provider::openai::OpenAiClient;
use assistlink_core::setup::{self, SetupError};
use assistlink_core::tools::home::{assist_api, HomeState};
use assistlink_core::tools::schema::{Field, ParameterSchema};

#[derive(Parser)]
#[command(
    name = "assistlink",
    version,
    about = "Talk to your smart home through any OpenAI-compatible chat API"
)]
struct Cli {
    /// Config file (default: ~/.assistlink/config.json)
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand)]
enum Commands {
    /// Create a configuration for a known endpoint
    Onboard {
        /// One of: qwen, openai, azure, openrouter, anthropic
        #[arg(short, long, default_value = "qwen")]
        provider: String,

        /// Overwrite an existing configuration
        #[arg(long)]
        force: bool,
    },

    /// Show configuration status
    Status,

    /// Validate the credential and endpoint
    Check,

    /// List available models
    Models,

    /// Start an interactive conversation
    Chat {
        /// Model to use (overrides config)
        #[arg(short, long)]
        model: Option<String>,

        /// Continue a conversation id instead of starting a new one
        #[arg(long)]
        conversation_id: Option<String>,
    },

    /// Generate data from instructions
    Task {
        /// Instructions for the model
        instructions: String,

        /// Task name, also used as the structured-output schema name
        #[arg(short, long, default_value = "task")]
        name: String,

        /// Require a JSON object with these string fields
        #[arg(short, long = "field")]
        fields: Vec<String>,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .with_target(false)
        .compact()
        .init();

    let cli = Cli::parse();
    let config_path = cli.config.as_deref();

    match cli.command {
        Some(Commands::Onboard { provider, force }) => cmd_onboard(config_path, &provider, force)?,
        Some(Commands::Status) => cmd_status(config_path)?,
        Some(Commands::Check) => cmd_check(config_path).await?,
        Some(Commands::Models) => cmd_models(config_path).await?,
        Some(Commands::Chat {
            model,
            conversation_id,
        }) => cmd_chat(config_path, model.as_deref(), conversation_id.as_deref()).await?,
        Some(Commands::Task {
            instructions,
            name,
            fields,
        }) => cmd_task(config_path, &instructions, &name, &fields).await?,
        None => cmd_chat(config_path, None, None).await?,
    }

    Ok(())
}

// ── Shared Setup ────────────────────────────────────────────────────

fn load_config(path: Option<&Path>) -> Result<Config> {
    let config = Config::load(path)?;
    if let Err(errors) = config.validate() {
        eprintln!("\n  \x1b[31m❌ Configuration errors:\x1b[0m");
        for e in &errors {
            eprintln!("     • {}", e);
        }
        eprintln!();
        anyhow::bail!("Fix the above {} error(s) in config.json", errors.len());
    }
    Ok(config)
}

async fn connect(config: &Config) -> Result<Arc<OpenAiClient>> {
    match setup::setup_entry(config).await {
        Ok(client) => Ok(Arc::new(client)),
        Err(SetupError::Config(msg)) => {
            anyhow::bail!("{msg}. Fix config.json and try again")
        }
        Err(SetupError::NotReady(msg)) => {
            anyhow::bail!("{msg}. The service may be temporarily unavailable, retry later")
        }
    }
}

/// Cancel `token` on Ctrl-C.
///
/// Registering the handler replaces the default SIGINT exit, so every
/// blocking wait in the CLI must also watch the token.
fn cancel_on_ctrl_c(token: CancellationToken) {
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            tracing::info!("Interrupt received, cancelling");
            token.cancel();
        }
    });
}

// ── Onboard Command ─────────────────────────────────────────────────

fn cmd_onboard(path: Option<&Path>, provider: &str, force: bool) -> Result<()> {
    let path = path.map(Path::to_path_buf).unwrap_or_else(Config::default_path);
    if path.exists() && !force {
        anyhow::bail!(
            "{} already exists. Use --force to overwrite it",
            path.display()
        );
    }

    let config = Config::template(provider).map_err(|e| {
        let known: Vec<&str> = KNOWN_ENDPOINTS.iter().map(|(n, _)| *n).collect();
        anyhow::anyhow!("{e}. Known providers: {}", known.join(", "))
    })?;
    config.save_to(&path)?;

    println!();
    println!("  ✅ Configuration created at:");
    println!("     {}", path.display());
    println!();
    println!("  Next steps:");
    println!("  1. Edit the config file and add your API key");
    println!("  2. Run `assistlink check` to test the connection");
    println!("  3. Run `assistlink chat` to start talking to your home");
    println!();
    Ok(())
}

// ── Status Command ──────────────────────────────────────────────────

fn cmd_status(path: Option<&Path>) -> Result<()> {
    let config_path = path.map(Path::to_path_buf).unwrap_or_else(Config::default_path);

    println!();
    println!("  🏠 assistlink status");
    println!("  ─────────────────────────────────────");

    if config_path.exists() {
        println!("  Config:    {}", config_path.display());
    } else {
        println!("  Config:    ❌ Not found (run `assistlink onboard`)");
        return Ok(());
    }

    let config = Config::load(Some(&config_path))?;
    let key_set = !config.data.api_key.trim().is_empty() && !config.data.api_key.contains("YOUR_");
    println!("  Endpoint:  {}", config.effective_base_url());
    println!("  API key:   {}", if key_set { "✅ set" } else { "❌ missing" });
    println!("  Model:     {}", config.conversation.model);
    println!("  AI task:   {}", config.ai_task.model);
    println!(
        "  Tools:     {}",
        if config.conversation.llm_apis.is_empty() {
            "none".to_string()
        } else {
            config.conversation.llm_apis.join(", ")
        }
    );
    println!("  Entities:  {}", config.home.entities.len());

    match config.validate() {
        Ok(()) => println!("  Valid:     ✅"),
        Err(errors) => {
            println!("  Valid:     ❌");
            for e in &errors {
                println!("     • {}", e);
            }
        }
    }

    println!();
    Ok(())
}

// ── Check / Models Commands ─────────────────────────────────────────

async fn cmd_check(path: Option<&Path>) -> Result<()> {
    let config = load_config(path)?;
    let client = connect(&config).await?;
    println!("  ✅ Connected to {}", client.base_url());
    Ok(())
}

async fn cmd_models(path: Option<&Path>) -> Result<()> {
    let config = load_config(path)?;
    let client = connect(&config).await?;

    let models = setup::available_models(client.as_ref()).await;
    if models.is_empty() {
        println!("  No models reported by {}", client.base_url());
        return Ok(());
    }

    println!();
    for model in &models {
        if model.description.is_empty() || model.name == model.id {
            println!("  {}", model.id);
        } else {
            println!("  {}  ({}) {}", model.id, model.name, model.description);
        }
    }
    println!();
    Ok(())
}

// ── Chat Command ────────────────────────────────────────────────────

async fn cmd_chat(
    path: Option<&Path>,
    model_override: Option<&str>,
    conversation_id: Option<&str>,
) -> Result<()> {
    let mut config = load_config(path)?;
    if let Some(model) = model_override {
        config.conversation.model = model.to_string();
    }

    let client = connect(&config).await?;
    let home = HomeState::from_config(&config.home);
    let cancel = CancellationToken::new();
    cancel_on_ctrl_c(cancel.clone());

    let agent = ConversationAgent::new(
        client,
        &config.conversation,
        &config.client_settings(),
        Some(Arc::new(assist_api(&home))),
    )
    .with_cancellation(cancel.clone());
    let mut log = agent.start(conversation_id);

    println!();
    println!("  🏠 assistlink v{}", env!("CARGO_PKG_VERSION"));
    println!(
        "  Endpoint: {} | Model: {}",
        config.effective_base_url(),
        config.conversation.model
    );
    println!("  Conversation: {}", log.conversation_id());
    println!();
    println!("  Type your message, or /quit to exit.");
    println!("  ─────────────────────────────────────");
    println!();

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    loop {
        print!("  \x1b[36m>\x1b[0m ");
        io::stdout().flush()?;

        let Some(input) = next_input(&mut lines, &cancel).await? else {
            if cancel.is_cancelled() {
                println!("\n  Goodbye! 👋");
                // The pending stdin read would block runtime shutdown.
                std::process::exit(130);
            }
            break;
        };
        let input = input.trim();

        if input.is_empty() {
            continue;
        }

        match input {
            "/quit" | "/exit" | "/q" => {
                println!("  Goodbye! 👋");
                break;
            }
            "/devices" => {
                for entity in home.snapshot() {
                    println!("  {:<32} {:<24} {}", entity.entity_id, entity.name, entity.state);
                }
                continue;
            }
            _ => {}
        }

        println!();
        match agent.process(&mut log, input).await {
            Ok(result) => {
                println!("  \x1b[32m{}\x1b[0m\n", result.response);
            }
            Err(TurnError::Cancelled) => {
                println!("  Cancelled.");
                break;
            }
            Err(e) => {
                eprintln!("  \x1b[31mError: {}\x1b[0m\n", e);
            }
        }
    }

    Ok(())
}

/// Read the next line, or `None` on end of input or cancellation.
async fn next_input<R>(
    lines: &mut Lines<R>,
    cancel: &CancellationToken,
) -> io::Result<Option<String>>
where
    R: AsyncBufRead + Unpin,
{
    tokio::select! {
        line = lines.next_line() => line,
        _ = cancel.cancelled() => Ok(None),
    }
}

// ── Task Command ────────────────────────────────────────────────────

async fn cmd_task(
    path: Option<&Path>,
    instructions: &str,
    name: &str,
    fields: &[String],
) -> Result<()> {
    let config = load_config(path)?;
    let client = connect(&config).await?;

    let structure = (!fields.is_empty()).then(|| {
        ParameterSchema::Object(
            fields
                .iter()
                .map(|f| Field::required(f, ParameterSchema::String))
                .collect(),
        )
    });
    let task = GenDataTask {
        name: name.to_string(),
        instructions: instructions.to_string(),
        structure,
    };

    let agent = AiTaskAgent::new(client, &config.ai_task, &config.client_settings());
    let result = agent.generate_data(&task).await?;

    match &result.data {
        serde_json::Value::String(text) => println!("{text}"),
        data => println!("{}", serde_json::to_string_pretty(data)?),
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_next_input_reads_lines() {
        let mut lines = BufReader::new(&b"turn on the den\n"[..]).lines();
        let cancel = CancellationToken::new();
        let line = next_input(&mut lines, &cancel).await.unwrap();
        assert_eq!(line.as_deref(), Some("turn on the den"));
        assert!(next_input(&mut lines, &cancel).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_next_input_returns_on_cancel() {
        // The writer stays open, so the read would otherwise wait forever.
        let (_writer, reader) = tokio::io::duplex(64);
        let mut lines = BufReader::new(reader).lines();
        let cancel = CancellationToken::new();
        cancel.cancel();
        assert!(next_input(&mut lines, &cancel).await.unwrap().is_none());
    }
}
