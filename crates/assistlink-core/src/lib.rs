//! assistlink-core: smart-home conversations over OpenAI-compatible chat APIs.
//!
//! - [`config`]: Typed configuration, format validation, client settings
//! - [`provider`]: Chat backend trait, wire types, HTTP client, transcript codec
//! - [`tools`]: Tool trait, registry, schema adapter, built-in `assist` API
//! - [`conversation`]: Transcript entries and the host chat-log interface
//! - [`agent`]: Turn engine, conversation agent, AI tasks
//! - [`setup`]: Entry setup and connection validation
//!
//! # Quick Start
//!
//! ```no_run
//! use std::sync::Arc;
//! use assistlink_core::agent::conversation::ConversationAgent;
//! use assistlink_core::config::Config;
//! use assistlink_core::setup::setup_entry;
//! use assistlink_core::tools::home::{assist_api, HomeState};
//!
//! # async fn run() -> anyhow::Result<()> {
//! let config = Config::load(None)?;
//! let client = Arc::new(setup_entry(&config).await?);
//!
//! let home = HomeState::from_config(&config.home);
//! let agent = ConversationAgent::new(
//!     client,
//!     &config.conversation,
//!     &config.client_settings(),
//!     Some(Arc::new(assist_api(&home))),
//! );
//!
//! let mut log = agent.start(None);
//! let reply = agent.process(&mut log, "Turn on the kitchen light").await?;
//! println!("{}", reply.response);
//! # Ok(())
//! # }
//! ```

pub mod agent;
pub mod config;
pub mod conversation;
pub mod provider;
pub mod setup;
pub mod tools;
