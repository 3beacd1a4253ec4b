//! Entry setup and connection validation.
//!
//! The validator probes the endpoint by listing models. Authentication
//! failures end validation at once; transient failures are retried with
//! exponential backoff until the retry budget runs out.

use std::future::Future;
use std::time::Duration;

use tracing::{debug, error, info, warn};

use crate::config::{self, ClientSettings, Config};
use crate::provider::error::{ProviderError, ProviderErrorKind};
use crate::provider::openai::OpenAiClient;
use crate::provider::types::ModelInfo;
use crate::provider::ChatBackend;

/// Reason a connection check failed.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ValidationError {
    #[error("Invalid API key or authentication failed")]
    InvalidAuth,
    #[error("Cannot connect to the AI service ({0})")]
    CannotConnect(ProviderErrorKind),
    #[error("Connection check gave up after {attempts} attempts ({last})")]
    Exhausted {
        last: ProviderErrorKind,
        attempts: u32,
    },
    #[error("Unexpected error: {0}")]
    Unknown(String),
}

impl ValidationError {
    /// Error code for interactive setup forms.
    pub fn error_code(&self) -> &'static str {
        match self {
            Self::InvalidAuth => "invalid_auth",
            Self::Exhausted {
                last: ProviderErrorKind::RateLimited,
                ..
            } => "rate_limit",
            Self::CannotConnect(_) | Self::Exhausted { .. } => "cannot_connect",
            Self::Unknown(_) => "unknown",
        }
    }
}

/// Outcome of setting up an entry, as the host lifecycle sees it.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum SetupError {
    /// Fatal until the configuration changes.
    #[error("Configuration error: {0}")]
    Config(String),
    /// Transient; setup should be re-attempted later.
    #[error("Not ready: {0}")]
    NotReady(String),
}

impl From<ValidationError> for SetupError {
    fn from(err: ValidationError) -> Self {
        match err {
            ValidationError::InvalidAuth => Self::Config(err.to_string()),
            ValidationError::Exhausted {
                last: ProviderErrorKind::RateLimited,
                ..
            } => Self::NotReady("API rate limit exceeded, please try again later".into()),
            ValidationError::CannotConnect(kind) | ValidationError::Exhausted { last: kind, .. } => {
                Self::NotReady(format!("Unable to connect to AI service: {kind}"))
            }
            ValidationError::Unknown(_) => Self::NotReady(err.to_string()),
        }
    }
}

fn is_transient(kind: ProviderErrorKind) -> bool {
    matches!(
        kind,
        ProviderErrorKind::RateLimited
            | ProviderErrorKind::ServerError
            | ProviderErrorKind::Timeout
            | ProviderErrorKind::ConnectionFailed
    )
}

/// Reachability probe with bounded retries.
#[derive(Debug, Clone)]
pub struct ConnectionValidator {
    settings: ClientSettings,
}

impl ConnectionValidator {
    pub fn new(settings: &ClientSettings) -> Self {
        Self {
            settings: settings.clone(),
        }
    }

    pub async fn validate(&self, backend: &dyn ChatBackend) -> Result<(), ValidationError> {
        self.validate_with_sleep(backend, tokio::time::sleep).await
    }

    /// Like [`validate`](Self::validate), waiting between attempts with `sleep`.
    pub async fn validate_with_sleep<F, Fut>(
        &self,
        backend: &dyn ChatBackend,
        sleep: F,
    ) -> Result<(), ValidationError>
    where
        F: Fn(Duration) -> Fut,
        Fut: Future<Output = ()>,
    {
        let max_retries = self.settings.max_retries;
        let attempts = max_retries + 1;

        for attempt in 0..attempts {
            let err = match self.probe(backend).await {
                Ok(()) => {
                    debug!(attempt = attempt + 1, "API connection test successful");
                    return Ok(());
                }
                Err(err) => err,
            };

            match err.kind {
                ProviderErrorKind::AuthFailed => {
                    error!("Authentication failed, check the API key");
                    return Err(ValidationError::InvalidAuth);
                }
                ProviderErrorKind::Unknown => {
                    error!(error = %err.message, "Unexpected error during connection test");
                    return Err(ValidationError::Unknown(err.message));
                }
                kind if !is_transient(kind) => {
                    error!(kind = %kind, error = %err.message, "API connection test failed");
                    return Err(ValidationError::CannotConnect(kind));
                }
                kind if attempt < max_retries => {
                    let wait = self.settings.backoff_delay(attempt);
                    warn!(
                        kind = %kind,
                        wait_ms = wait.as_millis() as u64,
                        attempt = attempt + 1,
                        attempts,
                        "API connection test failed, retrying"
                    );
                    sleep(wait).await;
                }
                kind => {
                    error!(kind = %kind, attempts, "API connection failed after all attempts");
                    return Err(ValidationError::Exhausted {
                        last: kind,
                        attempts,
                    });
                }
            }
        }

        // The final attempt always returns above.
        Err(ValidationError::Unknown("no connection attempts made".into()))
    }

    async fn probe(&self, backend: &dyn ChatBackend) -> Result<(), ProviderError> {
        match tokio::time::timeout(self.settings.validation_timeout, backend.list_models()).await {
            Ok(result) => result.map(|_| ()),
            Err(_) => Err(ProviderError::new(
                ProviderErrorKind::Timeout,
                "Model listing timed out",
            )),
        }
    }
}

/// Models for a picker. Listing failures are logged and yield an empty list.
pub async fn available_models(backend: &dyn ChatBackend) -> Vec<ModelInfo> {
    match backend.list_models().await {
        Ok(models) => models,
        Err(err) => {
            warn!(kind = %err.kind, error = %err.message, "Could not list models");
            Vec::new()
        }
    }
}

/// Validate an entry's configuration and connect to its endpoint.
///
/// Returns the client every turn of this entry shares.
pub async fn setup_entry(config: &Config) -> Result<OpenAiClient, SetupError> {
    let base_url = config.effective_base_url();
    let api_key = config.data.api_key.as_str();

    if !config::validate_api_key(api_key) {
        error!("Invalid API key format");
        return Err(SetupError::Config("API key format is invalid".into()));
    }
    if !config::validate_base_url(base_url) {
        error!(base_url, "Invalid base URL");
        return Err(SetupError::Config(format!(
            "Base URL is invalid or insecure: {base_url}"
        )));
    }

    let settings = config.client_settings();
    let client = OpenAiClient::new(
        OpenAiClient::http_client(&settings),
        api_key,
        base_url,
        settings.clone(),
    );

    ConnectionValidator::new(&settings).validate(&client).await?;
    info!(base_url, "Connected to AI service");
    Ok(client)
}
