//! Configuration management

use std::{env, path::Path, time::Duration};

use figment::{
    Figment,
    providers::{Env, Format, Yaml},
};
use serde::{Deserialize, Serialize};

use crate::{Error, Result};

/// Main configuration
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
#[serde(default)]
pub struct Config {
    /// Server configuration
    pub server: ServerConfig,
    /// Authentication configuration
    pub auth: AuthConfig,
    /// Chat turn configuration
    pub chat: ChatConfig,
    /// Completion provider configurations, tried in order
    pub providers: Vec<ProviderConfig>,
    /// Data service configuration
    pub data_service: DataServiceConfig,
    /// Result cache configuration
    pub cache: CacheConfig,
    /// Conversation summarization configuration
    pub summarization: SummarizationConfig,
}

/// HTTP server configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    /// Host to bind to
    pub host: String,
    /// Port to listen on
    pub port: u16,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".to_string(),
            port: 8750,
        }
    }
}

/// Authentication configuration for gateway access
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AuthConfig {
    /// Enable authentication
    pub enabled: bool,
    /// Bearer token for service-to-service access.
    /// Supports: literal value, `env:VAR_NAME`, or `auto` (generates random token).
    /// End-user tokens are verified against the data service instead.
    pub bearer_token: Option<String>,
    /// Paths that bypass authentication
    pub public_paths: Vec<String>,
    /// Per-user rate limit (requests per minute, 0 = unlimited)
    pub rate_limit: u32,
}

impl Default for AuthConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            bearer_token: None,
            public_paths: vec!["/health".to_string()],
            rate_limit: 60,
        }
    }
}

impl AuthConfig {
    /// Resolve the bearer token (expand env vars, generate if `auto`)
    #[must_use]
    pub fn resolve_bearer_token(&self) -> Option<String> {
        self.bearer_token.as_ref().map(|token| {
            if token == "auto" {
                use rand::Rng;
                let random_bytes: [u8; 32] = rand::rng().random();
                format!(
                    "pg_{}",
                    base64::Engine::encode(
                        &base64::engine::general_purpose::URL_SAFE_NO_PAD,
                        random_bytes
                    )
                )
            } else if let Some(var_name) = token.strip_prefix("env:") {
                env::var(var_name).unwrap_or_else(|_| token.clone())
            } else {
                token.clone()
            }
        })
    }
}

/// Chat turn configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ChatConfig {
    /// Maximum model steps (tool-calling rounds) per turn
    pub max_steps: u32,
    /// Hard wall-clock budget for a whole turn
    #[serde(with = "humantime_serde")]
    pub turn_timeout: Duration,
    /// Recent-message window sent alongside a summary
    pub recent_window: usize,
}

impl Default for ChatConfig {
    fn default() -> Self {
        Self {
            max_steps: 5,
            turn_timeout: Duration::from_secs(120),
            recent_window: 10,
        }
    }
}

/// A single completion provider (OpenAI-compatible chat completions API)
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProviderConfig {
    /// Provider name (for logs and diagnostics)
    pub name: String,
    /// Base URL of the chat completions API
    pub base_url: String,
    /// Model identifier to request
    pub model: String,
    /// API key (supports `env:VAR_NAME`)
    #[serde(default)]
    pub api_key: Option<String>,
    /// Per-request timeout
    #[serde(with = "humantime_serde", default = "default_provider_timeout")]
    pub timeout: Duration,
}

fn default_provider_timeout() -> Duration {
    Duration::from_secs(60)
}

impl ProviderConfig {
    /// Resolve the API key (expand env vars)
    #[must_use]
    pub fn resolve_api_key(&self) -> Option<String> {
        self.api_key.as_ref().map(|key| {
            if let Some(var_name) = key.strip_prefix("env:") {
                env::var(var_name).unwrap_or_else(|_| key.clone())
            } else {
                key.clone()
            }
        })
    }
}

/// External data service configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DataServiceConfig {
    /// Base URL of the data service
    pub base_url: String,
    /// Per-request timeout
    #[serde(with = "humantime_serde")]
    pub timeout: Duration,
    /// Retry attempts for read-only calls (mutations are never retried)
    pub read_retries: u32,
}

impl Default for DataServiceConfig {
    fn default() -> Self {
        Self {
            base_url: String::new(),
            timeout: Duration::from_secs(15),
            read_retries: 2,
        }
    }
}

/// Result cache configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CacheConfig {
    /// Enable result caching for read-only tools
    pub enabled: bool,
    /// Entry lifetime before a cached result is re-fetched
    #[serde(with = "humantime_serde")]
    pub ttl: Duration,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            ttl: Duration::from_secs(300),
        }
    }
}

/// Conversation summarization configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SummarizationConfig {
    /// Enable background summarization
    pub enabled: bool,
    /// Message count that triggers summarization
    pub message_threshold: usize,
}

impl Default for SummarizationConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            message_threshold: 30,
        }
    }
}

impl Config {
    /// Load configuration from an optional YAML file layered with
    /// `PERMGATE_`-prefixed environment variables.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let mut figment = Figment::new();

        if let Some(path) = path {
            if !path.exists() {
                return Err(Error::Config(format!(
                    "Configuration file not found: {}",
                    path.display()
                )));
            }
            figment = figment.merge(Yaml::file(path));
        }

        let config: Self = figment
            .merge(Env::prefixed("PERMGATE_").split("__"))
            .extract()
            .map_err(|e| Error::Config(e.to_string()))?;

        config.validate()?;
        Ok(config)
    }

    /// Validate cross-field constraints
    pub fn validate(&self) -> Result<()> {
        if self.providers.is_empty() {
            return Err(Error::Config(
                "At least one completion provider must be configured".to_string(),
            ));
        }
        if self.data_service.base_url.is_empty() {
            return Err(Error::Config(
                "data_service.base_url must be set".to_string(),
            ));
        }
        if self.chat.max_steps == 0 {
            return Err(Error::Config("chat.max_steps must be at least 1".to_string()));
        }
        Ok(())
    }
}
