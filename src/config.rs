//! # Configuration Management
//!
//! This module handles loading and managing application configuration from multiple sources:
//! - TOML configuration files (config.toml)
//! - Environment variables (with APP_ prefix)
//! - Default values (built into the code)
//!
//! ## Configuration Priority (highest to lowest):
//! 1. Special environment variables (HOST, PORT, UPSTREAM_API_KEY, OPENROUTER_API_KEY, GROQ_API_KEY)
//! 2. Environment variables (APP_SERVER__PORT, APP_UPSTREAM__MODEL, etc.)
//! 3. Configuration file (config.toml)
//! 4. Default values (defined in the Default impl)
//!
//! ## Secrets:
//! The upstream API key lives in `UpstreamConfig::api_key`. It is skipped when the
//! config is serialized and redacted from `Debug` output, so it never ends up in logs
//! or HTTP responses.

use anyhow::Result;
use serde::{Deserialize, Serialize};
use std::env;
use std::fmt;
use std::time::Duration;

/// Main application configuration that contains all settings.
///
/// Breaking configuration into logical groups (server, upstream, cache, limits)
/// keeps each concern in one place.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AppConfig {
    pub server: ServerConfig,
    pub upstream: UpstreamConfig,
    pub cache: CacheConfig,
    pub limits: LimitsConfig,
}

/// Server-specific configuration settings.
///
/// ## Fields:
/// - `host`: IP address or hostname to bind the server to (e.g., "127.0.0.1", "0.0.0.0")
/// - `port`: TCP port number to listen on (the browser clients expect 3001)
/// - `json_limit_bytes`: Largest JSON body accepted by the explanation endpoints
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
    pub json_limit_bytes: usize,
}

/// Upstream text-generation API settings.
///
/// Any OpenAI-compatible chat-completions provider works here: OpenRouter,
/// Groq, OpenAI, a local Ollama in OpenAI mode, etc. The model, temperature and
/// token limit are deployment choices, not part of the pipeline's contract.
#[derive(Clone, Serialize, Deserialize)]
pub struct UpstreamConfig {
    /// Base URL up to (not including) `/chat/completions`.
    pub base_url: String,
    /// Bearer credential. Empty means "send no Authorization header".
    #[serde(default, skip_serializing)]
    pub api_key: String,
    pub model: String,
    pub temperature: f32,
    pub max_tokens: u32,
    /// Hard limit for one upstream round trip.
    pub timeout_secs: u64,
    /// Optional `HTTP-Referer` attribution header (OpenRouter).
    pub referer: Option<String>,
    /// Optional `X-Title` attribution header (OpenRouter).
    pub title: Option<String>,
}

/// Explanation cache settings.
///
/// ## Fields:
/// - `capacity`: Maximum number of cached explanations (least recently used is evicted)
/// - `ttl_secs`: Optional lifetime of an entry; `None` keeps entries until evicted or cleared
/// - `coalesce_in_flight`: Share one upstream call between concurrent identical requests
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CacheConfig {
    pub capacity: usize,
    pub ttl_secs: Option<u64>,
    pub coalesce_in_flight: bool,
}

/// Request limits.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LimitsConfig {
    /// Longest accepted `text`/`term`, in characters.
    pub max_text_chars: usize,
    /// Optional cap on the `terms` array for `/explain-batch`. `None` accepts any length.
    #[serde(default)]
    pub max_batch_items: Option<usize>,
    /// Batch items processed at once. 1 means strictly sequential.
    pub batch_concurrency: usize,
}

impl fmt::Debug for UpstreamConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("UpstreamConfig")
            .field("base_url", &self.base_url)
            .field("api_key", &if self.api_key.is_empty() { "<unset>" } else { "<redacted>" })
            .field("model", &self.model)
            .field("temperature", &self.temperature)
            .field("max_tokens", &self.max_tokens)
            .field("timeout_secs", &self.timeout_secs)
            .field("referer", &self.referer)
            .field("title", &self.title)
            .finish()
    }
}

/// Provides default configuration values.
///
/// Default values ensure the application can start even if no configuration file exists.
/// They also serve as documentation of reasonable starting values.
impl Default for AppConfig {
    fn default() -> Self {
        Self {
            server: ServerConfig {
                host: "127.0.0.1".to_string(),
                port: 3001,
                json_limit_bytes: 10 * 1024 * 1024,  // 10 MiB, same as the browser client's limit
            },
            upstream: UpstreamConfig {
                base_url: "https://openrouter.ai/api/v1".to_string(),
                api_key: String::new(),
                model: "meta-llama/llama-3.3-70b-instruct:free".to_string(),
                temperature: 0.7,
                max_tokens: 1000,
                timeout_secs: 30,
                referer: None,
                title: Some("ELI5 Lecture Assistant".to_string()),
            },
            cache: CacheConfig {
                capacity: 1000,
                ttl_secs: None,
                coalesce_in_flight: true,
            },
            limits: LimitsConfig {
                max_text_chars: 10_000,
                max_batch_items: None,
                batch_concurrency: 1,
            },
        }
    }
}

impl AppConfig {
    /// Load configuration from multiple sources in priority order.
    ///
    /// ## Configuration Loading Process:
    /// 1. Start with built-in defaults
    /// 2. Override with values from config.toml (if it exists)
    /// 3. Override with environment variables prefixed with APP_ (nested keys use `__`)
    /// 4. Handle special cases for HOST, PORT and the provider API key variables
    ///
    /// ## Environment Variable Examples:
    /// - `APP_SERVER__PORT=8080`: Override server port
    /// - `APP_UPSTREAM__MODEL=llama-3.3-70b-versatile`: Override the model
    /// - `APP_CACHE__TTL_SECS=3600`: Expire cached explanations after an hour
    /// - `OPENROUTER_API_KEY=sk-...`: Credential for the default provider
    pub fn load() -> Result<Self> {
        let mut settings = config::Config::builder()
            .add_source(config::Config::try_from(&AppConfig::default())?)
            .add_source(config::File::with_name("config").required(false))
            .add_source(
                config::Environment::with_prefix("APP")
                    .prefix_separator("_")
                    .separator("__"),
            );

        // Deployment platforms set these without the APP_ prefix
        if let Ok(host) = env::var("HOST") {
            settings = settings.set_override("server.host", host)?;
        }

        if let Ok(port) = env::var("PORT") {
            settings = settings.set_override("server.port", port)?;
        }

        // api_key is skipped when defaults are serialized, so it only ever comes from here
        // or from config.toml / APP_UPSTREAM__API_KEY.
        if let Some(key) = api_key_from_env() {
            settings = settings.set_override("upstream.api_key", key)?;
        }

        let config = settings.build()?.try_deserialize()?;
        Ok(config)
    }

    /// Validate that the configuration values make sense.
    ///
    /// Catching configuration errors at startup prevents runtime failures and
    /// provides clear error messages about what's wrong.
    pub fn validate(&self) -> Result<()> {
        if self.server.port == 0 {
            return Err(anyhow::anyhow!("Server port cannot be 0"));
        }

        if self.upstream.base_url.trim().is_empty() {
            return Err(anyhow::anyhow!("Upstream base_url cannot be empty"));
        }

        if self.upstream.model.trim().is_empty() {
            return Err(anyhow::anyhow!("Upstream model cannot be empty"));
        }

        if !(0.0..=2.0).contains(&self.upstream.temperature) {
            return Err(anyhow::anyhow!("Upstream temperature must be between 0.0 and 2.0"));
        }

        if self.upstream.max_tokens == 0 {
            return Err(anyhow::anyhow!("Upstream max_tokens must be greater than 0"));
        }

        if self.upstream.timeout_secs == 0 {
            return Err(anyhow::anyhow!("Upstream timeout must be greater than 0"));
        }

        if self.cache.capacity == 0 {
            return Err(anyhow::anyhow!("Cache capacity must be greater than 0"));
        }

        if self.cache.ttl_secs == Some(0) {
            return Err(anyhow::anyhow!("Cache ttl_secs must be greater than 0 when set"));
        }

        if self.limits.max_text_chars == 0 {
            return Err(anyhow::anyhow!("max_text_chars must be greater than 0"));
        }

        if self.limits.max_batch_items == Some(0) {
            return Err(anyhow::anyhow!("max_batch_items must be greater than 0 when set"));
        }

        if self.limits.batch_concurrency == 0 {
            return Err(anyhow::anyhow!("batch_concurrency must be greater than 0"));
        }

        Ok(())
    }
}

impl UpstreamConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }

    pub fn has_api_key(&self) -> bool {
        !self.api_key.trim().is_empty()
    }
}

impl CacheConfig {
    pub fn ttl(&self) -> Option<Duration> {
        self.ttl_secs.map(Duration::from_secs)
    }
}

/// First non-empty provider credential found in the environment.
fn api_key_from_env() -> Option<String> {
    ["UPSTREAM_API_KEY", "OPENROUTER_API_KEY", "GROQ_API_KEY"]
        .iter()
        .filter_map(|name| env::var(name).ok())
        .find(|value| !value.trim().is_empty())
}
