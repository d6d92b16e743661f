//! # Explanation Client
//!
//! Issues one chat-completion request to an OpenAI-compatible text-generation API
//! (OpenRouter, Groq, OpenAI, Ollama in OpenAI mode, ...) and turns the reply into an
//! [`ExplanationResult`] or a classified [`UpstreamError`].
//!
//! The client never touches the explanation cache. Deciding what gets cached is the
//! pipeline's job (see `service.rs`).

use crate::config::UpstreamConfig;
use crate::simplifier::prompt::SimplificationLevel;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use reqwest::StatusCode;
use serde::Deserialize;
use serde_json::json;
use thiserror::Error;
use tracing::{debug, warn};

/// System message prefix shared by every level.
const SYSTEM_PREAMBLE: &str = "You are an expert at simplifying concepts.";

/// A generated explanation. Immutable once created; the cache stores it by value.
#[derive(Debug, Clone, PartialEq)]
pub struct ExplanationResult {
    /// The caller's text, exactly as it was sent upstream.
    pub input_text: String,
    pub explanation: String,
    pub level: SimplificationLevel,
    /// When the upstream call completed (not when it was read from the cache).
    pub created_at: DateTime<Utc>,
}

impl ExplanationResult {
    pub fn new(input_text: impl Into<String>, explanation: impl Into<String>, level: SimplificationLevel) -> Self {
        Self {
            input_text: input_text.into(),
            explanation: explanation.into(),
            level,
            created_at: Utc::now(),
        }
    }

    /// Length of the explanation in characters.
    pub fn explanation_length(&self) -> usize {
        self.explanation.chars().count()
    }
}

/// Failure of a single upstream call.
///
/// `Clone` so that coalesced callers waiting on the same call can each get a copy.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum UpstreamError {
    /// The provider rejected the credential (401/403).
    #[error("upstream rejected the API key (status {0})")]
    Unauthorized(u16),

    /// The provider is throttling us (429).
    #[error("upstream rate limit exceeded")]
    RateLimited,

    /// Non-success status, unparseable body, or no generated content.
    #[error("generation failed: {0}")]
    GenerationFailed(String),

    /// No usable response at all: connection error, timeout, broken body.
    #[error("transport failure: {0}")]
    TransportFailure(String),
}

impl UpstreamError {
    pub fn kind(&self) -> &'static str {
        match self {
            UpstreamError::Unauthorized(_) => "unauthorized",
            UpstreamError::RateLimited => "rate_limited",
            UpstreamError::GenerationFailed(_) => "generation_failed",
            UpstreamError::TransportFailure(_) => "transport_failure",
        }
    }
}

/// Logs the full reqwest error and keeps only a coarse description, so the
/// upstream URL and other detail stay out of client-facing responses.
fn transport_failure(err: reqwest::Error) -> UpstreamError {
    warn!(error = %err, "Upstream transport error");
    if err.is_timeout() {
        UpstreamError::TransportFailure("upstream request timed out".to_string())
    } else if err.is_connect() {
        UpstreamError::TransportFailure("could not connect to upstream".to_string())
    } else {
        UpstreamError::TransportFailure("upstream request failed".to_string())
    }
}

/// Everything the client needs for one call.
#[derive(Debug, Clone)]
pub struct ExplanationPrompt {
    pub text: String,
    pub context: Option<String>,
    pub level: SimplificationLevel,
    /// Resolved from `level` by the prompt selector.
    pub instructions: &'static str,
}

impl ExplanationPrompt {
    pub fn new(text: &str, context: Option<&str>, level: SimplificationLevel) -> Self {
        Self {
            text: text.to_string(),
            context: context
                .map(str::trim)
                .filter(|c| !c.is_empty())
                .map(str::to_string),
            level,
            instructions: level.instructions(),
        }
    }

    pub fn system_message(&self) -> String {
        format!("{} {}", SYSTEM_PREAMBLE, self.instructions)
    }

    pub fn user_message(&self) -> String {
        match &self.context {
            Some(context) => format!(
                "Please explain the following:\n\n{}\n\nContext: {}",
                self.text, context
            ),
            None => format!("Please explain the following:\n\n{}", self.text),
        }
    }
}

/// Seam between the pipeline and the text-generation provider.
///
/// Implementors must be `Send + Sync` so they can be shared as `Arc<dyn ExplanationClient>`.
#[async_trait]
pub trait ExplanationClient: Send + Sync {
    async fn explain(&self, prompt: &ExplanationPrompt) -> Result<ExplanationResult, UpstreamError>;
}

#[derive(Debug, Deserialize)]
struct ChatCompletionResponse {
    #[serde(default)]
    choices: Vec<ChatChoice>,
}

#[derive(Debug, Deserialize)]
struct ChatChoice {
    message: Option<ChatMessage>,
}

#[derive(Debug, Deserialize)]
struct ChatMessage {
    content: Option<String>,
}

/// Calls `{base_url}/chat/completions`.
///
/// All connection details come from [`UpstreamConfig`]; nothing is hardcoded.
pub struct OpenAiCompatibleClient {
    client: reqwest::Client,
    config: UpstreamConfig,
}

impl OpenAiCompatibleClient {
    /// Build a client whose every request is bounded by `config.timeout_secs`.
    pub fn from_config(config: &UpstreamConfig) -> anyhow::Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(config.timeout())
            .build()?;

        Ok(Self {
            client,
            config: config.clone(),
        })
    }

    fn endpoint(&self) -> String {
        format!("{}/chat/completions", self.config.base_url.trim_end_matches('/'))
    }
}

#[async_trait]
impl ExplanationClient for OpenAiCompatibleClient {
    async fn explain(&self, prompt: &ExplanationPrompt) -> Result<ExplanationResult, UpstreamError> {
        let body = json!({
            "model": self.config.model,
            "messages": [
                { "role": "system", "content": prompt.system_message() },
                { "role": "user",   "content": prompt.user_message() }
            ],
            "temperature": self.config.temperature,
            "max_tokens": self.config.max_tokens
        });

        let mut request = self.client.post(self.endpoint()).json(&body);

        // Local providers need no credential
        if self.config.has_api_key() {
            request = request.bearer_auth(self.config.api_key.trim());
        }
        if let Some(referer) = &self.config.referer {
            request = request.header("HTTP-Referer", referer);
        }
        if let Some(title) = &self.config.title {
            request = request.header("X-Title", title);
        }

        let response = request.send().await.map_err(transport_failure)?;
        let status = response.status();

        match status {
            StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => {
                return Err(UpstreamError::Unauthorized(status.as_u16()));
            }
            StatusCode::TOO_MANY_REQUESTS => return Err(UpstreamError::RateLimited),
            _ => {}
        }

        let raw = response.text().await.map_err(transport_failure)?;

        if !status.is_success() {
            debug!(status = %status.as_u16(), body = %truncate(&raw, 512), "Upstream returned an error status");
            return Err(UpstreamError::GenerationFailed(format!(
                "upstream returned status {}",
                status.as_u16()
            )));
        }

        let parsed: ChatCompletionResponse = serde_json::from_str(&raw).map_err(|e| {
            debug!(error = %e, body = %truncate(&raw, 512), "Unparseable upstream response");
            UpstreamError::GenerationFailed("upstream response was not valid JSON".to_string())
        })?;

        let explanation = parsed
            .choices
            .into_iter()
            .next()
            .and_then(|choice| choice.message)
            .and_then(|message| message.content)
            .map(|content| content.trim().to_string())
            .filter(|content| !content.is_empty())
            .ok_or_else(|| {
                UpstreamError::GenerationFailed("upstream response contained no generated content".to_string())
            })?;

        Ok(ExplanationResult::new(prompt.text.clone(), explanation, prompt.level))
    }
}

fn truncate(s: &str, max_chars: usize) -> &str {
    match s.char_indices().nth(max_chars) {
        Some((idx, _)) => &s[..idx],
        None => s,
    }
}
