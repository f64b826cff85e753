/// LLM Client — the single point of entry for all text-generation calls.
///
/// ARCHITECTURAL RULE: No other module may call the completion backend directly.
/// Question generation and evaluation go through the `TextGenerator` trait,
/// which `LlmClient` implements on top of an OpenAI-compatible chat endpoint.
use std::future::Future;
use std::time::Duration;

use async_trait::async_trait;
use reqwest::{Client, StatusCode};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{debug, warn};

pub const DEFAULT_API_URL: &str = "https://api.groq.com/openai/v1/chat/completions";
pub const DEFAULT_MODEL: &str = "llama-3.3-70b-versatile";

#[derive(Debug, Error)]
pub enum LlmError {
    /// Missing or rejected credential. Never retried.
    #[error("Configuration error: {0}")]
    Configuration(String),

    #[error("Invalid generation request: {0}")]
    InvalidRequest(String),

    #[error("Generation exhausted after {attempts} attempts: {last_failure}")]
    Exhausted { attempts: u32, last_failure: String },
}

/// Contract shared by every component that needs generated text.
#[async_trait]
pub trait TextGenerator: Send + Sync {
    async fn generate(
        &self,
        prompt: &str,
        max_output_tokens: u32,
        temperature: f32,
    ) -> Result<String, LlmError>;
}

// ────────────────────────────────────────────────────────────────────────────
// Retry policy
// ────────────────────────────────────────────────────────────────────────────

/// Classification of one failed request, consumed by `run_with_retry`.
#[derive(Debug)]
pub enum AttemptFailure {
    RateLimited,
    Transient(String),
    Unauthorized(String),
}

#[derive(Debug, Clone)]
pub struct RetryPolicy {
    /// Total attempts allowed to end in a rate-limit response.
    pub max_attempts: u32,
    /// Total attempts allowed to end in any other recoverable failure.
    pub max_transient_failures: u32,
    pub backoff_cap: Duration,
    pub transient_delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 4,
            max_transient_failures: 4,
            backoff_cap: Duration::from_secs(20),
            transient_delay: Duration::from_secs(1),
        }
    }
}

impl RetryPolicy {
    /// `min(2^attempt, cap)` seconds, with `attempt` counted from zero.
    pub fn backoff_for(&self, attempt: u32) -> Duration {
        let secs = 2u64.checked_pow(attempt).unwrap_or(u64::MAX);
        Duration::from_secs(secs).min(self.backoff_cap)
    }
}

/// Drives `attempt` until it succeeds or a budget runs out.
///
/// Rate limits advance the exponential backoff; other recoverable failures
/// wait a flat delay and are counted against their own budget, so they never
/// burn a rate-limit slot. Authentication failures end the loop immediately.
pub async fn run_with_retry<F, Fut>(policy: &RetryPolicy, mut attempt: F) -> Result<String, LlmError>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<String, AttemptFailure>>,
{
    let mut rate_limited = 0u32;
    let mut transient = 0u32;

    loop {
        let failure = match attempt().await {
            Ok(text) => return Ok(text),
            Err(failure) => failure,
        };

        let wait = match failure {
            AttemptFailure::Unauthorized(message) => {
                return Err(LlmError::Configuration(format!(
                    "credential rejected by generation backend: {message}"
                )));
            }
            AttemptFailure::RateLimited => {
                let wait = policy.backoff_for(rate_limited);
                rate_limited += 1;
                if rate_limited >= policy.max_attempts {
                    return Err(LlmError::Exhausted {
                        attempts: rate_limited + transient,
                        last_failure: "rate limited".to_string(),
                    });
                }
                warn!(
                    "Rate limited by generation backend ({}/{}), retrying in {}s",
                    rate_limited,
                    policy.max_attempts,
                    wait.as_secs()
                );
                wait
            }
            AttemptFailure::Transient(message) => {
                transient += 1;
                if transient >= policy.max_transient_failures {
                    return Err(LlmError::Exhausted {
                        attempts: rate_limited + transient,
                        last_failure: message,
                    });
                }
                warn!(
                    "Generation backend error ({}/{}): {}",
                    transient, policy.max_transient_failures, message
                );
                policy.transient_delay
            }
        };

        tokio::time::sleep(wait).await;
    }
}

/// Rejects requests that could never succeed before any network attempt.
pub fn validate_request(
    prompt: &str,
    max_output_tokens: u32,
    temperature: f32,
) -> Result<(), LlmError> {
    if prompt.trim().is_empty() {
        return Err(LlmError::InvalidRequest("prompt must not be empty".to_string()));
    }
    if max_output_tokens == 0 {
        return Err(LlmError::InvalidRequest(
            "max_output_tokens must be positive".to_string(),
        ));
    }
    if !(0.0..=1.0).contains(&temperature) {
        return Err(LlmError::InvalidRequest(format!(
            "temperature must be within [0, 1], got {temperature}"
        )));
    }
    Ok(())
}

// ────────────────────────────────────────────────────────────────────────────
// Wire types (OpenAI-compatible chat completions)
// ────────────────────────────────────────────────────────────────────────────

#[derive(Debug, Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    messages: Vec<ChatMessage<'a>>,
    max_tokens: u32,
    temperature: f32,
}

#[derive(Debug, Serialize)]
struct ChatMessage<'a> {
    role: &'a str,
    content: &'a str,
}

#[derive(Debug, Deserialize)]
struct ChatResponse {
    choices: Vec<ChatChoice>,
    usage: Option<Usage>,
}

#[derive(Debug, Deserialize)]
struct ChatChoice {
    message: ChatChoiceMessage,
}

#[derive(Debug, Deserialize)]
struct ChatChoiceMessage {
    content: Option<String>,
}

#[derive(Debug, Deserialize)]
struct Usage {
    prompt_tokens: u32,
    completion_tokens: u32,
}

impl ChatResponse {
    fn into_text(self) -> Option<String> {
        self.choices
            .into_iter()
            .next()
            .and_then(|c| c.message.content)
            .filter(|text| !text.trim().is_empty())
    }
}

// ────────────────────────────────────────────────────────────────────────────
// Client
// ────────────────────────────────────────────────────────────────────────────

/// Stateless client for the completion backend. Cheap to clone and safe to
/// share across sessions.
#[derive(Clone)]
pub struct LlmClient {
    client: Client,
    api_key: Option<String>,
    api_url: String,
    model: String,
    retry: RetryPolicy,
}

impl LlmClient {
    pub fn new(api_key: Option<String>, api_url: String, model: String) -> Result<Self, LlmError> {
        let client = Client::builder()
            .timeout(Duration::from_secs(120))
            .build()
            .map_err(|e| LlmError::Configuration(format!("failed to build HTTP client: {e}")))?;

        Ok(Self {
            client,
            api_key: api_key.filter(|key| !key.trim().is_empty()),
            api_url,
            model,
            retry: RetryPolicy::default(),
        })
    }

    pub fn model(&self) -> &str {
        &self.model
    }

    async fn send_once(
        &self,
        api_key: &str,
        body: &ChatRequest<'_>,
    ) -> Result<String, AttemptFailure> {
        let response = self
            .client
            .post(&self.api_url)
            .bearer_auth(api_key)
            .json(body)
            .send()
            .await
            .map_err(|e| AttemptFailure::Transient(format!("HTTP error: {e}")))?;

        let status = response.status();

        if status == StatusCode::TOO_MANY_REQUESTS {
            return Err(AttemptFailure::RateLimited);
        }

        if status == StatusCode::UNAUTHORIZED || status == StatusCode::FORBIDDEN {
            let body = response.text().await.unwrap_or_default();
            return Err(AttemptFailure::Unauthorized(format!("status {status}: {body}")));
        }

        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(AttemptFailure::Transient(format!("status {status}: {body}")));
        }

        let parsed: ChatResponse = response
            .json()
            .await
            .map_err(|e| AttemptFailure::Transient(format!("undecodable response: {e}")))?;

        if let Some(usage) = &parsed.usage {
            debug!(
                "Generation succeeded: prompt_tokens={}, completion_tokens={}",
                usage.prompt_tokens, usage.completion_tokens
            );
        }

        parsed
            .into_text()
            .ok_or_else(|| AttemptFailure::Transient("backend returned empty content".to_string()))
    }
}

#[async_trait]
impl TextGenerator for LlmClient {
    async fn generate(
        &self,
        prompt: &str,
        max_output_tokens: u32,
        temperature: f32,
    ) -> Result<String, LlmError> {
        validate_request(prompt, max_output_tokens, temperature)?;

        let api_key = self
            .api_key
            .as_deref()
            .ok_or_else(|| LlmError::Configuration("GROQ_API_KEY is not set".to_string()))?;

        let body = ChatRequest {
            model: &self.model,
            messages: vec![ChatMessage {
                role: "user",
                content: prompt,
            }],
            max_tokens: max_output_tokens,
            temperature,
        };

        run_with_retry(&self.retry, || self.send_once(api_key, &body)).await
    }
}

/// Strips ```json ... ``` or ``` ... ``` code fences from LLM output.
pub fn strip_json_fences(text: &str) -> &str {
    let text = text.trim();
    if let Some(stripped) = text.strip_prefix("```json") {
        stripped
            .trim_start()
            .strip_suffix("```")
            .map(|s| s.trim())
            .unwrap_or(stripped.trim_start())
    } else if let Some(stripped) = text.strip_prefix("```") {
        stripped
            .trim_start()
            .strip_suffix("```")
            .map(|s| s.trim())
            .unwrap_or(stripped.trim_start())
    } else {
        text
    }
}
