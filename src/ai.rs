//! AI model provider abstraction and implementations.
//!
//! Defines the [`AiProvider`] capability trait and concrete providers:
//! - **[`DisabledProvider`]**: fails every request; used when no model is configured.
//! - **[`OpenAiProvider`]**: OpenAI-compatible chat completions in JSON mode.
//! - **[`OllamaProvider`]**: a local Ollama instance's `/api/chat` endpoint.
//!
//! # Provider Selection
//!
//! Use [`create_provider`] once at startup; callers hold the result as
//! `Arc<dyn AiProvider>` and never inspect the concrete type.
//!
//! # Retry Strategy
//!
//! Both HTTP providers retry transient errors with exponential backoff:
//! - HTTP 429 (rate limited) and 5xx (server error) → retry
//! - HTTP 4xx (client error, not 429) → fail immediately
//! - Network errors → retry
//! - Backoff: 1s, 2s, 4s, 8s, 16s, 32s (capped at 2^5)

use anyhow::{anyhow, bail, Context, Result};
use async_trait::async_trait;
use serde_json::{json, Value};
use std::sync::Arc;
use std::time::Duration;

use crate::config::AiConfig;

/// A single structured-output request.
#[derive(Debug, Clone)]
pub struct CompletionRequest {
    pub system_prompt: String,
    pub user_prompt: String,
    /// Structured input echoed alongside the prompt.
    pub data: Value,
    /// Ask the model for a strict JSON object.
    pub json_mode: bool,
}

/// A successful model response.
#[derive(Debug, Clone, PartialEq)]
pub struct Completion {
    pub data: Value,
    pub tokens_used: Option<u64>,
    pub cost: Option<f64>,
}

#[async_trait]
pub trait AiProvider: Send + Sync {
    /// Provider identifier (e.g. `"openai"`).
    fn name(&self) -> &str;

    fn model(&self) -> &str;

    /// Run one request. Any failure, including unparseable output, is an `Err`.
    async fn complete(&self, request: &CompletionRequest) -> Result<Completion>;

    /// Estimated dollar cost for a call with the given token counts.
    fn cost_estimate(&self, _prompt_tokens: u64, _completion_tokens: u64) -> f64 {
        0.0
    }
}

pub fn create_provider(config: &AiConfig) -> Result<Arc<dyn AiProvider>> {
    match config.provider.as_str() {
        "disabled" => Ok(Arc::new(DisabledProvider)),
        "openai" => Ok(Arc::new(OpenAiProvider::new(config)?)),
        "ollama" => Ok(Arc::new(OllamaProvider::new(config)?)),
        other => bail!("Unknown AI provider: {}", other),
    }
}

// ============ Disabled Provider ============

pub struct DisabledProvider;

#[async_trait]
impl AiProvider for DisabledProvider {
    fn name(&self) -> &str {
        "disabled"
    }

    fn model(&self) -> &str {
        "disabled"
    }

    async fn complete(&self, _request: &CompletionRequest) -> Result<Completion> {
        bail!("AI provider is disabled")
    }
}

// ============ OpenAI Provider ============

/// Chat completions against the OpenAI API (or a compatible gateway).
///
/// Requires the `OPENAI_API_KEY` environment variable.
pub struct OpenAiProvider {
    model: String,
    url: String,
    api_key: String,
    max_retries: u32,
    input_cost_per_1k: f64,
    output_cost_per_1k: f64,
    client: reqwest::Client,
}

impl OpenAiProvider {
    pub fn new(config: &AiConfig) -> Result<Self> {
        let model = config
            .model
            .clone()
            .ok_or_else(|| anyhow!("ai.model required for OpenAI provider"))?;
        let api_key = std::env::var("OPENAI_API_KEY")
            .map_err(|_| anyhow!("OPENAI_API_KEY environment variable not set"))?;
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()?;

        Ok(Self {
            model,
            url: config
                .url
                .clone()
                .unwrap_or_else(|| "https://api.openai.com/v1".to_string()),
            api_key,
            max_retries: config.max_retries,
            input_cost_per_1k: config.input_cost_per_1k,
            output_cost_per_1k: config.output_cost_per_1k,
            client,
        })
    }
}

#[async_trait]
impl AiProvider for OpenAiProvider {
    fn name(&self) -> &str {
        "openai"
    }

    fn model(&self) -> &str {
        &self.model
    }

    async fn complete(&self, request: &CompletionRequest) -> Result<Completion> {
        let mut body = json!({
            "model": self.model,
            "temperature": 0.1,
            "messages": [
                { "role": "system", "content": request.system_prompt },
                { "role": "user", "content": request.user_prompt },
            ],
        });
        if request.json_mode {
            body["response_format"] = json!({ "type": "json_object" });
        }

        let url = format!("{}/chat/completions", self.url.trim_end_matches('/'));
        let json = post_with_retry(
            "OpenAI",
            self.max_retries,
            self.client
                .post(&url)
                .header("Authorization", format!("Bearer {}", self.api_key))
                .json(&body),
        )
        .await?;

        let content = json
            .pointer("/choices/0/message/content")
            .and_then(|c| c.as_str())
            .ok_or_else(|| anyhow!("Invalid OpenAI response: missing message content"))?;
        let data = parse_json_content(content)?;

        let prompt_tokens = json
            .pointer("/usage/prompt_tokens")
            .and_then(Value::as_u64)
            .unwrap_or(0);
        let completion_tokens = json
            .pointer("/usage/completion_tokens")
            .and_then(Value::as_u64)
            .unwrap_or(0);

        Ok(Completion {
            data,
            tokens_used: Some(prompt_tokens + completion_tokens),
            cost: Some(self.cost_estimate(prompt_tokens, completion_tokens)),
        })
    }

    fn cost_estimate(&self, prompt_tokens: u64, completion_tokens: u64) -> f64 {
        (prompt_tokens as f64 / 1000.0) * self.input_cost_per_1k
            + (completion_tokens as f64 / 1000.0) * self.output_cost_per_1k
    }
}

// ============ Ollama Provider ============

/// Chat against a local Ollama instance (default `http://localhost:11434`).
pub struct OllamaProvider {
    model: String,
    url: String,
    max_retries: u32,
    client: reqwest::Client,
}

impl OllamaProvider {
    pub fn new(config: &AiConfig) -> Result<Self> {
        let model = config
            .model
            .clone()
            .ok_or_else(|| anyhow!("ai.model required for Ollama provider"))?;
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()?;

        Ok(Self {
            model,
            url: config
                .url
                .clone()
                .unwrap_or_else(|| "http://localhost:11434".to_string()),
            max_retries: config.max_retries,
            client,
        })
    }
}

#[async_trait]
impl AiProvider for OllamaProvider {
    fn name(&self) -> &str {
        "ollama"
    }

    fn model(&self) -> &str {
        &self.model
    }

    async fn complete(&self, request: &CompletionRequest) -> Result<Completion> {
        let mut body = json!({
            "model": self.model,
            "stream": false,
            "messages": [
                { "role": "system", "content": request.system_prompt },
                { "role": "user", "content": request.user_prompt },
            ],
        });
        if request.json_mode {
            body["format"] = json!("json");
        }

        let url = format!("{}/api/chat", self.url.trim_end_matches('/'));
        let json = post_with_retry("Ollama", self.max_retries, self.client.post(&url).json(&body))
            .await
            .with_context(|| format!("Ollama request failed (is Ollama running at {}?)", self.url))?;

        let content = json
            .pointer("/message/content")
            .and_then(|c| c.as_str())
            .ok_or_else(|| anyhow!("Invalid Ollama response: missing message content"))?;
        let data = parse_json_content(content)?;

        let tokens = json.get("prompt_eval_count").and_then(Value::as_u64).unwrap_or(0)
            + json.get("eval_count").and_then(Value::as_u64).unwrap_or(0);

        Ok(Completion {
            data,
            tokens_used: Some(tokens),
            cost: Some(0.0),
        })
    }
}

// ============ Shared helpers ============

async fn post_with_retry(
    label: &str,
    max_retries: u32,
    request: reqwest::RequestBuilder,
) -> Result<Value> {
    let mut last_err = None;

    for attempt in 0..=max_retries {
        if attempt > 0 {
            let delay = Duration::from_secs(1 << (attempt - 1).min(5));
            tracing::warn!(provider = label, attempt, delay_secs = delay.as_secs(), "retrying AI request");
            tokio::time::sleep(delay).await;
        }

        let req = request
            .try_clone()
            .ok_or_else(|| anyhow!("{} request body cannot be retried", label))?;

        match req.send().await {
            Ok(response) => {
                let status = response.status();

                if status.is_success() {
                    return Ok(response.json().await?);
                }

                let body_text = response.text().await.unwrap_or_default();
                if status.as_u16() == 429 || status.is_server_error() {
                    last_err = Some(anyhow!("{} API error {}: {}", label, status, body_text));
                    continue;
                }

                bail!("{} API error {}: {}", label, status, body_text);
            }
            Err(e) => {
                last_err = Some(e.into());
                continue;
            }
        }
    }

    Err(last_err.unwrap_or_else(|| anyhow!("{} request failed after retries", label)))
}

/// Parse model text as JSON, unwrapping a markdown code fence if present.
pub fn parse_json_content(content: &str) -> Result<Value> {
    let trimmed = content.trim();
    let unfenced = trimmed
        .strip_prefix("```json")
        .or_else(|| trimmed.strip_prefix("```"))
        .and_then(|s| s.strip_suffix("```"))
        .unwrap_or(trimmed)
        .trim();

    serde_json::from_str(unfenced).context("Model returned invalid JSON")
}
