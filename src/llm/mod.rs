//! LLM client for clause categorization.
//!
//! Supports Ollama for local inference and OpenAI-compatible APIs (OpenAI,
//! Groq, Together.ai). The client returns the raw model text; parsing it
//! into a partial result is the aggregator's job.

mod config;
mod prompts;

use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::debug;

pub use config::{LlmConfig, LlmProvider};
pub use prompts::skeleton;

use crate::models::ClauseKey;

/// Errors that can occur during LLM operations.
#[derive(Debug, Error)]
pub enum LlmError {
    /// Failed to connect to LLM service
    #[error("Connection error: {0}")]
    Connection(String),
    /// API returned an error
    #[error("API error: {0}")]
    Api(String),
    /// Failed to decode the response envelope
    #[error("Parse error: {0}")]
    Parse(String),
    #[error("Request timed out after {0}s")]
    Timeout(u64),
    #[error("LLM is disabled")]
    Disabled,
}

/// Something that can tag a chunk of contract text with clause keys.
#[async_trait]
pub trait Categorizer: Send + Sync {
    /// Ask for the clauses of `chunk_text` related to each of `keys`.
    ///
    /// Returns the model's raw text.
    async fn categorize(&self, chunk_text: &str, keys: &[ClauseKey]) -> Result<String, LlmError>;
}

/// LLM client for categorization.
pub struct LlmClient {
    config: LlmConfig,
    client: Client,
}

/// Ollama API request format.
#[derive(Debug, Serialize)]
struct OllamaRequest<'a> {
    model: &'a str,
    system: String,
    prompt: String,
    stream: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    format: Option<&'static str>,
    options: OllamaOptions,
}

#[derive(Debug, Serialize)]
struct OllamaOptions {
    temperature: f32,
    num_predict: u32,
}

/// Ollama API response format.
#[derive(Debug, Deserialize)]
struct OllamaResponse {
    response: String,
}

/// OpenAI-compatible chat request.
#[derive(Debug, Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    messages: Vec<ChatMessage>,
    max_tokens: u32,
    temperature: f32,
    #[serde(skip_serializing_if = "Option::is_none")]
    response_format: Option<ResponseFormat>,
}

#[derive(Debug, Serialize)]
struct ChatMessage {
    role: &'static str,
    content: String,
}

#[derive(Debug, Serialize)]
struct ResponseFormat {
    #[serde(rename = "type")]
    kind: &'static str,
}

#[derive(Debug, Deserialize)]
struct ChatResponse {
    choices: Option<Vec<ChatChoice>>,
    error: Option<ChatError>,
}

#[derive(Debug, Deserialize)]
struct ChatChoice {
    message: ChatResponseMessage,
}

#[derive(Debug, Deserialize)]
struct ChatResponseMessage {
    #[serde(default)]
    content: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ChatError {
    message: String,
}

impl LlmClient {
    /// Create a new LLM client with the given configuration.
    pub fn new(config: LlmConfig) -> Self {
        let client = Client::builder()
            .timeout(std::time::Duration::from_secs(300))
            .build()
            .unwrap_or_default();

        Self { config, client }
    }

    pub fn config(&self) -> &LlmConfig {
        &self.config
    }

    /// Check if the LLM service is reachable.
    pub async fn is_available(&self) -> bool {
        if !self.config.enabled {
            return false;
        }
        let url = match self.config.provider {
            LlmProvider::Ollama => format!("{}/api/tags", self.base_url()),
            LlmProvider::OpenAI => format!("{}/v1/models", self.base_url()),
        };
        let mut request = self.client.get(&url);
        if let Some(ref key) = self.config.api_key {
            request = request.bearer_auth(key);
        }
        match request.send().await {
            Ok(resp) => resp.status().is_success(),
            Err(_) => false,
        }
    }

    fn base_url(&self) -> &str {
        self.config.endpoint.trim_end_matches('/')
    }

    /// Truncate content to configured maximum (UTF-8 safe).
    fn truncate_content<'a>(&self, text: &'a str) -> &'a str {
        if text.len() <= self.config.max_content_chars {
            return text;
        }
        let mut end = self.config.max_content_chars;
        while end > 0 && !text.is_char_boundary(end) {
            end -= 1;
        }
        &text[..end]
    }

    /// Build the (system, user) prompt pair for a chunk.
    fn build_prompts(&self, chunk_text: &str, keys: &[ClauseKey]) -> (String, String) {
        let system = self
            .config
            .get_categorize_prompt()
            .replace("{skeleton}", &skeleton(keys));
        let user = self
            .config
            .get_content_prompt()
            .replace("{content}", self.truncate_content(chunk_text));
        (system, user)
    }

    fn map_send_error(e: reqwest::Error) -> LlmError {
        if e.is_timeout() {
            LlmError::Timeout(300)
        } else {
            LlmError::Connection(e.to_string())
        }
    }

    async fn call_ollama(&self, system: String, prompt: String) -> Result<String, LlmError> {
        let request = OllamaRequest {
            model: &self.config.model,
            system,
            prompt,
            stream: false,
            format: self.config.json_mode.then_some("json"),
            options: OllamaOptions {
                temperature: self.config.temperature,
                num_predict: self.config.max_tokens,
            },
        };

        let url = format!("{}/api/generate", self.base_url());
        let resp = self
            .client
            .post(&url)
            .json(&request)
            .send()
            .await
            .map_err(Self::map_send_error)?;

        if !resp.status().is_success() {
            let status = resp.status();
            let body = resp.text().await.unwrap_or_default();
            return Err(LlmError::Api(format!("HTTP {}: {}", status, body)));
        }

        let ollama_resp: OllamaResponse = resp
            .json()
            .await
            .map_err(|e| LlmError::Parse(e.to_string()))?;

        Ok(ollama_resp.response)
    }

    async fn call_openai(&self, system: String, prompt: String) -> Result<String, LlmError> {
        let request = ChatRequest {
            model: &self.config.model,
            messages: vec![
                ChatMessage {
                    role: "system",
                    content: system,
                },
                ChatMessage {
                    role: "user",
                    content: prompt,
                },
            ],
            max_tokens: self.config.max_tokens,
            temperature: self.config.temperature,
            response_format: self
                .config
                .json_mode
                .then_some(ResponseFormat { kind: "json_object" }),
        };

        let url = format!("{}/v1/chat/completions", self.base_url());
        let mut builder = self.client.post(&url).json(&request);
        if let Some(ref key) = self.config.api_key {
            builder = builder.bearer_auth(key);
        }
        let resp = builder.send().await.map_err(Self::map_send_error)?;

        let status = resp.status();
        let body = resp
            .text()
            .await
            .map_err(|e| LlmError::Connection(e.to_string()))?;

        let parsed: ChatResponse = match serde_json::from_str(&body) {
            Ok(parsed) => parsed,
            Err(_) if !status.is_success() => {
                return Err(LlmError::Api(format!("HTTP {}: {}", status, body)))
            }
            Err(e) => return Err(LlmError::Parse(e.to_string())),
        };

        if let Some(error) = parsed.error {
            return Err(LlmError::Api(error.message));
        }
        if !status.is_success() {
            return Err(LlmError::Api(format!("HTTP {}", status)));
        }

        parsed
            .choices
            .and_then(|choices| choices.into_iter().next())
            .and_then(|choice| choice.message.content)
            .ok_or_else(|| LlmError::Parse("Response has no message content".to_string()))
    }
}

#[async_trait]
impl Categorizer for LlmClient {
    async fn categorize(&self, chunk_text: &str, keys: &[ClauseKey]) -> Result<String, LlmError> {
        if !self.config.enabled {
            return Err(LlmError::Disabled);
        }

        let (system, prompt) = self.build_prompts(chunk_text, keys);
        debug!(
            "Categorizing {} chars against {} keys with {}",
            chunk_text.len(),
            keys.len(),
            self.config.model
        );

        match self.config.provider {
            LlmProvider::Ollama => self.call_ollama(system, prompt).await,
            LlmProvider::OpenAI => self.call_openai(system, prompt).await,
        }
    }
}
