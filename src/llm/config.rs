//! LLM client configuration.

use serde::{Deserialize, Serialize};

use super::prompts::{DEFAULT_CATEGORIZE_PROMPT, DEFAULT_CONTENT_PROMPT};

/// A hosted OpenAI-compatible service.
struct Hosted {
    name: &'static str,
    key_var: &'static str,
    endpoint: &'static str,
    /// Replaces the stock Ollama model when set.
    model: Option<&'static str>,
}

/// Hosted services, in auto-detection order.
const HOSTED: &[Hosted] = &[
    Hosted {
        name: "groq",
        key_var: "GROQ_API_KEY",
        endpoint: "https://api.groq.com/openai",
        model: Some("llama3-8b-8192"),
    },
    Hosted {
        name: "openai",
        key_var: "OPENAI_API_KEY",
        endpoint: "https://api.openai.com",
        model: Some("gpt-4o-mini"),
    },
    Hosted {
        name: "together",
        key_var: "TOGETHER_API_KEY",
        endpoint: "https://api.together.xyz",
        model: None,
    },
];

/// LLM provider type.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum LlmProvider {
    /// Ollama API (local, default)
    #[default]
    Ollama,
    /// OpenAI-compatible API (OpenAI, Groq, Together.ai, etc.)
    #[serde(alias = "groq", alias = "together")]
    OpenAI,
}

impl LlmProvider {
    pub fn from_str(s: &str) -> Option<Self> {
        match s.to_lowercase().as_str() {
            "ollama" => Some(Self::Ollama),
            "openai" | "groq" | "together" => Some(Self::OpenAI),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Ollama => "ollama",
            Self::OpenAI => "openai",
        }
    }
}

impl std::fmt::Display for LlmProvider {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Configuration for the categorizer client.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LlmConfig {
    /// Whether categorization is enabled
    #[serde(default = "default_enabled")]
    pub enabled: bool,
    /// LLM provider (ollama or openai)
    #[serde(default)]
    pub provider: LlmProvider,
    /// API endpoint (provider-specific defaults apply)
    #[serde(default = "default_endpoint")]
    pub endpoint: String,
    /// API key for OpenAI-compatible providers
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub api_key: Option<String>,
    #[serde(default = "default_model")]
    pub model: String,
    /// Maximum tokens in response
    #[serde(default = "default_max_tokens")]
    pub max_tokens: u32,
    /// Temperature for generation (0.0 - 1.0)
    #[serde(default = "default_temperature")]
    pub temperature: f32,
    /// Ask the provider for a JSON-only response
    #[serde(default = "default_json_mode")]
    pub json_mode: bool,
    /// Custom system prompt (uses the {skeleton} placeholder)
    #[serde(default)]
    pub categorize_prompt: Option<String>,
    /// Maximum characters of chunk text to send to the model
    #[serde(default = "default_max_content_chars")]
    pub max_content_chars: usize,
}

fn default_enabled() -> bool {
    true
}

fn default_endpoint() -> String {
    "http://localhost:11434".to_string()
}

fn default_model() -> String {
    "llama3:8b".to_string()
}

fn default_max_tokens() -> u32 {
    2048
}

fn default_temperature() -> f32 {
    0.1
}

fn default_json_mode() -> bool {
    true
}

fn default_max_content_chars() -> usize {
    12000
}

impl Default for LlmConfig {
    fn default() -> Self {
        Self::base_default().with_env_overrides()
    }
}

impl LlmConfig {
    /// Base default without env overrides.
    pub(crate) fn base_default() -> Self {
        Self {
            enabled: default_enabled(),
            provider: LlmProvider::default(),
            endpoint: default_endpoint(),
            api_key: None,
            model: default_model(),
            max_tokens: default_max_tokens(),
            temperature: default_temperature(),
            json_mode: default_json_mode(),
            categorize_prompt: None,
            max_content_chars: default_max_content_chars(),
        }
    }

    pub fn is_default(&self) -> bool {
        *self == Self::base_default()
    }

    /// Apply environment variable overrides.
    ///
    /// `LLM_ENABLED`, `LLM_PROVIDER`, `LLM_ENDPOINT`, `LLM_API_KEY`,
    /// `LLM_MODEL`, `LLM_MAX_TOKENS`, `LLM_TEMPERATURE`,
    /// `LLM_MAX_CONTENT_CHARS` and `LLM_CATEGORIZE_PROMPT` set the matching
    /// field. Naming a hosted service in `LLM_PROVIDER` (or, without one,
    /// having its API key set) fills in its endpoint, key and model.
    pub fn with_env_overrides(self) -> Self {
        self.apply_env(|name| std::env::var(name).ok().filter(|v| !v.is_empty()))
    }

    fn apply_env<F>(mut self, var: F) -> Self
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(val) = var("LLM_ENABLED") {
            self.enabled = val.eq_ignore_ascii_case("true") || val == "1";
        }

        let named = var("LLM_PROVIDER");
        if let Some(provider) = named.as_deref().and_then(LlmProvider::from_str) {
            self.provider = provider;
        }
        if let Some(key) = var("LLM_API_KEY") {
            self.api_key = Some(key);
        }

        let hosted = match named.as_deref() {
            Some(name) => HOSTED.iter().find(|h| h.name.eq_ignore_ascii_case(name.trim())),
            None if self.api_key.is_none() => HOSTED.iter().find(|h| var(h.key_var).is_some()),
            None => None,
        };
        if let Some(hosted) = hosted {
            self.provider = LlmProvider::OpenAI;
            self.endpoint = hosted.endpoint.to_string();
            if self.api_key.is_none() {
                self.api_key = var(hosted.key_var);
            }
            if let Some(model) = hosted.model.filter(|_| self.model == default_model()) {
                self.model = model.to_string();
            }
        }

        if let Some(endpoint) = var("LLM_ENDPOINT") {
            self.endpoint = endpoint;
        }
        if let Some(model) = var("LLM_MODEL") {
            self.model = model;
        }
        if let Some(n) = var("LLM_MAX_TOKENS").and_then(|v| v.parse().ok()) {
            self.max_tokens = n;
        }
        if let Some(t) = var("LLM_TEMPERATURE").and_then(|v| v.parse().ok()) {
            self.temperature = t;
        }
        if let Some(n) = var("LLM_MAX_CONTENT_CHARS").and_then(|v| v.parse().ok()) {
            self.max_content_chars = n;
        }
        if let Some(prompt) = var("LLM_CATEGORIZE_PROMPT") {
            self.categorize_prompt = Some(prompt);
        }
        self
    }

    pub fn with_endpoint(mut self, endpoint: &str) -> Self {
        self.endpoint = endpoint.to_string();
        self
    }

    pub fn with_model(mut self, model: &str) -> Self {
        self.model = model.to_string();
        self
    }

    /// Get the system prompt, using custom or default.
    pub fn get_categorize_prompt(&self) -> &str {
        self.categorize_prompt
            .as_deref()
            .unwrap_or(DEFAULT_CATEGORIZE_PROMPT)
    }

    pub fn get_content_prompt(&self) -> &str {
        DEFAULT_CONTENT_PROMPT
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_base_default() {
        let config = LlmConfig::base_default();
        assert!(config.enabled);
        assert_eq!(config.provider, LlmProvider::Ollama);
        assert!(config.is_default());
        assert!(config.get_categorize_prompt().contains("{skeleton}"));
    }

    #[test]
    fn test_provider_from_str() {
        assert_eq!(LlmProvider::from_str("Groq"), Some(LlmProvider::OpenAI));
        assert_eq!(LlmProvider::from_str("ollama"), Some(LlmProvider::Ollama));
        assert_eq!(LlmProvider::from_str("claude"), None);
    }

    fn env(vars: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let vars: Vec<(String, String)> = vars
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |name| vars.iter().find(|(k, _)| k == name).map(|(_, v)| v.clone())
    }

    #[test]
    fn test_groq_key_is_detected() {
        let config = LlmConfig::base_default().apply_env(env(&[("GROQ_API_KEY", "gsk")]));
        assert_eq!(config.provider, LlmProvider::OpenAI);
        assert_eq!(config.endpoint, "https://api.groq.com/openai");
        assert_eq!(config.api_key.as_deref(), Some("gsk"));
        assert_eq!(config.model, "llama3-8b-8192");
    }

    #[test]
    fn test_named_provider_wins_over_detection() {
        let config = LlmConfig::base_default().apply_env(env(&[
            ("LLM_PROVIDER", "together"),
            ("GROQ_API_KEY", "gsk"),
            ("TOGETHER_API_KEY", "tk"),
            ("LLM_MODEL", "mixtral"),
        ]));
        assert_eq!(config.endpoint, "https://api.together.xyz");
        assert_eq!(config.api_key.as_deref(), Some("tk"));
        assert_eq!(config.model, "mixtral");
    }

    #[test]
    fn test_explicit_values_override_hosted_defaults() {
        let config = LlmConfig::base_default().apply_env(env(&[
            ("OPENAI_API_KEY", "sk"),
            ("LLM_ENDPOINT", "http://proxy:8080"),
            ("LLM_MAX_TOKENS", "512"),
            ("LLM_TEMPERATURE", "warm"),
        ]));
        assert_eq!(config.provider, LlmProvider::OpenAI);
        assert_eq!(config.endpoint, "http://proxy:8080");
        assert_eq!(config.api_key.as_deref(), Some("sk"));
        assert_eq!(config.max_tokens, 512);
        assert_eq!(config.temperature, LlmConfig::base_default().temperature);
    }

    #[test]
    fn test_local_ollama_untouched() {
        let config = LlmConfig::base_default().apply_env(env(&[("LLM_ENABLED", "0")]));
        assert!(!config.enabled);
        assert_eq!(config.provider, LlmProvider::Ollama);
        assert_eq!(config.endpoint, "http://localhost:11434");
    }

    #[test]
    fn test_deserialize_partial() {
        let config: LlmConfig =
            toml::from_str("provider = \"groq\"\nmodel = \"llama3-70b-8192\"").unwrap();
        assert_eq!(config.provider, LlmProvider::OpenAI);
        assert_eq!(config.model, "llama3-70b-8192");
        assert_eq!(config.max_tokens, 2048);
        assert!(config.json_mode);
    }
}
