// AI Provider Service
// OpenAI-compatible chat completions client and API key resolution

use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use std::time::{Duration, Instant};
use thiserror::Error;
use tracing::debug;

pub const OPENAI_DEFAULT_URL: &str = "https://api.openai.com/v1/chat/completions";
pub const DEFAULT_MODEL: &str = "gpt-4.1-mini";
pub const DEFAULT_TEMPERATURE: f64 = 0.7;
pub const DEFAULT_TIMEOUT_SECS: u64 = 60;

/// Environment variables consulted for the API key, in order.
pub const API_KEY_ENV_VARS: &[&str] = &["OPENAI_API_KEY", "FORENSICS_OPENAI_API_KEY"];
pub const API_URL_ENV_VAR: &str = "OPENAI_API_URL";

#[derive(Error, Debug)]
pub enum ProviderError {
    #[error("HTTP request failed: {0}")]
    HttpError(#[from] reqwest::Error),
    #[error("API error: {status} - {message}")]
    ApiError { status: u16, message: String },
    #[error("Missing content in response")]
    MissingContent,
    #[error("JSON parse error: {0}")]
    JsonError(String),
}

#[derive(Debug, Clone, Serialize)]
struct ChatMessage {
    role: String,
    content: String,
}

#[derive(Debug, Clone, Serialize)]
struct ChatRequest {
    model: String,
    messages: Vec<ChatMessage>,
    temperature: f64,
    #[serde(skip_serializing_if = "Option::is_none")]
    max_tokens: Option<u32>,
}

#[derive(Debug, Clone, Deserialize)]
struct ChatResponse {
    choices: Option<Vec<ChatChoice>>,
}

#[derive(Debug, Clone, Deserialize)]
struct ChatChoice {
    message: Option<ChatMessageResponse>,
}

#[derive(Debug, Clone, Deserialize)]
struct ChatMessageResponse {
    content: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChatResult {
    pub content: String,
    pub latency_ms: i64,
}

/// Pull the first choice's text out of a chat completions body.
fn extract_content(body: &str) -> Result<String, ProviderError> {
    let data: ChatResponse =
        serde_json::from_str(body).map_err(|e| ProviderError::JsonError(e.to_string()))?;
    data.choices
        .and_then(|c| c.into_iter().next())
        .and_then(|c| c.message)
        .and_then(|m| m.content)
        .ok_or(ProviderError::MissingContent)
}

pub struct ProviderClient {
    client: Client,
    chat_url: String,
}

impl ProviderClient {
    pub fn new(chat_url: impl Into<String>, timeout: Duration) -> Result<Self, ProviderError> {
        let client = Client::builder().timeout(timeout).build()?;
        Ok(Self {
            client,
            chat_url: chat_url.into(),
        })
    }

    pub fn with_proxy(chat_url: impl Into<String>, timeout: Duration, proxy_url: &str) -> Result<Self, ProviderError> {
        let proxy = reqwest::Proxy::all(proxy_url)?;
        let client = Client::builder().timeout(timeout).proxy(proxy).build()?;
        Ok(Self {
            client,
            chat_url: chat_url.into(),
        })
    }

    pub fn chat_url(&self) -> &str {
        &self.chat_url
    }

    pub async fn call_chat(
        &self,
        model: &str,
        api_key: &str,
        system: &str,
        user: &str,
        temperature: f64,
    ) -> Result<ChatResult, ProviderError> {
        let request = ChatRequest {
            model: model.to_string(),
            messages: vec![
                ChatMessage {
                    role: "system".to_string(),
                    content: system.to_string(),
                },
                ChatMessage {
                    role: "user".to_string(),
                    content: user.to_string(),
                },
            ],
            temperature,
            max_tokens: None,
        };

        let start = Instant::now();

        let response = self
            .client
            .post(&self.chat_url)
            .header("Authorization", format!("Bearer {}", api_key))
            .header("Content-Type", "application/json")
            .json(&request)
            .send()
            .await?;

        let latency_ms = start.elapsed().as_millis() as i64;
        let status = response.status();

        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(ProviderError::ApiError {
                status: status.as_u16(),
                message: body,
            });
        }

        let body = response.text().await?;
        let content = extract_content(&body)?;

        Ok(ChatResult {
            content,
            latency_ms,
        })
    }
}

// ============ Completion Backend ============

/// The single operation the transformation service needs from a generative model.
#[async_trait]
pub trait CompletionBackend: Send + Sync {
    async fn complete(&self, system: &str, user: &str) -> Result<String, ProviderError>;

    fn model(&self) -> &str;
}

pub struct OpenAiChatBackend {
    client: ProviderClient,
    api_key: String,
    model: String,
    temperature: f64,
}

impl OpenAiChatBackend {
    pub fn new(client: ProviderClient, api_key: impl Into<String>, model: impl Into<String>, temperature: f64) -> Self {
        Self {
            client,
            api_key: api_key.into(),
            model: model.into(),
            temperature,
        }
    }
}

#[async_trait]
impl CompletionBackend for OpenAiChatBackend {
    async fn complete(&self, system: &str, user: &str) -> Result<String, ProviderError> {
        let result = self
            .client
            .call_chat(&self.model, &self.api_key, system, user, self.temperature)
            .await?;
        debug!(
            model = %self.model,
            latency_ms = result.latency_ms,
            chars = result.content.len(),
            "[PROVIDER] chat completion ok"
        );
        Ok(result.content)
    }

    fn model(&self) -> &str {
        &self.model
    }
}

// ============ API Key Resolution ============

#[derive(Debug, Copy, Clone, Eq, PartialEq)]
pub enum ApiKeySource {
    /// `--api-key` on the command line.
    Flag,
    /// `llm.apiKey` in the config file.
    Config,
    Environment,
}

impl ApiKeySource {
    pub fn describe(&self) -> &'static str {
        match self {
            ApiKeySource::Flag => "command line",
            ApiKeySource::Config => "config file",
            ApiKeySource::Environment => "environment",
        }
    }
}

fn non_blank(value: Option<&str>) -> Option<String> {
    value
        .map(str::trim)
        .filter(|v| !v.is_empty())
        .map(str::to_string)
}

/// Explicit override beats the environment; nothing resolvable means disabled.
pub fn resolve_api_key_with<F>(
    flag: Option<&str>,
    config_key: Option<&str>,
    env_lookup: F,
) -> Option<(String, ApiKeySource)>
where
    F: Fn(&str) -> Option<String>,
{
    if let Some(key) = non_blank(flag) {
        return Some((key, ApiKeySource::Flag));
    }
    if let Some(key) = non_blank(config_key) {
        return Some((key, ApiKeySource::Config));
    }
    for var in API_KEY_ENV_VARS {
        if let Some(key) = non_blank(env_lookup(*var).as_deref()) {
            return Some((key, ApiKeySource::Environment));
        }
    }
    None
}

pub fn mask_key(key: &str) -> String {
    let chars: Vec<char> = key.chars().collect();
    if chars.len() <= 8 {
        return "*".repeat(chars.len());
    }
    let head: String = chars[..4].iter().collect();
    let tail: String = chars[chars.len() - 4..].iter().collect();
    format!("{}...{}", head, tail)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn env_of(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |k: &str| map.get(k).cloned()
    }

    #[test]
    fn test_flag_overrides_everything() {
        let env = env_of(&[("OPENAI_API_KEY", "sk-env")]);
        let (key, source) = resolve_api_key_with(Some("sk-flag"), Some("sk-config"), env).unwrap();
        assert_eq!(key, "sk-flag");
        assert_eq!(source, ApiKeySource::Flag);
    }

    #[test]
    fn test_config_key_beats_environment() {
        let env = env_of(&[("OPENAI_API_KEY", "sk-env")]);
        let (key, source) = resolve_api_key_with(None, Some("sk-config"), env).unwrap();
        assert_eq!(key, "sk-config");
        assert_eq!(source, ApiKeySource::Config);
    }

    #[test]
    fn test_environment_fallback_order() {
        let env = env_of(&[("FORENSICS_OPENAI_API_KEY", " sk-alt ")]);
        let (key, source) = resolve_api_key_with(None, None, env).unwrap();
        assert_eq!(key, "sk-alt");
        assert_eq!(source, ApiKeySource::Environment);
    }

    #[test]
    fn test_blank_values_mean_disabled() {
        let env = env_of(&[("OPENAI_API_KEY", "   ")]);
        assert!(resolve_api_key_with(Some(""), Some("  "), env).is_none());
    }

    #[test]
    fn test_extract_content() {
        let body = r#"{"choices":[{"message":{"role":"assistant","content":"hello"}}]}"#;
        assert_eq!(extract_content(body).unwrap(), "hello");

        assert!(matches!(extract_content(r#"{"choices":[]}"#), Err(ProviderError::MissingContent)));
        assert!(matches!(extract_content("<html>"), Err(ProviderError::JsonError(_))));
    }

    #[test]
    fn test_request_serialization() {
        let request = ChatRequest {
            model: DEFAULT_MODEL.to_string(),
            messages: vec![ChatMessage {
                role: "system".to_string(),
                content: "s".to_string(),
            }],
            temperature: DEFAULT_TEMPERATURE,
            max_tokens: None,
        };
        let json = serde_json::to_value(&request).unwrap();
        assert_eq!(json["model"], "gpt-4.1-mini");
        assert_eq!(json["temperature"], 0.7);
        assert!(json.get("max_tokens").is_none());
    }

    #[test]
    fn test_mask_key() {
        assert_eq!(mask_key("sk-1234567890"), "sk-1...7890");
        assert_eq!(mask_key("short"), "*****");
    }

    #[test]
    fn test_provider_client_creation() {
        let client = ProviderClient::new(OPENAI_DEFAULT_URL, Duration::from_secs(5)).unwrap();
        assert!(client.chat_url().contains("api.openai.com"));
    }
}
