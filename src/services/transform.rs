// Text Transformation Service
// Explain, humanize or adversarially rewrite text through a generative backend

use std::sync::Arc;
use std::time::{Duration, Instant};
use thiserror::Error;
use tracing::{info, warn};

use crate::models::{TransformMode, TransformRequest};
use crate::services::config_store::LlmSettings;
use crate::services::providers::{CompletionBackend, OpenAiChatBackend, ProviderClient, ProviderError};

pub const EXPLANATION_WORD_LIMIT: usize = 200;

/// Extra time the HTTP client gets beyond the service timeout, so a slow call
/// surfaces as `TransformError::Timeout` rather than a transport error.
pub const CLIENT_TIMEOUT_GRACE: Duration = Duration::from_secs(5);

#[derive(Error, Debug)]
pub enum TransformError {
    #[error("transformation disabled (no API key configured)")]
    Disabled,
    #[error("transformation timed out after {0:?}")]
    Timeout(Duration),
    #[error("transformation service returned an empty response")]
    EmptyResponse,
    #[error("transformation service failed: {0}")]
    Provider(#[from] ProviderError),
}

const EXPLAIN_SYSTEM_PROMPT: &str = "You are an AI content forensics expert.";

const EXPLAIN_INSTRUCTIONS: &str = r#"Explain the classifier output above:
- why the text reads as AI-written or human-written
- why the sentiment and formality labels were predicted
- which aspects of style, structure and vocabulary drove the result
Keep the explanation under 200 words."#;

const HUMANIZE_SYSTEM_PROMPT: &str = "You rewrite AI-generated text so it reads as written by a person.";

const HUMANIZE_INSTRUCTIONS: &str = r#"Rewrite the text so it sounds more human: less generic, slightly more natural.
Preserve the meaning.
Return ONLY the rewritten text."#;

const ADVERSARIAL_SYSTEM_PROMPT: &str = "You attempt to get text past an AI-authorship detector.";

const ADVERSARIAL_INSTRUCTIONS: &str = r#"Rewrite the text so the classifiers judge it as HUMAN-written.
Keep the meaning; change the style only subtly.
Return ONLY the rewritten text."#;

/// System instruction and user prompt for one request.
pub fn build_prompt(request: &TransformRequest) -> (&'static str, String) {
    let (system, instructions) = match request.mode {
        TransformMode::Explain => (EXPLAIN_SYSTEM_PROMPT, EXPLAIN_INSTRUCTIONS),
        TransformMode::Humanize => (HUMANIZE_SYSTEM_PROMPT, HUMANIZE_INSTRUCTIONS),
        TransformMode::Adversarial => (ADVERSARIAL_SYSTEM_PROMPT, ADVERSARIAL_INSTRUCTIONS),
    };

    let user = format!(
        "TEXT:\n{}\n\nCLASSIFIER OUTPUT:\n{}\n\n{}\n",
        request.source_text,
        request.prior_verdict.to_pretty_json(),
        instructions
    );
    (system, user)
}

/// Cut `text` after `limit` whitespace-separated words, keeping original spacing.
pub fn clip_words(text: &str, limit: usize) -> (String, bool) {
    let mut words = text.split_whitespace();
    let last = match words.by_ref().take(limit).last() {
        Some(word) => word,
        None => return (text.to_string(), false),
    };
    if words.next().is_none() {
        return (text.to_string(), false);
    }
    let end = last.as_ptr() as usize - text.as_ptr() as usize + last.len();
    (format!("{}...", &text[..end]), true)
}

pub struct TransformService {
    backend: Option<Arc<dyn CompletionBackend>>,
    timeout: Duration,
}

/// HTTP client timeout for a given service timeout.
fn client_timeout(service: Duration) -> Duration {
    service + CLIENT_TIMEOUT_GRACE
}

impl TransformService {
    /// No backend: every request short-circuits with `TransformError::Disabled`.
    pub fn disabled() -> Self {
        Self {
            backend: None,
            timeout: Duration::from_secs(crate::services::providers::DEFAULT_TIMEOUT_SECS),
        }
    }

    pub fn new(backend: Arc<dyn CompletionBackend>, timeout: Duration) -> Self {
        Self {
            backend: Some(backend),
            timeout,
        }
    }

    /// Build from resolved settings. Without an API key the service is disabled.
    pub fn from_settings(settings: &LlmSettings) -> Result<Self, ProviderError> {
        let api_key = match &settings.api_key {
            Some(key) => key,
            None => {
                info!("[TRANSFORM] No API key resolved; transformation disabled");
                return Ok(Self::disabled());
            }
        };

        let http_timeout = client_timeout(settings.timeout);
        let client = match &settings.proxy {
            Some(proxy) => ProviderClient::with_proxy(&settings.chat_url, http_timeout, proxy)?,
            None => ProviderClient::new(&settings.chat_url, http_timeout)?,
        };

        info!(
            model = %settings.model,
            url = %client.chat_url(),
            key_source = settings.key_source.map(|s| s.describe()).unwrap_or("none"),
            "[TRANSFORM] Transformation enabled"
        );
        let backend = OpenAiChatBackend::new(client, api_key, &settings.model, settings.temperature);
        Ok(Self::new(Arc::new(backend), settings.timeout))
    }

    /// Like `from_settings`, but a client that cannot be built leaves the
    /// service disabled so analysis keeps working.
    pub fn from_settings_or_disabled(settings: &LlmSettings) -> Self {
        match Self::from_settings(settings) {
            Ok(service) => service,
            Err(e) => {
                warn!("[TRANSFORM] Cannot build generative client, transformation disabled: {}", e);
                Self::disabled()
            }
        }
    }

    pub fn is_enabled(&self) -> bool {
        self.backend.is_some()
    }

    pub fn model(&self) -> Option<&str> {
        self.backend.as_ref().map(|b| b.model())
    }

    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    /// Run one request. Fails fast: no retry, no cached or partial output.
    pub async fn transform(&self, request: TransformRequest) -> Result<String, TransformError> {
        let backend = self.backend.as_ref().ok_or(TransformError::Disabled)?;
        let (system, user) = build_prompt(&request);
        let start = Instant::now();

        info!(
            request_id = %request.id,
            mode = request.mode.name(),
            model = backend.model(),
            "[TRANSFORM] request started"
        );

        let content = match tokio::time::timeout(self.timeout, backend.complete(system, &user)).await {
            Ok(Ok(content)) => content,
            Ok(Err(e)) => {
                warn!(request_id = %request.id, mode = request.mode.name(), "[TRANSFORM] provider error: {}", e);
                return Err(TransformError::Provider(e));
            }
            Err(_) => {
                warn!(
                    request_id = %request.id,
                    mode = request.mode.name(),
                    "[TRANSFORM] timed out after {:?}",
                    self.timeout
                );
                return Err(TransformError::Timeout(self.timeout));
            }
        };

        let content = content.trim();
        if content.is_empty() {
            warn!(request_id = %request.id, "[TRANSFORM] empty response");
            return Err(TransformError::EmptyResponse);
        }

        let output = if request.mode == TransformMode::Explain {
            let (clipped, was_clipped) = clip_words(content, EXPLANATION_WORD_LIMIT);
            if was_clipped {
                warn!(request_id = %request.id, "[TRANSFORM] explanation clipped to {} words", EXPLANATION_WORD_LIMIT);
            }
            clipped
        } else {
            content.to_string()
        };

        info!(
            request_id = %request.id,
            mode = request.mode.name(),
            chars = output.chars().count(),
            elapsed_ms = start.elapsed().as_millis() as u64,
            "[TRANSFORM] request completed"
        );
        Ok(output)
    }
}

#[cfg(test)]
pub(crate) mod testing {
    use super::*;
    use async_trait::async_trait;
    use std::collections::VecDeque;
    use std::sync::Mutex;

    pub enum Scripted {
        Reply(String),
        Fail(u16),
        Hang,
    }

    /// In-memory backend replaying scripted replies and recording every prompt.
    pub struct ScriptedBackend {
        replies: Mutex<VecDeque<Scripted>>,
        pub calls: Mutex<Vec<(String, String)>>,
    }

    impl ScriptedBackend {
        pub fn new(replies: Vec<Scripted>) -> Arc<Self> {
            Arc::new(Self {
                replies: Mutex::new(replies.into()),
                calls: Mutex::new(Vec::new()),
            })
        }

        pub fn replying(texts: &[&str]) -> Arc<Self> {
            Self::new(texts.iter().map(|t| Scripted::Reply(t.to_string())).collect())
        }

        pub fn call_count(&self) -> usize {
            self.calls.lock().unwrap().len()
        }
    }

    #[async_trait]
    impl CompletionBackend for ScriptedBackend {
        async fn complete(&self, system: &str, user: &str) -> Result<String, ProviderError> {
            self.calls
                .lock()
                .unwrap()
                .push((system.to_string(), user.to_string()));
            let next = self.replies.lock().unwrap().pop_front();
            match next {
                Some(Scripted::Reply(text)) => Ok(text),
                Some(Scripted::Fail(status)) => Err(ProviderError::ApiError {
                    status,
                    message: "scripted failure".to_string(),
                }),
                Some(Scripted::Hang) => {
                    tokio::time::sleep(Duration::from_secs(3600)).await;
                    Err(ProviderError::MissingContent)
                }
                None => Err(ProviderError::MissingContent),
            }
        }

        fn model(&self) -> &str {
            "scripted"
        }
    }
}

#[cfg(test)]
mod tests {
    use super::testing::{Scripted, ScriptedBackend};
    use super::*;
    use crate::models::Axis;
    use crate::services::inference::{analyze, fixtures};

    fn request(text: &str, mode: TransformMode) -> TransformRequest {
        let bundle = fixtures::bundle();
        let verdict = analyze(text, &bundle).unwrap();
        TransformRequest::new(text, verdict, mode)
    }

    fn settings(api_key: Option<&str>, proxy: Option<&str>) -> LlmSettings {
        LlmSettings {
            api_key: api_key.map(str::to_string),
            key_source: None,
            model: "test-model".to_string(),
            chat_url: "http://localhost:9/v1/chat/completions".to_string(),
            temperature: 0.7,
            timeout: Duration::from_secs(5),
            proxy: proxy.map(str::to_string),
        }
    }

    #[test]
    fn test_from_settings() {
        assert!(!TransformService::from_settings(&settings(None, None)).unwrap().is_enabled());

        let service = TransformService::from_settings(&settings(Some("sk-test"), None)).unwrap();
        assert!(service.is_enabled());
        assert_eq!(service.model(), Some("test-model"));
        assert_eq!(service.timeout(), Duration::from_secs(5));
    }

    #[test]
    fn test_client_outlives_service_timeout() {
        for secs in [1, 5, 60] {
            let service = Duration::from_secs(secs);
            assert!(client_timeout(service) > service);
        }
    }

    #[test]
    fn test_bad_proxy_falls_back_to_disabled() {
        let broken = settings(Some("sk-test"), Some("http://bad host:80"));
        assert!(TransformService::from_settings(&broken).is_err());

        let service = TransformService::from_settings_or_disabled(&broken);
        assert!(!service.is_enabled());
    }

    #[tokio::test]
    async fn test_disabled_service_short_circuits_every_mode() {
        let service = TransformService::disabled();
        assert!(!service.is_enabled());
        assert!(service.model().is_none());
        for mode in [TransformMode::Explain, TransformMode::Humanize, TransformMode::Adversarial] {
            let err = service.transform(request("I love this!", mode)).await.unwrap_err();
            assert!(matches!(err, TransformError::Disabled));
        }
    }

    #[tokio::test]
    async fn test_prompt_carries_text_and_verdict() {
        let backend = ScriptedBackend::replying(&["  A rewritten sentence.  "]);
        let service = TransformService::new(backend.clone(), Duration::from_secs(5));

        let out = service
            .transform(request("Moreover, we delve deeper.", TransformMode::Adversarial))
            .await
            .unwrap();
        assert_eq!(out, "A rewritten sentence.");

        let calls = backend.calls.lock().unwrap();
        let (system, user) = &calls[0];
        assert_eq!(system, ADVERSARIAL_SYSTEM_PROMPT);
        assert!(user.contains("Moreover, we delve deeper."));
        assert!(user.contains("\"ai_vs_human\""));
        assert!(user.contains("HUMAN-written"));
    }

    #[test]
    fn test_each_mode_has_its_own_template() {
        let explain = build_prompt(&request("x", TransformMode::Explain));
        let humanize = build_prompt(&request("x", TransformMode::Humanize));
        let adversarial = build_prompt(&request("x", TransformMode::Adversarial));
        assert_ne!(explain.0, humanize.0);
        assert_ne!(humanize.0, adversarial.0);
        assert!(explain.1.contains("200 words"));
        assert!(humanize.1.contains("Return ONLY"));
        assert!(humanize.1.contains(Axis::Formality.name()));
    }

    #[tokio::test]
    async fn test_explanation_is_clipped() {
        let long = "word ".repeat(260);
        let backend = ScriptedBackend::replying(&[long.as_str()]);
        let service = TransformService::new(backend, Duration::from_secs(5));
        let out = service
            .transform(request("text", TransformMode::Explain))
            .await
            .unwrap();
        assert!(out.ends_with("..."));
        assert_eq!(out.trim_end_matches("...").split_whitespace().count(), EXPLANATION_WORD_LIMIT);
    }

    #[tokio::test]
    async fn test_rewrites_are_not_clipped() {
        let long = "word ".repeat(260);
        let backend = ScriptedBackend::replying(&[long.as_str()]);
        let service = TransformService::new(backend, Duration::from_secs(5));
        let out = service
            .transform(request("text", TransformMode::Humanize))
            .await
            .unwrap();
        assert_eq!(out.split_whitespace().count(), 260);
    }

    #[tokio::test]
    async fn test_provider_failure_surfaces_without_retry() {
        let backend = ScriptedBackend::new(vec![Scripted::Fail(429), Scripted::Reply("late".to_string())]);
        let service = TransformService::new(backend.clone(), Duration::from_secs(5));
        let err = service
            .transform(request("text", TransformMode::Humanize))
            .await
            .unwrap_err();
        assert!(matches!(err, TransformError::Provider(ProviderError::ApiError { status: 429, .. })));
        assert_eq!(backend.call_count(), 1);
    }

    #[tokio::test]
    async fn test_empty_response_is_an_error() {
        let backend = ScriptedBackend::replying(&["   \n "]);
        let service = TransformService::new(backend, Duration::from_secs(5));
        let err = service
            .transform(request("text", TransformMode::Humanize))
            .await
            .unwrap_err();
        assert!(matches!(err, TransformError::EmptyResponse));
    }

    #[tokio::test]
    async fn test_timeout() {
        let backend = ScriptedBackend::new(vec![Scripted::Hang]);
        let service = TransformService::new(backend, Duration::from_millis(50));
        let err = service
            .transform(request("text", TransformMode::Adversarial))
            .await
            .unwrap_err();
        assert!(matches!(err, TransformError::Timeout(_)));
    }

    #[tokio::test]
    async fn test_reanalysis_of_rewrite_is_structurally_valid() {
        let bundle = fixtures::bundle();
        let backend = ScriptedBackend::replying(&["honestly gonna say this is great lol"]);
        let service = TransformService::new(backend, Duration::from_secs(5));

        let before = analyze("Furthermore, we delve into a tapestry.", &bundle).unwrap();
        let req = TransformRequest::new("Furthermore, we delve into a tapestry.", before, TransformMode::Adversarial);
        let rewritten = service.transform(req).await.unwrap();
        let after = analyze(&rewritten, &bundle).unwrap();
        assert_eq!(after.iter().count(), 3);
        assert_eq!(after.get(Axis::AiVsHuman).predicted_label(), "human");
    }

    #[test]
    fn test_clip_words() {
        assert_eq!(clip_words("a b c", 5), ("a b c".to_string(), false));
        assert_eq!(clip_words("a b c", 3), ("a b c".to_string(), false));
        assert_eq!(clip_words("a  b\nc d", 3), ("a  b\nc...".to_string(), true));
        assert_eq!(clip_words("", 3), (String::new(), false));
    }
}
