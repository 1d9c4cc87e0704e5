//! LLM client for email refinement
//!
//! Supports Gemini, Claude (Anthropic) and OpenAI APIs, plus an offline
//! mock backend.

use std::sync::Arc;
use std::time::Duration;

use anyhow::{anyhow, Result};
use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};

use crate::config::Config;
use crate::error::RefineError;
use crate::mock::MockBackend;
use crate::mode::{RefineMode, SYSTEM_INSTRUCTION};

/// One completion call, fully prepared.
#[derive(Debug, Clone)]
pub struct CompletionRequest {
    /// Format rules sent as the system part
    pub system: String,
    /// Mode instruction followed by the input text
    pub prompt: String,
    pub temperature: f32,
    /// Mode that produced the prompt
    pub mode: RefineMode,
}

/// Something that can turn a prompt into text.
#[async_trait]
pub trait CompletionBackend: Send + Sync {
    /// Short name used in logs
    fn name(&self) -> &str;

    async fn complete(&self, request: &CompletionRequest) -> Result<String>;
}

/// Build the user prompt for a mode
pub fn build_prompt(text: &str, mode: RefineMode) -> String {
    format!("{}\n\n---\nInput Text:\n{}\n---", mode.instruction(), text)
}

/// Remove markdown fences the model may add despite the system rules
pub fn strip_code_fences(raw: &str) -> String {
    raw.replace("```html", "").replace("```", "")
}

/// Refines email text through a completion backend.
///
/// Exactly one backend call is made per non-empty `process`; nothing is
/// retried or cached.
#[derive(Clone)]
pub struct RefineClient {
    backend: Arc<dyn CompletionBackend>,
    temperature: f32,
    timeout: Duration,
}

impl RefineClient {
    pub fn new(backend: Arc<dyn CompletionBackend>) -> Self {
        Self {
            backend,
            temperature: 0.3,
            timeout: Duration::from_secs(60),
        }
    }

    pub fn with_temperature(mut self, temperature: f32) -> Self {
        self.temperature = temperature;
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Build a client from configuration, or `None` when no backend is configured
    pub fn from_config(config: &Config) -> Option<Self> {
        if !config.is_llm_enabled() {
            return None;
        }

        let backend: Arc<dyn CompletionBackend> = match config.llm.provider.as_str() {
            "mock" => Arc::new(MockBackend::default()),
            _ => Arc::new(ApiBackend::new(config.clone())),
        };

        Some(
            Self::new(backend)
                .with_temperature(config.llm.temperature)
                .with_timeout(config.timeout()),
        )
    }

    pub fn backend_name(&self) -> &str {
        self.backend.name()
    }

    /// Refine `text` according to `mode` and return HTML.
    ///
    /// Whitespace-only input returns an empty string without calling the backend.
    pub async fn process(&self, text: &str, mode: RefineMode) -> Result<String, RefineError> {
        if text.trim().is_empty() {
            return Ok(String::new());
        }

        let request = CompletionRequest {
            system: SYSTEM_INSTRUCTION.to_string(),
            prompt: build_prompt(text, mode),
            temperature: self.temperature,
            mode,
        };

        tracing::debug!(
            "Refining {} chars with mode {} via {}",
            text.chars().count(),
            mode,
            self.backend.name()
        );

        match tokio::time::timeout(self.timeout, self.backend.complete(&request)).await {
            Ok(Ok(raw)) => Ok(strip_code_fences(&raw)),
            Ok(Err(e)) => {
                tracing::error!("{} API error: {:#}", self.backend.name(), e);
                Err(RefineError::Service)
            }
            Err(_) => {
                tracing::error!(
                    "{} API call timed out after {:?}",
                    self.backend.name(),
                    self.timeout
                );
                Err(RefineError::Service)
            }
        }
    }
}

/// Backend talking to a hosted LLM API over HTTP
pub struct ApiBackend {
    client: Client,
    config: Config,
}

// Gemini API types
#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct GeminiRequest {
    system_instruction: GeminiContent,
    contents: Vec<GeminiContent>,
    generation_config: GeminiGenerationConfig,
}

#[derive(Serialize, Deserialize, Default)]
struct GeminiContent {
    #[serde(skip_serializing_if = "Option::is_none")]
    role: Option<String>,
    #[serde(default)]
    parts: Vec<GeminiPart>,
}

#[derive(Serialize, Deserialize)]
struct GeminiPart {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    text: Option<String>,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct GeminiGenerationConfig {
    temperature: f32,
    #[serde(skip_serializing_if = "Option::is_none")]
    max_output_tokens: Option<u32>,
}

#[derive(Deserialize)]
struct GeminiResponse {
    #[serde(default)]
    candidates: Vec<GeminiCandidate>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct GeminiCandidate {
    #[serde(default)]
    content: GeminiContent,
    #[serde(default)]
    finish_reason: Option<String>,
}

impl GeminiResponse {
    fn text(&self) -> Option<String> {
        let candidate = self.candidates.first()?;
        let text: String = candidate
            .content
            .parts
            .iter()
            .filter_map(|p| p.text.as_deref())
            .collect();
        if text.is_empty() {
            None
        } else {
            Some(text)
        }
    }

    fn finish_reason(&self) -> Option<&str> {
        self.candidates.first()?.finish_reason.as_deref()
    }

    /// Text of the first candidate; a reply cut off at the token cap is an error,
    /// a reply without text is empty output.
    fn into_output(self) -> Result<String> {
        if self.finish_reason() == Some("MAX_TOKENS") {
            return Err(anyhow!("Gemini response truncated (finishReason MAX_TOKENS)"));
        }
        match self.text() {
            Some(text) => Ok(text),
            None => {
                tracing::warn!(
                    "Gemini returned no text (finishReason {:?})",
                    self.finish_reason()
                );
                Ok(String::new())
            }
        }
    }
}

// Claude API types

/// The messages API requires a cap, so one is always sent
const CLAUDE_MAX_TOKENS: u32 = 4096;

#[derive(Serialize)]
struct ClaudeRequest {
    model: String,
    max_tokens: u32,
    system: String,
    temperature: f32,
    messages: Vec<ChatMessage>,
}

#[derive(Serialize)]
struct ChatMessage {
    role: String,
    content: String,
}

#[derive(Deserialize)]
struct ClaudeResponse {
    content: Vec<ClaudeContent>,
}

#[derive(Deserialize)]
struct ClaudeContent {
    text: String,
}

// OpenAI API types
#[derive(Serialize)]
struct OpenAiRequest {
    model: String,
    messages: Vec<ChatMessage>,
    #[serde(skip_serializing_if = "Option::is_none")]
    max_tokens: Option<u32>,
    temperature: f32,
}

#[derive(Deserialize)]
struct OpenAiResponse {
    choices: Vec<OpenAiChoice>,
}

#[derive(Deserialize)]
struct OpenAiChoice {
    message: OpenAiMessageResponse,
}

#[derive(Deserialize)]
struct OpenAiMessageResponse {
    content: String,
}

impl ApiBackend {
    pub fn new(config: Config) -> Self {
        Self {
            client: Client::new(),
            config,
        }
    }

    fn base_url(&self, default: &str) -> String {
        self.config
            .llm
            .base_url
            .clone()
            .unwrap_or_else(|| default.to_string())
            .trim_end_matches('/')
            .to_string()
    }

    /// Call Gemini API
    async fn call_gemini(&self, request: &CompletionRequest) -> Result<String> {
        let api_key = self
            .config
            .get_api_key()
            .ok_or_else(|| anyhow!("Gemini API key not found"))?;

        let base_url = self.base_url("https://generativelanguage.googleapis.com");

        let body = GeminiRequest {
            system_instruction: GeminiContent {
                role: None,
                parts: vec![GeminiPart {
                    text: Some(request.system.clone()),
                }],
            },
            contents: vec![GeminiContent {
                role: Some("user".to_string()),
                parts: vec![GeminiPart {
                    text: Some(request.prompt.clone()),
                }],
            }],
            generation_config: GeminiGenerationConfig {
                temperature: request.temperature,
                max_output_tokens: self.config.llm.max_tokens,
            },
        };

        let response = self
            .client
            .post(format!(
                "{}/v1beta/models/{}:generateContent",
                base_url,
                self.config.get_model()
            ))
            .header("x-goog-api-key", api_key)
            .header("content-type", "application/json")
            .json(&body)
            .send()
            .await?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(anyhow!("Gemini API error: {} - {}", status, body));
        }

        let gemini_response: GeminiResponse = response.json().await?;
        gemini_response.into_output()
    }

    /// Call Claude API
    async fn call_claude(&self, request: &CompletionRequest) -> Result<String> {
        let api_key = self
            .config
            .get_api_key()
            .ok_or_else(|| anyhow!("Claude API key not found"))?;

        let base_url = self.base_url("https://api.anthropic.com");

        let body = ClaudeRequest {
            model: self.config.get_model(),
            max_tokens: self.config.llm.max_tokens.unwrap_or(CLAUDE_MAX_TOKENS),
            system: request.system.clone(),
            temperature: request.temperature,
            messages: vec![ChatMessage {
                role: "user".to_string(),
                content: request.prompt.clone(),
            }],
        };

        let response = self
            .client
            .post(format!("{}/v1/messages", base_url))
            .header("x-api-key", api_key)
            .header("anthropic-version", "2023-06-01")
            .header("content-type", "application/json")
            .json(&body)
            .send()
            .await?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(anyhow!("Claude API error: {} - {}", status, body));
        }

        let claude_response: ClaudeResponse = response.json().await?;
        claude_response
            .content
            .first()
            .map(|c| c.text.clone())
            .ok_or_else(|| anyhow!("Empty response from Claude"))
    }

    /// Call OpenAI API
    async fn call_openai(&self, request: &CompletionRequest) -> Result<String> {
        let api_key = self
            .config
            .get_api_key()
            .ok_or_else(|| anyhow!("OpenAI API key not found"))?;

        let base_url = self.base_url("https://api.openai.com");

        let body = OpenAiRequest {
            model: self.config.get_model(),
            max_tokens: self.config.llm.max_tokens,
            temperature: request.temperature,
            messages: vec![
                ChatMessage {
                    role: "system".to_string(),
                    content: request.system.clone(),
                },
                ChatMessage {
                    role: "user".to_string(),
                    content: request.prompt.clone(),
                },
            ],
        };

        let response = self
            .client
            .post(format!("{}/v1/chat/completions", base_url))
            .header("Authorization", format!("Bearer {}", api_key))
            .header("content-type", "application/json")
            .json(&body)
            .send()
            .await?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(anyhow!("OpenAI API error: {} - {}", status, body));
        }

        let openai_response: OpenAiResponse = response.json().await?;
        openai_response
            .choices
            .first()
            .map(|c| c.message.content.clone())
            .ok_or_else(|| anyhow!("Empty response from OpenAI"))
    }
}

#[async_trait]
impl CompletionBackend for ApiBackend {
    fn name(&self) -> &str {
        &self.config.llm.provider
    }

    async fn complete(&self, request: &CompletionRequest) -> Result<String> {
        match self.config.llm.provider.as_str() {
            "gemini" => self.call_gemini(request).await,
            "claude" => self.call_claude(request).await,
            "openai" => self.call_openai(request).await,
            other => Err(anyhow!("Unknown LLM provider: {}", other)),
        }
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::config::LlmConfig;
    use pretty_assertions::assert_eq;
    use std::sync::Mutex;

    /// Records every request and answers with a canned reply.
    #[derive(Default)]
    pub(crate) struct RecordingBackend {
        pub reply: String,
        pub fail: bool,
        pub requests: Mutex<Vec<CompletionRequest>>,
    }

    impl RecordingBackend {
        pub fn replying(reply: &str) -> Self {
            Self {
                reply: reply.to_string(),
                ..Default::default()
            }
        }

        pub fn failing() -> Self {
            Self {
                fail: true,
                ..Default::default()
            }
        }

        pub fn calls(&self) -> usize {
            self.requests.lock().unwrap().len()
        }
    }

    #[async_trait]
    impl CompletionBackend for RecordingBackend {
        fn name(&self) -> &str {
            "recording"
        }

        async fn complete(&self, request: &CompletionRequest) -> Result<String> {
            self.requests.lock().unwrap().push(request.clone());
            if self.fail {
                Err(anyhow!("connection reset by peer"))
            } else {
                Ok(self.reply.clone())
            }
        }
    }

    struct HangingBackend;

    #[async_trait]
    impl CompletionBackend for HangingBackend {
        fn name(&self) -> &str {
            "hanging"
        }

        async fn complete(&self, _request: &CompletionRequest) -> Result<String> {
            std::future::pending::<Result<String>>().await
        }
    }

    fn create_test_config(provider: &str) -> Config {
        Config {
            llm: LlmConfig {
                provider: provider.to_string(),
                api_key: Some("test-key".to_string()),
                ..Default::default()
            },
            ..Default::default()
        }
    }

    #[tokio::test]
    async fn test_prompt_contains_text_and_mode_instruction() {
        for mode in RefineMode::ALL {
            let backend = Arc::new(RecordingBackend::replying("<p>ok</p>"));
            let client = RefineClient::new(backend.clone());

            let html = client.process("Olá equipe, segue o relatório.", mode).await.unwrap();
            assert_eq!(html, "<p>ok</p>");

            let requests = backend.requests.lock().unwrap();
            assert_eq!(requests.len(), 1);
            let request = &requests[0];
            assert!(request.prompt.contains("Olá equipe, segue o relatório."));
            assert!(request.prompt.contains(mode.instruction()));
            assert_eq!(request.system, SYSTEM_INSTRUCTION);
            assert_eq!(request.mode, mode);
            assert!((request.temperature - 0.3).abs() < f32::EPSILON);
        }
    }

    #[tokio::test]
    async fn test_whitespace_input_skips_backend() {
        let backend = Arc::new(RecordingBackend::replying("<p>never</p>"));
        let client = RefineClient::new(backend.clone());

        for text in ["", "   ", "\n\t  \n"] {
            let html = client.process(text, RefineMode::Summarize).await.unwrap();
            assert_eq!(html, "");
        }
        assert_eq!(backend.calls(), 0);
    }

    #[tokio::test]
    async fn test_backend_failure_is_normalized() {
        let backend = Arc::new(RecordingBackend::failing());
        let client = RefineClient::new(backend.clone());

        let err = client
            .process("Hello", RefineMode::ProofreadEnglish)
            .await
            .unwrap_err();

        assert!(matches!(err, RefineError::Service));
        assert_eq!(err.to_string(), "Failed to process email. Please try again.");
        assert!(!err.to_string().contains("connection reset"));
        assert_eq!(backend.calls(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_hung_backend_times_out() {
        let client = RefineClient::new(Arc::new(HangingBackend)).with_timeout(Duration::from_secs(5));

        let err = client
            .process("Hello", RefineMode::Tabulate)
            .await
            .unwrap_err();
        assert!(matches!(err, RefineError::Service));
    }

    #[tokio::test]
    async fn test_fences_removed_from_reply() {
        let backend = Arc::new(RecordingBackend::replying("```html\n<p>Hi</p>\n```"));
        let client = RefineClient::new(backend);

        let html = client.process("hi", RefineMode::ProofreadEnglish).await.unwrap();
        assert_eq!(html, "\n<p>Hi</p>\n");
    }

    #[test]
    fn test_build_prompt_layout() {
        let prompt = build_prompt("ID: 123, Type: VM", RefineMode::Tabulate);

        assert!(prompt.starts_with(RefineMode::Tabulate.instruction()));
        assert!(prompt.ends_with("\n---\nInput Text:\nID: 123, Type: VM\n---"));
    }

    #[test]
    fn test_strip_code_fences() {
        assert_eq!(strip_code_fences("<p>plain</p>"), "<p>plain</p>");
        assert_eq!(strip_code_fences("```html<p>a</p>```"), "<p>a</p>");
        assert_eq!(
            strip_code_fences("```<p>a</p>``` mid ```html<b>b</b>```"),
            "<p>a</p> mid <b>b</b>"
        );
        assert_eq!(strip_code_fences("``````"), "");
    }

    #[test]
    fn test_gemini_response_text() {
        let json = r#"{
            "candidates": [
                {"content": {"role": "model", "parts": [{"text": "<p>one</p>"}, {"text": "<p>two</p>"}]}}
            ]
        }"#;
        let response: GeminiResponse = serde_json::from_str(json).unwrap();
        assert_eq!(response.text().as_deref(), Some("<p>one</p><p>two</p>"));
    }

    #[test]
    fn test_gemini_response_without_text_is_empty_output() {
        let response: GeminiResponse = serde_json::from_str(r#"{"candidates": []}"#).unwrap();
        assert!(response.text().is_none());
        assert_eq!(response.into_output().unwrap(), "");

        let blocked: GeminiResponse =
            serde_json::from_str(r#"{"candidates": [{"finishReason": "SAFETY"}]}"#).unwrap();
        assert_eq!(blocked.finish_reason(), Some("SAFETY"));
        assert_eq!(blocked.into_output().unwrap(), "");
    }

    #[test]
    fn test_gemini_truncated_response_is_error() {
        let json = r#"{"candidates": [{
            "content": {"parts": [{"text": "<table><tr><td>trunc"}]},
            "finishReason": "MAX_TOKENS"
        }]}"#;
        let response: GeminiResponse = serde_json::from_str(json).unwrap();
        assert!(response.into_output().is_err());
    }

    #[test]
    fn test_gemini_request_shape() {
        let mut body = GeminiRequest {
            system_instruction: GeminiContent {
                role: None,
                parts: vec![GeminiPart {
                    text: Some("rules".to_string()),
                }],
            },
            contents: vec![GeminiContent {
                role: Some("user".to_string()),
                parts: vec![GeminiPart {
                    text: Some("prompt".to_string()),
                }],
            }],
            generation_config: GeminiGenerationConfig {
                temperature: 0.3,
                max_output_tokens: None,
            },
        };
        let value = serde_json::to_value(&body).unwrap();

        assert_eq!(value["systemInstruction"]["parts"][0]["text"], "rules");
        assert!(value["systemInstruction"].get("role").is_none());
        assert_eq!(value["contents"][0]["role"], "user");
        assert!(value["generationConfig"].get("maxOutputTokens").is_none());

        body.generation_config.max_output_tokens = Some(1024);
        let value = serde_json::to_value(&body).unwrap();
        assert_eq!(value["generationConfig"]["maxOutputTokens"], 1024);
    }

    /// Serve `reply` for any POST and keep the last request body.
    async fn fake_gemini(
        reply: serde_json::Value,
    ) -> (Config, Arc<Mutex<Option<serde_json::Value>>>) {
        use axum::{Json, Router};

        let seen = Arc::new(Mutex::new(None));
        let captured = seen.clone();
        let app = Router::new().fallback(move |Json(body): Json<serde_json::Value>| {
            let captured = captured.clone();
            let reply = reply.clone();
            async move {
                *captured.lock().unwrap() = Some(body);
                Json(reply)
            }
        });

        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });

        let mut config = create_test_config("gemini");
        config.llm.base_url = Some(format!("http://{addr}"));
        (config, seen)
    }

    #[tokio::test]
    async fn test_gemini_empty_candidates_refine_to_empty_string() {
        let (config, _) = fake_gemini(serde_json::json!({"candidates": []})).await;
        let client = RefineClient::from_config(&config).unwrap();

        let html = client.process("hello", RefineMode::Summarize).await.unwrap();
        assert_eq!(html, "");
    }

    #[tokio::test]
    async fn test_gemini_max_tokens_reply_is_service_error() {
        let (config, seen) = fake_gemini(serde_json::json!({
            "candidates": [{
                "content": {"parts": [{"text": "<table><tr><td>trunc"}]},
                "finishReason": "MAX_TOKENS"
            }]
        }))
        .await;
        let client = RefineClient::from_config(&config).unwrap();

        let err = client.process("ID: 1", RefineMode::Tabulate).await.unwrap_err();
        assert!(matches!(err, RefineError::Service));

        let body = seen.lock().unwrap().clone().unwrap();
        assert!(body["generationConfig"].get("maxOutputTokens").is_none());
        assert!((body["generationConfig"]["temperature"].as_f64().unwrap() - 0.3).abs() < 1e-6);
    }

    #[tokio::test]
    async fn test_gemini_reply_is_refined() {
        let (config, seen) = fake_gemini(serde_json::json!({
            "candidates": [{
                "content": {"parts": [{"text": "```html<p>Hi</p>```"}]},
                "finishReason": "STOP"
            }]
        }))
        .await;
        let client = RefineClient::from_config(&config).unwrap();

        let html = client.process("hi", RefineMode::ProofreadEnglish).await.unwrap();
        assert_eq!(html, "<p>Hi</p>");

        let body = seen.lock().unwrap().clone().unwrap();
        assert_eq!(body["systemInstruction"]["parts"][0]["text"], SYSTEM_INSTRUCTION);
        assert!(body["contents"][0]["parts"][0]["text"]
            .as_str()
            .unwrap()
            .ends_with("Input Text:\nhi\n---"));
    }

    #[test]
    fn test_from_config() {
        let mut config = create_test_config("gemini");
        let client = RefineClient::from_config(&config).unwrap();
        assert_eq!(client.backend_name(), "gemini");

        config.llm.provider = "mock".to_string();
        let client = RefineClient::from_config(&config).unwrap();
        assert_eq!(client.backend_name(), "mock");

        config.llm.provider = "none".to_string();
        assert!(RefineClient::from_config(&config).is_none());
    }

    #[tokio::test]
    async fn test_unknown_provider_is_service_error() {
        let config = create_test_config("parrot");
        let client = RefineClient::new(Arc::new(ApiBackend::new(config)));

        let err = client.process("hi", RefineMode::Summarize).await.unwrap_err();
        assert!(matches!(err, RefineError::Service));
    }
}
