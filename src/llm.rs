//! LLM adapter: provider abstraction behind a single `complete(prompt) -> text` call.
//!
//! Providers:
//! - `OpenAiProvider` (Chat Completions API, `OPENAI_API_KEY`)
//! - `ClaudeProvider` (Messages API, `CLAUDE_API_KEY` / `ANTHROPIC_API_KEY`)
//! - `DisabledClient` (always `LlmError::Disabled`)
//! - `ScriptedLlm` (deterministic canned replies for tests and `AI_TEST_MODE=mock`)

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::config::ai::AiConfig;
use crate::error::LlmError;

const USER_AGENT: &str = "affiliate-research/0.1";

/// One completion request. Providers map it onto their own wire format.
#[derive(Debug, Clone)]
pub struct CompletionRequest {
    pub system: Option<String>,
    pub prompt: String,
    pub max_tokens: u32,
    pub temperature: f32,
}

impl CompletionRequest {
    pub fn new(prompt: impl Into<String>) -> Self {
        Self {
            system: None,
            prompt: prompt.into(),
            max_tokens: 1000,
            temperature: 0.7,
        }
    }

    pub fn system(mut self, system: impl Into<String>) -> Self {
        self.system = Some(system.into());
        self
    }

    pub fn max_tokens(mut self, n: u32) -> Self {
        self.max_tokens = n;
        self
    }

    pub fn temperature(mut self, t: f32) -> Self {
        self.temperature = t.clamp(0.0, 2.0);
        self
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Completion {
    pub content: String,
    pub provider: String,
}

#[async_trait]
pub trait LlmClient: Send + Sync {
    async fn complete(&self, req: &CompletionRequest) -> Result<Completion, LlmError>;
    /// Provider name for diagnostics.
    fn provider_name(&self) -> &'static str;
}

pub type DynLlm = Arc<dyn LlmClient>;

/// Factory: build a client according to config and environment variables.
///
/// * If `AI_TEST_MODE=mock`, returns a scripted client with no replies, so every
///   caller deterministically takes its fallback path.
/// * Else if `config.enabled == false`, returns a disabled client.
/// * Else builds the configured provider.
pub fn build_client_from_config(config: &AiConfig) -> DynLlm {
    if std::env::var("AI_TEST_MODE")
        .map(|v| v == "mock")
        .unwrap_or(false)
    {
        return Arc::new(ScriptedLlm::empty());
    }

    if !config.enabled {
        return Arc::new(DisabledClient);
    }

    let http = match http_client() {
        Ok(c) => c,
        Err(e) => {
            tracing::warn!(target: "llm", error = %e, "could not build HTTP client, LLM disabled");
            return Arc::new(DisabledClient);
        }
    };

    match config.provider.as_str() {
        "openai" => Arc::new(OpenAiProvider::new(
            http,
            config.api_key.clone(),
            config.model.clone(),
        )),
        "claude" | "anthropic" => Arc::new(ClaudeProvider::new(
            http,
            config.api_key.clone(),
            config.model.clone(),
        )),
        other => {
            tracing::warn!(target: "llm", provider = other, "unknown LLM provider, LLM disabled");
            Arc::new(DisabledClient)
        }
    }
}

fn http_client() -> Result<reqwest::Client, reqwest::Error> {
    reqwest::Client::builder()
        .user_agent(USER_AGENT)
        .connect_timeout(Duration::from_secs(5))
        .timeout(Duration::from_secs(60))
        .build()
}

// ------------------------------------------------------------
// OpenAI
// ------------------------------------------------------------

pub struct OpenAiProvider {
    http: reqwest::Client,
    api_key: String,
    model: String,
}

impl OpenAiProvider {
    pub fn new(http: reqwest::Client, api_key: String, model: Option<String>) -> Self {
        Self {
            http,
            api_key,
            model: model.unwrap_or_else(|| "gpt-4o-mini".to_string()),
        }
    }
}

#[async_trait]
impl LlmClient for OpenAiProvider {
    async fn complete(&self, req: &CompletionRequest) -> Result<Completion, LlmError> {
        if self.api_key.is_empty() {
            return Err(LlmError::MissingApiKey { provider: "openai" });
        }

        #[derive(Serialize)]
        struct Msg<'a> {
            role: &'a str,
            content: &'a str,
        }
        #[derive(Serialize)]
        struct Req<'a> {
            model: &'a str,
            messages: Vec<Msg<'a>>,
            temperature: f32,
            max_tokens: u32,
        }
        #[derive(Deserialize)]
        struct Resp {
            choices: Vec<Choice>,
        }
        #[derive(Deserialize)]
        struct Choice {
            message: ChoiceMsg,
        }
        #[derive(Deserialize)]
        struct ChoiceMsg {
            content: Option<String>,
        }

        let mut messages = Vec::with_capacity(2);
        if let Some(sys) = req.system.as_deref() {
            messages.push(Msg {
                role: "system",
                content: sys,
            });
        }
        messages.push(Msg {
            role: "user",
            content: &req.prompt,
        });

        let body = Req {
            model: &self.model,
            messages,
            temperature: req.temperature,
            max_tokens: req.max_tokens,
        };

        let resp = self
            .http
            .post("https://api.openai.com/v1/chat/completions")
            .bearer_auth(&self.api_key)
            .json(&body)
            .send()
            .await?;

        if !resp.status().is_success() {
            return Err(LlmError::Status {
                status: resp.status().as_u16(),
            });
        }
        let parsed: Resp = resp.json().await?;
        let content = parsed
            .choices
            .into_iter()
            .next()
            .and_then(|c| c.message.content)
            .unwrap_or_default();
        non_empty(content, "openai")
    }

    fn provider_name(&self) -> &'static str {
        "openai"
    }
}

// ------------------------------------------------------------
// Claude
// ------------------------------------------------------------

pub struct ClaudeProvider {
    http: reqwest::Client,
    api_key: String,
    model: String,
}

impl ClaudeProvider {
    pub fn new(http: reqwest::Client, api_key: String, model: Option<String>) -> Self {
        Self {
            http,
            api_key,
            model: model.unwrap_or_else(|| "claude-3-5-haiku-latest".to_string()),
        }
    }
}

#[async_trait]
impl LlmClient for ClaudeProvider {
    async fn complete(&self, req: &CompletionRequest) -> Result<Completion, LlmError> {
        if self.api_key.is_empty() {
            return Err(LlmError::MissingApiKey { provider: "claude" });
        }

        #[derive(Serialize)]
        struct Msg<'a> {
            role: &'a str,
            content: &'a str,
        }
        #[derive(Serialize)]
        struct Req<'a> {
            model: &'a str,
            max_tokens: u32,
            temperature: f32,
            #[serde(skip_serializing_if = "Option::is_none")]
            system: Option<&'a str>,
            messages: Vec<Msg<'a>>,
        }
        #[derive(Deserialize)]
        struct Resp {
            content: Vec<Block>,
        }
        #[derive(Deserialize)]
        struct Block {
            #[serde(default)]
            text: Option<String>,
        }

        let body = Req {
            model: &self.model,
            max_tokens: req.max_tokens,
            temperature: req.temperature.min(1.0),
            system: req.system.as_deref(),
            messages: vec![Msg {
                role: "user",
                content: &req.prompt,
            }],
        };

        let resp = self
            .http
            .post("https://api.anthropic.com/v1/messages")
            .header("x-api-key", &self.api_key)
            .header("anthropic-version", "2023-06-01")
            .json(&body)
            .send()
            .await?;

        if !resp.status().is_success() {
            return Err(LlmError::Status {
                status: resp.status().as_u16(),
            });
        }
        let parsed: Resp = resp.json().await?;
        let content = parsed
            .content
            .into_iter()
            .filter_map(|b| b.text)
            .collect::<Vec<_>>()
            .join("");
        non_empty(content, "claude")
    }

    fn provider_name(&self) -> &'static str {
        "claude"
    }
}

fn non_empty(content: String, provider: &str) -> Result<Completion, LlmError> {
    if content.trim().is_empty() {
        return Err(LlmError::EmptyResponse);
    }
    Ok(Completion {
        content,
        provider: provider.to_string(),
    })
}

// ------------------------------------------------------------
// Disabled + scripted
// ------------------------------------------------------------

/// Used when AI is disabled; every call fails fast so callers take their fallback path.
pub struct DisabledClient;

#[async_trait]
impl LlmClient for DisabledClient {
    async fn complete(&self, _req: &CompletionRequest) -> Result<Completion, LlmError> {
        Err(LlmError::Disabled)
    }

    fn provider_name(&self) -> &'static str {
        "disabled"
    }
}

/// Deterministic client: the first rule whose needle appears in the prompt wins,
/// otherwise the default reply (or `LlmError::Disabled` when there is none).
pub struct ScriptedLlm {
    rules: Vec<(String, String)>,
    default: Option<String>,
    calls: AtomicUsize,
    prompts: Mutex<Vec<String>>,
}

impl ScriptedLlm {
    pub fn fixed(reply: impl Into<String>) -> Self {
        Self {
            rules: Vec::new(),
            default: Some(reply.into()),
            calls: AtomicUsize::new(0),
            prompts: Mutex::new(Vec::new()),
        }
    }

    pub fn empty() -> Self {
        Self {
            rules: Vec::new(),
            default: None,
            calls: AtomicUsize::new(0),
            prompts: Mutex::new(Vec::new()),
        }
    }

    /// Reply with `reply` whenever the prompt contains `needle`.
    pub fn on(mut self, needle: impl Into<String>, reply: impl Into<String>) -> Self {
        self.rules.push((needle.into(), reply.into()));
        self
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    pub fn prompts(&self) -> Vec<String> {
        self.prompts
            .lock()
            .map(|p| p.clone())
            .unwrap_or_default()
    }
}

#[async_trait]
impl LlmClient for ScriptedLlm {
    async fn complete(&self, req: &CompletionRequest) -> Result<Completion, LlmError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if let Ok(mut p) = self.prompts.lock() {
            p.push(req.prompt.clone());
        }
        let reply = self
            .rules
            .iter()
            .find(|(needle, _)| req.prompt.contains(needle.as_str()))
            .map(|(_, r)| r.clone())
            .or_else(|| self.default.clone())
            .ok_or(LlmError::Disabled)?;
        non_empty(reply, "scripted")
    }

    fn provider_name(&self) -> &'static str {
        "scripted"
    }
}

// ------------------------------------------------------------
// JSON extraction
// ------------------------------------------------------------

/// Best-effort JSON recovery from model output.
///
/// Tries, in order: the whole text, the body of a fenced code block, then the
/// widest `open..close` bracket span. `open`/`close` are `'['`/`']'` for arrays
/// or `'{'`/`'}'` for objects.
pub fn extract_json(text: &str, open: char, close: char) -> Option<Value> {
    let trimmed = text.trim();
    if let Ok(v) = serde_json::from_str::<Value>(trimmed) {
        if matches_shape(&v, open) {
            return Some(v);
        }
    }

    if let Some(inner) = fenced_block(trimmed) {
        if let Ok(v) = serde_json::from_str::<Value>(inner.trim()) {
            if matches_shape(&v, open) {
                return Some(v);
            }
        }
    }

    let start = trimmed.find(open)?;
    let end = trimmed.rfind(close)?;
    if end <= start {
        return None;
    }
    serde_json::from_str::<Value>(&trimmed[start..=end])
        .ok()
        .filter(|v| matches_shape(v, open))
}

/// Array recovery; a lone object (or an object wrapping a single array field)
/// is accepted too since models often answer `{"companies": [...]}`.
pub fn extract_json_array(text: &str) -> Option<Vec<Value>> {
    if let Some(Value::Array(items)) = extract_json(text, '[', ']') {
        return Some(items);
    }
    match extract_json(text, '{', '}')? {
        Value::Object(map) => {
            let inner = map.values().find_map(|v| v.as_array().cloned());
            Some(inner.unwrap_or_else(|| vec![Value::Object(map)]))
        }
        _ => None,
    }
}

fn matches_shape(v: &Value, open: char) -> bool {
    match open {
        '[' => v.is_array(),
        '{' => v.is_object(),
        _ => true,
    }
}

fn fenced_block(text: &str) -> Option<&str> {
    let start = text.find("```")?;
    let after = &text[start + 3..];
    // skip an optional language tag on the fence line
    let body_start = after.find('\n').map(|i| i + 1).unwrap_or(0);
    let body = &after[body_start..];
    let end = body.find("```")?;
    Some(&body[..end])
}
