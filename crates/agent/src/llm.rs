use async_trait::async_trait;
use reqwest::header::AUTHORIZATION;
use secrecy::{ExposeSecret, SecretString};
use serde::Deserialize;
use serde_json::{json, Value};
use thiserror::Error;
use tracing::debug;

use wayfarer_core::domain::chat::MessageRole;

use crate::schema::{tool_schema, ToolInvocation};

#[derive(Debug, Error)]
pub enum LlmError {
    #[error("llm transport error: {0}")]
    Transport(String),
    #[error("llm api returned status {status}")]
    Api { status: u16 },
    #[error("llm response malformed: {detail}")]
    Malformed {
        detail: String,
        /// Token counts the provider reported before the response turned out
        /// unusable. Billed tokens still have to reach the ledger.
        usage: Option<TokenUsage>,
    },
}

impl LlmError {
    pub fn usage(&self) -> Option<TokenUsage> {
        match self {
            Self::Malformed { usage, .. } => *usage,
            Self::Transport(_) | Self::Api { .. } => None,
        }
    }
}

/// One message in the provider wire format.
#[derive(Clone, Debug, PartialEq)]
pub struct LlmMessage {
    pub role: MessageRole,
    pub content: String,
}

impl LlmMessage {
    pub fn new(role: MessageRole, content: impl Into<String>) -> Self {
        Self { role, content: content.into() }
    }
}

#[derive(Clone, Debug, PartialEq)]
pub struct CompletionRequest {
    pub messages: Vec<LlmMessage>,
    /// When false the tool schema is withheld, forcing a plain text answer.
    pub use_tools: bool,
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct TokenUsage {
    pub prompt_tokens: u32,
    pub completion_tokens: u32,
}

#[derive(Clone, Debug, PartialEq)]
pub struct CompletionResponse {
    pub content: String,
    pub tool_calls: Vec<ToolInvocation>,
    pub usage: TokenUsage,
}

/// Boundary to the LLM provider. One implementation talks to an
/// OpenAI-compatible chat completions endpoint; tests substitute scripted
/// fakes.
#[async_trait]
pub trait LlmClient: Send + Sync {
    fn model(&self) -> &str;

    async fn complete(&self, request: CompletionRequest) -> Result<CompletionResponse, LlmError>;
}

pub struct OpenAiClient {
    http: reqwest::Client,
    api_key: SecretString,
    base_url: String,
    model: String,
    temperature: f64,
    max_tokens: u32,
}

impl OpenAiClient {
    pub fn new(
        http: reqwest::Client,
        api_key: SecretString,
        base_url: String,
        model: String,
        temperature: f64,
        max_tokens: u32,
    ) -> Self {
        Self { http, api_key, base_url, model, temperature, max_tokens }
    }

    fn request_body(&self, request: &CompletionRequest) -> Value {
        let messages: Vec<Value> = request
            .messages
            .iter()
            .map(|message| {
                json!({ "role": message.role.as_str(), "content": message.content })
            })
            .collect();

        let mut body = json!({
            "model": self.model,
            "messages": messages,
            "temperature": self.temperature,
            "max_tokens": self.max_tokens,
        });
        if request.use_tools {
            body["tools"] = json!([tool_schema()]);
            body["tool_choice"] = json!("auto");
        }
        body
    }
}

#[async_trait]
impl LlmClient for OpenAiClient {
    fn model(&self) -> &str {
        &self.model
    }

    async fn complete(&self, request: CompletionRequest) -> Result<CompletionResponse, LlmError> {
        let url = format!("{}/chat/completions", self.base_url.trim_end_matches('/'));
        let response = self
            .http
            .post(&url)
            .header(AUTHORIZATION, format!("Bearer {}", self.api_key.expose_secret()))
            .json(&self.request_body(&request))
            .send()
            .await
            .map_err(|error| LlmError::Transport(error.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            return Err(LlmError::Api { status: status.as_u16() });
        }

        let body: ChatCompletionBody = response.json().await.map_err(|error| {
            LlmError::Malformed { detail: error.to_string(), usage: None }
        })?;

        let reported = body.usage.map(|usage| TokenUsage {
            prompt_tokens: usage.prompt_tokens,
            completion_tokens: usage.completion_tokens,
        });
        let choice = body.choices.into_iter().next().ok_or_else(|| LlmError::Malformed {
            detail: "response carried no choices".to_string(),
            usage: reported,
        })?;

        let usage = reported.unwrap_or_default();
        let tool_calls = choice
            .message
            .tool_calls
            .unwrap_or_default()
            .into_iter()
            .map(|call| ToolInvocation {
                invocation_id: call.id,
                tool_name: call.function.name,
                arguments: call.function.arguments,
            })
            .collect::<Vec<_>>();

        debug!(
            model = %self.model,
            prompt_tokens = usage.prompt_tokens,
            completion_tokens = usage.completion_tokens,
            tool_calls = tool_calls.len(),
            "llm completion received"
        );

        Ok(CompletionResponse {
            content: choice.message.content.unwrap_or_default(),
            tool_calls,
            usage,
        })
    }
}

#[derive(Debug, Deserialize)]
struct ChatCompletionBody {
    choices: Vec<Choice>,
    usage: Option<WireUsage>,
}

#[derive(Debug, Deserialize)]
struct WireUsage {
    #[serde(default)]
    prompt_tokens: u32,
    #[serde(default)]
    completion_tokens: u32,
}

#[derive(Debug, Deserialize)]
struct Choice {
    message: WireMessage,
}

#[derive(Debug, Deserialize)]
struct WireMessage {
    content: Option<String>,
    tool_calls: Option<Vec<WireToolCall>>,
}

#[derive(Debug, Deserialize)]
struct WireToolCall {
    #[serde(default)]
    id: String,
    function: WireFunction,
}

#[derive(Debug, Deserialize)]
struct WireFunction {
    name: String,
    /// Raw JSON text; argument validation happens in the dispatcher so bad
    /// payloads become tool-level validation errors, not turn failures.
    arguments: String,
}
