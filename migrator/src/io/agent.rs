//! Agent client abstraction and the OpenAI-compatible chat backend.
//!
//! The [`AgentClient`] trait decouples the orchestrator from the model
//! backend. Tests use scripted clients that return predetermined replies
//! without touching the network.

use std::env;
use std::time::Duration;

use anyhow::{Context, Result, anyhow, bail};
use reqwest::blocking::Client;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::{debug, info, instrument, warn};

use crate::core::capability::CapabilitySchema;
use crate::core::types::{CapabilityInvocation, Message, Role};
use crate::io::config::AgentSettings;

/// Bytes of an error body kept in the returned error.
const ERROR_BODY_PREVIEW_BYTES: usize = 500;

/// One call to the agent: the full conversation plus the capabilities offered
/// on this turn.
#[derive(Debug, Clone, Copy)]
pub struct AgentRequest<'a> {
    pub messages: &'a [Message],
    pub capabilities: &'a [CapabilitySchema],
}

/// A single agent reply.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AgentReply {
    pub finish_reason: Option<String>,
    pub text: Option<String>,
    pub invocations: Vec<CapabilityInvocation>,
}

impl AgentReply {
    /// A reply that invokes no capabilities.
    pub fn is_prose(&self) -> bool {
        self.invocations.is_empty()
    }
}

/// Abstraction over agent backends.
pub trait AgentClient {
    fn complete(&self, request: &AgentRequest<'_>) -> Result<AgentReply>;
}

/// Client for any server exposing an OpenAI-style `/chat/completions`
/// endpoint with function calling.
pub struct OpenAiAgentClient {
    client: Client,
    endpoint: String,
    model: String,
    api_key: Option<String>,
    temperature: Option<f64>,
    max_tokens: Option<u32>,
}

impl OpenAiAgentClient {
    pub fn new(settings: &AgentSettings, api_key: Option<String>) -> Result<Self> {
        let client = Client::builder()
            .timeout(Duration::from_secs(settings.request_timeout_secs))
            .build()
            .context("build http client")?;
        Ok(Self {
            client,
            endpoint: format!("{}/chat/completions", settings.base_url.trim_end_matches('/')),
            model: settings.model.clone(),
            api_key,
            temperature: settings.temperature,
            max_tokens: settings.max_tokens,
        })
    }

    /// Build a client whose key comes from the configured environment variable.
    pub fn from_config(settings: &AgentSettings) -> Result<Self> {
        let api_key = match env::var(&settings.api_key_env) {
            Ok(key) if !key.trim().is_empty() => key,
            _ => bail!(
                "environment variable {} is not set; export an API key for {}",
                settings.api_key_env,
                settings.base_url
            ),
        };
        Self::new(settings, Some(api_key))
    }

    fn request_body<'a>(&'a self, request: &AgentRequest<'a>) -> ChatRequest<'a> {
        ChatRequest {
            model: &self.model,
            messages: request.messages.iter().map(WireMessage::from).collect(),
            tools: request
                .capabilities
                .iter()
                .map(|schema| WireTool {
                    kind: "function",
                    function: WireFunction {
                        name: schema.name,
                        description: schema.description,
                        parameters: schema.parameters.clone(),
                    },
                })
                .collect(),
            tool_choice: (!request.capabilities.is_empty()).then_some("auto"),
            temperature: self.temperature,
            max_tokens: self.max_tokens,
        }
    }
}

impl AgentClient for OpenAiAgentClient {
    #[instrument(skip_all, fields(model = %self.model, messages = request.messages.len()))]
    fn complete(&self, request: &AgentRequest<'_>) -> Result<AgentReply> {
        let body = self.request_body(request);
        debug!(tools = body.tools.len(), "sending chat completion");

        let mut req = self.client.post(&self.endpoint).json(&body);
        if let Some(key) = &self.api_key {
            req = req.bearer_auth(key);
        }
        let resp = req
            .send()
            .with_context(|| format!("send chat completion to {}", self.endpoint))?;

        let status = resp.status();
        let text = resp.text().context("read chat completion body")?;
        if !status.is_success() {
            warn!(%status, "chat completion rejected");
            bail!(
                "chat completion failed with {status}: {}",
                preview(&text, ERROR_BODY_PREVIEW_BYTES)
            );
        }

        let parsed: ChatResponse = serde_json::from_str(&text).with_context(|| {
            format!(
                "parse chat completion response: {}",
                preview(&text, ERROR_BODY_PREVIEW_BYTES)
            )
        })?;
        let choice = parsed
            .choices
            .into_iter()
            .next()
            .ok_or_else(|| anyhow!("chat completion returned no choices"))?;

        let reply = AgentReply {
            finish_reason: choice.finish_reason,
            text: choice.message.content.filter(|c| !c.trim().is_empty()),
            invocations: choice
                .message
                .tool_calls
                .into_iter()
                .map(|call| CapabilityInvocation {
                    id: call.id,
                    name: call.function.name,
                    arguments: call.function.arguments,
                })
                .collect(),
        };
        info!(
            finish_reason = reply.finish_reason.as_deref().unwrap_or("none"),
            invocations = reply.invocations.len(),
            "agent replied"
        );
        Ok(reply)
    }
}

fn preview(text: &str, max_bytes: usize) -> &str {
    if text.len() <= max_bytes {
        return text;
    }
    let mut end = max_bytes;
    while !text.is_char_boundary(end) {
        end -= 1;
    }
    &text[..end]
}

#[derive(Debug, Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    messages: Vec<WireMessage<'a>>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    tools: Vec<WireTool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    tool_choice: Option<&'static str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    temperature: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    max_tokens: Option<u32>,
}

#[derive(Debug, Serialize)]
struct WireMessage<'a> {
    role: &'static str,
    content: Option<&'a str>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    tool_calls: Vec<WireToolCall<'a>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    tool_call_id: Option<&'a str>,
}

impl<'a> From<&'a Message> for WireMessage<'a> {
    fn from(message: &'a Message) -> Self {
        let role = match message.role {
            Role::System => "system",
            Role::Operator => "user",
            Role::Agent => "assistant",
            Role::Capability => "tool",
        };
        Self {
            role,
            content: message.content.as_deref(),
            tool_calls: message
                .invocations
                .iter()
                .map(|inv| WireToolCall {
                    id: &inv.id,
                    kind: "function",
                    function: WireCall {
                        name: &inv.name,
                        arguments: &inv.arguments,
                    },
                })
                .collect(),
            tool_call_id: message.invocation_id.as_deref(),
        }
    }
}

#[derive(Debug, Serialize)]
struct WireToolCall<'a> {
    id: &'a str,
    #[serde(rename = "type")]
    kind: &'static str,
    function: WireCall<'a>,
}

#[derive(Debug, Serialize)]
struct WireCall<'a> {
    name: &'a str,
    arguments: &'a str,
}

#[derive(Debug, Serialize)]
struct WireTool {
    #[serde(rename = "type")]
    kind: &'static str,
    function: WireFunction,
}

#[derive(Debug, Serialize)]
struct WireFunction {
    name: &'static str,
    description: &'static str,
    parameters: Value,
}

#[derive(Debug, Deserialize)]
struct ChatResponse {
    #[serde(default)]
    choices: Vec<ChatChoice>,
}

#[derive(Debug, Deserialize)]
struct ChatChoice {
    #[serde(default)]
    finish_reason: Option<String>,
    message: ChatMessage,
}

#[derive(Debug, Deserialize)]
struct ChatMessage {
    #[serde(default)]
    content: Option<String>,
    #[serde(default)]
    tool_calls: Vec<ChatToolCall>,
}

#[derive(Debug, Deserialize)]
struct ChatToolCall {
    id: String,
    function: ChatFunctionCall,
}

#[derive(Debug, Deserialize)]
struct ChatFunctionCall {
    name: String,
    #[serde(default)]
    arguments: String,
}
