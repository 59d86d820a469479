//! Language model abstraction, the Groq chat-completions client and a
//! scripted model for tests.

use std::collections::VecDeque;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::debug;

use crate::config::ModelConfig;
use crate::error::{AgentError, Result};
use crate::message::{render_output, Message, Role, ToolCall};
use crate::tool::ToolDescription;

/// Result of a chat completion request.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ModelCompletion {
    pub content: Option<String>,
    pub tool_calls: Vec<ToolCall>,
}

/// Minimal abstraction around a chat completion provider.
#[async_trait]
pub trait LanguageModel: Send + Sync {
    async fn complete_chat(
        &self,
        messages: &[Message],
        tools: &[ToolDescription],
    ) -> Result<ModelCompletion>;
}

fn coalesce_error(status: reqwest::StatusCode, body: &str, provider: &str) -> AgentError {
    if status == reqwest::StatusCode::TOO_MANY_REQUESTS {
        return AgentError::LanguageModel(format!("{provider} rate limit exceeded: {body}"));
    }
    AgentError::LanguageModel(format!("{provider} request failed with {status}: {body}"))
}

fn serialize_tool_arguments(args: &Value) -> String {
    serde_json::to_string(args).unwrap_or_else(|_| args.to_string())
}

// ─────────────────────────────────────────────────────────────────────────────
// Groq Client (OpenAI-compatible API)
// ─────────────────────────────────────────────────────────────────────────────

/// Groq client speaking the OpenAI-compatible chat completions API.
/// Default model: llama-3.3-70b-versatile
#[derive(Clone)]
pub struct GroqClient {
    http: reqwest::Client,
    model: String,
    api_key: String,
    base_url: String,
    max_tokens: Option<u32>,
}

impl GroqClient {
    pub fn from_config(cfg: &ModelConfig) -> Result<Self> {
        let api_key = cfg
            .api_key
            .clone()
            .filter(|key| !key.trim().is_empty())
            .ok_or_else(|| AgentError::Config("missing Groq API key in model config".into()))?;
        Ok(Self {
            http: reqwest::Client::builder()
                .timeout(Duration::from_secs(120))
                .build()
                .map_err(|err| AgentError::LanguageModel(format!("http client error: {err}")))?,
            model: cfg.id.clone(),
            api_key,
            base_url: cfg.base_url.trim_end_matches('/').to_string(),
            max_tokens: cfg.max_tokens,
        })
    }

    pub fn model(&self) -> &str {
        &self.model
    }

    fn to_openai_messages(&self, messages: &[Message]) -> Vec<OpenAiMessage> {
        messages
            .iter()
            .map(|message| {
                let tool_calls = if message.tool_calls.is_empty() {
                    None
                } else {
                    Some(
                        message
                            .tool_calls
                            .iter()
                            .map(|call| OpenAiToolCall {
                                id: call.id.clone(),
                                r#type: "function".to_string(),
                                function: OpenAiFunctionCall {
                                    name: call.name.clone(),
                                    arguments: serialize_tool_arguments(&call.arguments),
                                },
                            })
                            .collect(),
                    )
                };

                let content = match (&message.tool_result, message.role) {
                    (Some(result), Role::Tool) => Some(render_output(&result.output)),
                    // An assistant turn that only carries tool calls has no text.
                    (_, Role::Assistant) if tool_calls.is_some() && message.content.is_empty() => {
                        None
                    }
                    _ => Some(message.content.clone()),
                };

                OpenAiMessage {
                    role: message.role.as_str().to_string(),
                    content,
                    tool_call_id: message
                        .tool_result
                        .as_ref()
                        .and_then(|result| result.tool_call_id.clone()),
                    tool_calls,
                }
            })
            .collect()
    }

    fn to_openai_tools(&self, tools: &[ToolDescription]) -> Option<Vec<OpenAiTool>> {
        if tools.is_empty() {
            return None;
        }
        Some(
            tools
                .iter()
                .map(|tool| OpenAiTool {
                    r#type: "function".to_string(),
                    function: OpenAiFunction {
                        name: tool.name.clone(),
                        description: Some(tool.description.clone()),
                        parameters: Some(
                            tool.parameters
                                .clone()
                                .unwrap_or_else(|| serde_json::json!({"type": "object", "properties": {}})),
                        ),
                    },
                })
                .collect(),
        )
    }
}

#[async_trait]
impl LanguageModel for GroqClient {
    async fn complete_chat(
        &self,
        messages: &[Message],
        tools: &[ToolDescription],
    ) -> Result<ModelCompletion> {
        let tools = self.to_openai_tools(tools);
        let request = OpenAiRequest {
            model: &self.model,
            messages: self.to_openai_messages(messages),
            tool_choice: tools.as_ref().map(|_| "auto"),
            tools,
            max_tokens: self.max_tokens,
        };
        debug!(model = %self.model, messages = messages.len(), "groq chat completion");

        let resp = self
            .http
            .post(format!("{}/chat/completions", self.base_url))
            .bearer_auth(&self.api_key)
            .json(&request)
            .send()
            .await
            .map_err(|err| AgentError::LanguageModel(format!("Groq request failed: {err}")))?;

        let status = resp.status();
        if !status.is_success() {
            let body = resp.text().await.unwrap_or_default();
            return Err(coalesce_error(status, &body, "Groq"));
        }

        let body: OpenAiResponse = resp
            .json()
            .await
            .map_err(|err| AgentError::LanguageModel(format!("Groq parse error: {err}")))?;

        let first = body
            .choices
            .into_iter()
            .next()
            .ok_or_else(|| AgentError::LanguageModel("Groq returned no choices".into()))?;

        let tool_calls = first
            .message
            .tool_calls
            .unwrap_or_default()
            .into_iter()
            .map(|call| {
                let arguments = serde_json::from_str(&call.function.arguments)
                    .unwrap_or_else(|_| Value::String(call.function.arguments.clone()));
                ToolCall {
                    id: call.id,
                    name: call.function.name,
                    arguments,
                }
            })
            .collect();

        Ok(ModelCompletion {
            content: first.message.content,
            tool_calls,
        })
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Stub model
// ─────────────────────────────────────────────────────────────────────────────

/// A deterministic model used for tests and offline demos.
///
/// Each scripted response is either plain text, or a JSON directive:
/// `{"action":"respond","content":"..."}` or
/// `{"action":"call_tool","name":"...","arguments":{...}}`.
pub struct StubModel {
    responses: Mutex<VecDeque<String>>,
    requests: Mutex<Vec<Vec<Message>>>,
}

impl StubModel {
    pub fn new(responses: Vec<String>) -> Arc<Self> {
        Arc::new(Self {
            responses: Mutex::new(responses.into()),
            requests: Mutex::new(Vec::new()),
        })
    }

    /// Every message list the model has been called with, in call order.
    pub fn requests(&self) -> Vec<Vec<Message>> {
        self.requests.lock().expect("stub model poisoned").clone()
    }
}

#[derive(Debug, Deserialize)]
#[serde(tag = "action", rename_all = "snake_case")]
enum StubDirective {
    Respond { content: String },
    CallTool { name: String, arguments: Value },
}

#[async_trait]
impl LanguageModel for StubModel {
    async fn complete_chat(
        &self,
        messages: &[Message],
        _tools: &[ToolDescription],
    ) -> Result<ModelCompletion> {
        self.requests
            .lock()
            .expect("stub model poisoned")
            .push(messages.to_vec());
        let raw = self
            .responses
            .lock()
            .expect("stub model poisoned")
            .pop_front()
            .ok_or_else(|| {
                AgentError::LanguageModel("StubModel ran out of scripted responses".into())
            })?;

        match serde_json::from_str::<StubDirective>(&raw) {
            Ok(StubDirective::Respond { content }) => Ok(ModelCompletion {
                content: Some(content),
                tool_calls: Vec::new(),
            }),
            Ok(StubDirective::CallTool { name, arguments }) => {
                let id = format!("call_{}", self.requests.lock().expect("stub model poisoned").len());
                Ok(ModelCompletion {
                    content: None,
                    tool_calls: vec![ToolCall {
                        id: Some(id),
                        name,
                        arguments,
                    }],
                })
            }
            Err(_) => Ok(ModelCompletion {
                content: Some(raw),
                tool_calls: Vec::new(),
            }),
        }
    }
}

#[derive(Debug, Serialize)]
struct OpenAiRequest<'a> {
    model: &'a str,
    messages: Vec<OpenAiMessage>,
    #[serde(skip_serializing_if = "Option::is_none")]
    tools: Option<Vec<OpenAiTool>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    tool_choice: Option<&'a str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    max_tokens: Option<u32>,
}

#[derive(Debug, Serialize, Deserialize)]
struct OpenAiMessage {
    role: String,
    content: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    tool_call_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    tool_calls: Option<Vec<OpenAiToolCall>>,
}

#[derive(Debug, Serialize, Deserialize)]
struct OpenAiToolCall {
    #[serde(skip_serializing_if = "Option::is_none")]
    id: Option<String>,
    r#type: String,
    function: OpenAiFunctionCall,
}

#[derive(Debug, Serialize, Deserialize)]
struct OpenAiFunctionCall {
    name: String,
    arguments: String,
}

#[derive(Debug, Serialize, Deserialize)]
struct OpenAiTool {
    r#type: String,
    function: OpenAiFunction,
}

#[derive(Debug, Serialize, Deserialize)]
struct OpenAiFunction {
    name: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    description: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    parameters: Option<Value>,
}

#[derive(Debug, Deserialize)]
struct OpenAiResponse {
    choices: Vec<OpenAiChoice>,
}

#[derive(Debug, Deserialize)]
struct OpenAiChoice {
    message: OpenAiChoiceMessage,
}

#[derive(Debug, Deserialize)]
struct OpenAiChoiceMessage {
    #[serde(default)]
    content: Option<String>,
    #[serde(default)]
    tool_calls: Option<Vec<OpenAiToolCall>>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn client() -> GroqClient {
        let cfg = ModelConfig {
            api_key: Some("gsk_test".into()),
            ..ModelConfig::default()
        };
        GroqClient::from_config(&cfg).unwrap()
    }

    #[test]
    fn requires_api_key() {
        let err = GroqClient::from_config(&ModelConfig::default()).err().unwrap();
        assert!(matches!(err, AgentError::Config(_)));
    }

    #[test]
    fn tool_call_turns_are_encoded_with_ids() {
        let call = ToolCall {
            id: Some("call_7".into()),
            name: "calculator".into(),
            arguments: json!({"expression": "2+2"}),
        };
        let messages = vec![
            Message::user("what is 2+2?"),
            Message::assistant_tool_calls(None, vec![call]),
            Message::tool("calculator", json!("4"), Some("call_7".into())),
        ];

        let encoded = client().to_openai_messages(&messages);

        assert_eq!(encoded[1].role, "assistant");
        assert!(encoded[1].content.is_none());
        let calls = encoded[1].tool_calls.as_ref().unwrap();
        assert_eq!(calls[0].function.arguments, r#"{"expression":"2+2"}"#);
        assert_eq!(encoded[2].tool_call_id.as_deref(), Some("call_7"));
        assert_eq!(encoded[2].content.as_deref(), Some("4"));
    }

    #[tokio::test]
    async fn stub_model_replays_directives_and_records_requests() {
        let model = StubModel::new(vec![
            r#"{"action":"call_tool","name":"echo","arguments":{"x":1}}"#.into(),
            "plain text".into(),
        ]);

        let first = model.complete_chat(&[Message::user("a")], &[]).await.unwrap();
        assert_eq!(first.tool_calls[0].name, "echo");

        let second = model.complete_chat(&[Message::user("b")], &[]).await.unwrap();
        assert_eq!(second.content.as_deref(), Some("plain text"));

        assert_eq!(model.requests().len(), 2);
        assert!(model.complete_chat(&[], &[]).await.is_err());
    }
}
