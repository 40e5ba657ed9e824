//! OpenAI-compatible backend implementation.
//!
//! Works with any endpoint exposing `/v1/chat/completions` with function
//! calling: OpenAI, OpenRouter, Ollama, vLLM, and friends.

use std::time::Duration;

use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::types::{ChatMessage, ChatRequest, ChatResponse, ChatRole, ToolDefinition, ToolInvocation};
use crate::{GenerativeBackend, LlmError};

/// HTTP client for an OpenAI-compatible chat-completions endpoint.
pub struct OpenAiBackend {
    client: reqwest::Client,
    base_url: String,
    api_key: Option<String>,
    model: String,
}

impl OpenAiBackend {
    /// Create a new backend client. `timeout` bounds every request; a
    /// timed-out generation surfaces as `LlmError::Timeout`.
    pub fn new(
        base_url: impl Into<String>,
        api_key: Option<String>,
        model: impl Into<String>,
        timeout: Duration,
    ) -> Self {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .expect("failed to build reqwest client");
        Self {
            client,
            base_url: base_url.into().trim_end_matches('/').to_string(),
            api_key,
            model: model.into(),
        }
    }

    fn to_api_messages(messages: &[ChatMessage]) -> Vec<ApiMessage> {
        messages
            .iter()
            .map(|m| ApiMessage {
                role: match m.role {
                    ChatRole::System => "system".into(),
                    ChatRole::User => "user".into(),
                    ChatRole::Assistant => "assistant".into(),
                    ChatRole::Tool => "tool".into(),
                },
                content: Some(m.content.clone()),
                tool_calls: if m.tool_calls.is_empty() {
                    None
                } else {
                    Some(
                        m.tool_calls
                            .iter()
                            .map(|tc| ApiToolCall {
                                id: tc.id.clone(),
                                r#type: "function".into(),
                                function: ApiFunction {
                                    name: tc.name.clone(),
                                    arguments: tc.arguments.clone(),
                                },
                            })
                            .collect(),
                    )
                },
                tool_call_id: m.tool_call_id.clone(),
            })
            .collect()
    }

    fn to_api_tools(tools: &[ToolDefinition]) -> Vec<ApiToolDefinition> {
        tools
            .iter()
            .map(|t| ApiToolDefinition {
                r#type: "function".into(),
                function: ApiToolFunction {
                    name: t.name.clone(),
                    description: t.description.clone(),
                    parameters: t.parameters.clone(),
                },
            })
            .collect()
    }
}

#[async_trait::async_trait]
impl GenerativeBackend for OpenAiBackend {
    async fn complete(&self, request: ChatRequest) -> Result<ChatResponse, LlmError> {
        let url = format!("{}/chat/completions", self.base_url);

        let mut body = serde_json::json!({
            "model": self.model,
            "messages": Self::to_api_messages(&request.messages),
            "stream": false,
        });
        if !request.tools.is_empty() {
            body["tools"] = serde_json::json!(Self::to_api_tools(&request.tools));
        }

        debug!(model = %self.model, messages = request.messages.len(), "Sending completion request");

        let mut req = self.client.post(&url).json(&body);
        if let Some(key) = &self.api_key {
            req = req.header("Authorization", format!("Bearer {key}"));
        }

        let response = req.send().await.map_err(|e| {
            if e.is_timeout() {
                LlmError::Timeout
            } else {
                LlmError::Network(e.to_string())
            }
        })?;

        let status = response.status().as_u16();
        if status == 429 {
            return Err(LlmError::RateLimited);
        }
        if status == 401 || status == 403 {
            return Err(LlmError::Auth);
        }
        if status != 200 {
            let message = response.text().await.unwrap_or_default();
            warn!(status, body = %message, "Backend returned error");
            return Err(LlmError::Api { status, message });
        }

        let api_response: ApiResponse = response
            .json()
            .await
            .map_err(|e| LlmError::MalformedResponse(e.to_string()))?;

        let choice = api_response
            .choices
            .into_iter()
            .next()
            .ok_or_else(|| LlmError::MalformedResponse("no choices in response".into()))?;

        let tool_calls = choice
            .message
            .tool_calls
            .unwrap_or_default()
            .into_iter()
            .map(|tc| ToolInvocation {
                id: tc.id,
                name: tc.function.name,
                arguments: tc.function.arguments,
            })
            .collect();

        Ok(ChatResponse {
            content: choice.message.content.unwrap_or_default(),
            tool_calls,
        })
    }
}

// --- OpenAI API wire types (internal) ---

#[derive(Debug, Serialize, Deserialize)]
struct ApiMessage {
    role: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    content: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    tool_calls: Option<Vec<ApiToolCall>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    tool_call_id: Option<String>,
}

#[derive(Debug, Serialize, Deserialize)]
struct ApiToolCall {
    id: String,
    r#type: String,
    function: ApiFunction,
}

#[derive(Debug, Serialize, Deserialize)]
struct ApiFunction {
    name: String,
    arguments: String,
}

#[derive(Debug, Serialize)]
struct ApiToolDefinition {
    r#type: String,
    function: ApiToolFunction,
}

#[derive(Debug, Serialize)]
struct ApiToolFunction {
    name: String,
    description: String,
    parameters: serde_json::Value,
}

#[derive(Debug, Deserialize)]
struct ApiResponse {
    choices: Vec<ApiChoice>,
}

#[derive(Debug, Deserialize)]
struct ApiChoice {
    message: ApiMessage,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_base_url_trailing_slash_trimmed() {
        let backend = OpenAiBackend::new(
            "http://localhost:11434/v1/",
            None,
            "llama3.1",
            Duration::from_secs(60),
        );
        assert_eq!(backend.base_url, "http://localhost:11434/v1");
    }

    #[test]
    fn test_message_conversion() {
        let messages = vec![
            ChatMessage::system("You are helpful"),
            ChatMessage::user("Hello"),
            ChatMessage::tool_result("call_1", "done"),
        ];
        let api = OpenAiBackend::to_api_messages(&messages);
        assert_eq!(api.len(), 3);
        assert_eq!(api[0].role, "system");
        assert_eq!(api[1].role, "user");
        assert_eq!(api[2].role, "tool");
        assert_eq!(api[2].tool_call_id.as_deref(), Some("call_1"));
    }

    #[test]
    fn test_assistant_tool_calls_round_trip() {
        let msg = ChatMessage::assistant_with_calls(
            "",
            vec![ToolInvocation {
                id: "call_9".into(),
                name: "add_scheduled_action".into(),
                arguments: r#"{"user_id":1}"#.into(),
            }],
        );
        let api = OpenAiBackend::to_api_messages(&[msg]);
        let calls = api[0].tool_calls.as_ref().unwrap();
        assert_eq!(calls.len(), 1);
        assert_eq!(calls[0].r#type, "function");
        assert_eq!(calls[0].function.name, "add_scheduled_action");
    }

    #[test]
    fn test_tool_definition_conversion() {
        let tools = vec![ToolDefinition {
            name: "overwrite_summary".into(),
            description: "Overwrite the user's summary.".into(),
            parameters: serde_json::json!({"type": "object"}),
        }];
        let api = OpenAiBackend::to_api_tools(&tools);
        assert_eq!(api[0].r#type, "function");
        assert_eq!(api[0].function.name, "overwrite_summary");
    }

    #[test]
    fn test_parse_text_response() {
        let data = r#"{"choices":[{"message":{"role":"assistant","content":"Hi there!"}}]}"#;
        let parsed: ApiResponse = serde_json::from_str(data).unwrap();
        let msg = &parsed.choices[0].message;
        assert_eq!(msg.content.as_deref(), Some("Hi there!"));
        assert!(msg.tool_calls.is_none());
    }

    #[test]
    fn test_parse_tool_call_response() {
        // Content may be null when the model only requests tools
        let data = r#"{"choices":[{"message":{
            "role":"assistant",
            "content":null,
            "tool_calls":[{"id":"call_abc","type":"function","function":{
                "name":"add_scheduled_action",
                "arguments":"{\"user_id\":42,\"description\":\"Ask how the trip went\",\"trigger_time\":\"2024-01-01T10:00:00Z\"}"
            }}]
        }}]}"#;
        let parsed: ApiResponse = serde_json::from_str(data).unwrap();
        let msg = &parsed.choices[0].message;
        assert!(msg.content.is_none());
        let calls = msg.tool_calls.as_ref().unwrap();
        assert_eq!(calls[0].id, "call_abc");
        assert_eq!(calls[0].function.name, "add_scheduled_action");
        assert!(calls[0].function.arguments.contains("trip"));
    }

    #[test]
    fn test_parse_empty_choices() {
        let parsed: ApiResponse = serde_json::from_str(r#"{"choices":[]}"#).unwrap();
        assert!(parsed.choices.is_empty());
    }
}
