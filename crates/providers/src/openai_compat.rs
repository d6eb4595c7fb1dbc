//! OpenAI-compatible adapter (OpenAI, DeepSeek, OpenRouter, local
//! gateways speaking the same dialect).
//!
//! Tool calls are `function` entries with JSON-string arguments; tool
//! results are `role: "tool"` messages bound by `tool_call_id`.

use serde_json::Value;

use cg_domain::chat::{
    ChatRequest, ChatResponse, ContentBlock, Message, MessageBody, ProviderCapabilities, Role,
    StopReason, ToolSupport, Usage,
};
use cg_domain::config::ProviderConfig;
use cg_domain::error::{Error, Result};
use cg_domain::tool::{ToolCall, ToolDefinition};

use crate::traits::Provider;
use crate::util::{from_reqwest, http_status_error, resolve_api_key};

pub struct OpenAiCompatProvider {
    id: String,
    base_url: String,
    api_key: String,
    capabilities: ProviderCapabilities,
    client: reqwest::Client,
}

impl OpenAiCompatProvider {
    pub fn from_config(cfg: &ProviderConfig, timeout_ms: u64) -> Result<Self> {
        let api_key = resolve_api_key(&cfg.auth)?;
        let client = reqwest::Client::builder()
            .timeout(std::time::Duration::from_millis(timeout_ms))
            .build()
            .map_err(from_reqwest)?;

        Ok(Self {
            id: cfg.id.clone(),
            base_url: cfg.base_url.trim_end_matches('/').to_string(),
            api_key,
            capabilities: ProviderCapabilities {
                tools: ToolSupport::ModelDependent,
                parallel_tool_calls: true,
                usage_metrics: true,
                json_mode: true,
                streaming: true,
            },
            client,
        })
    }
}

#[async_trait::async_trait]
impl Provider for OpenAiCompatProvider {
    async fn chat(&self, req: &ChatRequest) -> Result<ChatResponse> {
        let body = build_body(req);
        let url = format!("{}/chat/completions", self.base_url);

        let resp = self
            .client
            .post(&url)
            .bearer_auth(&self.api_key)
            .json(&body)
            .send()
            .await
            .map_err(from_reqwest)?;

        let status = resp.status();
        if !status.is_success() {
            let text = resp.text().await.unwrap_or_default();
            return Err(http_status_error(&self.id, status, &text));
        }

        let json: Value = resp.json().await.map_err(from_reqwest)?;
        parse_response(&self.id, &json)
    }

    fn name(&self) -> &str {
        &self.id
    }

    fn capabilities(&self) -> &ProviderCapabilities {
        &self.capabilities
    }
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Request serialization
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

fn build_body(req: &ChatRequest) -> Value {
    let mut messages: Vec<Value> = Vec::with_capacity(req.messages.len() + 1);
    if !req.system.is_empty() {
        messages.push(serde_json::json!({ "role": "system", "content": req.system }));
    }
    for msg in &req.messages {
        messages.extend(message_to_wire(msg));
    }

    let mut body = serde_json::json!({
        "model": req.model,
        "messages": messages,
        "max_tokens": req.max_tokens,
    });
    if !req.tools.is_empty() {
        body["tools"] = Value::Array(req.tools.iter().map(tool_to_wire).collect());
    }
    body
}

/// One internal message can fan out to several wire messages (every
/// tool_result block becomes its own `role: "tool"` entry).
fn message_to_wire(msg: &Message) -> Vec<Value> {
    match (&msg.role, &msg.content) {
        (Role::User, MessageBody::Text(t)) => {
            vec![serde_json::json!({ "role": "user", "content": t })]
        }
        (Role::Assistant, MessageBody::Text(t)) => {
            vec![serde_json::json!({ "role": "assistant", "content": t })]
        }
        (Role::Assistant, MessageBody::Blocks(blocks)) => {
            let mut text_parts: Vec<&str> = Vec::new();
            let mut tool_calls: Vec<Value> = Vec::new();
            for block in blocks {
                match block {
                    ContentBlock::Text { text } => text_parts.push(text),
                    ContentBlock::ToolUse { id, name, input } => {
                        tool_calls.push(serde_json::json!({
                            "id": id,
                            "type": "function",
                            "function": {
                                "name": name,
                                "arguments": input.to_string(),
                            }
                        }));
                    }
                    ContentBlock::ToolResult { .. } => {}
                }
            }
            let mut entry = serde_json::json!({ "role": "assistant" });
            entry["content"] = if text_parts.is_empty() {
                Value::Null
            } else {
                Value::String(text_parts.join(""))
            };
            if !tool_calls.is_empty() {
                entry["tool_calls"] = Value::Array(tool_calls);
            }
            vec![entry]
        }
        (Role::User, MessageBody::Blocks(blocks)) => blocks
            .iter()
            .filter_map(|block| match block {
                ContentBlock::ToolResult { tool_use_id, content } => Some(serde_json::json!({
                    "role": "tool",
                    "tool_call_id": tool_use_id,
                    "content": content,
                })),
                ContentBlock::Text { text } => {
                    Some(serde_json::json!({ "role": "user", "content": text }))
                }
                ContentBlock::ToolUse { .. } => None,
            })
            .collect(),
    }
}

fn tool_to_wire(tool: &ToolDefinition) -> Value {
    serde_json::json!({
        "type": "function",
        "function": {
            "name": tool.name,
            "description": tool.description,
            "parameters": tool.input_schema,
        }
    })
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Response deserialization
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

fn parse_response(provider: &str, body: &Value) -> Result<ChatResponse> {
    let choice = body
        .pointer("/choices/0")
        .ok_or_else(|| Error::Provider {
            provider: provider.to_string(),
            message: "response has no choices".into(),
        })?;
    let message = choice.get("message").cloned().unwrap_or(Value::Null);

    let text = message
        .get("content")
        .and_then(|v| v.as_str())
        .filter(|s| !s.is_empty())
        .map(String::from);

    let mut tool_calls = Vec::new();
    if let Some(calls) = message.get("tool_calls").and_then(|v| v.as_array()) {
        for call in calls {
            let id = call.get("id").and_then(|v| v.as_str()).unwrap_or_default();
            let name = call
                .pointer("/function/name")
                .and_then(|v| v.as_str())
                .unwrap_or_default();
            let raw_args = call
                .pointer("/function/arguments")
                .and_then(|v| v.as_str())
                .unwrap_or("{}");
            // Malformed argument JSON degrades to an empty object so the
            // dispatch pipeline can report it through schema validation.
            let input = serde_json::from_str(raw_args).unwrap_or_else(|e| {
                tracing::warn!(tool = name, error = %e, "tool call arguments are not valid JSON");
                Value::Object(Default::default())
            });
            tool_calls.push(ToolCall { id: id.to_string(), name: name.to_string(), input });
        }
    }

    let stop_reason = match choice.get("finish_reason").and_then(|v| v.as_str()) {
        Some("tool_calls") => StopReason::ToolUse,
        Some("length") => StopReason::MaxTokens,
        Some("stop") | None => {
            if tool_calls.is_empty() {
                StopReason::EndTurn
            } else {
                StopReason::ToolUse
            }
        }
        Some(other) => {
            return Err(Error::Provider {
                provider: provider.to_string(),
                message: format!("unexpected finish_reason '{other}'"),
            })
        }
    };

    let usage = Usage {
        input_tokens: body.pointer("/usage/prompt_tokens").and_then(|v| v.as_u64()),
        output_tokens: body.pointer("/usage/completion_tokens").and_then(|v| v.as_u64()),
    };

    Ok(ChatResponse {
        text,
        tool_calls,
        stop_reason,
        usage,
        model: body.get("model").and_then(|v| v.as_str()).unwrap_or_default().to_string(),
        provider: provider.to_string(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn assistant_tool_use_round_trips_to_function_entries() {
        let msg = Message::assistant_tool_use(
            "checking",
            &[ToolCall {
                id: "call_1".into(),
                name: "note_list".into(),
                input: serde_json::json!({"q": "x"}),
            }],
        );
        let wire = message_to_wire(&msg);
        assert_eq!(wire.len(), 1);
        assert_eq!(wire[0]["tool_calls"][0]["function"]["name"], "note_list");
        // arguments are a JSON string, not an object
        assert!(wire[0]["tool_calls"][0]["function"]["arguments"].is_string());
    }

    #[test]
    fn tool_results_become_tool_role_messages() {
        let msg = Message::tool_results(&[
            ("call_1".into(), "a".into()),
            ("call_2".into(), "b".into()),
        ]);
        let wire = message_to_wire(&msg);
        assert_eq!(wire.len(), 2);
        assert_eq!(wire[0]["role"], "tool");
        assert_eq!(wire[0]["tool_call_id"], "call_1");
        assert_eq!(wire[1]["tool_call_id"], "call_2");
    }

    #[test]
    fn parses_tool_call_response_with_string_arguments() {
        let body = serde_json::json!({
            "model": "gpt-4o",
            "choices": [{
                "finish_reason": "tool_calls",
                "message": {
                    "content": null,
                    "tool_calls": [{
                        "id": "call_1",
                        "type": "function",
                        "function": { "name": "note_list", "arguments": "{\"q\":\"x\"}" }
                    }]
                }
            }],
            "usage": { "prompt_tokens": 9, "completion_tokens": 4 }
        });
        let resp = parse_response("openai", &body).unwrap();
        assert_eq!(resp.stop_reason, StopReason::ToolUse);
        assert_eq!(resp.tool_calls[0].input["q"], "x");
        assert_eq!(resp.usage.output_tokens, Some(4));
    }

    #[test]
    fn malformed_arguments_degrade_to_empty_object() {
        let body = serde_json::json!({
            "choices": [{
                "finish_reason": "tool_calls",
                "message": {
                    "tool_calls": [{
                        "id": "c",
                        "function": { "name": "t", "arguments": "{not json" }
                    }]
                }
            }]
        });
        let resp = parse_response("openai", &body).unwrap();
        assert!(resp.tool_calls[0].input.as_object().unwrap().is_empty());
    }

    #[test]
    fn length_finish_maps_to_max_tokens() {
        let body = serde_json::json!({
            "choices": [{ "finish_reason": "length", "message": { "content": "trunc" } }]
        });
        let resp = parse_response("openai", &body).unwrap();
        assert_eq!(resp.stop_reason, StopReason::MaxTokens);
    }
}
