//! Anthropic-native adapter.
//!
//! Implements the Anthropic Messages API including tool use. System
//! prompts go in the top-level `system` field; tool results travel as
//! user messages with `tool_result` content blocks.

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

const ANTHROPIC_VERSION: &str = "2023-06-01";

pub struct AnthropicProvider {
    id: String,
    base_url: String,
    api_key: String,
    capabilities: ProviderCapabilities,
    client: reqwest::Client,
}

impl AnthropicProvider {
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
                tools: ToolSupport::Native,
                parallel_tool_calls: true,
                usage_metrics: true,
                json_mode: false,
                streaming: true,
            },
            client,
        })
    }
}

#[async_trait::async_trait]
impl Provider for AnthropicProvider {
    async fn chat(&self, req: &ChatRequest) -> Result<ChatResponse> {
        let body = build_body(req);
        let url = format!("{}/v1/messages", self.base_url);

        let resp = self
            .client
            .post(&url)
            .header("x-api-key", &self.api_key)
            .header("anthropic-version", ANTHROPIC_VERSION)
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
    let messages: Vec<Value> = req.messages.iter().map(message_to_wire).collect();

    let mut body = serde_json::json!({
        "model": req.model,
        "messages": messages,
        "max_tokens": req.max_tokens,
    });

    if !req.system.is_empty() {
        body["system"] = Value::String(req.system.clone());
    }
    if !req.tools.is_empty() {
        body["tools"] = Value::Array(req.tools.iter().map(tool_to_wire).collect());
    }
    body
}

fn message_to_wire(msg: &Message) -> Value {
    let role = match msg.role {
        Role::User => "user",
        Role::Assistant => "assistant",
    };
    let content = match &msg.content {
        MessageBody::Text(t) => Value::String(t.clone()),
        MessageBody::Blocks(blocks) => Value::Array(blocks.iter().map(block_to_wire).collect()),
    };
    serde_json::json!({ "role": role, "content": content })
}

fn block_to_wire(block: &ContentBlock) -> Value {
    match block {
        ContentBlock::Text { text } => serde_json::json!({ "type": "text", "text": text }),
        ContentBlock::ToolUse { id, name, input } => serde_json::json!({
            "type": "tool_use", "id": id, "name": name, "input": input,
        }),
        ContentBlock::ToolResult { tool_use_id, content } => serde_json::json!({
            "type": "tool_result", "tool_use_id": tool_use_id, "content": content,
        }),
    }
}

fn tool_to_wire(tool: &ToolDefinition) -> Value {
    serde_json::json!({
        "name": tool.name,
        "description": tool.description,
        "input_schema": tool.input_schema,
    })
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Response deserialization
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

fn parse_response(provider: &str, body: &Value) -> Result<ChatResponse> {
    let empty = Vec::new();
    let content = body.get("content").and_then(|v| v.as_array()).unwrap_or(&empty);

    let mut text_parts: Vec<&str> = Vec::new();
    let mut tool_calls: Vec<ToolCall> = Vec::new();

    for block in content {
        match block.get("type").and_then(|t| t.as_str()) {
            Some("text") => {
                if let Some(t) = block.get("text").and_then(|t| t.as_str()) {
                    text_parts.push(t);
                }
            }
            Some("tool_use") => {
                tool_calls.push(ToolCall {
                    id: str_field(block, "id"),
                    name: str_field(block, "name"),
                    input: block.get("input").cloned().unwrap_or(Value::Null),
                });
            }
            _ => {}
        }
    }

    let stop_reason = match body.get("stop_reason").and_then(|v| v.as_str()) {
        Some("tool_use") => StopReason::ToolUse,
        Some("max_tokens") => StopReason::MaxTokens,
        Some("end_turn") | Some("stop_sequence") => StopReason::EndTurn,
        other => {
            return Err(Error::Provider {
                provider: provider.to_string(),
                message: format!("unexpected stop_reason {other:?}"),
            })
        }
    };

    let usage = Usage {
        input_tokens: body.pointer("/usage/input_tokens").and_then(|v| v.as_u64()),
        output_tokens: body.pointer("/usage/output_tokens").and_then(|v| v.as_u64()),
    };

    let text = if text_parts.is_empty() {
        None
    } else {
        Some(text_parts.join(""))
    };

    Ok(ChatResponse {
        text,
        tool_calls,
        stop_reason,
        usage,
        model: str_field(body, "model"),
        provider: provider.to_string(),
    })
}

fn str_field(v: &Value, key: &str) -> String {
    v.get(key).and_then(|x| x.as_str()).unwrap_or_default().to_string()
}
