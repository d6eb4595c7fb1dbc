//! Google Gemini adapter (generateContent API).
//!
//! Gemini has no tool-call ids: calls are bound by function name. The
//! adapter synthesizes per-response ids on the way in and resolves
//! `tool_use_id → name` from the conversation on the way out.

use std::collections::HashMap;

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

pub struct GoogleProvider {
    id: String,
    base_url: String,
    api_key: String,
    capabilities: ProviderCapabilities,
    client: reqwest::Client,
}

impl GoogleProvider {
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
                json_mode: true,
                streaming: true,
            },
            client,
        })
    }
}

#[async_trait::async_trait]
impl Provider for GoogleProvider {
    async fn chat(&self, req: &ChatRequest) -> Result<ChatResponse> {
        let body = build_body(req);
        let url = format!("{}/v1beta/models/{}:generateContent", self.base_url, req.model);

        let resp = self
            .client
            .post(&url)
            .header("x-goog-api-key", &self.api_key)
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
        parse_response(&self.id, &req.model, &json)
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
    // Resolve tool_use_id → function name across the whole conversation.
    let id_to_name = collect_call_names(&req.messages);

    let contents: Vec<Value> = req
        .messages
        .iter()
        .map(|m| message_to_wire(m, &id_to_name))
        .collect();

    let mut body = serde_json::json!({
        "contents": contents,
        "generationConfig": { "maxOutputTokens": req.max_tokens },
    });

    if !req.system.is_empty() {
        body["systemInstruction"] = serde_json::json!({ "parts": [{ "text": req.system }] });
    }
    if !req.tools.is_empty() {
        let decls: Vec<Value> = req.tools.iter().map(tool_to_wire).collect();
        body["tools"] = serde_json::json!([{ "functionDeclarations": decls }]);
    }
    body
}

fn collect_call_names(messages: &[Message]) -> HashMap<String, String> {
    let mut map = HashMap::new();
    for msg in messages {
        if let MessageBody::Blocks(blocks) = &msg.content {
            for block in blocks {
                if let ContentBlock::ToolUse { id, name, .. } = block {
                    map.insert(id.clone(), name.clone());
                }
            }
        }
    }
    map
}

fn message_to_wire(msg: &Message, id_to_name: &HashMap<String, String>) -> Value {
    let role = match msg.role {
        Role::User => "user",
        Role::Assistant => "model",
    };
    let parts: Vec<Value> = match &msg.content {
        MessageBody::Text(t) => vec![serde_json::json!({ "text": t })],
        MessageBody::Blocks(blocks) => blocks
            .iter()
            .map(|block| match block {
                ContentBlock::Text { text } => serde_json::json!({ "text": text }),
                ContentBlock::ToolUse { name, input, .. } => serde_json::json!({
                    "functionCall": { "name": name, "args": input }
                }),
                ContentBlock::ToolResult { tool_use_id, content } => {
                    let name = id_to_name
                        .get(tool_use_id)
                        .cloned()
                        .unwrap_or_else(|| tool_use_id.clone());
                    serde_json::json!({
                        "functionResponse": {
                            "name": name,
                            "response": { "content": content }
                        }
                    })
                }
            })
            .collect(),
    };
    serde_json::json!({ "role": role, "parts": parts })
}

fn tool_to_wire(tool: &ToolDefinition) -> Value {
    serde_json::json!({
        "name": tool.name,
        "description": tool.description,
        "parameters": tool.input_schema,
    })
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Response deserialization
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

fn parse_response(provider: &str, model: &str, body: &Value) -> Result<ChatResponse> {
    let candidate = body.pointer("/candidates/0").ok_or_else(|| Error::Provider {
        provider: provider.to_string(),
        message: "response has no candidates".into(),
    })?;

    let empty = Vec::new();
    let parts = candidate
        .pointer("/content/parts")
        .and_then(|v| v.as_array())
        .unwrap_or(&empty);

    let mut text_parts: Vec<&str> = Vec::new();
    let mut tool_calls: Vec<ToolCall> = Vec::new();

    for part in parts {
        if let Some(t) = part.get("text").and_then(|v| v.as_str()) {
            text_parts.push(t);
        } else if let Some(fc) = part.get("functionCall") {
            let name = fc.get("name").and_then(|v| v.as_str()).unwrap_or_default();
            tool_calls.push(ToolCall {
                // Synthesized id, unique within this response.
                id: format!("{}-{}", name, tool_calls.len()),
                name: name.to_string(),
                input: fc.get("args").cloned().unwrap_or(Value::Object(Default::default())),
            });
        }
    }

    let stop_reason = if !tool_calls.is_empty() {
        StopReason::ToolUse
    } else {
        match candidate.get("finishReason").and_then(|v| v.as_str()) {
            Some("MAX_TOKENS") => StopReason::MaxTokens,
            _ => StopReason::EndTurn,
        }
    };

    let usage = Usage {
        input_tokens: body.pointer("/usageMetadata/promptTokenCount").and_then(|v| v.as_u64()),
        output_tokens: body
            .pointer("/usageMetadata/candidatesTokenCount")
            .and_then(|v| v.as_u64()),
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
        model: model.to_string(),
        provider: provider.to_string(),
    })
}
