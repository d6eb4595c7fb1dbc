use serde::{Deserialize, Serialize};

use crate::cancel::CancelToken;
use crate::tool::{ToolCall, ToolDefinition};

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Messages and content blocks
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    User,
    Assistant,
}

/// One block inside a structured message.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum ContentBlock {
    #[serde(rename = "text")]
    Text { text: String },
    #[serde(rename = "tool_use")]
    ToolUse {
        id: String,
        name: String,
        input: serde_json::Value,
    },
    #[serde(rename = "tool_result")]
    ToolResult { tool_use_id: String, content: String },
}

/// Message content: either a plain string or a sequence of blocks.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(untagged)]
pub enum MessageBody {
    Text(String),
    Blocks(Vec<ContentBlock>),
}

/// A message in the conversation (provider-agnostic).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Message {
    pub role: Role,
    pub content: MessageBody,
}

// ── Convenience constructors ───────────────────────────────────────

impl Message {
    pub fn user(text: impl Into<String>) -> Self {
        Self {
            role: Role::User,
            content: MessageBody::Text(text.into()),
        }
    }

    pub fn assistant(text: impl Into<String>) -> Self {
        Self {
            role: Role::Assistant,
            content: MessageBody::Text(text.into()),
        }
    }

    /// Assistant message carrying text (when non-empty) followed by the
    /// tool_use blocks, in the order the model produced them.
    pub fn assistant_tool_use(text: &str, calls: &[ToolCall]) -> Self {
        let mut blocks = Vec::with_capacity(calls.len() + 1);
        if !text.is_empty() {
            blocks.push(ContentBlock::Text { text: text.to_string() });
        }
        for call in calls {
            blocks.push(ContentBlock::ToolUse {
                id: call.id.clone(),
                name: call.name.clone(),
                input: call.input.clone(),
            });
        }
        Self {
            role: Role::Assistant,
            content: MessageBody::Blocks(blocks),
        }
    }

    /// User message carrying tool_result blocks, one per `(tool_use_id,
    /// content)` pair, preserving the given order.
    pub fn tool_results(results: &[(String, String)]) -> Self {
        let blocks = results
            .iter()
            .map(|(id, content)| ContentBlock::ToolResult {
                tool_use_id: id.clone(),
                content: content.clone(),
            })
            .collect();
        Self {
            role: Role::User,
            content: MessageBody::Blocks(blocks),
        }
    }
}

impl MessageBody {
    /// Concatenated text content. Non-text blocks are skipped.
    pub fn text(&self) -> String {
        match self {
            MessageBody::Text(t) => t.clone(),
            MessageBody::Blocks(blocks) => blocks
                .iter()
                .filter_map(|b| match b {
                    ContentBlock::Text { text } => Some(text.as_str()),
                    _ => None,
                })
                .collect::<Vec<_>>()
                .join("\n"),
        }
    }
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Request / Response types
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// A provider-agnostic chat completion request.
#[derive(Debug, Clone, Default)]
pub struct ChatRequest {
    /// Model identifier. Empty string lets the adapter use its default.
    pub model: String,
    /// System prompt, sent however the target API expects it.
    pub system: String,
    pub messages: Vec<Message>,
    /// Tool definitions the model may invoke.
    pub tools: Vec<ToolDefinition>,
    pub max_tokens: u32,
    /// Observed between attempts; in-flight HTTP calls are not aborted.
    pub cancel: Option<CancelToken>,
}

/// Why the model stopped generating.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StopReason {
    EndTurn,
    ToolUse,
    MaxTokens,
}

/// Token usage as reported by the provider. Either side may be absent
/// when the backend does not expose usage metrics.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize)]
pub struct Usage {
    pub input_tokens: Option<u64>,
    pub output_tokens: Option<u64>,
}

impl Usage {
    pub fn total(&self) -> u64 {
        self.input_tokens.unwrap_or(0) + self.output_tokens.unwrap_or(0)
    }

    pub fn accumulate(&mut self, other: &Usage) {
        if let Some(n) = other.input_tokens {
            *self.input_tokens.get_or_insert(0) += n;
        }
        if let Some(n) = other.output_tokens {
            *self.output_tokens.get_or_insert(0) += n;
        }
    }
}

/// A provider-agnostic chat completion response.
#[derive(Debug, Clone)]
pub struct ChatResponse {
    pub text: Option<String>,
    /// Tool calls emitted by the model, in production order.
    pub tool_calls: Vec<ToolCall>,
    pub stop_reason: StopReason,
    pub usage: Usage,
    /// The model that actually produced the response.
    pub model: String,
    /// The provider instance that served the request.
    pub provider: String,
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Capabilities
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// Tool-calling support level of a provider.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ToolSupport {
    None,
    Native,
    /// Supported on some of the provider's models only.
    ModelDependent,
}

/// The advertised capabilities of a provider.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct ProviderCapabilities {
    pub tools: ToolSupport,
    pub parallel_tool_calls: bool,
    pub usage_metrics: bool,
    pub json_mode: bool,
    pub streaming: bool,
}
