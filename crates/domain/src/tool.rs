use serde::{Deserialize, Serialize};

/// Internal tool call format (provider-agnostic).
/// Every adapter converts provider-specific tool calls to/from this.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolCall {
    pub id: String,
    pub name: String,
    pub input: serde_json::Value,
}

/// Tool definition exposed to the LLM and indexed by the skill registry.
///
/// `name` is unique across the entire registry, not just within one skill.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolDefinition {
    pub name: String,
    pub description: String,
    /// JSON Schema (Draft 2020-12 subset) for the tool's input.
    pub input_schema: serde_json::Value,
    /// Destructive tools require a single-use confirmation token.
    #[serde(default)]
    pub requires_confirmation: bool,
    /// Sensitive tools log input key names only, never values.
    #[serde(default)]
    pub sensitive: bool,
    /// Restricted to the main agent; sub-agents are refused.
    #[serde(default)]
    pub main_agent_only: bool,
}

impl ToolDefinition {
    pub fn new(name: impl Into<String>, description: impl Into<String>, input_schema: serde_json::Value) -> Self {
        Self {
            name: name.into(),
            description: description.into(),
            input_schema,
            requires_confirmation: false,
            sensitive: false,
            main_agent_only: false,
        }
    }
}
