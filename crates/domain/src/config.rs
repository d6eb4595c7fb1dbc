use std::collections::HashMap;
use std::path::PathBuf;

use serde::{Deserialize, Serialize};

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Top-level config
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct Config {
    #[serde(default)]
    pub server: ServerConfig,
    #[serde(default)]
    pub llm: LlmConfig,
    #[serde(default)]
    pub tiers: TierRoutingConfig,
    #[serde(default)]
    pub usage: UsageConfig,
    #[serde(default)]
    pub skills: SkillsConfig,
    #[serde(default)]
    pub confirmation: ConfirmationConfig,
    #[serde(default)]
    pub agent: AgentRunConfig,
    #[serde(default)]
    pub persist: PersistConfig,
}

impl Config {
    /// Load from a TOML file; fall back to defaults when the file is
    /// missing or malformed (a warning is logged either way).
    pub fn load_or_default(path: &str) -> Self {
        match std::fs::read_to_string(path) {
            Ok(raw) => match toml::from_str(&raw) {
                Ok(cfg) => cfg,
                Err(e) => {
                    tracing::warn!(path, error = %e, "config parse failed, using defaults");
                    Self::default()
                }
            },
            Err(e) => {
                tracing::warn!(path, error = %e, "config not readable, using defaults");
                Self::default()
            }
        }
    }

    /// Startup validation. Returns human-readable problems; empty means
    /// the config is usable.
    pub fn validate(&self) -> Vec<String> {
        let mut problems = Vec::new();

        if self.llm.providers.is_empty() {
            problems.push("no LLM providers configured ([[llm.providers]])".to_string());
            return problems;
        }

        let ids: Vec<&str> = self.llm.providers.iter().map(|p| p.id.as_str()).collect();

        if !ids.contains(&self.llm.default_provider.as_str()) {
            problems.push(format!(
                "llm.default_provider '{}' is not a configured provider",
                self.llm.default_provider
            ));
        } else if let Some(p) = self.llm.providers.iter().find(|p| p.id == self.llm.default_provider) {
            if !p.models.contains(&self.llm.default_model) {
                problems.push(format!(
                    "llm.default_model '{}' is not listed for provider '{}'",
                    self.llm.default_model, p.id
                ));
            }
        }

        for name in &self.llm.failover_chain {
            if !ids.contains(&name.as_str()) {
                problems.push(format!("llm.failover_chain entry '{name}' is not a configured provider"));
            }
        }

        for p in &self.llm.providers {
            if p.models.is_empty() {
                problems.push(format!("provider '{}' has no models configured", p.id));
            }
        }

        problems
    }
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Server
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    #[serde(default = "d_host")]
    pub host: String,
    #[serde(default = "d_port")]
    pub port: u16,
    /// Bearer token for the HTTP surface. `None` = dev mode (no auth).
    #[serde(default)]
    pub api_token: Option<String>,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: d_host(),
            port: d_port(),
            api_token: None,
        }
    }
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// LLM providers & routing
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct LlmConfig {
    #[serde(default)]
    pub providers: Vec<ProviderConfig>,
    #[serde(default)]
    pub default_provider: String,
    #[serde(default)]
    pub default_model: String,
    /// Default model substituted for heavy-tier turns when the user has
    /// no explicit preference. Format `provider/model`.
    #[serde(default)]
    pub heavy_default_model: Option<String>,
    /// Ordered list of provider ids consulted when the preferred
    /// provider's breaker refuses.
    #[serde(default)]
    pub failover_chain: Vec<String>,
    #[serde(default = "d_timeout_ms")]
    pub request_timeout_ms: u64,
    #[serde(default)]
    pub breaker: BreakerConfig,
    /// Per-model pricing for cost estimation, keyed by model name.
    #[serde(default)]
    pub pricing: HashMap<String, ModelPricing>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ProviderKind {
    Anthropic,
    OpenaiCompat,
    Google,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProviderConfig {
    pub id: String,
    pub kind: ProviderKind,
    pub base_url: String,
    #[serde(default)]
    pub auth: AuthConfig,
    /// Models this provider may serve; the first entry is the failover
    /// default.
    #[serde(default)]
    pub models: Vec<String>,
}

/// API key resolution: plaintext `key` (warns) or an environment
/// variable named by `env`.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct AuthConfig {
    #[serde(default)]
    pub key: Option<String>,
    #[serde(default)]
    pub env: Option<String>,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct BreakerConfig {
    #[serde(default = "d_failure_threshold")]
    pub failure_threshold: u32,
    #[serde(default = "d_reset_timeout_secs")]
    pub reset_timeout_secs: u64,
}

impl Default for BreakerConfig {
    fn default() -> Self {
        Self {
            failure_threshold: d_failure_threshold(),
            reset_timeout_secs: d_reset_timeout_secs(),
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct ModelPricing {
    /// USD per million input tokens.
    pub input_per_mtok: f64,
    /// USD per million output tokens.
    pub output_per_mtok: f64,
}

impl ModelPricing {
    pub fn estimate_cost(&self, input_tokens: u64, output_tokens: u64) -> f64 {
        (input_tokens as f64 / 1e6) * self.input_per_mtok
            + (output_tokens as f64 / 1e6) * self.output_per_mtok
    }
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Tier routing
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TierRoutingConfig {
    /// Messages longer than this classify as heavy.
    #[serde(default = "d_heavy_len")]
    pub heavy_message_length: usize,
    /// Case-insensitive regexes that classify a message as heavy.
    #[serde(default = "d_heavy_patterns")]
    pub heavy_patterns: Vec<String>,
    /// Tools whose invocation escalates a light run to heavy.
    #[serde(default)]
    pub heavy_tools: Vec<String>,
}

impl Default for TierRoutingConfig {
    fn default() -> Self {
        Self {
            heavy_message_length: d_heavy_len(),
            heavy_patterns: d_heavy_patterns(),
            heavy_tools: Vec::new(),
        }
    }
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Usage tracking
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct UsageConfig {
    /// When the day's estimated spend first crosses this, an
    /// `alert.system.llm_cost` event fires (once per day).
    #[serde(default)]
    pub daily_alert_threshold_usd: Option<f64>,
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Skills
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct SkillsConfig {
    /// Key/value config made available to skills at registration;
    /// a skill whose `required_config` is not a subset is rejected.
    #[serde(default)]
    pub config: HashMap<String, String>,
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Confirmation tokens
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct ConfirmationConfig {
    #[serde(default = "d_confirm_ttl")]
    pub ttl_secs: u64,
    #[serde(default = "d_confirm_ttl")]
    pub abuse_window_secs: u64,
    #[serde(default = "d_abuse_threshold")]
    pub abuse_threshold: u32,
}

impl Default for ConfirmationConfig {
    fn default() -> Self {
        Self {
            ttl_secs: d_confirm_ttl(),
            abuse_window_secs: d_confirm_ttl(),
            abuse_threshold: d_abuse_threshold(),
        }
    }
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Agent loop
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AgentRunConfig {
    #[serde(default = "d_system_prompt")]
    pub system_prompt: String,
    #[serde(default = "d_max_tool_calls")]
    pub max_tool_calls: u32,
    #[serde(default = "d_tool_timeout_secs")]
    pub tool_timeout_secs: u64,
    #[serde(default = "d_max_response_tokens")]
    pub max_response_tokens: u32,
    /// Hard in+out token ceiling per run. `None` = unlimited.
    #[serde(default)]
    pub max_token_budget: Option<u64>,
}

impl Default for AgentRunConfig {
    fn default() -> Self {
        Self {
            system_prompt: d_system_prompt(),
            max_tool_calls: d_max_tool_calls(),
            tool_timeout_secs: d_tool_timeout_secs(),
            max_response_tokens: d_max_response_tokens(),
            max_token_budget: None,
        }
    }
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Persistence
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PersistConfig {
    /// Directory for the append-only JSONL record sinks.
    #[serde(default = "d_persist_dir")]
    pub dir: PathBuf,
}

impl Default for PersistConfig {
    fn default() -> Self {
        Self { dir: d_persist_dir() }
    }
}

// ── Serde default helpers ──────────────────────────────────────────

fn d_host() -> String {
    "127.0.0.1".into()
}
fn d_port() -> u16 {
    8470
}
fn d_timeout_ms() -> u64 {
    120_000
}
fn d_failure_threshold() -> u32 {
    5
}
fn d_reset_timeout_secs() -> u64 {
    60
}
fn d_heavy_len() -> usize {
    1_200
}
fn d_heavy_patterns() -> Vec<String> {
    vec![
        r"\b(deep|thorough)\s+(analysis|review)\b".into(),
        r"\bwrite\s+(a\s+)?(report|essay|long)\b".into(),
        r"\brefactor\b".into(),
    ]
}
fn d_confirm_ttl() -> u64 {
    300
}
fn d_abuse_threshold() -> u32 {
    10
}
fn d_system_prompt() -> String {
    "You are Concierge, a helpful multi-channel assistant. Use the available \
     tools when they help answer the user's request."
        .into()
}
fn d_max_tool_calls() -> u32 {
    10
}
fn d_tool_timeout_secs() -> u64 {
    30
}
fn d_max_response_tokens() -> u32 {
    4_096
}
fn d_persist_dir() -> PathBuf {
    PathBuf::from("./data")
}
