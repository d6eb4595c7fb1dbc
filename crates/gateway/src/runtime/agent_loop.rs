//! The LLM ↔ tool-call scheduler.
//!
//! One [`AgentLoop`] value owns one run: it alternates LLM responses and
//! tool executions until the model stops asking for tools or a
//! termination condition fires. Tool calls execute **serially, in the
//! order the model produced them**, even when the provider advertises
//! parallel tool calls, so the continuation's tool_result blocks mirror
//! the tool_use blocks one-to-one and the model can bind them by id.
//!
//! Termination conditions, checked in order each round: the cancel
//! signal (before every LLM call), the tool-call budget (finalizes
//! gracefully without executing the overflowing batch), and the token
//! budget (fails the run). Tool errors are never fatal — they come back
//! to the model as tool_result content.

use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::Serialize;

use cg_domain::cancel::CancelToken;
use cg_domain::chat::{ChatRequest, Message, StopReason, Usage};
use cg_domain::error::{is_retryable_message, Error, Result};
use cg_providers::ResilientProvider;
use cg_skills::{ExecutionContext, SkillRegistry, ToolFilter};

/// Text appended when the model produced no final text at all.
const NO_RESPONSE_TEXT: &str = "No response generated.";
/// Text appended when the tool-call budget stops the run.
const MAX_TOOL_CALLS_TEXT: &str = "Reached maximum number of tool calls.";

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Configuration & result types
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

#[derive(Clone)]
pub struct AgentLoopConfig {
    /// Display name for logging (`"main"`, `"research-subagent"`, …).
    pub name: String,
    pub system_prompt: String,
    pub model: String,
    /// Only tools from these skills are offered. `None` = all skills.
    pub allowed_skills: Option<Vec<String>>,
    pub blocked_tools: Vec<String>,
    pub is_subagent: bool,
    pub max_tool_calls: u32,
    pub tool_timeout: Duration,
    pub max_token_budget: Option<u64>,
    pub max_response_tokens: u32,
    pub cancel: Option<CancelToken>,
    pub user_id: Option<String>,
    /// Tool names that escalate this run to the heavy tier. `None`
    /// disables escalation (heavy runs, or the post-escalation re-run).
    pub escalate_tools: Option<HashSet<String>>,
}

impl Default for AgentLoopConfig {
    fn default() -> Self {
        Self {
            name: "main".into(),
            system_prompt: String::new(),
            model: String::new(),
            allowed_skills: None,
            blocked_tools: Vec::new(),
            is_subagent: false,
            max_tool_calls: 10,
            tool_timeout: Duration::from_secs(30),
            max_token_budget: None,
            max_response_tokens: 4096,
            cancel: None,
            user_id: None,
            escalate_tools: None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum TranscriptRole {
    User,
    Assistant,
    ToolResult,
}

/// Append-only record of one run, in strict order: user, then per round
/// assistant text and tool_results in tool_use order, then the final
/// assistant text.
#[derive(Debug, Clone, Serialize)]
pub struct TranscriptEntry {
    pub role: TranscriptRole,
    pub content: String,
    pub timestamp: DateTime<Utc>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tool_name: Option<String>,
}

#[derive(Debug, Clone)]
pub struct AgentRunResult {
    pub text: String,
    pub total_tokens: Usage,
    pub tool_call_count: u32,
    pub transcript: Vec<TranscriptEntry>,
    /// Set when a light-tier run requested a heavy tool: the loop
    /// stopped before executing it and the orchestrator should re-pick
    /// the provider at the heavy tier. Carries the tool name.
    pub escalate_to_heavy: Option<String>,
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// AgentLoop
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

pub struct AgentLoop {
    provider: Arc<ResilientProvider>,
    registry: Arc<SkillRegistry>,
    config: AgentLoopConfig,
    transcript: Vec<TranscriptEntry>,
}

impl AgentLoop {
    pub fn new(
        provider: Arc<ResilientProvider>,
        registry: Arc<SkillRegistry>,
        config: AgentLoopConfig,
    ) -> Self {
        Self {
            provider,
            registry,
            config,
            transcript: Vec::new(),
        }
    }

    /// Transcript accumulated so far. After a run-fatal error this still
    /// holds every entry appended up to the failure point.
    pub fn transcript(&self) -> &[TranscriptEntry] {
        &self.transcript
    }

    /// Drive the run to completion.
    pub async fn run(&mut self, user_input: &str) -> Result<AgentRunResult> {
        self.append(TranscriptRole::User, user_input.to_string(), None);

        let tools = self.registry.tool_definitions(&ToolFilter {
            allowed_skills: self.config.allowed_skills.clone(),
            blocked_tools: self.config.blocked_tools.clone(),
            exclude_main_agent_only: self.config.is_subagent,
        });
        let exec_ctx = ExecutionContext {
            is_subagent: self.config.is_subagent,
            user_id: self.config.user_id.clone(),
        };

        let mut messages = vec![Message::user(user_input)];
        let mut total_tokens = Usage::default();
        let mut tool_call_count: u32 = 0;
        let mut lm_calls: u32 = 0;

        loop {
            // Cancellation is observed immediately before every LLM call;
            // in-flight work is not forcibly aborted.
            if let Some(cancel) = &self.config.cancel {
                if cancel.is_cancelled() {
                    return Err(Error::Cancelled);
                }
            }

            let req = ChatRequest {
                model: self.config.model.clone(),
                system: self.config.system_prompt.clone(),
                messages: messages.clone(),
                tools: tools.clone(),
                max_tokens: self.config.max_response_tokens,
                cancel: self.config.cancel.clone(),
            };

            lm_calls += 1;
            tracing::debug!(
                run = %self.config.name,
                lm_calls,
                tool_call_count,
                "issuing LLM call"
            );
            // Provider and budget errors are run-fatal; the transcript
            // keeps everything appended so far.
            let resp = self.provider.chat(&req).await?;
            total_tokens.accumulate(&resp.usage);

            let response_text = resp.text.clone().unwrap_or_default();

            if resp.stop_reason != StopReason::ToolUse || resp.tool_calls.is_empty() {
                return Ok(self.finalize(response_text, total_tokens, tool_call_count, None));
            }

            // Tool-call budget: never execute a batch that would push the
            // count past the limit; finalize gracefully instead.
            let batch_len = resp.tool_calls.len() as u32;
            if tool_call_count + batch_len > self.config.max_tool_calls {
                let text = if response_text.is_empty() {
                    MAX_TOOL_CALLS_TEXT.to_string()
                } else {
                    response_text
                };
                tracing::info!(
                    run = %self.config.name,
                    tool_call_count,
                    "tool-call budget reached, finalizing"
                );
                return Ok(self.finalize(text, total_tokens, tool_call_count, None));
            }

            // Token budget: run-fatal once exceeded.
            if let Some(budget) = self.config.max_token_budget {
                let used = total_tokens.total();
                if used > budget {
                    return Err(Error::BudgetExceeded { used, limit: budget });
                }
            }

            // Mid-turn escalation: a light run that wants a heavy tool
            // stops here and reports the intent; re-picking the provider
            // is the orchestrator's job.
            if let Some(heavy) = &self.config.escalate_tools {
                if let Some(call) = resp.tool_calls.iter().find(|c| heavy.contains(&c.name)) {
                    tracing::info!(
                        run = %self.config.name,
                        tool = %call.name,
                        "heavy tool requested on light tier, surfacing escalation"
                    );
                    return Ok(self.finalize(
                        response_text,
                        total_tokens,
                        tool_call_count,
                        Some(call.name.clone()),
                    ));
                }
            }

            if !response_text.is_empty() {
                self.append(TranscriptRole::Assistant, response_text.clone(), None);
            }

            // Execute serially in model order; results mirror that order
            // so the continuation binds by id.
            let mut results: Vec<(String, String)> = Vec::with_capacity(resp.tool_calls.len());
            for call in &resp.tool_calls {
                tool_call_count += 1;
                let mut exec = self
                    .registry
                    .execute_with_timeout(&call.name, &call.input, &exec_ctx, self.config.tool_timeout)
                    .await;
                // One automatic retry for the transient class.
                if exec.is_error && is_retryable_message(&exec.content) {
                    tracing::debug!(tool = %call.name, "transient tool error, retrying once");
                    exec = self
                        .registry
                        .execute_with_timeout(&call.name, &call.input, &exec_ctx, self.config.tool_timeout)
                        .await;
                }
                self.append(
                    TranscriptRole::ToolResult,
                    exec.content.clone(),
                    Some(call.name.clone()),
                );
                results.push((call.id.clone(), exec.content));
            }

            messages.push(Message::assistant_tool_use(&response_text, &resp.tool_calls));
            messages.push(Message::tool_results(&results));
        }
    }

    fn finalize(
        &mut self,
        text: String,
        total_tokens: Usage,
        tool_call_count: u32,
        escalate_to_heavy: Option<String>,
    ) -> AgentRunResult {
        let text = if text.is_empty() {
            NO_RESPONSE_TEXT.to_string()
        } else {
            text
        };
        self.append(TranscriptRole::Assistant, text.clone(), None);
        AgentRunResult {
            text,
            total_tokens,
            tool_call_count,
            transcript: self.transcript.clone(),
            escalate_to_heavy,
        }
    }

    fn append(&mut self, role: TranscriptRole, content: String, tool_name: Option<String>) {
        self.transcript.push(TranscriptEntry {
            role,
            content,
            timestamp: Utc::now(),
            tool_name,
        });
    }
}
