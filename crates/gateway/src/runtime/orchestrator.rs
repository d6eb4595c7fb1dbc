//! Orchestrator facade — owns one turn from inbound message to reply.
//!
//! Composition order: confirmation short-circuit, tier classification,
//! provider selection, agent run (with at most one heavy-tier re-run on
//! escalation), then usage/routing/audit records. All persistence is
//! fire-and-forget; run-fatal errors are translated into a bounded set
//! of user-facing messages with no internals leaked.

use std::sync::OnceLock;

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use cg_domain::cancel::CancelToken;
use cg_domain::error::Error;
use cg_providers::{Selection, Tier};
use cg_skills::ExecutionContext;

use crate::state::AppState;

use super::agent_loop::{AgentLoop, AgentLoopConfig, AgentRunResult};

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Inbound / outbound shapes
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

#[derive(Debug, Clone, Deserialize)]
pub struct Attachment {
    pub name: String,
    pub local_path: String,
    #[serde(default)]
    pub mime_type: Option<String>,
    pub size_bytes: u64,
}

/// Normalized envelope posted by channel connectors.
#[derive(Debug, Clone, Deserialize)]
pub struct InboundMessage {
    pub user_id: String,
    pub text: String,
    pub channel: String,
    #[serde(default)]
    pub attachments: Vec<Attachment>,
    #[serde(default)]
    pub temp_dir: Option<String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct OutboundFile {
    pub name: String,
    pub path: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub mime_type: Option<String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct OutboundReply {
    pub text: String,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub files: Vec<OutboundFile>,
    /// True when the reply embeds a confirmation prompt; upstream
    /// adapters must keep the turn's temp directory alive until the
    /// token resolves or expires.
    pub pending_confirmation: bool,
}

impl OutboundReply {
    fn text_only(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            files: Vec::new(),
            pending_confirmation: false,
        }
    }
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// handle_message — one turn
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

pub async fn handle_message(state: &AppState, msg: InboundMessage) -> OutboundReply {
    let correlation_id = Uuid::new_v4();

    // ── Confirmation short-circuit ───────────────────────────────
    if let Some(token) = state.confirmations.is_confirmation_message(&msg.text) {
        return resolve_confirmation(state, &msg, &token, correlation_id).await;
    }

    // ── Tier classification & provider selection ─────────────────
    let classification = state.classifier.classify(&msg.text);
    let tier = classification.tier;

    let selection = match state.providers.select_for(&msg.user_id, tier) {
        Ok(sel) => sel,
        Err(e) => {
            tracing::error!(user_id = %msg.user_id, error = %e, "no provider available");
            return OutboundReply::text_only(run_error_text(&e));
        }
    };

    state.routing.write(serde_json::json!({
        "correlation_id": correlation_id,
        "user_id": &msg.user_id,
        "channel": &msg.channel,
        "tier": tier.as_str(),
        "reason": &classification.reason,
        "provider": &selection.provider,
        "model": &selection.model,
        "failed_over": selection.failed_over,
        "original_provider": &selection.original_provider,
        "timestamp": chrono::Utc::now(),
    }));

    // ── Agent run, with one heavy re-run on escalation ───────────
    let cancel = state.cancel_map.register(&msg.user_id);
    let outcome = run_turn(state, &msg, &selection, tier, cancel.clone()).await;
    let outcome = match outcome {
        Ok(result) if result.escalate_to_heavy.is_some() => {
            let tool = result.escalate_to_heavy.clone().unwrap_or_default();
            escalate_and_rerun(state, &msg, tier, &tool, cancel, correlation_id).await
        }
        other => other.map(|r| (r, selection)),
    };
    state.cancel_map.remove(&msg.user_id);

    // ── Record + reply ───────────────────────────────────────────
    match outcome {
        Ok((result, used_selection)) => {
            state.usage.track(
                &used_selection.provider,
                &used_selection.model,
                &result.total_tokens,
                Some(tier),
            );
            state.audit.write(serde_json::json!({
                "correlation_id": correlation_id,
                "event": "turn_completed",
                "user_id": &msg.user_id,
                "channel": &msg.channel,
                "provider": &used_selection.provider,
                "model": &used_selection.model,
                "tool_calls": result.tool_call_count,
                "input_tokens": result.total_tokens.input_tokens,
                "output_tokens": result.total_tokens.output_tokens,
                "timestamp": chrono::Utc::now(),
            }));

            let pending_confirmation = embeds_confirmation_prompt(&result.text);
            OutboundReply {
                text: result.text,
                files: Vec::new(),
                pending_confirmation,
            }
        }
        Err(e) => {
            state.audit.write(serde_json::json!({
                "correlation_id": correlation_id,
                "event": "turn_failed",
                "user_id": &msg.user_id,
                "channel": &msg.channel,
                "error": e.to_string(),
                "timestamp": chrono::Utc::now(),
            }));
            tracing::warn!(user_id = %msg.user_id, error = %e, "turn failed");
            OutboundReply::text_only(run_error_text(&e))
        }
    }
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Helpers
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

async fn run_turn(
    state: &AppState,
    msg: &InboundMessage,
    selection: &Selection,
    tier: Tier,
    cancel: CancelToken,
) -> Result<AgentRunResult, Error> {
    let provider = state
        .providers
        .get(&selection.provider)
        .ok_or_else(|| Error::ProviderUnavailable(selection.provider.clone()))?;

    // Escalation is armed only on light runs; the heavy re-run and all
    // heavy-classified turns run with it disabled.
    let escalate_tools = (tier == Tier::Light && !state.classifier.heavy_tools().is_empty())
        .then(|| state.classifier.heavy_tools().clone());

    let agent_cfg = &state.config.agent;
    let mut agent = AgentLoop::new(
        provider,
        state.registry.clone(),
        AgentLoopConfig {
            name: format!("{}:{}", msg.channel, msg.user_id),
            system_prompt: agent_cfg.system_prompt.clone(),
            model: selection.model.clone(),
            allowed_skills: None,
            blocked_tools: Vec::new(),
            is_subagent: false,
            max_tool_calls: agent_cfg.max_tool_calls,
            tool_timeout: std::time::Duration::from_secs(agent_cfg.tool_timeout_secs),
            max_token_budget: agent_cfg.max_token_budget,
            max_response_tokens: agent_cfg.max_response_tokens,
            cancel: Some(cancel),
            user_id: Some(msg.user_id.clone()),
            escalate_tools,
        },
    );

    agent.run(&msg.text).await
}

async fn escalate_and_rerun(
    state: &AppState,
    msg: &InboundMessage,
    original_tier: Tier,
    tool: &str,
    cancel: CancelToken,
    correlation_id: Uuid,
) -> Result<(AgentRunResult, Selection), Error> {
    let selection = state.providers.select_for(&msg.user_id, Tier::Heavy)?;
    tracing::info!(
        user_id = %msg.user_id,
        tool,
        provider = %selection.provider,
        model = %selection.model,
        "escalating turn to heavy tier"
    );
    state.routing.write(serde_json::json!({
        "correlation_id": correlation_id,
        "user_id": &msg.user_id,
        "tier": Tier::Heavy.as_str(),
        "reason": format!("escalated from {} on heavy tool '{tool}'", original_tier.as_str()),
        "provider": &selection.provider,
        "model": &selection.model,
        "failed_over": selection.failed_over,
        "timestamp": chrono::Utc::now(),
    }));

    // Tier::Heavy disables escalation inside run_turn, so a second
    // escalation is impossible.
    let result = run_turn(state, msg, &selection, Tier::Heavy, cancel).await?;
    Ok((result, selection))
}

async fn resolve_confirmation(
    state: &AppState,
    msg: &InboundMessage,
    token: &str,
    correlation_id: Uuid,
) -> OutboundReply {
    let Some(action) = state.confirmations.consume(token, &msg.user_id) else {
        return OutboundReply::text_only(
            "That confirmation code is invalid or has expired.",
        );
    };

    tracing::info!(
        user_id = %msg.user_id,
        skill = %action.skill,
        tool = %action.tool,
        "confirmed action dispatching"
    );

    let exec = state
        .registry
        .execute(
            &action.tool,
            &action.input,
            &ExecutionContext {
                is_subagent: false,
                user_id: Some(msg.user_id.clone()),
            },
        )
        .await;

    state.audit.write(serde_json::json!({
        "correlation_id": correlation_id,
        "event": "confirmed_action",
        "user_id": &msg.user_id,
        "skill": &action.skill,
        "tool": &action.tool,
        "description": &action.description,
        "is_error": exec.is_error,
        "timestamp": chrono::Utc::now(),
    }));

    OutboundReply::text_only(exec.content)
}

/// A reply that embeds a `confirm <TOKEN>` prompt means a destructive
/// action is waiting on the user.
fn embeds_confirmation_prompt(text: &str) -> bool {
    static RE: OnceLock<regex::Regex> = OnceLock::new();
    let re = RE.get_or_init(|| {
        regex::Regex::new(r"\bconfirm\s+[A-Z2-7]{16,}\b").expect("confirmation prompt regex")
    });
    re.is_match(text)
}

/// Bounded set of user-facing failure messages. No stack traces, no
/// provider internals, no secrets.
fn run_error_text(e: &Error) -> String {
    match e {
        Error::Cancelled => "This request was cancelled.".into(),
        Error::BudgetExceeded { .. } => {
            "This request hit its token budget before finishing. Try a narrower question.".into()
        }
        Error::ProviderUnavailable(_) | Error::AllProvidersUnavailable | Error::Provider { .. } | Error::Http(_) => {
            "I'm having trouble reaching the language model provider right now. Please try again in a minute.".into()
        }
        Error::Auth(_) => {
            "The language model provider rejected this server's credentials. An operator needs to check the configuration.".into()
        }
        Error::Timeout(_) => {
            "The language model took too long to answer. Please try again.".into()
        }
        _ => "Something went wrong while handling that message. Please try again.".into(),
    }
}
