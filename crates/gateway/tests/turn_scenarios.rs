//! End-to-end turn scenarios with scripted providers and in-memory
//! skills — no network, no real models.

use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use parking_lot::Mutex;
use serde_json::json;

use cg_domain::bus::EventBus;
use cg_domain::cancel::CancelToken;
use cg_domain::chat::{
    ChatRequest, ChatResponse, ContentBlock, MessageBody, ProviderCapabilities, StopReason,
    ToolSupport, Usage,
};
use cg_domain::config::{BreakerConfig, Config, ConfirmationConfig, TierRoutingConfig};
use cg_domain::error::{Error, Result};
use cg_domain::tool::{ToolCall, ToolDefinition};
use cg_providers::{
    CircuitBreaker, Provider, ProviderManager, ResilientProvider, TierClassifier, UsageTracker,
};
use cg_skills::{
    ConfirmationManager, HealthTracker, RateLimiter, Skill, SkillRegistry, SkillStatus,
};
use cg_gateway::persist::NullSink;
use cg_gateway::runtime::{
    handle_message, AgentLoop, AgentLoopConfig, CancelMap, InboundMessage, TranscriptRole,
};
use cg_gateway::AppState;

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Scripted provider
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// Pops one canned response per call and records every request it saw.
struct Scripted {
    name: String,
    script: Mutex<Vec<Result<ChatResponse>>>,
    requests: Mutex<Vec<ChatRequest>>,
    caps: ProviderCapabilities,
}

impl Scripted {
    fn new(name: &str, script: Vec<Result<ChatResponse>>) -> Arc<Self> {
        Arc::new(Self {
            name: name.to_string(),
            script: Mutex::new(script),
            requests: Mutex::new(Vec::new()),
            caps: ProviderCapabilities {
                tools: ToolSupport::Native,
                parallel_tool_calls: true,
                usage_metrics: true,
                json_mode: false,
                streaming: false,
            },
        })
    }

    fn request_count(&self) -> usize {
        self.requests.lock().len()
    }

    fn request(&self, idx: usize) -> ChatRequest {
        self.requests.lock()[idx].clone()
    }
}

#[async_trait::async_trait]
impl Provider for Scripted {
    async fn chat(&self, req: &ChatRequest) -> Result<ChatResponse> {
        self.requests.lock().push(req.clone());
        let mut script = self.script.lock();
        if script.is_empty() {
            return Err(Error::Other("script exhausted".into()));
        }
        script.remove(0)
    }

    fn name(&self) -> &str {
        &self.name
    }

    fn capabilities(&self) -> &ProviderCapabilities {
        &self.caps
    }
}

fn text_response(provider: &str, text: &str) -> ChatResponse {
    ChatResponse {
        text: Some(text.to_string()),
        tool_calls: vec![],
        stop_reason: StopReason::EndTurn,
        usage: Usage { input_tokens: Some(5), output_tokens: Some(3) },
        model: "m".into(),
        provider: provider.into(),
    }
}

fn tool_response(provider: &str, calls: Vec<(&str, &str, serde_json::Value)>) -> ChatResponse {
    ChatResponse {
        text: None,
        tool_calls: calls
            .into_iter()
            .map(|(id, name, input)| ToolCall { id: id.into(), name: name.into(), input })
            .collect(),
        stop_reason: StopReason::ToolUse,
        usage: Usage { input_tokens: Some(10), output_tokens: Some(4) },
        model: "m".into(),
        provider: provider.into(),
    }
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// In-memory skills
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

struct NotesSkill {
    executions: AtomicUsize,
}

impl NotesSkill {
    fn new() -> Arc<Self> {
        Arc::new(Self { executions: AtomicUsize::new(0) })
    }
}

#[async_trait::async_trait]
impl Skill for NotesSkill {
    fn name(&self) -> &str {
        "notes"
    }
    fn description(&self) -> &str {
        "Note keeping"
    }
    fn tools(&self) -> Vec<ToolDefinition> {
        vec![
            ToolDefinition::new("note_list", "List notes", json!({ "type": "object", "properties": {} })),
            ToolDefinition {
                main_agent_only: true,
                ..ToolDefinition::new("note_purge", "Purge notes", json!({ "type": "object" }))
            },
        ]
    }
    async fn execute(&self, tool_name: &str, _input: &serde_json::Value) -> Result<String> {
        self.executions.fetch_add(1, Ordering::SeqCst);
        match tool_name {
            "note_list" => Ok(r#"{"results":[]}"#.into()),
            "note_purge" => Ok("purged".into()),
            other => Err(Error::Other(format!("unexpected tool {other}"))),
        }
    }
}

/// A destructive skill that mints a confirmation token instead of
/// acting immediately.
struct FilesSkill {
    confirmations: Arc<ConfirmationManager>,
    deletes: AtomicUsize,
}

#[async_trait::async_trait]
impl Skill for FilesSkill {
    fn name(&self) -> &str {
        "files"
    }
    fn description(&self) -> &str {
        "File management"
    }
    fn tools(&self) -> Vec<ToolDefinition> {
        vec![
            ToolDefinition {
                requires_confirmation: true,
                ..ToolDefinition::new(
                    "file_delete",
                    "Delete a file",
                    json!({
                        "type": "object",
                        "properties": { "path": { "type": "string" } },
                        "required": ["path"]
                    }),
                )
            },
            ToolDefinition::new(
                "file_delete_confirmed",
                "Run a confirmed delete",
                json!({ "type": "object", "properties": { "path": { "type": "string" } } }),
            ),
        ]
    }
    async fn execute(&self, tool_name: &str, input: &serde_json::Value) -> Result<String> {
        match tool_name {
            "file_delete" => {
                let path = input["path"].as_str().unwrap_or_default();
                let token = self.confirmations.create(
                    "u1",
                    "files",
                    "file_delete_confirmed",
                    input.clone(),
                    &format!("Delete {path}"),
                    None,
                );
                Ok(format!("This will permanently delete {path}. Reply `confirm {token}` to proceed."))
            }
            "file_delete_confirmed" => {
                self.deletes.fetch_add(1, Ordering::SeqCst);
                Ok("Deleted.".into())
            }
            other => Err(Error::Other(format!("unexpected tool {other}"))),
        }
    }
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Harness
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

struct Harness {
    state: AppState,
    registry: Arc<SkillRegistry>,
}

/// Build app state around the given providers (default = "a") with the
/// notes + files skills registered.
fn harness(providers: Vec<(&str, Arc<Scripted>)>, heavy_tools: Vec<String>) -> Harness {
    let bus = Arc::new(EventBus::new());

    let mut manager = ProviderManager::new(
        "a",
        "a-light",
        Some(("a".into(), "a-heavy".into())),
        vec!["b".into()],
    );
    for (id, scripted) in providers {
        let breaker = Arc::new(CircuitBreaker::new(BreakerConfig {
            failure_threshold: 5,
            reset_timeout_secs: 3600,
        }));
        let resilient = Arc::new(ResilientProvider::new(scripted, breaker.clone(), bus.clone()));
        manager.register(id, resilient, breaker, vec![format!("{id}-light"), format!("{id}-heavy")]);
    }

    let classifier = Arc::new(
        TierClassifier::from_config(&TierRoutingConfig {
            heavy_message_length: 500,
            heavy_patterns: vec![r"\bdeep analysis\b".into()],
            heavy_tools,
        })
        .unwrap(),
    );

    let confirmations = Arc::new(ConfirmationManager::new(ConfirmationConfig::default(), bus.clone()));
    let registry = Arc::new(SkillRegistry::new(
        Arc::new(HealthTracker::default()),
        Arc::new(RateLimiter::new()),
        Duration::from_secs(30),
    ));
    registry.register(NotesSkill::new(), &HashMap::new()).unwrap();
    registry
        .register(
            Arc::new(FilesSkill { confirmations: confirmations.clone(), deletes: AtomicUsize::new(0) }),
            &HashMap::new(),
        )
        .unwrap();

    let state = AppState {
        config: Arc::new(Config::default()),
        bus: bus.clone(),
        providers: Arc::new(manager),
        classifier,
        usage: Arc::new(UsageTracker::new(HashMap::new(), None, bus)),
        registry: registry.clone(),
        confirmations,
        cancel_map: Arc::new(CancelMap::new()),
        audit: Arc::new(NullSink),
        routing: Arc::new(NullSink),
        api_token_hash: None,
        started_at: Instant::now(),
    };

    Harness { state, registry }
}

fn inbound(text: &str) -> InboundMessage {
    InboundMessage {
        user_id: "u1".into(),
        text: text.into(),
        channel: "test".into(),
        attachments: vec![],
        temp_dir: None,
    }
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Scenario 1 — happy path
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

#[tokio::test]
async fn happy_path_plain_text_reply() {
    let provider = Scripted::new("a", vec![Ok(text_response("a", "hi"))]);
    let h = harness(vec![("a", provider.clone())], vec![]);

    let reply = handle_message(&h.state, inbound("hello")).await;
    assert_eq!(reply.text, "hi");
    assert!(!reply.pending_confirmation);
    assert_eq!(provider.request_count(), 1);

    // Usage tracked for the turn.
    let summary = h.state.usage.daily_summary();
    assert_eq!(summary.len(), 1);
    assert_eq!(summary[0].in_tokens, 5);
    assert_eq!(summary[0].out_tokens, 3);
}

#[tokio::test]
async fn happy_path_transcript_order() {
    let provider = Scripted::new("a", vec![Ok(text_response("a", "hi"))]);
    let h = harness(vec![("a", provider)], vec![]);

    let resilient = h.state.providers.get("a").unwrap();
    let mut agent = AgentLoop::new(
        resilient,
        h.registry.clone(),
        AgentLoopConfig { model: "a-light".into(), ..Default::default() },
    );
    let result = agent.run("hello").await.unwrap();

    assert_eq!(result.text, "hi");
    assert_eq!(result.tool_call_count, 0);
    assert_eq!(result.transcript.len(), 2);
    assert_eq!(result.transcript[0].role, TranscriptRole::User);
    assert_eq!(result.transcript[0].content, "hello");
    assert_eq!(result.transcript[1].role, TranscriptRole::Assistant);
    assert_eq!(result.transcript[1].content, "hi");
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Scenario 2 — one tool call with ordered continuation
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

#[tokio::test]
async fn one_tool_call_binds_result_by_id() {
    let provider = Scripted::new(
        "a",
        vec![
            Ok(tool_response("a", vec![("t1", "note_list", json!({}))])),
            Ok(text_response("a", "No notes.")),
        ],
    );
    let h = harness(vec![("a", provider.clone())], vec![]);

    let resilient = h.state.providers.get("a").unwrap();
    let mut agent = AgentLoop::new(
        resilient,
        h.registry.clone(),
        AgentLoopConfig { model: "a-light".into(), ..Default::default() },
    );
    let result = agent.run("list notes").await.unwrap();

    assert_eq!(result.text, "No notes.");
    assert_eq!(result.tool_call_count, 1);

    // The continuation request carried exactly one tool_result bound to t1.
    assert_eq!(provider.request_count(), 2);
    let continuation = provider.request(1);
    let tool_results: Vec<(String, String)> = continuation
        .messages
        .iter()
        .filter_map(|m| match &m.content {
            MessageBody::Blocks(blocks) => Some(blocks),
            _ => None,
        })
        .flatten()
        .filter_map(|b| match b {
            ContentBlock::ToolResult { tool_use_id, content } => {
                Some((tool_use_id.clone(), content.clone()))
            }
            _ => None,
        })
        .collect();
    assert_eq!(tool_results.len(), 1);
    assert_eq!(tool_results[0].0, "t1");
    assert_eq!(tool_results[0].1, r#"{"results":[]}"#);

    // Transcript: user, tool_result, assistant.
    assert_eq!(result.transcript.len(), 3);
    assert_eq!(result.transcript[1].role, TranscriptRole::ToolResult);
    assert_eq!(result.transcript[1].tool_name.as_deref(), Some("note_list"));
}

#[tokio::test]
async fn parallel_tool_calls_execute_serially_in_order() {
    let provider = Scripted::new(
        "a",
        vec![
            Ok(tool_response(
                "a",
                vec![("t1", "note_list", json!({})), ("t2", "note_list", json!({}))],
            )),
            Ok(text_response("a", "done")),
        ],
    );
    let h = harness(vec![("a", provider.clone())], vec![]);

    let resilient = h.state.providers.get("a").unwrap();
    let mut agent = AgentLoop::new(
        resilient,
        h.registry.clone(),
        AgentLoopConfig { model: "a-light".into(), ..Default::default() },
    );
    let result = agent.run("list twice").await.unwrap();
    assert_eq!(result.tool_call_count, 2);

    let continuation = provider.request(1);
    let ids: Vec<String> = continuation
        .messages
        .iter()
        .filter_map(|m| match &m.content {
            MessageBody::Blocks(blocks) => Some(blocks),
            _ => None,
        })
        .flatten()
        .filter_map(|b| match b {
            ContentBlock::ToolResult { tool_use_id, .. } => Some(tool_use_id.clone()),
            _ => None,
        })
        .collect();
    assert_eq!(ids, vec!["t1".to_string(), "t2".to_string()]);
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Scenario 3 — breaker opens, turn fails over
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

#[tokio::test(start_paused = true)]
async fn persistent_outage_opens_breaker_then_fails_over() {
    let provider_a = Scripted::new(
        "a",
        (0..40)
            .map(|_| {
                Err(Error::Provider {
                    provider: "a".into(),
                    message: "503 Service Unavailable".into(),
                })
            })
            .collect(),
    );
    let provider_b = Scripted::new("b", vec![Ok(text_response("b", "hi from b"))]);
    let h = harness(vec![("a", provider_a.clone()), ("b", provider_b)], vec![]);

    let alerts = Arc::new(AtomicUsize::new(0));
    let alerts_clone = alerts.clone();
    h.state.bus.subscribe(
        "alert.system.llm_failure",
        Arc::new(move |_| {
            alerts_clone.fetch_add(1, Ordering::SeqCst);
            Ok(())
        }),
    );

    // Five failed turns exhaust retries each time and open the breaker.
    for _ in 0..5 {
        let reply = handle_message(&h.state, inbound("hello")).await;
        assert!(reply.text.contains("trouble reaching"));
    }
    assert_eq!(provider_a.request_count(), 20); // 5 runs x (1 + 3 retries)
    assert_eq!(alerts.load(Ordering::SeqCst), 1);

    // Sixth turn selects provider B via the failover chain.
    let sel = h.state.providers.select_for("u1", cg_providers::Tier::Light).unwrap();
    assert_eq!(sel.provider, "b");
    assert!(sel.failed_over);
    assert_eq!(sel.original_provider.as_deref(), Some("a"));

    let reply = handle_message(&h.state, inbound("hello again")).await;
    assert_eq!(reply.text, "hi from b");
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Scenario 4 — confirmation round-trip
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

#[tokio::test]
async fn confirmation_round_trip_is_single_use() {
    let provider = Scripted::new("a", vec![]);
    let h = harness(vec![("a", provider)], vec![]);

    // The skill mints a token while handling the destructive tool.
    let exec = h
        .registry
        .execute(
            "file_delete",
            &json!({ "path": "/tmp/report.pdf" }),
            &cg_skills::ExecutionContext { is_subagent: false, user_id: Some("u1".into()) },
        )
        .await;
    assert!(!exec.is_error);
    let token = exec
        .content
        .split("confirm ")
        .nth(1)
        .and_then(|rest| rest.split('`').next())
        .expect("prompt embeds a token")
        .to_string();
    assert!(regex::Regex::new(r"^[A-Z2-7]{16,}$").unwrap().is_match(&token));

    // Same user confirms: the stored call runs.
    let reply = handle_message(&h.state, inbound(&format!("confirm {token}"))).await;
    assert_eq!(reply.text, "Deleted.");

    // Second confirm of the same token is refused.
    let reply = handle_message(&h.state, inbound(&format!("confirm {token}"))).await;
    assert!(reply.text.contains("invalid or has expired"));
}

#[tokio::test]
async fn confirmation_is_scoped_to_the_creating_user() {
    let provider = Scripted::new("a", vec![]);
    let h = harness(vec![("a", provider)], vec![]);

    let exec = h
        .registry
        .execute(
            "file_delete",
            &json!({ "path": "/tmp/x" }),
            &cg_skills::ExecutionContext { is_subagent: false, user_id: Some("u1".into()) },
        )
        .await;
    let token = exec
        .content
        .split("confirm ")
        .nth(1)
        .and_then(|rest| rest.split('`').next())
        .unwrap()
        .to_string();

    let mut msg = inbound(&format!("confirm {token}"));
    msg.user_id = "intruder".into();
    let reply = handle_message(&h.state, msg).await;
    assert!(reply.text.contains("invalid or has expired"));

    // Still consumable by the creator afterwards.
    let reply = handle_message(&h.state, inbound(&format!("confirm {token}"))).await;
    assert_eq!(reply.text, "Deleted.");
}

#[tokio::test]
async fn reply_embedding_token_sets_pending_confirmation() {
    let provider = Scripted::new(
        "a",
        vec![Ok(text_response(
            "a",
            "This will delete the file. Reply `confirm K7Q2M4N8P3R5T6V9` to proceed.",
        ))],
    );
    let h = harness(vec![("a", provider)], vec![]);

    let reply = handle_message(&h.state, inbound("delete the report")).await;
    assert!(reply.pending_confirmation);
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Scenario 5 — tool-call budget
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

#[tokio::test]
async fn tool_call_budget_finalizes_without_executing_overflow() {
    let script: Vec<Result<ChatResponse>> = (0..10)
        .map(|i| {
            let id = format!("t{i}");
            Ok(tool_response("a", vec![(id.as_str(), "note_list", json!({}))]))
        })
        .collect();
    let provider = Scripted::new("a", script);
    let h = harness(vec![("a", provider.clone())], vec![]);

    let resilient = h.state.providers.get("a").unwrap();
    let mut agent = AgentLoop::new(
        resilient,
        h.registry.clone(),
        AgentLoopConfig {
            model: "a-light".into(),
            max_tool_calls: 2,
            ..Default::default()
        },
    );
    let result = agent.run("loop forever").await.unwrap();

    assert!(result.text.contains("Reached maximum number of tool calls."));
    assert_eq!(result.tool_call_count, 2);
    // max_tool_calls + 1 LM calls: two executed batches plus the
    // overflowing response that was never dispatched.
    assert_eq!(provider.request_count(), 3);
}

#[tokio::test]
async fn token_budget_fails_the_run_but_keeps_transcript() {
    let provider = Scripted::new(
        "a",
        vec![
            Ok(tool_response("a", vec![("t1", "note_list", json!({}))])),
            Ok(tool_response("a", vec![("t2", "note_list", json!({}))])),
        ],
    );
    let h = harness(vec![("a", provider)], vec![]);

    let resilient = h.state.providers.get("a").unwrap();
    let mut agent = AgentLoop::new(
        resilient,
        h.registry.clone(),
        AgentLoopConfig {
            model: "a-light".into(),
            max_token_budget: Some(20), // second response pushes past 20
            ..Default::default()
        },
    );
    let err = agent.run("spend tokens").await.unwrap_err();
    assert!(matches!(err, Error::BudgetExceeded { .. }));
    // Transcript retains the user turn and the first round's tool result.
    assert!(agent.transcript().len() >= 2);
    assert_eq!(agent.transcript()[0].role, TranscriptRole::User);
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Scenario 6 — sub-agent restriction
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

#[tokio::test]
async fn subagent_cannot_invoke_main_agent_only_tool() {
    let provider = Scripted::new(
        "a",
        vec![
            Ok(tool_response("a", vec![("t1", "note_purge", json!({}))])),
            Ok(text_response("a", "understood")),
        ],
    );
    let h = harness(vec![("a", provider)], vec![]);

    let resilient = h.state.providers.get("a").unwrap();
    let mut agent = AgentLoop::new(
        resilient,
        h.registry.clone(),
        AgentLoopConfig {
            model: "a-light".into(),
            is_subagent: true,
            ..Default::default()
        },
    );
    let result = agent.run("purge everything").await.unwrap();

    let refusal = result
        .transcript
        .iter()
        .find(|e| e.role == TranscriptRole::ToolResult)
        .expect("tool_result entry");
    assert_eq!(
        refusal.content,
        "Tool \"note_purge\" is restricted to the main agent only."
    );
    // The skill never ran, so the health tracker never heard about it.
    assert_eq!(h.registry.health().status("notes"), SkillStatus::Healthy);
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Mid-turn tier escalation
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

#[tokio::test]
async fn heavy_tool_on_light_tier_escalates_and_reruns() {
    // Light run asks for the heavy tool; the orchestrator re-picks at
    // the heavy tier and re-runs the whole turn.
    let provider = Scripted::new(
        "a",
        vec![
            Ok(tool_response("a", vec![("t1", "note_purge", json!({}))])),
            Ok(tool_response("a", vec![("t2", "note_purge", json!({}))])),
            Ok(text_response("a", "heavy answer")),
        ],
    );
    let h = harness(vec![("a", provider.clone())], vec!["note_purge".into()]);

    let reply = handle_message(&h.state, inbound("short question")).await;
    assert_eq!(reply.text, "heavy answer");

    // First request ran on the light default, the re-run on the heavy
    // default model.
    assert_eq!(provider.request(0).model, "a-light");
    assert_eq!(provider.request(1).model, "a-heavy");
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Cancellation
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

#[tokio::test]
async fn cancel_signal_stops_before_the_next_lm_call() {
    let cancel = CancelToken::new();
    cancel.cancel();

    let provider = Scripted::new("a", vec![Ok(text_response("a", "never seen"))]);
    let h = harness(vec![("a", provider.clone())], vec![]);

    let resilient = h.state.providers.get("a").unwrap();
    let mut agent = AgentLoop::new(
        resilient,
        h.registry.clone(),
        AgentLoopConfig {
            model: "a-light".into(),
            cancel: Some(cancel),
            ..Default::default()
        },
    );
    let err = agent.run("hello").await.unwrap_err();
    assert!(matches!(err, Error::Cancelled));
    assert_eq!(provider.request_count(), 0);
}
