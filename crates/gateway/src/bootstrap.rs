//! Startup wiring: configuration → constructed components.
//!
//! Everything the orchestrator needs is built here exactly once and
//! handed out as explicit `Arc` dependencies. Provider adapters that
//! cannot resolve credentials fail startup rather than limping along.

use std::sync::Arc;
use std::time::Duration;

use cg_domain::bus::EventBus;
use cg_domain::config::{Config, ProviderKind};
use cg_domain::error::{Error, Result};
use cg_providers::anthropic::AnthropicProvider;
use cg_providers::google::GoogleProvider;
use cg_providers::openai_compat::OpenAiCompatProvider;
use cg_providers::{
    CircuitBreaker, Provider, ProviderManager, ResilientProvider, TierClassifier, UsageTracker,
};
use cg_skills::{ConfirmationManager, HealthTracker, RateLimiter, Skill, SkillContext, SkillRegistry};

use crate::api::auth::token_hash;
use crate::persist::{JsonlSink, RecordSink};
use crate::runtime::CancelMap;
use crate::state::AppState;

/// Build the full application state. `skills` are registered (and
/// started) in order; a failing registration aborts startup.
pub async fn build_state(config: Config, skills: Vec<Arc<dyn Skill>>) -> Result<AppState> {
    let config = Arc::new(config);
    let bus = Arc::new(EventBus::new());

    // ── Providers ─────────────────────────────────────────────────
    let heavy_default = parse_heavy_default(config.llm.heavy_default_model.as_deref());
    let mut manager = ProviderManager::new(
        config.llm.default_provider.clone(),
        config.llm.default_model.clone(),
        heavy_default,
        config.llm.failover_chain.clone(),
    );
    for provider_cfg in &config.llm.providers {
        let adapter: Arc<dyn Provider> = match provider_cfg.kind {
            ProviderKind::Anthropic => {
                Arc::new(AnthropicProvider::from_config(provider_cfg, config.llm.request_timeout_ms)?)
            }
            ProviderKind::OpenaiCompat => {
                Arc::new(OpenAiCompatProvider::from_config(provider_cfg, config.llm.request_timeout_ms)?)
            }
            ProviderKind::Google => {
                Arc::new(GoogleProvider::from_config(provider_cfg, config.llm.request_timeout_ms)?)
            }
        };
        let breaker = Arc::new(CircuitBreaker::new(config.llm.breaker));
        let resilient = Arc::new(ResilientProvider::new(adapter, breaker.clone(), bus.clone()));
        manager.register(
            provider_cfg.id.clone(),
            resilient,
            breaker,
            provider_cfg.models.clone(),
        );
        tracing::info!(provider = %provider_cfg.id, models = provider_cfg.models.len(), "provider registered");
    }
    let providers = Arc::new(manager);

    let classifier = Arc::new(TierClassifier::from_config(&config.tiers)?);
    let usage = Arc::new(UsageTracker::new(
        config.llm.pricing.clone(),
        config.usage.daily_alert_threshold_usd,
        bus.clone(),
    ));

    // ── Skills & confirmation ─────────────────────────────────────
    let confirmations = Arc::new(ConfirmationManager::new(config.confirmation, bus.clone()));
    let registry = Arc::new(SkillRegistry::new(
        Arc::new(HealthTracker::default()),
        Arc::new(RateLimiter::new()),
        Duration::from_secs(config.agent.tool_timeout_secs),
    ));

    let skill_ctx = SkillContext {
        config: config.skills.config.clone(),
        bus: bus.clone(),
        confirmations: confirmations.clone(),
    };
    for skill in skills {
        let name = skill.name().to_string();
        registry.register(skill.clone(), &config.skills.config)?;
        skill.startup(&skill_ctx).await.map_err(|e| {
            Error::Config(format!("skill '{name}' failed to start: {e}"))
        })?;
    }

    // ── Persistence sinks ─────────────────────────────────────────
    let audit: Arc<dyn RecordSink> =
        Arc::new(JsonlSink::spawn("audit", config.persist.dir.join("audit.jsonl")));
    let routing: Arc<dyn RecordSink> =
        Arc::new(JsonlSink::spawn("routing", config.persist.dir.join("routing.jsonl")));

    // Alert history: every alert.system.* event lands in its own file.
    let alerts: Arc<dyn RecordSink> =
        Arc::new(JsonlSink::spawn("alerts", config.persist.dir.join("alerts.jsonl")));
    bus.subscribe(
        "alert.system.*",
        Arc::new(move |event| {
            alerts.write(serde_json::to_value(event)?);
            Ok(())
        }),
    );

    let api_token_hash = config
        .server
        .api_token
        .as_deref()
        .filter(|t| !t.is_empty())
        .map(token_hash);
    if api_token_hash.is_none() {
        tracing::warn!("no API token configured — running in dev mode without auth");
    }

    Ok(AppState {
        config,
        bus,
        providers,
        classifier,
        usage,
        registry,
        confirmations,
        cancel_map: Arc::new(CancelMap::new()),
        audit,
        routing,
        api_token_hash,
        started_at: std::time::Instant::now(),
    })
}

/// Split a `"provider/model"` heavy default into its components. A bare
/// provider id is rejected at validation time, so silence here is fine.
fn parse_heavy_default(raw: Option<&str>) -> Option<(String, String)> {
    let raw = raw?;
    let (provider, model) = raw.split_once('/')?;
    Some((provider.to_string(), model.to_string()))
}

/// Spawn the periodic confirmation-token cleanup task.
pub fn spawn_cleanup(state: &AppState) {
    let confirmations = state.confirmations.clone();
    tokio::spawn(async move {
        let mut interval = tokio::time::interval(Duration::from_secs(60));
        loop {
            interval.tick().await;
            confirmations.cleanup();
        }
    });
}
