//! Health probe.
//!
//! Reports per-service status derived from live state: each provider
//! from its breaker (Closed = ok, HalfOpen = degraded, Open = error),
//! each skill from the health tracker. Overall status is `error` only
//! when every provider is down; anything else non-ok reads `degraded`.

use axum::extract::State;
use axum::response::{IntoResponse, Json};
use serde::Serialize;

use cg_providers::BreakerState;
use cg_skills::SkillStatus;

use crate::state::AppState;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ProbeStatus {
    Ok,
    Degraded,
    Error,
}

#[derive(Serialize)]
struct ServiceHealth {
    status: ProbeStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    latency_ms: Option<u64>,
}

#[derive(Serialize)]
struct HealthReport {
    status: ProbeStatus,
    services: std::collections::BTreeMap<String, ServiceHealth>,
    uptime_sec: u64,
}

pub async fn health(State(state): State<AppState>) -> impl IntoResponse {
    let mut services = std::collections::BTreeMap::new();

    let mut provider_total = 0usize;
    let mut provider_down = 0usize;
    let mut any_degraded = false;

    for id in state.providers.provider_ids() {
        let Some(breaker) = state.providers.breaker(&id) else {
            continue;
        };
        provider_total += 1;
        let status = match breaker.state() {
            BreakerState::Closed => ProbeStatus::Ok,
            BreakerState::HalfOpen => ProbeStatus::Degraded,
            BreakerState::Open => ProbeStatus::Error,
        };
        match status {
            ProbeStatus::Error => provider_down += 1,
            ProbeStatus::Degraded => any_degraded = true,
            ProbeStatus::Ok => {}
        }
        services.insert(format!("provider:{id}"), ServiceHealth { status, latency_ms: None });
    }

    for (skill, health) in state.registry.health().snapshot() {
        let status = match health.status {
            SkillStatus::Healthy => ProbeStatus::Ok,
            SkillStatus::Degraded => ProbeStatus::Degraded,
            SkillStatus::Unavailable => ProbeStatus::Error,
        };
        if status != ProbeStatus::Ok {
            any_degraded = true;
        }
        services.insert(format!("skill:{skill}"), ServiceHealth { status, latency_ms: None });
    }

    let status = if provider_total > 0 && provider_down == provider_total {
        ProbeStatus::Error
    } else if provider_down > 0 || any_degraded {
        ProbeStatus::Degraded
    } else {
        ProbeStatus::Ok
    };

    Json(HealthReport {
        status,
        services,
        uptime_sec: state.started_at.elapsed().as_secs(),
    })
}
