use std::sync::Arc;
use std::time::Instant;

use cg_domain::bus::EventBus;
use cg_domain::config::Config;
use cg_providers::{ProviderManager, TierClassifier, UsageTracker};
use cg_skills::{ConfirmationManager, SkillRegistry};

use crate::persist::RecordSink;
use crate::runtime::CancelMap;

/// Shared application state passed to all API handlers.
///
/// Every component is an explicit dependency constructed once at
/// startup — there are no global singletons.
#[derive(Clone)]
pub struct AppState {
    // ── Core services ─────────────────────────────────────────────────
    pub config: Arc<Config>,
    pub bus: Arc<EventBus>,

    // ── Routing & providers ───────────────────────────────────────────
    pub providers: Arc<ProviderManager>,
    pub classifier: Arc<TierClassifier>,
    pub usage: Arc<UsageTracker>,

    // ── Skills & confirmation ─────────────────────────────────────────
    pub registry: Arc<SkillRegistry>,
    pub confirmations: Arc<ConfirmationManager>,

    // ── Runtime ───────────────────────────────────────────────────────
    pub cancel_map: Arc<CancelMap>,

    // ── Persistence (fire-and-forget) ─────────────────────────────────
    pub audit: Arc<dyn RecordSink>,
    pub routing: Arc<dyn RecordSink>,

    // ── Security & liveness (startup-computed) ────────────────────────
    /// SHA-256 hash of the API bearer token. `None` = dev mode.
    pub api_token_hash: Option<Vec<u8>>,
    pub started_at: Instant,
}
