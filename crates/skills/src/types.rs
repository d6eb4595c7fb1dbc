//! The skill contract.
//!
//! A skill bundles one or more tools behind a single lifecycle. Skills
//! register with the [`SkillRegistry`](crate::registry::SkillRegistry),
//! which owns all policy enforcement; a skill's `execute` only ever runs
//! after health, rate-limit, and schema checks have passed.

use std::collections::HashMap;
use std::sync::Arc;

use serde::Serialize;
use serde_json::Value;

use cg_domain::bus::EventBus;
use cg_domain::error::Result;
use cg_domain::tool::ToolDefinition;

use crate::confirm::ConfirmationManager;
use crate::ratelimit::RatePolicy;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum SkillKind {
    /// Self-contained capability (notes, reminders, search).
    Skill,
    /// Bridge to an external system with its own credentials.
    Integration,
}

/// Handles a skill may use during startup and execution.
#[derive(Clone)]
pub struct SkillContext {
    /// The key/value config the registry validated `required_config`
    /// against.
    pub config: HashMap<String, String>,
    pub bus: Arc<EventBus>,
    /// For destructive tools: mint a pending action and embed its token
    /// in the returned prompt.
    pub confirmations: Arc<ConfirmationManager>,
}

#[async_trait::async_trait]
pub trait Skill: Send + Sync {
    fn name(&self) -> &str;

    fn description(&self) -> &str;

    fn kind(&self) -> SkillKind {
        SkillKind::Skill
    }

    /// The tools this skill contributes. Names must be unique across
    /// the whole registry, not just this skill.
    fn tools(&self) -> Vec<ToolDefinition>;

    /// Config keys that must be present for registration to succeed.
    fn required_config(&self) -> Vec<String> {
        Vec::new()
    }

    /// Fixed-window rate policy applied per skill by the dispatcher.
    fn rate_policy(&self) -> RatePolicy {
        RatePolicy::default()
    }

    /// Run one tool. Input has already passed schema validation.
    async fn execute(&self, tool_name: &str, input: &Value) -> Result<String>;

    async fn startup(&self, _ctx: &SkillContext) -> Result<()> {
        Ok(())
    }

    async fn shutdown(&self) {}
}
