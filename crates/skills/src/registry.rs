//! Skill registration and the tool dispatch pipeline.
//!
//! The registry is the only path by which tools execute. Dispatch runs
//! a fixed policy pipeline — ownership lookup, sub-agent restriction,
//! health, rate limit, schema — before a skill ever sees the input, and
//! always produces a result string: policy denials and execution errors
//! come back as user-facing text the model can react to, never as `Err`.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use parking_lot::RwLock;
use serde_json::Value;

use cg_domain::error::{Error, Result};
use cg_domain::tool::ToolDefinition;

use crate::health::{HealthTracker, SkillStatus};
use crate::ratelimit::RateLimiter;
use crate::types::Skill;

/// Who is asking for a tool.
#[derive(Debug, Clone, Default)]
pub struct ExecutionContext {
    pub is_subagent: bool,
    pub user_id: Option<String>,
}

/// Filters applied when listing tool definitions for one agent run.
#[derive(Debug, Clone, Default)]
pub struct ToolFilter {
    /// When set, only tools from these skills are listed.
    pub allowed_skills: Option<Vec<String>>,
    pub blocked_tools: Vec<String>,
    pub exclude_main_agent_only: bool,
}

/// Outcome of one dispatch. `content` is always suitable as a
/// tool_result body; `is_error` drives the agent loop's single retry
/// and run bookkeeping.
#[derive(Debug, Clone)]
pub struct ToolExecution {
    pub content: String,
    pub is_error: bool,
}

impl ToolExecution {
    fn ok(content: String) -> Self {
        Self { content, is_error: false }
    }

    fn err(content: String) -> Self {
        Self { content, is_error: true }
    }
}

pub struct SkillRegistry {
    skills: RwLock<HashMap<String, Arc<dyn Skill>>>,
    /// tool name → owning skill name.
    tool_index: RwLock<HashMap<String, String>>,
    health: Arc<HealthTracker>,
    rate_limiter: Arc<RateLimiter>,
    tool_timeout: Duration,
}

impl SkillRegistry {
    pub fn new(health: Arc<HealthTracker>, rate_limiter: Arc<RateLimiter>, tool_timeout: Duration) -> Self {
        Self {
            skills: RwLock::new(HashMap::new()),
            tool_index: RwLock::new(HashMap::new()),
            health,
            rate_limiter,
            tool_timeout,
        }
    }

    pub fn health(&self) -> &Arc<HealthTracker> {
        &self.health
    }

    /// Register a skill, validating its config needs and indexing its
    /// tools. Registration happens at startup; reads are protected
    /// against racing it anyway.
    pub fn register(&self, skill: Arc<dyn Skill>, available_config: &HashMap<String, String>) -> Result<()> {
        let name = skill.name().to_string();

        let missing: Vec<String> = skill
            .required_config()
            .into_iter()
            .filter(|key| !available_config.contains_key(key))
            .collect();
        if !missing.is_empty() {
            return Err(Error::Config(format!(
                "skill '{name}' is missing required config: {}",
                missing.join(", ")
            )));
        }

        let tools = skill.tools();
        {
            let mut skills = self.skills.write();
            let mut index = self.tool_index.write();

            if skills.contains_key(&name) {
                return Err(Error::Config(format!("skill '{name}' is already registered")));
            }
            for tool in &tools {
                if let Some(owner) = index.get(&tool.name) {
                    return Err(Error::Config(format!(
                        "tool '{}' from skill '{name}' is already registered by skill '{owner}'",
                        tool.name
                    )));
                }
            }

            for tool in &tools {
                index.insert(tool.name.clone(), name.clone());
            }
            skills.insert(name.clone(), skill);
        }

        tracing::info!(skill = %name, tools = tools.len(), "skill registered");
        Ok(())
    }

    /// Tool definitions visible under `filter`, sorted by name.
    pub fn tool_definitions(&self, filter: &ToolFilter) -> Vec<ToolDefinition> {
        let skills = self.skills.read();
        let mut defs: Vec<ToolDefinition> = Vec::new();
        for (skill_name, skill) in skills.iter() {
            if let Some(allowed) = &filter.allowed_skills {
                if !allowed.iter().any(|a| a == skill_name) {
                    continue;
                }
            }
            for def in skill.tools() {
                if filter.blocked_tools.iter().any(|b| b == &def.name) {
                    continue;
                }
                if filter.exclude_main_agent_only && def.main_agent_only {
                    continue;
                }
                defs.push(def);
            }
        }
        defs.sort_by(|a, b| a.name.cmp(&b.name));
        defs
    }

    /// Look up which skill owns a tool.
    pub fn skill_for_tool(&self, tool_name: &str) -> Option<String> {
        self.tool_index.read().get(tool_name).cloned()
    }

    /// Definition of a single tool, if registered.
    pub fn tool_definition(&self, tool_name: &str) -> Option<ToolDefinition> {
        let owner = self.skill_for_tool(tool_name)?;
        let skill = self.skills.read().get(&owner)?.clone();
        skill.tools().into_iter().find(|t| t.name == tool_name)
    }

    /// Dispatch one tool call through the policy pipeline with the
    /// registry's default timeout.
    pub async fn execute(&self, tool_name: &str, input: &Value, ctx: &ExecutionContext) -> ToolExecution {
        self.execute_with_timeout(tool_name, input, ctx, self.tool_timeout).await
    }

    /// Dispatch with an explicit wall-clock timeout (agent runs carry
    /// their own). No registry lock is held while the skill executes.
    pub async fn execute_with_timeout(
        &self,
        tool_name: &str,
        input: &Value,
        ctx: &ExecutionContext,
        timeout: Duration,
    ) -> ToolExecution {
        // 1. Ownership lookup.
        let Some(skill_name) = self.skill_for_tool(tool_name) else {
            return ToolExecution::err(format!("Unknown tool \"{tool_name}\"."));
        };
        let Some(skill) = self.skills.read().get(&skill_name).cloned() else {
            return ToolExecution::err(format!("Unknown tool \"{tool_name}\"."));
        };
        let Some(def) = skill.tools().into_iter().find(|t| t.name == tool_name) else {
            return ToolExecution::err(format!("Unknown tool \"{tool_name}\"."));
        };

        // 2. Sub-agent restriction.
        if def.main_agent_only && ctx.is_subagent {
            return ToolExecution::err(format!(
                "Tool \"{tool_name}\" is restricted to the main agent only."
            ));
        }

        // 3. Health gate.
        if self.health.status(&skill_name) == SkillStatus::Unavailable {
            return ToolExecution::err(format!(
                "Skill \"{skill_name}\" is temporarily unavailable. Please try again later."
            ));
        }

        // 4. Per-skill rate policy.
        let decision = self.rate_limiter.check("skill", &skill_name, skill.rate_policy());
        if !decision.allowed {
            let secs = decision.retry_after.map(|d| d.as_secs().max(1)).unwrap_or(1);
            return ToolExecution::err(format!(
                "Too many requests for skill \"{skill_name}\". Try again in {secs}s."
            ));
        }

        // 5. Schema validation.
        let problems = crate::schema::validate(&def.input_schema, input);
        if !problems.is_empty() {
            return ToolExecution::err(format!(
                "Invalid input for tool \"{tool_name}\": {}",
                problems.join("; ")
            ));
        }

        // 6. Sensitive tools: key names only, never values.
        if def.sensitive {
            let keys: Vec<&str> = input
                .as_object()
                .map(|o| o.keys().map(String::as_str).collect())
                .unwrap_or_default();
            tracing::info!(tool = tool_name, input_keys = ?keys, "sensitive tool invoked");
        } else {
            tracing::debug!(tool = tool_name, skill = %skill_name, "tool dispatch");
        }

        // 7. Execute under the wall-clock timeout.
        match tokio::time::timeout(timeout, skill.execute(tool_name, input)).await {
            Ok(Ok(content)) => {
                self.health.record_success(&skill_name);
                ToolExecution::ok(content)
            }
            Ok(Err(e)) => {
                self.health.record_failure(&skill_name);
                ToolExecution::err(format!("Error executing {tool_name}: {e}"))
            }
            Err(_) => {
                self.health.record_failure(&skill_name);
                ToolExecution::err(format!(
                    "Error executing {tool_name}: timed out after {}s",
                    timeout.as_secs()
                ))
            }
        }
    }

    pub fn skill_names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.skills.read().keys().cloned().collect();
        names.sort();
        names
    }
}
