//! Per-skill rolling health.
//!
//! Consecutive failures walk a skill down the ladder Healthy → Degraded
//! → Unavailable; any success (or an explicit reset) restores Healthy.
//! The registry refuses to dispatch to an Unavailable skill.

use std::collections::HashMap;

use chrono::{DateTime, Utc};
use parking_lot::RwLock;
use serde::Serialize;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum SkillStatus {
    Healthy,
    Degraded,
    Unavailable,
}

#[derive(Debug, Clone, Serialize)]
pub struct SkillHealth {
    pub status: SkillStatus,
    pub recent_failures: u32,
    pub last_failure_at: Option<DateTime<Utc>>,
}

impl Default for SkillHealth {
    fn default() -> Self {
        Self {
            status: SkillStatus::Healthy,
            recent_failures: 0,
            last_failure_at: None,
        }
    }
}

pub struct HealthTracker {
    degraded_after: u32,
    unavailable_after: u32,
    skills: RwLock<HashMap<String, SkillHealth>>,
}

impl Default for HealthTracker {
    fn default() -> Self {
        Self::new(3, 6)
    }
}

impl HealthTracker {
    pub fn new(degraded_after: u32, unavailable_after: u32) -> Self {
        Self {
            degraded_after,
            unavailable_after,
            skills: RwLock::new(HashMap::new()),
        }
    }

    pub fn record_success(&self, skill: &str) {
        let mut skills = self.skills.write();
        let entry = skills.entry(skill.to_string()).or_default();
        entry.status = SkillStatus::Healthy;
        entry.recent_failures = 0;
    }

    pub fn record_failure(&self, skill: &str) {
        let mut skills = self.skills.write();
        let entry = skills.entry(skill.to_string()).or_default();
        entry.recent_failures += 1;
        entry.last_failure_at = Some(Utc::now());
        entry.status = if entry.recent_failures >= self.unavailable_after {
            SkillStatus::Unavailable
        } else if entry.recent_failures >= self.degraded_after {
            SkillStatus::Degraded
        } else {
            SkillStatus::Healthy
        };
        if entry.status != SkillStatus::Healthy {
            tracing::warn!(
                skill,
                failures = entry.recent_failures,
                status = ?entry.status,
                "skill health degraded"
            );
        }
    }

    /// Unknown skills are Healthy by definition.
    pub fn status(&self, skill: &str) -> SkillStatus {
        self.skills
            .read()
            .get(skill)
            .map(|h| h.status)
            .unwrap_or(SkillStatus::Healthy)
    }

    /// Restore a skill to Healthy regardless of prior state.
    pub fn reset(&self, skill: &str) {
        self.skills.write().insert(skill.to_string(), SkillHealth::default());
    }

    pub fn snapshot(&self) -> Vec<(String, SkillHealth)> {
        let mut entries: Vec<(String, SkillHealth)> = self
            .skills
            .read()
            .iter()
            .map(|(k, v)| (k.clone(), v.clone()))
            .collect();
        entries.sort_by(|a, b| a.0.cmp(&b.0));
        entries
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn walks_the_ladder_at_defaults() {
        let t = HealthTracker::default();
        for _ in 0..2 {
            t.record_failure("notes");
        }
        assert_eq!(t.status("notes"), SkillStatus::Healthy);
        t.record_failure("notes"); // 3rd
        assert_eq!(t.status("notes"), SkillStatus::Degraded);
        for _ in 0..3 {
            t.record_failure("notes"); // 6th
        }
        assert_eq!(t.status("notes"), SkillStatus::Unavailable);
    }

    #[test]
    fn success_resets_the_streak() {
        let t = HealthTracker::default();
        for _ in 0..5 {
            t.record_failure("notes");
        }
        t.record_success("notes");
        assert_eq!(t.status("notes"), SkillStatus::Healthy);
        t.record_failure("notes");
        assert_eq!(t.status("notes"), SkillStatus::Healthy);
    }

    #[test]
    fn reset_is_idempotent_and_total() {
        let t = HealthTracker::default();
        for _ in 0..10 {
            t.record_failure("notes");
        }
        t.reset("notes");
        assert_eq!(t.status("notes"), SkillStatus::Healthy);
        t.reset("notes");
        assert_eq!(t.status("notes"), SkillStatus::Healthy);
        t.reset("never_seen");
        assert_eq!(t.status("never_seen"), SkillStatus::Healthy);
    }

    #[test]
    fn unknown_skill_is_healthy() {
        let t = HealthTracker::default();
        assert_eq!(t.status("ghost"), SkillStatus::Healthy);
    }
}
