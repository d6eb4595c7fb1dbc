//! Light/heavy tier classification.
//!
//! Tiering is a routing concern only: heavy turns get a more capable
//! (and pricier) default model. Classification is deliberately cheap —
//! message length plus a handful of regexes — because it runs on every
//! inbound turn before any model is consulted.

use std::collections::HashSet;

use regex::RegexBuilder;
use serde::Serialize;

use cg_domain::config::TierRoutingConfig;
use cg_domain::error::{Error, Result};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Tier {
    Light,
    Heavy,
}

impl Tier {
    pub fn as_str(&self) -> &'static str {
        match self {
            Tier::Light => "light",
            Tier::Heavy => "heavy",
        }
    }
}

/// A classification with the rule that produced it (routing-log fodder).
#[derive(Debug, Clone, Serialize)]
pub struct Classification {
    pub tier: Tier,
    pub reason: String,
}

#[derive(Debug)]
pub struct TierClassifier {
    heavy_tools: HashSet<String>,
    heavy_patterns: Vec<regex::Regex>,
    heavy_message_length: usize,
}

impl TierClassifier {
    pub fn from_config(cfg: &TierRoutingConfig) -> Result<Self> {
        let mut heavy_patterns = Vec::with_capacity(cfg.heavy_patterns.len());
        for raw in &cfg.heavy_patterns {
            let re = RegexBuilder::new(raw)
                .case_insensitive(true)
                .build()
                .map_err(|e| Error::Config(format!("bad heavy_pattern '{raw}': {e}")))?;
            heavy_patterns.push(re);
        }
        Ok(Self {
            heavy_tools: cfg.heavy_tools.iter().cloned().collect(),
            heavy_patterns,
            heavy_message_length: cfg.heavy_message_length,
        })
    }

    /// Classify a message from its shape alone.
    pub fn classify(&self, message: &str) -> Classification {
        if message.len() > self.heavy_message_length {
            return Classification {
                tier: Tier::Heavy,
                reason: format!(
                    "message length {} > {}",
                    message.len(),
                    self.heavy_message_length
                ),
            };
        }
        for re in &self.heavy_patterns {
            if re.is_match(message) {
                return Classification {
                    tier: Tier::Heavy,
                    reason: format!("matched pattern '{}'", re.as_str()),
                };
            }
        }
        Classification {
            tier: Tier::Light,
            reason: "default".into(),
        }
    }

    /// Whether invoking `tool_name` should escalate a light run to heavy.
    pub fn should_escalate(&self, tool_name: &str) -> bool {
        self.heavy_tools.contains(tool_name)
    }

    pub fn heavy_tools(&self) -> &HashSet<String> {
        &self.heavy_tools
    }
}
