//! Provider ownership and per-turn selection with failover.
//!
//! The manager owns one [`ResilientProvider`] and one breaker per
//! configured backend (1:1). `select_for` consults the user preference,
//! then the breaker, then walks the failover chain, and only fails when
//! no provider in the process is usable.

use std::collections::HashMap;
use std::sync::Arc;

use parking_lot::RwLock;
use serde::Serialize;

use cg_domain::error::{Error, Result};

use crate::breaker::CircuitBreaker;
use crate::resilient::ResilientProvider;
use crate::tier::Tier;

/// The outcome of a provider selection.
#[derive(Debug, Clone, Serialize)]
pub struct Selection {
    pub provider: String,
    pub model: String,
    pub failed_over: bool,
    pub original_provider: Option<String>,
}

struct Entry {
    provider: Arc<ResilientProvider>,
    breaker: Arc<CircuitBreaker>,
    models: Vec<String>,
}

pub struct ProviderManager {
    entries: HashMap<String, Entry>,
    user_prefs: RwLock<HashMap<String, (String, String)>>,
    default_provider: String,
    default_model: String,
    /// `(provider, model)` substituted for heavy-tier turns without an
    /// explicit user preference.
    heavy_default: Option<(String, String)>,
    failover_chain: Vec<String>,
}

impl ProviderManager {
    pub fn new(
        default_provider: impl Into<String>,
        default_model: impl Into<String>,
        heavy_default: Option<(String, String)>,
        failover_chain: Vec<String>,
    ) -> Self {
        Self {
            entries: HashMap::new(),
            user_prefs: RwLock::new(HashMap::new()),
            default_provider: default_provider.into(),
            default_model: default_model.into(),
            heavy_default,
            failover_chain,
        }
    }

    /// Register a provider with its breaker and configured model list.
    /// Registration happens at startup, before any turn runs.
    pub fn register(
        &mut self,
        id: impl Into<String>,
        provider: Arc<ResilientProvider>,
        breaker: Arc<CircuitBreaker>,
        models: Vec<String>,
    ) {
        self.entries.insert(id.into(), Entry { provider, breaker, models });
    }

    pub fn get(&self, id: &str) -> Option<Arc<ResilientProvider>> {
        self.entries.get(id).map(|e| e.provider.clone())
    }

    pub fn breaker(&self, id: &str) -> Option<Arc<CircuitBreaker>> {
        self.entries.get(id).map(|e| e.breaker.clone())
    }

    pub fn provider_ids(&self) -> Vec<String> {
        let mut ids: Vec<String> = self.entries.keys().cloned().collect();
        ids.sort();
        ids
    }

    /// Pin a user to a provider/model pair. Fails when the provider is
    /// unknown or does not list the model.
    pub fn set_user_preference(&self, user: &str, provider: &str, model: &str) -> Result<()> {
        let entry = self
            .entries
            .get(provider)
            .ok_or_else(|| Error::Config(format!("unknown provider '{provider}'")))?;
        if !entry.models.iter().any(|m| m == model) {
            return Err(Error::Config(format!(
                "model '{model}' is not configured for provider '{provider}'"
            )));
        }
        self.user_prefs
            .write()
            .insert(user.to_string(), (provider.to_string(), model.to_string()));
        Ok(())
    }

    /// Choose a provider and model for one turn.
    ///
    /// Preference order: the user's pinned pair, else the tier default.
    /// If the preferred provider's breaker refuses, the failover chain is
    /// walked (skipping the preferred provider and anything unusable),
    /// then any remaining provider; the fallback model is the chosen
    /// provider's first configured model unless it also lists the
    /// preferred model.
    pub fn select_for(&self, user: &str, tier: Tier) -> Result<Selection> {
        let (pref_provider, pref_model) = self.preference_for(user, tier);

        if let Some(entry) = self.entries.get(&pref_provider) {
            if entry.breaker.can_execute() {
                return Ok(Selection {
                    provider: pref_provider,
                    model: pref_model,
                    failed_over: false,
                    original_provider: None,
                });
            }
        } else {
            tracing::warn!(provider = %pref_provider, "preferred provider not registered");
        }

        // Failover chain, in configured order.
        for candidate in &self.failover_chain {
            if candidate == &pref_provider {
                continue;
            }
            if let Some(sel) = self.try_candidate(candidate, &pref_provider, &pref_model) {
                return Ok(sel);
            }
        }

        // Anything else still registered, arbitrary order.
        for candidate in self.entries.keys() {
            if candidate == &pref_provider || self.failover_chain.contains(candidate) {
                continue;
            }
            if let Some(sel) = self.try_candidate(candidate, &pref_provider, &pref_model) {
                return Ok(sel);
            }
        }

        Err(Error::AllProvidersUnavailable)
    }

    fn try_candidate(&self, candidate: &str, original: &str, pref_model: &str) -> Option<Selection> {
        let entry = self.entries.get(candidate)?;
        if !entry.breaker.can_execute() {
            return None;
        }
        let model = if entry.models.iter().any(|m| m == pref_model) {
            pref_model.to_string()
        } else {
            entry.models.first()?.clone()
        };
        tracing::info!(
            from = %original,
            to = %candidate,
            model = %model,
            "failing over to alternate provider"
        );
        Some(Selection {
            provider: candidate.to_string(),
            model,
            failed_over: true,
            original_provider: Some(original.to_string()),
        })
    }

    fn preference_for(&self, user: &str, tier: Tier) -> (String, String) {
        if let Some((p, m)) = self.user_prefs.read().get(user) {
            return (p.clone(), m.clone());
        }
        if tier == Tier::Heavy {
            if let Some((p, m)) = &self.heavy_default {
                return (p.clone(), m.clone());
            }
        }
        (self.default_provider.clone(), self.default_model.clone())
    }
}
