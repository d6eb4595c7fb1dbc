//! Per-day token and cost accounting across providers, models, and tiers.
//!
//! [`UsageTracker`] keeps an in-memory window of usage records for the
//! current local calendar day (hard cap 10 000 records) and fires a
//! single `alert.system.llm_cost` event the first time the day's
//! estimated spend crosses the configured threshold.

use std::collections::HashMap;
use std::collections::VecDeque;
use std::sync::Arc;

use chrono::{DateTime, Local, NaiveDate};
use parking_lot::Mutex;
use serde::Serialize;

use cg_domain::bus::EventBus;
use cg_domain::chat::Usage;
use cg_domain::config::ModelPricing;
use cg_domain::event::{Event, Severity};

use crate::tier::Tier;

/// Hard cap on retained records, independent of the day window.
const MAX_RECORDS: usize = 10_000;

#[derive(Debug, Clone, Serialize)]
pub struct UsageRecord {
    pub provider: String,
    pub model: String,
    pub tier: Option<Tier>,
    pub in_tokens: Option<u64>,
    pub out_tokens: Option<u64>,
    pub estimated_cost: Option<f64>,
    pub timestamp: DateTime<Local>,
}

/// Aggregated view of one (provider, model) pair for the current day.
#[derive(Debug, Clone, Serialize)]
pub struct UsageSummary {
    pub provider: String,
    pub model: String,
    pub in_tokens: u64,
    pub out_tokens: u64,
    pub requests: u64,
    /// Summed estimated cost; `None` when no request had a cost.
    pub cost: Option<f64>,
    /// Requests that actually reported token usage.
    pub tracked: u64,
}

struct Inner {
    records: VecDeque<UsageRecord>,
    /// Day the cost alert already fired on; rollover resets it.
    alerted_on: Option<NaiveDate>,
}

pub struct UsageTracker {
    pricing: HashMap<String, ModelPricing>,
    daily_alert_threshold: Option<f64>,
    bus: Arc<EventBus>,
    inner: Mutex<Inner>,
}

impl UsageTracker {
    pub fn new(
        pricing: HashMap<String, ModelPricing>,
        daily_alert_threshold: Option<f64>,
        bus: Arc<EventBus>,
    ) -> Self {
        Self {
            pricing,
            daily_alert_threshold,
            bus,
            inner: Mutex::new(Inner {
                records: VecDeque::new(),
                alerted_on: None,
            }),
        }
    }

    /// Append a usage record for one completed LLM call.
    pub fn track(&self, provider: &str, model: &str, usage: &Usage, tier: Option<Tier>) {
        let now = Local::now();
        let today = now.date_naive();

        let estimated_cost = if usage.input_tokens.is_none() && usage.output_tokens.is_none() {
            None
        } else {
            self.pricing.get(model).map(|p| {
                p.estimate_cost(
                    usage.input_tokens.unwrap_or(0),
                    usage.output_tokens.unwrap_or(0),
                )
            })
        };

        let mut alert: Option<f64> = None;
        {
            let mut inner = self.inner.lock();
            prune(&mut inner.records, today);

            inner.records.push_back(UsageRecord {
                provider: provider.to_string(),
                model: model.to_string(),
                tier,
                in_tokens: usage.input_tokens,
                out_tokens: usage.output_tokens,
                estimated_cost,
                timestamp: now,
            });
            if inner.records.len() > MAX_RECORDS {
                inner.records.pop_front();
            }

            if let Some(threshold) = self.daily_alert_threshold {
                if inner.alerted_on != Some(today) {
                    let total: f64 = inner.records.iter().filter_map(|r| r.estimated_cost).sum();
                    if total >= threshold {
                        inner.alerted_on = Some(today);
                        alert = Some(total);
                    }
                }
            }
        }

        // Publish outside the lock; a handler may read the tracker.
        if let Some(total) = alert {
            self.bus.publish(Event::new(
                "alert.system.llm_cost",
                "usage_tracker",
                Severity::Medium,
                serde_json::json!({
                    "daily_total_usd": total,
                    "threshold_usd": self.daily_alert_threshold,
                }),
            ));
        }
    }

    /// Per-(provider, model) aggregates for the current day.
    pub fn daily_summary(&self) -> Vec<UsageSummary> {
        let today = Local::now().date_naive();
        let mut inner = self.inner.lock();
        prune(&mut inner.records, today);
        summarize(inner.records.iter())
    }

    /// Summed estimated cost for the day; `None` when no record carried
    /// a cost.
    pub fn daily_total_cost(&self) -> Option<f64> {
        let today = Local::now().date_naive();
        let mut inner = self.inner.lock();
        prune(&mut inner.records, today);
        let costs: Vec<f64> = inner.records.iter().filter_map(|r| r.estimated_cost).collect();
        if costs.is_empty() {
            None
        } else {
            Some(costs.into_iter().sum())
        }
    }

    /// Aggregates grouped by tier (`"light"`, `"heavy"`, `"untiered"`).
    pub fn daily_by_tier(&self) -> HashMap<String, Vec<UsageSummary>> {
        let today = Local::now().date_naive();
        let mut inner = self.inner.lock();
        prune(&mut inner.records, today);

        let mut grouped: HashMap<String, Vec<&UsageRecord>> = HashMap::new();
        for r in inner.records.iter() {
            let key = r.tier.map(|t| t.as_str()).unwrap_or("untiered").to_string();
            grouped.entry(key).or_default().push(r);
        }
        grouped
            .into_iter()
            .map(|(k, rs)| (k, summarize(rs.into_iter())))
            .collect()
    }

    pub fn record_count(&self) -> usize {
        self.inner.lock().records.len()
    }
}

fn prune(records: &mut VecDeque<UsageRecord>, today: NaiveDate) {
    // Records are appended chronologically; stale ones sit at the front.
    while let Some(front) = records.front() {
        if front.timestamp.date_naive() == today {
            break;
        }
        records.pop_front();
    }
}

fn summarize<'a>(records: impl Iterator<Item = &'a UsageRecord>) -> Vec<UsageSummary> {
    let mut by_key: HashMap<(String, String), UsageSummary> = HashMap::new();
    for r in records {
        let entry = by_key
            .entry((r.provider.clone(), r.model.clone()))
            .or_insert_with(|| UsageSummary {
                provider: r.provider.clone(),
                model: r.model.clone(),
                in_tokens: 0,
                out_tokens: 0,
                requests: 0,
                cost: None,
                tracked: 0,
            });
        entry.requests += 1;
        entry.in_tokens += r.in_tokens.unwrap_or(0);
        entry.out_tokens += r.out_tokens.unwrap_or(0);
        if r.in_tokens.is_some() || r.out_tokens.is_some() {
            entry.tracked += 1;
        }
        if let Some(c) = r.estimated_cost {
            *entry.cost.get_or_insert(0.0) += c;
        }
    }
    let mut out: Vec<UsageSummary> = by_key.into_values().collect();
    out.sort_by(|a, b| (a.provider.as_str(), a.model.as_str()).cmp(&(b.provider.as_str(), b.model.as_str())));
    out
}
