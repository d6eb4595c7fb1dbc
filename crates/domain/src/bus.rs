//! In-process publish/subscribe with glob-pattern subscriptions.
//!
//! Patterns are dotted strings where `*` matches exactly one segment:
//! `alert.*` matches `alert.system` but not `alert.system.llm_failure`
//! or `alert`. Delivery is best-effort, in-process, and sequential in
//! subscription order; handler errors are logged and never reach the
//! publisher. Events with no matching subscriber are dropped silently.

use std::sync::Arc;

use parking_lot::Mutex;

use crate::error::Result;
use crate::event::{generate_event_id, Event};

pub type Handler = Arc<dyn Fn(&Event) -> Result<()> + Send + Sync>;

struct Subscription {
    pattern: Vec<Segment>,
    pattern_str: String,
    handler: Handler,
}

#[derive(Debug, Clone, PartialEq, Eq)]
enum Segment {
    Literal(String),
    Wildcard,
}

/// In-process event bus.
///
/// One publish's dispatch completes before the next begins (a single
/// dispatch lock); handlers therefore must not publish re-entrantly.
#[derive(Default)]
pub struct EventBus {
    subs: Mutex<Vec<Subscription>>,
}

impl EventBus {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a handler for every event whose type matches `pattern`.
    pub fn subscribe(&self, pattern: &str, handler: Handler) {
        let parsed = parse_pattern(pattern);
        self.subs.lock().push(Subscription {
            pattern: parsed,
            pattern_str: pattern.to_string(),
            handler,
        });
    }

    /// Publish an event to all matching subscribers, in subscription
    /// order. Generates an `event_id` when the caller left it unset.
    pub fn publish(&self, mut event: Event) {
        if event.event_id.is_none() {
            event.event_id = Some(generate_event_id());
        }

        let subs = self.subs.lock();
        for sub in subs.iter() {
            if matches(&sub.pattern, &event.event_type) {
                if let Err(e) = (sub.handler)(&event) {
                    tracing::warn!(
                        pattern = %sub.pattern_str,
                        event_type = %event.event_type,
                        error = %e,
                        "event handler failed"
                    );
                }
            }
        }
    }

    /// Number of registered subscriptions (dashboard introspection).
    pub fn subscription_count(&self) -> usize {
        self.subs.lock().len()
    }
}

fn parse_pattern(pattern: &str) -> Vec<Segment> {
    pattern
        .split('.')
        .map(|s| {
            if s == "*" {
                Segment::Wildcard
            } else {
                Segment::Literal(s.to_string())
            }
        })
        .collect()
}

fn matches(pattern: &[Segment], event_type: &str) -> bool {
    let segments: Vec<&str> = event_type.split('.').collect();
    if segments.len() != pattern.len() {
        return false;
    }
    pattern.iter().zip(segments).all(|(p, s)| match p {
        Segment::Wildcard => true,
        Segment::Literal(lit) => lit == s,
    })
}
