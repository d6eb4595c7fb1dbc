//! Resilient provider wrapper — retry with backoff, breaker integration,
//! and an outage alert when the breaker opens.
//!
//! Every LLM call in the system goes through this wrapper; nothing calls a
//! raw [`Provider`] directly.

use std::sync::Arc;
use std::time::Duration;

use cg_domain::bus::EventBus;
use cg_domain::chat::{ChatRequest, ChatResponse, ProviderCapabilities};
use cg_domain::error::{Error, Result};
use cg_domain::event::{Event, Severity};

use crate::breaker::CircuitBreaker;
use crate::traits::Provider;

/// Backoff schedule between transient-failure retries. One initial
/// attempt plus one retry per entry.
const RETRY_DELAYS: [Duration; 3] = [
    Duration::from_millis(100),
    Duration::from_millis(200),
    Duration::from_millis(400),
];

pub struct ResilientProvider {
    inner: Arc<dyn Provider>,
    breaker: Arc<CircuitBreaker>,
    bus: Arc<EventBus>,
}

impl ResilientProvider {
    pub fn new(inner: Arc<dyn Provider>, breaker: Arc<CircuitBreaker>, bus: Arc<EventBus>) -> Self {
        Self { inner, breaker, bus }
    }

    pub fn name(&self) -> &str {
        self.inner.name()
    }

    pub fn capabilities(&self) -> &ProviderCapabilities {
        self.inner.capabilities()
    }

    pub fn breaker(&self) -> &Arc<CircuitBreaker> {
        &self.breaker
    }

    /// Send a chat request through the breaker and retry schedule.
    ///
    /// At most `1 + RETRY_DELAYS.len()` attempts are issued. Only the
    /// transient error class retries; auth/schema/cancellation fail
    /// straight through. A failure that exhausts the schedule counts
    /// once against the breaker.
    pub async fn chat(&self, req: &ChatRequest) -> Result<ChatResponse> {
        if !self.breaker.can_execute() {
            return Err(Error::ProviderUnavailable(self.inner.name().to_string()));
        }

        let mut last_err: Option<Error> = None;
        for attempt in 0..=RETRY_DELAYS.len() {
            if let Some(cancel) = &req.cancel {
                if cancel.is_cancelled() {
                    return Err(Error::Cancelled);
                }
            }

            match self.inner.chat(req).await {
                Ok(resp) => {
                    self.breaker.record_success();
                    return Ok(resp);
                }
                Err(e) => {
                    let retryable = e.is_transient() && attempt < RETRY_DELAYS.len();
                    tracing::warn!(
                        provider = %self.inner.name(),
                        attempt,
                        retryable,
                        error = %e,
                        "provider call failed"
                    );
                    if !retryable {
                        last_err = Some(e);
                        break;
                    }
                    last_err = Some(e);
                    tokio::time::sleep(RETRY_DELAYS[attempt]).await;
                }
            }
        }

        let err = last_err.unwrap_or_else(|| Error::Other("provider retry loop exhausted".into()));

        // Cancellation is the caller's doing; it neither trips the
        // breaker nor counts as a provider failure.
        if matches!(err, Error::Cancelled) {
            return Err(err);
        }

        if self.breaker.record_failure() {
            self.publish_open_alert(&err);
        }
        Err(err)
    }

    fn publish_open_alert(&self, err: &Error) {
        self.bus.publish(Event::new(
            "alert.system.llm_failure",
            "resilient_provider",
            Severity::High,
            serde_json::json!({
                "provider": self.inner.name(),
                "error": err.to_string(),
            }),
        ));
    }
}
