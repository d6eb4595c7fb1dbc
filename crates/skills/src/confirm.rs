//! Single-use confirmation tokens for destructive tool calls.
//!
//! A skill that is about to do something irreversible mints a
//! [`PendingAction`] and shows the user a prompt embedding the token;
//! the action only runs when the same user replies `confirm <TOKEN>`
//! before the TTL elapses. Tokens are 128 random bits, Base32-encoded
//! (RFC 4648, no padding), compared in constant time, and deleted on
//! first successful consume. Repeated invalid attempts lock the user
//! out and raise `alert.system.abuse`.

use std::collections::{HashMap, VecDeque};
use std::sync::Arc;

use chrono::{DateTime, Duration, Utc};
use parking_lot::Mutex;
use rand::RngCore;
use serde_json::Value;
use subtle::ConstantTimeEq;

use cg_domain::bus::EventBus;
use cg_domain::config::ConfirmationConfig;
use cg_domain::event::{Event, Severity};

/// Token byte length before encoding. 16 bytes = 128 bits, encoded to
/// 26 Base32 characters.
const TOKEN_BYTES: usize = 16;

const BASE32_ALPHABET: &[u8; 32] = b"ABCDEFGHIJKLMNOPQRSTUVWXYZ234567";

#[derive(Debug, Clone)]
pub struct PendingAction {
    pub token: String,
    pub user_id: String,
    pub skill: String,
    pub tool: String,
    pub input: Value,
    pub description: String,
    pub temp_dir: Option<String>,
    pub expires_at: DateTime<Utc>,
}

struct Inner {
    pending: HashMap<String, PendingAction>,
    /// Timestamps of invalid consume attempts per user, pruned to the
    /// abuse window.
    invalid_attempts: HashMap<String, VecDeque<DateTime<Utc>>>,
}

pub struct ConfirmationManager {
    ttl: Duration,
    abuse_window: Duration,
    abuse_threshold: u32,
    bus: Arc<EventBus>,
    confirm_re: regex::Regex,
    inner: Mutex<Inner>,
}

impl ConfirmationManager {
    pub fn new(config: ConfirmationConfig, bus: Arc<EventBus>) -> Self {
        Self {
            ttl: Duration::seconds(config.ttl_secs as i64),
            abuse_window: Duration::seconds(config.abuse_window_secs as i64),
            abuse_threshold: config.abuse_threshold,
            bus,
            confirm_re: regex::RegexBuilder::new(r"^\s*confirm\s+([A-Z2-7]+)\s*$")
                .case_insensitive(true)
                .build()
                .expect("confirm regex is valid"),
            inner: Mutex::new(Inner {
                pending: HashMap::new(),
                invalid_attempts: HashMap::new(),
            }),
        }
    }

    /// Mint a pending action and return its token.
    #[allow(clippy::too_many_arguments)]
    pub fn create(
        &self,
        user_id: &str,
        skill: &str,
        tool: &str,
        input: Value,
        description: &str,
        temp_dir: Option<String>,
    ) -> String {
        let token = generate_token();
        let action = PendingAction {
            token: token.clone(),
            user_id: user_id.to_string(),
            skill: skill.to_string(),
            tool: tool.to_string(),
            input,
            description: description.to_string(),
            temp_dir,
            expires_at: Utc::now() + self.ttl,
        };
        self.inner.lock().pending.insert(token.clone(), action);
        tracing::info!(user_id, skill, tool, "pending action created");
        token
    }

    /// Consume a token. Returns the stored action only when the token is
    /// live, unexpired, and presented by its creator; every other
    /// outcome records an invalid attempt. Single-use: success deletes
    /// the token atomically.
    pub fn consume(&self, token: &str, user_id: &str) -> Option<PendingAction> {
        let now = Utc::now();
        let mut abuse_total: Option<u32> = None;

        let result = {
            let mut inner = self.inner.lock();

            let attempts = inner.invalid_attempts.entry(user_id.to_string()).or_default();
            while let Some(front) = attempts.front() {
                if now - *front > self.abuse_window {
                    attempts.pop_front();
                } else {
                    break;
                }
            }
            if attempts.len() as u32 >= self.abuse_threshold {
                tracing::warn!(user_id, "confirmation lockout: abuse threshold reached");
                return None;
            }

            // Constant-time scan; the map is small (live actions only).
            let found = inner
                .pending
                .keys()
                .find(|k| {
                    k.as_bytes().ct_eq(token.as_bytes()).unwrap_u8() == 1
                })
                .cloned();

            let valid = found.as_ref().is_some_and(|k| {
                let action = &inner.pending[k];
                action.user_id == user_id && action.expires_at > now
            });

            if valid {
                let key = found.expect("checked above");
                inner.pending.remove(&key)
            } else {
                if let Some(key) = found {
                    // Expired or foreign token: drop it if expired.
                    if inner.pending[&key].expires_at <= now {
                        inner.pending.remove(&key);
                    }
                }
                let attempts = inner.invalid_attempts.entry(user_id.to_string()).or_default();
                attempts.push_back(now);
                if attempts.len() as u32 == self.abuse_threshold {
                    abuse_total = Some(attempts.len() as u32);
                }
                None
            }
        };

        // Publish outside the lock.
        if let Some(count) = abuse_total {
            self.bus.publish(Event::new(
                "alert.system.abuse",
                "confirmation_manager",
                Severity::High,
                serde_json::json!({
                    "user_id": user_id,
                    "invalid_attempts": count,
                    "window_secs": self.abuse_window.num_seconds(),
                }),
            ));
        }

        result
    }

    /// Extract a confirmation token from a chat message, if the message
    /// is exactly `confirm <TOKEN>` (case-insensitive). The returned
    /// token is normalized to upper case.
    pub fn is_confirmation_message(&self, text: &str) -> Option<String> {
        self.confirm_re
            .captures(text)
            .map(|caps| caps[1].to_ascii_uppercase())
    }

    /// Prune expired tokens.
    pub fn cleanup(&self) {
        let now = Utc::now();
        let mut inner = self.inner.lock();
        let before = inner.pending.len();
        inner.pending.retain(|_, a| a.expires_at > now);
        let pruned = before - inner.pending.len();
        if pruned > 0 {
            tracing::debug!(pruned, "expired confirmation tokens removed");
        }
    }

    pub fn pending_count(&self) -> usize {
        self.inner.lock().pending.len()
    }
}

fn generate_token() -> String {
    let mut bytes = [0u8; TOKEN_BYTES];
    rand::thread_rng().fill_bytes(&mut bytes);
    base32_encode(&bytes)
}

/// RFC 4648 Base32, upper case, no padding.
fn base32_encode(bytes: &[u8]) -> String {
    let mut out = String::with_capacity(bytes.len() * 8 / 5 + 1);
    let mut buffer: u32 = 0;
    let mut bits: u32 = 0;
    for &b in bytes {
        buffer = (buffer << 8) | b as u32;
        bits += 8;
        while bits >= 5 {
            bits -= 5;
            out.push(BASE32_ALPHABET[((buffer >> bits) & 0x1f) as usize] as char);
        }
    }
    if bits > 0 {
        out.push(BASE32_ALPHABET[((buffer << (5 - bits)) & 0x1f) as usize] as char);
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn manager() -> ConfirmationManager {
        ConfirmationManager::new(ConfirmationConfig::default(), Arc::new(EventBus::new()))
    }

    fn create(mgr: &ConfirmationManager, user: &str) -> String {
        mgr.create(
            user,
            "files",
            "file_delete",
            serde_json::json!({ "path": "/tmp/x" }),
            "Delete /tmp/x",
            None,
        )
    }

    #[test]
    fn token_shape_is_base32_and_long_enough() {
        let mgr = manager();
        let token = create(&mgr, "u1");
        assert!(token.len() >= 16);
        assert!(token.chars().all(|c| c.is_ascii_uppercase() || ('2'..='7').contains(&c)));
    }

    #[test]
    fn base32_known_vectors() {
        // RFC 4648 test vectors, padding stripped.
        assert_eq!(base32_encode(b""), "");
        assert_eq!(base32_encode(b"f"), "MY");
        assert_eq!(base32_encode(b"fo"), "MZXQ");
        assert_eq!(base32_encode(b"foo"), "MZXW6");
        assert_eq!(base32_encode(b"foobar"), "MZXW6YTBOI");
    }

    #[test]
    fn consume_is_single_use() {
        let mgr = manager();
        let token = create(&mgr, "u1");
        let action = mgr.consume(&token, "u1").expect("first consume succeeds");
        assert_eq!(action.tool, "file_delete");
        assert!(mgr.consume(&token, "u1").is_none());
        assert_eq!(mgr.pending_count(), 0);
    }

    #[test]
    fn consume_is_user_scoped() {
        let mgr = manager();
        let token = create(&mgr, "u1");
        assert!(mgr.consume(&token, "u2").is_none());
        // Still live for the rightful owner.
        assert!(mgr.consume(&token, "u1").is_some());
    }

    #[test]
    fn expired_tokens_fail_and_cleanup_prunes() {
        let mgr = ConfirmationManager::new(
            ConfirmationConfig { ttl_secs: 0, abuse_window_secs: 300, abuse_threshold: 10 },
            Arc::new(EventBus::new()),
        );
        let token = create(&mgr, "u1");
        assert!(mgr.consume(&token, "u1").is_none());
        create(&mgr, "u1");
        mgr.cleanup();
        assert_eq!(mgr.pending_count(), 0);
    }

    #[test]
    fn abuse_threshold_locks_out_and_alerts_once() {
        let bus = Arc::new(EventBus::new());
        let alerts = Arc::new(AtomicUsize::new(0));
        let alerts_clone = alerts.clone();
        bus.subscribe(
            "alert.system.abuse",
            Arc::new(move |_| {
                alerts_clone.fetch_add(1, Ordering::SeqCst);
                Ok(())
            }),
        );
        let mgr = ConfirmationManager::new(
            ConfirmationConfig { ttl_secs: 300, abuse_window_secs: 300, abuse_threshold: 3 },
            bus,
        );

        for _ in 0..3 {
            assert!(mgr.consume("WRONGTOKEN234567", "u1").is_none());
        }
        assert_eq!(alerts.load(Ordering::SeqCst), 1);

        // Locked out now — even a valid token is refused.
        let token = create(&mgr, "u1");
        assert!(mgr.consume(&token, "u1").is_none());
        assert_eq!(alerts.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn confirmation_message_matching() {
        let mgr = manager();
        assert_eq!(
            mgr.is_confirmation_message("  confirm MZXW6YTBOI234567 "),
            Some("MZXW6YTBOI234567".to_string())
        );
        assert_eq!(
            mgr.is_confirmation_message("CONFIRM mzxw6ytboi234567"),
            Some("MZXW6YTBOI234567".to_string())
        );
        assert!(mgr.is_confirmation_message("confirm").is_none());
        assert!(mgr.is_confirmation_message("please confirm ABC234").is_none());
        assert!(mgr.is_confirmation_message("confirm two words").is_none());
    }
}
