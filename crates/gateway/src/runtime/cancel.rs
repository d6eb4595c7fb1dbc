//! Per-user cancellation tokens for active turns.
//!
//! Each running turn registers a [`CancelToken`] keyed by user id.
//! `POST /v1/sessions/:user/stop` cancels the active turn cleanly; the
//! loop observes the token before its next LLM call.

use std::collections::HashMap;

use parking_lot::Mutex;

use cg_domain::cancel::CancelToken;

/// Tracks active cancellation tokens per user.
#[derive(Default)]
pub struct CancelMap {
    tokens: Mutex<HashMap<String, CancelToken>>,
}

impl CancelMap {
    pub fn new() -> Self {
        Self::default()
    }

    /// Create and register a new cancel token for a user's turn.
    pub fn register(&self, user_id: &str) -> CancelToken {
        let token = CancelToken::new();
        self.tokens.lock().insert(user_id.to_owned(), token.clone());
        token
    }

    /// Cancel a running turn. Returns true if a token was found.
    pub fn cancel(&self, user_id: &str) -> bool {
        if let Some(token) = self.tokens.lock().get(user_id) {
            token.cancel();
            true
        } else {
            false
        }
    }

    /// Remove the token (called when a turn completes).
    pub fn remove(&self, user_id: &str) {
        self.tokens.lock().remove(user_id);
    }

    /// Whether a user currently has an active turn.
    pub fn is_running(&self, user_id: &str) -> bool {
        self.tokens.lock().contains_key(user_id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn register_cancel_remove() {
        let map = CancelMap::new();
        let token = map.register("u1");
        assert!(map.is_running("u1"));
        assert!(!token.is_cancelled());

        assert!(map.cancel("u1"));
        assert!(token.is_cancelled());

        map.remove("u1");
        assert!(!map.is_running("u1"));
        assert!(!map.cancel("u1"));
    }

    #[test]
    fn register_replaces_previous_token() {
        let map = CancelMap::new();
        let old_token = map.register("u1");
        let new_token = map.register("u1");

        map.cancel("u1");
        assert!(new_token.is_cancelled());
        // The replaced token is orphaned and unaffected.
        assert!(!old_token.is_cancelled());
    }

    #[test]
    fn remove_is_idempotent() {
        let map = CancelMap::new();
        map.register("u1");
        map.remove("u1");
        map.remove("u1");
        assert!(!map.is_running("u1"));
    }
}
