use std::collections::HashMap;
use std::time::Instant;

use serde::{Deserialize, Serialize};

/// The OAuth credential triple needed to mint a fresh access token.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Credentials {
    pub refresh_token: String,
    pub client_id: String,
    pub client_secret: String,
}

/// Per-model rate-limit state for a single account.
///
/// A *limited* entry is cleared lazily when queried after its reset instant,
/// or eagerly by [`crate::pool::AccountPool::clear_expired`].
#[derive(Debug, Clone, Copy)]
pub enum RateLimitState {
    Free,
    LimitedUntil(Instant),
}

impl RateLimitState {
    /// Whether this state is free to use right now, resolving an expired
    /// `LimitedUntil` to free without requiring a sweep first.
    pub fn is_free(&self) -> bool {
        match self {
            RateLimitState::Free => true,
            RateLimitState::LimitedUntil(until) => Instant::now() >= *until,
        }
    }

    pub fn remaining_wait_ms(&self) -> u64 {
        match self {
            RateLimitState::Free => 0,
            RateLimitState::LimitedUntil(until) => {
                until.saturating_duration_since(Instant::now()).as_millis() as u64
            }
        }
    }
}

/// An upstream OAuth identity with credentials and per-model rate-limit state.
#[derive(Debug, Clone)]
pub struct Account {
    pub email: String,
    pub credentials: Credentials,
    pub created_at: chrono::DateTime<chrono::Utc>,
    limits: HashMap<String, RateLimitState>,
}

impl Account {
    pub fn new(email: impl Into<String>, credentials: Credentials) -> Self {
        Self {
            email: email.into(),
            credentials,
            created_at: chrono::Utc::now(),
            limits: HashMap::new(),
        }
    }

    /// State for `model`, defaulting to free if never marked limited.
    pub fn state_for(&self, model: &str) -> RateLimitState {
        self.limits.get(model).copied().unwrap_or(RateLimitState::Free)
    }

    pub fn is_free_for(&self, model: &str) -> bool {
        self.state_for(model).is_free()
    }

    pub fn mark_limited(&mut self, model: &str, until: Instant) {
        self.limits.insert(model.to_string(), RateLimitState::LimitedUntil(until));
    }

    /// Drop any rate-limit entry whose reset instant has passed.
    pub fn clear_expired(&mut self) {
        self.limits.retain(|_, state| !state.is_free());
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    fn creds() -> Credentials {
        Credentials { refresh_token: "rt".into(), client_id: "id".into(), client_secret: "secret".into() }
    }

    #[test]
    fn new_account_is_free_for_any_model() {
        let account = Account::new("a@example.com", creds());
        assert!(account.is_free_for("gemini-3-pro"));
    }

    #[test]
    fn marking_limited_blocks_that_model_only() {
        let mut account = Account::new("a@example.com", creds());
        account.mark_limited("gemini-3-pro", Instant::now() + Duration::from_secs(60));
        assert!(!account.is_free_for("gemini-3-pro"));
        assert!(account.is_free_for("claude-opus-4"));
    }

    #[test]
    fn limited_state_self_resolves_after_deadline() {
        let mut account = Account::new("a@example.com", creds());
        account.mark_limited("gemini-3-pro", Instant::now() - Duration::from_millis(1));
        assert!(account.is_free_for("gemini-3-pro"));
    }

    #[test]
    fn clear_expired_removes_stale_entries() {
        let mut account = Account::new("a@example.com", creds());
        account.mark_limited("gemini-3-pro", Instant::now() - Duration::from_millis(1));
        account.clear_expired();
        assert_eq!(account.state_for("gemini-3-pro").remaining_wait_ms(), 0);
    }
}
