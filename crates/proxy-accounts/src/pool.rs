use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use crate::account::Account;

/// In-memory registry of upstream accounts with sticky, round-robin
/// selection per model.
///
/// The per-account map and the cursor/sticky state live behind a single
/// mutex; readers clone out what they need and drop the guard immediately,
/// so no caller ever holds the lock across a suspension point.
#[derive(Clone)]
pub struct AccountPool {
    inner: Arc<Mutex<PoolInner>>,
    max_accounts: usize,
}

struct PoolInner {
    accounts: Vec<Account>,
    cursor: HashMap<String, usize>,
    sticky: HashMap<String, String>,
}

impl AccountPool {
    pub fn new(max_accounts: usize) -> Self {
        Self {
            inner: Arc::new(Mutex::new(PoolInner {
                accounts: Vec::new(),
                cursor: HashMap::new(),
                sticky: HashMap::new(),
            })),
            max_accounts,
        }
    }

    pub fn from_accounts(accounts: Vec<Account>, max_accounts: usize) -> Self {
        let pool = Self::new(max_accounts);
        {
            let mut inner = pool.inner.lock().unwrap();
            inner.accounts = accounts.into_iter().take(max_accounts).collect();
        }
        pool
    }

    /// Returns `false` if the pool is already at `max_accounts`.
    pub fn add(&self, account: Account) -> bool {
        let mut inner = self.inner.lock().unwrap();
        if inner.accounts.len() >= self.max_accounts {
            return false;
        }
        inner.accounts.push(account);
        true
    }

    pub fn remove(&self, email: &str) -> bool {
        let mut inner = self.inner.lock().unwrap();
        let before = inner.accounts.len();
        inner.accounts.retain(|a| a.email != email);
        inner.sticky.retain(|_, sticky_email| sticky_email != email);
        inner.accounts.len() != before
    }

    pub fn available_for(&self, model: &str) -> Vec<Account> {
        let inner = self.inner.lock().unwrap();
        inner.accounts.iter().filter(|a| a.is_free_for(model)).cloned().collect()
    }

    /// Current sticky account for `model`, if it is still free.
    pub fn sticky(&self, model: &str) -> Option<Account> {
        let inner = self.inner.lock().unwrap();
        let email = inner.sticky.get(model)?;
        inner.accounts.iter().find(|a| &a.email == email && a.is_free_for(model)).cloned()
    }

    /// Advance the round-robin cursor and return the next free account,
    /// promoting it to sticky. Ties are broken by insertion order.
    pub fn pick_next(&self, model: &str) -> Option<Account> {
        let mut inner = self.inner.lock().unwrap();
        let len = inner.accounts.len();
        if len == 0 {
            return None;
        }
        let start = *inner.cursor.get(model).unwrap_or(&0);
        for step in 0..len {
            let idx = (start + step) % len;
            if inner.accounts[idx].is_free_for(model) {
                inner.cursor.insert(model.to_string(), (idx + 1) % len);
                let email = inner.accounts[idx].email.clone();
                inner.sticky.insert(model.to_string(), email);
                return Some(inner.accounts[idx].clone());
            }
        }
        None
    }

    /// Mark `email` limited for `model` until `now + reset_ms`. Clears
    /// stickiness for `model` if `email` was the current sticky account.
    pub fn mark_limited(&self, email: &str, reset_ms: u64, model: &str) {
        let mut inner = self.inner.lock().unwrap();
        let until = Instant::now() + Duration::from_millis(reset_ms);
        if let Some(account) = inner.accounts.iter_mut().find(|a| a.email == email) {
            account.mark_limited(model, until);
        }
        if inner.sticky.get(model).map(String::as_str) == Some(email) {
            inner.sticky.remove(model);
        }
    }

    pub fn clear_expired(&self) {
        let mut inner = self.inner.lock().unwrap();
        for account in inner.accounts.iter_mut() {
            account.clear_expired();
        }
    }

    pub fn all_limited(&self, model: &str) -> bool {
        let inner = self.inner.lock().unwrap();
        !inner.accounts.is_empty() && inner.accounts.iter().all(|a| !a.is_free_for(model))
    }

    pub fn min_wait_ms(&self, model: &str) -> u64 {
        let inner = self.inner.lock().unwrap();
        inner
            .accounts
            .iter()
            .map(|a| a.state_for(model).remaining_wait_ms())
            .min()
            .unwrap_or(0)
    }

    pub fn total_count(&self) -> usize {
        self.inner.lock().unwrap().accounts.len()
    }

    pub fn snapshot(&self) -> Vec<Account> {
        self.inner.lock().unwrap().accounts.clone()
    }
}
