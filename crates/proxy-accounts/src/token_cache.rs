use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use chrono::Utc;
use serde::Deserialize;

use crate::account::Account;

const EXPIRY_BUFFER_SECS: i64 = 60;

#[derive(Debug, Clone)]
struct CachedToken {
    access_token: String,
    expires_at: i64,
}

fn is_fresh(expires_at: i64, now: i64) -> bool {
    expires_at.saturating_sub(now) > EXPIRY_BUFFER_SECS
}

#[derive(Deserialize)]
struct TokenResponse {
    access_token: String,
    expires_in: i64,
}

/// Per-account memoization of an upstream access token, refreshed against
/// the OAuth token endpoint when the cached value is within 60s of expiry.
#[derive(Clone)]
pub struct TokenCache {
    tokens: Arc<Mutex<HashMap<String, CachedToken>>>,
    http: reqwest::Client,
    token_url: String,
}

impl TokenCache {
    pub fn new(http: reqwest::Client, token_url: impl Into<String>) -> Self {
        Self { tokens: Arc::new(Mutex::new(HashMap::new())), http, token_url: token_url.into() }
    }

    pub async fn token_for(&self, account: &Account) -> proxy_core::Result<String> {
        let now = Utc::now().timestamp();
        if let Some(cached) = self.tokens.lock().unwrap().get(&account.email) {
            if is_fresh(cached.expires_at, now) {
                return Ok(cached.access_token.clone());
            }
        }

        let response = self
            .http
            .post(&self.token_url)
            .form(&[
                ("grant_type", "refresh_token"),
                ("refresh_token", account.credentials.refresh_token.as_str()),
                ("client_id", account.credentials.client_id.as_str()),
                ("client_secret", account.credentials.client_secret.as_str()),
            ])
            .send()
            .await?;

        if response.status() == reqwest::StatusCode::UNAUTHORIZED {
            return Err(proxy_core::ProxyError::AuthInvalid);
        }
        if !response.status().is_success() {
            return Err(proxy_core::ProxyError::UpstreamServerError { status: response.status().as_u16() });
        }

        let body: TokenResponse = response.json().await?;
        let expires_at = now + body.expires_in;
        self.tokens.lock().unwrap().insert(
            account.email.clone(),
            CachedToken { access_token: body.access_token.clone(), expires_at },
        );
        Ok(body.access_token)
    }

    /// Drop the cached token for `email`; the next `token_for` call refreshes.
    pub fn invalidate(&self, email: &str) {
        self.tokens.lock().unwrap().remove(email);
    }
}

/// Per-account memoization of the discovered upstream project identifier.
#[derive(Clone)]
pub struct ProjectCache {
    projects: Arc<Mutex<HashMap<String, String>>>,
    http: reqwest::Client,
    discovery_url: String,
}

impl ProjectCache {
    pub fn new(http: reqwest::Client, discovery_url: impl Into<String>) -> Self {
        Self { projects: Arc::new(Mutex::new(HashMap::new())), http, discovery_url: discovery_url.into() }
    }

    pub async fn project_for(&self, account: &Account, access_token: &str) -> proxy_core::Result<String> {
        if let Some(project) = self.projects.lock().unwrap().get(&account.email) {
            return Ok(project.clone());
        }

        #[derive(Deserialize)]
        struct DiscoveryResponse {
            #[serde(rename = "cloudaicompanionProject")]
            project: String,
        }

        let response = self
            .http
            .post(&self.discovery_url)
            .bearer_auth(access_token)
            .json(&serde_json::json!({}))
            .send()
            .await?;

        if response.status() == reqwest::StatusCode::UNAUTHORIZED {
            return Err(proxy_core::ProxyError::AuthInvalid);
        }
        if !response.status().is_success() {
            return Err(proxy_core::ProxyError::UpstreamServerError { status: response.status().as_u16() });
        }

        let body: DiscoveryResponse = response.json().await?;
        self.projects.lock().unwrap().insert(account.email.clone(), body.project.clone());
        Ok(body.project)
    }

    pub fn invalidate(&self, email: &str) {
        self.projects.lock().unwrap().remove(email);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn token_well_within_expiry_is_fresh() {
        assert!(is_fresh(1000, 0));
    }

    #[test]
    fn token_inside_the_sixty_second_buffer_is_not_fresh() {
        assert!(!is_fresh(30, 0));
    }

    #[test]
    fn token_exactly_at_the_buffer_boundary_is_not_fresh() {
        assert!(!is_fresh(60, 0));
    }

    #[test]
    fn already_expired_token_is_not_fresh() {
        assert!(!is_fresh(-5, 0));
    }
}
