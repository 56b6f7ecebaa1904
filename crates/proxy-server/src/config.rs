use std::path::PathBuf;
use std::time::Duration;

fn env_or<T: std::str::FromStr>(key: &str, default: T) -> T {
    std::env::var(key).ok().and_then(|v| v.parse().ok()).unwrap_or(default)
}

/// Process-wide configuration, populated from the environment at startup.
/// Every field has a documented default so the proxy runs unconfigured.
#[derive(Debug, Clone)]
pub struct ProxyConfig {
    pub port: u16,
    pub accounts_path: PathBuf,
    pub fallback_enabled: bool,
    pub default_cooldown_ms: u64,
    pub max_accounts: usize,
    pub max_wait_before_error_ms: u64,
    pub max_retries: usize,
    pub max_empty_response_retries: usize,
    pub gemini_max_output_tokens: u32,
    pub thinking_signature_ttl: Duration,
    pub auth_token: Option<String>,
}

impl ProxyConfig {
    pub fn from_env() -> Self {
        Self {
            port: env_or("PROXY_PORT", 8080),
            accounts_path: env_or::<String>("PROXY_ACCOUNTS_PATH", "accounts.json".to_string()).into(),
            fallback_enabled: env_or("PROXY_FALLBACK_ENABLED", true),
            default_cooldown_ms: env_or("PROXY_DEFAULT_COOLDOWN_MS", 10_000),
            max_accounts: env_or("PROXY_MAX_ACCOUNTS", 10),
            max_wait_before_error_ms: env_or("PROXY_MAX_WAIT_BEFORE_ERROR_MS", 120_000),
            max_retries: env_or("PROXY_MAX_RETRIES", 5),
            max_empty_response_retries: env_or("PROXY_MAX_EMPTY_RESPONSE_RETRIES", 2),
            gemini_max_output_tokens: env_or("PROXY_GEMINI_MAX_OUTPUT_TOKENS", 16_384),
            thinking_signature_ttl: Duration::from_millis(env_or("PROXY_THINKING_SIGNATURE_TTL_MS", 7_200_000)),
            auth_token: std::env::var("PROXY_AUTH_TOKEN").ok(),
        }
    }
}
