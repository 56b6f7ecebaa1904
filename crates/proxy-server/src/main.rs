use std::sync::Arc;
use std::time::Duration;

use proxy_accounts::{AccountPool, ProjectCache, ThinkingSignatureCache, TokenCache};
use proxy_dispatch::{DispatchContext, OAUTH_TOKEN_URL, PROJECT_DISCOVERY_URL};
use proxy_server::{AppState, ProxyConfig};

fn init_tracing() {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info"));
    tracing_subscriber::fmt().with_env_filter(filter).init();
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    init_tracing();

    let config = ProxyConfig::from_env();
    let accounts = proxy_accounts::persistence::load(&config.accounts_path);
    tracing::info!(count = accounts.len(), "loaded accounts");

    let pool = AccountPool::from_accounts(accounts, config.max_accounts);
    let http = reqwest::Client::builder().timeout(Duration::from_secs(120)).build()?;
    let tokens = TokenCache::new(http.clone(), OAUTH_TOKEN_URL);
    let projects = ProjectCache::new(http.clone(), PROJECT_DISCOVERY_URL);
    let signatures = ThinkingSignatureCache::new(config.thinking_signature_ttl);

    let dispatch = DispatchContext {
        pool,
        tokens,
        projects,
        http,
        max_retries: config.max_retries,
        default_cooldown_ms: config.default_cooldown_ms,
        max_wait_before_error_ms: config.max_wait_before_error_ms,
        signatures: signatures.clone(),
        endpoints: proxy_dispatch::ENDPOINTS.iter().map(|s| s.to_string()).collect(),
        fallback_enabled: config.fallback_enabled,
    };

    let port = config.port;
    let state = AppState { dispatch, signatures, config: Arc::new(config) };
    let app = proxy_server::rest::router(state);

    let listener = tokio::net::TcpListener::bind(("0.0.0.0", port)).await?;
    tracing::info!(port, "antigravity-proxy listening");

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        tokio::signal::ctrl_c().await.expect("failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())
            .expect("failed to install SIGTERM handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }

    tracing::info!("shutting down");
}
