use std::sync::Arc;

use proxy_accounts::ThinkingSignatureCache;
use proxy_dispatch::DispatchContext;

use crate::config::ProxyConfig;

/// Shared application state injected into every axum handler via
/// [`axum::extract::State`].
#[derive(Clone)]
pub struct AppState {
    pub dispatch: DispatchContext,
    pub signatures: ThinkingSignatureCache,
    pub config: Arc<ProxyConfig>,
}
