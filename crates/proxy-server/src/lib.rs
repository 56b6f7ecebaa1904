//! HTTP surface for the Antigravity proxy: the Anthropic-compatible
//! `/v1/messages` endpoint, a `/v1/models` listing, and a liveness probe,
//! wired to the dispatch engine in [`proxy_dispatch`].

pub mod config;
pub mod rest;
pub mod state;

pub use config::ProxyConfig;
pub use state::AppState;
