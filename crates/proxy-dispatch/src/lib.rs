//! Request building and the retry/failover dispatch engine: the pieces that
//! turn a canonical request plus an account pool into upstream HTTP calls,
//! with endpoint failover, quota-driven account rotation, and a
//! cross-family fallback-model hop.

pub mod builder;
pub mod dispatch;
pub mod endpoints;

pub use builder::{build, session_id, BuiltRequest};
pub use dispatch::DispatchContext;
pub use endpoints::{fallback_model, is_thinking_capable, ENDPOINTS, OAUTH_TOKEN_URL, PROJECT_DISCOVERY_URL};
