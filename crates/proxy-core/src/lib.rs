//! Canonical message types, streaming events, and the error taxonomy shared
//! by every crate in the Antigravity proxy: the account pool, the Gemini
//! codec, and the dispatch engine all speak in these terms rather than in
//! either provider's wire format.

pub mod error;
pub mod events;
pub mod types;

pub use error::{ProxyError, Result};
pub use events::{BlockKind, Delta, StreamEvent};
pub use types::{
    CanonicalMessage, CanonicalRequest, CanonicalResponse, ContentBlock, Role, StopReason,
    ToolDeclaration, Usage,
};
