//! Google generateContent wire types, the bidirectional Anthropic<->Google
//! codec, and the SSE stream adapter that reconstructs canonical streaming
//! events from upstream fragments.

pub mod codec;
pub mod identity;
pub mod models;
pub mod stream;

pub use codec::{anthropic_to_google, google_to_anthropic, GEMINI_MAX_OUTPUT_TOKENS};
pub use identity::IDENTITY_PREAMBLE;
pub use stream::{drive, SseAdapter};
