pub mod account;
pub mod persistence;
pub mod pool;
pub mod signature_cache;
pub mod token_cache;

pub use account::{Account, Credentials, RateLimitState};
pub use pool::AccountPool;
pub use signature_cache::{SignatureLookup, ThinkingSignatureCache};
pub use token_cache::{ProjectCache, TokenCache};
