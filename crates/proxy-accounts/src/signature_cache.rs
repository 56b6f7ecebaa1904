use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use sha2::{Digest, Sha256};

/// Returned by [`ThinkingSignatureCache::lookup`] when the request builder
/// should re-attach a signature versus skip validation entirely.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SignatureLookup {
    Signature(String),
    /// No fresh entry for this digest; replay should use the skip sentinel.
    Skip,
}

struct Entry {
    signature: String,
    inserted_at: Instant,
}

/// Mapping from a digest of assistant thinking content to the latest
/// observed `thoughtSignature`, used to re-attach signatures a client has
/// stripped before the next request. Best-effort: concurrent writers for the
/// same digest resolve last-writer-wins.
#[derive(Clone)]
pub struct ThinkingSignatureCache {
    entries: Arc<Mutex<HashMap<String, Entry>>>,
    ttl: Duration,
}

impl ThinkingSignatureCache {
    pub fn new(ttl: Duration) -> Self {
        Self { entries: Arc::new(Mutex::new(HashMap::new())), ttl }
    }

    pub fn digest(content: &str) -> String {
        let mut hasher = Sha256::new();
        hasher.update(content.as_bytes());
        hex::encode(hasher.finalize())
    }

    /// Record the signature most recently observed for `content`.
    pub fn record(&self, content: &str, signature: impl Into<String>) {
        let digest = Self::digest(content);
        self.entries.lock().unwrap().insert(digest, Entry { signature: signature.into(), inserted_at: Instant::now() });
    }

    /// Look up a fresh signature for `content`, or [`SignatureLookup::Skip`]
    /// if none is cached or the cached entry has aged past the TTL.
    pub fn lookup(&self, content: &str) -> SignatureLookup {
        let digest = Self::digest(content);
        let entries = self.entries.lock().unwrap();
        match entries.get(&digest) {
            Some(entry) if entry.inserted_at.elapsed() <= self.ttl => {
                SignatureLookup::Signature(entry.signature.clone())
            }
            _ => SignatureLookup::Skip,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fresh_entry_is_returned() {
        let cache = ThinkingSignatureCache::new(Duration::from_secs(7200));
        cache.record("reasoning text", "sig-abc");
        assert_eq!(cache.lookup("reasoning text"), SignatureLookup::Signature("sig-abc".into()));
    }

    #[test]
    fn missing_entry_yields_skip_sentinel() {
        let cache = ThinkingSignatureCache::new(Duration::from_secs(7200));
        assert_eq!(cache.lookup("never recorded"), SignatureLookup::Skip);
    }

    #[test]
    fn expired_entry_yields_skip_sentinel() {
        let cache = ThinkingSignatureCache::new(Duration::from_millis(0));
        cache.record("reasoning text", "sig-abc");
        std::thread::sleep(Duration::from_millis(5));
        assert_eq!(cache.lookup("reasoning text"), SignatureLookup::Skip);
    }

    #[test]
    fn last_writer_wins_on_repeated_record() {
        let cache = ThinkingSignatureCache::new(Duration::from_secs(7200));
        cache.record("reasoning text", "sig-1");
        cache.record("reasoning text", "sig-2");
        assert_eq!(cache.lookup("reasoning text"), SignatureLookup::Signature("sig-2".into()));
    }

    #[test]
    fn digest_is_stable_for_identical_content() {
        assert_eq!(ThinkingSignatureCache::digest("same"), ThinkingSignatureCache::digest("same"));
    }

    #[test]
    fn digest_differs_for_different_content() {
        assert_ne!(ThinkingSignatureCache::digest("a"), ThinkingSignatureCache::digest("b"));
    }
}
