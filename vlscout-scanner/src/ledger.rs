//! Run-wide dedup state shared by every worker.
//!
//! Three independent sets: visited URLs (keyed by [`normalize_url`]), digests
//! of document prefixes, and fingerprints of individual config entries. Each
//! check-and-insert happens under one short lock, never across an await.

use crate::normalizer::normalize_url;
use sha2::{Digest, Sha256};
use std::collections::HashSet;
use std::sync::Mutex;

/// Default number of leading bytes hashed for content dedup.
pub const DEFAULT_DIGEST_PREFIX: usize = 500;

/// Hex SHA-256 of the first `prefix` bytes of `content`.
pub fn content_digest(content: &str, prefix: usize) -> String {
    let bytes = content.as_bytes();
    let head = &bytes[..bytes.len().min(prefix)];
    hex::encode(Sha256::digest(head))
}

/// Sizes of the three ledger sets.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct LedgerCounts {
    pub visited: usize,
    pub digests: usize,
    pub fingerprints: usize,
}

#[derive(Debug)]
pub struct DedupLedger {
    visited: Mutex<HashSet<String>>,
    digests: Mutex<HashSet<String>>,
    fingerprints: Mutex<HashSet<String>>,
    digest_prefix: usize,
}

impl DedupLedger {
    pub fn new() -> Self {
        Self::with_digest_prefix(DEFAULT_DIGEST_PREFIX)
    }

    pub fn with_digest_prefix(digest_prefix: usize) -> Self {
        Self {
            visited: Mutex::new(HashSet::new()),
            digests: Mutex::new(HashSet::new()),
            fingerprints: Mutex::new(HashSet::new()),
            digest_prefix: digest_prefix.max(1),
        }
    }

    /// Claim a URL for fetching. Returns false if it was already claimed.
    pub fn claim_url(&self, url: &str) -> bool {
        let key = normalize_url(url);
        lock(&self.visited).insert(key)
    }

    pub fn is_visited(&self, url: &str) -> bool {
        lock(&self.visited).contains(&normalize_url(url))
    }

    /// Record a fetched body. Returns false if an identical prefix was seen.
    pub fn record_content(&self, content: &str) -> bool {
        let digest = content_digest(content, self.digest_prefix);
        lock(&self.digests).insert(digest)
    }

    /// Record a config fingerprint. Returns false if it was already counted.
    pub fn record_fingerprint(&self, fingerprint: &str) -> bool {
        lock(&self.fingerprints).insert(fingerprint.to_string())
    }

    pub fn counts(&self) -> LedgerCounts {
        LedgerCounts {
            visited: lock(&self.visited).len(),
            digests: lock(&self.digests).len(),
            fingerprints: lock(&self.fingerprints).len(),
        }
    }
}

impl Default for DedupLedger {
    fn default() -> Self {
        Self::new()
    }
}

// Set inserts cannot leave a set half-updated, so poisoning is ignored.
fn lock<T>(mutex: &Mutex<T>) -> std::sync::MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}
