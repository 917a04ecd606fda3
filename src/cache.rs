//! Result cache for OCR/vision output, keyed by request fingerprint.

use crate::ocr::{OcrResult, ProviderConfig};
use crate::request::VisionRequest;
use lru::LruCache;
use sha2::{Digest, Sha256};
use std::fmt;
use std::num::NonZeroUsize;
use std::sync::{Mutex, PoisonError};
use tracing::debug;

/// Hex SHA-256 over the normalized fields that make two requests equivalent.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct CacheKey(String);

impl CacheKey {
    /// `source_identity` is a stable description of the source content
    /// (see `vision::source_identity`).
    pub fn derive(
        source_identity: &str,
        page: u32,
        index: Option<u32>,
        provider: &ProviderConfig,
    ) -> Self {
        let mut hasher = Sha256::new();
        // Length-prefixed fields so adjacent values cannot run together.
        let mut field = |name: &str, value: &str| {
            hasher.update(name.as_bytes());
            hasher.update((value.len() as u64).to_le_bytes());
            hasher.update(value.as_bytes());
        };
        field("source", source_identity);
        field("page", &page.to_string());
        field("index", &index.map(|i| i.to_string()).unwrap_or_default());
        field("provider", provider.kind.as_str());
        field("model", provider.effective_model());
        field("prompt", provider.effective_prompt());
        Self(format!("{:x}", hasher.finalize()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for CacheKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Store of previously computed results. Implementations must not block on network I/O.
pub trait ResultCache: Send + Sync {
    fn lookup(&self, key: &CacheKey) -> Option<OcrResult>;

    /// Inserting an existing key overwrites it; values for equal keys are equal.
    fn insert(&self, key: CacheKey, result: OcrResult);

    fn should_use(&self, request: &VisionRequest) -> bool {
        request.use_cache
    }
}

/// In-process LRU cache. `None` capacity means unbounded.
pub struct MemoryResultCache {
    entries: Mutex<LruCache<CacheKey, OcrResult>>,
}

impl MemoryResultCache {
    pub fn new(capacity: Option<NonZeroUsize>) -> Self {
        let entries = match capacity {
            Some(cap) => LruCache::new(cap),
            None => LruCache::unbounded(),
        };
        Self {
            entries: Mutex::new(entries),
        }
    }

    pub fn unbounded() -> Self {
        Self::new(None)
    }

    pub fn len(&self) -> usize {
        self.entries.lock().unwrap_or_else(PoisonError::into_inner).len()
    }
}

impl ResultCache for MemoryResultCache {
    fn lookup(&self, key: &CacheKey) -> Option<OcrResult> {
        let mut entries = self.entries.lock().unwrap_or_else(PoisonError::into_inner);
        entries.get(key).cloned()
    }

    fn insert(&self, key: CacheKey, result: OcrResult) {
        let mut entries = self.entries.lock().unwrap_or_else(PoisonError::into_inner);
        debug!("ResultCache: storing {} ({} chars)", key, result.text.len());
        entries.put(key, result);
    }
}
