use std::fmt;

use axum::body::Bytes;
use moka::{policy::EvictionPolicy, sync::Cache};
use tracing::debug;

/// Cache key of a published figure, rendered as `<timestamp>/<filename>`.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct FigureKey {
    timestamp: i64,
    filename: String,
}

impl FigureKey {
    pub fn new(timestamp: i64, filename: impl Into<String>) -> Self {
        Self {
            timestamp,
            filename: filename.into(),
        }
    }
}

impl fmt::Display for FigureKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.timestamp, self.filename)
    }
}

/// In-process store for figures pulled out of extracted documents.
///
/// Entries are weighted by their byte length and evicted least-recently-used
/// once `max_bytes` is exceeded. A figure bigger than the whole budget is
/// dropped right after insertion. Publishing the same filename twice within one
/// second replaces the earlier bytes.
pub struct FigureStore {
    cache: Cache<FigureKey, Bytes>,
}

impl FigureStore {
    pub fn new(max_bytes: u64) -> Self {
        let cache = Cache::builder()
            .max_capacity(max_bytes)
            .weigher(|_key: &FigureKey, content: &Bytes| {
                u32::try_from(content.len()).unwrap_or(u32::MAX)
            })
            .eviction_policy(EvictionPolicy::lru())
            .build();
        Self { cache }
    }

    pub fn publish(&self, filename: &str, content: Bytes) -> FigureKey {
        self.publish_at(now_secs(), filename, content)
    }

    pub fn publish_at(&self, timestamp: i64, filename: &str, content: Bytes) -> FigureKey {
        let key = FigureKey::new(timestamp, filename);
        debug!(key = %key, size = content.len(), "storing figure");
        self.cache.insert(key.clone(), content);
        key
    }

    pub fn get(&self, key: &FigureKey) -> Option<Bytes> {
        self.cache.get(key)
    }

    pub fn contains(&self, key: &FigureKey) -> bool {
        self.cache.contains_key(key)
    }
}

/// Coarse clock used to namespace figure keys.
pub fn now_secs() -> i64 {
    chrono::Utc::now().timestamp()
}
