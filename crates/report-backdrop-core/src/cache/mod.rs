use moka::future::Cache;
use std::sync::Arc;
use tracing::debug;

use crate::config::CacheConfig;
use crate::error::Result;
use crate::pdf::BackgroundPage;
use crate::rules::Background;

/// In-memory cache of decoded backgrounds, keyed by content hash.
///
/// The same letterhead is usually shared by many reports and companies, so
/// it is parsed once and reused until evicted.
#[derive(Clone)]
pub struct BackgroundCache {
    cache: Cache<String, Arc<BackgroundPage>>,
}

impl BackgroundCache {
    pub fn new(config: &CacheConfig) -> Self {
        Self {
            cache: Cache::builder().max_capacity(config.max_entries).build(),
        }
    }

    /// Return the decoded background, decoding and caching it on a miss.
    pub async fn get_or_decode(&self, background: &Background) -> Result<Arc<BackgroundPage>> {
        let key = background.content_id();

        if let Some(page) = self.cache.get(&key).await {
            debug!("Background cache hit: {}", key);
            return Ok(page);
        }

        let page = Arc::new(BackgroundPage::decode(background)?);
        self.cache.insert(key, Arc::clone(&page)).await;
        Ok(page)
    }

    pub fn contains(&self, background: &Background) -> bool {
        self.cache.contains_key(&background.content_id())
    }

    /// Approximate number of cached backgrounds.
    pub async fn entry_count(&self) -> u64 {
        self.cache.run_pending_tasks().await;
        self.cache.entry_count()
    }
}

impl std::fmt::Debug for BackgroundCache {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BackgroundCache")
            .field("entries", &self.cache.entry_count())
            .finish()
    }
}
