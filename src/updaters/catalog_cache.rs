use chrono::{DateTime, Duration, Utc};
use std::sync::Arc;

use crate::utils::AppResult;

/// A fetched catalog and when it was fetched. Replaced wholesale on refresh.
#[derive(Debug)]
pub struct CatalogCache<T> {
    pub entries: Arc<T>,
    pub fetched_at: DateTime<Utc>,
}

impl<T> Clone for CatalogCache<T> {
    fn clone(&self) -> Self {
        Self {
            entries: Arc::clone(&self.entries),
            fetched_at: self.fetched_at,
        }
    }
}

impl<T> CatalogCache<T> {
    pub fn new(entries: T, fetched_at: DateTime<Utc>) -> Self {
        Self {
            entries: Arc::new(entries),
            fetched_at,
        }
    }

    pub fn age(&self, now: DateTime<Utc>) -> Duration {
        now - self.fetched_at
    }
}

/// True when the cache is missing or at least `ttl` old.
pub fn needs_refresh<T>(cache: Option<&CatalogCache<T>>, now: DateTime<Utc>, ttl: Duration) -> bool {
    match cache {
        Some(c) => c.age(now) >= ttl,
        None => true,
    }
}

/// Fold a fetch result into the cache. A failed refetch keeps the stale
/// cache if one exists; only a failure with nothing cached is an error.
pub fn settle<T>(
    cached: Option<CatalogCache<T>>,
    fetched: AppResult<T>,
    now: DateTime<Utc>,
) -> AppResult<CatalogCache<T>> {
    match (fetched, cached) {
        (Ok(entries), _) => Ok(CatalogCache::new(entries, now)),
        (Err(e), Some(stale)) => {
            log::warn!(
                "Catalog refresh failed, using cache from {}s ago: {}",
                stale.age(now).num_seconds(),
                e
            );
            Ok(stale)
        }
        (Err(e), None) => Err(e),
    }
}
