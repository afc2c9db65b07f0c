//! In-Memory cache storage.
//!
//! Keeps every bucket in process memory. Useful for single-instance hosting
//! and for mocking.

mod bucket;

use log::info;
use tokio::sync::RwLock;

use crate::{CacheError, CacheStorage};
pub use bucket::MemoryBucket;

/// Named buckets, oldest first.
#[derive(Default)]
pub struct MemoryCacheStorage {
    buckets: RwLock<Vec<(String, MemoryBucket)>>,
}

impl MemoryCacheStorage {
    pub fn new() -> Self {
        Self::default()
    }
}

impl CacheStorage for MemoryCacheStorage {
    type Bucket = MemoryBucket;

    async fn open(&self, name: &str) -> Result<MemoryBucket, CacheError> {
        let mut buckets = self.buckets.write().await;
        if let Some((_, bucket)) = buckets.iter().find(|(n, _)| n == name) {
            return Ok(bucket.clone());
        }
        info!("Creating memory cache \"{}\"", name);
        let bucket = MemoryBucket::new();
        buckets.push((name.to_string(), bucket.clone()));
        Ok(bucket)
    }

    async fn get(&self, name: &str) -> Result<Option<MemoryBucket>, CacheError> {
        Ok(self
            .buckets
            .read()
            .await
            .iter()
            .find(|(n, _)| n == name)
            .map(|(_, bucket)| bucket.clone()))
    }

    async fn delete(&self, name: &str) -> Result<bool, CacheError> {
        let mut buckets = self.buckets.write().await;
        match buckets.iter().position(|(n, _)| n == name) {
            Some(i) => {
                buckets.remove(i);
                info!("Deleted memory cache \"{}\"", name);
                Ok(true)
            }
            None => Ok(false),
        }
    }

    async fn keys(&self) -> Result<Vec<String>, CacheError> {
        Ok(self
            .buckets
            .read()
            .await
            .iter()
            .map(|(n, _)| n.clone())
            .collect())
    }
}

/* -------------------------------------------------------------------------- */
/*                                    Tests                                   */
/* -------------------------------------------------------------------------- */
