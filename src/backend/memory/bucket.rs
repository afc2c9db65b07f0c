//! In-memory cache buckets.
//!
//! Entries live as long as the bucket handle or the store that owns it.

use std::sync::Arc;

use log::debug;
use tokio::sync::RwLock;

use crate::{CacheBucket, CacheError, MatchOptions, Request, Response, check_storable};

/// A bucket of request/response pairs kept in memory, in insertion order.
///
/// Clones share the same entries.
#[derive(Clone, Default)]
pub struct MemoryBucket {
    entries: Arc<RwLock<Vec<(Request, Response)>>>,
}

impl MemoryBucket {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn len(&self) -> usize {
        self.entries.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.entries.read().await.is_empty()
    }
}

impl CacheBucket for MemoryBucket {
    async fn match_request(
        &self,
        request: &Request,
        options: &MatchOptions,
    ) -> Result<Option<Response>, CacheError> {
        let entries = self.entries.read().await;
        Ok(entries
            .iter()
            .find(|(stored, _)| options.matches(request, stored))
            .map(|(_, response)| response.clone()))
    }

    async fn put_all(&self, batch: Vec<(Request, Response)>) -> Result<(), CacheError> {
        for (request, response) in &batch {
            check_storable(request, Some(response))?;
        }

        let mut entries = self.entries.write().await;
        for (request, response) in batch {
            let key = request.cache_key(false);
            entries.retain(|(stored, _)| stored.cache_key(false) != key);
            debug!("Storing {} in memory bucket", key);
            entries.push((request, response));
        }
        Ok(())
    }

    async fn delete(&self, request: &Request, options: &MatchOptions) -> Result<bool, CacheError> {
        let mut entries = self.entries.write().await;
        let before = entries.len();
        entries.retain(|(stored, _)| !options.matches(request, stored));
        Ok(entries.len() != before)
    }

    async fn keys(&self) -> Result<Vec<Request>, CacheError> {
        Ok(self
            .entries
            .read()
            .await
            .iter()
            .map(|(request, _)| request.clone())
            .collect())
    }
}

/* -------------------------------------------------------------------------- */
/*                                    Tests                                   */
/* -------------------------------------------------------------------------- */
