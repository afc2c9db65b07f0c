//! Caches allow for fast, local storage of responses, grouped into named buckets.

use std::collections::HashSet;

use super::{FetchError, Fetcher, Method, Request, Response};

#[derive(Debug, thiserror::Error)]
pub enum CacheError {
    #[error("cache connection error: {0}")]
    ConnectionError(String),
    #[error("cache operation error: {0}")]
    OperationError(String),
    /// The request can never be stored (non-GET, non-http scheme, ...).
    #[error("unsupported request: {0}")]
    UnsupportedRequest(String),
    /// The same request appeared twice in one batch.
    #[error("duplicate request in batch: {0}")]
    DuplicateRequest(String),
    #[error("failed to fetch {url}: {source}")]
    Fetch { url: String, source: FetchError },
    #[error("{url} answered with status {status}")]
    BadStatus { url: String, status: u16 },
    #[error("corrupted cache entry: {0}")]
    Corrupted(String),
}

/// How a lookup compares a request against stored entries.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct MatchOptions {
    /// Ignore the query string on both sides.
    pub ignore_search: bool,
    /// Allow non-GET requests to match.
    pub ignore_method: bool,
}

impl MatchOptions {
    pub fn matches(&self, query: &Request, stored: &Request) -> bool {
        if !self.ignore_method && *query.method() != Method::Get {
            return false;
        }
        query.cache_key(self.ignore_search) == stored.cache_key(self.ignore_search)
    }
}

/// Checks that a request/response pair may enter a bucket.
pub fn check_storable(request: &Request, response: Option<&Response>) -> Result<(), CacheError> {
    if *request.method() != Method::Get {
        return Err(CacheError::UnsupportedRequest(format!(
            "{} {}",
            request.method(),
            request.url()
        )));
    }
    match request.url().scheme() {
        "http" | "https" => {}
        other => {
            return Err(CacheError::UnsupportedRequest(format!(
                "scheme \"{}\" in {}",
                other,
                request.url()
            )));
        }
    }
    if let Some(response) = response {
        if response.status() == 206 {
            return Err(CacheError::BadStatus {
                url: request.url().to_string(),
                status: 206,
            });
        }
    }
    Ok(())
}

/* -------------------------------------------------------------------------- */
/*                                   Buckets                                  */
/* -------------------------------------------------------------------------- */

/// A single named bucket of request/response pairs.
pub trait CacheBucket {
    /// Finds the first stored response whose request matches.
    #[allow(async_fn_in_trait)]
    async fn match_request(
        &self,
        request: &Request,
        options: &MatchOptions,
    ) -> Result<Option<Response>, CacheError>;

    /// Stores every entry, or none of them.
    ///
    /// Entries replace any existing entry with the same cache key.
    #[allow(async_fn_in_trait)]
    async fn put_all(&self, entries: Vec<(Request, Response)>) -> Result<(), CacheError>;

    /// Removes matching entries, returning whether anything was removed.
    #[allow(async_fn_in_trait)]
    async fn delete(&self, request: &Request, options: &MatchOptions) -> Result<bool, CacheError>;

    /// Every stored request, in insertion order where the backend keeps one.
    #[allow(async_fn_in_trait)]
    async fn keys(&self) -> Result<Vec<Request>, CacheError>;

    /* ------------------------- Automatic Abstractions ------------------------- */

    #[allow(async_fn_in_trait)]
    async fn put(&self, request: Request, response: Response) -> Result<(), CacheError> {
        check_storable(&request, Some(&response))?;
        self.put_all(vec![(request, response)]).await
    }

    /// Fetches every request through `network` and stores the results as one batch.
    ///
    /// Fails without storing anything if a request is unsupported or repeated,
    /// if any fetch fails, or if any response is not ok.
    #[allow(async_fn_in_trait)]
    async fn add_all<F: Fetcher>(
        &self,
        network: &F,
        requests: Vec<Request>,
    ) -> Result<(), CacheError> {
        let mut seen = HashSet::new();
        for request in &requests {
            check_storable(request, None)?;
            if !seen.insert(request.cache_key(false)) {
                return Err(CacheError::DuplicateRequest(request.url().to_string()));
            }
        }

        let responses = futures::future::try_join_all(requests.iter().map(|request| async move {
            network
                .fetch(request)
                .await
                .map_err(|source| CacheError::Fetch {
                    url: request.url().to_string(),
                    source,
                })
        }))
        .await?;

        let mut entries = Vec::with_capacity(requests.len());
        for (request, response) in requests.into_iter().zip(responses) {
            if !response.is_ok() || response.status() == 206 {
                return Err(CacheError::BadStatus {
                    url: request.url().to_string(),
                    status: response.status(),
                });
            }
            entries.push((request, response));
        }

        self.put_all(entries).await
    }

    #[allow(async_fn_in_trait)]
    async fn add<F: Fetcher>(&self, network: &F, request: Request) -> Result<(), CacheError> {
        self.add_all(network, vec![request]).await
    }
}

/* -------------------------------------------------------------------------- */
/*                                   Storage                                  */
/* -------------------------------------------------------------------------- */

/// The store that owns every bucket.
pub trait CacheStorage {
    type Bucket: CacheBucket;

    /// Opens a bucket, creating it if it doesn't exist yet.
    #[allow(async_fn_in_trait)]
    async fn open(&self, name: &str) -> Result<Self::Bucket, CacheError>;

    /// Opens a bucket only if it already exists.
    #[allow(async_fn_in_trait)]
    async fn get(&self, name: &str) -> Result<Option<Self::Bucket>, CacheError>;

    #[allow(async_fn_in_trait)]
    async fn delete(&self, name: &str) -> Result<bool, CacheError>;

    /// Names of all buckets, oldest first.
    #[allow(async_fn_in_trait)]
    async fn keys(&self) -> Result<Vec<String>, CacheError>;

    /* ------------------------- Automatic Abstractions ------------------------- */

    #[allow(async_fn_in_trait)]
    async fn has(&self, name: &str) -> Result<bool, CacheError> {
        Ok(self.get(name).await?.is_some())
    }

    /// Searches every bucket, oldest first, and returns the first match.
    #[allow(async_fn_in_trait)]
    async fn match_request(
        &self,
        request: &Request,
        options: &MatchOptions,
    ) -> Result<Option<Response>, CacheError> {
        for name in self.keys().await? {
            // A bucket may vanish between listing and opening
            if let Some(bucket) = self.get(&name).await? {
                if let Some(response) = bucket.match_request(request, options).await? {
                    return Ok(Some(response));
                }
            }
        }
        Ok(None)
    }

    /// Searches a single bucket. A missing bucket is a miss.
    #[allow(async_fn_in_trait)]
    async fn match_in(
        &self,
        name: &str,
        request: &Request,
        options: &MatchOptions,
    ) -> Result<Option<Response>, CacheError> {
        match self.get(name).await? {
            Some(bucket) => bucket.match_request(request, options).await,
            None => Ok(None),
        }
    }
}
