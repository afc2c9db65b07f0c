pub mod filesystem;
#[cfg(feature = "http")]
pub mod http;
pub mod memory;
#[cfg(feature = "redis")]
pub mod redis;
pub mod testing;

use log::info;

// Export specific types
pub use filesystem::FilesystemFetcher;
#[cfg(feature = "http")]
pub use http::HttpFetcher;
pub use memory::{MemoryBucket, MemoryCacheStorage};
#[cfg(feature = "redis")]
pub use redis::{RedisBucket, RedisCacheStorage};

use crate::{
    CacheBucket, CacheError, CacheStorage, FetchError, Fetcher, MatchOptions, Request, Response,
    conf::{ServerConfig, ServerConfigCacheBackend, ServerConfigOriginType},
};

/* -------------------------------------------------------------------------- */
/*                                   Storage                                  */
/* -------------------------------------------------------------------------- */

/// The cache store selected by configuration.
pub enum StorageBackend {
    Memory(MemoryCacheStorage),
    #[cfg(feature = "redis")]
    Redis(RedisCacheStorage),
}

impl StorageBackend {
    pub fn from_config(config: &ServerConfig) -> Result<Self, CacheError> {
        match config.cache.backend {
            ServerConfigCacheBackend::Memory => {
                info!("Using in-memory cache storage");
                Ok(Self::Memory(MemoryCacheStorage::new()))
            }
            #[cfg(feature = "redis")]
            ServerConfigCacheBackend::Redis => {
                let redis = &config.cache.redis;
                info!(
                    "Using Redis cache storage at {}:{}",
                    redis.address, redis.port
                );
                Ok(Self::Redis(RedisCacheStorage::new(
                    &redis.address,
                    redis.port,
                    &redis.prefix,
                )?))
            }
            #[cfg(not(feature = "redis"))]
            ServerConfigCacheBackend::Redis => Err(CacheError::ConnectionError(
                "this build has no Redis support".to_string(),
            )),
        }
    }
}

pub enum BackendBucket {
    Memory(MemoryBucket),
    #[cfg(feature = "redis")]
    Redis(RedisBucket),
}

impl CacheBucket for BackendBucket {
    async fn match_request(
        &self,
        request: &Request,
        options: &MatchOptions,
    ) -> Result<Option<Response>, CacheError> {
        match self {
            Self::Memory(v) => v.match_request(request, options).await,
            #[cfg(feature = "redis")]
            Self::Redis(v) => v.match_request(request, options).await,
        }
    }

    async fn put_all(&self, entries: Vec<(Request, Response)>) -> Result<(), CacheError> {
        match self {
            Self::Memory(v) => v.put_all(entries).await,
            #[cfg(feature = "redis")]
            Self::Redis(v) => v.put_all(entries).await,
        }
    }

    async fn delete(&self, request: &Request, options: &MatchOptions) -> Result<bool, CacheError> {
        match self {
            Self::Memory(v) => v.delete(request, options).await,
            #[cfg(feature = "redis")]
            Self::Redis(v) => v.delete(request, options).await,
        }
    }

    async fn keys(&self) -> Result<Vec<Request>, CacheError> {
        match self {
            Self::Memory(v) => v.keys().await,
            #[cfg(feature = "redis")]
            Self::Redis(v) => v.keys().await,
        }
    }
}

impl CacheStorage for StorageBackend {
    type Bucket = BackendBucket;

    async fn open(&self, name: &str) -> Result<BackendBucket, CacheError> {
        match self {
            Self::Memory(v) => v.open(name).await.map(BackendBucket::Memory),
            #[cfg(feature = "redis")]
            Self::Redis(v) => v.open(name).await.map(BackendBucket::Redis),
        }
    }

    async fn get(&self, name: &str) -> Result<Option<BackendBucket>, CacheError> {
        match self {
            Self::Memory(v) => Ok(v.get(name).await?.map(BackendBucket::Memory)),
            #[cfg(feature = "redis")]
            Self::Redis(v) => Ok(v.get(name).await?.map(BackendBucket::Redis)),
        }
    }

    async fn delete(&self, name: &str) -> Result<bool, CacheError> {
        match self {
            Self::Memory(v) => v.delete(name).await,
            #[cfg(feature = "redis")]
            Self::Redis(v) => v.delete(name).await,
        }
    }

    async fn keys(&self) -> Result<Vec<String>, CacheError> {
        match self {
            Self::Memory(v) => v.keys().await,
            #[cfg(feature = "redis")]
            Self::Redis(v) => v.keys().await,
        }
    }
}

/* -------------------------------------------------------------------------- */
/*                                   Origins                                  */
/* -------------------------------------------------------------------------- */

/// The network side selected by configuration.
pub enum OriginFetcher {
    Directory(FilesystemFetcher),
    #[cfg(feature = "http")]
    Http(HttpFetcher),
}

impl OriginFetcher {
    pub fn from_config(config: &ServerConfig) -> Result<Self, FetchError> {
        let scope = config.scope.url.clone();
        match config.origin.r#type {
            ServerConfigOriginType::Directory => {
                info!("Serving origin from directory {:?}", config.origin.path);
                Ok(Self::Directory(FilesystemFetcher::new(
                    &config.origin.path,
                    scope,
                )?))
            }
            #[cfg(feature = "http")]
            ServerConfigOriginType::Http => match &config.origin.url {
                Some(upstream) => {
                    info!("Serving origin from upstream {}", upstream);
                    Ok(Self::Http(HttpFetcher::new(scope, upstream.clone())?))
                }
                None => Err(FetchError::InvalidRequest(
                    "http origins need an upstream url".to_string(),
                )),
            },
            #[cfg(not(feature = "http"))]
            ServerConfigOriginType::Http => Err(FetchError::InvalidRequest(
                "this build has no HTTP origin support".to_string(),
            )),
        }
    }
}

impl Fetcher for OriginFetcher {
    async fn fetch(&self, request: &Request) -> Result<Response, FetchError> {
        match self {
            Self::Directory(v) => v.fetch(request).await,
            #[cfg(feature = "http")]
            Self::Http(v) => v.fetch(request).await,
        }
    }
}
