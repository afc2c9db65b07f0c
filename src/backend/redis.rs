//! Cache storage backed by Redis.
//!
//! Redis is a high-speed in-memory store with data durability. Keeping the
//! buckets there lets them survive restarts and be shared between instances.
//! See: <https://redis.io/> for more information about Redis itself.
//!
//! Layout, for a prefix `p`:
//! - `p:caches` - sorted set of bucket names, scored by creation order
//! - `p:caches:seq` - counter handing out those scores
//! - `p:cache:{name}:meta` - hash of cache key -> JSON request/status/headers
//! - `p:cache:{name}:body` - hash of cache key -> raw body bytes

use std::{collections::HashMap, sync::Arc};

use log::{debug, error, info};
use redis::{AsyncCommands, Client, RedisError, aio::MultiplexedConnection};
use serde::{Deserialize, Serialize};

use crate::{
    CacheBucket, CacheError, CacheStorage, MatchOptions, Method, Request, Response,
    check_storable,
};

#[derive(Serialize, Deserialize)]
struct StoredEntry {
    request: Request,
    status: u16,
    headers: Vec<(String, String)>,
}

/// Splits an entry into its hash key, JSON metadata and raw body.
fn encode_entry(
    request: Request,
    response: Response,
) -> Result<(String, String, Vec<u8>), CacheError> {
    let key = request.cache_key(false);
    let status = response.status();
    let headers = response.headers().to_vec();
    let body = response.into_body();
    let meta = serde_json::to_string(&StoredEntry {
        request,
        status,
        headers,
    })
    .map_err(|e| CacheError::OperationError(e.to_string()))?;
    Ok((key, meta, body))
}

fn decode_meta(key: &str, meta: &str) -> Result<StoredEntry, CacheError> {
    serde_json::from_str::<StoredEntry>(meta)
        .map_err(|e| CacheError::Corrupted(format!("{}: {}", key, e)))
}

fn decode_response(
    key: &str,
    entry: StoredEntry,
    body: Option<Vec<u8>>,
) -> Result<Response, CacheError> {
    match body {
        Some(body) => Ok(Response::new(entry.status, entry.headers, body)),
        None => Err(CacheError::Corrupted(format!("{}: missing body", key))),
    }
}

/// Which stored keys a delete has to touch.
#[derive(Debug, PartialEq, Eq)]
enum DeleteTarget {
    Nothing,
    /// A single key, known without reading the bucket.
    Exact(String),
    /// Every entry has to be checked against the options.
    Scan,
}

fn delete_target(request: &Request, options: &MatchOptions) -> DeleteTarget {
    if options.ignore_search || options.ignore_method {
        DeleteTarget::Scan
    } else if *request.method() != Method::Get {
        DeleteTarget::Nothing
    } else {
        DeleteTarget::Exact(request.cache_key(false))
    }
}

fn matching_keys(
    request: &Request,
    options: &MatchOptions,
    entries: &[(String, StoredEntry)],
) -> Vec<String> {
    entries
        .iter()
        .filter(|(_, entry)| options.matches(request, &entry.request))
        .map(|(key, _)| key.clone())
        .collect()
}

fn operation_error(e: RedisError) -> CacheError {
    error!("Redis cache operation failed: {}", e);
    CacheError::OperationError(e.to_string())
}

async fn connect(client: &Client) -> Result<MultiplexedConnection, CacheError> {
    debug!("Connecting to Redis...");
    client
        .get_multiplexed_async_connection()
        .await
        .map_err(|e| {
            error!("Failed to create multiplexed async Redis connection: {}", e);
            CacheError::ConnectionError(e.to_string())
        })
}

/* -------------------------------------------------------------------------- */
/*                                   Storage                                  */
/* -------------------------------------------------------------------------- */

#[derive(Clone)]
pub struct RedisCacheStorage {
    client: Arc<Client>,
    prefix: String,
}

impl RedisCacheStorage {
    pub fn new(address: &str, port: u16, prefix: &str) -> Result<Self, CacheError> {
        let address = format!("redis://{}:{}", address, port);
        match Client::open(address) {
            Ok(v) => Ok(Self {
                client: Arc::new(v),
                prefix: prefix.to_string(),
            }),
            Err(e) => {
                error!("Failed to set up Redis integration: {}", e);
                Err(CacheError::ConnectionError(e.to_string()))
            }
        }
    }

    fn names_key(&self) -> String {
        format!("{}:caches", self.prefix)
    }

    fn seq_key(&self) -> String {
        format!("{}:caches:seq", self.prefix)
    }

    fn bucket(&self, name: &str) -> RedisBucket {
        RedisBucket {
            client: self.client.clone(),
            meta_key: format!("{}:cache:{}:meta", self.prefix, name),
            body_key: format!("{}:cache:{}:body", self.prefix, name),
        }
    }
}

impl CacheStorage for RedisCacheStorage {
    type Bucket = RedisBucket;

    async fn open(&self, name: &str) -> Result<RedisBucket, CacheError> {
        let mut conn = connect(&self.client).await?;
        let score: Option<f64> = conn
            .zscore(self.names_key(), name)
            .await
            .map_err(operation_error)?;
        if score.is_none() {
            let seq: i64 = conn
                .incr(self.seq_key(), 1)
                .await
                .map_err(operation_error)?;
            // NX: a concurrent open may have won; its score stands
            let added: i64 = redis::cmd("ZADD")
                .arg(self.names_key())
                .arg("NX")
                .arg(seq)
                .arg(name)
                .query_async(&mut conn)
                .await
                .map_err(operation_error)?;
            if added > 0 {
                info!("Created Redis cache \"{}\"", name);
            }
        }
        Ok(self.bucket(name))
    }

    async fn get(&self, name: &str) -> Result<Option<RedisBucket>, CacheError> {
        let mut conn = connect(&self.client).await?;
        let score: Option<f64> = conn
            .zscore(self.names_key(), name)
            .await
            .map_err(operation_error)?;
        Ok(score.map(|_| self.bucket(name)))
    }

    async fn delete(&self, name: &str) -> Result<bool, CacheError> {
        let mut conn = connect(&self.client).await?;
        let bucket = self.bucket(name);
        let (removed,): (i64,) = redis::pipe()
            .atomic()
            .zrem(self.names_key(), name)
            .del(&bucket.meta_key)
            .ignore()
            .del(&bucket.body_key)
            .ignore()
            .query_async(&mut conn)
            .await
            .map_err(operation_error)?;
        if removed > 0 {
            info!("Deleted Redis cache \"{}\"", name);
        }
        Ok(removed > 0)
    }

    async fn keys(&self) -> Result<Vec<String>, CacheError> {
        let mut conn = connect(&self.client).await?;
        conn.zrange(self.names_key(), 0, -1)
            .await
            .map_err(operation_error)
    }
}

/* -------------------------------------------------------------------------- */
/*                                   Buckets                                  */
/* -------------------------------------------------------------------------- */

#[derive(Clone)]
pub struct RedisBucket {
    client: Arc<Client>,
    meta_key: String,
    body_key: String,
}

impl RedisBucket {
    async fn entries(
        &self,
        conn: &mut MultiplexedConnection,
    ) -> Result<Vec<(String, StoredEntry)>, CacheError> {
        let all: HashMap<String, String> = conn
            .hgetall(&self.meta_key)
            .await
            .map_err(operation_error)?;
        let mut entries = all
            .into_iter()
            .map(|(key, meta)| decode_meta(&key, &meta).map(|entry| (key, entry)))
            .collect::<Result<Vec<_>, _>>()?;
        entries.sort_by(|a, b| a.0.cmp(&b.0));
        Ok(entries)
    }

    async fn load(
        &self,
        conn: &mut MultiplexedConnection,
        key: &str,
        entry: StoredEntry,
    ) -> Result<Response, CacheError> {
        let body: Option<Vec<u8>> = conn
            .hget(&self.body_key, key)
            .await
            .map_err(operation_error)?;
        decode_response(key, entry, body)
    }
}

impl CacheBucket for RedisBucket {
    async fn match_request(
        &self,
        request: &Request,
        options: &MatchOptions,
    ) -> Result<Option<Response>, CacheError> {
        if !options.ignore_method && *request.method() != Method::Get {
            return Ok(None);
        }
        let mut conn = connect(&self.client).await?;

        if !options.ignore_search {
            let key = request.cache_key(false);
            let meta: Option<String> = conn
                .hget(&self.meta_key, &key)
                .await
                .map_err(operation_error)?;
            return match meta {
                Some(meta) => {
                    let entry = decode_meta(&key, &meta)?;
                    debug!("Redis cache hit: {}", key);
                    Ok(Some(self.load(&mut conn, &key, entry).await?))
                }
                None => Ok(None),
            };
        }

        for (key, entry) in self.entries(&mut conn).await? {
            if options.matches(request, &entry.request) {
                return Ok(Some(self.load(&mut conn, &key, entry).await?));
            }
        }
        Ok(None)
    }

    async fn put_all(&self, batch: Vec<(Request, Response)>) -> Result<(), CacheError> {
        for (request, response) in &batch {
            check_storable(request, Some(response))?;
        }

        let mut pipe = redis::pipe();
        pipe.atomic();
        for (request, response) in batch {
            let (key, meta, body) = encode_entry(request, response)?;
            pipe.hset(&self.meta_key, &key, meta)
                .ignore()
                .hset(&self.body_key, &key, body)
                .ignore();
        }

        let mut conn = connect(&self.client).await?;
        pipe.query_async::<()>(&mut conn)
            .await
            .map_err(operation_error)
    }

    async fn delete(&self, request: &Request, options: &MatchOptions) -> Result<bool, CacheError> {
        let mut conn = connect(&self.client).await?;
        let keys = match delete_target(request, options) {
            DeleteTarget::Nothing => return Ok(false),
            DeleteTarget::Exact(key) => vec![key],
            DeleteTarget::Scan => {
                let entries = self.entries(&mut conn).await?;
                matching_keys(request, options, &entries)
            }
        };
        if keys.is_empty() {
            return Ok(false);
        }

        let (removed, _): (i64, i64) = redis::pipe()
            .atomic()
            .hdel(&self.meta_key, &keys)
            .hdel(&self.body_key, &keys)
            .query_async(&mut conn)
            .await
            .map_err(operation_error)?;
        Ok(removed > 0)
    }

    async fn keys(&self) -> Result<Vec<Request>, CacheError> {
        let mut conn = connect(&self.client).await?;
        Ok(self
            .entries(&mut conn)
            .await?
            .into_iter()
            .map(|(_, entry)| entry.request)
            .collect())
    }
}

/* -------------------------------------------------------------------------- */
/*                                    Tests                                   */
/* -------------------------------------------------------------------------- */
