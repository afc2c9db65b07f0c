//! The cache interceptor: pre-populates a bucket on install, answers fetches from it.

use std::sync::Arc;

use log::{debug, info};
use serde::{Deserialize, Serialize};
use url::Url;

use crate::{
    CacheBucket, CacheStorage, DEFAULT_CACHE_NAME, EventSource, FetchEvent, Fetcher, InstallError,
    InstallEvent, Manifest, MatchOptions, Request, RespondError, Response, conf::ServerConfig,
};

/// Which buckets a fetch is looked up in.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum LookupScope {
    /// Every bucket in the store, oldest first.
    #[default]
    #[serde(rename = "all")]
    AllBuckets,
    /// Only the bucket this interceptor installs into.
    #[serde(rename = "named")]
    Named,
}

pub struct CacheInterceptor<S: CacheStorage, F: Fetcher> {
    storage: Arc<S>,
    network: Arc<F>,
    scope: Url,
    cache_name: String,
    manifest: Arc<Manifest>,
    lookup: LookupScope,
}

// Derive would require S: Clone and F: Clone
impl<S: CacheStorage, F: Fetcher> Clone for CacheInterceptor<S, F> {
    fn clone(&self) -> Self {
        Self {
            storage: self.storage.clone(),
            network: self.network.clone(),
            scope: self.scope.clone(),
            cache_name: self.cache_name.clone(),
            manifest: self.manifest.clone(),
            lookup: self.lookup,
        }
    }
}

impl<S: CacheStorage, F: Fetcher> CacheInterceptor<S, F> {
    /// Creates an interceptor with the default cache name and manifest.
    ///
    /// # Arguments
    ///
    /// - `storage` - The cache store buckets live in.
    /// - `network` - Where cache misses and install fetches go.
    /// - `scope` - The URL manifest paths are relative to.
    pub fn new(storage: Arc<S>, network: Arc<F>, scope: Url) -> Self {
        Self {
            storage,
            network,
            scope,
            cache_name: DEFAULT_CACHE_NAME.to_string(),
            manifest: Arc::new(Manifest::default()),
            lookup: LookupScope::default(),
        }
    }

    /// Creates an interceptor with the cache name, manifest and lookup scope
    /// from configuration.
    pub fn from_config(config: &ServerConfig, storage: Arc<S>, network: Arc<F>) -> Self {
        Self::new(storage, network, config.scope.url.clone())
            .with_cache_name(&config.cache.name)
            .with_manifest(config.manifest())
            .with_lookup(config.cache.lookup)
    }

    pub fn with_cache_name(mut self, name: &str) -> Self {
        self.cache_name = name.to_string();
        self
    }

    pub fn with_manifest(mut self, manifest: Manifest) -> Self {
        self.manifest = Arc::new(manifest);
        self
    }

    pub fn with_lookup(mut self, lookup: LookupScope) -> Self {
        self.lookup = lookup;
        self
    }

    pub fn cache_name(&self) -> &str {
        &self.cache_name
    }

    pub fn manifest(&self) -> &Manifest {
        &self.manifest
    }

    pub fn scope(&self) -> &Url {
        &self.scope
    }

    /* -------------------------------- Reactions ------------------------------- */

    /// Opens the bucket and stores every manifest asset in it as one batch.
    pub async fn install(&self) -> Result<(), InstallError> {
        let requests = self.manifest.requests(&self.scope)?;

        let bucket = self
            .storage
            .open(&self.cache_name)
            .await
            .map_err(|source| InstallError::Open {
                bucket: self.cache_name.clone(),
                source,
            })?;

        info!(
            "Installing {} assets into cache \"{}\"...",
            requests.len(),
            self.cache_name
        );
        bucket
            .add_all(self.network.as_ref(), requests)
            .await
            .map_err(|source| InstallError::Populate {
                bucket: self.cache_name.clone(),
                source,
            })?;
        info!("Cache \"{}\" installed", self.cache_name);

        Ok(())
    }

    /// Answers from the cache if possible, otherwise from the network.
    pub async fn respond(&self, request: Request) -> Result<Response, RespondError> {
        let options = MatchOptions::default();
        let cached = match self.lookup {
            LookupScope::AllBuckets => self.storage.match_request(&request, &options).await?,
            LookupScope::Named => {
                self.storage
                    .match_in(&self.cache_name, &request, &options)
                    .await?
            }
        };

        match cached {
            Some(response) => {
                debug!("Cache hit: {}", request.url());
                Ok(response)
            }
            None => {
                debug!("Cache miss (fetching from network): {}", request.url());
                Ok(self.network.fetch(&request).await?)
            }
        }
    }
}

impl<S: CacheStorage + 'static, F: Fetcher + 'static> CacheInterceptor<S, F> {
    /// Subscribes one install reaction and one fetch reaction to `source`.
    pub fn register(&self, source: &mut impl EventSource) {
        let this = self.clone();
        source.on_install(Box::new(move |event: &mut InstallEvent| {
            let this = this.clone();
            event.wait_until(async move { this.install().await });
        }));

        let this = self.clone();
        source.on_fetch(Box::new(move |event: &mut FetchEvent| {
            let name = this.cache_name.clone();
            let request = event.request().clone();
            let url = request.url().clone();
            let this = this.clone();
            if let Err(e) = event.respond_with(async move { this.respond(request).await }) {
                debug!("Cache \"{}\" not answering {}: {}", name, url, e);
            }
        }));
    }
}
