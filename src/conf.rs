use std::{path::PathBuf, str::FromStr, sync::LazyLock};

use config::{Config, Environment, File};
use log::debug;
use serde::{Deserialize, Serialize};
use url::Url;

use crate::{DEFAULT_ASSETS, DEFAULT_CACHE_NAME, Manifest, interceptor::LookupScope};

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("failed to load configuration: {0}")]
    Load(#[from] config::ConfigError),
    #[error("{0}")]
    Invalid(String),
}

fn default_name() -> String {
    "Offlineshelf".to_string()
}

fn default_address() -> String {
    "127.0.0.1".to_string()
}

fn default_port() -> u16 {
    8080
}

/// Where the site is served when no scope is configured.
pub const DEFAULT_SCOPE_URL: &str = "http://127.0.0.1:8080/";

// Pinned by the `default_scope_parses` test
static DEFAULT_SCOPE: LazyLock<Url> = LazyLock::new(|| {
    Url::from_str(DEFAULT_SCOPE_URL).expect("DEFAULT_SCOPE_URL is an absolute URL")
});

fn default_scope_url() -> Url {
    DEFAULT_SCOPE.clone()
}

fn default_cache_name() -> String {
    DEFAULT_CACHE_NAME.to_string()
}

fn default_redis_address() -> String {
    "127.0.0.1".to_string()
}

fn default_redis_port() -> u16 {
    6379
}

fn default_redis_prefix() -> String {
    "offlineshelf".to_string()
}

fn default_origin_path() -> PathBuf {
    PathBuf::from("./dist")
}

fn default_assets() -> Vec<String> {
    DEFAULT_ASSETS.iter().map(|v| v.to_string()).collect()
}

fn default_general() -> ServerConfigGeneral {
    ServerConfigGeneral {
        name: default_name(),
        address: default_address(),
        port: default_port(),
    }
}

fn default_scope() -> ServerConfigScope {
    ServerConfigScope {
        url: default_scope_url(),
    }
}

fn default_redis() -> ServerConfigRedis {
    ServerConfigRedis {
        address: default_redis_address(),
        port: default_redis_port(),
        prefix: default_redis_prefix(),
    }
}

fn default_cache() -> ServerConfigCache {
    ServerConfigCache {
        name: default_cache_name(),
        backend: ServerConfigCacheBackend::default(),
        lookup: LookupScope::default(),
        redis: default_redis(),
    }
}

fn default_origin() -> ServerConfigOrigin {
    ServerConfigOrigin {
        r#type: ServerConfigOriginType::default(),
        path: default_origin_path(),
        url: None,
    }
}

fn default_manifest() -> ServerConfigManifest {
    ServerConfigManifest {
        assets: default_assets(),
    }
}

#[derive(Serialize, Deserialize, Debug, Clone)]
pub struct ServerConfigGeneral {
    #[serde(default = "default_name")]
    pub name: String,
    #[serde(default = "default_address")]
    pub address: String,
    #[serde(default = "default_port")]
    pub port: u16,
}

/// The public URL the site is served under. Manifest paths resolve against it.
#[derive(Serialize, Deserialize, Debug, Clone)]
pub struct ServerConfigScope {
    #[serde(default = "default_scope_url")]
    pub url: Url,
}

#[derive(Serialize, Deserialize, Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum ServerConfigCacheBackend {
    #[default]
    #[serde(rename = "memory")]
    Memory,
    #[serde(rename = "redis")]
    Redis,
}

#[derive(Serialize, Deserialize, Debug, Clone)]
pub struct ServerConfigRedis {
    #[serde(default = "default_redis_address")]
    pub address: String,
    #[serde(default = "default_redis_port")]
    pub port: u16,
    /// Namespace for every key this server writes.
    #[serde(default = "default_redis_prefix")]
    pub prefix: String,
}

#[derive(Serialize, Deserialize, Debug, Clone)]
pub struct ServerConfigCache {
    #[serde(default = "default_cache_name")]
    pub name: String,
    #[serde(default)]
    pub backend: ServerConfigCacheBackend,
    #[serde(default)]
    pub lookup: LookupScope,
    #[serde(default = "default_redis")]
    pub redis: ServerConfigRedis,
}

#[derive(Serialize, Deserialize, Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum ServerConfigOriginType {
    #[default]
    #[serde(rename = "directory")]
    Directory,
    #[serde(rename = "http")]
    Http,
}

#[derive(Serialize, Deserialize, Debug, Clone)]
pub struct ServerConfigOrigin {
    #[serde(default)]
    pub r#type: ServerConfigOriginType,
    /// Build directory, for `directory` origins.
    #[serde(default = "default_origin_path")]
    pub path: PathBuf,
    /// Upstream base URL, for `http` origins.
    pub url: Option<Url>,
}

#[derive(Serialize, Deserialize, Debug, Clone)]
pub struct ServerConfigManifest {
    #[serde(default = "default_assets")]
    pub assets: Vec<String>,
}

#[derive(Serialize, Deserialize, Debug, Clone)]
pub struct ServerConfig {
    #[serde(default = "default_general")]
    pub general: ServerConfigGeneral,
    #[serde(default = "default_scope")]
    pub scope: ServerConfigScope,
    #[serde(default = "default_cache")]
    pub cache: ServerConfigCache,
    #[serde(default = "default_origin")]
    pub origin: ServerConfigOrigin,
    #[serde(default = "default_manifest")]
    pub manifest: ServerConfigManifest,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            general: default_general(),
            scope: default_scope(),
            cache: default_cache(),
            origin: default_origin(),
            manifest: default_manifest(),
        }
    }
}

impl ServerConfig {
    /// Loads configuration from the environment, then from `file` if given.
    ///
    /// Environment variables use the `OFFLINE` prefix and `__` between
    /// sections, e.g. `OFFLINE_CACHE__BACKEND=redis`.
    pub fn load(file: Option<&str>) -> Result<Self, ConfigError> {
        let mut builder = Config::builder().add_source(
            Environment::with_prefix("OFFLINE")
                .prefix_separator("_")
                .separator("__"),
        );
        if let Some(file) = file {
            debug!("Reading configuration from {}", file);
            builder = builder.add_source(File::with_name(file));
        }

        let config: ServerConfig = builder.build()?.try_deserialize()?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.origin.r#type == ServerConfigOriginType::Http && self.origin.url.is_none() {
            return Err(ConfigError::Invalid(
                "origin.url is required for http origins".to_string(),
            ));
        }
        if self.scope.url.cannot_be_a_base() {
            return Err(ConfigError::Invalid(format!(
                "scope.url {} cannot be used as a base URL",
                self.scope.url
            )));
        }
        Ok(())
    }

    pub fn manifest(&self) -> Manifest {
        Manifest::new(self.manifest.assets.iter().cloned())
    }
}

/* -------------------------------------------------------------------------- */
/*                                    Tests                                   */
/* -------------------------------------------------------------------------- */

#[cfg(test)]
mod tests {
    use crate::{DEFAULT_CACHE_NAME, interceptor::LookupScope};

    use std::str::FromStr;

    use url::Url;

    use super::{
        DEFAULT_SCOPE_URL, ServerConfig, ServerConfigCacheBackend, ServerConfigOriginType,
    };

    #[test]
    fn default_scope_parses() {
        let url = Url::from_str(DEFAULT_SCOPE_URL).unwrap();
        assert!(!url.cannot_be_a_base());
        assert_eq!(ServerConfig::default().scope.url, url);
    }

    #[test]
    fn empty_config_uses_defaults() {
        let config: ServerConfig = toml::from_str("").unwrap();
        assert_eq!(config.general.port, 8080);
        assert_eq!(config.cache.name, DEFAULT_CACHE_NAME);
        assert_eq!(config.cache.backend, ServerConfigCacheBackend::Memory);
        assert_eq!(config.cache.lookup, LookupScope::AllBuckets);
        assert_eq!(config.origin.r#type, ServerConfigOriginType::Directory);
        assert_eq!(config.manifest().len(), 4);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn full_config() {
        let config: ServerConfig = toml::from_str(
            r#"
            [general]
            port = 9000

            [scope]
            url = "https://site.domain/portfolio/"

            [cache]
            name = "v2"
            backend = "redis"
            lookup = "named"

            [cache.redis]
            port = 6380

            [origin]
            type = "http"
            url = "https://upstream.domain/portfolio/"

            [manifest]
            assets = ["./", "./index.html"]
            "#,
        )
        .unwrap();

        assert_eq!(config.general.port, 9000);
        assert_eq!(config.general.address, "127.0.0.1");
        assert_eq!(config.cache.lookup, LookupScope::Named);
        assert_eq!(config.cache.redis.port, 6380);
        assert_eq!(config.cache.redis.prefix, "offlineshelf");
        assert_eq!(config.origin.r#type, ServerConfigOriginType::Http);
        assert_eq!(config.manifest().paths(), &["./", "./index.html"]);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn http_origin_needs_url() {
        let config: ServerConfig = toml::from_str(
            r#"
            [origin]
            type = "http"
            "#,
        )
        .unwrap();
        assert!(config.validate().is_err());
    }
}
