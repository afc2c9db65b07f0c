//! Offline-first caching for static sites.
//!
//! A [`interceptor::CacheInterceptor`] pre-populates a cache bucket with a
//! site's shell when installed, then answers every request from that cache
//! when it can and from the network when it can't. It subscribes to a host's
//! lifecycle events through [`EventSource`]; [`host::LifecycleHost`] is the
//! host used by the bundled HTTP front.

mod core;
pub use crate::core::*;

pub mod backend;
pub mod conf;
pub mod frontend;
pub mod host;
pub mod interceptor;
