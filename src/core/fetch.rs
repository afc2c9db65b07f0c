//! Fetchers are how requests reach the network.

use std::sync::Arc;

use super::{Request, Response};

#[derive(Debug, thiserror::Error)]
pub enum FetchError {
    /// The request never produced a response (connection refused, DNS, ...).
    #[error("network error: {0}")]
    Network(String),
    /// The request cannot be issued by this fetcher.
    #[error("invalid request: {0}")]
    InvalidRequest(String),
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Something that can turn a request into a response.
///
/// A reachable origin that answers with an error status still yields
/// `Ok(Response)`; only failures to get any response at all are errors.
pub trait Fetcher {
    #[allow(async_fn_in_trait)]
    async fn fetch(&self, request: &Request) -> Result<Response, FetchError>;
}

impl<F: Fetcher> Fetcher for Arc<F> {
    async fn fetch(&self, request: &Request) -> Result<Response, FetchError> {
        self.as_ref().fetch(request).await
    }
}
