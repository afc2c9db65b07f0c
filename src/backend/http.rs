//! Forwards requests to an upstream HTTP server.
//!
//! Requests under the scope are rebased onto the upstream URL, so a site
//! published at `https://pages.domain/site/` can be intercepted at
//! `http://localhost:8080/`. Requests outside the scope are refused.
//!
//! Redirects are not followed; the client sees the upstream's 3xx as-is.

use log::{debug, error};
use reqwest::header::{HeaderName, HeaderValue};
use url::Url;

use crate::{FetchError, Fetcher, Request, Response, is_hop_by_hop};

pub struct HttpFetcher {
    client: reqwest::Client,
    scope: Url,
    upstream: Url,
}

impl HttpFetcher {
    pub fn new(scope: Url, upstream: Url) -> Result<Self, FetchError> {
        let client = reqwest::Client::builder()
            .user_agent(concat!(env!("CARGO_PKG_NAME"), "/", env!("CARGO_PKG_VERSION")))
            .redirect(reqwest::redirect::Policy::none())
            .build()
            .map_err(|e| FetchError::Network(e.to_string()))?;
        Ok(Self {
            client,
            scope,
            upstream,
        })
    }

    /// Where a request actually goes.
    pub fn target(&self, request: &Request) -> Result<Url, FetchError> {
        let relative = request.path_in_scope(&self.scope).ok_or_else(|| {
            FetchError::InvalidRequest(format!(
                "{} is outside of the origin scope {}",
                request.url(),
                self.scope
            ))
        })?;
        // Keep the path relative so it can never name another host or scheme
        let relative = format!("./{}", relative.trim_start_matches('/'));
        let mut target = self
            .upstream
            .join(&relative)
            .map_err(|e| FetchError::InvalidRequest(e.to_string()))?;
        target.set_query(request.url().query());
        Ok(target)
    }
}

impl Fetcher for HttpFetcher {
    async fn fetch(&self, request: &Request) -> Result<Response, FetchError> {
        let target = self.target(request)?;
        let method = reqwest::Method::from_bytes(request.method().as_str().as_bytes())
            .map_err(|e| FetchError::InvalidRequest(e.to_string()))?;
        debug!("Forwarding {} {} to {}", method, request.url(), target);

        let mut builder = self.client.request(method, target.clone());
        for (name, value) in request.headers() {
            if name.eq_ignore_ascii_case("host") || is_hop_by_hop(name) {
                continue;
            }
            match (
                HeaderName::from_bytes(name.as_bytes()),
                HeaderValue::from_str(value),
            ) {
                (Ok(n), Ok(v)) => builder = builder.header(n, v),
                _ => debug!("Dropping malformed header {:?}", name),
            }
        }
        if !request.body().is_empty() {
            builder = builder.body(request.body().to_vec());
        }

        let upstream = builder.send().await.map_err(|e| {
            error!("Failed to reach upstream {}: {}", target, e);
            FetchError::Network(e.to_string())
        })?;

        let status = upstream.status().as_u16();
        let headers = upstream
            .headers()
            .iter()
            .filter(|(name, _)| !is_hop_by_hop(name.as_str()))
            .map(|(name, value)| {
                (
                    name.as_str().to_string(),
                    String::from_utf8_lossy(value.as_bytes()).to_string(),
                )
            })
            .collect();
        let body = upstream
            .bytes()
            .await
            .map_err(|e| FetchError::Network(e.to_string()))?;

        Ok(Response::new(status, headers, body.to_vec()))
    }
}

/* -------------------------------------------------------------------------- */
/*                                    Tests                                   */
/* -------------------------------------------------------------------------- */
