//! Test doubles for the network side.

use std::{
    collections::{HashMap, HashSet},
    str::FromStr,
    sync::Mutex,
};

use log::debug;
use url::Url;

use crate::{FetchError, Fetcher, Request, Response};

/// An origin that answers from a fixed script and remembers what it was asked.
///
/// URLs without a scripted response answer 404. URLs marked unreachable fail
/// with a network error.
#[derive(Default)]
pub struct ScriptedOrigin {
    responses: HashMap<String, Response>,
    unreachable: HashSet<String>,
    log: Mutex<Vec<Request>>,
}

fn normalize(url: &str) -> String {
    match Url::from_str(url) {
        Ok(mut v) => {
            v.set_fragment(None);
            v.to_string()
        }
        Err(_) => url.to_string(),
    }
}

impl ScriptedOrigin {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_response(mut self, url: &str, response: Response) -> Self {
        self.responses.insert(normalize(url), response);
        self
    }

    pub fn with_unreachable(mut self, url: &str) -> Self {
        self.unreachable.insert(normalize(url));
        self
    }

    /// Every request fetched so far, in order.
    pub fn requests(&self) -> Vec<Request> {
        match self.log.lock() {
            Ok(log) => log.clone(),
            Err(poisoned) => poisoned.into_inner().clone(),
        }
    }

    pub fn request_count(&self) -> usize {
        self.requests().len()
    }

    pub fn requests_for(&self, url: &str) -> usize {
        let url = normalize(url);
        self.requests()
            .iter()
            .filter(|r| r.cache_key(false) == url)
            .count()
    }
}

impl Fetcher for ScriptedOrigin {
    async fn fetch(&self, request: &Request) -> Result<Response, FetchError> {
        match self.log.lock() {
            Ok(mut log) => log.push(request.clone()),
            Err(poisoned) => poisoned.into_inner().push(request.clone()),
        }

        let key = request.cache_key(false);
        debug!("Scripted origin fetching {}", key);
        if self.unreachable.contains(&key) {
            return Err(FetchError::Network(format!("{} is unreachable", key)));
        }
        Ok(self
            .responses
            .get(&key)
            .cloned()
            .unwrap_or_else(|| Response::with_status(404)))
    }
}
