//! An in-process lifecycle host.
//!
//! It plays the part a browser plays for a service worker: handlers subscribe
//! through [`EventSource`], and the host fires install and fetch events at them.

use std::sync::Arc;

use log::debug;

use crate::{
    EventSource, FetchEvent, FetchHandler, Fetcher, InstallError, InstallEvent, InstallHandler,
    Request, RespondError, Response,
};

pub struct LifecycleHost<F: Fetcher> {
    network: Arc<F>,
    install_handlers: Vec<InstallHandler>,
    fetch_handlers: Vec<FetchHandler>,
}

impl<F: Fetcher> LifecycleHost<F> {
    /// Creates a host with no subscribers. `network` serves any fetch nobody answers.
    pub fn new(network: Arc<F>) -> Self {
        Self {
            network,
            install_handlers: Vec::new(),
            fetch_handlers: Vec::new(),
        }
    }

    /// Fires the install event and waits for every piece of work it was extended with.
    pub async fn dispatch_install(&self) -> Result<(), InstallError> {
        let mut event = InstallEvent::new();
        for handler in &self.install_handlers {
            handler(&mut event);
        }
        event.settle().await
    }

    /// Fires a fetch event and resolves it exactly once.
    ///
    /// If no handler responded, the request goes to the network as-is.
    pub async fn dispatch_fetch(&self, request: Request) -> Result<Response, RespondError> {
        let mut event = FetchEvent::new(request);
        for handler in &self.fetch_handlers {
            handler(&mut event);
        }

        match event.into_parts() {
            (_, Some(response)) => response.await,
            (request, None) => {
                debug!("No handler responded to {}; using the network", request.url());
                Ok(self.network.fetch(&request).await?)
            }
        }
    }
}

impl<F: Fetcher> EventSource for LifecycleHost<F> {
    fn on_install(&mut self, handler: InstallHandler) {
        self.install_handlers.push(handler);
    }

    fn on_fetch(&mut self, handler: FetchHandler) {
        self.fetch_handlers.push(handler);
    }
}

/* -------------------------------------------------------------------------- */
/*                                    Tests                                   */
/* -------------------------------------------------------------------------- */

#[cfg(test)]
mod tests {
    use std::{str::FromStr, sync::Arc};

    use url::Url;

    use crate::{
        EventError, EventSource, FetchEvent, Request, Response, backend::testing::ScriptedOrigin,
    };

    use super::LifecycleHost;

    fn url(s: &str) -> Url {
        Url::from_str(s).unwrap()
    }

    #[tokio::test]
    async fn unanswered_fetch_uses_network() {
        let origin = Arc::new(
            ScriptedOrigin::new().with_response("http://a.domain/x", Response::ok("network")),
        );
        let host = LifecycleHost::new(origin.clone());

        let response = host
            .dispatch_fetch(Request::get(url("http://a.domain/x")))
            .await
            .unwrap();
        assert_eq!(response.body(), b"network");
        assert_eq!(origin.request_count(), 1);
    }

    /// Later handlers cannot override the first response.
    #[tokio::test]
    async fn first_response_wins() {
        let origin = Arc::new(ScriptedOrigin::new());
        let mut host = LifecycleHost::new(origin.clone());
        host.on_fetch(Box::new(|e: &mut FetchEvent| {
            e.respond_with(async { Ok(Response::ok("first")) }).unwrap();
        }));
        host.on_fetch(Box::new(|e: &mut FetchEvent| {
            assert_eq!(
                e.respond_with(async { Ok(Response::ok("second")) }),
                Err(EventError::AlreadyResponded)
            );
        }));

        let response = host
            .dispatch_fetch(Request::get(url("http://a.domain/x")))
            .await
            .unwrap();
        assert_eq!(response.body(), b"first");
        assert_eq!(origin.request_count(), 0);
    }

    #[tokio::test]
    async fn install_without_handlers() {
        let host = LifecycleHost::new(Arc::new(ScriptedOrigin::new()));
        assert!(host.dispatch_install().await.is_ok());
    }
}
