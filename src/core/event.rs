//! Lifecycle events delivered by a host, and the interface for subscribing to them.

use std::future::Future;

use futures::{FutureExt, future::LocalBoxFuture};

use super::{CacheError, FetchError, ManifestError, Request, Response};

/* -------------------------------------------------------------------------- */
/*                                   Errors                                   */
/* -------------------------------------------------------------------------- */

/// Why an install did not complete.
#[derive(Debug, thiserror::Error)]
pub enum InstallError {
    #[error(transparent)]
    Manifest(#[from] ManifestError),
    #[error("failed to open cache \"{bucket}\": {source}")]
    Open { bucket: String, source: CacheError },
    /// At least one manifest asset was unreachable; nothing was stored.
    #[error("failed to populate cache \"{bucket}\": {source}")]
    Populate { bucket: String, source: CacheError },
}

/// Why a fetch event produced no response.
#[derive(Debug, thiserror::Error)]
pub enum RespondError {
    /// Passed through from the network untouched.
    #[error(transparent)]
    Network(#[from] FetchError),
    #[error("cache lookup failed: {0}")]
    Cache(#[from] CacheError),
}

#[derive(Debug, PartialEq, Eq, thiserror::Error)]
pub enum EventError {
    #[error("the event has already been responded to")]
    AlreadyResponded,
}

/* -------------------------------------------------------------------------- */
/*                                   Events                                   */
/* -------------------------------------------------------------------------- */

pub type InstallWork = LocalBoxFuture<'static, Result<(), InstallError>>;
pub type ResponseWork = LocalBoxFuture<'static, Result<Response, RespondError>>;

/// Fired once when an interceptor is first installed.
#[derive(Default)]
pub struct InstallEvent {
    pending: Vec<InstallWork>,
}

impl InstallEvent {
    pub fn new() -> Self {
        Self::default()
    }

    /// Extends the event until `work` resolves. Any failure fails the install.
    pub fn wait_until(&mut self, work: impl Future<Output = Result<(), InstallError>> + 'static) {
        self.pending.push(work.boxed_local());
    }

    /// Waits for all extended work. The first failure wins.
    pub async fn settle(self) -> Result<(), InstallError> {
        futures::future::try_join_all(self.pending).await?;
        Ok(())
    }
}

/// Fired once per intercepted request.
pub struct FetchEvent {
    request: Request,
    response: Option<ResponseWork>,
}

impl FetchEvent {
    pub fn new(request: Request) -> Self {
        Self {
            request,
            response: None,
        }
    }

    pub fn request(&self) -> &Request {
        &self.request
    }

    /// Provides the response for this event. Only the first call is accepted.
    pub fn respond_with(
        &mut self,
        response: impl Future<Output = Result<Response, RespondError>> + 'static,
    ) -> Result<(), EventError> {
        if self.response.is_some() {
            return Err(EventError::AlreadyResponded);
        }
        self.response = Some(response.boxed_local());
        Ok(())
    }

    pub fn has_response(&self) -> bool {
        self.response.is_some()
    }

    /// Splits the event into its request and the registered response, if any.
    pub fn into_parts(self) -> (Request, Option<ResponseWork>) {
        (self.request, self.response)
    }
}

/* -------------------------------------------------------------------------- */
/*                                Registration                                */
/* -------------------------------------------------------------------------- */

pub type InstallHandler = Box<dyn Fn(&mut InstallEvent)>;
pub type FetchHandler = Box<dyn Fn(&mut FetchEvent)>;

/// Anything that delivers lifecycle events to subscribers.
pub trait EventSource {
    fn on_install(&mut self, handler: InstallHandler);
    fn on_fetch(&mut self, handler: FetchHandler);
}

/* -------------------------------------------------------------------------- */
/*                                    Tests                                   */
/* -------------------------------------------------------------------------- */
