//! The catch-all route: every request becomes a fetch event.
use std::str::FromStr;

use actix_web::{HttpRequest, HttpResponse, http::StatusCode, web};
use log::{debug, error, info};
use url::Url;

use crate::{Fetcher, Method, Request, Response, frontend::routes::RoutingState, is_hop_by_hop};

/* -------------------------------------------------------------------------- */
/*                                 Conversions                                */
/* -------------------------------------------------------------------------- */

#[derive(Debug, thiserror::Error)]
pub enum TargetError {
    #[error("{url} is outside of the scope origin {scope}")]
    OutOfScope { url: Url, scope: Url },
}

/// Builds the request the interceptor sees from what Actix received.
///
/// Only the path and query of the request target are used; they are placed
/// on the scope's origin. Authority and scheme sent by the client never
/// choose the host.
pub fn to_request(
    scope: &Url,
    req: &HttpRequest,
    body: web::Bytes,
) -> Result<Request, TargetError> {
    let mut url = scope.clone();
    // `//host/x` must stay a path on our origin
    url.set_path(&format!("/{}", req.uri().path().trim_start_matches('/')));
    url.set_query(req.uri().query());
    url.set_fragment(None);
    if url.origin() != scope.origin() {
        return Err(TargetError::OutOfScope {
            url,
            scope: scope.clone(),
        });
    }

    let Ok(method) = Method::from_str(req.method().as_str());

    let mut request = Request::new(method, url);
    for (name, value) in req.headers() {
        match value.to_str() {
            Ok(v) => request = request.with_header(name.as_str(), v),
            Err(_) => debug!("Dropping non-text header {:?}", name),
        }
    }
    Ok(request.with_body(body.to_vec()))
}

/// Turns a fetched or cached response into what Actix sends back.
pub fn to_http_response(response: Response) -> HttpResponse {
    let status = StatusCode::from_u16(response.status()).unwrap_or(StatusCode::BAD_GATEWAY);
    let mut builder = HttpResponse::build(status);
    for (name, value) in response.headers() {
        // Actix frames the body itself
        if is_hop_by_hop(name) || name.eq_ignore_ascii_case("content-length") {
            continue;
        }
        builder.append_header((name.as_str(), value.as_str()));
    }
    builder.body(response.into_body())
}

/* -------------------------------------------------------------------------- */
/*                                    Route                                   */
/* -------------------------------------------------------------------------- */

pub async fn intercept<F: Fetcher + 'static>(
    data: web::Data<RoutingState<F>>,
    req: HttpRequest,
    body: web::Bytes,
) -> HttpResponse {
    let request = match to_request(&data.scope, &req, body) {
        Ok(v) => v,
        Err(e) => {
            error!("Failed to build request for {}: {}", req.uri(), e);
            return HttpResponse::BadRequest().finish();
        }
    };

    info!("{} {}", request.method(), request.url());
    let url = request.url().clone();
    match data.host.dispatch_fetch(request).await {
        Ok(response) => {
            debug!("Responding to {} with status {}", url, response.status());
            to_http_response(response)
        }
        Err(e) => {
            error!("Fetch for {} failed: {}", url, e);
            HttpResponse::BadGateway().finish()
        }
    }
}

/* -------------------------------------------------------------------------- */
/*                                    Tests                                   */
/* -------------------------------------------------------------------------- */
