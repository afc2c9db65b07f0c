use std::{str::FromStr, sync::Arc};

use offlineshelf::{
    CacheBucket, CacheStorage, DEFAULT_CACHE_NAME, InstallError, Manifest, Method, Request,
    RespondError, Response,
    backend::{MemoryCacheStorage, testing::ScriptedOrigin},
    host::LifecycleHost,
    interceptor::{CacheInterceptor, LookupScope},
};
use url::Url;

const SCOPE: &str = "http://site.domain/portfolio/";

fn url(path: &str) -> Url {
    Url::from_str(SCOPE).unwrap().join(path).unwrap()
}

fn get(path: &str) -> Request {
    Request::get(url(path))
}

/// An origin that can serve every asset of the default manifest.
fn site_origin() -> ScriptedOrigin {
    ScriptedOrigin::new()
        .with_response(url("./").as_str(), Response::ok("<html>root</html>"))
        .with_response(
            url("./index.html").as_str(),
            Response::ok("<html>index</html>").with_header("Content-Type", "text/html"),
        )
        .with_response(
            url("./portfolio_andrejorsula.js").as_str(),
            Response::ok("import init from './portfolio_andrejorsula_bg.wasm'"),
        )
        .with_response(
            url("./portfolio_andrejorsula_bg.wasm").as_str(),
            Response::ok(vec![0u8, 97, 115, 109, 1, 0, 0, 0]),
        )
}

fn setup(
    origin: ScriptedOrigin,
) -> (
    Arc<MemoryCacheStorage>,
    Arc<ScriptedOrigin>,
    LifecycleHost<ScriptedOrigin>,
) {
    let _ = env_logger::builder()
        .is_test(true)
        .filter_level(log::LevelFilter::Debug)
        .try_init();

    let storage = Arc::new(MemoryCacheStorage::new());
    let origin = Arc::new(origin);
    let mut host = LifecycleHost::new(origin.clone());
    CacheInterceptor::new(storage.clone(), origin.clone(), Url::from_str(SCOPE).unwrap())
        .register(&mut host);
    (storage, origin, host)
}

/* -------------------------------------------------------------------------- */
/*                                   Install                                  */
/* -------------------------------------------------------------------------- */

#[tokio::test]
async fn install_caches_every_manifest_asset() {
    let (storage, origin, host) = setup(site_origin());
    host.dispatch_install().await.unwrap();

    assert_eq!(origin.request_count(), 4);
    let bucket = storage.get(DEFAULT_CACHE_NAME).await.unwrap().unwrap();
    let keys: Vec<String> = bucket
        .keys()
        .await
        .unwrap()
        .iter()
        .map(|r| r.url().to_string())
        .collect();
    for path in Manifest::default().paths() {
        assert!(keys.contains(&url(path).to_string()), "{} missing", path);
    }
}

/// A missing wasm payload fails the whole install and stores nothing.
#[tokio::test]
async fn install_is_all_or_nothing() {
    let origin = site_origin().with_response(
        url("./portfolio_andrejorsula_bg.wasm").as_str(),
        Response::with_status(404),
    );
    let (storage, _, host) = setup(origin);

    let result = host.dispatch_install().await;
    assert!(matches!(result, Err(InstallError::Populate { .. })));

    let bucket = storage.open(DEFAULT_CACHE_NAME).await.unwrap();
    assert!(bucket.keys().await.unwrap().is_empty());
}

#[tokio::test]
async fn install_fails_on_unreachable_asset() {
    let origin = site_origin().with_unreachable(url("./portfolio_andrejorsula.js").as_str());
    let (storage, _, host) = setup(origin);

    assert!(host.dispatch_install().await.is_err());
    assert!(
        storage
            .match_request(&get("./index.html"), &Default::default())
            .await
            .unwrap()
            .is_none()
    );
}

/* -------------------------------------------------------------------------- */
/*                                    Fetch                                   */
/* -------------------------------------------------------------------------- */

#[tokio::test]
async fn cached_fetch_skips_network() {
    let (_, origin, host) = setup(site_origin());
    host.dispatch_install().await.unwrap();
    let after_install = origin.request_count();

    let response = host.dispatch_fetch(get("./index.html")).await.unwrap();
    assert_eq!(response.body(), b"<html>index</html>");
    assert_eq!(response.header("content-type"), Some("text/html"));

    let response = host.dispatch_fetch(get("./")).await.unwrap();
    assert_eq!(response.body(), b"<html>root</html>");

    assert_eq!(origin.request_count(), after_install);
}

/// Misses go to the network exactly once and come back untouched.
#[tokio::test]
async fn uncached_fetch_passes_through_verbatim() {
    let upstream = Response::new(
        418,
        vec![
            ("X-Teapot".to_string(), "short and stout".to_string()),
            ("Content-Type".to_string(), "text/plain".to_string()),
        ],
        b"tip me over".to_vec(),
    );
    let origin = site_origin().with_response(url("./teapot").as_str(), upstream.clone());
    let (_, origin, host) = setup(origin);
    host.dispatch_install().await.unwrap();

    let response = host.dispatch_fetch(get("./teapot")).await.unwrap();
    assert_eq!(response, upstream);
    assert_eq!(origin.requests_for(url("./teapot").as_str()), 1);
}

#[tokio::test]
async fn network_failure_propagates() {
    let origin = site_origin().with_unreachable(url("./offline").as_str());
    let (_, _, host) = setup(origin);
    host.dispatch_install().await.unwrap();

    let result = host.dispatch_fetch(get("./offline")).await;
    assert!(matches!(result, Err(RespondError::Network(_))));
}

/// Fetch never writes to the cache.
#[tokio::test]
async fn misses_are_not_stored() {
    let origin = site_origin().with_response(url("./extra.css").as_str(), Response::ok("body{}"));
    let (_, origin, host) = setup(origin);
    host.dispatch_install().await.unwrap();

    host.dispatch_fetch(get("./extra.css")).await.unwrap();
    host.dispatch_fetch(get("./extra.css")).await.unwrap();
    assert_eq!(origin.requests_for(url("./extra.css").as_str()), 2);
}

#[tokio::test]
async fn non_get_requests_go_to_network() {
    let (_, origin, host) = setup(site_origin());
    host.dispatch_install().await.unwrap();

    let head = Request::new(Method::Head, url("./index.html"));
    host.dispatch_fetch(head).await.unwrap();
    assert_eq!(origin.requests_for(url("./index.html").as_str()), 2);
}

#[tokio::test]
async fn concurrent_fetches_all_hit_cache() {
    let (_, origin, host) = setup(site_origin());
    host.dispatch_install().await.unwrap();
    let after_install = origin.request_count();

    let fetches = (0..16).map(|_| host.dispatch_fetch(get("./portfolio_andrejorsula_bg.wasm")));
    let responses = futures::future::join_all(fetches).await;

    for response in responses {
        assert_eq!(
            response.unwrap().body(),
            &[0u8, 97, 115, 109, 1, 0, 0, 0]
        );
    }
    assert_eq!(origin.request_count(), after_install);
}

/// Deleting the bucket from outside degrades to always fetching.
#[tokio::test]
async fn deleted_bucket_falls_back_to_network() {
    let (storage, origin, host) = setup(site_origin());
    host.dispatch_install().await.unwrap();

    assert!(storage.delete(DEFAULT_CACHE_NAME).await.unwrap());

    let response = host.dispatch_fetch(get("./index.html")).await.unwrap();
    assert_eq!(response.body(), b"<html>index</html>");
    assert_eq!(origin.requests_for(url("./index.html").as_str()), 2);
}

/* -------------------------------------------------------------------------- */
/*                                Lookup scope                                */
/* -------------------------------------------------------------------------- */

/// Entries left in an older bucket are still served with the default lookup,
/// but not when lookup is limited to the interceptor's own bucket.
#[tokio::test]
async fn lookup_scope() {
    let storage = Arc::new(MemoryCacheStorage::new());
    let stale = storage.open("portfolio_v0").await.unwrap();
    stale
        .put(get("./old.js"), Response::ok("stale"))
        .await
        .unwrap();

    let origin = Arc::new(site_origin().with_response(url("./old.js").as_str(), Response::ok("fresh")));
    let scope = Url::from_str(SCOPE).unwrap();

    let all = CacheInterceptor::new(storage.clone(), origin.clone(), scope.clone());
    all.install().await.unwrap();
    let response = all.respond(get("./old.js")).await.unwrap();
    assert_eq!(response.body(), b"stale");

    let named = all.clone().with_lookup(LookupScope::Named);
    let response = named.respond(get("./old.js")).await.unwrap();
    assert_eq!(response.body(), b"fresh");
}

#[tokio::test]
async fn custom_manifest_and_name() {
    let storage = Arc::new(MemoryCacheStorage::new());
    let origin = Arc::new(
        ScriptedOrigin::new().with_response(url("./app.js").as_str(), Response::ok("app")),
    );
    let interceptor =
        CacheInterceptor::new(storage.clone(), origin.clone(), Url::from_str(SCOPE).unwrap())
            .with_cache_name("shell-v2")
            .with_manifest(Manifest::new(["./app.js"]));

    interceptor.install().await.unwrap();
    assert!(storage.has("shell-v2").await.unwrap());
    assert!(!storage.has(DEFAULT_CACHE_NAME).await.unwrap());

    interceptor.respond(get("./app.js")).await.unwrap();
    assert_eq!(origin.request_count(), 1);
}

/// A second interceptor on the same host is shadowed by the first.
#[tokio::test]
async fn first_registered_interceptor_answers() {
    let storage = Arc::new(MemoryCacheStorage::new());
    let origin = Arc::new(
        ScriptedOrigin::new()
            .with_response(url("./a.js").as_str(), Response::ok("a"))
            .with_response(url("./b.js").as_str(), Response::ok("b")),
    );
    let scope = Url::from_str(SCOPE).unwrap();
    let mut host = LifecycleHost::new(origin.clone());
    CacheInterceptor::new(storage.clone(), origin.clone(), scope.clone())
        .with_cache_name("first")
        .with_manifest(Manifest::new(["./a.js"]))
        .with_lookup(LookupScope::Named)
        .register(&mut host);
    CacheInterceptor::new(storage.clone(), origin.clone(), scope)
        .with_cache_name("second")
        .with_manifest(Manifest::new(["./b.js"]))
        .with_lookup(LookupScope::Named)
        .register(&mut host);

    host.dispatch_install().await.unwrap();
    assert!(storage.has("first").await.unwrap());
    assert!(storage.has("second").await.unwrap());
    let after_install = origin.request_count();

    // Only in the second bucket, so the first interceptor goes to the network
    let response = host.dispatch_fetch(get("./b.js")).await.unwrap();
    assert_eq!(response.body(), b"b");
    assert_eq!(origin.request_count(), after_install + 1);
}
