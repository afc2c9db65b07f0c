//! Serves an origin straight from a directory, such as a site's build output.

use std::{
    io::ErrorKind,
    path::{Path, PathBuf},
};

use log::debug;
use percent_encoding::percent_decode_str;
use url::Url;

use crate::{FetchError, Fetcher, Method, Request, Response};

// Layout on disk mirrors the scope:
// - root
//   - index.html          <- {scope}/ and {scope}/index.html
//   - [...site assets...]
pub struct FilesystemFetcher {
    root: PathBuf,
    scope: Url,
}

impl FilesystemFetcher {
    pub fn new(root: impl Into<PathBuf>, scope: Url) -> Result<Self, FetchError> {
        let root = root.into();
        if !root.is_dir() {
            return Err(FetchError::InvalidRequest(format!(
                "origin directory {:?} does not exist",
                root
            )));
        }
        Ok(Self { root, scope })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Maps a scope-relative URL path onto the root. Refuses to leave the root.
    ///
    /// Segments are percent-decoded; a decoded segment may not contain a path
    /// separator or be `..`.
    fn resolve(&self, relative: &str) -> Option<PathBuf> {
        let mut path = self.root.clone();
        for segment in relative.split('/') {
            let segment = percent_decode_str(segment).decode_utf8().ok()?;
            match segment.as_ref() {
                "" | "." => {}
                ".." => return None,
                s if s.contains(['/', '\\', '\0']) => return None,
                s => path.push(s),
            }
        }
        Some(path)
    }
}

impl Fetcher for FilesystemFetcher {
    async fn fetch(&self, request: &Request) -> Result<Response, FetchError> {
        let relative = request.path_in_scope(&self.scope).ok_or_else(|| {
            FetchError::InvalidRequest(format!(
                "{} is outside of the origin scope {}",
                request.url(),
                self.scope
            ))
        })?;

        let head_only = match request.method() {
            Method::Get => false,
            Method::Head => true,
            _ => return Ok(Response::with_status(405).with_header("Allow", "GET, HEAD")),
        };

        let mut path = match self.resolve(&relative) {
            Some(v) => v,
            None => {
                debug!("Refusing to leave origin root for {}", request.url());
                return Ok(Response::with_status(404));
            }
        };

        match tokio::fs::metadata(&path).await {
            Ok(meta) if meta.is_dir() => {
                debug!("Requested asset is a directory: Inferring index.html");
                path.push("index.html");
            }
            Ok(_) => {}
            Err(e) if e.kind() == ErrorKind::NotFound => {
                debug!("Asset {:?} does not exist", path);
                return Ok(Response::with_status(404));
            }
            Err(e) => return Err(e.into()),
        }

        let contents = match tokio::fs::read(&path).await {
            Ok(v) => v,
            Err(e) if e.kind() == ErrorKind::NotFound => {
                debug!("Asset {:?} does not exist", path);
                return Ok(Response::with_status(404));
            }
            Err(e) => return Err(e.into()),
        };

        let mime = mime_guess::from_path(&path).first_or_octet_stream();
        let body = match head_only {
            true => Vec::new(),
            false => contents,
        };
        Ok(Response::new(
            200,
            vec![("Content-Type".to_string(), mime.to_string())],
            body,
        ))
    }
}

/* -------------------------------------------------------------------------- */
/*                                    Tests                                   */
/* -------------------------------------------------------------------------- */

#[cfg(test)]
mod tests {
    use std::{fs, str::FromStr};

    use url::Url;

    use crate::{Fetcher, Method, Request};

    use super::FilesystemFetcher;

    fn site() -> (tempfile::TempDir, FilesystemFetcher) {
        let dir = tempfile::tempdir().unwrap();
        fs::write(dir.path().join("index.html"), "<html>home</html>").unwrap();
        fs::create_dir(dir.path().join("pkg")).unwrap();
        fs::write(dir.path().join("pkg").join("app.wasm"), [0u8, 97, 115, 109]).unwrap();
        fs::create_dir(dir.path().join("empty")).unwrap();
        fs::write(dir.path().join("my cv.pdf"), "%PDF").unwrap();
        fs::write(dir.path().join("café.png"), [137u8, 80, 78, 71]).unwrap();

        let fetcher = FilesystemFetcher::new(
            dir.path(),
            Url::from_str("http://site.domain/app/").unwrap(),
        )
        .unwrap();
        (dir, fetcher)
    }

    fn get(s: &str) -> Request {
        Request::get(Url::from_str(s).unwrap())
    }

    #[tokio::test]
    async fn serves_files_and_indexes() {
        let (_dir, fetcher) = site();

        let root = fetcher.fetch(&get("http://site.domain/app/")).await.unwrap();
        assert_eq!(root.status(), 200);
        assert_eq!(root.body(), b"<html>home</html>");
        assert_eq!(root.header("content-type"), Some("text/html"));

        let wasm = fetcher
            .fetch(&get("http://site.domain/app/pkg/app.wasm"))
            .await
            .unwrap();
        assert_eq!(wasm.body(), &[0u8, 97, 115, 109]);
        assert_eq!(wasm.header("Content-Type"), Some("application/wasm"));
    }

    #[tokio::test]
    async fn encoded_names() {
        let (_dir, fetcher) = site();

        let r = fetcher
            .fetch(&get("http://site.domain/app/my%20cv.pdf"))
            .await
            .unwrap();
        assert_eq!(r.status(), 200);
        assert_eq!(r.body(), b"%PDF");
        assert_eq!(r.header("content-type"), Some("application/pdf"));

        let r = fetcher
            .fetch(&get("http://site.domain/app/caf%C3%A9.png"))
            .await
            .unwrap();
        assert_eq!(r.status(), 200);
    }

    #[tokio::test]
    async fn missing_files_are_404() {
        let (_dir, fetcher) = site();

        let r = fetcher
            .fetch(&get("http://site.domain/app/nope.js"))
            .await
            .unwrap();
        assert_eq!(r.status(), 404);

        // Directory without an index
        let r = fetcher
            .fetch(&get("http://site.domain/app/empty/"))
            .await
            .unwrap();
        assert_eq!(r.status(), 404);
    }

    #[tokio::test]
    async fn head_and_other_methods() {
        let (_dir, fetcher) = site();
        let url = Url::from_str("http://site.domain/app/index.html").unwrap();

        let r = fetcher
            .fetch(&Request::new(Method::Head, url.clone()))
            .await
            .unwrap();
        assert_eq!(r.status(), 200);
        assert!(r.body().is_empty());

        let r = fetcher.fetch(&Request::new(Method::Post, url)).await.unwrap();
        assert_eq!(r.status(), 405);
    }

    #[tokio::test]
    async fn outside_scope() {
        let (_dir, fetcher) = site();
        assert!(fetcher.fetch(&get("http://site.domain/other/index.html")).await.is_err());
        assert!(fetcher.fetch(&get("http://evil.domain/app/index.html")).await.is_err());
    }

    #[test]
    fn no_escape_from_root() {
        let (_dir, fetcher) = site();
        assert!(fetcher.resolve("pkg/../../etc/passwd").is_none());
        assert!(fetcher.resolve("%2e%2e/etc/passwd").is_none());
        assert!(fetcher.resolve("pkg%2F..%2F..%2Fetc").is_none());
        assert!(fetcher.resolve("pkg%5C..%5Cetc").is_none());
        assert!(fetcher.resolve("bad%FF").is_none());
        assert_eq!(
            fetcher.resolve("./pkg/app.wasm").unwrap(),
            fetcher.root().join("pkg").join("app.wasm")
        );
    }

    #[test]
    fn root_must_exist() {
        let scope = Url::from_str("http://site.domain/").unwrap();
        assert!(FilesystemFetcher::new("/definitely/not/a/real/dir", scope).is_err());
    }
}
