//! The manifest lists the assets a site needs to work offline.

use url::Url;

use super::Request;

/// Name of the bucket the default manifest is installed into.
pub const DEFAULT_CACHE_NAME: &str = "portfolio_andrejorsula";

/// Assets making up the site shell: the root document, its script and the
/// WebAssembly payload the script loads.
pub const DEFAULT_ASSETS: [&str; 4] = [
    "./",
    "./index.html",
    "./portfolio_andrejorsula.js",
    "./portfolio_andrejorsula_bg.wasm",
];

#[derive(Debug, thiserror::Error)]
pub enum ManifestError {
    #[error("manifest path \"{path}\" does not resolve against {scope}: {source}")]
    Unresolvable {
        path: String,
        scope: Url,
        source: url::ParseError,
    },
}

/// An ordered, immutable list of relative asset paths.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Manifest {
    paths: Vec<String>,
}

impl Manifest {
    pub fn new<I, S>(paths: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            paths: paths.into_iter().map(Into::into).collect(),
        }
    }

    pub fn paths(&self) -> &[String] {
        &self.paths
    }

    pub fn len(&self) -> usize {
        self.paths.len()
    }

    pub fn is_empty(&self) -> bool {
        self.paths.is_empty()
    }

    /// Turns every path into a GET request under `scope`, keeping the order.
    pub fn requests(&self, scope: &Url) -> Result<Vec<Request>, ManifestError> {
        self.paths
            .iter()
            .map(|path| {
                scope
                    .join(path)
                    .map(Request::get)
                    .map_err(|source| ManifestError::Unresolvable {
                        path: path.clone(),
                        scope: scope.clone(),
                        source,
                    })
            })
            .collect()
    }
}

impl Default for Manifest {
    fn default() -> Self {
        Self::new(DEFAULT_ASSETS)
    }
}

/* -------------------------------------------------------------------------- */
/*                                    Tests                                   */
/* -------------------------------------------------------------------------- */
