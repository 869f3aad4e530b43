//! Source acquisition strategies.
//!
//! Each strategy is tried by [`crate::SourceFetcher`] in order. A strategy
//! writes into the scratch directory it is given and either fills it with a
//! complete tree and returns `Ok`, or returns an error; the fetcher removes
//! the scratch directory after a failed attempt.

mod archive_download;
mod full_clone;
mod pypi_sdist;
mod shallow_clone;

use std::collections::HashMap;
use std::path::Path;

use async_trait::async_trait;
use docsmith_shared::{PackageIdentity, Result};

pub use archive_download::ArchiveDownload;
pub use full_clone::FullClone;
pub use pypi_sdist::PypiSdist;
pub use shallow_clone::ShallowClone;

/// Everything a strategy may consult when acquiring a source tree.
#[derive(Debug, Clone)]
pub struct FetchRequest {
    pub identity: PackageIdentity,
    /// Repository URL, if known. Filled in by VCS discovery when absent.
    pub vcs_url: Option<String>,
    /// Configured default-branch hint for clone fallbacks.
    pub default_branch: Option<String>,
    /// Project URLs from package metadata (label → URL).
    pub project_urls: HashMap<String, String>,
}

impl FetchRequest {
    pub fn new(identity: PackageIdentity) -> Self {
        Self {
            identity,
            vcs_url: None,
            default_branch: None,
            project_urls: HashMap::new(),
        }
    }

    pub fn with_vcs_url(mut self, url: impl Into<String>) -> Self {
        self.vcs_url = Some(url.into());
        self
    }

    pub fn with_default_branch(mut self, branch: impl Into<String>) -> Self {
        self.default_branch = Some(branch.into());
        self
    }
}

/// What a successful strategy reports back.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct FetchedSource {
    /// True if a branch, not a release tag, was fetched.
    pub from_default_branch: bool,
}

/// One way of turning a [`FetchRequest`] into a local source tree.
#[async_trait]
pub trait FetchStrategy: Send + Sync {
    /// Stable name reported in results and logs (e.g. `"shallow_clone"`).
    fn name(&self) -> &'static str;

    /// Whether this strategy can run for `request` at all. Inapplicable
    /// strategies are skipped and recorded as such.
    fn is_applicable(&self, request: &FetchRequest) -> bool;

    /// Acquire the tree into `scratch`, which exists and is empty.
    async fn fetch(&self, request: &FetchRequest, scratch: &Path) -> Result<FetchedSource>;
}

/// Remove everything inside `dir`, keeping `dir` itself.
pub(crate) async fn clear_dir(dir: &Path) -> Result<()> {
    use docsmith_shared::DocsetError;

    if tokio::fs::try_exists(dir).await.unwrap_or(false) {
        tokio::fs::remove_dir_all(dir)
            .await
            .map_err(|e| DocsetError::io(dir, e))?;
    }
    tokio::fs::create_dir_all(dir)
        .await
        .map_err(|e| DocsetError::io(dir, e))
}
