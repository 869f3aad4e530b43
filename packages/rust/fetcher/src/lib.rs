//! Source acquisition for DocSmith.
//!
//! [`SourceFetcher`] resolves a package identity to a local source tree by
//! walking an ordered chain of [`FetchStrategy`] implementations: registry
//! sdist (opt-in), forge tag archive, shallow clone, then full clone. The
//! building blocks (bounded subprocesses, git, archive extraction, registry
//! lookups) are public so the build stage can reuse them.

pub mod archive;
pub mod branch;
pub mod git;
pub mod process;
pub mod pypi;
mod source_fetcher;
pub mod strategies;
pub mod tags;

use std::time::Duration;

use docsmith_shared::{DocsetError, Result};
use reqwest::Client;

pub use branch::BranchResolver;
pub use source_fetcher::{FetchOptions, SourceAcquisitionResult, SourceFetcher, StrategyFailure};
pub use strategies::{FetchRequest, FetchStrategy, FetchedSource};

/// Maximum number of redirects followed by HTTP requests.
const MAX_REDIRECTS: usize = 10;

/// User-Agent string for outbound requests.
const USER_AGENT: &str = concat!("DocSmith/", env!("CARGO_PKG_VERSION"));

/// Build a reqwest client with the workspace defaults and a per-request timeout.
pub fn http_client(timeout_secs: u64) -> Result<Client> {
    Client::builder()
        .user_agent(USER_AGENT)
        .redirect(reqwest::redirect::Policy::limited(MAX_REDIRECTS))
        .timeout(Duration::from_secs(timeout_secs))
        .build()
        .map_err(|e| DocsetError::Network(format!("failed to build HTTP client: {e}")))
}
