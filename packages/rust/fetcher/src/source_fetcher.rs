//! The ordered fallback chain that turns a package identity into a local
//! source tree.

use std::path::{Path, PathBuf};
use std::time::Duration;

use docsmith_shared::{AppConfig, DocsetError, Result};
use tracing::{debug, info, instrument, warn};

use crate::git::GitRunner;
use crate::pypi::{PypiClient, find_vcs_url};
use crate::strategies::{
    ArchiveDownload, FetchRequest, FetchStrategy, FullClone, PypiSdist, ShallowClone, clear_dir,
};

// ---------------------------------------------------------------------------
// Options
// ---------------------------------------------------------------------------

/// Runtime settings for source acquisition.
#[derive(Debug, Clone)]
pub struct FetchOptions {
    pub http_timeout_secs: u64,
    pub git_timeout_secs: u64,
    pub strategy_timeout_secs: u64,
    pub archive_base_url: String,
    pub registry_url: String,
    pub prefer_sdist: bool,
}

impl From<&AppConfig> for FetchOptions {
    fn from(config: &AppConfig) -> Self {
        let fetch = &config.fetch;
        Self {
            http_timeout_secs: fetch.http_timeout_secs,
            git_timeout_secs: fetch.git_timeout_secs,
            strategy_timeout_secs: fetch.strategy_timeout_secs,
            archive_base_url: fetch.archive_base_url.clone(),
            registry_url: fetch.registry_url.clone(),
            prefer_sdist: fetch.prefer_sdist,
        }
    }
}

impl Default for FetchOptions {
    fn default() -> Self {
        Self::from(&AppConfig::default())
    }
}

// ---------------------------------------------------------------------------
// Result
// ---------------------------------------------------------------------------

/// Why one strategy did not produce a tree.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StrategyFailure {
    pub strategy: String,
    pub reason: String,
}

/// Outcome of [`SourceFetcher::fetch`]. `strategy_used` and `path` are only
/// meaningful when `success` is true.
#[derive(Debug, Clone, Default)]
pub struct SourceAcquisitionResult {
    pub success: bool,
    pub strategy_used: Option<String>,
    pub path: Option<PathBuf>,
    pub from_default_branch: bool,
    pub failures: Vec<StrategyFailure>,
}

impl SourceAcquisitionResult {
    /// One line describing every failed attempt, for user-facing messages.
    pub fn failure_summary(&self) -> String {
        if self.failures.is_empty() {
            return "no acquisition strategy available".into();
        }
        self.failures
            .iter()
            .map(|f| format!("{}: {}", f.strategy, f.reason))
            .collect::<Vec<_>>()
            .join("; ")
    }
}

// ---------------------------------------------------------------------------
// SourceFetcher
// ---------------------------------------------------------------------------

/// Tries each [`FetchStrategy`] in order and stops at the first success.
///
/// Every attempt writes into its own scratch directory beside the
/// destination; only a complete tree is renamed into place, so the
/// destination is either whole or absent.
pub struct SourceFetcher {
    strategies: Vec<Box<dyn FetchStrategy>>,
    registry: Option<PypiClient>,
    strategy_timeout: Duration,
}

impl SourceFetcher {
    /// The standard chain: optional sdist, tag archive, shallow clone, full clone.
    pub fn new(opts: &FetchOptions) -> Result<Self> {
        let client = crate::http_client(opts.http_timeout_secs)?;
        let registry = PypiClient::new(client.clone(), opts.registry_url.clone());
        let git = GitRunner::new(Duration::from_secs(opts.git_timeout_secs));

        let mut strategies: Vec<Box<dyn FetchStrategy>> = Vec::with_capacity(4);
        if opts.prefer_sdist {
            strategies.push(Box::new(PypiSdist::new(client.clone(), registry.clone())));
        }
        strategies.push(Box::new(ArchiveDownload::new(
            client,
            opts.archive_base_url.clone(),
        )));
        strategies.push(Box::new(ShallowClone::new(git.clone())));
        strategies.push(Box::new(FullClone::new(git)));

        Ok(Self {
            strategies,
            registry: Some(registry),
            strategy_timeout: Duration::from_secs(opts.strategy_timeout_secs),
        })
    }

    /// A fetcher with a caller-supplied chain and no registry lookups.
    pub fn with_strategies(
        strategies: Vec<Box<dyn FetchStrategy>>,
        strategy_timeout: Duration,
    ) -> Self {
        Self {
            strategies,
            registry: None,
            strategy_timeout,
        }
    }

    pub fn strategy_names(&self) -> Vec<&'static str> {
        self.strategies.iter().map(|s| s.name()).collect()
    }

    /// Acquire the source for `request` into `dest`.
    ///
    /// Never fails outright: exhausting the chain yields `success == false`
    /// with the per-strategy reasons recorded.
    #[instrument(skip_all, fields(name = %request.identity.name(), version = %request.identity.version()))]
    pub async fn fetch(&self, mut request: FetchRequest, dest: &Path) -> SourceAcquisitionResult {
        let mut result = SourceAcquisitionResult::default();

        if let Err(e) = prepare_destination(dest).await {
            result.failures.push(StrategyFailure {
                strategy: "setup".into(),
                reason: e.to_string(),
            });
            return result;
        }

        if request.vcs_url.is_none() {
            request.vcs_url = self.discover_vcs_url(&request).await;
        }
        debug!(vcs_url = ?request.vcs_url, "starting fetch chain");

        for strategy in &self.strategies {
            let name = strategy.name();
            if !strategy.is_applicable(&request) {
                debug!(strategy = name, "not applicable, skipping");
                result.failures.push(StrategyFailure {
                    strategy: name.into(),
                    reason: "not applicable".into(),
                });
                continue;
            }

            match self.attempt(strategy.as_ref(), &request, dest).await {
                Ok(from_default_branch) => {
                    info!(strategy = name, path = %dest.display(), "source acquired");
                    result.success = true;
                    result.strategy_used = Some(name.into());
                    result.path = Some(dest.to_path_buf());
                    result.from_default_branch = from_default_branch;
                    return result;
                }
                Err(e) => {
                    warn!(strategy = name, transient = e.is_transient(), error = %e, "strategy failed");
                    result.failures.push(StrategyFailure {
                        strategy: name.into(),
                        reason: e.to_string(),
                    });
                }
            }
        }

        warn!(reasons = %result.failure_summary(), "all fetch strategies exhausted");
        result
    }

    /// Run one strategy in its own scratch directory and move the tree into
    /// `dest` on success. The scratch directory never outlives the attempt.
    async fn attempt(
        &self,
        strategy: &dyn FetchStrategy,
        request: &FetchRequest,
        dest: &Path,
    ) -> Result<bool> {
        let scratch = scratch_path(dest, strategy.name());
        clear_dir(&scratch).await?;

        let attempt = strategy.fetch(request, &scratch);
        let outcome = match tokio::time::timeout(self.strategy_timeout, attempt).await {
            Ok(Ok(fetched)) => tokio::fs::rename(&scratch, dest)
                .await
                .map(|()| fetched.from_default_branch)
                .map_err(|e| DocsetError::io(dest, e)),
            Ok(Err(e)) => Err(e),
            Err(_) => Err(DocsetError::timeout(
                strategy.name(),
                self.strategy_timeout.as_secs(),
            )),
        };

        if outcome.is_err() {
            let _ = tokio::fs::remove_dir_all(&scratch).await;
        }
        outcome
    }

    /// Look for a repository URL in the request's project URLs, then in the
    /// registry metadata. Lookup failures are not fatal.
    async fn discover_vcs_url(&self, request: &FetchRequest) -> Option<String> {
        if let Some(url) = find_vcs_url(&request.project_urls) {
            debug!(%url, "repository URL from project URLs");
            return Some(url);
        }

        let registry = self.registry.as_ref()?;
        let identity = &request.identity;
        match registry.release(identity.name(), identity.version()).await {
            Ok(release) => {
                let url = release.vcs_url();
                debug!(?url, "repository URL from registry metadata");
                url
            }
            Err(e) => {
                debug!(error = %e, "registry lookup failed");
                None
            }
        }
    }
}

/// Remove a stale destination and make sure its parent exists.
async fn prepare_destination(dest: &Path) -> Result<()> {
    if tokio::fs::try_exists(dest).await.unwrap_or(false) {
        tokio::fs::remove_dir_all(dest)
            .await
            .map_err(|e| DocsetError::io(dest, e))?;
    }
    if let Some(parent) = dest.parent() {
        tokio::fs::create_dir_all(parent)
            .await
            .map_err(|e| DocsetError::io(parent, e))?;
    }
    Ok(())
}

fn scratch_path(dest: &Path, strategy: &str) -> PathBuf {
    let base = dest
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| "source".into());
    dest.with_file_name(format!(".{base}.{strategy}.partial"))
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;
    use std::sync::atomic::{AtomicUsize, Ordering};

    use async_trait::async_trait;
    use docsmith_shared::PackageIdentity;

    use super::*;
    use crate::strategies::FetchedSource;

    /// Writes a partial tree, then fails or succeeds as configured.
    struct Stub {
        name: &'static str,
        succeed: bool,
        delay: Option<Duration>,
        calls: Arc<AtomicUsize>,
    }

    impl Stub {
        fn new(name: &'static str, succeed: bool) -> Self {
            Self {
                name,
                succeed,
                delay: None,
                calls: Arc::new(AtomicUsize::new(0)),
            }
        }
    }

    #[async_trait]
    impl FetchStrategy for Stub {
        fn name(&self) -> &'static str {
            self.name
        }

        fn is_applicable(&self, _request: &FetchRequest) -> bool {
            true
        }

        async fn fetch(&self, request: &FetchRequest, scratch: &Path) -> Result<FetchedSource> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            std::fs::write(scratch.join("partial.txt"), self.name).unwrap();
            if let Some(delay) = self.delay {
                tokio::time::sleep(delay).await;
            }
            if !self.succeed {
                return Err(DocsetError::Network(format!("{} refused", self.name)));
            }
            std::fs::write(
                scratch.join("setup.py"),
                format!("version = '{}'", request.identity.version()),
            )
            .unwrap();
            Ok(FetchedSource::default())
        }
    }

    fn request() -> FetchRequest {
        FetchRequest::new(PackageIdentity::new("requests", "2.25.1").unwrap())
            .with_vcs_url("https://github.com/psf/requests")
    }

    #[tokio::test]
    async fn falls_back_to_next_strategy() {
        let tmp = tempfile::tempdir().unwrap();
        let dest = tmp.path().join("source");
        let fetcher = SourceFetcher::with_strategies(
            vec![
                Box::new(Stub::new("archive_download", false)),
                Box::new(Stub::new("shallow_clone", true)),
                Box::new(Stub::new("full_clone", true)),
            ],
            Duration::from_secs(5),
        );

        let result = fetcher.fetch(request(), &dest).await;
        assert!(result.success);
        assert_eq!(result.strategy_used.as_deref(), Some("shallow_clone"));
        assert_eq!(result.failures.len(), 1);
        assert_eq!(result.failures[0].strategy, "archive_download");

        let setup = std::fs::read_to_string(dest.join("setup.py")).unwrap();
        assert!(setup.contains("2.25.1"));
        // scratch of the failed attempt is gone
        let leftovers: Vec<_> = std::fs::read_dir(tmp.path())
            .unwrap()
            .map(|e| e.unwrap().file_name())
            .collect();
        assert_eq!(leftovers, vec![std::ffi::OsString::from("source")]);
    }

    #[tokio::test]
    async fn exhausted_chain_reports_every_reason() {
        let tmp = tempfile::tempdir().unwrap();
        let dest = tmp.path().join("source");
        let fetcher = SourceFetcher::with_strategies(
            vec![
                Box::new(Stub::new("archive_download", false)),
                Box::new(Stub::new("shallow_clone", false)),
            ],
            Duration::from_secs(5),
        );

        let result = fetcher.fetch(request(), &dest).await;
        assert!(!result.success);
        assert!(result.path.is_none());
        assert!(!dest.exists());
        let summary = result.failure_summary();
        assert!(summary.contains("archive_download refused"));
        assert!(summary.contains("shallow_clone refused"));
    }

    #[tokio::test]
    async fn timeout_is_an_ordinary_failure() {
        let tmp = tempfile::tempdir().unwrap();
        let dest = tmp.path().join("source");
        let mut slow = Stub::new("archive_download", true);
        slow.delay = Some(Duration::from_secs(10));
        let fast = Stub::new("shallow_clone", true);
        let fast_calls = fast.calls.clone();

        let fetcher = SourceFetcher::with_strategies(
            vec![Box::new(slow), Box::new(fast)],
            Duration::from_millis(100),
        );

        let result = fetcher.fetch(request(), &dest).await;
        assert!(result.success);
        assert_eq!(result.strategy_used.as_deref(), Some("shallow_clone"));
        assert_eq!(fast_calls.load(Ordering::SeqCst), 1);
        assert!(result.failures[0].reason.contains("timed out"));
    }

    #[tokio::test]
    async fn stale_destination_is_replaced() {
        let tmp = tempfile::tempdir().unwrap();
        let dest = tmp.path().join("source");
        std::fs::create_dir_all(&dest).unwrap();
        std::fs::write(dest.join("stale.txt"), "old").unwrap();

        let fetcher = SourceFetcher::with_strategies(
            vec![Box::new(Stub::new("shallow_clone", true))],
            Duration::from_secs(5),
        );
        let result = fetcher.fetch(request(), &dest).await;
        assert!(result.success);
        assert!(!dest.join("stale.txt").exists());
    }

    #[test]
    fn default_chain_order() {
        let fetcher = SourceFetcher::new(&FetchOptions::default()).unwrap();
        assert_eq!(
            fetcher.strategy_names(),
            vec!["archive_download", "shallow_clone", "full_clone"]
        );

        let opts = FetchOptions {
            prefer_sdist: true,
            ..FetchOptions::default()
        };
        let fetcher = SourceFetcher::new(&opts).unwrap();
        assert_eq!(fetcher.strategy_names()[0], "pypi_sdist");
    }

    fn git_available() -> bool {
        std::process::Command::new("git")
            .arg("--version")
            .output()
            .map(|o| o.status.success())
            .unwrap_or(false)
    }

    fn git(dir: &Path, args: &[&str]) {
        let status = std::process::Command::new("git")
            .args(["-c", "user.name=test", "-c", "user.email=test@example.com"])
            .args(args)
            .current_dir(dir)
            .status()
            .unwrap();
        assert!(status.success(), "git {args:?}");
    }

    #[tokio::test]
    async fn archive_fails_then_shallow_clone_succeeds() {
        if !git_available() {
            eprintln!("git not on PATH, skipping");
            return;
        }
        let tmp = tempfile::tempdir().unwrap();
        let upstream = tmp.path().join("upstream");
        std::fs::create_dir_all(&upstream).unwrap();
        git(&upstream, &["init", "--quiet"]);
        std::fs::write(upstream.join("setup.py"), "setup(version='2.25.1')").unwrap();
        git(&upstream, &["add", "."]);
        git(&upstream, &["commit", "--quiet", "-m", "release"]);
        git(&upstream, &["tag", "v2.25.1"]);

        let url = format!("file://{}", upstream.display());
        let fetcher = SourceFetcher::with_strategies(
            vec![
                Box::new(Stub::new("archive_download", false)),
                Box::new(ShallowClone::new(GitRunner::new(Duration::from_secs(60)))),
            ],
            Duration::from_secs(60),
        );

        let dest = tmp.path().join("work/source");
        let request = FetchRequest::new(PackageIdentity::new("requests", "2.25.1").unwrap())
            .with_vcs_url(url);
        let result = fetcher.fetch(request, &dest).await;

        assert!(result.success, "{}", result.failure_summary());
        assert_eq!(result.strategy_used.as_deref(), Some("shallow_clone"));
        assert!(!result.from_default_branch);
        let setup = std::fs::read_to_string(dest.join("setup.py")).unwrap();
        assert!(setup.contains("2.25.1"));
        assert!(!dest.join(".git").exists());
    }
}
