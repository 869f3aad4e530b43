use std::path::Path;

use async_trait::async_trait;
use docsmith_shared::{DocsetError, Result};
use reqwest::Client;
use tracing::{debug, info};
use url::Url;

use super::{FetchRequest, FetchStrategy, FetchedSource, clear_dir};
use crate::archive;
use crate::tags::tag_candidates;

/// Tag archive URL templates, relative to `{base}/{owner}/{repo}`.
const ARCHIVE_PATTERNS: [(&str, &str); 4] = [
    ("archive/refs/tags/", ".tar.gz"),
    ("archive/refs/tags/", ".zip"),
    ("archive/", ".tar.gz"),
    ("archive/", ".zip"),
];

/// Downloads a release-tag archive straight from the forge, with no git
/// history. Only GitHub-style hosts publish these endpoints.
#[derive(Debug, Clone)]
pub struct ArchiveDownload {
    client: Client,
    base_url: String,
}

impl ArchiveDownload {
    pub fn new(client: Client, base_url: impl Into<String>) -> Self {
        Self {
            client,
            base_url: base_url.into().trim_end_matches('/').to_string(),
        }
    }

    /// `(owner, repo)` if `vcs_url` points at GitHub or at the configured
    /// archive host.
    fn owner_repo(&self, vcs_url: &str) -> Option<(String, String)> {
        let url = parse_vcs_url(vcs_url)?;
        let host = url.host_str()?.to_ascii_lowercase();
        let base_host = Url::parse(&self.base_url)
            .ok()
            .and_then(|b| b.host_str().map(str::to_ascii_lowercase));

        let github = host == "github.com" || host == "www.github.com";
        if !github && base_host.as_deref() != Some(host.as_str()) {
            return None;
        }

        let mut segments = url.path_segments()?.filter(|s| !s.is_empty());
        let owner = segments.next()?.to_string();
        let repo = segments.next()?.trim_end_matches(".git").to_string();
        if repo.is_empty() {
            return None;
        }
        Some((owner, repo))
    }
}

/// Parse the URL forms found in package metadata, including `git+https://`
/// and scp-style `git@host:owner/repo.git`.
fn parse_vcs_url(raw: &str) -> Option<Url> {
    let raw = raw.trim();
    let raw = raw.strip_prefix("git+").unwrap_or(raw);
    if let Some(rest) = raw.strip_prefix("git@") {
        let (host, path) = rest.split_once(':')?;
        return Url::parse(&format!("https://{host}/{path}")).ok();
    }
    Url::parse(raw).ok()
}

#[async_trait]
impl FetchStrategy for ArchiveDownload {
    fn name(&self) -> &'static str {
        "archive_download"
    }

    fn is_applicable(&self, request: &FetchRequest) -> bool {
        request
            .vcs_url
            .as_deref()
            .and_then(|u| self.owner_repo(u))
            .is_some()
    }

    async fn fetch(&self, request: &FetchRequest, scratch: &Path) -> Result<FetchedSource> {
        let vcs_url = request
            .vcs_url
            .as_deref()
            .ok_or_else(|| DocsetError::SourceUnavailable("no repository URL".into()))?;
        let (owner, repo) = self.owner_repo(vcs_url).ok_or_else(|| {
            DocsetError::SourceUnavailable(format!("{vcs_url} has no archive endpoint"))
        })?;

        let downloads = tempfile::tempdir().map_err(|e| DocsetError::io(scratch, e))?;
        let identity = &request.identity;
        let mut last_error = None;

        for tag in tag_candidates(identity.name(), identity.version()) {
            for (prefix, ext) in ARCHIVE_PATTERNS {
                let url = format!("{}/{owner}/{repo}/{prefix}{tag}{ext}", self.base_url);
                let file = downloads.path().join(format!("source{ext}"));

                if let Err(e) = archive::download_to(&self.client, &url, &file).await {
                    debug!(%url, error = %e, "archive not available");
                    last_error = Some(e);
                    continue;
                }

                let extracted = match archive::extract(&file, scratch).await {
                    Ok(n) => n,
                    Err(e) => {
                        debug!(%url, error = %e, "archive unusable");
                        clear_dir(scratch).await?;
                        last_error = Some(e);
                        continue;
                    }
                };
                archive::unwrap_single_root(scratch).await?;

                info!(%url, files = extracted, "downloaded tag archive");
                return Ok(FetchedSource::default());
            }
        }

        Err(last_error.unwrap_or_else(|| {
            DocsetError::SourceUnavailable(format!("no tag archive for {identity}"))
        }))
    }
}

#[cfg(test)]
mod tests {
    use docsmith_shared::PackageIdentity;
    use wiremock::matchers::{method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    use super::*;
    use crate::archive::tests::tar_gz;

    fn request(vcs: &str) -> FetchRequest {
        FetchRequest::new(PackageIdentity::new("requests", "2.25.1").unwrap()).with_vcs_url(vcs)
    }

    #[test]
    fn only_applies_to_archive_hosts() {
        let strategy = ArchiveDownload::new(Client::new(), "https://github.com");
        assert!(strategy.is_applicable(&request("https://github.com/psf/requests")));
        assert!(strategy.is_applicable(&request("git@github.com:psf/requests.git")));
        assert!(strategy.is_applicable(&request("git+https://github.com/psf/requests.git")));
        assert!(!strategy.is_applicable(&request("https://gitlab.com/psf/requests")));
        assert!(!strategy.is_applicable(&FetchRequest::new(
            PackageIdentity::new("requests", "2.25.1").unwrap()
        )));
    }

    #[tokio::test]
    async fn downloads_first_matching_pattern() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/psf/requests/archive/v2.25.1.tar.gz"))
            .respond_with(ResponseTemplate::new(200).set_body_bytes(tar_gz(&[(
                "requests-2.25.1/requests/__version__.py",
                "__version__ = '2.25.1'",
            )])))
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(404))
            .mount(&server)
            .await;

        let strategy = ArchiveDownload::new(Client::new(), server.uri());
        let req = request(&format!("{}/psf/requests", server.uri()));
        assert!(strategy.is_applicable(&req));

        let scratch = tempfile::tempdir().unwrap();
        let fetched = strategy.fetch(&req, scratch.path()).await.unwrap();
        assert!(!fetched.from_default_branch);
        let version = std::fs::read_to_string(scratch.path().join("requests/__version__.py"))
            .unwrap();
        assert!(version.contains("2.25.1"));
    }

    #[tokio::test]
    async fn all_patterns_missing_is_an_error() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(404))
            .mount(&server)
            .await;

        let strategy = ArchiveDownload::new(Client::new(), server.uri());
        let req = request(&format!("{}/psf/requests", server.uri()));
        let scratch = tempfile::tempdir().unwrap();
        assert!(strategy.fetch(&req, scratch.path()).await.is_err());
    }
}
