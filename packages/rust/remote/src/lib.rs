//! Client for a documentation-hosting provider (Read the Docs API v3).
//!
//! Network lookups never raise: HTTP errors, transport failures and malformed
//! bodies are logged and surface as `None`, so callers can treat "no data"
//! uniformly.

mod versions;

use std::path::{Path, PathBuf};

use docsmith_fetcher::{archive, http_client};
use docsmith_shared::{AppConfig, DocsetError, Result};
use reqwest::Client;
use serde::Deserialize;
use serde::de::DeserializeOwned;
use tracing::{debug, error, info, instrument, warn};

pub use versions::{
    DownloadDescriptor, RemoteVersion, VersionDetails, canonical_extension, choose_best_version,
    determine_local_filename, get_download_url, project_slug_from_url,
};

/// Upper bound on version-list pages followed.
const MAX_PAGES: usize = 50;

// ---------------------------------------------------------------------------
// Options
// ---------------------------------------------------------------------------

/// Runtime settings for the remote documentation client.
#[derive(Debug, Clone)]
pub struct RemoteDocsOptions {
    pub api_base_url: String,
    pub preferred_versions: Vec<String>,
    pub download_format: String,
    pub timeout_secs: u64,
    pub download_timeout_secs: u64,
}

impl From<&AppConfig> for RemoteDocsOptions {
    fn from(config: &AppConfig) -> Self {
        let remote = &config.remote_docs;
        Self {
            api_base_url: remote.api_base_url.clone(),
            preferred_versions: remote.preferred_versions.clone(),
            download_format: remote.download_format.clone(),
            timeout_secs: remote.timeout_secs,
            download_timeout_secs: remote.download_timeout_secs,
        }
    }
}

impl Default for RemoteDocsOptions {
    fn default() -> Self {
        Self::from(&AppConfig::default())
    }
}

#[derive(Debug, Deserialize)]
struct VersionPage {
    #[serde(default)]
    results: Vec<RemoteVersion>,
    #[serde(default)]
    next: Option<String>,
}

// ---------------------------------------------------------------------------
// RemoteDocsClient
// ---------------------------------------------------------------------------

/// Resolves and downloads pre-built documentation archives.
#[derive(Debug, Clone)]
pub struct RemoteDocsClient {
    api: Client,
    downloads: Client,
    opts: RemoteDocsOptions,
}

impl RemoteDocsClient {
    pub fn new(opts: RemoteDocsOptions) -> Result<Self> {
        Ok(Self {
            api: http_client(opts.timeout_secs)?,
            downloads: http_client(opts.download_timeout_secs)?,
            opts,
        })
    }

    pub fn options(&self) -> &RemoteDocsOptions {
        &self.opts
    }

    fn api_url(&self, path: &str) -> String {
        format!("{}/api/v3/{path}", self.opts.api_base_url.trim_end_matches('/'))
    }

    /// All versions of `project_slug`, following pagination.
    #[instrument(skip(self))]
    pub async fn fetch_available_versions(
        &self,
        project_slug: &str,
    ) -> Option<Vec<RemoteVersion>> {
        let mut url = self.api_url(&format!("projects/{project_slug}/versions/"));
        let mut versions = Vec::new();

        for _ in 0..MAX_PAGES {
            let page: VersionPage = match self.get_json(&url, &[]).await {
                Ok(page) => page,
                Err(e) => {
                    warn!(%url, error = %e, "failed to list versions");
                    return None;
                }
            };
            versions.extend(page.results);
            match page.next.filter(|n| !n.is_empty()) {
                Some(next) => url = next,
                None => break,
            }
        }

        debug!(count = versions.len(), "listed versions");
        Some(versions)
    }

    /// Detail payload for one version, filtered by project slug.
    #[instrument(skip(self))]
    pub async fn fetch_version_details(
        &self,
        project_slug: &str,
        version_slug: &str,
    ) -> Option<VersionDetails> {
        let url = self.api_url(&format!("versions/{version_slug}/"));
        match self
            .get_json::<VersionDetails>(&url, &[("project__slug", project_slug)])
            .await
        {
            Ok(details) => Some(details),
            Err(e) => {
                warn!(%url, error = %e, "failed to fetch version details");
                None
            }
        }
    }

    async fn get_json<T: DeserializeOwned>(&self, url: &str, query: &[(&str, &str)]) -> Result<T> {
        let response = self
            .api
            .get(url)
            .query(query)
            .send()
            .await
            .map_err(|e| DocsetError::Network(format!("{url}: {e}")))?;

        let status = response.status();
        if !status.is_success() {
            return Err(DocsetError::Network(format!("{url}: HTTP {status}")));
        }

        let body = response
            .text()
            .await
            .map_err(|e| DocsetError::Network(format!("{url}: failed to read body: {e}")))?;
        serde_json::from_str(&body)
            .map_err(|e| DocsetError::MalformedResponse(format!("{url}: {e}")))
    }

    /// Stream `url` into `path`. Partial files are removed on failure.
    pub async fn download_file(&self, url: &str, path: &Path) -> bool {
        match archive::download_to(&self.downloads, url, path).await {
            Ok(bytes) => {
                info!(%url, path = %path.display(), bytes, "download complete");
                true
            }
            Err(e) => {
                warn!(%url, error = %e, "download failed");
                false
            }
        }
    }

    /// Resolve the artifact to download for `project_slug`: list → choose →
    /// details → URL → filename.
    pub async fn resolve_download(
        &self,
        project_slug: &str,
        preferred: &[String],
        format: &str,
    ) -> Option<(String, DownloadDescriptor)> {
        let available = self.fetch_available_versions(project_slug).await?;
        let version = choose_best_version(&available, preferred)?;
        let details = self.fetch_version_details(project_slug, &version).await;
        let url = get_download_url(details.as_ref(), format)?;
        let filename = determine_local_filename(project_slug, &version, &url, format);
        Some((
            version,
            DownloadDescriptor {
                url,
                format: format.to_string(),
                filename,
            },
        ))
    }

    /// Download the best pre-built artifact for `project_slug` into `dir`.
    ///
    /// Returns the downloaded file's path. An empty slug fails fast without
    /// any network call.
    #[instrument(skip(self, dir, preferred))]
    pub async fn download_prebuilt(
        &self,
        project_slug: &str,
        dir: &Path,
        preferred: &[String],
        format: &str,
    ) -> Option<PathBuf> {
        let project_slug = project_slug.trim();
        if project_slug.is_empty() {
            error!("project_slug is empty; cannot query the documentation host");
            return None;
        }

        let (version, descriptor) = self.resolve_download(project_slug, preferred, format).await?;

        if let Err(e) = tokio::fs::create_dir_all(dir).await {
            warn!(dir = %dir.display(), error = %e, "cannot create download directory");
            return None;
        }
        let path = dir.join(&descriptor.filename);
        if !self.download_file(&descriptor.url, &path).await {
            return None;
        }

        info!(%version, path = %path.display(), "pre-built documentation downloaded");
        Some(path)
    }

    /// [`Self::download_prebuilt`] with the configured preferences and format.
    pub async fn download_prebuilt_default(
        &self,
        project_slug: &str,
        dir: &Path,
    ) -> Option<PathBuf> {
        let preferred = self.opts.preferred_versions.clone();
        let format = self.opts.download_format.clone();
        self.download_prebuilt(project_slug, dir, &preferred, &format).await
    }
}
