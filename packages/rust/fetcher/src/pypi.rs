//! Package registry (PyPI JSON API) lookups: sdist URLs and source repository
//! discovery from project URLs.

use std::collections::HashMap;

use docsmith_shared::{DocsetError, Result};
use reqwest::Client;
use serde::Deserialize;
use tracing::{debug, instrument};
use url::Url;

/// Project-URL labels that may point at a source repository, in priority order.
const VCS_LABELS: [&str; 4] = ["Source Code", "Source", "Repository", "Homepage"];

/// Hosts recognized as source repositories.
const VCS_HOSTS: [&str; 3] = ["github.com", "gitlab.com", "bitbucket.org"];

/// The subset of `/pypi/{name}/{version}/json` we use.
#[derive(Debug, Clone, Deserialize)]
pub struct PypiRelease {
    pub info: PypiInfo,
    #[serde(default)]
    pub urls: Vec<PypiFile>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct PypiInfo {
    pub name: String,
    #[serde(default)]
    pub project_urls: Option<HashMap<String, String>>,
    #[serde(default)]
    pub home_page: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct PypiFile {
    pub packagetype: String,
    pub url: String,
    pub filename: String,
}

impl PypiRelease {
    /// The source distribution for this release, if one was uploaded.
    pub fn sdist(&self) -> Option<&PypiFile> {
        self.urls.iter().find(|f| f.packagetype == "sdist")
    }

    /// Source repository URL advertised by the release metadata.
    pub fn vcs_url(&self) -> Option<String> {
        let mut urls = self.info.project_urls.clone().unwrap_or_default();
        if let Some(home) = self.info.home_page.as_ref().filter(|h| !h.is_empty()) {
            urls.entry("Homepage".into()).or_insert_with(|| home.clone());
        }
        find_vcs_url(&urls)
    }
}

/// Pick a source repository URL out of a label → URL map.
///
/// Labels are checked in priority order; a value qualifies when it lives on a
/// known forge or ends with `.git`.
pub fn find_vcs_url(project_urls: &HashMap<String, String>) -> Option<String> {
    VCS_LABELS.iter().find_map(|label| {
        project_urls
            .iter()
            .find(|(k, _)| k.eq_ignore_ascii_case(label))
            .map(|(_, v)| v.trim())
            .filter(|v| looks_like_vcs(v))
            .map(str::to_string)
    })
}

fn looks_like_vcs(raw: &str) -> bool {
    if raw.ends_with(".git") {
        return true;
    }
    Url::parse(raw)
        .ok()
        .and_then(|u| u.host_str().map(str::to_ascii_lowercase))
        .is_some_and(|host| {
            VCS_HOSTS
                .iter()
                .any(|h| host == *h || host.ends_with(&format!(".{h}")))
        })
}

/// Client for the registry's JSON API.
#[derive(Debug, Clone)]
pub struct PypiClient {
    client: Client,
    registry_url: String,
}

impl PypiClient {
    pub fn new(client: Client, registry_url: impl Into<String>) -> Self {
        Self {
            client,
            registry_url: registry_url.into().trim_end_matches('/').to_string(),
        }
    }

    /// Fetch release metadata for `name==version`.
    #[instrument(skip(self))]
    pub async fn release(&self, name: &str, version: &str) -> Result<PypiRelease> {
        let url = format!("{}/pypi/{name}/{version}/json", self.registry_url);
        debug!(%url, "querying registry");

        let response = self
            .client
            .get(&url)
            .send()
            .await
            .map_err(|e| DocsetError::Network(format!("{url}: {e}")))?;

        let status = response.status();
        if !status.is_success() {
            return Err(DocsetError::Network(format!("{url}: HTTP {status}")));
        }

        response
            .json::<PypiRelease>()
            .await
            .map_err(|e| DocsetError::MalformedResponse(format!("{url}: {e}")))
    }
}
