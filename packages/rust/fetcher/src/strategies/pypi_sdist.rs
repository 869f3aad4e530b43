use std::path::Path;

use async_trait::async_trait;
use docsmith_shared::{DocsetError, Result};
use reqwest::Client;
use tracing::info;

use super::{FetchRequest, FetchStrategy, FetchedSource};
use crate::archive;
use crate::pypi::PypiClient;

/// Downloads and unpacks the release's source distribution from the registry.
#[derive(Debug, Clone)]
pub struct PypiSdist {
    client: Client,
    registry: PypiClient,
}

impl PypiSdist {
    pub fn new(client: Client, registry: PypiClient) -> Self {
        Self { client, registry }
    }
}

#[async_trait]
impl FetchStrategy for PypiSdist {
    fn name(&self) -> &'static str {
        "pypi_sdist"
    }

    fn is_applicable(&self, _request: &FetchRequest) -> bool {
        true
    }

    async fn fetch(&self, request: &FetchRequest, scratch: &Path) -> Result<FetchedSource> {
        let identity = &request.identity;
        let release = self
            .registry
            .release(identity.name(), identity.version())
            .await?;
        let sdist = release.sdist().ok_or_else(|| {
            DocsetError::SourceUnavailable(format!("no sdist published for {identity}"))
        })?;

        let downloads = tempfile::tempdir().map_err(|e| DocsetError::io(scratch, e))?;
        let filename = Path::new(&sdist.filename)
            .file_name()
            .ok_or_else(|| DocsetError::Archive(format!("bad sdist name: {}", sdist.filename)))?;
        let file = downloads.path().join(filename);
        archive::download_to(&self.client, &sdist.url, &file).await?;
        archive::extract(&file, scratch).await?;
        archive::unwrap_single_root(scratch).await?;

        info!(%identity, filename = %sdist.filename, "unpacked sdist");
        Ok(FetchedSource::default())
    }
}

#[cfg(test)]
mod tests {
    use docsmith_shared::PackageIdentity;
    use wiremock::matchers::{method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    use super::*;
    use crate::archive::tests::tar_gz;

    #[tokio::test]
    async fn unpacks_sdist_from_registry() {
        let server = MockServer::start().await;
        let body = serde_json::json!({
            "info": {"name": "requests"},
            "urls": [{
                "packagetype": "sdist",
                "url": format!("{}/files/requests-2.25.1.tar.gz", server.uri()),
                "filename": "requests-2.25.1.tar.gz"
            }]
        });
        Mock::given(method("GET"))
            .and(path("/pypi/requests/2.25.1/json"))
            .respond_with(ResponseTemplate::new(200).set_body_json(body))
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/files/requests-2.25.1.tar.gz"))
            .respond_with(ResponseTemplate::new(200).set_body_bytes(tar_gz(&[(
                "requests-2.25.1/PKG-INFO",
                "Version: 2.25.1",
            )])))
            .mount(&server)
            .await;

        let client = Client::new();
        let strategy = PypiSdist::new(client.clone(), PypiClient::new(client, server.uri()));
        let request = FetchRequest::new(PackageIdentity::new("requests", "2.25.1").unwrap());
        let scratch = tempfile::tempdir().unwrap();

        strategy.fetch(&request, scratch.path()).await.unwrap();
        let info = std::fs::read_to_string(scratch.path().join("PKG-INFO")).unwrap();
        assert!(info.contains("2.25.1"));
    }
}
