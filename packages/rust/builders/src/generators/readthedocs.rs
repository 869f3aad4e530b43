use std::path::Path;

use async_trait::async_trait;
use docsmith_fetcher::archive;
use docsmith_remote::RemoteDocsClient;
use docsmith_shared::{DocType, DocsetError, Result};
use tracing::{error, info, instrument, warn};

use super::Builder;
use crate::context::BuildContext;
use crate::scan;

/// Downloads a pre-built artifact from the documentation host instead of
/// building locally.
pub struct ReadTheDocsBuilder {
    remote: RemoteDocsClient,
}

impl ReadTheDocsBuilder {
    pub fn new(remote: RemoteDocsClient) -> Self {
        Self { remote }
    }
}

#[async_trait]
impl Builder for ReadTheDocsBuilder {
    fn name(&self) -> &'static str {
        "readthedocs"
    }

    fn can_handle(&self, source_path: Option<&Path>, context: &BuildContext) -> bool {
        if context.doc_type == DocType::Readthedocs {
            return true;
        }
        source_path
            .or(context.source_root.as_deref())
            .is_some_and(scan::has_readthedocs_config)
    }

    #[instrument(skip_all, fields(name = %context.project_name, slug = %context.project_slug))]
    async fn generate_docset(
        &self,
        _source_path: Option<&Path>,
        output_path: &Path,
        context: &BuildContext,
    ) -> bool {
        let slug = context.project_slug.trim();
        if slug.is_empty() {
            error!("project_slug is empty; cannot download pre-built documentation");
            return false;
        }

        let download_dir = context.work_dir.join("download");
        let Some(file) = self.remote.download_prebuilt_default(slug, &download_dir).await else {
            warn!("no pre-built documentation could be downloaded");
            return false;
        };

        match install_artifact(&file, output_path).await {
            Ok(()) => {
                info!(output = %output_path.display(), "pre-built documentation installed");
                true
            }
            Err(e) => {
                warn!(file = %file.display(), error = %e, "failed to install downloaded artifact");
                false
            }
        }
    }
}

/// Unpack an HTML archive into `output`, or copy a single-file format
/// (pdf, epub) into it.
async fn install_artifact(file: &Path, output: &Path) -> Result<()> {
    tokio::fs::create_dir_all(output)
        .await
        .map_err(|e| DocsetError::io(output, e))?;

    let is_zip = file.extension().is_some_and(|e| e.eq_ignore_ascii_case("zip"));
    if is_zip {
        archive::extract(file, output).await?;
        archive::unwrap_single_root(output).await?;
        return Ok(());
    }

    let Some(name) = file.file_name() else {
        return Err(DocsetError::Build(format!(
            "downloaded artifact has no file name: {}",
            file.display()
        )));
    };
    let target = output.join(name);
    tokio::fs::copy(file, &target)
        .await
        .map_err(|e| DocsetError::io(&target, e))?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use std::io::{Cursor, Write};
    use std::sync::{Arc, Mutex};

    use docsmith_remote::RemoteDocsOptions;
    use serde_json::json;
    use tracing_subscriber::fmt::MakeWriter;
    use wiremock::matchers::{method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    use super::*;

    #[derive(Clone, Default)]
    struct LogBuffer(Arc<Mutex<Vec<u8>>>);

    impl LogBuffer {
        fn contents(&self) -> String {
            String::from_utf8_lossy(&self.0.lock().unwrap()).into_owned()
        }
    }

    impl Write for LogBuffer {
        fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
            self.0.lock().unwrap().extend_from_slice(buf);
            Ok(buf.len())
        }

        fn flush(&mut self) -> std::io::Result<()> {
            Ok(())
        }
    }

    impl<'a> MakeWriter<'a> for LogBuffer {
        type Writer = LogBuffer;

        fn make_writer(&'a self) -> Self::Writer {
            self.clone()
        }
    }

    fn builder_for(server: &MockServer) -> ReadTheDocsBuilder {
        let remote = RemoteDocsClient::new(RemoteDocsOptions {
            api_base_url: server.uri(),
            timeout_secs: 5,
            download_timeout_secs: 5,
            ..RemoteDocsOptions::default()
        })
        .unwrap();
        ReadTheDocsBuilder::new(remote)
    }

    fn html_zip() -> Vec<u8> {
        let mut writer = zip::ZipWriter::new(Cursor::new(Vec::new()));
        let options = zip::write::SimpleFileOptions::default();
        writer.start_file("black-stable/index.html", options).unwrap();
        writer.write_all(b"<html>black</html>").unwrap();
        writer.start_file("black-stable/api.html", options).unwrap();
        writer.write_all(b"<html>api</html>").unwrap();
        writer.finish().unwrap().into_inner()
    }

    #[tokio::test]
    async fn empty_slug_fails_without_network() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(200))
            .expect(0)
            .mount(&server)
            .await;

        let logs = LogBuffer::default();
        let subscriber = tracing_subscriber::fmt()
            .with_writer(logs.clone())
            .with_ansi(false)
            .finish();
        let _guard = tracing::subscriber::set_default(subscriber);

        let tmp = tempfile::tempdir().unwrap();
        let mut ctx = BuildContext::new("black", "23.1", tmp.path(), None);
        ctx.project_slug = "  ".into();
        ctx.doc_type = DocType::Readthedocs;

        let ok = builder_for(&server)
            .generate_docset(None, &ctx.staging_docs_dir, &ctx)
            .await;

        assert!(!ok);
        assert!(logs.contents().contains("project_slug is empty"));
    }

    #[tokio::test]
    async fn downloads_and_unpacks_html_archive() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/api/v3/projects/black/versions/"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "results": [{"slug": "stable", "active": true, "built": true}]
            })))
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/api/v3/versions/stable/"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "slug": "stable",
                "downloads": {"htmlzip": format!("{}/media/black.zip", server.uri())}
            })))
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/media/black.zip"))
            .respond_with(ResponseTemplate::new(200).set_body_bytes(html_zip()))
            .mount(&server)
            .await;

        let tmp = tempfile::tempdir().unwrap();
        let mut ctx = BuildContext::new("black", "23.1", tmp.path(), None);
        ctx.doc_type = DocType::Readthedocs;
        ctx.setup_directories().await.unwrap();

        let ok = builder_for(&server)
            .generate_docset(None, &ctx.staging_docs_dir, &ctx)
            .await;

        assert!(ok);
        assert!(ctx.staging_docs_dir.join("index.html").is_file());
        assert!(ctx.staging_docs_dir.join("api.html").is_file());
    }

    #[tokio::test]
    async fn unknown_project_reports_failure() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(404))
            .mount(&server)
            .await;

        let tmp = tempfile::tempdir().unwrap();
        let ctx = BuildContext::new("nope", "1.0", tmp.path(), None);
        let ok = builder_for(&server)
            .generate_docset(None, &ctx.staging_docs_dir, &ctx)
            .await;
        assert!(!ok);
    }

    #[tokio::test]
    async fn single_file_formats_are_copied() {
        let tmp = tempfile::tempdir().unwrap();
        let file = tmp.path().join("black-stable.pdf");
        std::fs::write(&file, b"%PDF").unwrap();
        let out = tmp.path().join("out");

        install_artifact(&file, &out).await.unwrap();
        assert!(out.join("black-stable.pdf").is_file());
    }
}
