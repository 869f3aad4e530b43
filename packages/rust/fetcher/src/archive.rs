//! Archive download and safe extraction.
//!
//! Supports `.zip`, `.tar.gz`/`.tgz` and plain `.tar`. Member paths that are
//! absolute or contain `..` are rejected before anything is written.

use std::fs::File;
use std::io;
use std::path::{Component, Path, PathBuf};

use docsmith_shared::{DocsetError, Result};
use flate2::read::GzDecoder;
use reqwest::Client;
use tokio::io::AsyncWriteExt;
use tracing::debug;

/// Name used while hoisting the contents of a single top-level directory.
const UNWRAP_TMP: &str = ".docsmith-unwrap";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ArchiveKind {
    Zip,
    TarGz,
    Tar,
}

impl ArchiveKind {
    fn from_path(path: &Path) -> Option<Self> {
        let name = path.file_name()?.to_string_lossy().to_ascii_lowercase();
        if name.ends_with(".zip") {
            Some(Self::Zip)
        } else if name.ends_with(".tar.gz") || name.ends_with(".tgz") {
            Some(Self::TarGz)
        } else if name.ends_with(".tar") {
            Some(Self::Tar)
        } else {
            None
        }
    }
}

// ---------------------------------------------------------------------------
// Download
// ---------------------------------------------------------------------------

/// Stream `url` into `path`. A partial file is removed on any failure.
pub async fn download_to(client: &Client, url: &str, path: &Path) -> Result<u64> {
    let result = stream_to_file(client, url, path).await;
    if result.is_err() {
        let _ = tokio::fs::remove_file(path).await;
    }
    result
}

async fn stream_to_file(client: &Client, url: &str, path: &Path) -> Result<u64> {
    let mut response = client
        .get(url)
        .send()
        .await
        .map_err(|e| DocsetError::Network(format!("{url}: {e}")))?;

    let status = response.status();
    if !status.is_success() {
        return Err(DocsetError::Network(format!("{url}: HTTP {status}")));
    }

    if let Some(parent) = path.parent() {
        tokio::fs::create_dir_all(parent)
            .await
            .map_err(|e| DocsetError::io(parent, e))?;
    }
    let mut file = tokio::fs::File::create(path)
        .await
        .map_err(|e| DocsetError::io(path, e))?;

    let mut written = 0u64;
    while let Some(chunk) = response
        .chunk()
        .await
        .map_err(|e| DocsetError::Network(format!("{url}: failed to read body: {e}")))?
    {
        file.write_all(&chunk)
            .await
            .map_err(|e| DocsetError::io(path, e))?;
        written += chunk.len() as u64;
    }
    file.flush().await.map_err(|e| DocsetError::io(path, e))?;

    debug!(url, bytes = written, "download complete");
    Ok(written)
}

// ---------------------------------------------------------------------------
// Extraction
// ---------------------------------------------------------------------------

/// Extract `archive` into `dest` on the blocking pool.
pub async fn extract(archive: &Path, dest: &Path) -> Result<usize> {
    let archive = archive.to_path_buf();
    let dest = dest.to_path_buf();
    tokio::task::spawn_blocking(move || extract_blocking(&archive, &dest))
        .await
        .map_err(|e| DocsetError::Archive(format!("extraction task failed: {e}")))?
}

/// Extract `archive` into `dest`, returning the number of files written.
///
/// The format is chosen from the file name. Empty archives are an error.
pub fn extract_blocking(archive: &Path, dest: &Path) -> Result<usize> {
    let kind = ArchiveKind::from_path(archive).ok_or_else(|| {
        DocsetError::Archive(format!("unsupported archive format: {}", archive.display()))
    })?;

    std::fs::create_dir_all(dest).map_err(|e| DocsetError::io(dest, e))?;
    let file = File::open(archive).map_err(|e| DocsetError::io(archive, e))?;

    let count = match kind {
        ArchiveKind::Zip => extract_zip(file, dest)?,
        ArchiveKind::TarGz => extract_tar(tar::Archive::new(GzDecoder::new(file)), dest)?,
        ArchiveKind::Tar => extract_tar(tar::Archive::new(file), dest)?,
    };

    if count == 0 {
        return Err(DocsetError::Archive(format!(
            "archive contains no files: {}",
            archive.display()
        )));
    }
    Ok(count)
}

fn extract_tar<R: io::Read>(mut archive: tar::Archive<R>, dest: &Path) -> Result<usize> {
    let mut count = 0;
    let entries = archive.entries().map_err(archive_err)?;
    for entry in entries {
        let mut entry = entry.map_err(archive_err)?;
        let entry_type = entry.header().entry_type();
        // pax headers, links and devices are skipped
        if !entry_type.is_file() && !entry_type.is_dir() {
            continue;
        }

        let entry_path = entry.path().map_err(archive_err)?.into_owned();
        validate_entry_path(&entry_path)?;

        let target = dest.join(&entry_path);
        if let Some(parent) = target.parent() {
            std::fs::create_dir_all(parent).map_err(|e| DocsetError::io(parent, e))?;
        }
        entry.unpack(&target).map_err(|e| DocsetError::io(&target, e))?;
        if entry_type.is_file() {
            count += 1;
        }
    }
    Ok(count)
}

fn extract_zip(file: File, dest: &Path) -> Result<usize> {
    let mut archive = zip::ZipArchive::new(file).map_err(archive_err)?;
    let mut count = 0;
    for i in 0..archive.len() {
        let mut member = archive.by_index(i).map_err(archive_err)?;
        let entry_path = PathBuf::from(member.name());
        validate_entry_path(&entry_path)?;

        let target = dest.join(&entry_path);
        if member.is_dir() {
            std::fs::create_dir_all(&target).map_err(|e| DocsetError::io(&target, e))?;
            continue;
        }
        if let Some(parent) = target.parent() {
            std::fs::create_dir_all(parent).map_err(|e| DocsetError::io(parent, e))?;
        }
        let mut out = File::create(&target).map_err(|e| DocsetError::io(&target, e))?;
        io::copy(&mut member, &mut out).map_err(|e| DocsetError::io(&target, e))?;
        count += 1;
    }
    Ok(count)
}

fn archive_err(e: impl std::fmt::Display) -> DocsetError {
    DocsetError::Archive(e.to_string())
}

/// Reject member paths that are absolute or climb out via `..`.
fn validate_entry_path(path: &Path) -> Result<()> {
    let escapes = path.is_absolute()
        || path
            .components()
            .any(|c| matches!(c, Component::ParentDir | Component::RootDir | Component::Prefix(_)));
    if escapes {
        return Err(DocsetError::Archive(format!(
            "path traversal detected: {}",
            path.display()
        )));
    }
    Ok(())
}

/// If `dir` holds exactly one entry and it is a directory, move that
/// directory's contents up into `dir`. Returns whether anything moved.
///
/// Runs on the blocking pool; see [`unwrap_single_root_blocking`].
pub async fn unwrap_single_root(dir: &Path) -> Result<bool> {
    let dir = dir.to_path_buf();
    tokio::task::spawn_blocking(move || unwrap_single_root_blocking(&dir))
        .await
        .map_err(|e| DocsetError::Archive(format!("unwrap task failed: {e}")))?
}

pub fn unwrap_single_root_blocking(dir: &Path) -> Result<bool> {
    let mut entries = std::fs::read_dir(dir)
        .map_err(|e| DocsetError::io(dir, e))?
        .collect::<io::Result<Vec<_>>>()
        .map_err(|e| DocsetError::io(dir, e))?;

    if entries.len() != 1 {
        return Ok(false);
    }
    let only = entries.remove(0).path();
    if !only.is_dir() {
        return Ok(false);
    }

    let staging = dir.join(UNWRAP_TMP);
    std::fs::rename(&only, &staging).map_err(|e| DocsetError::io(&only, e))?;
    for child in std::fs::read_dir(&staging).map_err(|e| DocsetError::io(&staging, e))? {
        let child = child.map_err(|e| DocsetError::io(&staging, e))?;
        let target = dir.join(child.file_name());
        std::fs::rename(child.path(), &target).map_err(|e| DocsetError::io(&target, e))?;
    }
    std::fs::remove_dir(&staging).map_err(|e| DocsetError::io(&staging, e))?;
    Ok(true)
}

#[cfg(test)]
pub(crate) mod tests {
    use std::io::Write;

    use flate2::Compression;
    use flate2::write::GzEncoder;
    use wiremock::matchers::{method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    use super::*;

    /// Build a `.tar.gz` in memory from `(path, contents)` pairs.
    pub(crate) fn tar_gz(files: &[(&str, &str)]) -> Vec<u8> {
        let encoder = GzEncoder::new(Vec::new(), Compression::default());
        let mut builder = tar::Builder::new(encoder);
        for (name, contents) in files {
            let mut header = tar::Header::new_gnu();
            header.set_size(contents.len() as u64);
            header.set_mode(0o644);
            header.set_cksum();
            builder
                .append_data(&mut header, name, contents.as_bytes())
                .expect("append");
        }
        let encoder = builder.into_inner().expect("tar finish");
        encoder.finish().expect("gzip finish")
    }

    /// Build a `.zip` in memory from `(path, contents)` pairs.
    pub(crate) fn zip_bytes(files: &[(&str, &str)]) -> Vec<u8> {
        let mut writer = zip::ZipWriter::new(io::Cursor::new(Vec::new()));
        let options = zip::write::SimpleFileOptions::default();
        for (name, contents) in files {
            writer.start_file(*name, options).expect("start file");
            writer.write_all(contents.as_bytes()).expect("write");
        }
        writer.finish().expect("zip finish").into_inner()
    }

    #[test]
    fn extracts_tar_gz_and_unwraps_root() {
        let tmp = tempfile::tempdir().unwrap();
        let archive = tmp.path().join("src.tar.gz");
        std::fs::write(
            &archive,
            tar_gz(&[
                ("requests-2.25.1/setup.py", "version='2.25.1'"),
                ("requests-2.25.1/requests/__init__.py", ""),
            ]),
        )
        .unwrap();

        let dest = tmp.path().join("out");
        assert_eq!(extract_blocking(&archive, &dest).unwrap(), 2);
        assert!(unwrap_single_root_blocking(&dest).unwrap());
        assert!(dest.join("setup.py").is_file());
        assert!(dest.join("requests/__init__.py").is_file());
        assert!(!dest.join("requests-2.25.1").exists());
    }

    #[test]
    fn extracts_zip() {
        let tmp = tempfile::tempdir().unwrap();
        let archive = tmp.path().join("docs.zip");
        std::fs::write(
            &archive,
            zip_bytes(&[("index.html", "<html/>"), ("_static/a.css", "")]),
        )
        .unwrap();

        let dest = tmp.path().join("out");
        assert_eq!(extract_blocking(&archive, &dest).unwrap(), 2);
        assert!(!unwrap_single_root_blocking(&dest).unwrap());
        assert!(dest.join("index.html").is_file());
    }

    #[tokio::test]
    async fn async_extract_and_unwrap_use_blocking_pool() {
        let tmp = tempfile::tempdir().unwrap();
        let archive = tmp.path().join("site.zip");
        std::fs::write(&archive, zip_bytes(&[("site/index.html", "<html/>")])).unwrap();

        let dest = tmp.path().join("out");
        assert_eq!(extract(&archive, &dest).await.unwrap(), 1);
        assert!(unwrap_single_root(&dest).await.unwrap());
        assert!(dest.join("index.html").is_file());
        assert!(!unwrap_single_root(&dest).await.unwrap());
    }

    #[test]
    fn rejects_traversal_members() {
        assert!(validate_entry_path(Path::new("../escape.txt")).is_err());
        assert!(validate_entry_path(Path::new("a/../../escape.txt")).is_err());
        assert!(validate_entry_path(Path::new("/etc/passwd")).is_err());
        assert!(validate_entry_path(Path::new("pkg/mod.py")).is_ok());

        let tmp = tempfile::tempdir().unwrap();
        let archive = tmp.path().join("evil.zip");
        std::fs::write(&archive, zip_bytes(&[("../evil.txt", "x")])).unwrap();
        let err = extract_blocking(&archive, &tmp.path().join("out")).unwrap_err();
        assert!(err.to_string().contains("path traversal"));
        assert!(!tmp.path().join("evil.txt").exists());
    }

    #[test]
    fn unknown_format_is_rejected() {
        let tmp = tempfile::tempdir().unwrap();
        let archive = tmp.path().join("thing.rar");
        std::fs::write(&archive, b"nope").unwrap();
        assert!(matches!(
            extract_blocking(&archive, tmp.path()),
            Err(DocsetError::Archive(_))
        ));
    }

    #[tokio::test]
    async fn download_failure_leaves_no_file() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/missing.zip"))
            .respond_with(ResponseTemplate::new(404))
            .mount(&server)
            .await;

        let tmp = tempfile::tempdir().unwrap();
        let target = tmp.path().join("missing.zip");
        let client = Client::new();
        let err = download_to(&client, &format!("{}/missing.zip", server.uri()), &target)
            .await
            .unwrap_err();
        assert!(err.is_transient());
        assert!(!target.exists());
    }

    #[tokio::test]
    async fn download_writes_body() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/a.tar.gz"))
            .respond_with(ResponseTemplate::new(200).set_body_bytes(b"abc".to_vec()))
            .mount(&server)
            .await;

        let tmp = tempfile::tempdir().unwrap();
        let target = tmp.path().join("nested/a.tar.gz");
        let bytes = download_to(&Client::new(), &format!("{}/a.tar.gz", server.uri()), &target)
            .await
            .unwrap();
        assert_eq!(bytes, 3);
        assert_eq!(std::fs::read(&target).unwrap(), b"abc");
    }
}
