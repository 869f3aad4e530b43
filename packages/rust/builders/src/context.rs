//! Per-run build state threaded through the pipeline stages.

use std::path::{Path, PathBuf};

use docsmith_shared::{DocType, DocsetError, PackageIdentity, Result, sanitize_path_component};
use tracing::{debug, info, warn};

use crate::scan;

/// Shared scratch root under the docset directory.
pub const TEMP_DIR_NAME: &str = "_temp";

/// Directories under a source root that never hold the documented package.
const NON_PACKAGE_DIRS: [&str; 6] = ["tests", "test", "docs", "doc", "examples", "benchmarks"];

/// Known and discovered paths and metadata for one build of one identity.
///
/// Owned by a single pipeline run; never shared between concurrent builds.
#[derive(Debug, Clone)]
pub struct BuildContext {
    pub project_name: String,
    pub project_version: String,
    pub base_output_dir: PathBuf,
    pub vcs_url: Option<String>,

    /// Shared scratch root (`{base}/_temp`).
    pub temp_dir: PathBuf,
    /// This identity's scratch partition (`{temp_dir}/{name}/{version}`).
    pub work_dir: PathBuf,
    /// Where builders write; published to `final_docs_dir` on success.
    pub staging_docs_dir: PathBuf,
    /// `{base}/{name}/{version}`: the cache key.
    pub final_docs_dir: PathBuf,

    pub source_root: Option<PathBuf>,
    pub doc_source_root: Option<PathBuf>,
    pub sphinx_conf_path: Option<PathBuf>,
    pub mkdocs_conf_path: Option<PathBuf>,
    pub project_slug: String,
    pub doc_type: DocType,
}

impl BuildContext {
    /// Derive every path from the four inputs. Two contexts built from the
    /// same inputs always agree on `final_docs_dir`.
    pub fn new(
        project_name: &str,
        project_version: &str,
        base_output_dir: impl Into<PathBuf>,
        vcs_url: Option<String>,
    ) -> Self {
        let base_output_dir = base_output_dir.into();
        let name_dir = sanitize_path_component(project_name);
        let version_dir = sanitize_path_component(project_version);

        let temp_dir = base_output_dir.join(TEMP_DIR_NAME);
        let work_dir = temp_dir.join(&name_dir).join(&version_dir);
        let staging_docs_dir = work_dir.join("docs");
        let final_docs_dir = base_output_dir.join(&name_dir).join(&version_dir);

        Self {
            project_name: project_name.to_string(),
            project_version: project_version.to_string(),
            base_output_dir,
            vcs_url,
            temp_dir,
            work_dir,
            staging_docs_dir,
            final_docs_dir,
            source_root: None,
            doc_source_root: None,
            sphinx_conf_path: None,
            mkdocs_conf_path: None,
            project_slug: project_name.to_string(),
            doc_type: DocType::Unknown,
        }
    }

    pub fn for_identity(
        identity: &PackageIdentity,
        base_output_dir: impl Into<PathBuf>,
        vcs_url: Option<String>,
    ) -> Self {
        Self::new(identity.name(), identity.version(), base_output_dir, vcs_url)
    }

    /// Where the fetcher should place the source tree for this run.
    pub fn source_checkout_dir(&self) -> PathBuf {
        self.work_dir.join("source")
    }

    /// Reset this identity's scratch partition and create the staging dir.
    ///
    /// Only `work_dir` is wiped: other identities' partitions under
    /// `temp_dir` and the published `final_docs_dir` are left alone.
    pub async fn setup_directories(&self) -> Result<()> {
        if tokio::fs::try_exists(&self.work_dir).await.unwrap_or(false) {
            tokio::fs::remove_dir_all(&self.work_dir)
                .await
                .map_err(|e| DocsetError::io(&self.work_dir, e))?;
        }
        tokio::fs::create_dir_all(&self.staging_docs_dir)
            .await
            .map_err(|e| DocsetError::io(&self.staging_docs_dir, e))?;
        debug!(work_dir = %self.work_dir.display(), "build directories ready");
        Ok(())
    }

    /// Remove this identity's scratch partition, and its `{name}` parent
    /// when that becomes empty. Errors are logged, not returned.
    pub async fn cleanup(&self) {
        if let Err(e) = tokio::fs::remove_dir_all(&self.work_dir).await {
            if e.kind() != std::io::ErrorKind::NotFound {
                warn!(work_dir = %self.work_dir.display(), error = %e, "failed to clean work dir");
            }
        }
        if let Some(parent) = self.work_dir.parent() {
            // fails harmlessly while another version of this package is building
            let _ = tokio::fs::remove_dir(parent).await;
        }
    }

    /// Fill in `doc_source_root`, the tool config paths and `doc_type` from
    /// `source_root`. An explicitly requested `doc_type` is kept.
    pub fn detect_layout(&mut self) {
        let Some(root) = self.source_root.clone() else {
            return;
        };

        self.sphinx_conf_path = scan::find_sphinx_conf(&root);
        self.mkdocs_conf_path = scan::find_mkdocs_conf(&root);

        let sphinx = self
            .sphinx_conf_path
            .as_deref()
            .filter(|conf| scan::is_sphinx_conf(conf));

        let (detected, doc_root) = if let Some(conf) = sphinx {
            (DocType::Sphinx, conf.parent().map(Path::to_path_buf))
        } else if let Some(yml) = &self.mkdocs_conf_path {
            (DocType::Mkdocs, yml.parent().map(Path::to_path_buf))
        } else if scan::has_python_files(&root) {
            (DocType::Docstrings, Some(root.clone()))
        } else {
            (DocType::Unknown, None)
        };

        self.doc_source_root = doc_root;
        if self.doc_type == DocType::Unknown {
            self.doc_type = detected;
        }
        info!(
            name = %self.project_name,
            doc_type = %self.doc_type,
            sphinx_conf = ?self.sphinx_conf_path,
            mkdocs_conf = ?self.mkdocs_conf_path,
            "detected documentation layout"
        );
    }

    /// The importable module root inside `source_root`.
    ///
    /// Priority: a package directory (with `__init__.py`) directly under the
    /// root or under `src/`, preferring one named like the project; then a
    /// top-level `.py` file, `setup.py` or `pyproject.toml` (returns the
    /// root). `None` otherwise, with a warning.
    pub fn resolve_package_source_path(&self, project_name: &str) -> Option<PathBuf> {
        let Some(root) = self.source_root.as_deref().filter(|r| r.is_dir()) else {
            warn!("source_root is not set or not a directory");
            return None;
        };
        let variants = name_variants(project_name);

        for base in [root.to_path_buf(), root.join("src")] {
            let packages = package_dirs(&base);
            let named = packages.iter().find(|dir| {
                dir.file_name()
                    .and_then(|n| n.to_str())
                    .is_some_and(|n| variants.contains(&n.to_lowercase()))
            });
            if let Some(found) = named.or_else(|| packages.first()) {
                debug!(package = %found.display(), "resolved package directory");
                return Some(found.clone());
            }
        }

        if has_module_files(root) {
            debug!(root = %root.display(), "resolved single-module layout");
            return Some(root.to_path_buf());
        }

        warn!(root = %root.display(), project = project_name, "could not resolve a Python package root");
        None
    }

    /// Replace `final_docs_dir` with the staged artifact.
    ///
    /// An existing docset is moved aside first and restored if the swap
    /// fails, so a failed publish never loses a good docset.
    pub async fn publish(&self) -> Result<PathBuf> {
        let staged = &self.staging_docs_dir;
        if !dir_has_entries(staged).await {
            return Err(DocsetError::Build(format!(
                "no documentation was produced for {} {}",
                self.project_name, self.project_version
            )));
        }

        let target = &self.final_docs_dir;
        if let Some(parent) = target.parent() {
            tokio::fs::create_dir_all(parent)
                .await
                .map_err(|e| DocsetError::io(parent, e))?;
        }

        let backup = target.with_file_name(format!(
            ".{}.previous",
            target
                .file_name()
                .map(|n| n.to_string_lossy().into_owned())
                .unwrap_or_default()
        ));
        let _ = tokio::fs::remove_dir_all(&backup).await;

        let had_previous = tokio::fs::try_exists(target).await.unwrap_or(false);
        if had_previous {
            tokio::fs::rename(target, &backup)
                .await
                .map_err(|e| DocsetError::io(target, e))?;
        }

        if let Err(e) = tokio::fs::rename(staged, target).await {
            if had_previous {
                if let Err(restore) = tokio::fs::rename(&backup, target).await {
                    warn!(error = %restore, "failed to restore previous docset");
                }
            }
            return Err(DocsetError::io(target, e));
        }

        if had_previous {
            let _ = tokio::fs::remove_dir_all(&backup).await;
        }
        info!(path = %target.display(), "docset published");
        Ok(target.clone())
    }
}

/// Case-folded spellings a module for `name` might use on disk.
fn name_variants(name: &str) -> Vec<String> {
    let lower = name.trim().to_lowercase();
    let mut variants: Vec<String> = Vec::with_capacity(4);
    for candidate in [
        lower.replace('-', "_"),
        lower.replace('_', "-"),
        lower.replace(['-', '.'], "_"),
        lower.clone(),
    ] {
        if !variants.contains(&candidate) {
            variants.push(candidate);
        }
    }
    variants
}

/// Whether `root` looks like a single-module project: any top-level `.py`
/// file or a `pyproject.toml`.
fn has_module_files(root: &Path) -> bool {
    if root.join("pyproject.toml").is_file() {
        return true;
    }
    std::fs::read_dir(root).is_ok_and(|entries| {
        entries
            .flatten()
            .map(|e| e.path())
            .any(|p| p.is_file() && p.extension().is_some_and(|e| e == "py"))
    })
}

/// Subdirectories of `base` containing `__init__.py`, sorted, excluding
/// test and documentation directories.
fn package_dirs(base: &Path) -> Vec<PathBuf> {
    let Ok(entries) = std::fs::read_dir(base) else {
        return Vec::new();
    };
    let mut dirs: Vec<PathBuf> = entries
        .flatten()
        .map(|e| e.path())
        .filter(|p| p.is_dir() && p.join("__init__.py").is_file())
        .filter(|p| {
            p.file_name()
                .and_then(|n| n.to_str())
                .is_some_and(|n| !NON_PACKAGE_DIRS.contains(&n))
        })
        .collect();
    dirs.sort();
    dirs
}

/// Stems of top-level `.py` files, excluding packaging scripts.
pub(crate) fn top_level_modules(root: &Path) -> Vec<String> {
    let Ok(entries) = std::fs::read_dir(root) else {
        return Vec::new();
    };
    let mut stems: Vec<String> = entries
        .flatten()
        .map(|e| e.path())
        .filter(|p| p.is_file() && p.extension().is_some_and(|e| e == "py"))
        .filter_map(|p| p.file_stem().and_then(|s| s.to_str()).map(str::to_string))
        .filter(|s| !matches!(s.as_str(), "setup" | "conftest" | "noxfile" | "fabfile"))
        .collect();
    stems.sort();
    stems
}

async fn dir_has_entries(dir: &Path) -> bool {
    match tokio::fs::read_dir(dir).await {
        Ok(mut entries) => matches!(entries.next_entry().await, Ok(Some(_))),
        Err(_) => false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn write(root: &Path, rel: &str, content: &str) {
        let path = root.join(rel);
        std::fs::create_dir_all(path.parent().unwrap()).unwrap();
        std::fs::write(path, content).unwrap();
    }

    #[test]
    fn derived_paths_are_deterministic() {
        let a = BuildContext::new("requests", "2.25.1", "/data/docsets", None);
        let b = BuildContext::new("requests", "2.25.1", "/data/docsets", Some("x".into()));
        assert_eq!(a.final_docs_dir, b.final_docs_dir);
        assert_eq!(a.final_docs_dir, PathBuf::from("/data/docsets/requests/2.25.1"));
        assert_eq!(a.temp_dir, PathBuf::from("/data/docsets/_temp"));
        assert_eq!(a.work_dir, PathBuf::from("/data/docsets/_temp/requests/2.25.1"));
        assert_eq!(a.project_slug, "requests");
    }

    #[test]
    fn unsafe_components_are_sanitized() {
        let ctx = BuildContext::new("../evil", "1.0/../../x", "/d", None);
        assert!(ctx.final_docs_dir.starts_with("/d"));
        assert_eq!(ctx.final_docs_dir.components().count(), 4);
    }

    #[tokio::test]
    async fn setup_resets_only_own_partition() {
        let tmp = tempfile::tempdir().unwrap();
        let ctx = BuildContext::new("a", "1", tmp.path(), None);
        let other = BuildContext::new("b", "1", tmp.path(), None);

        other.setup_directories().await.unwrap();
        write(&other.staging_docs_dir, "index.html", "b");
        write(&ctx.work_dir, "stale.txt", "old");
        write(&ctx.final_docs_dir, "index.html", "published");

        ctx.setup_directories().await.unwrap();
        assert!(ctx.staging_docs_dir.is_dir());
        assert!(!ctx.work_dir.join("stale.txt").exists());
        assert!(other.staging_docs_dir.join("index.html").exists());
        assert!(ctx.final_docs_dir.join("index.html").exists());
    }

    #[tokio::test]
    async fn publish_replaces_previous_docset() {
        let tmp = tempfile::tempdir().unwrap();
        let ctx = BuildContext::new("a", "1", tmp.path(), None);
        write(&ctx.final_docs_dir, "old.html", "v1");

        ctx.setup_directories().await.unwrap();
        write(&ctx.staging_docs_dir, "index.html", "v2");
        let path = ctx.publish().await.unwrap();

        assert_eq!(path, ctx.final_docs_dir);
        assert!(path.join("index.html").exists());
        assert!(!path.join("old.html").exists());
        let leftovers: Vec<_> = std::fs::read_dir(path.parent().unwrap())
            .unwrap()
            .map(|e| e.unwrap().file_name())
            .collect();
        assert_eq!(leftovers.len(), 1);
    }

    #[tokio::test]
    async fn empty_staging_does_not_touch_previous_docset() {
        let tmp = tempfile::tempdir().unwrap();
        let ctx = BuildContext::new("a", "1", tmp.path(), None);
        write(&ctx.final_docs_dir, "index.html", "good");

        ctx.setup_directories().await.unwrap();
        assert!(ctx.publish().await.is_err());
        assert_eq!(
            std::fs::read_to_string(ctx.final_docs_dir.join("index.html")).unwrap(),
            "good"
        );
    }

    #[test]
    fn resolves_package_directory_first() {
        let tmp = tempfile::tempdir().unwrap();
        write(tmp.path(), "tests/__init__.py", "");
        write(tmp.path(), "my_pkg/__init__.py", "");
        write(tmp.path(), "helper.py", "");
        let mut ctx = BuildContext::new("my-pkg", "1", "/d", None);
        ctx.source_root = Some(tmp.path().to_path_buf());

        assert_eq!(
            ctx.resolve_package_source_path("my-pkg"),
            Some(tmp.path().join("my_pkg"))
        );
    }

    #[test]
    fn name_variants_have_no_repeats() {
        let variants = name_variants("zope.interface");
        assert_eq!(variants, vec!["zope.interface", "zope_interface"]);

        let variants = name_variants("my-pkg_name");
        for (i, v) in variants.iter().enumerate() {
            assert!(!variants[i + 1..].contains(v), "{v} repeated in {variants:?}");
        }
    }

    #[test]
    fn resolves_src_layout() {
        let tmp = tempfile::tempdir().unwrap();
        write(tmp.path(), "src/attrs/__init__.py", "");
        let mut ctx = BuildContext::new("attrs", "1", "/d", None);
        ctx.source_root = Some(tmp.path().to_path_buf());
        assert_eq!(
            ctx.resolve_package_source_path("attrs"),
            Some(tmp.path().join("src/attrs"))
        );
    }

    #[test]
    fn single_module_resolves_to_root() {
        let tmp = tempfile::tempdir().unwrap();
        write(tmp.path(), "Six.py", "");
        write(tmp.path(), "setup.py", "");
        let mut ctx = BuildContext::new("six", "1", "/d", None);
        ctx.source_root = Some(tmp.path().to_path_buf());
        assert_eq!(
            ctx.resolve_package_source_path("six"),
            Some(tmp.path().to_path_buf())
        );
    }

    #[test]
    fn packaging_files_resolve_to_root() {
        let tmp = tempfile::tempdir().unwrap();
        write(tmp.path(), "README.md", "");
        write(tmp.path(), "setup.py", "");
        let mut ctx = BuildContext::new("x", "1", "/d", None);
        ctx.source_root = Some(tmp.path().to_path_buf());
        assert_eq!(
            ctx.resolve_package_source_path("x"),
            Some(tmp.path().to_path_buf())
        );

        let poetry = tempfile::tempdir().unwrap();
        write(poetry.path(), "pyproject.toml", "[project]\nname = 'x'\n");
        ctx.source_root = Some(poetry.path().to_path_buf());
        assert_eq!(
            ctx.resolve_package_source_path("x"),
            Some(poetry.path().to_path_buf())
        );
    }

    #[test]
    fn nothing_importable_is_none() {
        let tmp = tempfile::tempdir().unwrap();
        write(tmp.path(), "README.md", "");
        let mut ctx = BuildContext::new("x", "1", "/d", None);
        ctx.source_root = Some(tmp.path().to_path_buf());
        assert_eq!(ctx.resolve_package_source_path("x"), None);

        ctx.source_root = None;
        assert_eq!(ctx.resolve_package_source_path("x"), None);
    }

    #[test]
    fn detect_layout_keeps_requested_doc_type() {
        let tmp = tempfile::tempdir().unwrap();
        write(tmp.path(), "docs/conf.py", "html_theme = 'furo'");
        let mut ctx = BuildContext::new("x", "1", "/d", None);
        ctx.source_root = Some(tmp.path().to_path_buf());
        ctx.detect_layout();
        assert_eq!(ctx.doc_type, DocType::Sphinx);
        assert_eq!(ctx.doc_source_root, Some(tmp.path().join("docs")));

        let mut rtd = BuildContext::new("x", "1", "/d", None);
        rtd.doc_type = DocType::Readthedocs;
        rtd.source_root = Some(tmp.path().to_path_buf());
        rtd.detect_layout();
        assert_eq!(rtd.doc_type, DocType::Readthedocs);
        assert!(rtd.sphinx_conf_path.is_some());
    }
}
