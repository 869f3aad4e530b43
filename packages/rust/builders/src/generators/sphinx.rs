use std::ffi::OsString;
use std::path::{Path, PathBuf};

use async_trait::async_trait;
use docsmith_shared::DocType;
use tracing::{info, instrument, warn};

use super::{Builder, absolute, prepare_tools};
use crate::context::BuildContext;
use crate::scan;
use crate::venv::ToolOptions;

const SPHINX_PACKAGES: [&str; 2] = ["sphinx", "sphinx-rtd-theme"];

/// Documentation-only requirement files, relative to the source root.
const DOC_REQUIREMENTS: [&str; 8] = [
    "docs/requirements.txt",
    "doc/requirements.txt",
    "docs/requirements-docs.txt",
    "requirements-docs.txt",
    "requirements_docs.txt",
    "requirements/docs.txt",
    "docs-requirements.txt",
    "doc-requirements.txt",
];

/// Builds HTML with `python -m sphinx`.
pub struct SphinxBuilder {
    tools: ToolOptions,
}

impl SphinxBuilder {
    pub fn new(tools: ToolOptions) -> Self {
        Self { tools }
    }
}

#[async_trait]
impl Builder for SphinxBuilder {
    fn name(&self) -> &'static str {
        "sphinx"
    }

    fn can_handle(&self, _source_path: Option<&Path>, context: &BuildContext) -> bool {
        context.doc_type == DocType::Sphinx && context.sphinx_conf_path.is_some()
    }

    #[instrument(skip_all, fields(name = %context.project_name, version = %context.project_version))]
    async fn generate_docset(
        &self,
        _source_path: Option<&Path>,
        output_path: &Path,
        context: &BuildContext,
    ) -> bool {
        let Some(conf) = context.sphinx_conf_path.as_deref() else {
            warn!("no conf.py; nothing for sphinx to build");
            return false;
        };
        let Some(doc_src) = context
            .doc_source_root
            .clone()
            .or_else(|| conf.parent().map(Path::to_path_buf))
        else {
            warn!(conf = %conf.display(), "conf.py has no parent directory");
            return false;
        };

        let Some(env) = prepare_tools(&self.tools, context, &SPHINX_PACKAGES).await else {
            return false;
        };
        if let Some(root) = context.source_root.as_deref() {
            for file in doc_requirements(root, &doc_src) {
                if let Err(e) = env.install_requirements(&file).await {
                    warn!(file = %file.display(), error = %e, "doc requirements install failed; continuing");
                }
            }
            env.install_project_best_effort(root).await;
        }

        let out = absolute(output_path);
        let args: Vec<OsString> = vec![
            "-b".into(),
            "html".into(),
            "-q".into(),
            absolute(&doc_src).into(),
            out.clone().into(),
        ];
        if let Err(e) = env
            .run_module("sphinx", &args, &doc_src, &[("LC_ALL", "C".into())])
            .await
        {
            warn!(error = %e, "sphinx build failed");
            return false;
        }

        if !scan::contains_html(&out) {
            warn!(output = %out.display(), "sphinx finished without producing HTML");
            return false;
        }
        info!(output = %out.display(), "sphinx build complete");
        true
    }
}

/// Requirement files that exist for this tree, plus `requirements.txt` next
/// to `conf.py`.
fn doc_requirements(root: &Path, doc_src: &Path) -> Vec<PathBuf> {
    let mut files: Vec<PathBuf> = Vec::new();
    let candidates = DOC_REQUIREMENTS
        .iter()
        .map(|rel| root.join(rel))
        .chain(std::iter::once(doc_src.join("requirements.txt")));
    for path in candidates {
        if path.is_file() && !files.contains(&path) {
            files.push(path);
        }
    }
    files
}
