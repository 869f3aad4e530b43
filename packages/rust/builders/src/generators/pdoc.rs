use std::ffi::OsString;
use std::path::{Path, PathBuf};

use async_trait::async_trait;
use tracing::{info, instrument, warn};

use super::{Builder, absolute, prepare_tools};
use crate::context::{BuildContext, top_level_modules};
use crate::scan;
use crate::venv::ToolOptions;

const PDOC_PACKAGES: [&str; 1] = ["pdoc3"];

/// Renders API docs straight from docstrings with `python -m pdoc`.
pub struct PdocBuilder {
    tools: ToolOptions,
}

impl PdocBuilder {
    pub fn new(tools: ToolOptions) -> Self {
        Self { tools }
    }
}

#[async_trait]
impl Builder for PdocBuilder {
    fn name(&self) -> &'static str {
        "pdoc"
    }

    fn can_handle(&self, _source_path: Option<&Path>, context: &BuildContext) -> bool {
        context
            .source_root
            .as_deref()
            .is_some_and(scan::has_python_files)
            && context
                .resolve_package_source_path(&context.project_name)
                .is_some()
    }

    #[instrument(skip_all, fields(name = %context.project_name, version = %context.project_version))]
    async fn generate_docset(
        &self,
        _source_path: Option<&Path>,
        output_path: &Path,
        context: &BuildContext,
    ) -> bool {
        let Some(resolved) = context.resolve_package_source_path(&context.project_name) else {
            return false;
        };
        let Some((import_root, module)) = import_target(&resolved, &context.project_name) else {
            warn!(path = %resolved.display(), "no importable module found");
            return false;
        };

        let Some(env) = prepare_tools(&self.tools, context, &PDOC_PACKAGES).await else {
            return false;
        };
        if let Some(root) = context.source_root.as_deref() {
            env.install_project_best_effort(root).await;
        }

        let out = absolute(output_path);
        let args: Vec<OsString> = vec![
            "--html".into(),
            "--force".into(),
            "--output-dir".into(),
            out.clone().into(),
            module.clone().into(),
        ];
        let pythonpath: OsString = absolute(&import_root).into();
        if let Err(e) = env
            .run_module("pdoc", &args, &import_root, &[("PYTHONPATH", pythonpath)])
            .await
        {
            warn!(%module, error = %e, "pdoc failed");
            return false;
        }

        if !scan::contains_html(&out) {
            warn!(output = %out.display(), "pdoc finished without producing HTML");
            return false;
        }
        info!(%module, output = %out.display(), "pdoc build complete");
        true
    }
}

/// Split a resolved module root into the directory to put on `PYTHONPATH`
/// and the module name to document.
///
/// A package directory yields `(parent, dirname)`. A source root holding
/// single-file modules yields `(root, stem)`, preferring the stem that
/// matches the project name. A root with only packaging files yields the
/// project's own module name, importable once the project is installed.
fn import_target(resolved: &Path, project_name: &str) -> Option<(PathBuf, String)> {
    if resolved.join("__init__.py").is_file() {
        let parent = resolved.parent()?.to_path_buf();
        let name = resolved.file_name()?.to_str()?.to_string();
        return Some((parent, name));
    }

    let wanted = project_name.trim().to_lowercase().replace(['-', '.'], "_");
    let modules = top_level_modules(resolved);
    let module = modules
        .iter()
        .find(|stem| stem.to_lowercase() == wanted)
        .or_else(|| modules.first())
        .cloned()
        .unwrap_or(wanted);
    if module.is_empty() {
        return None;
    }
    Some((resolved.to_path_buf(), module))
}
