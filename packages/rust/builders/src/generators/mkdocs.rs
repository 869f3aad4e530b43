use std::ffi::OsString;
use std::path::Path;
use std::sync::LazyLock;

use async_trait::async_trait;
use docsmith_shared::DocType;
use regex::Regex;
use tracing::{debug, info, instrument, warn};

use super::{Builder, absolute, prepare_tools};
use crate::context::BuildContext;
use crate::scan;
use crate::venv::ToolOptions;

/// `mkdocs.yml` fragments and the pip package each one requires.
const PLUGIN_PACKAGES: [(&str, &str); 9] = [
    ("mkdocstrings", "mkdocstrings[python]"),
    ("awesome-pages", "mkdocs-awesome-pages-plugin"),
    ("minify", "mkdocs-minify-plugin"),
    ("redirects", "mkdocs-redirects"),
    ("macros", "mkdocs-macros-plugin"),
    ("gen-files", "mkdocs-gen-files"),
    ("literate-nav", "mkdocs-literate-nav"),
    ("section-index", "mkdocs-section-index"),
    ("git-revision-date-localized", "mkdocs-git-revision-date-localized-plugin"),
];

static MATERIAL_THEME: LazyLock<Option<Regex>> = LazyLock::new(|| {
    Regex::new(r#"(?m)^theme:\s*(?:['"]?material\b|\n(?:[ \t]+.*\n)*?[ \t]+name:\s*['"]?material\b)"#)
        .ok()
});

/// Builds HTML with `python -m mkdocs build`.
pub struct MkDocsBuilder {
    tools: ToolOptions,
}

impl MkDocsBuilder {
    pub fn new(tools: ToolOptions) -> Self {
        Self { tools }
    }
}

#[async_trait]
impl Builder for MkDocsBuilder {
    fn name(&self) -> &'static str {
        "mkdocs"
    }

    fn can_handle(&self, _source_path: Option<&Path>, context: &BuildContext) -> bool {
        context.doc_type == DocType::Mkdocs && context.mkdocs_conf_path.is_some()
    }

    #[instrument(skip_all, fields(name = %context.project_name, version = %context.project_version))]
    async fn generate_docset(
        &self,
        _source_path: Option<&Path>,
        output_path: &Path,
        context: &BuildContext,
    ) -> bool {
        let Some(config) = context.mkdocs_conf_path.as_deref() else {
            warn!("no mkdocs.yml; nothing for mkdocs to build");
            return false;
        };
        let content = match tokio::fs::read_to_string(config).await {
            Ok(content) => content,
            Err(e) => {
                warn!(config = %config.display(), error = %e, "cannot read mkdocs config");
                return false;
            }
        };

        let packages = required_packages(&content);
        debug!(?packages, "mkdocs packages");
        let Some(env) = prepare_tools(&self.tools, context, &packages).await else {
            return false;
        };
        if let Some(root) = context.source_root.as_deref() {
            env.install_project_best_effort(root).await;
        }

        let cwd = config.parent().unwrap_or(Path::new("."));
        let out = absolute(output_path);
        let args: Vec<OsString> = vec![
            "build".into(),
            "--clean".into(),
            "--config-file".into(),
            absolute(config).into(),
            "--site-dir".into(),
            out.clone().into(),
        ];
        if let Err(e) = env.run_module("mkdocs", &args, cwd, &[]).await {
            warn!(error = %e, "mkdocs build failed");
            return false;
        }

        if !scan::contains_html(&out) {
            warn!(output = %out.display(), "mkdocs finished without producing HTML");
            return false;
        }
        info!(output = %out.display(), "mkdocs build complete");
        true
    }
}

/// Packages needed to build a site with this config: mkdocs itself, the
/// material theme when used, and any recognized plugins.
fn required_packages(config: &str) -> Vec<&'static str> {
    let mut packages = vec!["mkdocs"];
    if MATERIAL_THEME.as_ref().is_some_and(|re| re.is_match(config)) {
        packages.push("mkdocs-material");
    }
    for (marker, package) in PLUGIN_PACKAGES {
        if config.contains(marker) {
            packages.push(package);
        }
    }
    packages
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn plain_config_needs_only_mkdocs() {
        assert_eq!(required_packages("site_name: demo\n"), vec!["mkdocs"]);
    }

    #[test]
    fn material_theme_detected_in_both_forms() {
        let inline = "site_name: x\ntheme: material\n";
        assert!(required_packages(inline).contains(&"mkdocs-material"));

        let nested = "site_name: x\ntheme:\n  palette: {}\n  name: 'material'\n";
        assert!(required_packages(nested).contains(&"mkdocs-material"));

        let other = "site_name: x\ntheme:\n  name: readthedocs\n";
        assert!(!required_packages(other).contains(&"mkdocs-material"));
    }

    #[test]
    fn plugins_map_to_packages() {
        let config = "plugins:\n  - search\n  - mkdocstrings\n  - awesome-pages\n";
        assert_eq!(
            required_packages(config),
            vec!["mkdocs", "mkdocstrings[python]", "mkdocs-awesome-pages-plugin"]
        );
    }

    #[tokio::test]
    async fn tool_failure_reports_false() {
        let tmp = tempfile::tempdir().unwrap();
        let src = tmp.path().join("src");
        std::fs::create_dir_all(&src).unwrap();
        std::fs::write(src.join("mkdocs.yml"), "site_name: x\n").unwrap();

        let mut ctx = BuildContext::new("x", "1", tmp.path().join("out"), None);
        ctx.source_root = Some(src);
        ctx.detect_layout();
        assert_eq!(ctx.doc_type, DocType::Mkdocs);
        ctx.setup_directories().await.unwrap();

        let builder = MkDocsBuilder::new(ToolOptions {
            python: "docsmith-missing-python".into(),
            isolated_venv: false,
            tool_timeout_secs: 5,
            install_timeout_secs: 5,
        });
        assert!(builder.can_handle(None, &ctx));
        assert!(!builder.generate_docset(None, &ctx.staging_docs_dir, &ctx).await);
    }
}
