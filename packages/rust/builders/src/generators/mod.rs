//! Builder trait and built-in documentation generators.
//!
//! Builders are tried in priority order; the first whose `can_handle` is true
//! produces the docset. The remote pre-built builder comes first so that, when
//! it applies, local building is skipped entirely.

mod mkdocs;
mod pdoc;
mod readthedocs;
mod sphinx;

use std::path::{Path, PathBuf};

use async_trait::async_trait;
use docsmith_remote::RemoteDocsClient;
use tracing::warn;

use crate::context::BuildContext;
use crate::venv::{ToolEnv, ToolOptions};

pub use mkdocs::MkDocsBuilder;
pub use pdoc::PdocBuilder;
pub use readthedocs::ReadTheDocsBuilder;
pub use sphinx::SphinxBuilder;

// ---------------------------------------------------------------------------
// Trait
// ---------------------------------------------------------------------------

/// A strategy that knows how to produce a docset for one documentation
/// framework.
#[async_trait]
pub trait Builder: Send + Sync {
    /// Human-readable builder name for tracing and results.
    fn name(&self) -> &'static str;

    /// Cheap predicate over already-detected context. Must not mutate state
    /// or do more I/O than existence checks.
    fn can_handle(&self, source_path: Option<&Path>, context: &BuildContext) -> bool;

    /// Write a complete artifact tree under `output_path`.
    ///
    /// Expected failures (missing config, empty required field, tool error)
    /// are logged and reported as `false`.
    async fn generate_docset(
        &self,
        source_path: Option<&Path>,
        output_path: &Path,
        context: &BuildContext,
    ) -> bool;
}

// ---------------------------------------------------------------------------
// Registry
// ---------------------------------------------------------------------------

/// Holds registered builders in priority order.
pub struct BuilderRegistry {
    builders: Vec<Box<dyn Builder>>,
}

impl BuilderRegistry {
    /// All built-in builders: Read the Docs, Sphinx, MkDocs, pdoc.
    pub fn new(remote: RemoteDocsClient, tools: ToolOptions) -> Self {
        Self {
            builders: vec![
                Box::new(ReadTheDocsBuilder::new(remote)),
                Box::new(SphinxBuilder::new(tools.clone())),
                Box::new(MkDocsBuilder::new(tools.clone())),
                Box::new(PdocBuilder::new(tools)),
            ],
        }
    }

    /// A registry with a caller-supplied ordered list.
    pub fn with_builders(builders: Vec<Box<dyn Builder>>) -> Self {
        Self { builders }
    }

    /// First builder that can handle the context, if any.
    pub fn select(&self, source_path: Option<&Path>, context: &BuildContext) -> Option<&dyn Builder> {
        self.builders
            .iter()
            .find(|b| b.can_handle(source_path, context))
            .map(|b| b.as_ref())
    }

    pub fn names(&self) -> Vec<&'static str> {
        self.builders.iter().map(|b| b.name()).collect()
    }
}

// ---------------------------------------------------------------------------
// Helpers shared by the local builders
// ---------------------------------------------------------------------------

/// Prepare the interpreter under `{work_dir}/venv` and install `packages`.
/// Returns `None` (after logging) when either step fails.
pub(crate) async fn prepare_tools(
    opts: &ToolOptions,
    context: &BuildContext,
    packages: &[&str],
) -> Option<ToolEnv> {
    let env = match ToolEnv::prepare(opts, &context.work_dir.join("venv")).await {
        Ok(env) => env,
        Err(e) => {
            warn!(error = %e, "could not prepare python environment");
            return None;
        }
    };
    if let Err(e) = env.install(packages).await {
        warn!(error = %e, ?packages, "could not install documentation tools");
        return None;
    }
    Some(env)
}

/// Tools run with their own working directory, so output paths are made
/// absolute first.
pub(crate) fn absolute(path: &Path) -> PathBuf {
    std::path::absolute(path).unwrap_or_else(|_| path.to_path_buf())
}
