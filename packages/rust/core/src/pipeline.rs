//! End-to-end build pipeline: identity → source → layout → builder → docset.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::time::{Duration, Instant};

use tracing::{info, instrument};

use docsmith_builders::{BuildContext, BuilderRegistry, ToolOptions};
use docsmith_fetcher::{FetchOptions, FetchRequest, SourceFetcher};
use docsmith_remote::{RemoteDocsClient, RemoteDocsOptions, project_slug_from_url};
use docsmith_shared::{AppConfig, DocType, DocsetError, PackageIdentity, Result};

/// Everything known about a package before its docset is built.
#[derive(Debug, Clone)]
pub struct BuildRequest {
    pub identity: PackageIdentity,
    pub vcs_url: Option<String>,
    /// Documentation-host slug; defaults to the package name.
    pub project_slug: Option<String>,
    /// Project URLs from package metadata (label → URL).
    pub project_urls: HashMap<String, String>,
    pub default_branch: Option<String>,
    /// `Unknown` lets detection decide. `Readthedocs` skips fetching.
    pub doc_type_hint: DocType,
    /// A local tree to document instead of fetching one.
    pub source_path: Option<PathBuf>,
}

impl BuildRequest {
    pub fn new(identity: PackageIdentity) -> Self {
        Self {
            identity,
            vcs_url: None,
            project_slug: None,
            project_urls: HashMap::new(),
            default_branch: None,
            doc_type_hint: DocType::Unknown,
            source_path: None,
        }
    }
}

/// Result of a successful pipeline run.
#[derive(Debug, Clone)]
pub struct BuildArtifact {
    /// The published docset directory.
    pub path: PathBuf,
    pub builder: &'static str,
    /// Fetch strategy that produced the source, if one ran.
    pub strategy: Option<String>,
    pub elapsed: Duration,
}

/// Progress callback for reporting pipeline status.
pub trait ProgressReporter: Send + Sync {
    /// Called when entering a new phase.
    fn phase(&self, identity: &PackageIdentity, name: &str);
}

/// No-op progress reporter for headless/test usage.
pub struct SilentProgress;

impl ProgressReporter for SilentProgress {
    fn phase(&self, _identity: &PackageIdentity, _name: &str) {}
}

// ---------------------------------------------------------------------------
// Pipeline
// ---------------------------------------------------------------------------

/// The fetch → detect → build → publish sequence for one identity.
pub struct Pipeline {
    base_dir: PathBuf,
    fetcher: SourceFetcher,
    registry: BuilderRegistry,
}

impl Pipeline {
    pub fn new(base_dir: impl Into<PathBuf>, fetcher: SourceFetcher, registry: BuilderRegistry) -> Self {
        Self {
            base_dir: base_dir.into(),
            fetcher,
            registry,
        }
    }

    /// The standard fetch chain and builder registry for `config`.
    pub fn from_config(config: &AppConfig) -> Result<Self> {
        let fetcher = SourceFetcher::new(&FetchOptions::from(config))?;
        let remote = RemoteDocsClient::new(RemoteDocsOptions::from(config))?;
        let registry = BuilderRegistry::new(remote, ToolOptions::from(config));
        Ok(Self::new(config.docset_dir()?, fetcher, registry))
    }

    pub fn base_dir(&self) -> &Path {
        &self.base_dir
    }

    /// Where the docset for `identity` lives (the cache key).
    pub fn docset_path(&self, identity: &PackageIdentity) -> PathBuf {
        BuildContext::for_identity(identity, &self.base_dir, None).final_docs_dir
    }

    /// Run the pipeline. Scratch space is always cleaned up; a previously
    /// published docset is only replaced when the new build succeeds.
    #[instrument(skip_all, fields(name = %request.identity.name(), version = %request.identity.version()))]
    pub async fn run(
        &self,
        request: &BuildRequest,
        progress: &dyn ProgressReporter,
    ) -> Result<BuildArtifact> {
        let start = Instant::now();
        let mut ctx =
            BuildContext::for_identity(&request.identity, &self.base_dir, request.vcs_url.clone());
        ctx.doc_type = request.doc_type_hint;
        if let Some(slug) = request
            .project_slug
            .clone()
            .or_else(|| documentation_slug(&request.project_urls))
        {
            ctx.project_slug = slug;
        }

        ctx.setup_directories().await?;
        let result = self.stages(&mut ctx, request, progress).await;
        ctx.cleanup().await;

        let (builder, strategy) = result?;
        let elapsed = start.elapsed();
        info!(builder, ?strategy, elapsed_ms = elapsed.as_millis() as u64, "docset built");
        Ok(BuildArtifact {
            path: ctx.final_docs_dir.clone(),
            builder,
            strategy,
            elapsed,
        })
    }

    async fn stages(
        &self,
        ctx: &mut BuildContext,
        request: &BuildRequest,
        progress: &dyn ProgressReporter,
    ) -> Result<(&'static str, Option<String>)> {
        let identity = &request.identity;

        // --- Phase 1: Source ---
        let mut strategy = None;
        if let Some(path) = &request.source_path {
            if !path.is_dir() {
                return Err(DocsetError::validation(format!(
                    "source path {} is not a directory",
                    path.display()
                )));
            }
            ctx.source_root = Some(path.clone());
        } else if request.doc_type_hint != DocType::Readthedocs {
            progress.phase(identity, "Acquiring source");
            let mut fetch = FetchRequest::new(identity.clone());
            if let Some(url) = &request.vcs_url {
                fetch = fetch.with_vcs_url(url.as_str());
            }
            if let Some(branch) = &request.default_branch {
                fetch = fetch.with_default_branch(branch.as_str());
            }
            fetch.project_urls = request.project_urls.clone();

            let acquired = self.fetcher.fetch(fetch, &ctx.source_checkout_dir()).await;
            if !acquired.success {
                return Err(DocsetError::SourceUnavailable(acquired.failure_summary()));
            }
            ctx.source_root = acquired.path.clone();
            strategy = acquired.strategy_used.clone();
        }

        // --- Phase 2: Detection ---
        progress.phase(identity, "Detecting documentation layout");
        ctx.detect_layout();

        let source = ctx.source_root.clone();
        let Some(builder) = self.registry.select(source.as_deref(), ctx) else {
            return Err(DocsetError::UnsupportedDocType {
                name: identity.name().to_string(),
                version: identity.version().to_string(),
            });
        };

        // --- Phase 3: Build ---
        progress.phase(identity, &format!("Building with {}", builder.name()));
        let built = builder
            .generate_docset(source.as_deref(), &ctx.staging_docs_dir, ctx)
            .await;
        if !built {
            return Err(DocsetError::Build(format!(
                "{} builder did not produce documentation for {identity}",
                builder.name()
            )));
        }

        // --- Phase 4: Publish ---
        progress.phase(identity, "Publishing docset");
        ctx.publish().await?;
        Ok((builder.name(), strategy))
    }
}

/// Documentation-host slug from a `Documentation`/`Docs` project URL.
fn documentation_slug(project_urls: &HashMap<String, String>) -> Option<String> {
    let mut labels: Vec<&String> = project_urls.keys().collect();
    labels.sort();
    labels
        .into_iter()
        .filter(|label| {
            matches!(
                label.trim().to_ascii_lowercase().as_str(),
                "documentation" | "docs"
            )
        })
        .find_map(|label| project_slug_from_url(&project_urls[label]))
}
