use std::path::Path;

use async_trait::async_trait;
use docsmith_shared::{DocsetError, Result};
use tracing::{debug, info, warn};

use super::{FetchRequest, FetchStrategy, FetchedSource, clear_dir};
use crate::branch::BranchResolver;
use crate::git::{GitRunner, strip_git_dir};
use crate::tags::tag_candidates;

/// `git clone --depth 1` of a release tag, falling back to the default
/// branch candidates when no tag name matches.
#[derive(Debug, Clone)]
pub struct ShallowClone {
    git: GitRunner,
}

impl ShallowClone {
    pub fn new(git: GitRunner) -> Self {
        Self { git }
    }
}

#[async_trait]
impl FetchStrategy for ShallowClone {
    fn name(&self) -> &'static str {
        "shallow_clone"
    }

    fn is_applicable(&self, request: &FetchRequest) -> bool {
        request.vcs_url.is_some()
    }

    async fn fetch(&self, request: &FetchRequest, scratch: &Path) -> Result<FetchedSource> {
        let url = request
            .vcs_url
            .as_deref()
            .ok_or_else(|| DocsetError::SourceUnavailable("no repository URL".into()))?;
        let identity = &request.identity;

        let tags = tag_candidates(identity.name(), identity.version());
        let branches = BranchResolver::resolve(request.default_branch.as_deref());
        let refs = tags
            .iter()
            .map(|t| (t.as_str(), false))
            .chain(branches.iter().map(|b| (b.as_str(), true)));

        let mut last_error = None;
        for (reference, is_branch) in refs {
            match self.git.clone_shallow(url, reference, scratch).await {
                Ok(()) => {
                    strip_git_dir(scratch).await?;
                    if is_branch {
                        warn!(%identity, branch = reference, "no release tag found, using branch");
                    } else {
                        info!(%identity, tag = reference, "cloned release tag");
                    }
                    return Ok(FetchedSource {
                        from_default_branch: is_branch,
                    });
                }
                Err(e) => {
                    debug!(reference, error = %e, "shallow clone failed");
                    // timeouts will not improve with another ref
                    let timed_out = matches!(e, DocsetError::Timeout { .. });
                    clear_dir(scratch).await?;
                    last_error = Some(e);
                    if timed_out {
                        break;
                    }
                }
            }
        }

        Err(last_error.unwrap_or_else(|| {
            DocsetError::SourceUnavailable(format!("nothing to clone for {identity}"))
        }))
    }
}
