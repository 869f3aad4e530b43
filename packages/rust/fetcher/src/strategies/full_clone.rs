use std::path::Path;

use async_trait::async_trait;
use docsmith_shared::{DocsetError, Result};
use tracing::{debug, info};

use super::{FetchRequest, FetchStrategy, FetchedSource};
use crate::git::{GitRunner, strip_git_dir};
use crate::tags::tag_candidates;

/// Full-history clone followed by an explicit checkout of the release tag.
/// Slow, but tolerates servers that refuse shallow fetches of tags.
#[derive(Debug, Clone)]
pub struct FullClone {
    git: GitRunner,
}

impl FullClone {
    pub fn new(git: GitRunner) -> Self {
        Self { git }
    }
}

#[async_trait]
impl FetchStrategy for FullClone {
    fn name(&self) -> &'static str {
        "full_clone"
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

        self.git.clone_full(url, scratch).await?;

        for tag in tag_candidates(identity.name(), identity.version()) {
            match self.git.checkout(scratch, &tag).await {
                Ok(()) => {
                    strip_git_dir(scratch).await?;
                    info!(%identity, %tag, "checked out release tag");
                    return Ok(FetchedSource::default());
                }
                Err(e) => debug!(%tag, error = %e, "checkout failed"),
            }
        }

        Err(DocsetError::SourceUnavailable(format!(
            "no tag matching {} in {url}",
            identity.version()
        )))
    }
}
