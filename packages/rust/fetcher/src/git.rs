//! Git operations used by the clone strategies.
//!
//! Each invocation is bounded by the configured git timeout; interactive
//! credential prompts are disabled so an auth challenge fails fast.

use std::path::Path;
use std::time::Duration;

use docsmith_shared::{DocsetError, Result};
use tracing::debug;

use crate::process;

/// Thin async wrapper around the `git` binary.
#[derive(Debug, Clone)]
pub struct GitRunner {
    program: String,
    timeout: Duration,
}

impl GitRunner {
    pub fn new(timeout: Duration) -> Self {
        Self {
            program: "git".into(),
            timeout,
        }
    }

    /// `git clone --depth 1 --branch <reference> <url> <dest>`.
    pub async fn clone_shallow(&self, url: &str, reference: &str, dest: &Path) -> Result<()> {
        debug!(url, reference, "shallow clone");
        self.run(
            &[
                "clone",
                "--quiet",
                "--depth",
                "1",
                "--branch",
                reference,
                url,
                &path_arg(dest)?,
            ],
            None,
            "git clone --depth 1",
        )
        .await
    }

    /// `git clone <url> <dest>` with full history.
    pub async fn clone_full(&self, url: &str, dest: &Path) -> Result<()> {
        debug!(url, "full clone");
        self.run(
            &["clone", "--quiet", url, &path_arg(dest)?],
            None,
            "git clone",
        )
        .await
    }

    /// `git checkout <reference>` inside `repo`.
    pub async fn checkout(&self, repo: &Path, reference: &str) -> Result<()> {
        self.run(
            &["checkout", "--quiet", reference],
            Some(repo),
            "git checkout",
        )
        .await
    }

    async fn run(&self, args: &[&str], cwd: Option<&Path>, label: &str) -> Result<()> {
        let mut cmd = process::command(&self.program, cwd);
        cmd.args(args).env("GIT_TERMINAL_PROMPT", "0");
        process::run_checked(cmd, label, self.timeout).await?;
        Ok(())
    }
}

fn path_arg(path: &Path) -> Result<String> {
    path.to_str()
        .map(str::to_string)
        .ok_or_else(|| DocsetError::validation(format!("non UTF-8 path: {}", path.display())))
}

/// Strip the `.git` directory from a checked-out tree.
pub async fn strip_git_dir(tree: &Path) -> Result<()> {
    let git_dir = tree.join(".git");
    if tokio::fs::try_exists(&git_dir).await.unwrap_or(false) {
        tokio::fs::remove_dir_all(&git_dir)
            .await
            .map_err(|e| DocsetError::io(&git_dir, e))?;
    }
    Ok(())
}
