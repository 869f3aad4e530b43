//! Python tool environment for local builders.
//!
//! With `isolated_venv` on, each build gets a throwaway virtualenv under its
//! work directory and installs its tools there. Otherwise the configured
//! interpreter is used as-is and nothing is installed.

use std::ffi::OsString;
use std::path::{Path, PathBuf};
use std::time::Duration;

use docsmith_fetcher::process;
use docsmith_shared::{AppConfig, Result};
use tracing::{info, warn};

/// Runtime settings for running documentation tools.
#[derive(Debug, Clone)]
pub struct ToolOptions {
    pub python: String,
    pub isolated_venv: bool,
    pub tool_timeout_secs: u64,
    pub install_timeout_secs: u64,
}

impl From<&AppConfig> for ToolOptions {
    fn from(config: &AppConfig) -> Self {
        let build = &config.build;
        Self {
            python: build.python.clone(),
            isolated_venv: build.isolated_venv,
            tool_timeout_secs: build.tool_timeout_secs,
            install_timeout_secs: build.install_timeout_secs,
        }
    }
}

impl Default for ToolOptions {
    fn default() -> Self {
        Self::from(&AppConfig::default())
    }
}

/// An interpreter ready to run documentation tools.
#[derive(Debug, Clone)]
pub struct ToolEnv {
    python: String,
    isolated: bool,
    tool_timeout: Duration,
    install_timeout: Duration,
}

impl ToolEnv {
    /// Create the environment, building a venv at `venv_dir` when isolated.
    pub async fn prepare(opts: &ToolOptions, venv_dir: &Path) -> Result<Self> {
        let install_timeout = Duration::from_secs(opts.install_timeout_secs);
        let tool_timeout = Duration::from_secs(opts.tool_timeout_secs);

        if !opts.isolated_venv {
            return Ok(Self {
                python: opts.python.clone(),
                isolated: false,
                tool_timeout,
                install_timeout,
            });
        }

        let mut cmd = process::command(&opts.python, None);
        cmd.arg("-m").arg("venv").arg(venv_dir);
        process::run_checked(cmd, "python -m venv", install_timeout).await?;
        info!(venv = %venv_dir.display(), "created isolated virtualenv");

        Ok(Self {
            python: venv_python(venv_dir).to_string_lossy().into_owned(),
            isolated: true,
            tool_timeout,
            install_timeout,
        })
    }

    pub fn python(&self) -> &str {
        &self.python
    }

    pub fn is_isolated(&self) -> bool {
        self.isolated
    }

    /// `pip install` the given requirement specifiers. No-op outside a venv.
    pub async fn install(&self, packages: &[&str]) -> Result<()> {
        if !self.isolated || packages.is_empty() {
            return Ok(());
        }
        let mut cmd = process::command(&self.python, None);
        cmd.args(["-m", "pip", "install", "--quiet", "--disable-pip-version-check"])
            .args(packages);
        process::run_checked(cmd, "pip install", self.install_timeout).await?;
        Ok(())
    }

    /// `pip install -r <file>`. No-op outside a venv.
    pub async fn install_requirements(&self, file: &Path) -> Result<()> {
        if !self.isolated {
            return Ok(());
        }
        let mut cmd = process::command(&self.python, file.parent());
        cmd.args(["-m", "pip", "install", "--quiet", "--disable-pip-version-check", "-r"])
            .arg(file);
        process::run_checked(cmd, "pip install -r", self.install_timeout).await?;
        Ok(())
    }

    /// Install the project itself so autodoc-style tools can import it.
    /// Failures are logged; many projects document fine without it.
    pub async fn install_project_best_effort(&self, root: &Path) {
        if !self.isolated {
            return;
        }
        if !root.join("setup.py").is_file() && !root.join("pyproject.toml").is_file() {
            return;
        }
        let mut cmd = process::command(&self.python, Some(root));
        cmd.args(["-m", "pip", "install", "--quiet", "--disable-pip-version-check"])
            .arg(root);
        let result = process::run_checked(cmd, "pip install project", self.install_timeout).await;
        if let Err(e) = result {
            warn!(root = %root.display(), error = %e, "project install failed; continuing");
        }
    }

    /// Run `python -m <module> <args>` in `cwd` with extra environment.
    pub async fn run_module(
        &self,
        module: &str,
        args: &[OsString],
        cwd: &Path,
        envs: &[(&str, OsString)],
    ) -> Result<String> {
        let mut cmd = process::command(&self.python, Some(cwd));
        cmd.arg("-m").arg(module).args(args);
        for (key, value) in envs {
            cmd.env(key, value);
        }
        process::run_checked(cmd, module, self.tool_timeout).await
    }
}

fn venv_python(venv_dir: &Path) -> PathBuf {
    if cfg!(windows) {
        venv_dir.join("Scripts").join("python.exe")
    } else {
        venv_dir.join("bin").join("python")
    }
}
