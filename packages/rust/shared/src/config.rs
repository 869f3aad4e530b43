//! Application configuration for DocSmith.
//!
//! User config lives at `~/.docsmith/docsmith.toml`.
//! CLI flags override config file values, which override defaults.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::error::{DocsetError, Result};

/// Default configuration file name.
const CONFIG_FILE_NAME: &str = "docsmith.toml";

/// Default config directory name under the user's home.
const CONFIG_DIR_NAME: &str = ".docsmith";

// ---------------------------------------------------------------------------
// Config structs (matching docsmith.toml schema)
// ---------------------------------------------------------------------------

/// Top-level application config, deserialized from TOML.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AppConfig {
    /// Global defaults.
    #[serde(default)]
    pub defaults: DefaultsConfig,

    /// Source acquisition settings.
    #[serde(default)]
    pub fetch: FetchConfig,

    /// Remote documentation provider settings.
    #[serde(default)]
    pub remote_docs: RemoteDocsConfig,

    /// Local documentation tool settings.
    #[serde(default)]
    pub build: BuildToolsConfig,
}

/// `[defaults]` section.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DefaultsConfig {
    /// Root of the docset cache (`{docset_dir}/{name}/{version}`).
    #[serde(default = "default_docset_dir")]
    pub docset_dir: String,

    /// Upper bound on builds running at the same time.
    #[serde(default = "default_max_concurrent_builds")]
    pub max_concurrent_builds: usize,
}

impl Default for DefaultsConfig {
    fn default() -> Self {
        Self {
            docset_dir: default_docset_dir(),
            max_concurrent_builds: default_max_concurrent_builds(),
        }
    }
}

fn default_docset_dir() -> String {
    "~/.docsmith/docsets".into()
}
fn default_max_concurrent_builds() -> usize {
    2
}

/// `[fetch]` section.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FetchConfig {
    /// Timeout for each HTTP request made while fetching sources.
    #[serde(default = "default_http_timeout")]
    pub http_timeout_secs: u64,

    /// Timeout for each git invocation.
    #[serde(default = "default_git_timeout")]
    pub git_timeout_secs: u64,

    /// Host serving tag archives (`{base}/{owner}/{repo}/archive/...`).
    #[serde(default = "default_archive_base_url")]
    pub archive_base_url: String,

    /// Package registry used for sdists and project URLs.
    #[serde(default = "default_registry_url")]
    pub registry_url: String,

    /// Try the registry sdist before any VCS strategy.
    #[serde(default)]
    pub prefer_sdist: bool,

    /// Upper bound on a single strategy attempt, across all of its candidates.
    #[serde(default = "default_strategy_timeout")]
    pub strategy_timeout_secs: u64,
}

impl Default for FetchConfig {
    fn default() -> Self {
        Self {
            http_timeout_secs: default_http_timeout(),
            git_timeout_secs: default_git_timeout(),
            archive_base_url: default_archive_base_url(),
            registry_url: default_registry_url(),
            prefer_sdist: false,
            strategy_timeout_secs: default_strategy_timeout(),
        }
    }
}

fn default_http_timeout() -> u64 {
    60
}
fn default_git_timeout() -> u64 {
    300
}
fn default_strategy_timeout() -> u64 {
    900
}
fn default_archive_base_url() -> String {
    "https://github.com".into()
}
fn default_registry_url() -> String {
    "https://pypi.org".into()
}

/// `[remote_docs]` section.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RemoteDocsConfig {
    /// Documentation host API root.
    #[serde(default = "default_api_base_url")]
    pub api_base_url: String,

    /// Version slugs to prefer, in order.
    #[serde(default = "default_preferred_versions")]
    pub preferred_versions: Vec<String>,

    /// Offline format to download (`htmlzip`, `pdf`, `epub`).
    #[serde(default = "default_download_format")]
    pub download_format: String,

    /// Timeout for API calls.
    #[serde(default = "default_http_timeout")]
    pub timeout_secs: u64,

    /// Timeout for the archive download itself.
    #[serde(default = "default_download_timeout")]
    pub download_timeout_secs: u64,
}

impl Default for RemoteDocsConfig {
    fn default() -> Self {
        Self {
            api_base_url: default_api_base_url(),
            preferred_versions: default_preferred_versions(),
            download_format: default_download_format(),
            timeout_secs: default_http_timeout(),
            download_timeout_secs: default_download_timeout(),
        }
    }
}

fn default_api_base_url() -> String {
    "https://readthedocs.org".into()
}
fn default_preferred_versions() -> Vec<String> {
    vec!["stable".into(), "latest".into()]
}
fn default_download_format() -> String {
    "htmlzip".into()
}
fn default_download_timeout() -> u64 {
    300
}

/// `[build]` section.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BuildToolsConfig {
    /// Python interpreter used to run documentation tools.
    #[serde(default = "default_python")]
    pub python: String,

    /// Create a throwaway virtualenv per build and install tools into it.
    #[serde(default = "default_true")]
    pub isolated_venv: bool,

    /// Timeout for a documentation tool run.
    #[serde(default = "default_tool_timeout")]
    pub tool_timeout_secs: u64,

    /// Timeout for venv creation and each pip install.
    #[serde(default = "default_tool_timeout")]
    pub install_timeout_secs: u64,
}

impl Default for BuildToolsConfig {
    fn default() -> Self {
        Self {
            python: default_python(),
            isolated_venv: true,
            tool_timeout_secs: default_tool_timeout(),
            install_timeout_secs: default_tool_timeout(),
        }
    }
}

fn default_python() -> String {
    "python3".into()
}
fn default_true() -> bool {
    true
}
fn default_tool_timeout() -> u64 {
    900
}

impl AppConfig {
    /// The docset root with `~/` expanded.
    pub fn docset_dir(&self) -> Result<PathBuf> {
        if self.defaults.docset_dir.trim().is_empty() {
            return Err(DocsetError::config("defaults.docset_dir is empty"));
        }
        expand_home(&self.defaults.docset_dir)
    }
}

// ---------------------------------------------------------------------------
// Config loading
// ---------------------------------------------------------------------------

/// Get the path to the config directory (`~/.docsmith/`).
pub fn config_dir() -> Result<PathBuf> {
    let home =
        dirs::home_dir().ok_or_else(|| DocsetError::config("could not determine home directory"))?;
    Ok(home.join(CONFIG_DIR_NAME))
}

/// Get the path to the config file (`~/.docsmith/docsmith.toml`).
pub fn config_file_path() -> Result<PathBuf> {
    Ok(config_dir()?.join(CONFIG_FILE_NAME))
}

/// Expand a leading `~/` to the user's home directory.
pub fn expand_home(raw: &str) -> Result<PathBuf> {
    match raw.strip_prefix("~/") {
        Some(rest) => {
            let home = dirs::home_dir()
                .ok_or_else(|| DocsetError::config("could not determine home directory"))?;
            Ok(home.join(rest))
        }
        None => Ok(PathBuf::from(raw)),
    }
}

/// Load the application config from disk. Returns defaults if the file does not exist.
pub fn load_config() -> Result<AppConfig> {
    let path = config_file_path()?;

    if !path.exists() {
        tracing::debug!(?path, "config file not found, using defaults");
        return Ok(AppConfig::default());
    }

    load_config_from(&path)
}

/// Load the application config from a specific file path.
pub fn load_config_from(path: &Path) -> Result<AppConfig> {
    let content = std::fs::read_to_string(path).map_err(|e| DocsetError::io(path, e))?;

    toml::from_str(&content)
        .map_err(|e| DocsetError::config(format!("failed to parse {}: {e}", path.display())))
}

/// Create the config directory and write a default config file.
/// Returns the path to the created file.
pub fn init_config() -> Result<PathBuf> {
    let dir = config_dir()?;
    std::fs::create_dir_all(&dir).map_err(|e| DocsetError::io(&dir, e))?;

    let path = dir.join(CONFIG_FILE_NAME);
    let config = AppConfig::default();
    let content =
        toml::to_string_pretty(&config).map_err(|e| DocsetError::config(e.to_string()))?;

    std::fs::write(&path, content).map_err(|e| DocsetError::io(&path, e))?;
    tracing::info!(?path, "created default config file");

    Ok(path)
}
