//! Core domain types for DocSmith docsets.

use std::fmt;
use std::str::FromStr;
use std::sync::LazyLock;

use regex::Regex;
use serde::{Deserialize, Serialize};

use crate::error::{DocsetError, Result};

static UNSAFE_PATH_CHARS: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r#"[<>:"/\\|?*\s]+"#).expect("valid regex"));
static UNDERSCORE_RUNS: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"_+").expect("valid regex"));
static NAME_SEPARATORS: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"[-_.]+").expect("valid regex"));

// ---------------------------------------------------------------------------
// PackageIdentity
// ---------------------------------------------------------------------------

/// A `{name, version}` pair identifying at most one docset.
///
/// The name is folded to its canonical form (lowercase, runs of `-`, `_`, `.`
/// collapsed to a single `-`) so that `Foo_Bar` and `foo-bar` share a cache key.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct PackageIdentity {
    name: String,
    version: String,
}

impl PackageIdentity {
    /// Build a normalized identity. Empty names or versions are rejected.
    pub fn new(name: &str, version: &str) -> Result<Self> {
        let name = normalize_name(name);
        let version = version.trim().to_string();
        if name.is_empty() || version.is_empty() {
            return Err(DocsetError::validation(
                "package name and version must both be provided",
            ));
        }
        Ok(Self { name, version })
    }

    /// Canonical package name.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Version string, trimmed but otherwise verbatim.
    pub fn version(&self) -> &str {
        &self.version
    }
}

impl fmt::Display for PackageIdentity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {}", self.name, self.version)
    }
}

/// Fold a package name to its canonical form.
fn normalize_name(name: &str) -> String {
    NAME_SEPARATORS
        .replace_all(name.trim(), "-")
        .to_lowercase()
}

/// Make a string safe to use as a single path component.
///
/// Reserved characters and whitespace become `_`, runs of `_` collapse, and
/// leading/trailing `_` are trimmed. `.` and `..` never survive.
pub fn sanitize_path_component(raw: &str) -> String {
    let replaced = UNSAFE_PATH_CHARS.replace_all(raw, "_");
    let collapsed = UNDERSCORE_RUNS.replace_all(&replaced, "_");
    let trimmed = collapsed.trim_matches('_');
    match trimmed {
        "" => "unknown".to_string(),
        "." | ".." => "_".to_string(),
        other => other.to_string(),
    }
}

// ---------------------------------------------------------------------------
// DocType
// ---------------------------------------------------------------------------

/// Documentation framework detected for (or requested by) a project.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DocType {
    Sphinx,
    Mkdocs,
    Pdoc,
    Readthedocs,
    Docstrings,
    #[default]
    Unknown,
}

impl DocType {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Sphinx => "sphinx",
            Self::Mkdocs => "mkdocs",
            Self::Pdoc => "pdoc",
            Self::Readthedocs => "readthedocs",
            Self::Docstrings => "docstrings",
            Self::Unknown => "unknown",
        }
    }
}

impl fmt::Display for DocType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for DocType {
    type Err = DocsetError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "sphinx" => Ok(Self::Sphinx),
            "mkdocs" => Ok(Self::Mkdocs),
            "pdoc" => Ok(Self::Pdoc),
            "readthedocs" | "rtd" => Ok(Self::Readthedocs),
            "docstrings" => Ok(Self::Docstrings),
            "unknown" | "" => Ok(Self::Unknown),
            other => Err(DocsetError::validation(format!("unknown doc type '{other}'"))),
        }
    }
}

// ---------------------------------------------------------------------------
// Status enums
// ---------------------------------------------------------------------------

/// Caller-visible availability of a docset.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DocsetStatus {
    NotAvailable,
    Pending,
    Running,
    Available,
    Error,
}

impl DocsetStatus {
    /// Stable string used by the persistence layer.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::NotAvailable => "not_available",
            Self::Pending => "pending",
            Self::Running => "running",
            Self::Available => "available",
            Self::Error => "error",
        }
    }
}

impl fmt::Display for DocsetStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for DocsetStatus {
    type Err = DocsetError;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "not_available" => Ok(Self::NotAvailable),
            "pending" => Ok(Self::Pending),
            "running" => Ok(Self::Running),
            "available" => Ok(Self::Available),
            "error" => Ok(Self::Error),
            other => Err(DocsetError::validation(format!(
                "unknown docset status '{other}'"
            ))),
        }
    }
}

/// Lifecycle of a single build task.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BuildStatus {
    Pending,
    Running,
    Succeeded,
    Failed,
}

impl BuildStatus {
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Succeeded | Self::Failed)
    }
}

impl From<BuildStatus> for DocsetStatus {
    fn from(status: BuildStatus) -> Self {
        match status {
            BuildStatus::Pending => Self::Pending,
            BuildStatus::Running => Self::Running,
            BuildStatus::Succeeded => Self::Available,
            BuildStatus::Failed => Self::Error,
        }
    }
}
