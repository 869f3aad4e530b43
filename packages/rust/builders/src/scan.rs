//! Lightweight detection of documentation layouts in a source tree.

use std::path::{Path, PathBuf};
use std::sync::LazyLock;

use regex::Regex;
use tracing::debug;

const SPHINX_CONF: &str = "conf.py";
const MKDOCS_CONFIGS: [&str; 2] = ["mkdocs.yml", "mkdocs.yaml"];
const READTHEDOCS_CONFIGS: [&str; 2] = [".readthedocs.yaml", ".readthedocs.yml"];

/// Where `conf.py` usually lives, checked before the recursive search.
const SPHINX_CONF_DIRS: [&str; 5] = ["docs", "doc", "Doc", "docs/source", ""];

/// Directories never descended into while searching.
const SKIP_DIRS: [&str; 12] = [
    ".git",
    ".hg",
    ".tox",
    ".nox",
    ".venv",
    "venv",
    "node_modules",
    "build",
    "dist",
    "_build",
    "site-packages",
    "__pycache__",
];

/// Recursive searches stop this many levels below the root.
const MAX_SEARCH_DEPTH: usize = 4;

/// Common `conf.py` assignments; three or more is a strong Sphinx signal.
const COMMON_SPHINX_VARS: [&str; 9] = [
    "project =",
    "copyright =",
    "author =",
    "source_suffix =",
    "master_doc =",
    "version =",
    "release =",
    "templates_path =",
    "exclude_patterns =",
];
const COMMON_VARS_THRESHOLD: usize = 3;

static SPHINX_MARKERS: LazyLock<Vec<Regex>> = LazyLock::new(|| {
    [
        r#"(?s)extensions\s*=\s*\[.*?['"]sphinx\.ext\.(autodoc|napoleon|intersphinx|viewcode|todo|coverage)['"].*?\]"#,
        r#"html_theme\s*=\s*['"](alabaster|sphinx_rtd_theme|furo|pydata_sphinx_theme)['"]"#,
        r"https://www\.sphinx-doc\.org/en/master/usage/configuration\.html",
        r"import os\s*;\s*import sys\s*;\s*sys\.path\.insert\(0,\s*os\.path\.abspath\(",
    ]
    .iter()
    .filter_map(|p| Regex::new(p).ok())
    .collect()
});

/// True if `conf.py` content carries strong Sphinx markers.
pub fn is_sphinx_conf_content(content: &str) -> bool {
    if SPHINX_MARKERS.iter().any(|re| re.is_match(content)) {
        return true;
    }
    let score = COMMON_SPHINX_VARS
        .iter()
        .filter(|var| content.contains(*var))
        .count();
    score >= COMMON_VARS_THRESHOLD
}

/// Read `path` and check it for Sphinx markers. Unreadable files are not Sphinx.
pub fn is_sphinx_conf(path: &Path) -> bool {
    match std::fs::read(path) {
        Ok(bytes) => is_sphinx_conf_content(&String::from_utf8_lossy(&bytes)),
        Err(e) => {
            debug!(path = %path.display(), error = %e, "cannot read conf.py");
            false
        }
    }
}

/// Locate a Sphinx `conf.py`: well-known directories first, then a bounded
/// recursive search. A conf with strong markers beats one without.
pub fn find_sphinx_conf(root: &Path) -> Option<PathBuf> {
    let mut candidates: Vec<PathBuf> = SPHINX_CONF_DIRS
        .iter()
        .map(|dir| root.join(dir).join(SPHINX_CONF))
        .filter(|p| p.is_file())
        .collect();
    if candidates.is_empty() {
        walk(root, 0, &mut |path| {
            if path.file_name().is_some_and(|n| n == SPHINX_CONF) {
                candidates.push(path.to_path_buf());
            }
        });
        candidates.sort();
    }

    candidates
        .iter()
        .find(|p| is_sphinx_conf(p))
        .or_else(|| candidates.first())
        .cloned()
}

/// Locate `mkdocs.yml` / `mkdocs.yaml` at the root or under `docs/`.
pub fn find_mkdocs_conf(root: &Path) -> Option<PathBuf> {
    [root.to_path_buf(), root.join("docs")]
        .iter()
        .flat_map(|dir| MKDOCS_CONFIGS.iter().map(move |name| dir.join(name)))
        .find(|p| p.is_file())
}

/// True if the tree root carries a Read the Docs configuration file.
pub fn has_readthedocs_config(root: &Path) -> bool {
    READTHEDOCS_CONFIGS.iter().any(|name| root.join(name).is_file())
}

/// True if any `.py` file exists within the search depth.
pub fn has_python_files(root: &Path) -> bool {
    let mut found = false;
    walk(root, 0, &mut |path| {
        if !found && path.extension().is_some_and(|e| e == "py") {
            found = true;
        }
    });
    found
}

/// True if `dir` contains at least one `.html` file at any depth.
pub fn contains_html(dir: &Path) -> bool {
    let Ok(entries) = std::fs::read_dir(dir) else {
        return false;
    };
    entries.flatten().any(|entry| {
        let path = entry.path();
        if path.is_dir() {
            contains_html(&path)
        } else {
            path.extension().is_some_and(|e| e == "html")
        }
    })
}

/// Visit every file under `dir` up to [`MAX_SEARCH_DEPTH`], skipping VCS,
/// virtualenv and build output directories.
fn walk(dir: &Path, depth: usize, visit: &mut dyn FnMut(&Path)) {
    if depth > MAX_SEARCH_DEPTH {
        return;
    }
    let Ok(entries) = std::fs::read_dir(dir) else {
        return;
    };
    let mut paths: Vec<PathBuf> = entries.flatten().map(|e| e.path()).collect();
    paths.sort();
    for path in paths {
        if path.is_dir() {
            let skip = path
                .file_name()
                .and_then(|n| n.to_str())
                .is_some_and(|n| SKIP_DIRS.contains(&n));
            if !skip {
                walk(&path, depth + 1, visit);
            }
        } else {
            visit(&path);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn write(root: &Path, rel: &str, content: &str) {
        let path = root.join(rel);
        std::fs::create_dir_all(path.parent().unwrap()).unwrap();
        std::fs::write(path, content).unwrap();
    }

    #[test]
    fn strong_markers_detect_sphinx() {
        assert!(is_sphinx_conf_content(
            "extensions = [\n    'sphinx.ext.autodoc',\n]\n"
        ));
        assert!(is_sphinx_conf_content("html_theme = 'furo'"));
        assert!(is_sphinx_conf_content(
            "project = 'x'\ncopyright = '2020'\nauthor = 'me'\n"
        ));
        assert!(!is_sphinx_conf_content("project = 'x'\nDEBUG = True\n"));
    }

    #[test]
    fn finds_conf_in_docs_dir() {
        let tmp = tempfile::tempdir().unwrap();
        write(tmp.path(), "docs/conf.py", "html_theme = 'alabaster'");
        assert_eq!(
            find_sphinx_conf(tmp.path()),
            Some(tmp.path().join("docs/conf.py"))
        );
    }

    #[test]
    fn recursive_search_skips_venvs() {
        let tmp = tempfile::tempdir().unwrap();
        write(tmp.path(), ".venv/lib/conf.py", "html_theme = 'furo'");
        assert_eq!(find_sphinx_conf(tmp.path()), None);

        write(tmp.path(), "documentation/sphinx/conf.py", "html_theme = 'furo'");
        assert_eq!(
            find_sphinx_conf(tmp.path()),
            Some(tmp.path().join("documentation/sphinx/conf.py"))
        );
    }

    #[test]
    fn mkdocs_and_readthedocs_configs() {
        let tmp = tempfile::tempdir().unwrap();
        assert_eq!(find_mkdocs_conf(tmp.path()), None);
        assert!(!has_readthedocs_config(tmp.path()));

        write(tmp.path(), "docs/mkdocs.yaml", "site_name: x");
        write(tmp.path(), ".readthedocs.yml", "version: 2");
        assert_eq!(
            find_mkdocs_conf(tmp.path()),
            Some(tmp.path().join("docs/mkdocs.yaml"))
        );
        assert!(has_readthedocs_config(tmp.path()));
    }

    #[test]
    fn python_and_html_detection() {
        let tmp = tempfile::tempdir().unwrap();
        assert!(!has_python_files(tmp.path()));
        assert!(!contains_html(tmp.path()));
        write(tmp.path(), "pkg/mod.py", "");
        write(tmp.path(), "out/a/index.html", "");
        assert!(has_python_files(tmp.path()));
        assert!(contains_html(tmp.path()));
    }
}
