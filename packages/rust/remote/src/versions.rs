//! Pure selection logic over the documentation host's API payloads.

use std::collections::HashMap;

use docsmith_shared::sanitize_path_component;
use serde::Deserialize;
use tracing::{debug, warn};
use url::Url;

/// Longest upstream file name we are willing to reuse verbatim.
const MAX_FILENAME_LEN: usize = 60;

/// One entry of the project's version list.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct RemoteVersion {
    pub slug: String,
    #[serde(default)]
    pub active: bool,
    #[serde(default)]
    pub built: bool,
}

impl RemoteVersion {
    pub fn is_selectable(&self) -> bool {
        self.active && self.built
    }
}

/// Version detail payload. `downloads` maps a format (`htmlzip`, `pdf`,
/// `epub`) to its URL.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct VersionDetails {
    #[serde(default)]
    pub slug: Option<String>,
    #[serde(default)]
    pub active: bool,
    #[serde(default)]
    pub built: bool,
    #[serde(default)]
    pub downloads: Option<HashMap<String, Option<String>>>,
}

/// A resolved pre-built artifact.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DownloadDescriptor {
    pub url: String,
    pub format: String,
    pub filename: String,
}

/// File extension (without dot) an artifact of `format` is saved with.
pub fn canonical_extension(format: &str) -> &str {
    match format {
        "htmlzip" | "zip" => "zip",
        other => other,
    }
}

/// Pick the version to download.
///
/// The first entry of `preferred` that is present and selectable wins;
/// otherwise the first selectable entry of `available`, in its given order.
/// `None` iff nothing is both active and built.
pub fn choose_best_version(available: &[RemoteVersion], preferred: &[String]) -> Option<String> {
    for wanted in preferred {
        if let Some(v) = available
            .iter()
            .find(|v| &v.slug == wanted && v.is_selectable())
        {
            debug!(slug = %v.slug, "preferred version available");
            return Some(v.slug.clone());
        }
    }

    let fallback = available.iter().find(|v| v.is_selectable()).map(|v| v.slug.clone());
    match &fallback {
        Some(slug) => debug!(%slug, "no preferred version, using first active and built"),
        None => warn!(count = available.len(), "no active and built version"),
    }
    fallback
}

/// Download URL for `format` from `details`.
///
/// Protocol-relative URLs get an `https:` scheme. A URL whose path does not end
/// in the format's extension is returned anyway, with a warning.
pub fn get_download_url(details: Option<&VersionDetails>, format: &str) -> Option<String> {
    let details = details?;
    let Some(downloads) = details.downloads.as_ref() else {
        warn!(slug = ?details.slug, "version has no downloads; offline formats may be disabled");
        return None;
    };
    let Some(raw) = downloads.get(format).and_then(|u| u.as_deref()) else {
        let formats: Vec<_> = downloads.keys().collect();
        warn!(slug = ?details.slug, format, available = ?formats, "format not offered");
        return None;
    };

    let url = match raw.strip_prefix("//") {
        Some(rest) => format!("https://{rest}"),
        None => raw.to_string(),
    };

    let ext = format!(".{}", canonical_extension(format));
    if !url_path(&url).to_ascii_lowercase().ends_with(&ext) {
        warn!(%url, "download URL may not be a direct link to the file; continuing");
    }
    Some(url)
}

/// Local file name for a download.
///
/// Reuses the URL's last path segment when it is short and carries the
/// format's extension (normalized to lowercase); otherwise
/// `{project_slug}-{version_slug}.{ext}`.
pub fn determine_local_filename(
    project_slug: &str,
    version_slug: &str,
    download_url: &str,
    format: &str,
) -> String {
    let ext = canonical_extension(format);
    let path = url_path(download_url);
    let last = path.rsplit('/').next().unwrap_or_default();

    if last.len() <= MAX_FILENAME_LEN {
        if let Some((stem, e)) = last.rsplit_once('.') {
            if !stem.is_empty() && e.eq_ignore_ascii_case(ext) {
                return format!("{}.{ext}", sanitize_path_component(stem));
            }
        }
    }

    format!(
        "{}-{}.{ext}",
        sanitize_path_component(project_slug),
        sanitize_path_component(version_slug)
    )
}

/// Project slug from a documentation URL such as
/// `https://black.readthedocs.io/en/stable/` or
/// `https://readthedocs.org/projects/black/`.
pub fn project_slug_from_url(raw: &str) -> Option<String> {
    let url = Url::parse(raw).ok()?;
    let host = url.host_str()?.to_ascii_lowercase();
    let segments: Vec<&str> = url
        .path_segments()
        .map(|s| s.filter(|p| !p.is_empty()).collect())
        .unwrap_or_default();

    for suffix in [".readthedocs.io", ".readthedocs-hosted.com"] {
        if let Some(sub) = host.strip_suffix(suffix) {
            return sub.rsplit('.').next().map(str::to_string);
        }
    }
    if !matches!(host.as_str(), "readthedocs.org" | "www.readthedocs.org") {
        return None;
    }
    match segments.as_slice() {
        ["projects", slug, ..] => Some(slug.to_string()),
        _ => None,
    }
}

/// The path portion of a URL, without query or fragment.
fn url_path(raw: &str) -> String {
    match Url::parse(raw) {
        Ok(url) => url.path().to_string(),
        Err(_) => raw
            .split(['?', '#'])
            .next()
            .unwrap_or_default()
            .to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn v(slug: &str, active: bool, built: bool) -> RemoteVersion {
        RemoteVersion {
            slug: slug.into(),
            active,
            built,
        }
    }

    fn prefs() -> Vec<String> {
        vec!["stable".into(), "latest".into()]
    }

    #[test]
    fn choose_prefers_configured_order() {
        let available = vec![v("latest", true, true), v("stable", true, true)];
        assert_eq!(choose_best_version(&available, &prefs()).as_deref(), Some("stable"));
    }

    #[test]
    fn choose_skips_unbuilt_preferences() {
        let available = vec![
            v("stable", true, false),
            v("2.0", true, true),
            v("latest", false, true),
        ];
        assert_eq!(choose_best_version(&available, &prefs()).as_deref(), Some("2.0"));
    }

    #[test]
    fn choose_none_when_nothing_selectable() {
        let available = vec![v("stable", false, true), v("latest", true, false)];
        assert_eq!(choose_best_version(&available, &prefs()), None);
        assert_eq!(choose_best_version(&[], &prefs()), None);
    }

    #[test]
    fn choose_is_deterministic() {
        let available = vec![v("1.0", true, true), v("2.0", true, true)];
        let first = choose_best_version(&available, &[]);
        for _ in 0..5 {
            assert_eq!(choose_best_version(&available, &[]), first);
        }
        assert_eq!(first.as_deref(), Some("1.0"));
    }

    fn details(json: &str) -> VersionDetails {
        serde_json::from_str(json).unwrap()
    }

    #[test]
    fn download_url_normalizes_protocol_relative() {
        let d = details(r#"{"downloads":{"epub":"//h/v.epub"}}"#);
        assert_eq!(get_download_url(Some(&d), "epub").as_deref(), Some("https://h/v.epub"));
    }

    #[test]
    fn download_url_absent_cases() {
        assert_eq!(get_download_url(None, "htmlzip"), None);
        assert_eq!(get_download_url(Some(&details(r#"{"slug":"x"}"#)), "htmlzip"), None);
        let d = details(r#"{"downloads":{"pdf":"https://h/a.pdf"}}"#);
        assert_eq!(get_download_url(Some(&d), "epub"), None);
        let d = details(r#"{"downloads":{"pdf":null}}"#);
        assert_eq!(get_download_url(Some(&d), "pdf"), None);
    }

    #[test]
    fn download_url_kept_when_not_direct() {
        let d = details(r#"{"downloads":{"htmlzip":"https://h/download/latest"}}"#);
        assert_eq!(
            get_download_url(Some(&d), "htmlzip").as_deref(),
            Some("https://h/download/latest")
        );
    }

    #[test]
    fn filename_from_url_ignores_query() {
        assert_eq!(
            determine_local_filename("black", "stable", "https://h/x/black-stable.zip?x=1#f", "htmlzip"),
            "black-stable.zip"
        );
    }

    #[test]
    fn filename_synthesized_for_endpoints_and_long_names() {
        assert_eq!(
            determine_local_filename("black", "stable", "https://h/download/htmlzip/", "htmlzip"),
            "black-stable.zip"
        );
        let long = format!("https://h/{}.pdf", "a".repeat(80));
        assert_eq!(determine_local_filename("p", "v", &long, "pdf"), "p-v.pdf");
        assert_eq!(
            determine_local_filename("p", "v", "https://h/readme.txt", "epub"),
            "p-v.epub"
        );
    }

    #[test]
    fn filename_always_has_canonical_extension() {
        for url in [
            "https://h/a.zip",
            "https://h/Black-Docs.ZIP",
            "https://h/Manual.PDF",
            "https://h/a.zip?query=long&more=1",
            "//weird",
            "not a url at all",
            "https://h/",
        ] {
            for (format, ext) in [("htmlzip", ".zip"), ("pdf", ".pdf"), ("epub", ".epub")] {
                let name = determine_local_filename("slug", "v1", url, format);
                assert!(name.ends_with(ext), "{url} {format} -> {name}");
            }
        }
    }

    #[test]
    fn upper_case_extension_is_normalized() {
        assert_eq!(
            determine_local_filename("black", "stable", "https://h/Black-Docs.ZIP", "htmlzip"),
            "Black-Docs.zip"
        );
    }

    #[test]
    fn slug_from_documentation_urls() {
        assert_eq!(
            project_slug_from_url("https://black.readthedocs.io/en/stable/").as_deref(),
            Some("black")
        );
        assert_eq!(
            project_slug_from_url("https://readthedocs.org/projects/requests/").as_deref(),
            Some("requests")
        );
        assert_eq!(project_slug_from_url("https://readthedocs.org/"), None);
        assert_eq!(project_slug_from_url("https://docs.python.org/3/"), None);
        assert_eq!(project_slug_from_url("https://github.com/psf/black"), None);
    }
}
