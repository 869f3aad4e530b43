//! Tag-name candidates derived from a release version.

/// Produce the tag names a project might have used for `version`, in the
/// order they should be tried. Duplicates are dropped.
///
/// For `requests 2.25.1` this yields `2.25.1`, `v2.25.1`, `requests-2.25.1`,
/// `requests/2.25.1`, `requests/v2.25.1` and `release-2.25.1`.
pub fn tag_candidates(name: &str, version: &str) -> Vec<String> {
    let version = version.trim();
    if version.is_empty() {
        return Vec::new();
    }

    let mut raw = vec![version.to_string(), format!("v{version}")];
    if let Some(stripped) = version.strip_prefix('v').filter(|s| !s.is_empty()) {
        raw.push(stripped.to_string());
    }

    let name = name.trim();
    if !name.is_empty() {
        raw.push(format!("{name}-{version}"));
        raw.push(format!("{name}/{version}"));
        raw.push(format!("{name}/v{version}"));
    }
    raw.push(format!("release-{version}"));

    let mut seen = Vec::with_capacity(raw.len());
    for tag in raw {
        if !seen.contains(&tag) {
            seen.push(tag);
        }
    }
    seen
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn plain_version() {
        let tags = tag_candidates("requests", "2.25.1");
        assert_eq!(tags[0], "2.25.1");
        assert_eq!(tags[1], "v2.25.1");
        assert!(tags.contains(&"requests-2.25.1".to_string()));
        assert!(tags.contains(&"requests/v2.25.1".to_string()));
        assert_eq!(tags.last().map(String::as_str), Some("release-2.25.1"));
    }

    #[test]
    fn prefixed_version_also_tries_bare() {
        let tags = tag_candidates("click", "v8.0");
        assert_eq!(&tags[..3], &["v8.0", "vv8.0", "8.0"]);
    }

    #[test]
    fn no_duplicates_without_name() {
        let tags = tag_candidates("", "1.0");
        assert_eq!(tags, vec!["1.0", "v1.0", "release-1.0"]);
    }

    #[test]
    fn empty_version_yields_nothing() {
        assert!(tag_candidates("x", " ").is_empty());
    }
}
