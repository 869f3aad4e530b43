//! Default-branch candidate resolution for VCS fallbacks.

/// Branches tried when no usable hint is configured, in order.
const FALLBACK_BRANCHES: [&str; 2] = ["master", "main"];

/// Turns a configured default-branch hint into an ordered candidate list.
#[derive(Debug, Clone, Copy, Default)]
pub struct BranchResolver;

impl BranchResolver {
    /// Resolve `hint` into branch candidates, most likely first.
    ///
    /// The trimmed hint is a single candidate (commas are not separators).
    /// The list always ends with `master` and `main`, without duplicates.
    pub fn resolve(hint: Option<&str>) -> Vec<String> {
        let hint = hint.map(str::trim).filter(|h| !h.is_empty());

        let mut candidates: Vec<String> = Vec::with_capacity(3);
        if let Some(branch) = hint {
            candidates.push(branch.to_string());
        }
        for fallback in FALLBACK_BRANCHES {
            if !candidates.iter().any(|c| c == fallback) {
                candidates.push(fallback.to_string());
            }
        }
        candidates
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn custom_hint_comes_first() {
        assert_eq!(
            BranchResolver::resolve(Some("feature")),
            vec!["feature", "master", "main"]
        );
    }

    #[test]
    fn main_hint_swaps_order() {
        assert_eq!(BranchResolver::resolve(Some("main")), vec!["main", "master"]);
        assert_eq!(BranchResolver::resolve(Some("master")), vec!["master", "main"]);
    }

    #[test]
    fn empty_or_absent_hint_uses_fallbacks() {
        let expected = vec!["master", "main"];
        assert_eq!(BranchResolver::resolve(None), expected);
        assert_eq!(BranchResolver::resolve(Some("")), expected);
        assert_eq!(BranchResolver::resolve(Some("   ")), expected);
    }

    #[test]
    fn hint_is_trimmed_and_not_split() {
        assert_eq!(
            BranchResolver::resolve(Some("  dev  ")),
            vec!["dev", "master", "main"]
        );
        assert_eq!(
            BranchResolver::resolve(Some("a,b")),
            vec!["a,b", "master", "main"]
        );
        assert_eq!(BranchResolver::resolve(Some(" main ")), vec!["main", "master"]);
    }
}
