//! Glob-based URL include/exclude evaluation (§4.1).
//!
//! Both enqueue-time filtering and discovery-time filtering route through
//! this module so the two call sites never diverge on what "matches" means.

use globset::{GlobBuilder, GlobSetBuilder};

/// True if `url` matches at least one of `patterns`.
///
/// Patterns are anchored (full-string) globs: `*` matches any run of
/// characters except `/`, `**` matches across `/`. An empty pattern list
/// never matches anything.
#[must_use]
pub fn matches_any(url: &str, patterns: &[String]) -> bool {
    if patterns.is_empty() {
        return false;
    }

    let mut builder = GlobSetBuilder::new();
    for pattern in patterns {
        match GlobBuilder::new(pattern).literal_separator(true).build() {
            Ok(glob) => {
                builder.add(glob);
            }
            Err(e) => {
                tracing::warn!("invalid glob pattern {pattern:?}: {e}");
            }
        }
    }

    match builder.build() {
        Ok(set) => set.is_match(url),
        Err(e) => {
            tracing::warn!("failed to build glob set: {e}");
            false
        }
    }
}

/// Expand plain-path excludes so that a subpath is also excluded.
///
/// For every pattern with no wildcard characters (`*`) that does not already
/// end in `/`, emit both the literal pattern and `pattern + "/**"`. This
/// prevents a user-specified `/support` exclude from missing `/support/foo`.
/// Patterns that already contain a wildcard pass through unchanged.
#[must_use]
pub fn normalize_and_expand_excludes(patterns: &[String]) -> Vec<String> {
    let mut expanded = Vec::with_capacity(patterns.len() * 2);
    for pattern in patterns {
        expanded.push(pattern.clone());
        if !pattern.contains('*') && !pattern.ends_with('/') {
            expanded.push(format!("{pattern}/**"));
        }
    }
    expanded
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn matches_any_anchors_full_string() {
        let patterns = vec!["https://example.test/docs/**".to_string()];
        assert!(matches_any("https://example.test/docs/intro", &patterns));
        assert!(!matches_any("https://example.test/blog/intro", &patterns));
    }

    #[test]
    fn double_star_crosses_slash_single_star_does_not() {
        let single = vec!["https://example.test/*".to_string()];
        assert!(matches_any("https://example.test/page", &single));
        assert!(!matches_any("https://example.test/a/b", &single));

        let double = vec!["https://example.test/**".to_string()];
        assert!(matches_any("https://example.test/a/b", &double));
    }

    #[test]
    fn expand_excludes_adds_subpath_wildcard() {
        let excludes = vec!["https://example.test/support".to_string()];
        let expanded = normalize_and_expand_excludes(&excludes);
        assert!(expanded.contains(&"https://example.test/support".to_string()));
        assert!(expanded.contains(&"https://example.test/support/**".to_string()));

        assert!(matches_any("https://example.test/support/faq", &expanded));
        assert!(matches_any("https://example.test/support", &expanded));
        assert!(!matches_any("https://example.test/supporting-docs", &expanded));
    }

    #[test]
    fn wildcard_patterns_pass_through_unexpanded() {
        let excludes = vec!["https://example.test/drafts/*".to_string()];
        let expanded = normalize_and_expand_excludes(&excludes);
        assert_eq!(expanded, excludes);
    }

    #[test]
    fn empty_patterns_never_match() {
        assert!(!matches_any("https://example.test/", &[]));
    }

    proptest::proptest! {
        #[test]
        fn plain_path_exclude_always_covers_its_subpaths(
            segment in "[a-z]{1,8}",
            subpath in "[a-z]{1,8}",
        ) {
            let base = format!("https://example.test/{}", segment);
            let nested = format!("{}/{}", base, subpath);
            let excludes = normalize_and_expand_excludes(&[base.clone()]);

            proptest::prop_assert!(matches_any(&base, &excludes));
            proptest::prop_assert!(matches_any(&nested, &excludes));
        }
    }
}
