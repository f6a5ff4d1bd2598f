//! URL and path-safety utilities shared across the crawl, task-runner, and
//! aggregator subsystems.

use std::path::{Path, PathBuf};

/// Check if a URL is one the crawler should ever enqueue.
#[must_use]
pub fn is_valid_url(url: &str) -> bool {
    if url.is_empty() {
        return false;
    }

    if url.starts_with("data:") || url.starts_with("javascript:") || url.starts_with("mailto:") {
        return false;
    }

    match url::Url::parse(url) {
        Ok(parsed) => matches!(parsed.scheme(), "http" | "https"),
        Err(_) => false,
    }
}

/// Sanitize a user-supplied `outputFileName` so the resulting path is always
/// strictly contained under `jobs_output_root` (Testable Property 6 / S6).
///
/// Any directory components, `..` segments, or absolute-path prefixes are
/// stripped: only the basename survives. `default_name` is used when the
/// supplied name is empty or sanitizes away to nothing.
#[must_use]
pub fn sanitize_output_filename(
    requested: Option<&str>,
    default_name: &str,
    jobs_output_root: &Path,
) -> PathBuf {
    let basename = requested
        .and_then(|name| Path::new(name).file_name())
        .and_then(|os| os.to_str())
        .filter(|s| !s.is_empty())
        .map(sanitize_filename::sanitize)
        .filter(|s| !s.is_empty())
        .unwrap_or_else(|| format!("{default_name}.json"));

    jobs_output_root.join(basename)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn path_traversal_is_defeated() {
        let root = Path::new("/tmp/root/output/jobs");
        let sanitized = sanitize_output_filename(
            Some("../../etc/passwd.json"),
            "custom",
            root,
        );
        assert_eq!(sanitized, root.join("passwd.json"));
    }

    #[test]
    fn absolute_path_is_defeated() {
        let root = Path::new("/tmp/root/output/jobs");
        let sanitized = sanitize_output_filename(Some("/etc/passwd"), "custom", root);
        assert_eq!(sanitized, root.join("passwd"));
    }

    #[test]
    fn empty_name_falls_back_to_default() {
        let root = Path::new("/tmp/root/output/jobs");
        let sanitized = sanitize_output_filename(None, "alpha", root);
        assert_eq!(sanitized, root.join("alpha.json"));
    }

    #[test]
    fn valid_url_schemes() {
        assert!(is_valid_url("https://example.test/"));
        assert!(!is_valid_url("javascript:void(0)"));
        assert!(!is_valid_url(""));
    }

    #[test]
    fn sanitized_path_stays_under_jobs_root_on_disk() {
        use assert_fs::prelude::*;

        let temp = assert_fs::TempDir::new().expect("tempdir");
        let jobs_root = temp.child("output/jobs");
        jobs_root.create_dir_all().expect("create jobs root");

        let sanitized =
            sanitize_output_filename(Some("../../../etc/passwd"), "custom", jobs_root.path());
        assert_eq!(sanitized.parent(), Some(jobs_root.path()));

        std::fs::write(&sanitized, b"{}").expect("write sanitized path");
        jobs_root.child("passwd").assert(predicates::path::is_file());
    }
}
