//! Core configuration types: one `TaskConfig` per crawl task, one
//! `GlobalConfig` shared across the process (§3 Data Model).

use serde::{Deserialize, Serialize};

/// A single name/value cookie applied to every request against the task's
/// origin.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Cookie {
    pub name: String,
    pub value: String,
}

/// Declarative crawl spec for one task (§3).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TaskConfig {
    /// Stable identifier, unique across all jobs.
    pub name: String,
    /// Seed URL (HTTPS).
    pub entry: String,
    /// Glob patterns; a URL must match at least one to be enqueued.
    #[serde(rename = "match")]
    pub match_patterns: Vec<String>,
    /// Glob patterns; any match disqualifies a URL.
    #[serde(default)]
    pub exclude: Vec<String>,
    /// Content selector. A leading `/` means XPath, otherwise CSS.
    pub selector: String,
    /// Whether to auto-discover seed URLs from the entry page's navigation.
    #[serde(default = "default_true")]
    pub auto_discover_nav: bool,
    /// Selector scoping anchor discovery during the discovery phase.
    #[serde(default = "default_discovery_selector")]
    pub discovery_selector: String,
    /// Cookies applied to every request against the task's origin.
    #[serde(default)]
    pub cookie: Vec<Cookie>,
    /// Milliseconds to wait for `selector` before giving up on a page.
    #[serde(default = "default_selector_timeout")]
    pub wait_for_selector_timeout: u64,
    /// File extensions to abort mid-request (images, fonts, …).
    #[serde(default)]
    pub resource_exclusions: Vec<String>,
    /// Per-output-segment byte cap in megabytes. `None` means unlimited.
    #[serde(default)]
    pub max_file_size_mb: Option<u64>,
    /// Name of a compiled-in `onVisitPage` hook, resolved against a registry
    /// at crawl time (Design Notes §9: named-strategy substitute for a
    /// first-class function in a serializable config).
    #[serde(default)]
    pub on_visit_page: Option<String>,
    /// Desired output file name; sanitized to a basename under
    /// `output/jobs/` at task-runner time.
    #[serde(default)]
    pub output_file_name: Option<String>,
}

fn default_true() -> bool {
    true
}

fn default_discovery_selector() -> String {
    "nav, aside".to_string()
}

fn default_selector_timeout() -> u64 {
    crate::utils::DEFAULT_SELECTOR_TIMEOUT_MS
}

/// Process-wide limits (§3).
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize)]
pub struct GlobalConfig {
    /// Hard cap on total pages crawled per task. `None` means unlimited.
    pub max_pages_to_crawl: Option<u64>,
    /// Hard cap on total tokens written per task. `None` means unlimited.
    pub max_tokens: Option<u64>,
}
