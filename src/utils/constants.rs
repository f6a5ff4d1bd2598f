//! Shared configuration constants.
//!
//! Default values used throughout the crate to avoid magic numbers scattered
//! across call sites.

/// Chrome user agent string for stealth mode.
///
/// Updated: 2025-01-29 to Chrome 132 (current stable).
pub const CHROME_USER_AGENT: &str = "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/132.0.6834.160 Safari/537.36";

/// Per-session crawl concurrency (§4.3 of the design): bounds browser memory use.
pub const SESSION_MAX_CONCURRENCY: usize = 2;

/// Per-page retry budget before a page is skipped.
pub const PAGE_RETRY_BUDGET: u8 = 2;

/// Default wait-for-selector timeout in milliseconds.
pub const DEFAULT_SELECTOR_TIMEOUT_MS: u64 = 5000;

/// Default worker pool size.
pub const DEFAULT_WORKER_CONCURRENCY: usize = 2;

/// Default starting poll interval in milliseconds.
pub const DEFAULT_POLL_INTERVAL_MS: u64 = 1000;

/// Default maximum poll interval in milliseconds.
pub const DEFAULT_MAX_POLL_INTERVAL_MS: u64 = 10_000;

/// Default stuck-job claim timeout in milliseconds (30 minutes).
pub const DEFAULT_JOB_TIMEOUT_MS: u64 = 1_800_000;

/// Default base retry backoff in milliseconds.
pub const DEFAULT_BACKOFF_DELAY_MS: u64 = 5000;

/// Default age threshold for pruning terminal queue/job rows (7 days).
pub const DEFAULT_CLEANUP_AGE_MS: i64 = 7 * 24 * 60 * 60 * 1000;

/// Default maximum attempts before a queue entry is permanently failed.
pub const DEFAULT_MAX_ATTEMPTS: i64 = 3;
