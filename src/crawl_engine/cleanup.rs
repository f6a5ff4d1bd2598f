//! Browser and resource cleanup functionality
//!
//! This module handles cleanup tasks after crawling is complete.

use anyhow::Result;
use chromiumoxide::Browser;
use tracing::{debug, warn};

/// Result of cleanup operations
#[derive(Debug, Clone)]
pub enum CleanupResult {
    /// All cleanup operations succeeded
    Success,
    /// Some cleanup operations failed, with error details
    PartialFailure(Vec<String>),
}

/// Clean up browser and Chrome data directory
pub async fn cleanup_browser_and_data(
    mut browser: Browser,
    chrome_data_dir: std::path::PathBuf,
) -> Result<CleanupResult> {
    let mut errors = Vec::new();

    debug!("closing browser");
    if let Err(e) = browser.close().await {
        warn!(error = %e, "failed to close browser");
        errors.push(format!("browser close failed: {e}"));
    }

    // Wait for the browser process to fully exit; otherwise chromiumoxide
    // logs a "not closed manually" warning on drop.
    if let Err(e) = browser.wait().await {
        warn!(error = %e, "failed to wait for browser exit");
        errors.push(format!("browser wait failed: {e}"));
    }

    if let Err(e) = std::fs::remove_dir_all(&chrome_data_dir) {
        warn!(dir = %chrome_data_dir.display(), error = %e, "failed to clean up chrome data directory");
        errors.push(format!("directory cleanup failed: {e}"));
    }

    if errors.is_empty() {
        Ok(CleanupResult::Success)
    } else {
        Ok(CleanupResult::PartialFailure(errors))
    }
}
