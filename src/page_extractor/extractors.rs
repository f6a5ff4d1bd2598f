//! Extraction functions that evaluate JS against a loaded page.

use super::js_scripts::{content_script, discovery_links_script, LINKS_SCRIPT};
use super::schema::{CrawlLink, PageContent};
use anyhow::{Context, Result};
use chromiumoxide::Page;

/// Extract every outbound link on the page.
pub async fn extract_links(page: &Page) -> Result<Vec<CrawlLink>> {
    let js_result = page
        .evaluate(LINKS_SCRIPT)
        .await
        .context("failed to execute links extraction script")?;

    let links: Vec<CrawlLink> = js_result
        .into_value()
        .context("failed to parse links from JS result")?;

    Ok(links)
}

/// Extract the title and selector-scoped HTML (§4.3 per-page extraction).
/// `selector` is XPath when it begins with `/`, CSS otherwise.
pub async fn extract_page_content(page: &Page, selector: &str) -> Result<PageContent> {
    let is_xpath = selector.starts_with('/');
    let script = content_script(selector, is_xpath);

    let js_result = page
        .evaluate(script.as_str())
        .await
        .context("failed to execute content extraction script")?;

    let value: serde_json::Value = js_result
        .into_value()
        .context("failed to parse content from JS result")?;

    let title = value
        .get("title")
        .and_then(|v| v.as_str())
        .unwrap_or_default()
        .to_string();
    let html = value
        .get("html")
        .and_then(|v| v.as_str())
        .unwrap_or_default()
        .to_string();

    Ok(PageContent { title, html })
}

/// Extract absolute URLs from anchors scoped to `discovery_selector`, falling
/// back to every anchor on the page if the selector matches nothing
/// (§4.3 discovery phase).
pub async fn extract_discovery_links(page: &Page, discovery_selector: &str) -> Result<Vec<String>> {
    let script = discovery_links_script(discovery_selector);
    let js_result = page
        .evaluate(script.as_str())
        .await
        .context("failed to execute discovery links script")?;

    let urls: Vec<String> = js_result
        .into_value()
        .context("failed to parse discovery links from JS result")?;

    Ok(urls)
}
