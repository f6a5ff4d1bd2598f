//! Crawl Session (§4.3): discovery phase followed by a bounded BFS crawl of
//! one task's seed set, producing the task's `CrawledRecord`s.

use anyhow::{Context, Result};
use chromiumoxide::cdp::browser_protocol::fetch::{
    ContinueRequestParams, EventRequestPaused, FailRequestParams,
};
use chromiumoxide::cdp::browser_protocol::network::ErrorReason;
use chromiumoxide::Browser;
use chromiumoxide::Page;
use dashmap::DashSet;
use futures::stream::FuturesUnordered;
use futures::StreamExt;
use regex::Regex;
use std::collections::VecDeque;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;
use tokio::sync::{Mutex, Semaphore};
use tracing::{debug, warn};

use super::circuit_breaker::{extract_domain, CircuitBreaker};
use super::crawl_types::{CrawlError, CrawlQueue, FailureKind};
use super::domain_limiter::DomainLimiter;
use super::hooks;
use super::page_timeout::with_page_timeout;
use super::retry_queue::RetryQueue;
use crate::config::{GlobalConfig, TaskConfig};
use crate::output_writer::CrawledRecord;
use crate::page_extractor;
use crate::url_matcher;

const MAX_CONCURRENCY: usize = crate::utils::SESSION_MAX_CONCURRENCY;
const MAX_PAGE_RETRIES: u8 = crate::utils::PAGE_RETRY_BUDGET;
const PAGE_LOAD_TIMEOUT_SECS: u64 = 30;

fn sitemap_pattern() -> &'static Regex {
    static RE: std::sync::OnceLock<Regex> = std::sync::OnceLock::new();
    RE.get_or_init(|| Regex::new(r"sitemap.*\.xml$").expect("valid sitemap regex"))
}

/// Run one task's crawl session to completion against an already-launched
/// browser. Returns every record the task's selector produced.
pub async fn run_session(
    task: &TaskConfig,
    global: &GlobalConfig,
    browser: Arc<Browser>,
) -> Result<Vec<CrawledRecord>, CrawlError> {
    let exclude_patterns = url_matcher::normalize_and_expand_excludes(&task.exclude);

    let seeds = assemble_seeds(&browser, task, &exclude_patterns).await;

    let visited: Arc<DashSet<String>> = Arc::new(DashSet::new());
    let queue = Arc::new(Mutex::new(VecDeque::new()));
    {
        let mut q = queue.lock().await;
        for seed in seeds {
            if visited.insert(seed.clone()) {
                q.push_back(CrawlQueue {
                    url: seed,
                    depth: 0,
                    retry_count: 0,
                });
            }
        }
    }

    let circuit_breaker = Arc::new(CircuitBreaker::new(5, 2, Duration::from_secs(60)));
    let retry_queue = Arc::new(RetryQueue::new(Arc::clone(&circuit_breaker)));
    let domain_limiter = Arc::new(DomainLimiter::new(MAX_CONCURRENCY));
    let semaphore = Arc::new(Semaphore::new(MAX_CONCURRENCY));
    let records = Arc::new(Mutex::new(Vec::new()));
    let total_pages = Arc::new(AtomicU64::new(0));
    let page_limit = global.max_pages_to_crawl;

    let on_visit = task.on_visit_page.as_deref().and_then(hooks::resolve);

    let mut active_tasks = FuturesUnordered::new();

    loop {
        let ready = retry_queue.drain_ready();
        if !ready.is_empty() {
            let mut q = queue.lock().await;
            for item in ready {
                if !visited.contains(&item.url) {
                    q.push_back(item);
                }
            }
        }

        while active_tasks.len() < MAX_CONCURRENCY {
            let item = {
                let mut q = queue.lock().await;
                match q.pop_front() {
                    Some(item) => item,
                    None => break,
                }
            };

            if let Some(limit) = page_limit
                && total_pages.load(Ordering::Relaxed) >= limit
            {
                break;
            }

            let domain = match extract_domain(&item.url) {
                Ok(d) => d,
                Err(e) => {
                    warn!(url = %item.url, error = %e, "failed to extract domain, skipping");
                    continue;
                }
            };

            let permit = match semaphore.clone().acquire_owned().await {
                Ok(p) => p,
                Err(_) => continue,
            };
            let domain_permit = domain_limiter.acquire(domain).await;

            let browser = Arc::clone(&browser);
            let task = task.clone();
            let circuit_breaker = Arc::clone(&circuit_breaker);
            let queue = Arc::clone(&queue);
            let visited = Arc::clone(&visited);
            let records = Arc::clone(&records);
            let total_pages = Arc::clone(&total_pages);
            let exclude_patterns = exclude_patterns.clone();

            let task_handle = tokio::spawn(async move {
                let _permit = permit;
                let _domain_permit = domain_permit;
                process_one_page(
                    &browser,
                    item,
                    &task,
                    &exclude_patterns,
                    &circuit_breaker,
                    &queue,
                    &visited,
                    &records,
                    &total_pages,
                    on_visit,
                )
                .await
            });

            active_tasks.push(task_handle);
        }

        match active_tasks.next().await {
            Some(Ok(PageOutcome::Done)) => {}
            Some(Ok(PageOutcome::Retry(mut item, failure_kind))) => {
                if failure_kind.is_retryable() && item.retry_count < MAX_PAGE_RETRIES {
                    item.retry_count += 1;
                    visited.remove(&item.url);
                    queue.lock().await.push_back(item);
                } else if let Ok(domain) = extract_domain(&item.url) {
                    circuit_breaker.record_failure(&domain, "retry budget exhausted");
                }
            }
            Some(Ok(PageOutcome::CircuitOpen(item))) => {
                retry_queue.add(item);
            }
            Some(Err(join_err)) => {
                warn!(error = %join_err, "page task panicked");
            }
            None => break,
        }

        let remaining = queue.lock().await.len();
        let retry_remaining = retry_queue.len();
        if remaining == 0 && retry_remaining == 0 && active_tasks.is_empty() {
            break;
        }
        if remaining == 0 && retry_remaining > 0 && active_tasks.is_empty() {
            tokio::time::sleep(Duration::from_secs(2)).await;
        }
    }

    Ok(Arc::try_unwrap(records)
        .map(Mutex::into_inner)
        .unwrap_or_default())
}

enum PageOutcome {
    Done,
    Retry(CrawlQueue, FailureKind),
    CircuitOpen(CrawlQueue),
}

#[allow(clippy::too_many_arguments)]
async fn process_one_page(
    browser: &Browser,
    item: CrawlQueue,
    task: &TaskConfig,
    exclude_patterns: &[String],
    circuit_breaker: &CircuitBreaker,
    queue: &Mutex<VecDeque<CrawlQueue>>,
    visited: &DashSet<String>,
    records: &Mutex<Vec<CrawledRecord>>,
    total_pages: &AtomicU64,
    on_visit: Option<hooks::OnVisitHook>,
) -> PageOutcome {
    let domain = extract_domain(&item.url).unwrap_or_default();
    if !circuit_breaker.should_attempt(&domain) {
        return PageOutcome::CircuitOpen(item);
    }

    let page = match browser.new_page("about:blank").await {
        Ok(p) => p,
        Err(e) => {
            circuit_breaker.record_failure(&domain, &e.to_string());
            return PageOutcome::Retry(item, FailureKind::Browser);
        }
    };

    if !task.cookie.is_empty()
        && let Err(e) = apply_cookies(&page, task).await
    {
        warn!(url = %item.url, error = %e, "failed to apply cookies");
    }

    if !task.resource_exclusions.is_empty() {
        spawn_resource_exclusion(page.clone(), task.resource_exclusions.clone());
    }

    if let Err(e) = with_page_timeout(
        async { page.goto(&item.url).await.map_err(|e| anyhow::anyhow!("{e}")) },
        PAGE_LOAD_TIMEOUT_SECS,
        "page navigation",
    )
    .await
    {
        circuit_breaker.record_failure(&domain, &e.to_string());
        let kind = FailureKind::classify(&e);
        return PageOutcome::Retry(item, kind);
    }

    if let Err(e) = with_page_timeout(
        async {
            page.wait_for_navigation()
                .await
                .map_err(|e| anyhow::anyhow!("{e}"))
        },
        task.wait_for_selector_timeout / 1000 + 1,
        "page load",
    )
    .await
    {
        circuit_breaker.record_failure(&domain, &e.to_string());
        let kind = FailureKind::classify(&e);
        return PageOutcome::Retry(item, kind);
    }

    let matches_selector = matches!(
        tokio::time::timeout(
            Duration::from_millis(task.wait_for_selector_timeout),
            wait_for_content(&page, &task.selector)
        )
        .await,
        Ok(Ok(()))
    );

    if matches_selector
        && url_matcher::matches_any(&item.url, &task.match_patterns)
        && !url_matcher::matches_any(&item.url, exclude_patterns)
    {
        match page_extractor::extract_page_content(&page, &task.selector).await {
            Ok(content) => {
                let mut extra = serde_json::Map::new();
                if let Some(hook) = on_visit {
                    hook(&item.url, &content.html, &mut extra);
                }
                records.lock().await.push(CrawledRecord {
                    title: content.title,
                    url: item.url.clone(),
                    html: content.html,
                    extra,
                });
                total_pages.fetch_add(1, Ordering::Relaxed);
            }
            Err(e) => {
                debug!(url = %item.url, error = %e, "content extraction failed, no retry");
            }
        }
    }

    match page_extractor::extract_links(&page).await {
        Ok(links) => {
            let mut q = queue.lock().await;
            for link in links {
                if url_matcher::matches_any(&link.url, &task.match_patterns)
                    && !url_matcher::matches_any(&link.url, exclude_patterns)
                    && visited.insert(link.url.clone())
                {
                    q.push_back(CrawlQueue {
                        url: link.url,
                        depth: item.depth + 1,
                        retry_count: 0,
                    });
                }
            }
        }
        Err(e) => warn!(url = %item.url, error = %e, "link extraction failed"),
    }

    circuit_breaker.record_success(&domain);
    let _ = page.close().await;
    PageOutcome::Done
}

async fn wait_for_content(page: &Page, selector: &str) -> Result<()> {
    let is_xpath = selector.starts_with('/');
    loop {
        let content = page_extractor::extract_page_content(page, selector).await?;
        if !content.html.is_empty() {
            return Ok(());
        }
        let _ = is_xpath;
        tokio::time::sleep(Duration::from_millis(200)).await;
    }
}

async fn apply_cookies(page: &Page, task: &TaskConfig) -> Result<()> {
    use chromiumoxide::cdp::browser_protocol::network::CookieParam;

    let mut params = Vec::with_capacity(task.cookie.len());
    for cookie in &task.cookie {
        params.push(
            CookieParam::builder()
                .name(cookie.name.clone())
                .value(cookie.value.clone())
                .url(task.entry.clone())
                .build()
                .map_err(|e| anyhow::anyhow!("invalid cookie {}: {e}", cookie.name))?,
        );
    }
    page.set_cookies(params).await.context("failed to set cookies")?;
    Ok(())
}

/// Aborts any request whose path extension is in `exclusions` (images,
/// fonts, etc.), forwarding everything else. Runs for the lifetime of the
/// page; the listener task exits once the page's event stream closes.
fn spawn_resource_exclusion(page: Page, exclusions: Vec<String>) {
    tokio::spawn(async move {
        let Ok(mut events) = page.event_listener::<EventRequestPaused>().await else {
            return;
        };
        while let Some(event) = events.next().await {
            let url = event.request.url.to_lowercase();
            let blocked = exclusions.iter().any(|ext| {
                let ext = ext.trim_start_matches('.').to_lowercase();
                url.ends_with(&format!(".{ext}"))
            });

            let result = if blocked {
                page.execute(FailRequestParams::new(
                    event.request_id.clone(),
                    ErrorReason::Aborted,
                ))
                .await
                .map(|_| ())
            } else {
                page.execute(ContinueRequestParams::new(event.request_id.clone()))
                    .await
                    .map(|_| ())
            };

            if let Err(e) = result {
                debug!(error = %e, "resource exclusion: request resolution failed");
            }
        }
    });
}

/// Discovery phase (§4.3 step 1): visit the entry URL in a fresh context,
/// query anchors scoped to `discoverySelector`, drop `javascript:`/`#`-only
/// hrefs (handled by the page extractor), dedupe, and filter through
/// match/exclude. A discovery failure is logged and non-fatal: the crawl
/// falls back to the explicit entry URL alone.
async fn discover_nav_links(browser: &Browser, task: &TaskConfig) -> Vec<String> {
    if !task.auto_discover_nav {
        return Vec::new();
    }

    let discover = async {
        let page = browser
            .new_page("about:blank")
            .await
            .map_err(|e| anyhow::anyhow!("{e}"))?;

        if !task.cookie.is_empty()
            && let Err(e) = apply_cookies(&page, task).await
        {
            warn!(error = %e, "failed to apply discovery-phase cookies");
        }

        with_page_timeout(
            async { page.goto(&task.entry).await.map_err(|e| anyhow::anyhow!("{e}")) },
            PAGE_LOAD_TIMEOUT_SECS,
            "entry navigation",
        )
        .await?;
        let _ = page.wait_for_navigation().await;

        let links = page_extractor::extract_discovery_links(&page, &task.discovery_selector)
            .await
            .map_err(|e| anyhow::anyhow!("{e}"))?;
        let _ = page.close().await;
        Ok::<_, anyhow::Error>(links)
    };

    match discover.await {
        Ok(links) => links,
        Err(e) => {
            warn!(entry = %task.entry, error = %e, "discovery phase failed, continuing with entry only");
            Vec::new()
        }
    }
}

/// Seed assembly (§4.3 step 2): union `{entry}` with discovery-phase links
/// already filtered through match/exclude, dedupe by string equality, then
/// apply the exclude filter again post-merge. Any seed matching the sitemap
/// pattern is fetched and replaced by its contained URLs rather than
/// crawled directly.
async fn assemble_seeds(browser: &Browser, task: &TaskConfig, exclude_patterns: &[String]) -> Vec<String> {
    let discovered: Vec<String> = discover_nav_links(browser, task)
        .await
        .into_iter()
        .filter(|url| {
            url_matcher::matches_any(url, &task.match_patterns) && !url_matcher::matches_any(url, exclude_patterns)
        })
        .collect();

    let mut merged = vec![task.entry.clone()];
    merged.extend(discovered);
    merged.sort();
    merged.dedup();
    merged.retain(|url| !url_matcher::matches_any(url, exclude_patterns));

    let mut seeds = Vec::with_capacity(merged.len());
    for url in merged {
        if sitemap_pattern().is_match(&url) {
            match fetch_sitemap_urls(&url).await {
                Ok(urls) => {
                    debug!(sitemap = %url, count = urls.len(), "expanded sitemap into seed URLs");
                    seeds.extend(urls);
                }
                Err(e) => warn!(sitemap = %url, error = %e, "failed to fetch/parse sitemap, skipping"),
            }
        } else {
            seeds.push(url);
        }
    }

    seeds.sort();
    seeds.dedup();
    seeds
}

/// Fetch a sitemap XML document and extract every `<loc>` URL it contains
/// (§4.3 step 2, §9 "Sitemap vs. regular URL").
async fn fetch_sitemap_urls(sitemap_url: &str) -> Result<Vec<String>> {
    let body = reqwest::get(sitemap_url)
        .await
        .with_context(|| format!("fetching sitemap {sitemap_url}"))?
        .error_for_status()
        .with_context(|| format!("sitemap {sitemap_url} returned an error status"))?
        .text()
        .await
        .with_context(|| format!("reading sitemap body {sitemap_url}"))?;

    Ok(loc_pattern()
        .captures_iter(&body)
        .filter_map(|c| c.get(1).map(|m| m.as_str().trim().to_string()))
        .filter(|url| !url.is_empty())
        .collect())
}

fn loc_pattern() -> &'static Regex {
    static RE: std::sync::OnceLock<Regex> = std::sync::OnceLock::new();
    RE.get_or_init(|| Regex::new(r"(?s)<loc>\s*(.*?)\s*</loc>").expect("valid loc regex"))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sitemap_pattern_matches_variants() {
        assert!(sitemap_pattern().is_match("https://example.test/sitemap.xml"));
        assert!(sitemap_pattern().is_match("https://example.test/sitemap-posts.xml"));
        assert!(!sitemap_pattern().is_match("https://example.test/sitemapped.html"));
    }

    #[tokio::test]
    async fn fetch_sitemap_urls_extracts_loc_entries() {
        let mut server = mockito::Server::new_async().await;
        let _mock = server
            .mock("GET", "/sitemap.xml")
            .with_status(200)
            .with_body(
                r"<urlset>
                    <url><loc>https://example.test/a</loc></url>
                    <url><loc>https://example.test/b</loc></url>
                </urlset>",
            )
            .create_async()
            .await;

        let urls = fetch_sitemap_urls(&format!("{}/sitemap.xml", server.url()))
            .await
            .expect("fetch sitemap");

        assert_eq!(
            urls,
            vec![
                "https://example.test/a".to_string(),
                "https://example.test/b".to_string(),
            ]
        );
    }

    #[tokio::test]
    async fn fetch_sitemap_urls_errors_on_http_failure() {
        let mut server = mockito::Server::new_async().await;
        let _mock = server
            .mock("GET", "/sitemap.xml")
            .with_status(500)
            .create_async()
            .await;

        let err = fetch_sitemap_urls(&format!("{}/sitemap.xml", server.url()))
            .await
            .unwrap_err();
        assert!(err.to_string().contains("sitemap"));
    }
}
