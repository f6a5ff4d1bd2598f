//! Minimal page-extraction types: a discovered link and the selector-scoped
//! content pulled from a crawled page.

use serde::{Deserialize, Serialize};

/// A single `<a href>` found on a page, resolved to an absolute URL.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CrawlLink {
    pub url: String,
    pub text: String,
    pub title: String,
    pub rel: String,
    pub is_external: bool,
    pub path: String,
}

/// Title plus selector-scoped HTML pulled from a single page (§4.3/§4.4).
#[derive(Debug, Clone)]
pub struct PageContent {
    pub title: String,
    pub html: String,
}
