//! Page-level data extraction: links and selector-scoped content (§4.3).

pub mod extractors;
pub mod js_scripts;
pub mod schema;

pub use extractors::{extract_discovery_links, extract_links, extract_page_content};
pub use schema::{CrawlLink, PageContent};
