//! Registry of compiled-in `onVisitPage` hooks.
//!
//! The original capability is an arbitrary function supplied at config time.
//! Since `TaskConfig` must stay serializable (§9 Design Notes), a task names
//! a hook by string and the crawl session resolves it against this registry.

use serde_json::{Map, Value};

pub type OnVisitHook = fn(url: &str, html: &str, extra: &mut Map<String, Value>);

fn word_count(_url: &str, html: &str, extra: &mut Map<String, Value>) {
    let text = strip_tags(html);
    let count = text.split_whitespace().count();
    extra.insert("wordCount".to_string(), Value::from(count));
}

fn content_length(_url: &str, html: &str, extra: &mut Map<String, Value>) {
    extra.insert("contentLength".to_string(), Value::from(html.len()));
}

fn strip_tags(html: &str) -> String {
    let mut out = String::with_capacity(html.len());
    let mut in_tag = false;
    for c in html.chars() {
        match c {
            '<' => in_tag = true,
            '>' => in_tag = false,
            _ if !in_tag => out.push(c),
            _ => {}
        }
    }
    out
}

/// Resolve a hook name to its implementation. Unknown names resolve to
/// `None` rather than erroring; a task with a typo'd hook name simply skips
/// enrichment instead of failing the whole crawl.
#[must_use]
pub fn resolve(name: &str) -> Option<OnVisitHook> {
    match name {
        "wordCount" => Some(word_count),
        "contentLength" => Some(content_length),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn word_count_counts_text_tokens_only() {
        let mut extra = Map::new();
        word_count("https://x", "<p>hello world foo</p>", &mut extra);
        assert_eq!(extra.get("wordCount").and_then(Value::as_u64), Some(3));
    }

    #[test]
    fn unknown_hook_resolves_to_none() {
        assert!(resolve("doesNotExist").is_none());
    }
}
