//! JavaScript evaluation scripts used to pull data out of a loaded page.

/// Extracts every `<a href>` on the page as an absolute, deduplicated list.
pub const LINKS_SCRIPT: &str = r"
    (() => {
        const currentUrl = new URL(window.location.href);
        const links = Array.from(document.querySelectorAll('a[href]'))
            .map(link => {
                const href = link.getAttribute('href');
                if (!href || href.startsWith('#') || href.startsWith('javascript:')) return null;

                try {
                    const absoluteUrl = new URL(href, window.location.href);

                    if (!['http:', 'https:'].includes(absoluteUrl.protocol)) {
                        return null;
                    }

                    return {
                        url: absoluteUrl.href,
                        text: link.textContent?.trim() || '',
                        title: link.getAttribute('title') || '',
                        rel: link.getAttribute('rel') || '',
                        is_external: absoluteUrl.host !== currentUrl.host,
                        path: absoluteUrl.pathname
                    };
                } catch (e) {
                    return null;
                }
            })
            .filter(link => link !== null);

        const uniqueLinks = [];
        const seenUrls = new Set();

        for (const link of links) {
            if (!seenUrls.has(link.url)) {
                seenUrls.add(link.url);
                uniqueLinks.push(link);
            }
        }

        return uniqueLinks;
    })()
";

/// Builds the content-extraction script for one task's selector.
///
/// `selector` is embedded as a JSON string literal so it can contain quotes
/// safely; `is_xpath` picks `document.evaluate` over `querySelector` (§4.1:
/// a leading `/` in a task's `selector` means XPath).
pub fn content_script(selector: &str, is_xpath: bool) -> String {
    let selector_json = serde_json::to_string(selector).unwrap_or_else(|_| "\"\"".to_string());
    format!(
        r"
        (() => {{
            const sel = {selector_json};
            let el = null;
            if ({is_xpath}) {{
                const result = document.evaluate(sel, document, null, XPathResult.FIRST_ORDERED_NODE_TYPE, null);
                el = result.singleNodeValue;
            }} else {{
                el = document.querySelector(sel);
            }}
            return {{
                title: document.title || '',
                html: el ? el.outerHTML : ''
            }};
        }})()
        "
    )
}

/// Scopes anchor discovery to the task's `discoverySelector` during the
/// discovery phase (§4.3).
pub fn discovery_links_script(discovery_selector: &str) -> String {
    let selector_json =
        serde_json::to_string(discovery_selector).unwrap_or_else(|_| "\"\"".to_string());
    format!(
        r"
        (() => {{
            const currentUrl = new URL(window.location.href);
            const roots = Array.from(document.querySelectorAll({selector_json}));
            const anchors = roots.length > 0
                ? roots.flatMap(root => Array.from(root.querySelectorAll('a[href]')))
                : Array.from(document.querySelectorAll('a[href]'));

            const urls = anchors
                .map(a => {{
                    const href = a.getAttribute('href');
                    if (!href || href.startsWith('#') || href.startsWith('javascript:')) return null;
                    try {{
                        const abs = new URL(href, window.location.href);
                        return ['http:', 'https:'].includes(abs.protocol) ? abs.href : null;
                    }} catch (e) {{
                        return null;
                    }}
                }})
                .filter(u => u !== null);

            return [...new Set(urls)];
        }})()
        "
    )
}
