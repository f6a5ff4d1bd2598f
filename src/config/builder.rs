//! Type-safe builder for `TaskConfig`, in the style of the teacher's
//! `CrawlConfigBuilder` typestate.

use std::marker::PhantomData;

use super::types::{Cookie, TaskConfig};

pub struct WithName;
pub struct WithEntry;

pub struct TaskConfigBuilder<State = ()> {
    name: Option<String>,
    entry: Option<String>,
    match_patterns: Vec<String>,
    exclude: Vec<String>,
    selector: String,
    auto_discover_nav: bool,
    discovery_selector: String,
    cookie: Vec<Cookie>,
    wait_for_selector_timeout: u64,
    resource_exclusions: Vec<String>,
    max_file_size_mb: Option<u64>,
    on_visit_page: Option<String>,
    output_file_name: Option<String>,
    _phantom: PhantomData<State>,
}

impl Default for TaskConfigBuilder<()> {
    fn default() -> Self {
        Self {
            name: None,
            entry: None,
            match_patterns: Vec::new(),
            exclude: Vec::new(),
            selector: "body".to_string(),
            auto_discover_nav: true,
            discovery_selector: "nav, aside".to_string(),
            cookie: Vec::new(),
            wait_for_selector_timeout: crate::utils::DEFAULT_SELECTOR_TIMEOUT_MS,
            resource_exclusions: Vec::new(),
            max_file_size_mb: None,
            on_visit_page: None,
            output_file_name: None,
            _phantom: PhantomData,
        }
    }
}

impl TaskConfig {
    #[must_use]
    pub fn builder() -> TaskConfigBuilder<()> {
        TaskConfigBuilder::default()
    }
}

impl TaskConfigBuilder<()> {
    #[must_use]
    pub fn name(self, name: impl Into<String>) -> TaskConfigBuilder<WithName> {
        TaskConfigBuilder {
            name: Some(name.into()),
            entry: self.entry,
            match_patterns: self.match_patterns,
            exclude: self.exclude,
            selector: self.selector,
            auto_discover_nav: self.auto_discover_nav,
            discovery_selector: self.discovery_selector,
            cookie: self.cookie,
            wait_for_selector_timeout: self.wait_for_selector_timeout,
            resource_exclusions: self.resource_exclusions,
            max_file_size_mb: self.max_file_size_mb,
            on_visit_page: self.on_visit_page,
            output_file_name: self.output_file_name,
            _phantom: PhantomData,
        }
    }
}

impl TaskConfigBuilder<WithName> {
    #[must_use]
    pub fn entry(self, entry: impl Into<String>) -> TaskConfigBuilder<WithEntry> {
        TaskConfigBuilder {
            name: self.name,
            entry: Some(entry.into()),
            match_patterns: self.match_patterns,
            exclude: self.exclude,
            selector: self.selector,
            auto_discover_nav: self.auto_discover_nav,
            discovery_selector: self.discovery_selector,
            cookie: self.cookie,
            wait_for_selector_timeout: self.wait_for_selector_timeout,
            resource_exclusions: self.resource_exclusions,
            max_file_size_mb: self.max_file_size_mb,
            on_visit_page: self.on_visit_page,
            output_file_name: self.output_file_name,
            _phantom: PhantomData,
        }
    }
}

impl TaskConfigBuilder<WithEntry> {
    /// Finalize the config. Errors if no `match` pattern was supplied (a
    /// task that matches nothing would never enqueue even its own entry).
    pub fn build(self) -> anyhow::Result<TaskConfig> {
        let name = self
            .name
            .ok_or_else(|| anyhow::anyhow!("name is required"))?;
        let entry = self
            .entry
            .ok_or_else(|| anyhow::anyhow!("entry is required"))?;

        let match_patterns = if self.match_patterns.is_empty() {
            vec![format!("{entry}**")]
        } else {
            self.match_patterns
        };

        Ok(TaskConfig {
            name,
            entry,
            match_patterns,
            exclude: self.exclude,
            selector: self.selector,
            auto_discover_nav: self.auto_discover_nav,
            discovery_selector: self.discovery_selector,
            cookie: self.cookie,
            wait_for_selector_timeout: self.wait_for_selector_timeout,
            resource_exclusions: self.resource_exclusions,
            max_file_size_mb: self.max_file_size_mb,
            on_visit_page: self.on_visit_page,
            output_file_name: self.output_file_name,
        })
    }
}

// Methods available at any state once required fields exist upstream.
impl<State> TaskConfigBuilder<State> {
    #[must_use]
    pub fn match_patterns(mut self, patterns: Vec<String>) -> Self {
        self.match_patterns = patterns;
        self
    }

    #[must_use]
    pub fn exclude(mut self, patterns: Vec<String>) -> Self {
        self.exclude = patterns;
        self
    }

    #[must_use]
    pub fn selector(mut self, selector: impl Into<String>) -> Self {
        self.selector = selector.into();
        self
    }

    #[must_use]
    pub fn auto_discover_nav(mut self, enabled: bool) -> Self {
        self.auto_discover_nav = enabled;
        self
    }

    #[must_use]
    pub fn discovery_selector(mut self, selector: impl Into<String>) -> Self {
        self.discovery_selector = selector.into();
        self
    }

    #[must_use]
    pub fn cookie(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.cookie.push(Cookie {
            name: name.into(),
            value: value.into(),
        });
        self
    }

    #[must_use]
    pub fn wait_for_selector_timeout(mut self, ms: u64) -> Self {
        self.wait_for_selector_timeout = ms;
        self
    }

    #[must_use]
    pub fn resource_exclusions(mut self, extensions: Vec<String>) -> Self {
        self.resource_exclusions = extensions;
        self
    }

    #[must_use]
    pub fn max_file_size_mb(mut self, mb: u64) -> Self {
        self.max_file_size_mb = Some(mb);
        self
    }

    #[must_use]
    pub fn on_visit_page(mut self, hook_name: impl Into<String>) -> Self {
        self.on_visit_page = Some(hook_name.into());
        self
    }

    #[must_use]
    pub fn output_file_name(mut self, name: impl Into<String>) -> Self {
        self.output_file_name = Some(name.into());
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn build_requires_name_and_entry() {
        let config = TaskConfig::builder()
            .name("alpha")
            .entry("https://example.test/")
            .match_patterns(vec!["https://example.test/**".to_string()])
            .build()
            .expect("build");

        assert_eq!(config.name, "alpha");
        assert_eq!(config.entry, "https://example.test/");
        assert!(config.auto_discover_nav);
    }

    #[test]
    fn default_match_pattern_derives_from_entry() {
        let config = TaskConfig::builder()
            .name("beta")
            .entry("https://example.test/")
            .build()
            .expect("build");

        assert_eq!(config.match_patterns, vec!["https://example.test/**".to_string()]);
    }
}
