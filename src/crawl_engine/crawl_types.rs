//! Core types shared by the crawl session (§4.3).

use serde::{Deserialize, Serialize};
use std::fmt;

#[derive(Debug, Clone)]
pub enum CrawlError {
    ConfigError(String),
    BrowserError(String),
    NetworkError(String),
    Cancelled,
    Other(String),
}

impl fmt::Display for CrawlError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::ConfigError(msg) => write!(f, "configuration error: {msg}"),
            Self::BrowserError(msg) => write!(f, "browser error: {msg}"),
            Self::NetworkError(msg) => write!(f, "network error: {msg}"),
            Self::Cancelled => write!(f, "crawl operation was cancelled"),
            Self::Other(msg) => write!(f, "crawl error: {msg}"),
        }
    }
}

impl std::error::Error for CrawlError {}

impl From<anyhow::Error> for CrawlError {
    fn from(err: anyhow::Error) -> Self {
        Self::Other(format!("{err:#}"))
    }
}

pub type CrawlResult<T> = Result<T, CrawlError>;

/// One item in the BFS crawl queue.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CrawlQueue {
    pub url: String,
    pub depth: u8,
    #[serde(default)]
    pub retry_count: u8,
}

/// Categorizes page failures for intelligent retry decisions.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailureKind {
    Network,
    Browser,
    ContentExtraction,
    RateLimited,
    Unknown,
}

impl FailureKind {
    #[must_use]
    pub fn classify(error: &anyhow::Error) -> Self {
        let msg = error.to_string().to_lowercase();

        if msg.contains("429") || msg.contains("too many requests") || msg.contains("rate limit") {
            return Self::RateLimited;
        }

        if msg.contains("timeout")
            || msg.contains("timed out")
            || msg.contains("connection refused")
            || msg.contains("connection reset")
            || msg.contains("dns")
            || msg.contains("network")
            || msg.contains("unreachable")
            || msg.contains("eof")
        {
            return Self::Network;
        }

        if msg.contains("browser")
            || msg.contains("page")
            || msg.contains("chrome")
            || msg.contains("cdp")
            || msg.contains("target")
            || msg.contains("session")
        {
            return Self::Browser;
        }

        if msg.contains("extract")
            || msg.contains("validation")
            || msg.contains("content")
            || msg.contains("html")
            || msg.contains("parse")
            || msg.contains("selector")
        {
            return Self::ContentExtraction;
        }

        Self::Unknown
    }

    #[must_use]
    pub const fn is_retryable(&self) -> bool {
        match self {
            Self::Network | Self::Browser | Self::RateLimited | Self::Unknown => true,
            Self::ContentExtraction => false,
        }
    }

    #[must_use]
    pub const fn delay_multiplier(&self) -> f64 {
        match self {
            Self::Network => 1.0,
            Self::Browser => 1.5,
            Self::RateLimited => 3.0,
            Self::ContentExtraction | Self::Unknown => 1.0,
        }
    }
}
