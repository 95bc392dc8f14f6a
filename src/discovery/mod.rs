//! Page discovery: sitemap seed plus a bounded breadth-first crawl.

pub mod sitemap;

use std::collections::{HashSet, VecDeque};
use std::sync::LazyLock;
use regex::Regex;
use serde::Serialize;
use tracing::{debug, info, warn};
use url::Url;
use crate::browser::{Browser, PageHandle, PageOptions};
use crate::config::{AuditSettings, CrawlSettings, Viewport};
use crate::errors::AuditError;

static BLOCKED_EXTENSION_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)\.(pdf|zip|jpg|jpeg|png|gif|css|js|xml|json)$").expect("static regex")
});

const LINK_EXTRACTION_SCRIPT: &str =
    "Array.from(document.querySelectorAll('a[href]')).map(a => a.href)";

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DiscoveredPage {
    pub url: String,
    pub depth: u32,
}

/// Parse a URL and drop its fragment. Fails on anything `url` cannot parse.
pub fn normalize_url(raw: &str) -> Result<Url, AuditError> {
    let mut url = Url::parse(raw.trim())
        .map_err(|e| AuditError::InvalidTarget(format!("Invalid URL '{}': {}", raw, e)))?;
    url.set_fragment(None);
    Ok(url)
}

pub struct PageDiscoveryEngine {
    crawl: CrawlSettings,
    viewport: Viewport,
    http: reqwest::Client,
}

/// Discovery state for one `discover` call.
struct Frontier {
    seen: HashSet<String>,
    pages: Vec<DiscoveredPage>,
    queue: VecDeque<(Url, u32)>,
    max_pages: usize,
}

impl Frontier {
    fn new(max_pages: usize) -> Self {
        Self { seen: HashSet::new(), pages: Vec::new(), queue: VecDeque::new(), max_pages }
    }

    fn is_full(&self) -> bool {
        self.pages.len() >= self.max_pages
    }

    /// Record a URL; returns false when it was already known or the cap is hit.
    fn add(&mut self, url: &Url, depth: u32, enqueue: bool) -> bool {
        if self.is_full() || !self.seen.insert(url.to_string()) {
            return false;
        }
        self.pages.push(DiscoveredPage { url: url.to_string(), depth });
        if enqueue {
            self.queue.push_back((url.clone(), depth));
        }
        true
    }
}

impl PageDiscoveryEngine {
    pub fn new(settings: &AuditSettings, http: reqwest::Client) -> Self {
        Self {
            crawl: settings.crawl.clone(),
            viewport: settings.browser.viewport,
            http,
        }
    }

    /// Same host, http(s), no excluded path fragment, no blocked extension.
    pub fn is_valid_url(&self, candidate: &str, base: &Url) -> bool {
        let Ok(url) = Url::parse(candidate) else {
            return false;
        };
        if !matches!(url.scheme(), "http" | "https") {
            return false;
        }
        if url.host_str().is_none() || url.host_str() != base.host_str() {
            return false;
        }
        let path = url.path().to_lowercase();
        if self.crawl.excluded_patterns.iter().any(|p| path.contains(&p.to_lowercase())) {
            return false;
        }
        !BLOCKED_EXTENSION_RE.is_match(&path)
    }

    /// Discover up to `max_pages` same-site URLs starting at `base_url`.
    ///
    /// The base URL always comes first. Sitemap entries are recorded at depth 1
    /// and are not crawled. Only pages shallower than `max_depth` are loaded.
    pub async fn discover(
        &self,
        browser: &dyn Browser,
        base_url: &str,
    ) -> Result<Vec<DiscoveredPage>, AuditError> {
        let base = normalize_url(base_url)?;
        let mut frontier = Frontier::new(self.crawl.max_pages);
        frontier.add(&base, 0, true);

        match sitemap::fetch_sitemap(&self.http, base_url, self.crawl.sitemap_timeout).await {
            Ok(locs) => {
                let mut added = 0usize;
                for loc in locs {
                    if frontier.is_full() {
                        break;
                    }
                    if !self.is_valid_url(&loc, &base) {
                        continue;
                    }
                    if let Ok(url) = normalize_url(&loc) {
                        if frontier.add(&url, 1, false) {
                            added += 1;
                        }
                    }
                }
                info!(base = %base, added, "Sitemap entries added");
            }
            Err(AuditError::InvalidTarget(reason)) => warn!(base = %base, reason = %reason, "Ignoring malformed sitemap"),
            Err(e) => debug!(base = %base, error = %e, "No usable sitemap"),
        }

        if self.crawl.max_depth > 0 && !frontier.is_full() {
            let page = browser.new_page(&PageOptions::desktop(self.viewport)).await?;
            self.crawl(page.as_ref(), &base, &mut frontier).await;
            if let Err(e) = page.close().await {
                warn!(error = %e, "Failed to close crawl page");
            }
        }

        info!(base = %base, pages = frontier.pages.len(), "Discovery finished");
        Ok(frontier.pages)
    }

    async fn crawl(&self, page: &dyn PageHandle, base: &Url, frontier: &mut Frontier) {
        while let Some((url, depth)) = frontier.queue.pop_front() {
            if frontier.is_full() {
                break;
            }
            if depth >= self.crawl.max_depth {
                continue;
            }
            let links = match self.extract_links(page, &url).await {
                Ok(links) => links,
                Err(e) => {
                    warn!(url = %url, error = %e, "Failed to crawl page");
                    continue;
                }
            };
            for link in links {
                let Ok(mut resolved) = url.join(&link) else {
                    continue;
                };
                resolved.set_fragment(None);
                if self.is_valid_url(resolved.as_str(), base) {
                    frontier.add(&resolved, depth + 1, true);
                }
                if frontier.is_full() {
                    debug!(max_pages = self.crawl.max_pages, "Page cap reached");
                    return;
                }
            }
        }
    }

    async fn extract_links(&self, page: &dyn PageHandle, url: &Url) -> Result<Vec<String>, AuditError> {
        page.goto(url.as_str(), self.crawl.navigation_timeout).await?;
        let value = page.evaluate(LINK_EXTRACTION_SCRIPT).await?;
        Ok(serde_json::from_value(value).unwrap_or_default())
    }
}
