use std::collections::HashSet;
use async_trait::async_trait;
use futures::stream::{self, StreamExt};
use serde::Deserialize;
use tracing::debug;
use crate::config::LinkSettings;
use crate::errors::AuditError;
use crate::models::{BrokenLink, Finding, FindingCategory};
use super::{probe, CheckContext, Checker};

const RESOURCES_PROBE: &str = r#"(() => {
  const out = [];
  document.querySelectorAll('a[href]').forEach(a => out.push({ href: a.href, label: (a.textContent || '').trim() }));
  document.querySelectorAll('img[src]').forEach(img => out.push({ href: img.src, label: 'Image: ' + (img.alt || 'no alt text') }));
  document.querySelectorAll('script[src]').forEach(s => out.push({ href: s.src, label: 'Script' }));
  document.querySelectorAll('link[rel="stylesheet"][href]').forEach(l => out.push({ href: l.href, label: 'Stylesheet' }));
  return out;
})()"#;

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct Resource {
    pub href: String,
    #[serde(default)]
    pub label: String,
}

/// Deduplicate by href and drop links that are not fetchable resources.
pub fn link_candidates(resources: Vec<Resource>) -> Vec<Resource> {
    let mut seen = HashSet::new();
    resources
        .into_iter()
        .filter(|r| !r.href.is_empty() && seen.insert(r.href.clone()))
        .filter(|r| {
            !(r.href.starts_with("javascript:")
                || r.href.starts_with("mailto:")
                || r.href.starts_with("tel:")
                || r.href.contains('#'))
        })
        .collect()
}

/// HEAD every page resource; 4xx/5xx and network failures are broken.
pub struct BrokenLinkChecker {
    settings: LinkSettings,
    http: reqwest::Client,
}

impl BrokenLinkChecker {
    pub fn new(settings: LinkSettings, http: reqwest::Client) -> Self {
        Self { settings, http }
    }

    async fn head(&self, resource: Resource) -> Option<BrokenLink> {
        match self.http.head(&resource.href).timeout(self.settings.timeout).send().await {
            Ok(response) if response.status().as_u16() >= 400 => {
                let status = response.status();
                Some(BrokenLink {
                    url: resource.href,
                    status_code: status.as_u16(),
                    status_text: status.canonical_reason().unwrap_or_default().to_string(),
                    found_in: resource.label,
                })
            }
            Ok(_) => None,
            Err(e) => {
                let text = e.to_string();
                Some(BrokenLink {
                    url: resource.href,
                    status_code: 0,
                    status_text: if text.is_empty() { "Network Error".to_string() } else { text },
                    found_in: resource.label,
                })
            }
        }
    }
}

#[async_trait]
impl Checker for BrokenLinkChecker {
    fn name(&self) -> &'static str {
        "links"
    }

    fn category(&self) -> FindingCategory {
        FindingCategory::BrokenLink
    }

    async fn check(&self, ctx: &CheckContext<'_>) -> Result<Vec<Finding>, AuditError> {
        let resources: Vec<Resource> = probe(ctx.page, RESOURCES_PROBE).await?;
        let candidates = link_candidates(resources);
        debug!(url = %ctx.url, count = candidates.len(), "Checking links");

        let broken: Vec<Finding> = stream::iter(candidates)
            .map(|r| self.head(r))
            .buffered(self.settings.concurrency.max(1))
            .filter_map(|b| async move { b.map(Finding::BrokenLink) })
            .collect()
            .await;
        Ok(broken)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::AuditSettings;

    fn res(href: &str, label: &str) -> Resource {
        Resource { href: href.into(), label: label.into() }
    }

    #[test]
    fn test_candidates_skip_non_fetchable_and_dedup() {
        let candidates = link_candidates(vec![
            res("https://example.test/about", "About"),
            res("https://example.test/about", "About again"),
            res("javascript:void(0)", "Menu"),
            res("mailto:hi@example.test", "Email"),
            res("tel:5550100", "Call"),
            res("https://example.test/#top", "Top"),
            res("", "Empty"),
            res("https://cdn.example.test/app.css", "Stylesheet"),
        ]);
        assert_eq!(candidates, vec![
            res("https://example.test/about", "About"),
            res("https://cdn.example.test/app.css", "Stylesheet"),
        ]);
    }

    #[tokio::test]
    async fn test_unreachable_host_is_status_zero() {
        let mut settings = AuditSettings::default().links;
        settings.timeout = std::time::Duration::from_millis(500);
        let checker = BrokenLinkChecker::new(settings, reqwest::Client::new());
        let broken = checker.head(res("http://127.0.0.1:1/missing", "Dead")).await.unwrap();
        assert_eq!(broken.status_code, 0);
        assert_eq!(broken.found_in, "Dead");
        assert!(!broken.status_text.is_empty());
    }
}
