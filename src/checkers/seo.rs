use async_trait::async_trait;
use serde::Deserialize;
use crate::errors::AuditError;
use crate::models::{Finding, FindingCategory, SeoIssue, Severity};
use super::{probe, CheckContext, Checker};

const SEO_PROBE: &str = r#"(() => {
  const meta = sel => { const el = document.querySelector(sel); return el ? el.getAttribute('content') : null; };
  const canonical = document.querySelector('link[rel="canonical"]');
  return {
    title: document.title || null,
    metaDescription: meta('meta[name="description"]'),
    canonical: canonical ? canonical.href : null,
    ogTitle: meta('meta[property="og:title"]'),
    ogDescription: meta('meta[property="og:description"]'),
    ogImage: meta('meta[property="og:image"]'),
    h1Count: document.querySelectorAll('h1').length,
    viewport: meta('meta[name="viewport"]'),
    robots: meta('meta[name="robots"]'),
    imagesWithoutAlt: document.querySelectorAll('img:not([alt])').length,
    hasStructuredData: !!document.querySelector('script[type="application/ld+json"]'),
    url: window.location.href,
  };
})()"#;

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct SeoProbe {
    pub title: Option<String>,
    pub meta_description: Option<String>,
    pub canonical: Option<String>,
    pub og_title: Option<String>,
    pub og_description: Option<String>,
    pub og_image: Option<String>,
    pub h1_count: usize,
    pub viewport: Option<String>,
    pub robots: Option<String>,
    pub images_without_alt: usize,
    pub has_structured_data: bool,
    pub url: String,
}

fn present(value: &Option<String>) -> Option<&str> {
    value.as_deref().filter(|v| !v.trim().is_empty())
}

fn truncated(value: &str, max: usize) -> String {
    format!("{}...", value.chars().take(max).collect::<String>())
}

pub fn analyze(p: &SeoProbe) -> Vec<SeoIssue> {
    let mut issues = Vec::new();
    let mut push = |rule: &str, severity, description: String, current_value: Option<String>, recommendation: &str| {
        issues.push(SeoIssue {
            rule: rule.to_string(),
            severity,
            description,
            current_value,
            recommendation: recommendation.to_string(),
        });
    };

    match present(&p.title) {
        None => push("Missing Title", Severity::Critical, "Page does not have a title tag".into(), None,
            "Add a descriptive title tag (50-60 characters)"),
        Some(t) if t.chars().count() < 30 => push("Short Title", Severity::Minor, "Page title is too short".into(),
            Some(t.to_string()), "Use a title of 50-60 characters for better SEO"),
        Some(t) if t.chars().count() > 60 => push("Long Title", Severity::Minor, "Page title is too long".into(),
            Some(truncated(t, 60)), "Keep title under 60 characters to avoid truncation in search results"),
        Some(_) => {}
    }

    match present(&p.meta_description) {
        None => push("Missing Meta Description", Severity::Critical, "Page does not have a meta description".into(),
            None, "Add a meta description (150-160 characters)"),
        Some(d) if d.chars().count() < 120 => push("Short Meta Description", Severity::Minor,
            "Meta description is too short".into(), Some(d.to_string()), "Use a description of 150-160 characters"),
        Some(d) if d.chars().count() > 160 => push("Long Meta Description", Severity::Minor,
            "Meta description is too long".into(), Some(truncated(d, 160)), "Keep meta description under 160 characters"),
        Some(_) => {}
    }

    if present(&p.canonical).is_none() {
        push("Missing Canonical URL", Severity::Major, "Page does not have a canonical URL".into(), None,
            "Add a canonical link tag to prevent duplicate content issues");
    }

    if [&p.og_title, &p.og_description, &p.og_image].iter().any(|v| present(v).is_none()) {
        push("Incomplete Open Graph Tags", Severity::Minor, "Missing Open Graph meta tags for social sharing".into(),
            None, "Add og:title, og:description, and og:image meta tags");
    }

    if p.h1_count == 0 {
        push("Missing H1", Severity::Critical, "Page does not have an H1 heading".into(), None,
            "Add one H1 heading that describes the main topic of the page");
    } else if p.h1_count > 1 {
        push("Multiple H1 Tags", Severity::Major, format!("Page has {} H1 headings", p.h1_count), None,
            "Use only one H1 heading per page");
    }

    if present(&p.viewport).is_none() {
        push("Missing Viewport Meta Tag", Severity::Critical, "Page does not have a viewport meta tag".into(), None,
            "Add <meta name=\"viewport\" content=\"width=device-width, initial-scale=1\">");
    }

    if let Some(robots) = present(&p.robots) {
        let lower = robots.to_lowercase();
        if lower.contains("noindex") || lower.contains("nofollow") {
            push("Robots Meta Blocking", Severity::Critical, "Page is blocking search engine indexing".into(),
                Some(robots.to_string()), "Remove noindex/nofollow if you want the page indexed");
        }
    }

    if p.images_without_alt > 0 {
        push("Images Without Alt Text", Severity::Major,
            format!("{} image(s) missing alt attributes", p.images_without_alt), None,
            "Add descriptive alt text to all images for better SEO and accessibility");
    }

    if !p.has_structured_data {
        push("Missing Structured Data", Severity::Minor, "Page does not have structured data (Schema.org)".into(),
            None, "Add JSON-LD structured data for better search engine understanding");
    }

    if !p.url.starts_with("https://") {
        push("Not Using HTTPS", Severity::Critical, "Page is not served over HTTPS".into(), None,
            "Use HTTPS for security and SEO benefits");
    }

    issues
}

pub struct SeoChecker;

#[async_trait]
impl Checker for SeoChecker {
    fn name(&self) -> &'static str {
        "seo"
    }

    fn category(&self) -> FindingCategory {
        FindingCategory::Seo
    }

    async fn check(&self, ctx: &CheckContext<'_>) -> Result<Vec<Finding>, AuditError> {
        let mut result: SeoProbe = probe(ctx.page, SEO_PROBE).await?;
        if result.url.is_empty() {
            result.url = ctx.url.to_string();
        }
        Ok(analyze(&result).into_iter().map(Finding::Seo).collect())
    }
}
