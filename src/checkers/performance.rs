use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use crate::errors::AuditError;
use crate::models::{Finding, FindingCategory, PerformanceIssue, Severity};
use super::{probe, CheckContext, Checker};

const PERF_PROBE: &str = r#"(async () => {
  const nav = performance.getEntriesByType('navigation')[0];
  const fcp = performance.getEntriesByType('paint').find(p => p.name === 'first-contentful-paint');
  const observe = (type, reduce) => new Promise(resolve => {
    let value = 0;
    try {
      const observer = new PerformanceObserver(list => { value = reduce(value, list.getEntries()); });
      observer.observe({ type, buffered: true });
      setTimeout(() => { observer.disconnect(); resolve(value); }, 100);
    } catch (e) { resolve(0); }
  });
  const lcp = await observe('largest-contentful-paint', (v, entries) => entries.length ? entries[entries.length - 1].startTime : v);
  const cls = await observe('layout-shift', (v, entries) => entries.reduce((acc, e) => e.hadRecentInput ? acc : acc + e.value, v));
  const resources = performance.getEntriesByType('resource');
  const count = type => resources.filter(r => r.initiatorType === type).length;
  return {
    pageLoadTime: nav ? nav.loadEventEnd - nav.fetchStart : 0,
    domContentLoaded: nav ? nav.domContentLoadedEventEnd - nav.fetchStart : 0,
    timeToInteractive: nav ? nav.domInteractive - nav.fetchStart : 0,
    firstContentfulPaint: fcp ? fcp.startTime : 0,
    largestContentfulPaint: lcp,
    cumulativeLayoutShift: cls,
    resourceCount: resources.length,
    totalResourceSize: resources.reduce((acc, r) => acc + (r.transferSize || 0), 0),
    imageCount: count('img'),
    scriptCount: count('script'),
    stylesheetCount: count('link'),
  };
})()"#;

const MB: f64 = 1024.0 * 1024.0;

/// Timings in milliseconds, sizes in bytes.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct PerformanceMetrics {
    pub page_load_time: f64,
    pub dom_content_loaded: f64,
    pub time_to_interactive: f64,
    pub first_contentful_paint: f64,
    pub largest_contentful_paint: f64,
    pub cumulative_layout_shift: f64,
    pub resource_count: u32,
    pub total_resource_size: f64,
    pub image_count: u32,
    pub script_count: u32,
    pub stylesheet_count: u32,
}

fn seconds(ms: f64) -> String {
    format!("{:.2}s", ms / 1000.0)
}

pub fn analyze(m: &PerformanceMetrics) -> Vec<PerformanceIssue> {
    let mut issues = Vec::new();
    let mut push = |metric: &str, severity, description: &str, value: String, threshold: &str, recommendation: &str| {
        issues.push(PerformanceIssue {
            metric: metric.to_string(),
            severity,
            description: description.to_string(),
            value,
            threshold: threshold.to_string(),
            recommendation: recommendation.to_string(),
        });
    };

    if m.page_load_time > 3000.0 {
        push(
            "Slow Page Load",
            if m.page_load_time > 5000.0 { Severity::Critical } else { Severity::Major },
            "Page load time exceeds recommended threshold",
            seconds(m.page_load_time),
            "< 3s",
            "Optimize images, minify resources, enable compression, use CDN",
        );
    }
    if m.first_contentful_paint > 1800.0 {
        push(
            "Slow First Contentful Paint",
            Severity::Major,
            "First Contentful Paint is slow",
            seconds(m.first_contentful_paint),
            "< 1.8s",
            "Eliminate render-blocking resources, optimize critical rendering path",
        );
    }
    if m.largest_contentful_paint > 2500.0 {
        push(
            "Slow Largest Contentful Paint",
            if m.largest_contentful_paint > 4000.0 { Severity::Critical } else { Severity::Major },
            "Largest Contentful Paint exceeds threshold",
            seconds(m.largest_contentful_paint),
            "< 2.5s",
            "Optimize largest image/element, improve server response time",
        );
    }
    if m.cumulative_layout_shift > 0.1 {
        push(
            "High Cumulative Layout Shift",
            if m.cumulative_layout_shift > 0.25 { Severity::Major } else { Severity::Minor },
            "Page has significant layout shifts",
            format!("{:.3}", m.cumulative_layout_shift),
            "< 0.1",
            "Set explicit dimensions for images and embeds, avoid inserting content above existing content",
        );
    }
    if m.total_resource_size > 3.0 * MB {
        push(
            "Large Page Size",
            Severity::Major,
            "Total page size is too large",
            format!("{:.2} MB", m.total_resource_size / MB),
            "< 3 MB",
            "Compress images, minify CSS/JS, enable gzip/brotli compression",
        );
    }
    if m.image_count > 30 {
        push(
            "Too Many Images",
            Severity::Minor,
            "Page loads many images",
            format!("{} images", m.image_count),
            "< 30",
            "Implement lazy loading, use image sprites, optimize image formats",
        );
    }

    issues
}

pub struct PerformanceChecker;

#[async_trait]
impl Checker for PerformanceChecker {
    fn name(&self) -> &'static str {
        "performance"
    }

    fn category(&self) -> FindingCategory {
        FindingCategory::Performance
    }

    async fn check(&self, ctx: &CheckContext<'_>) -> Result<Vec<Finding>, AuditError> {
        let metrics: PerformanceMetrics = probe(ctx.page, PERF_PROBE).await?;
        tracing::debug!(
            url = %ctx.url,
            load_ms = metrics.page_load_time,
            lcp_ms = metrics.largest_contentful_paint,
            resources = metrics.resource_count,
            "Performance metrics"
        );
        Ok(analyze(&metrics).into_iter().map(Finding::Performance).collect())
    }
}
