use std::time::Duration;
use async_trait::async_trait;
use serde::Deserialize;
use tracing::warn;
use crate::browser::{PageHandle, PageOptions};
use crate::config::Viewport;
use crate::errors::AuditError;
use crate::models::{ElementBox, Finding, FindingCategory, MobileIssue, Severity};
use super::{probe, CheckContext, Checker};

#[derive(Debug, Clone, Copy)]
pub struct Device {
    pub name: &'static str,
    pub viewport: Viewport,
}

pub const DEVICES: &[Device] = &[
    Device { name: "iPhone SE", viewport: Viewport { width: 375, height: 667 } },
    Device { name: "iPhone 12 Pro", viewport: Viewport { width: 390, height: 844 } },
    Device { name: "iPad", viewport: Viewport { width: 768, height: 1024 } },
    Device { name: "Galaxy S20", viewport: Viewport { width: 360, height: 800 } },
];

const MIN_TOUCH_TARGET: f64 = 44.0;
const MIN_FONT_PX: f64 = 12.0;
const OFFSCREEN_TOLERANCE_PX: f64 = 10.0;
const OFFSCREEN_ELEMENT_LIMIT: usize = 3;

const MOBILE_PROBE: &str = r#"(() => {
  const box = el => {
    const r = el.getBoundingClientRect();
    const cls = el.className && typeof el.className === 'string' && el.className.trim()
      ? '.' + el.className.trim().split(/\s+/)[0] : '';
    return { x: r.left, y: r.top, width: r.width, height: r.height,
      selector: el.tagName.toLowerCase() + (el.id ? '#' + el.id : '') + cls };
  };
  const targets = Array.from(document.querySelectorAll('button, a, input[type="button"], input[type="submit"]'));
  const interactive = Array.from(document.querySelectorAll('button, a, input'));
  const overlapping = [];
  for (let i = 0; i < interactive.length; i++) {
    const a = interactive[i].getBoundingClientRect();
    for (let j = i + 1; j < interactive.length; j++) {
      const b = interactive[j].getBoundingClientRect();
      if (!(a.right < b.left || a.left > b.right || a.bottom < b.top || a.top > b.bottom)) {
        overlapping.push(box(interactive[i]));
        break;
      }
    }
  }
  return {
    scrollWidth: document.documentElement.scrollWidth,
    innerWidth: window.innerWidth,
    hasViewportMeta: !!document.querySelector('meta[name="viewport"]'),
    smallTargets: targets.filter(el => {
      const r = el.getBoundingClientRect();
      return r.width < 44 || r.height < 44;
    }).map(box),
    fontSizes: Array.from(document.querySelectorAll('p, span, div, a, li'))
      .filter(el => (el.textContent || '').trim().length > 0)
      .map(el => parseFloat(window.getComputedStyle(el).fontSize) || 0),
    overlapping,
    rightEdges: Array.from(document.querySelectorAll('*')).map(el => el.getBoundingClientRect().right),
  };
})()"#;

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct MobileProbe {
    pub scroll_width: f64,
    pub inner_width: f64,
    pub has_viewport_meta: bool,
    pub small_targets: Vec<ElementBox>,
    pub font_sizes: Vec<f64>,
    pub overlapping: Vec<ElementBox>,
    pub right_edges: Vec<f64>,
}

/// Issues for one device. Page-wide rules (viewport meta, touch targets,
/// font size) are only evaluated on the first device.
pub fn analyze_viewport(
    device: &Device,
    first: bool,
    p: &MobileProbe,
    screenshot_path: Option<&str>,
) -> Vec<MobileIssue> {
    let mut issues = Vec::new();
    let viewport = device.viewport.to_string();
    let issue = |rule: &str, severity, description: String, recommendation: &str, per_viewport: bool| MobileIssue {
        rule: rule.to_string(),
        severity,
        description,
        recommendation: recommendation.to_string(),
        viewport: per_viewport.then(|| viewport.clone()),
        elements: Vec::new(),
        screenshot_path: if per_viewport { screenshot_path.map(str::to_string) } else { None },
    };

    if p.scroll_width > p.inner_width {
        issues.push(issue(
            "Horizontal Scroll on Mobile",
            Severity::Critical,
            format!("Page has horizontal scrolling on {}", device.name),
            "Ensure all content fits within viewport width, use responsive CSS",
            true,
        ));
    }

    if first && !p.has_viewport_meta {
        issues.push(issue(
            "Missing Viewport Meta Tag",
            Severity::Critical,
            "Page does not have a viewport meta tag".into(),
            "Add <meta name=\"viewport\" content=\"width=device-width, initial-scale=1\">",
            false,
        ));
    }

    let small: Vec<&ElementBox> = p
        .small_targets
        .iter()
        .filter(|b| b.width < MIN_TOUCH_TARGET || b.height < MIN_TOUCH_TARGET)
        .collect();
    if first && !small.is_empty() {
        let mut i = issue(
            "Small Touch Targets",
            Severity::Major,
            format!("{} interactive element(s) smaller than recommended touch target size", small.len()),
            "Ensure buttons and links are at least 44x44 pixels for easy tapping",
            false,
        );
        i.elements = small.into_iter().cloned().collect();
        issues.push(i);
    }

    let small_text = p.font_sizes.iter().filter(|s| **s < MIN_FONT_PX).count();
    if first && small_text > 0 {
        issues.push(issue(
            "Small Text Size",
            Severity::Major,
            format!("{} element(s) with font size smaller than 12px", small_text),
            "Use minimum font size of 16px for body text on mobile",
            false,
        ));
    }

    if !p.overlapping.is_empty() {
        let mut i = issue(
            "Overlapping Interactive Elements",
            Severity::Major,
            format!("Interactive elements are overlapping on {}", device.name),
            "Ensure interactive elements have proper spacing and do not overlap",
            true,
        );
        i.elements = p.overlapping.clone();
        issues.push(i);
    }

    let offscreen = p
        .right_edges
        .iter()
        .filter(|r| **r > p.inner_width + OFFSCREEN_TOLERANCE_PX)
        .count();
    if offscreen > OFFSCREEN_ELEMENT_LIMIT {
        issues.push(issue(
            "Elements Extending Beyond Viewport",
            Severity::Major,
            format!("{} element(s) extend beyond viewport on {}", offscreen, device.name),
            "Use max-width: 100% and proper responsive layout",
            true,
        ));
    }

    issues
}

/// Reloads the page in each device viewport with a mobile user agent.
pub struct MobileChecker {
    page_timeout: Duration,
}

impl MobileChecker {
    pub fn new(page_timeout: Duration) -> Self {
        Self { page_timeout }
    }

    async fn inspect(
        &self,
        page: &dyn PageHandle,
        ctx: &CheckContext<'_>,
        device: &Device,
    ) -> Result<(MobileProbe, String), AuditError> {
        page.goto(ctx.url, self.page_timeout).await?;
        let shot = ctx.run_dir.join(format!(
            "mobile-{}-{}.png",
            device.viewport,
            chrono::Utc::now().timestamp_millis()
        ));
        page.screenshot(&shot, true).await?;
        let result = probe(page, MOBILE_PROBE).await?;
        Ok((result, shot.to_string_lossy().into_owned()))
    }
}

#[async_trait]
impl Checker for MobileChecker {
    fn name(&self) -> &'static str {
        "mobile"
    }

    fn category(&self) -> FindingCategory {
        FindingCategory::Mobile
    }

    async fn check(&self, ctx: &CheckContext<'_>) -> Result<Vec<Finding>, AuditError> {
        let mut findings = Vec::new();
        for (index, device) in DEVICES.iter().enumerate() {
            let page = match ctx.browser.new_page(&PageOptions::mobile(device.viewport)).await {
                Ok(page) => page,
                Err(e) => {
                    warn!(url = %ctx.url, device = device.name, error = %e, "Failed to open mobile page");
                    continue;
                }
            };
            let outcome = self.inspect(page.as_ref(), ctx, device).await;
            if let Err(e) = page.close().await {
                warn!(device = device.name, error = %e, "Failed to close mobile page");
            }
            match outcome {
                Ok((result, shot)) => findings.extend(
                    analyze_viewport(device, index == 0, &result, Some(&shot))
                        .into_iter()
                        .map(Finding::Mobile),
                ),
                Err(e) => warn!(url = %ctx.url, device = device.name, error = %e, "Mobile viewport check failed"),
            }
        }
        Ok(findings)
    }
}
