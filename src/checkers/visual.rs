use async_trait::async_trait;
use serde::Deserialize;
use crate::config::Viewport;
use crate::errors::AuditError;
use crate::models::{AnomalyKind, Finding, FindingCategory, Severity, VisualAnomaly};
use super::{probe, CheckContext, Checker};

const MAX_OVERLAP_PAIRS: usize = 5;

const LAYOUT_PROBE: &str = r#"(() => {
  const describe = el => el.tagName.toLowerCase() + (el.id ? '#' + el.id : '');
  const blocks = Array.from(document.querySelectorAll('div, section, article, header, footer, nav, main'));
  const overlaps = [];
  outer:
  for (let i = 0; i < blocks.length; i++) {
    const a = blocks[i].getBoundingClientRect();
    if (a.width === 0 || a.height === 0) continue;
    for (let j = i + 1; j < blocks.length; j++) {
      const b = blocks[j].getBoundingClientRect();
      if (b.width === 0 || b.height === 0) continue;
      const apart = a.right < b.left || a.left > b.right || a.bottom < b.top || a.top > b.bottom;
      if (apart || blocks[i].contains(blocks[j]) || blocks[j].contains(blocks[i])) continue;
      overlaps.push(describe(blocks[i]) + ' / ' + describe(blocks[j]));
      if (overlaps.length >= 5) break outer;
    }
  }
  let clipped = null;
  for (const el of document.querySelectorAll('div, section, article, header, footer, nav, main, aside')) {
    const r = el.getBoundingClientRect();
    if (r.height > 0 && (r.top < -100 || r.bottom > window.innerHeight + 100)) {
      const overflow = window.getComputedStyle(el).overflow;
      if (overflow !== 'auto' && overflow !== 'scroll') { clipped = describe(el); break; }
    }
  }
  return {
    scrollWidth: document.documentElement.scrollWidth,
    innerWidth: window.innerWidth,
    overlaps,
    clipped,
  };
})()"#;

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LayoutProbe {
    pub scroll_width: f64,
    pub inner_width: f64,
    #[serde(default)]
    pub overlaps: Vec<String>,
    pub clipped: Option<String>,
}

/// Desktop layout anomalies: horizontal scroll, overlapping blocks, and
/// content pushed outside the vertical viewport.
pub struct VisualAnomalyChecker {
    viewport: Viewport,
}

impl VisualAnomalyChecker {
    pub fn new(viewport: Viewport) -> Self {
        Self { viewport }
    }

    pub fn analyze(&self, probe: &LayoutProbe) -> Vec<VisualAnomaly> {
        let mut anomalies = Vec::new();

        if probe.scroll_width > probe.inner_width {
            anomalies.push(VisualAnomaly {
                kind: AnomalyKind::HorizontalScroll,
                severity: Severity::Major,
                message: format!("Detected horizontal scroll on desktop viewport ({})", self.viewport),
                element: None,
            });
        }

        if !probe.overlaps.is_empty() {
            let pairs: Vec<&String> = probe.overlaps.iter().take(MAX_OVERLAP_PAIRS).collect();
            anomalies.push(VisualAnomaly {
                kind: AnomalyKind::OverlappingElements,
                severity: Severity::Major,
                message: format!("Detected {} overlapping element(s)", pairs.len()),
                element: Some(pairs.iter().map(|s| s.as_str()).collect::<Vec<_>>().join(", ")),
            });
        }

        if let Some(el) = &probe.clipped {
            anomalies.push(VisualAnomaly {
                kind: AnomalyKind::ViewportOverflow,
                severity: Severity::Minor,
                message: "Elements partially outside viewport (cropped at top/bottom)".to_string(),
                element: Some(el.clone()),
            });
        }

        anomalies
    }
}

#[async_trait]
impl Checker for VisualAnomalyChecker {
    fn name(&self) -> &'static str {
        "visual"
    }

    fn category(&self) -> FindingCategory {
        FindingCategory::Visual
    }

    async fn check(&self, ctx: &CheckContext<'_>) -> Result<Vec<Finding>, AuditError> {
        let layout: LayoutProbe = probe(ctx.page, LAYOUT_PROBE).await?;
        Ok(self.analyze(&layout).into_iter().map(Finding::VisualAnomaly).collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn checker() -> VisualAnomalyChecker {
        VisualAnomalyChecker::new(Viewport::new(1440, 900))
    }

    #[test]
    fn test_clean_layout_has_no_anomalies() {
        let probe = LayoutProbe { scroll_width: 1440.0, inner_width: 1440.0, ..Default::default() };
        assert!(checker().analyze(&probe).is_empty());
    }

    #[test]
    fn test_horizontal_scroll_is_major() {
        let probe = LayoutProbe { scroll_width: 1600.0, inner_width: 1440.0, ..Default::default() };
        let anomalies = checker().analyze(&probe);
        assert_eq!(anomalies.len(), 1);
        assert_eq!(anomalies[0].kind, AnomalyKind::HorizontalScroll);
        assert_eq!(anomalies[0].severity, Severity::Major);
        assert!(anomalies[0].message.contains("1440x900"));
    }

    #[test]
    fn test_overlaps_collapse_into_one_anomaly() {
        let probe = LayoutProbe {
            scroll_width: 1440.0,
            inner_width: 1440.0,
            overlaps: (0..7).map(|i| format!("div#a{} / div#b{}", i, i)).collect(),
            clipped: Some("section#hero".into()),
        };
        let anomalies = checker().analyze(&probe);
        assert_eq!(anomalies.len(), 2);
        assert_eq!(anomalies[0].message, "Detected 5 overlapping element(s)");
        assert_eq!(anomalies[1].severity, Severity::Minor);
    }

    #[test]
    fn test_probe_json_shape() {
        let value = serde_json::json!({
            "scrollWidth": 1500, "innerWidth": 1440, "overlaps": [], "clipped": null
        });
        let probe: LayoutProbe = serde_json::from_value(value).unwrap();
        assert_eq!(probe.scroll_width, 1500.0);
        assert!(probe.clipped.is_none());
    }
}
