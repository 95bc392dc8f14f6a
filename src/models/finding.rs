use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Severity of a finding or issue, ordered from most to least severe.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Severity {
    Critical,
    Major,
    Minor,
    Trivial,
}

impl Severity {
    /// Returns a numeric rank where lower values indicate higher severity.
    /// Critical = 0, Major = 1, Minor = 2, Trivial = 3.
    pub fn rank(&self) -> u8 {
        match self {
            Severity::Critical => 0,
            Severity::Major => 1,
            Severity::Minor => 2,
            Severity::Trivial => 3,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Severity::Critical => "Critical",
            Severity::Major => "Major",
            Severity::Minor => "Minor",
            Severity::Trivial => "Trivial",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "Critical" => Some(Severity::Critical),
            "Major" => Some(Severity::Major),
            "Minor" => Some(Severity::Minor),
            "Trivial" => Some(Severity::Trivial),
            _ => None,
        }
    }

    /// The most severe of `severities`, independent of input order.
    pub fn worst<I: IntoIterator<Item = Severity>>(severities: I) -> Option<Severity> {
        severities.into_iter().min_by_key(|s| s.rank())
    }

    /// Severity from an occurrence count: 5+ Critical, 2-4 Major, otherwise Minor.
    pub fn from_count(count: usize) -> Severity {
        if count >= 5 {
            Severity::Critical
        } else if count >= 2 {
            Severity::Major
        } else {
            Severity::Minor
        }
    }

    /// Severity from a visual difference percentage: >5 Critical, >1 Major, otherwise Minor.
    pub fn from_diff_percentage(pct: f64) -> Severity {
        if pct > 5.0 {
            Severity::Critical
        } else if pct > 1.0 {
            Severity::Major
        } else {
            Severity::Minor
        }
    }
}

impl std::fmt::Display for Severity {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Category discriminant of a [`Finding`]. One issue is created per page per
/// non-empty category; the declaration order is the order issues are created in.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FindingCategory {
    Visual,
    Form,
    BrokenLink,
    Accessibility,
    Performance,
    Seo,
    Mobile,
    JavaScriptError,
    VisualRegression,
}

impl FindingCategory {
    /// Issue type label stored on the issue record.
    pub fn label(&self) -> &'static str {
        match self {
            Self::Visual => "Visual",
            Self::Form => "Form",
            Self::BrokenLink => "Broken Link",
            Self::Accessibility => "Accessibility",
            Self::Performance => "Performance",
            Self::Seo => "SEO",
            Self::Mobile => "Mobile",
            Self::JavaScriptError => "JavaScript Error",
            Self::VisualRegression => "Visual Regression",
        }
    }
}

impl std::fmt::Display for FindingCategory {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.label())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AnomalyKind {
    HorizontalScroll,
    OverlappingElements,
    ViewportOverflow,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VisualAnomaly {
    pub kind: AnomalyKind,
    pub severity: Severity,
    pub message: String,
    pub element: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum FormOutcome {
    Passed,
    Failed,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FormField {
    pub name: String,
    pub field_type: String,
    pub required: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FormResult {
    /// CSS selector of the tested form, e.g. `form:nth-of-type(2)`.
    pub selector: String,
    pub outcome: FormOutcome,
    pub fields: Vec<FormField>,
    pub submit_status: Option<u16>,
    /// Error keywords found in the page text after submission.
    pub error_indicators: Vec<String>,
    pub error_message: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BrokenLink {
    pub url: String,
    /// HTTP status, or 0 when the request itself failed.
    pub status_code: u16,
    pub status_text: String,
    /// Where the link was found: anchor text, `Image: <alt>`, `Script`, `Stylesheet`.
    pub found_in: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AccessibilityIssue {
    pub rule: String,
    pub severity: Severity,
    pub description: String,
    pub element: Option<String>,
    pub recommendation: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PerformanceIssue {
    pub metric: String,
    pub severity: Severity,
    pub description: String,
    pub value: String,
    pub threshold: String,
    pub recommendation: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SeoIssue {
    pub rule: String,
    pub severity: Severity,
    pub description: String,
    pub current_value: Option<String>,
    pub recommendation: String,
}

/// Position of an offending element, kept as issue metadata for overlays.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ElementBox {
    pub x: f64,
    pub y: f64,
    pub width: f64,
    pub height: f64,
    pub selector: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MobileIssue {
    pub rule: String,
    pub severity: Severity,
    pub description: String,
    pub recommendation: String,
    /// `WxH` of the viewport the problem was seen on; `None` for page-wide checks.
    pub viewport: Option<String>,
    pub elements: Vec<ElementBox>,
    pub screenshot_path: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JsError {
    pub message: String,
    pub source: Option<String>,
    pub line: Option<u32>,
    pub column: Option<u32>,
    pub stack: Option<String>,
    pub timestamp: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VisualDiffResult {
    pub diff_id: String,
    pub baseline_id: String,
    pub difference_percentage: f64,
    pub pixel_diff_count: u64,
    pub passed: bool,
    pub diff_image_path: Option<String>,
}

/// A single observation produced by one checker for one page.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Finding {
    VisualAnomaly(VisualAnomaly),
    FormResult(FormResult),
    BrokenLink(BrokenLink),
    Accessibility(AccessibilityIssue),
    Performance(PerformanceIssue),
    Seo(SeoIssue),
    Mobile(MobileIssue),
    JsError(JsError),
    VisualDiff(VisualDiffResult),
}

impl Finding {
    pub fn category(&self) -> FindingCategory {
        match self {
            Finding::VisualAnomaly(_) => FindingCategory::Visual,
            Finding::FormResult(_) => FindingCategory::Form,
            Finding::BrokenLink(_) => FindingCategory::BrokenLink,
            Finding::Accessibility(_) => FindingCategory::Accessibility,
            Finding::Performance(_) => FindingCategory::Performance,
            Finding::Seo(_) => FindingCategory::Seo,
            Finding::Mobile(_) => FindingCategory::Mobile,
            Finding::JsError(_) => FindingCategory::JavaScriptError,
            Finding::VisualDiff(_) => FindingCategory::VisualRegression,
        }
    }

    /// Intrinsic severity of this single finding. Count-driven categories
    /// (broken links, script errors) are rated per occurrence as Minor; the
    /// aggregator applies their count rules.
    pub fn severity(&self) -> Severity {
        match self {
            Finding::VisualAnomaly(a) => a.severity,
            Finding::FormResult(_) => Severity::Major,
            Finding::BrokenLink(_) => Severity::Minor,
            Finding::Accessibility(a) => a.severity,
            Finding::Performance(p) => p.severity,
            Finding::Seo(s) => s.severity,
            Finding::Mobile(m) => m.severity,
            Finding::JsError(_) => Severity::Minor,
            Finding::VisualDiff(d) => Severity::from_diff_percentage(d.difference_percentage),
        }
    }

    /// Whether this finding represents a problem. Passed form submissions and
    /// passed baseline comparisons are findings but never become issues.
    pub fn is_problem(&self) -> bool {
        match self {
            Finding::FormResult(r) => r.outcome == FormOutcome::Failed,
            Finding::VisualDiff(d) => !d.passed,
            _ => true,
        }
    }

    /// One-entry human-readable rendering used in issue descriptions.
    pub fn describe(&self) -> String {
        match self {
            Finding::VisualAnomaly(a) => format!("• {}", a.message),
            Finding::FormResult(r) => {
                let mut out = format!("Form: {}\n", r.selector);
                if let Some(msg) = &r.error_message {
                    out.push_str(&format!("Error: {}\n", msg));
                }
                if !r.error_indicators.is_empty() {
                    out.push_str(&format!("Error indicators found: {}\n", r.error_indicators.join(", ")));
                }
                if let Some(status) = r.submit_status {
                    out.push_str(&format!("HTTP Status: {}\n", status));
                }
                out.push_str("Fields tested:");
                for field in &r.fields {
                    out.push_str(&format!(
                        "\n• {} ({}){}",
                        field.name,
                        field.field_type,
                        if field.required { " [required]" } else { "" }
                    ));
                }
                out
            }
            Finding::BrokenLink(l) => format!(
                "• {} - {} {}\n  Found in: {}",
                l.url, l.status_code, l.status_text, l.found_in
            ),
            Finding::Accessibility(a) => {
                let mut out = format!("[{}] {}\n{}", a.severity, a.rule, a.description);
                if let Some(el) = &a.element {
                    out.push_str(&format!("\nElement: {}", el));
                }
                out.push_str(&format!("\nRecommendation: {}", a.recommendation));
                out
            }
            Finding::Performance(p) => format!(
                "[{}] {}\n{}\nCurrent: {} | Threshold: {}\nRecommendation: {}",
                p.severity, p.metric, p.description, p.value, p.threshold, p.recommendation
            ),
            Finding::Seo(s) => {
                let mut out = format!("[{}] {}\n{}", s.severity, s.rule, s.description);
                if let Some(v) = &s.current_value {
                    out.push_str(&format!("\nCurrent: {}", v));
                }
                out.push_str(&format!("\nRecommendation: {}", s.recommendation));
                out
            }
            Finding::Mobile(m) => {
                let mut out = format!("[{}] {}\n{}", m.severity, m.rule, m.description);
                if let Some(v) = &m.viewport {
                    out.push_str(&format!("\nViewport: {}", v));
                }
                out.push_str(&format!("\nRecommendation: {}", m.recommendation));
                out
            }
            Finding::JsError(e) => {
                let mut out = format!("• {}", e.message);
                if let Some(src) = &e.source {
                    out.push_str(&format!(
                        "\n  Source: {}:{}:{}",
                        src,
                        e.line.unwrap_or(0),
                        e.column.unwrap_or(0)
                    ));
                }
                if let Some(stack) = &e.stack {
                    let head: String = stack.chars().take(200).collect();
                    out.push_str(&format!("\n  Stack: {}...", head));
                }
                out
            }
            Finding::VisualDiff(d) => {
                let mut out = format!(
                    "• Visual difference detected: {:.2}% ({} pixels)\n  Baseline ID: {}",
                    d.difference_percentage, d.pixel_diff_count, d.baseline_id
                );
                if let Some(path) = &d.diff_image_path {
                    out.push_str(&format!("\n  Diff image: {}", path));
                }
                out
            }
        }
    }
}
