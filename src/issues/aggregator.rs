use std::collections::BTreeMap;
use serde_json::json;
use tracing::info;
use crate::db::Database;
use crate::errors::AuditError;
use crate::models::{Finding, FindingCategory, NewIssue, Severity};
use super::title::page_title;

const MAX_DESCRIBED: usize = 10;
const REGRESSION_NOTE: &str = "Current screenshot differs from established baseline(s). \
Review the diff images to determine if changes are intentional.";

/// Identity of the page whose findings are being aggregated.
#[derive(Debug, Clone)]
pub struct PageContext {
    pub project_id: Option<String>,
    pub site_id: String,
    pub run_id: String,
    pub page_id: String,
    pub url: String,
    pub screenshot_path: Option<String>,
}

fn title_for(category: FindingCategory, count: usize, page: &str) -> String {
    match category {
        FindingCategory::Visual => format!("Visual Layout Issues on {}", page),
        FindingCategory::Form if count == 1 => format!("Form Submission Failed on {}", page),
        FindingCategory::Form => format!("{} Form Submissions Failed on {}", count, page),
        FindingCategory::BrokenLink => format!("{} Broken Link(s) on {}", count, page),
        FindingCategory::Mobile => format!("{} Mobile Responsiveness Issue(s) on {}", count, page),
        FindingCategory::JavaScriptError => format!("{} JavaScript Error(s) on {}", count, page),
        FindingCategory::VisualRegression => {
            format!("Visual Regression: {} Baseline(s) Failed on {}", count, page)
        }
        FindingCategory::Accessibility | FindingCategory::Performance | FindingCategory::Seo => {
            format!("{} {} Issue(s) on {}", count, category.label(), page)
        }
    }
}

fn severity_for(category: FindingCategory, findings: &[&Finding]) -> Severity {
    match category {
        FindingCategory::Form => Severity::Major,
        FindingCategory::BrokenLink | FindingCategory::JavaScriptError => Severity::from_count(findings.len()),
        FindingCategory::VisualRegression => {
            let max = findings
                .iter()
                .filter_map(|f| match f {
                    Finding::VisualDiff(d) => Some(d.difference_percentage),
                    _ => None,
                })
                .fold(0.0_f64, f64::max);
            Severity::from_diff_percentage(max)
        }
        _ => Severity::worst(findings.iter().map(|f| f.severity())).unwrap_or(Severity::Major),
    }
}

fn description_for(category: FindingCategory, findings: &[&Finding]) -> String {
    let separator = if category == FindingCategory::Visual { "\n" } else { "\n\n" };
    let mut description = findings
        .iter()
        .take(MAX_DESCRIBED)
        .map(|f| f.describe())
        .collect::<Vec<_>>()
        .join(separator);
    if findings.len() > MAX_DESCRIBED {
        description.push_str(&format!("\n\n... and {} more", findings.len() - MAX_DESCRIBED));
    }
    if category == FindingCategory::VisualRegression {
        description.push_str("\n\n");
        description.push_str(REGRESSION_NOTE);
    }
    description
}

fn metadata_for(category: FindingCategory, findings: &[&Finding]) -> Option<serde_json::Value> {
    if category != FindingCategory::Mobile {
        return None;
    }
    let issues: Vec<serde_json::Value> = findings
        .iter()
        .filter_map(|f| match f {
            Finding::Mobile(m) => Some(json!({
                "type": m.rule,
                "severity": m.severity,
                "description": m.description,
                "viewport": m.viewport,
                "elements": m.elements,
            })),
            _ => None,
        })
        .collect();
    Some(json!({ "issues": issues }))
}

/// Turn a page's findings into at most one issue per category, in category
/// order. Passed form submissions and passed comparisons are dropped first.
pub fn build_issues(ctx: &PageContext, findings: &[Finding]) -> Vec<NewIssue> {
    let mut grouped: BTreeMap<FindingCategory, Vec<&Finding>> = BTreeMap::new();
    for finding in findings.iter().filter(|f| f.is_problem()) {
        grouped.entry(finding.category()).or_default().push(finding);
    }

    let page = page_title(&ctx.url);
    grouped
        .into_iter()
        .map(|(category, group)| NewIssue {
            project_id: ctx.project_id.clone(),
            site_id: ctx.site_id.clone(),
            run_id: ctx.run_id.clone(),
            page_id: ctx.page_id.clone(),
            url: ctx.url.clone(),
            category,
            title: title_for(category, group.len(), &page),
            description: description_for(category, &group),
            severity: severity_for(category, &group),
            screenshot_path: ctx.screenshot_path.clone(),
            metadata: metadata_for(category, &group),
        })
        .collect()
}

/// Persists aggregated issues for a page.
#[derive(Clone)]
pub struct IssueAggregator {
    db: Database,
}

impl IssueAggregator {
    pub fn new(db: Database) -> Self {
        Self { db }
    }

    /// Returns the number of issues created.
    pub fn aggregate(&self, ctx: &PageContext, findings: &[Finding]) -> Result<usize, AuditError> {
        let issues = build_issues(ctx, findings);
        for issue in &issues {
            self.db.create_issue(issue)?;
            info!(
                url = %ctx.url,
                issue_type = issue.category.label(),
                severity = %issue.severity,
                "Created issue"
            );
        }
        Ok(issues.len())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::*;

    fn ctx() -> PageContext {
        PageContext {
            project_id: None,
            site_id: "site".into(),
            run_id: "run".into(),
            page_id: "page".into(),
            url: "https://example.test/contact-us".into(),
            screenshot_path: Some("shot.png".into()),
        }
    }

    fn link(n: usize) -> Finding {
        Finding::BrokenLink(BrokenLink {
            url: format!("https://example.test/missing-{}", n),
            status_code: 404,
            status_text: "Not Found".into(),
            found_in: "Docs".into(),
        })
    }

    fn form(outcome: FormOutcome) -> Finding {
        Finding::FormResult(FormResult {
            selector: "form:nth-of-type(1)".into(),
            outcome,
            fields: vec![FormField { name: "email".into(), field_type: "email".into(), required: true }],
            submit_status: Some(500),
            error_indicators: vec!["error".into()],
            error_message: None,
        })
    }

    fn diff(pct: f64, passed: bool) -> Finding {
        Finding::VisualDiff(VisualDiffResult {
            diff_id: "d".into(),
            baseline_id: "b".into(),
            difference_percentage: pct,
            pixel_diff_count: 10,
            passed,
            diff_image_path: None,
        })
    }

    fn a11y(rule: &str, severity: Severity) -> Finding {
        Finding::Accessibility(AccessibilityIssue {
            rule: rule.into(),
            severity,
            description: "d".into(),
            element: None,
            recommendation: "r".into(),
        })
    }

    #[test]
    fn test_one_issue_per_category_in_order() {
        let findings = vec![
            a11y("Missing H1", Severity::Major),
            link(1),
            a11y("Empty Buttons", Severity::Critical),
            link(2),
        ];
        let issues = build_issues(&ctx(), &findings);
        assert_eq!(issues.len(), 2);
        assert_eq!(issues[0].category, FindingCategory::BrokenLink);
        assert_eq!(issues[0].title, "2 Broken Link(s) on Contact Us");
        assert_eq!(issues[0].severity, Severity::Major);
        assert_eq!(issues[1].title, "2 Accessibility Issue(s) on Contact Us");
        assert_eq!(issues[1].severity, Severity::Critical);
    }

    #[test]
    fn test_broken_link_description_is_capped() {
        let findings: Vec<Finding> = (0..12).map(link).collect();
        let issues = build_issues(&ctx(), &findings);
        assert_eq!(issues[0].severity, Severity::Critical);
        assert!(issues[0].description.ends_with("... and 2 more"));
        assert_eq!(issues[0].description.matches("Found in").count(), 10);
    }

    #[test]
    fn test_passed_results_produce_nothing() {
        let findings = vec![form(FormOutcome::Passed), diff(0.05, true)];
        assert!(build_issues(&ctx(), &findings).is_empty());
    }

    #[test]
    fn test_form_failures_are_major() {
        let one = build_issues(&ctx(), &[form(FormOutcome::Failed)]);
        assert_eq!(one[0].title, "Form Submission Failed on Contact Us");
        assert_eq!(one[0].severity, Severity::Major);
        assert!(one[0].description.contains("HTTP Status: 500"));

        let two = build_issues(&ctx(), &[form(FormOutcome::Failed), form(FormOutcome::Failed)]);
        assert_eq!(two[0].title, "2 Form Submissions Failed on Contact Us");
    }

    #[test]
    fn test_regression_severity_from_max_difference() {
        let issues = build_issues(&ctx(), &[diff(1.5, false), diff(0.2, false), diff(0.0, true)]);
        assert_eq!(issues.len(), 1);
        assert_eq!(issues[0].title, "Visual Regression: 2 Baseline(s) Failed on Contact Us");
        assert_eq!(issues[0].severity, Severity::Major);
        assert!(issues[0].description.ends_with(REGRESSION_NOTE));
    }

    #[test]
    fn test_mobile_metadata_carries_elements() {
        let finding = Finding::Mobile(MobileIssue {
            rule: "Small Touch Targets".into(),
            severity: Severity::Major,
            description: "1 interactive element(s) smaller than recommended touch target size".into(),
            recommendation: "r".into(),
            viewport: None,
            elements: vec![ElementBox { x: 1.0, y: 2.0, width: 30.0, height: 20.0, selector: Some("a".into()) }],
            screenshot_path: None,
        });
        let issues = build_issues(&ctx(), &[finding]);
        let meta = issues[0].metadata.as_ref().unwrap();
        assert_eq!(meta["issues"][0]["type"], "Small Touch Targets");
        assert_eq!(meta["issues"][0]["elements"][0]["width"], 30.0);
        assert_eq!(issues[0].title, "1 Mobile Responsiveness Issue(s) on Contact Us");
    }

    #[test]
    fn test_aggregate_persists_issues() {
        let db = Database::in_memory().unwrap();
        let site = db.create_site("Example", "https://example.test/", None).unwrap();
        let run = db.create_run(&site.id).unwrap();
        let page = db.create_page(&NewPage { run_id: run.id.clone(), url: "https://example.test/".into(), ..Default::default() }).unwrap();
        let ctx = PageContext { site_id: site.id, run_id: run.id.clone(), page_id: page.id, url: page.url, ..ctx() };

        let created = IssueAggregator::new(db.clone()).aggregate(&ctx, &[link(1), a11y("Missing H1", Severity::Major)]).unwrap();
        assert_eq!(created, 2);
        let stored = db.list_issues_for_run(&run.id).unwrap();
        assert_eq!(stored.len(), 2);
        assert!(stored.iter().all(|i| i.status == NEW_ISSUE_STATUS));
        assert!(stored.iter().any(|i| i.title == "1 Broken Link(s) on Homepage"));
    }
}
