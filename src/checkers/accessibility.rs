use async_trait::async_trait;
use serde::Deserialize;
use crate::errors::AuditError;
use crate::models::{AccessibilityIssue, Finding, FindingCategory, Severity};
use super::{probe, CheckContext, Checker};

const A11Y_PROBE: &str = r#"(() => {
  const unnamed = el => !(el.textContent || '').trim() && !el.getAttribute('aria-label') && !el.title;
  const inputs = Array.from(document.querySelectorAll(
    'input:not([type="hidden"]):not([type="submit"]):not([type="button"])'));
  let lowContrast = 0;
  document.querySelectorAll('*').forEach(el => {
    if (!(el.textContent || '').trim()) return;
    const style = window.getComputedStyle(el);
    if (style.color && style.backgroundColor && style.color === style.backgroundColor) lowContrast++;
  });
  return {
    imagesWithoutAlt: Array.from(document.querySelectorAll('img:not([alt])')).map(img => img.src),
    headings: Array.from(document.querySelectorAll('h1, h2, h3, h4, h5, h6')).map(h => parseInt(h.tagName[1], 10)),
    unlabeledInputs: inputs.filter(input => {
      const labelled = input.id && document.querySelector('label[for="' + CSS.escape(input.id) + '"]');
      return !labelled && !input.getAttribute('aria-label') && !input.getAttribute('aria-labelledby');
    }).length,
    emptyLinks: Array.from(document.querySelectorAll('a')).filter(unnamed).length,
    emptyButtons: Array.from(document.querySelectorAll('button')).filter(unnamed).length,
    lowContrast,
    hasLang: document.documentElement.hasAttribute('lang'),
  };
})()"#;

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct A11yProbe {
    pub images_without_alt: Vec<String>,
    pub headings: Vec<u8>,
    pub unlabeled_inputs: usize,
    pub empty_links: usize,
    pub empty_buttons: usize,
    pub low_contrast: usize,
    pub has_lang: bool,
}

fn issue(rule: &str, severity: Severity, description: String, recommendation: &str) -> AccessibilityIssue {
    AccessibilityIssue {
        rule: rule.to_string(),
        severity,
        description,
        element: None,
        recommendation: recommendation.to_string(),
    }
}

pub fn analyze(p: &A11yProbe) -> Vec<AccessibilityIssue> {
    let mut issues = Vec::new();

    if !p.images_without_alt.is_empty() {
        let mut missing = issue(
            "Missing Alt Text",
            Severity::Major,
            format!("{} image(s) missing alt text", p.images_without_alt.len()),
            "Add descriptive alt text to all images for screen reader users",
        );
        missing.element = Some(p.images_without_alt.iter().take(3).cloned().collect::<Vec<_>>().join(", "));
        issues.push(missing);
    }

    if !p.headings.is_empty() {
        let h1_count = p.headings.iter().filter(|h| **h == 1).count();
        if h1_count == 0 {
            issues.push(issue(
                "Missing H1",
                Severity::Major,
                "Page does not have an H1 heading".into(),
                "Add a main H1 heading to the page for proper document structure",
            ));
        } else if h1_count > 1 {
            issues.push(issue(
                "Multiple H1s",
                Severity::Minor,
                format!("Page has {} H1 headings", h1_count),
                "Use only one H1 heading per page",
            ));
        }

        if let Some(w) = p.headings.windows(2).find(|w| w[1] > w[0] + 1) {
            issues.push(issue(
                "Skipped Heading Level",
                Severity::Minor,
                format!("Heading hierarchy jumps from H{} to H{}", w[0], w[1]),
                "Maintain proper heading hierarchy without skipping levels",
            ));
        }
    }

    if p.unlabeled_inputs > 0 {
        issues.push(issue(
            "Form Inputs Without Labels",
            Severity::Critical,
            format!("{} form input(s) without associated labels", p.unlabeled_inputs),
            "Add labels to all form inputs using <label> tags or aria-label attributes",
        ));
    }

    if p.empty_links > 0 {
        issues.push(issue(
            "Empty Links",
            Severity::Major,
            format!("{} link(s) without text content", p.empty_links),
            "Ensure all links have descriptive text or aria-label",
        ));
    }

    if p.low_contrast > 0 {
        issues.push(issue(
            "Low Color Contrast",
            Severity::Major,
            format!("Potential color contrast issues detected on {} element(s)", p.low_contrast),
            "Ensure text has sufficient contrast ratio (4.5:1 for normal text, 3:1 for large text)",
        ));
    }

    if !p.has_lang {
        issues.push(issue(
            "Missing Language Attribute",
            Severity::Major,
            "HTML element missing lang attribute".into(),
            "Add lang attribute to <html> tag (e.g., <html lang=\"en\">)",
        ));
    }

    if p.empty_buttons > 0 {
        issues.push(issue(
            "Empty Buttons",
            Severity::Critical,
            format!("{} button(s) without text or label", p.empty_buttons),
            "Add descriptive text or aria-label to all buttons",
        ));
    }

    issues
}

pub struct AccessibilityChecker;

#[async_trait]
impl Checker for AccessibilityChecker {
    fn name(&self) -> &'static str {
        "accessibility"
    }

    fn category(&self) -> FindingCategory {
        FindingCategory::Accessibility
    }

    async fn check(&self, ctx: &CheckContext<'_>) -> Result<Vec<Finding>, AuditError> {
        let result: A11yProbe = probe(ctx.page, A11Y_PROBE).await?;
        Ok(analyze(&result).into_iter().map(Finding::Accessibility).collect())
    }
}
