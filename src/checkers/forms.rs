use std::time::Duration;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};
use crate::config::{FormSettings, TestData};
use crate::errors::AuditError;
use crate::models::{Finding, FindingCategory, FormField, FormOutcome, FormResult};
use super::{probe, CheckContext, Checker};

const FORMS_PROBE: &str = r#"Array.from(document.querySelectorAll('form')).map(form =>
  Array.from(form.querySelectorAll('input, select, textarea'))
    .filter(el => !['hidden', 'submit', 'button'].includes(el.type))
    .map(el => ({ name: el.name || el.id || '', type: el.type || 'text', required: !!el.required })))"#;

const BODY_TEXT: &str = "document.body ? document.body.innerText : ''";

#[derive(Debug, Clone, Deserialize)]
struct ProbedField {
    name: String,
    #[serde(rename = "type")]
    field_type: String,
    #[serde(default)]
    required: bool,
}

impl From<ProbedField> for FormField {
    fn from(f: ProbedField) -> Self {
        FormField { name: f.name, field_type: f.field_type, required: f.required }
    }
}

/// What to do with one field before submitting.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "action", content = "value", rename_all = "snake_case")]
pub enum FillAction {
    Fill(String),
    Check,
    /// Pick the first real option (index 1; index 0 is usually a placeholder).
    Select,
}

#[derive(Debug, Serialize)]
struct FillStep<'a> {
    name: &'a str,
    #[serde(flatten)]
    action: FillAction,
}

/// Login forms are skipped: a password field, an email-like field, and at most three fields.
pub fn is_login_form(fields: &[FormField]) -> bool {
    let has_password = fields.iter().any(|f| f.field_type == "password");
    let has_email = fields
        .iter()
        .any(|f| f.field_type == "email" || f.name.to_lowercase().contains("email"));
    has_password && has_email && fields.len() <= 3
}

pub fn fill_action(field: &FormField, data: &TestData) -> FillAction {
    let name = field.name.to_lowercase();
    let ty = field.field_type.as_str();
    if ty == "email" {
        FillAction::Fill(data.email.clone())
    } else if name.contains("name") {
        if name.contains("first") {
            FillAction::Fill(data.first_name.clone())
        } else if name.contains("last") {
            FillAction::Fill(data.last_name.clone())
        } else {
            FillAction::Fill(data.name.clone())
        }
    } else if name.contains("phone") || name.contains("tel") {
        FillAction::Fill(data.phone.clone())
    } else if name.contains("company") {
        FillAction::Fill(data.company.clone())
    } else if name.contains("message") || ty == "textarea" {
        FillAction::Fill(data.message.clone())
    } else if ty == "checkbox" {
        FillAction::Check
    } else if ty == "select" || ty == "select-one" {
        FillAction::Select
    } else {
        FillAction::Fill(data.text.clone())
    }
}

fn keywords_in(text: &str, keywords: &[String]) -> Vec<String> {
    let lower = text.to_lowercase();
    keywords
        .iter()
        .filter(|k| lower.contains(&k.to_lowercase()))
        .cloned()
        .collect()
}

#[derive(Debug, Clone, PartialEq)]
pub struct SubmissionVerdict {
    pub outcome: FormOutcome,
    pub error_indicators: Vec<String>,
    pub error_message: Option<String>,
}

/// Decide whether a submission worked from the page text and response status.
pub fn classify_submission(page_text: &str, status: Option<u16>, settings: &FormSettings) -> SubmissionVerdict {
    let success = keywords_in(page_text, &settings.success_keywords);
    let errors = keywords_in(page_text, &settings.error_keywords);

    let error_message = if !errors.is_empty() {
        Some(format!("Form submission showed errors: {}", errors.join(", ")))
    } else if let Some(code) = status.filter(|s| *s >= 400) {
        Some(format!("Form submission returned HTTP {}", code))
    } else if success.is_empty() && status.map_or(true, |s| s >= 300) {
        Some("No success indicators found after form submission".to_string())
    } else {
        None
    };

    SubmissionVerdict {
        outcome: if error_message.is_some() { FormOutcome::Failed } else { FormOutcome::Passed },
        error_indicators: errors,
        error_message,
    }
}

fn fill_script(index: usize, steps: &[FillStep<'_>]) -> Result<String, AuditError> {
    let plan = serde_json::to_string(steps)?;
    Ok(format!(
        r#"((idx, plan) => {{
  const form = document.querySelectorAll('form')[idx];
  if (!form) throw new Error('Form #' + idx + ' not found');
  form.setAttribute('data-siteaudit-form', String(idx));
  for (const step of plan) {{
    const el = form.querySelector('[name="' + CSS.escape(step.name) + '"]')
      || form.querySelector('#' + CSS.escape(step.name));
    if (!el) continue;
    try {{
      if (step.action === 'check') el.checked = true;
      else if (step.action === 'select') {{ if (el.options && el.options.length > 1) el.selectedIndex = 1; }}
      else el.value = step.value;
      el.dispatchEvent(new Event('input', {{ bubbles: true }}));
      el.dispatchEvent(new Event('change', {{ bubbles: true }}));
    }} catch (e) {{}}
  }}
  return true;
}})({}, {})"#,
        index, plan
    ))
}

/// Fills and submits every non-login form with synthetic data.
pub struct FormChecker {
    settings: FormSettings,
    page_timeout: Duration,
    settle: Duration,
}

impl FormChecker {
    pub fn new(settings: FormSettings, page_timeout: Duration, settle: Duration) -> Self {
        Self { settings, page_timeout, settle }
    }

    async fn submit_one(
        &self,
        ctx: &CheckContext<'_>,
        index: usize,
        fields: &[FormField],
    ) -> Result<(Option<u16>, String), AuditError> {
        // Fresh form state for every submission
        ctx.page.goto(ctx.url, self.page_timeout).await?;

        let steps: Vec<FillStep<'_>> = fields
            .iter()
            .filter(|f| !f.name.is_empty())
            .map(|f| FillStep { name: &f.name, action: fill_action(f, &self.settings.test_data) })
            .collect();
        ctx.page.evaluate(&fill_script(index, &steps)?).await?;

        let marker = format!("form[data-siteaudit-form=\"{}\"]", index);
        let status = ctx.page.submit_form(&marker, self.settings.submit_timeout).await?;
        tokio::time::sleep(self.settle).await;

        let text = ctx.page.evaluate(BODY_TEXT).await?;
        Ok((status, text.as_str().unwrap_or_default().to_string()))
    }
}

#[async_trait]
impl Checker for FormChecker {
    fn name(&self) -> &'static str {
        "forms"
    }

    fn category(&self) -> FindingCategory {
        FindingCategory::Form
    }

    async fn check(&self, ctx: &CheckContext<'_>) -> Result<Vec<Finding>, AuditError> {
        let forms: Vec<Vec<ProbedField>> = probe(ctx.page, FORMS_PROBE).await?;
        if forms.is_empty() {
            return Ok(Vec::new());
        }
        info!(url = %ctx.url, count = forms.len(), "Testing forms");

        let mut results = Vec::new();
        for (index, probed) in forms.into_iter().enumerate() {
            let fields: Vec<FormField> = probed.into_iter().map(FormField::from).collect();
            if is_login_form(&fields) {
                debug!(url = %ctx.url, index, "Skipping login form");
                continue;
            }
            let selector = format!("form:nth-of-type({})", index + 1);

            let result = match self.submit_one(ctx, index, &fields).await {
                Ok((status, text)) => {
                    let verdict = classify_submission(&text, status, &self.settings);
                    FormResult {
                        selector,
                        outcome: verdict.outcome,
                        fields,
                        submit_status: status,
                        error_indicators: verdict.error_indicators,
                        error_message: verdict.error_message,
                    }
                }
                Err(e) => {
                    warn!(url = %ctx.url, index, error = %e, "Form test failed");
                    FormResult {
                        selector,
                        outcome: FormOutcome::Failed,
                        fields,
                        submit_status: None,
                        error_indicators: Vec::new(),
                        error_message: Some(e.to_string()),
                    }
                }
            };
            results.push(Finding::FormResult(result));
        }

        // Leave the page as later checkers expect it
        if !results.is_empty() {
            if let Err(e) = ctx.page.goto(ctx.url, self.page_timeout).await {
                warn!(url = %ctx.url, error = %e, "Failed to restore page after form tests");
            }
        }

        Ok(results)
    }
}
