//! Per-page checkers and the pipeline that runs them in isolation.

pub mod accessibility;
pub mod forms;
pub mod js_errors;
pub mod links;
pub mod mobile;
pub mod performance;
pub mod seo;
pub mod visual;

use std::panic::AssertUnwindSafe;
use std::path::Path;
use async_trait::async_trait;
use futures::FutureExt;
use serde::de::DeserializeOwned;
use tracing::{debug, warn};
use crate::browser::{Browser, PageHandle};
use crate::config::AuditSettings;
use crate::errors::AuditError;
use crate::models::{Finding, FindingCategory};

pub use accessibility::AccessibilityChecker;
pub use forms::FormChecker;
pub use js_errors::JsErrorChecker;
pub use links::BrokenLinkChecker;
pub use mobile::MobileChecker;
pub use performance::PerformanceChecker;
pub use seo::SeoChecker;
pub use visual::VisualAnomalyChecker;

/// What a checker can see of the page under audit.
pub struct CheckContext<'a> {
    /// The already-navigated page.
    pub page: &'a dyn PageHandle,
    /// The run's browser, for checkers that need their own page contexts.
    pub browser: &'a dyn Browser,
    pub url: &'a str,
    /// Directory where checker artifacts (screenshots) are written.
    pub run_dir: &'a Path,
}

#[async_trait]
pub trait Checker: Send + Sync {
    fn name(&self) -> &'static str;

    fn category(&self) -> FindingCategory;

    async fn check(&self, ctx: &CheckContext<'_>) -> Result<Vec<Finding>, AuditError>;
}

/// Evaluate a probe script and decode its JSON result.
pub(crate) async fn probe<T: DeserializeOwned>(page: &dyn PageHandle, script: &str) -> Result<T, AuditError> {
    let value = page.evaluate(script).await?;
    serde_json::from_value(value)
        .map_err(|e| AuditError::Browser(format!("Unexpected probe result: {}", e)))
}

/// Runs the registered checkers in order against one loaded page.
pub struct PageAuditPipeline {
    checkers: Vec<Box<dyn Checker>>,
}

impl PageAuditPipeline {
    pub fn new(checkers: Vec<Box<dyn Checker>>) -> Self {
        Self { checkers }
    }

    /// The full checker set in reporting order.
    pub fn standard(settings: &AuditSettings, http: reqwest::Client) -> Self {
        Self::new(vec![
            Box::new(VisualAnomalyChecker::new(settings.browser.viewport)),
            Box::new(FormChecker::new(settings.forms.clone(), settings.browser.page_timeout, settings.browser.idle_settle)),
            Box::new(BrokenLinkChecker::new(settings.links.clone(), http)),
            Box::new(AccessibilityChecker),
            Box::new(PerformanceChecker),
            Box::new(SeoChecker),
            Box::new(MobileChecker::new(settings.browser.page_timeout)),
            Box::new(JsErrorChecker::new(settings.browser.js_error_window)),
        ])
    }

    pub fn checker_names(&self) -> Vec<&'static str> {
        self.checkers.iter().map(|c| c.name()).collect()
    }

    /// Run every checker. A checker that errors or panics contributes no
    /// findings; the others still run.
    pub async fn audit(&self, ctx: &CheckContext<'_>) -> Vec<Finding> {
        let mut findings = Vec::new();
        for checker in &self.checkers {
            let outcome = AssertUnwindSafe(checker.check(ctx)).catch_unwind().await;
            match outcome {
                Ok(Ok(found)) => {
                    debug!(checker = checker.name(), url = %ctx.url, count = found.len(), "Checker finished");
                    findings.extend(found);
                }
                Ok(Err(e)) => {
                    warn!(checker = checker.name(), url = %ctx.url, error = %e, "Checker failed");
                }
                Err(_) => {
                    warn!(checker = checker.name(), url = %ctx.url, "Checker panicked");
                }
            }
        }
        findings
    }
}
