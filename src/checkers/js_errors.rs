use std::time::Duration;
use async_trait::async_trait;
use crate::errors::AuditError;
use crate::models::{Finding, FindingCategory};
use super::{CheckContext, Checker};

/// Collects console errors, uncaught exceptions and unhandled rejections
/// raised during a fixed window after load.
pub struct JsErrorChecker {
    window: Duration,
}

impl JsErrorChecker {
    pub fn new(window: Duration) -> Self {
        Self { window }
    }
}

#[async_trait]
impl Checker for JsErrorChecker {
    fn name(&self) -> &'static str {
        "js_errors"
    }

    fn category(&self) -> FindingCategory {
        FindingCategory::JavaScriptError
    }

    async fn check(&self, ctx: &CheckContext<'_>) -> Result<Vec<Finding>, AuditError> {
        let errors = ctx.page.capture_errors(self.window).await?;
        Ok(errors.into_iter().map(Finding::JsError).collect())
    }
}
