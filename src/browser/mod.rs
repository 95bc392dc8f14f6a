//! Browser automation capability consumed by discovery, the checkers and the
//! run orchestrator.
//!
//! A [`BrowserLauncher`] produces one [`Browser`] per run. Each audited URL gets
//! its own [`PageHandle`], which callers close explicitly on every exit path.

pub mod playwright;

use std::path::Path;
use std::sync::Arc;
use std::time::Duration;
use async_trait::async_trait;
use crate::config::{BrowserSettings, Viewport};
use crate::errors::AuditError;
use crate::models::JsError;

pub use playwright::PlaywrightLauncher;

/// User agent used for the mobile viewport checks.
pub const MOBILE_USER_AGENT: &str = "Mozilla/5.0 (iPhone; CPU iPhone OS 14_7_1 like Mac OS X) \
     AppleWebKit/605.1.15 (KHTML, like Gecko) Version/14.1.2 Mobile/15E148 Safari/604.1";

#[derive(Debug, Clone, PartialEq)]
pub struct PageOptions {
    pub viewport: Viewport,
    pub user_agent: Option<String>,
}

impl PageOptions {
    pub fn desktop(viewport: Viewport) -> Self {
        Self { viewport, user_agent: None }
    }

    pub fn mobile(viewport: Viewport) -> Self {
        Self { viewport, user_agent: Some(MOBILE_USER_AGENT.to_string()) }
    }
}

#[async_trait]
pub trait BrowserLauncher: Send + Sync {
    async fn launch(&self, settings: &BrowserSettings) -> Result<Arc<dyn Browser>, AuditError>;
}

#[async_trait]
pub trait Browser: Send + Sync {
    /// Open an isolated page context.
    async fn new_page(&self, options: &PageOptions) -> Result<Box<dyn PageHandle>, AuditError>;

    async fn close(&self) -> Result<(), AuditError>;
}

#[async_trait]
pub trait PageHandle: Send + Sync {
    /// Navigate and wait for network idle. Returns the main response status, if any.
    async fn goto(&self, url: &str, timeout: Duration) -> Result<Option<u16>, AuditError>;

    async fn reload(&self, timeout: Duration) -> Result<Option<u16>, AuditError>;

    /// Evaluate a JavaScript expression in the page and return its JSON value.
    async fn evaluate(&self, script: &str) -> Result<serde_json::Value, AuditError>;

    /// Submit the form matching `form_selector` through its submit control (or
    /// `form.submit()`), then wait up to `timeout` for the resulting POST/PUT
    /// response. Returns that response's status when one was observed.
    async fn submit_form(&self, form_selector: &str, timeout: Duration) -> Result<Option<u16>, AuditError>;

    async fn screenshot(&self, path: &Path, full_page: bool) -> Result<(), AuditError>;

    /// Register console/page error listeners, wait `window`, collect what was
    /// raised and deregister before returning.
    async fn capture_errors(&self, window: Duration) -> Result<Vec<JsError>, AuditError>;

    async fn close(&self) -> Result<(), AuditError>;
}
