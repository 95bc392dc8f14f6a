#![allow(dead_code)]

use std::collections::{HashMap, HashSet};
use std::path::Path;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use async_trait::async_trait;
use image::{Rgba, RgbaImage};
use serde_json::Value;
use siteaudit::browser::{Browser, BrowserLauncher, PageHandle, PageOptions};
use siteaudit::config::{AuditSettings, BrowserSettings};
use siteaudit::errors::AuditError;
use siteaudit::models::JsError;

const LINK_EXTRACTION_PREFIX: &str = "Array.from(document.querySelectorAll('a[href]')).map(a => a.href)";

/// A fake site served by the scripted browser.
#[derive(Default)]
pub struct ScriptedSite {
    /// Anchor hrefs per page URL.
    pub links: HashMap<String, Vec<String>>,
    /// URLs whose navigation fails.
    pub broken: HashSet<String>,
    /// Canned `evaluate` results; the first entry whose needle occurs in the script wins.
    pub probes: Vec<(String, Value)>,
    pub js_errors: Vec<String>,
    /// Draw a black square into screenshots.
    pub altered_screenshots: AtomicBool,
    /// Zero-based `new_page` calls that fail.
    pub failing_opens: HashSet<usize>,
    /// URLs whose screenshot panics.
    pub panicking_screenshots: HashSet<String>,
}

impl ScriptedSite {
    pub fn with_links(mut self, url: &str, links: &[&str]) -> Self {
        self.links.insert(url.to_string(), links.iter().map(|l| l.to_string()).collect());
        self
    }

    pub fn with_broken(mut self, url: &str) -> Self {
        self.broken.insert(url.to_string());
        self
    }

    pub fn with_probe(mut self, needle: &str, value: Value) -> Self {
        self.probes.push((needle.to_string(), value));
        self
    }

    pub fn with_failing_open(mut self, call: usize) -> Self {
        self.failing_opens.insert(call);
        self
    }

    pub fn with_panicking_screenshot(mut self, url: &str) -> Self {
        self.panicking_screenshots.insert(url.to_string());
        self
    }

    pub fn with_js_errors(mut self, messages: &[&str]) -> Self {
        self.js_errors = messages.iter().map(|m| m.to_string()).collect();
        self
    }
}

#[derive(Default)]
pub struct BrowserLog {
    pub launched: AtomicUsize,
    pub attempted_opens: AtomicUsize,
    pub opened: AtomicUsize,
    pub closed: AtomicUsize,
    pub browser_closed: AtomicUsize,
    pub visits: Mutex<Vec<String>>,
}

impl BrowserLog {
    pub fn visits(&self) -> Vec<String> {
        self.visits.lock().unwrap().clone()
    }

    pub fn open_pages(&self) -> usize {
        self.opened.load(Ordering::SeqCst) - self.closed.load(Ordering::SeqCst)
    }
}

pub struct ScriptedLauncher {
    pub site: Arc<ScriptedSite>,
    pub log: Arc<BrowserLog>,
    pub fail_launch: bool,
    pub panic_on_launch: bool,
}

impl ScriptedLauncher {
    pub fn new(site: ScriptedSite) -> Self {
        Self {
            site: Arc::new(site),
            log: Arc::new(BrowserLog::default()),
            fail_launch: false,
            panic_on_launch: false,
        }
    }

    pub fn failing() -> Self {
        Self { fail_launch: true, ..Self::new(ScriptedSite::default()) }
    }

    pub fn panicking() -> Self {
        Self { panic_on_launch: true, ..Self::new(ScriptedSite::default()) }
    }
}

#[async_trait]
impl BrowserLauncher for ScriptedLauncher {
    async fn launch(&self, _settings: &BrowserSettings) -> Result<Arc<dyn Browser>, AuditError> {
        if self.panic_on_launch {
            panic!("browser bridge crashed");
        }
        if self.fail_launch {
            return Err(AuditError::Browser("Failed to launch browser: node not found".into()));
        }
        self.log.launched.fetch_add(1, Ordering::SeqCst);
        Ok(Arc::new(ScriptedBrowser { site: self.site.clone(), log: self.log.clone() }))
    }
}

pub struct ScriptedBrowser {
    site: Arc<ScriptedSite>,
    log: Arc<BrowserLog>,
}

#[async_trait]
impl Browser for ScriptedBrowser {
    async fn new_page(&self, _options: &PageOptions) -> Result<Box<dyn PageHandle>, AuditError> {
        let call = self.log.attempted_opens.fetch_add(1, Ordering::SeqCst);
        if self.site.failing_opens.contains(&call) {
            return Err(AuditError::Browser(format!("Target page, context or browser has been closed (open #{})", call)));
        }
        self.log.opened.fetch_add(1, Ordering::SeqCst);
        Ok(Box::new(ScriptedPage {
            site: self.site.clone(),
            log: self.log.clone(),
            current: Mutex::new(None),
        }))
    }

    async fn close(&self) -> Result<(), AuditError> {
        self.log.browser_closed.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}

pub struct ScriptedPage {
    site: Arc<ScriptedSite>,
    log: Arc<BrowserLog>,
    current: Mutex<Option<String>>,
}

#[async_trait]
impl PageHandle for ScriptedPage {
    async fn goto(&self, url: &str, _timeout: Duration) -> Result<Option<u16>, AuditError> {
        self.log.visits.lock().unwrap().push(url.to_string());
        if self.site.broken.contains(url) {
            return Err(AuditError::Navigation(format!("net::ERR_CONNECTION_REFUSED at {}", url)));
        }
        *self.current.lock().unwrap() = Some(url.to_string());
        Ok(Some(200))
    }

    async fn reload(&self, _timeout: Duration) -> Result<Option<u16>, AuditError> {
        Ok(Some(200))
    }

    async fn evaluate(&self, script: &str) -> Result<Value, AuditError> {
        if script.trim_start().starts_with(LINK_EXTRACTION_PREFIX) {
            let current = self.current.lock().unwrap().clone().unwrap_or_default();
            let links = self.site.links.get(&current).cloned().unwrap_or_default();
            return Ok(serde_json::json!(links));
        }
        Ok(self
            .site
            .probes
            .iter()
            .find(|(needle, _)| script.contains(needle.as_str()))
            .map(|(_, value)| value.clone())
            .unwrap_or(Value::Null))
    }

    async fn submit_form(&self, _form_selector: &str, _timeout: Duration) -> Result<Option<u16>, AuditError> {
        Ok(Some(200))
    }

    async fn screenshot(&self, path: &Path, _full_page: bool) -> Result<(), AuditError> {
        let current = self.current.lock().unwrap().clone().unwrap_or_default();
        if self.site.panicking_screenshots.contains(&current) {
            panic!("screenshot encoder crashed on {}", current);
        }
        let mut img = RgbaImage::from_pixel(100, 100, Rgba([255, 255, 255, 255]));
        if self.site.altered_screenshots.load(Ordering::SeqCst) {
            for x in 10..20 {
                for y in 10..20 {
                    img.put_pixel(x, y, Rgba([0, 0, 0, 255]));
                }
            }
        }
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        img.save(path)?;
        Ok(())
    }

    async fn capture_errors(&self, _window: Duration) -> Result<Vec<JsError>, AuditError> {
        Ok(self
            .site
            .js_errors
            .iter()
            .map(|message| JsError {
                message: message.clone(),
                source: None,
                line: None,
                column: None,
                stack: None,
                timestamp: chrono::Utc::now(),
            })
            .collect())
    }

    async fn close(&self) -> Result<(), AuditError> {
        self.log.closed.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}

/// Settings with no settle delays, no retries and output under `dir`.
pub fn test_settings(dir: &Path) -> AuditSettings {
    let mut settings = AuditSettings::default();
    settings.output.screenshot_dir = dir.to_path_buf();
    settings.browser.idle_settle = Duration::ZERO;
    settings.browser.retry_attempts = 0;
    settings.browser.js_error_window = Duration::ZERO;
    settings.crawl.sitemap_timeout = Duration::from_millis(500);
    settings
}
