use std::path::PathBuf;
use std::time::Duration;
use serde::{Deserialize, Serialize};
use super::credentials::resolve_credential;
use super::types::AuditConfig;

pub const DEFAULT_MAX_DEPTH: u32 = 2;
pub const DEFAULT_MAX_PAGES: usize = 30;
pub const DEFAULT_VIEWPORT_WIDTH: u32 = 1440;
pub const DEFAULT_VIEWPORT_HEIGHT: u32 = 900;
pub const DEFAULT_PAGE_TIMEOUT_MS: u64 = 30_000;
pub const DEFAULT_CRAWL_TIMEOUT_MS: u64 = 15_000;
pub const DEFAULT_IDLE_SETTLE_MS: u64 = 2_000;
pub const DEFAULT_RETRY_ATTEMPTS: u32 = 1;
pub const DEFAULT_DIFF_THRESHOLD: f64 = 0.1;
pub const DEFAULT_PIXEL_THRESHOLD: f64 = 0.1;

pub const EXCLUDED_PATTERNS: &[&str] = &[
    "/wp-admin",
    "/login",
    "/account",
    "/cart",
    "/checkout",
    "/admin",
    "/signin",
    "/signup",
    "/register",
];

pub const SUCCESS_KEYWORDS: &[&str] = &["thank", "received", "success", "submitted", "confirmation"];
pub const ERROR_KEYWORDS: &[&str] = &["error", "invalid", "failed", "required", "missing"];

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Viewport {
    pub width: u32,
    pub height: u32,
}

impl Viewport {
    pub fn new(width: u32, height: u32) -> Self {
        Self { width, height }
    }
}

impl std::fmt::Display for Viewport {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}x{}", self.width, self.height)
    }
}

#[derive(Debug, Clone)]
pub struct CrawlSettings {
    pub max_depth: u32,
    pub max_pages: usize,
    pub excluded_patterns: Vec<String>,
    pub sitemap_timeout: Duration,
    pub navigation_timeout: Duration,
}

#[derive(Debug, Clone)]
pub struct BrowserSettings {
    pub viewport: Viewport,
    pub page_timeout: Duration,
    pub idle_settle: Duration,
    pub retry_attempts: u32,
    pub node_binary: String,
    pub headless: bool,
    pub js_error_window: Duration,
}

/// Synthetic values typed into forms under test.
#[derive(Debug, Clone, PartialEq)]
pub struct TestData {
    pub email: String,
    pub name: String,
    pub first_name: String,
    pub last_name: String,
    pub message: String,
    pub phone: String,
    pub company: String,
    pub text: String,
}

impl Default for TestData {
    fn default() -> Self {
        Self {
            email: format!("qa+{}@example.com", chrono::Utc::now().timestamp_millis()),
            name: "QA Test User".to_string(),
            first_name: "QA".to_string(),
            last_name: "Test".to_string(),
            message: "Test message from automated QA system".to_string(),
            phone: "555-0100".to_string(),
            company: "QA Test Company".to_string(),
            text: "Test input".to_string(),
        }
    }
}

#[derive(Debug, Clone)]
pub struct FormSettings {
    pub success_keywords: Vec<String>,
    pub error_keywords: Vec<String>,
    pub submit_timeout: Duration,
    pub test_data: TestData,
}

#[derive(Debug, Clone)]
pub struct LinkSettings {
    pub timeout: Duration,
    pub max_redirects: usize,
    pub concurrency: usize,
}

#[derive(Debug, Clone)]
pub struct VisualSettings {
    /// Page-level pass threshold, in percent of differing pixels.
    pub diff_threshold_percentage: f64,
    /// Per-pixel perceptual color distance threshold in `0.0..=1.0`.
    pub pixel_threshold: f64,
    pub auto_baseline: bool,
}

#[derive(Debug, Clone)]
pub struct OutputSettings {
    pub screenshot_dir: PathBuf,
    pub database: String,
}

#[derive(Debug, Clone)]
pub struct FigmaSettings {
    pub access_token: Option<String>,
    pub api_base: String,
}

/// Fully-resolved configuration injected into every pipeline component.
#[derive(Debug, Clone)]
pub struct AuditSettings {
    pub crawl: CrawlSettings,
    pub browser: BrowserSettings,
    pub forms: FormSettings,
    pub links: LinkSettings,
    pub visual: VisualSettings,
    pub output: OutputSettings,
    pub figma: FigmaSettings,
}

impl Default for AuditSettings {
    fn default() -> Self {
        Self::from_config(&AuditConfig::default())
    }
}

fn strings(values: &[&str]) -> Vec<String> {
    values.iter().map(|s| s.to_string()).collect()
}

impl AuditSettings {
    pub fn from_config(config: &AuditConfig) -> Self {
        let crawl = config.crawl.clone().unwrap_or_default();
        let browser = config.browser.clone().unwrap_or_default();
        let forms = config.forms.clone().unwrap_or_default();
        let links = config.links.clone().unwrap_or_default();
        let visual = config.visual.clone().unwrap_or_default();
        let output = config.output.clone().unwrap_or_default();
        let figma = config.figma.clone().unwrap_or_default();

        let defaults = TestData::default();
        let data = forms.test_data.unwrap_or_default();

        Self {
            crawl: CrawlSettings {
                max_depth: crawl.max_depth.unwrap_or(DEFAULT_MAX_DEPTH),
                max_pages: crawl.max_pages.unwrap_or(DEFAULT_MAX_PAGES),
                excluded_patterns: crawl.excluded_patterns.unwrap_or_else(|| strings(EXCLUDED_PATTERNS)),
                sitemap_timeout: Duration::from_secs(crawl.sitemap_timeout_secs.unwrap_or(10)),
                navigation_timeout: Duration::from_millis(
                    crawl.navigation_timeout_ms.unwrap_or(DEFAULT_CRAWL_TIMEOUT_MS),
                ),
            },
            browser: BrowserSettings {
                viewport: Viewport::new(
                    browser.viewport_width.unwrap_or(DEFAULT_VIEWPORT_WIDTH),
                    browser.viewport_height.unwrap_or(DEFAULT_VIEWPORT_HEIGHT),
                ),
                page_timeout: Duration::from_millis(browser.page_timeout_ms.unwrap_or(DEFAULT_PAGE_TIMEOUT_MS)),
                idle_settle: Duration::from_millis(browser.idle_settle_ms.unwrap_or(DEFAULT_IDLE_SETTLE_MS)),
                retry_attempts: browser.retry_attempts.unwrap_or(DEFAULT_RETRY_ATTEMPTS),
                node_binary: browser.node_binary.unwrap_or_else(|| "node".to_string()),
                headless: browser.headless.unwrap_or(true),
                js_error_window: Duration::from_millis(browser.js_error_window_ms.unwrap_or(2_000)),
            },
            forms: FormSettings {
                success_keywords: forms.success_keywords.unwrap_or_else(|| strings(SUCCESS_KEYWORDS)),
                error_keywords: forms.error_keywords.unwrap_or_else(|| strings(ERROR_KEYWORDS)),
                submit_timeout: Duration::from_millis(forms.submit_timeout_ms.unwrap_or(10_000)),
                test_data: TestData {
                    email: data.email.unwrap_or(defaults.email),
                    name: data.name.unwrap_or(defaults.name),
                    first_name: data.first_name.unwrap_or(defaults.first_name),
                    last_name: data.last_name.unwrap_or(defaults.last_name),
                    message: data.message.unwrap_or(defaults.message),
                    phone: data.phone.unwrap_or(defaults.phone),
                    company: data.company.unwrap_or(defaults.company),
                    text: data.text.unwrap_or(defaults.text),
                },
            },
            links: LinkSettings {
                timeout: Duration::from_secs(links.timeout_secs.unwrap_or(5)),
                max_redirects: links.max_redirects.unwrap_or(5),
                concurrency: links.concurrency.unwrap_or(5).max(1),
            },
            visual: VisualSettings {
                diff_threshold_percentage: visual.diff_threshold_percentage.unwrap_or(DEFAULT_DIFF_THRESHOLD),
                pixel_threshold: visual.pixel_threshold.unwrap_or(DEFAULT_PIXEL_THRESHOLD),
                auto_baseline: visual.auto_baseline.unwrap_or(true),
            },
            output: OutputSettings {
                screenshot_dir: PathBuf::from(output.screenshot_dir.unwrap_or_else(|| "./screenshots".to_string())),
                database: output.database.unwrap_or_else(|| "./data/siteaudit.db".to_string()),
            },
            figma: FigmaSettings {
                access_token: figma.access_token.map(|t| resolve_credential(&t)).filter(|t| !t.is_empty()),
                api_base: figma.api_base.unwrap_or_else(|| "https://api.figma.com".to_string()),
            },
        }
    }

    /// Screenshots of one run live under `<screenshot_dir>/<run_id>`.
    pub fn run_dir(&self, run_id: &str) -> PathBuf {
        self.output.screenshot_dir.join(run_id)
    }

    pub fn diff_dir(&self, run_id: &str) -> PathBuf {
        self.run_dir(run_id).join("diffs")
    }

    pub fn figma_dir(&self) -> PathBuf {
        self.output.screenshot_dir.join("figma-baselines")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::types::{CrawlConfig, VisualConfig};

    #[test]
    fn test_defaults_match_reference_constants() {
        let settings = AuditSettings::default();
        assert_eq!(settings.crawl.max_depth, 2);
        assert_eq!(settings.crawl.max_pages, 30);
        assert_eq!(settings.browser.viewport, Viewport::new(1440, 900));
        assert_eq!(settings.browser.page_timeout, Duration::from_secs(30));
        assert_eq!(settings.browser.idle_settle, Duration::from_secs(2));
        assert_eq!(settings.visual.diff_threshold_percentage, 0.1);
        assert!(settings.visual.auto_baseline);
        assert!(settings.crawl.excluded_patterns.contains(&"/login".to_string()));
        assert!(settings.forms.test_data.email.starts_with("qa+"));
    }

    #[test]
    fn test_file_values_override_defaults() {
        let config = AuditConfig {
            crawl: Some(CrawlConfig { max_pages: Some(5), ..Default::default() }),
            visual: Some(VisualConfig { diff_threshold_percentage: Some(2.5), ..Default::default() }),
            ..Default::default()
        };
        let settings = AuditSettings::from_config(&config);
        assert_eq!(settings.crawl.max_pages, 5);
        assert_eq!(settings.crawl.max_depth, 2);
        assert_eq!(settings.visual.diff_threshold_percentage, 2.5);
    }

    #[test]
    fn test_run_directories() {
        let settings = AuditSettings::default();
        assert!(settings.run_dir("r1").ends_with("screenshots/r1"));
        assert!(settings.diff_dir("r1").ends_with("r1/diffs"));
    }

    #[test]
    fn test_viewport_display() {
        assert_eq!(Viewport::new(375, 667).to_string(), "375x667");
    }
}
