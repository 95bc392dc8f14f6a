use serde::{Deserialize, Serialize};

/// On-disk YAML configuration. Every section is optional; missing values
/// fall back to the defaults in [`super::settings`].
#[derive(Debug, Clone, Deserialize, Serialize, Default)]
pub struct AuditConfig {
    pub crawl: Option<CrawlConfig>,
    pub browser: Option<BrowserConfig>,
    pub forms: Option<FormsConfig>,
    pub links: Option<LinksConfig>,
    pub visual: Option<VisualConfig>,
    pub output: Option<OutputConfig>,
    pub figma: Option<FigmaConfig>,
}

#[derive(Debug, Clone, Deserialize, Serialize, Default)]
pub struct CrawlConfig {
    pub max_depth: Option<u32>,
    pub max_pages: Option<usize>,
    pub excluded_patterns: Option<Vec<String>>,
    pub sitemap_timeout_secs: Option<u64>,
    pub navigation_timeout_ms: Option<u64>,
}

#[derive(Debug, Clone, Deserialize, Serialize, Default)]
pub struct BrowserConfig {
    pub viewport_width: Option<u32>,
    pub viewport_height: Option<u32>,
    pub page_timeout_ms: Option<u64>,
    pub idle_settle_ms: Option<u64>,
    pub retry_attempts: Option<u32>,
    pub node_binary: Option<String>,
    pub headless: Option<bool>,
    pub js_error_window_ms: Option<u64>,
}

#[derive(Debug, Clone, Deserialize, Serialize, Default)]
pub struct FormsConfig {
    pub success_keywords: Option<Vec<String>>,
    pub error_keywords: Option<Vec<String>>,
    pub submit_timeout_ms: Option<u64>,
    pub test_data: Option<TestDataConfig>,
}

#[derive(Debug, Clone, Deserialize, Serialize, Default)]
pub struct TestDataConfig {
    pub email: Option<String>,
    pub name: Option<String>,
    pub first_name: Option<String>,
    pub last_name: Option<String>,
    pub message: Option<String>,
    pub phone: Option<String>,
    pub company: Option<String>,
    pub text: Option<String>,
}

#[derive(Debug, Clone, Deserialize, Serialize, Default)]
pub struct LinksConfig {
    pub timeout_secs: Option<u64>,
    pub max_redirects: Option<usize>,
    pub concurrency: Option<usize>,
}

#[derive(Debug, Clone, Deserialize, Serialize, Default)]
pub struct VisualConfig {
    pub diff_threshold_percentage: Option<f64>,
    pub pixel_threshold: Option<f64>,
    pub auto_baseline: Option<bool>,
}

#[derive(Debug, Clone, Deserialize, Serialize, Default)]
pub struct OutputConfig {
    pub screenshot_dir: Option<String>,
    pub database: Option<String>,
}

#[derive(Debug, Clone, Deserialize, Serialize, Default)]
pub struct FigmaConfig {
    /// Literal token or `$ENV_VAR` reference.
    pub access_token: Option<String>,
    pub api_base: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_audit_config_default() {
        let config = AuditConfig::default();
        assert!(config.crawl.is_none());
        assert!(config.visual.is_none());
        assert!(config.figma.is_none());
    }

    #[test]
    fn test_partial_yaml_deserializes() {
        let yaml = "crawl:\n  max_pages: 10\nvisual:\n  auto_baseline: false\n";
        let config: AuditConfig = serde_yaml::from_str(yaml).unwrap();
        assert_eq!(config.crawl.unwrap().max_pages, Some(10));
        assert_eq!(config.visual.unwrap().auto_baseline, Some(false));
        assert!(config.browser.is_none());
    }

    #[test]
    fn test_test_data_fields() {
        let yaml = "forms:\n  test_data:\n    phone: '555-0199'\n";
        let config: AuditConfig = serde_yaml::from_str(yaml).unwrap();
        let data = config.forms.unwrap().test_data.unwrap();
        assert_eq!(data.phone.as_deref(), Some("555-0199"));
        assert!(data.email.is_none());
    }
}
