use std::time::Duration;
use crate::config::AuditSettings;
use crate::errors::AuditError;

/// Shared outbound client for sitemap fetches, link checks and Figma downloads.
/// Non-2xx statuses are returned, never raised.
pub fn build_client(settings: &AuditSettings) -> Result<reqwest::Client, AuditError> {
    reqwest::Client::builder()
        .redirect(reqwest::redirect::Policy::limited(settings.links.max_redirects))
        .connect_timeout(Duration::from_secs(10))
        .user_agent(concat!("siteaudit/", env!("CARGO_PKG_VERSION")))
        .build()
        .map_err(|e| AuditError::Internal(format!("Failed to build HTTP client: {}", e)))
}
