use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use super::finding::{FindingCategory, Severity};

pub const NEW_ISSUE_STATUS: &str = "New";

/// An issue about to be persisted: all findings of one category for one page.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct NewIssue {
    pub project_id: Option<String>,
    pub site_id: String,
    pub run_id: String,
    pub page_id: String,
    pub url: String,
    pub category: FindingCategory,
    pub title: String,
    pub description: String,
    pub severity: Severity,
    pub screenshot_path: Option<String>,
    pub metadata: Option<serde_json::Value>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Issue {
    pub id: String,
    pub project_id: Option<String>,
    pub site_id: String,
    pub run_id: String,
    pub page_id: String,
    pub url: String,
    #[serde(rename = "type")]
    pub issue_type: String,
    pub title: String,
    pub description: String,
    pub severity: Severity,
    pub screenshot_path: Option<String>,
    pub status: String,
    pub metadata: Option<serde_json::Value>,
    pub created_at: DateTime<Utc>,
}
