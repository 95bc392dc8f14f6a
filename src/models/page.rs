use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// One audited URL within a run.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Page {
    pub id: String,
    pub run_id: String,
    pub url: String,
    pub status_code: Option<u16>,
    pub screenshot_path: Option<String>,
    pub load_time_ms: Option<u64>,
    pub render_failed: bool,
    pub render_error: Option<String>,
    pub depth: u32,
    pub created_at: DateTime<Utc>,
}

/// Fields for a page record at creation time.
#[derive(Debug, Clone, Default)]
pub struct NewPage {
    pub run_id: String,
    pub url: String,
    pub status_code: Option<u16>,
    pub screenshot_path: Option<String>,
    pub load_time_ms: Option<u64>,
    pub render_failed: bool,
    pub render_error: Option<String>,
    pub depth: u32,
}
