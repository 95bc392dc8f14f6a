use chrono::{DateTime, Utc};
use serde::ser::SerializeStruct;
use serde::{Deserialize, Serialize, Serializer};
use super::finding::{Finding, VisualDiffResult};

/// Where a baseline image came from. Figma baselines keep the frame
/// coordinates so they can be refreshed; the access token is never stored.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum BaselineSource {
    Screenshot,
    Manual,
    Figma {
        file_key: String,
        node_id: String,
        image_url: Option<String>,
    },
}

impl BaselineSource {
    pub fn type_name(&self) -> &'static str {
        match self {
            Self::Screenshot => "screenshot",
            Self::Manual => "manual",
            Self::Figma { .. } => "figma",
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VisualBaseline {
    pub id: String,
    pub site_id: String,
    pub page_url: String,
    pub source: BaselineSource,
    pub image_path: String,
    pub viewport_width: u32,
    pub viewport_height: u32,
    pub is_active: bool,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone)]
pub struct NewBaseline {
    pub site_id: String,
    pub page_url: String,
    pub source: BaselineSource,
    pub image_path: String,
    pub viewport_width: u32,
    pub viewport_height: u32,
}

/// Result of comparing one page screenshot against one baseline.
///
/// `passed` is derived from the percentage and threshold, never stored on its own.
#[derive(Debug, Clone, PartialEq)]
pub struct VisualDiff {
    pub id: String,
    pub run_id: String,
    pub page_id: String,
    pub baseline_id: String,
    pub current_screenshot_path: String,
    pub diff_screenshot_path: Option<String>,
    pub difference_percentage: f64,
    pub pixel_diff_count: u64,
    pub threshold_percentage: f64,
    pub created_at: DateTime<Utc>,
}

impl VisualDiff {
    pub fn passed(&self) -> bool {
        self.difference_percentage <= self.threshold_percentage
    }

    pub fn to_finding(&self) -> Finding {
        Finding::VisualDiff(VisualDiffResult {
            diff_id: self.id.clone(),
            baseline_id: self.baseline_id.clone(),
            difference_percentage: self.difference_percentage,
            pixel_diff_count: self.pixel_diff_count,
            passed: self.passed(),
            diff_image_path: self.diff_screenshot_path.clone(),
        })
    }
}

impl Serialize for VisualDiff {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut s = serializer.serialize_struct("VisualDiff", 11)?;
        s.serialize_field("id", &self.id)?;
        s.serialize_field("run_id", &self.run_id)?;
        s.serialize_field("page_id", &self.page_id)?;
        s.serialize_field("baseline_id", &self.baseline_id)?;
        s.serialize_field("current_screenshot_path", &self.current_screenshot_path)?;
        s.serialize_field("diff_screenshot_path", &self.diff_screenshot_path)?;
        s.serialize_field("difference_percentage", &self.difference_percentage)?;
        s.serialize_field("pixel_diff_count", &self.pixel_diff_count)?;
        s.serialize_field("threshold_percentage", &self.threshold_percentage)?;
        s.serialize_field("passed", &self.passed())?;
        s.serialize_field("created_at", &self.created_at)?;
        s.end()
    }
}
