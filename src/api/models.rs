use serde::{Deserialize, Serialize};

#[derive(Deserialize)]
pub struct CreateSiteRequest {
    pub name: String,
    pub base_url: String,
    pub project_id: Option<String>,
}

#[derive(Deserialize)]
pub struct CreateRunRequest {
    pub site_id: String,
}

#[derive(Deserialize)]
pub struct CreateCustomRunRequest {
    pub site_id: String,
    pub pages: Vec<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BaselineKind {
    Screenshot,
    Manual,
    Figma,
}

#[derive(Deserialize)]
pub struct CreateBaselineRequest {
    pub site_id: String,
    pub page_url: String,
    #[serde(rename = "type")]
    pub kind: BaselineKind,
    pub image_path: Option<String>,
    pub file_key: Option<String>,
    pub node_id: Option<String>,
    /// Used for the download only; falls back to the configured token.
    pub access_token: Option<String>,
    pub viewport_width: Option<u32>,
    pub viewport_height: Option<u32>,
}

#[derive(Serialize)]
pub struct RunAccepted {
    pub id: String,
    pub site_id: String,
    pub status: String,
}
