use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Site {
    pub id: String,
    pub project_id: Option<String>,
    pub name: String,
    pub base_url: String,
    pub created_at: DateTime<Utc>,
}
