use axum::{extract::State, http::StatusCode, Json};
use serde_json::{json, Value};
use crate::api::models::CreateSiteRequest;
use crate::api::AppState;
use crate::discovery::normalize_url;
use crate::errors::AuditError;

pub async fn create_site(
    State(state): State<AppState>,
    Json(req): Json<CreateSiteRequest>,
) -> Result<(StatusCode, Json<Value>), AuditError> {
    let base = normalize_url(&req.base_url)?;
    if !matches!(base.scheme(), "http" | "https") {
        return Err(AuditError::InvalidTarget(format!("Unsupported scheme: {}", base.scheme())));
    }
    let name = req.name.trim();
    if name.is_empty() {
        return Err(AuditError::InvalidTarget("Site name must not be empty".into()));
    }
    let site = state.db.create_site(name, base.as_str(), req.project_id.as_deref())?;
    Ok((StatusCode::CREATED, Json(json!(site))))
}

pub async fn list_sites(State(state): State<AppState>) -> Result<Json<Value>, AuditError> {
    let sites = state.db.list_sites()?;
    Ok(Json(json!({ "total": sites.len(), "sites": sites })))
}
