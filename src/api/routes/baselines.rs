use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    Json,
};
use serde::Deserialize;
use serde_json::{json, Value};
use crate::api::models::{BaselineKind, CreateBaselineRequest};
use crate::api::AppState;
use crate::config::Viewport;
use crate::errors::AuditError;
use crate::visual::{BaselineRequest, CreateBaseline, VisualRegressionEngine};

#[derive(Deserialize)]
pub struct BaselineQuery {
    #[serde(default)]
    pub include_inactive: bool,
}

fn engine(state: &AppState) -> VisualRegressionEngine {
    VisualRegressionEngine::new(state.db.clone(), state.settings.clone(), state.http.clone())
}

fn required(value: Option<String>, field: &str) -> Result<String, AuditError> {
    value
        .filter(|v| !v.trim().is_empty())
        .ok_or_else(|| AuditError::InvalidTarget(format!("Field '{}' is required", field)))
}

pub async fn create_baseline(
    State(state): State<AppState>,
    Json(req): Json<CreateBaselineRequest>,
) -> Result<(StatusCode, Json<Value>), AuditError> {
    if state.db.get_site(&req.site_id)?.is_none() {
        return Err(AuditError::NotFound(format!("Site {} not found", req.site_id)));
    }
    let request = match req.kind {
        BaselineKind::Screenshot => BaselineRequest::Screenshot { image_path: required(req.image_path, "image_path")? },
        BaselineKind::Manual => BaselineRequest::Manual { image_path: required(req.image_path, "image_path")? },
        BaselineKind::Figma => BaselineRequest::Figma {
            file_key: required(req.file_key, "file_key")?,
            node_id: required(req.node_id, "node_id")?,
            access_token: required(
                req.access_token.or_else(|| state.settings.figma.access_token.clone()),
                "access_token",
            )?,
        },
    };
    let default = state.settings.browser.viewport;
    let baseline = engine(&state)
        .create_baseline(CreateBaseline {
            site_id: req.site_id,
            page_url: req.page_url,
            viewport: Viewport::new(
                req.viewport_width.unwrap_or(default.width),
                req.viewport_height.unwrap_or(default.height),
            ),
            request,
        })
        .await?;
    Ok((StatusCode::CREATED, Json(json!(baseline))))
}

pub async fn list_baselines(
    State(state): State<AppState>,
    Path(site_id): Path<String>,
    Query(query): Query<BaselineQuery>,
) -> Result<Json<Value>, AuditError> {
    let baselines = engine(&state).baselines_for_site(&site_id, query.include_inactive)?;
    Ok(Json(json!({ "total": baselines.len(), "baselines": baselines })))
}

pub async fn deactivate_baseline(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<Value>, AuditError> {
    let baseline = engine(&state).deactivate_baseline(&id)?;
    Ok(Json(json!(baseline)))
}
