use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    Json,
};
use serde::Deserialize;
use serde_json::{json, Value};
use crate::api::models::{CreateCustomRunRequest, CreateRunRequest, RunAccepted};
use crate::api::AppState;
use crate::errors::AuditError;
use crate::models::{RunStatus, Site};
use crate::pipeline;

#[derive(Deserialize)]
pub struct ListQuery {
    pub site_id: Option<String>,
    pub limit: Option<usize>,
    pub offset: Option<usize>,
}

fn find_site(state: &AppState, site_id: &str) -> Result<Site, AuditError> {
    state
        .db
        .get_site(site_id)?
        .ok_or_else(|| AuditError::NotFound(format!("Site {} not found", site_id)))
}

fn ensure_run(state: &AppState, run_id: &str) -> Result<(), AuditError> {
    match state.db.get_run(run_id)? {
        Some(_) => Ok(()),
        None => Err(AuditError::NotFound(format!("Run {} not found", run_id))),
    }
}

fn start(state: &AppState, site: Site, pages: Option<Vec<String>>) -> Result<(StatusCode, Json<RunAccepted>), AuditError> {
    let run = state.db.create_run(&site.id)?;
    if let Err(e) = state.spawn_run(&run.id, site, pages) {
        state.db.fail_run(&run.id, &e.to_string())?;
        return Err(e);
    }
    Ok((
        StatusCode::ACCEPTED,
        Json(RunAccepted { id: run.id, site_id: run.site_id, status: RunStatus::Pending.to_string() }),
    ))
}

pub async fn create_run(
    State(state): State<AppState>,
    Json(req): Json<CreateRunRequest>,
) -> Result<(StatusCode, Json<RunAccepted>), AuditError> {
    let site = find_site(&state, &req.site_id)?;
    start(&state, site, None)
}

pub async fn create_custom_run(
    State(state): State<AppState>,
    Json(req): Json<CreateCustomRunRequest>,
) -> Result<(StatusCode, Json<RunAccepted>), AuditError> {
    let site = find_site(&state, &req.site_id)?;
    // Reject an unusable list before a run record exists
    pipeline::resolve_custom_pages(&site.base_url, &req.pages, state.settings.crawl.max_pages)?;
    start(&state, site, Some(req.pages))
}

pub async fn list_runs(
    State(state): State<AppState>,
    Query(query): Query<ListQuery>,
) -> Result<Json<Value>, AuditError> {
    let limit = query.limit.unwrap_or(20).min(100);
    let offset = query.offset.unwrap_or(0);
    let runs = state.db.list_runs(query.site_id.as_deref(), limit, offset)?;
    Ok(Json(json!({ "total": runs.len(), "runs": runs })))
}

pub async fn get_run(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<Value>, AuditError> {
    let run = state
        .db
        .get_run(&id)?
        .ok_or_else(|| AuditError::NotFound(format!("Run {} not found", id)))?;
    let live = state.active_runs.get(&id).map(|handle| handle.snapshot());
    let mut body = json!(run);
    body["live"] = json!(live);
    Ok(Json(body))
}

pub async fn get_issues(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<Value>, AuditError> {
    ensure_run(&state, &id)?;
    let issues = state.db.list_issues_for_run(&id)?;
    let by_severity: serde_json::Map<String, Value> = state
        .db
        .issue_severity_counts(&id)?
        .into_iter()
        .map(|(severity, count)| (severity, json!(count)))
        .collect();
    Ok(Json(json!({ "total": issues.len(), "by_severity": by_severity, "issues": issues })))
}

pub async fn get_diffs(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<Value>, AuditError> {
    ensure_run(&state, &id)?;
    let diffs = state.db.list_diffs_for_run(&id)?;
    let failed = diffs.iter().filter(|d| !d.passed()).count();
    Ok(Json(json!({ "total": diffs.len(), "failed": failed, "diffs": diffs })))
}

pub async fn stop_run(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<Value>, AuditError> {
    let run = pipeline::stop_run(&state.db, &state.active_runs, &id)?;
    Ok(Json(json!({ "stopped": true, "run": run })))
}
