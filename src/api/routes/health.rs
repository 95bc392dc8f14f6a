use axum::{extract::State, Json};
use serde_json::{json, Value};
use crate::api::AppState;

/// Commit the binary was built from, if the build ran inside a git checkout.
pub const GIT_HASH: &str = match option_env!("SITEAUDIT_GIT_HASH") {
    Some(hash) => hash,
    None => "unknown",
};

pub const BUILT_AT: &str = env!("SITEAUDIT_BUILT_AT");

pub async fn health_check(State(state): State<AppState>) -> Json<Value> {
    Json(json!({
        "status": "healthy",
        "service": "siteaudit",
        "version": env!("CARGO_PKG_VERSION"),
        "git_hash": GIT_HASH,
        "built_at": BUILT_AT,
        "active_runs": state.active_runs.len(),
        "max_concurrent_runs": state.max_concurrent_runs,
    }))
}
