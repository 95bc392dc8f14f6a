//! HTTP API for creating sites, starting and stopping runs, and reading results.

pub mod errors;
pub mod models;
pub mod routes;

use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use axum::routing::{get, post};
use axum::Router;
use dashmap::DashMap;
use futures::FutureExt;
use tokio::sync::Semaphore;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;
use tracing::{error, info, warn};
use crate::browser::BrowserLauncher;
use crate::config::AuditSettings;
use crate::db::Database;
use crate::errors::AuditError;
use crate::models::Site;
use crate::pipeline::{panic_message, ActiveRuns, RunHandle, RunOrchestrator};

/// Internal-error text recorded on a run whose task panicked.
pub const RUN_TASK_PANICKED: &str = "Internal error: run task panicked";

#[derive(Clone)]
pub struct AppState {
    pub db: Database,
    pub settings: Arc<AuditSettings>,
    pub launcher: Arc<dyn BrowserLauncher>,
    pub http: reqwest::Client,
    pub active_runs: ActiveRuns,
    pub max_concurrent_runs: usize,
    run_slots: Arc<Semaphore>,
}

/// Drops the run's entry from the active map however its task ends.
struct ActiveRunGuard {
    active: ActiveRuns,
    run_id: String,
}

impl Drop for ActiveRunGuard {
    fn drop(&mut self) {
        self.active.remove(&self.run_id);
    }
}

impl AppState {
    pub fn new(
        db: Database,
        settings: Arc<AuditSettings>,
        launcher: Arc<dyn BrowserLauncher>,
        http: reqwest::Client,
        max_concurrent_runs: usize,
    ) -> Self {
        let max_concurrent_runs = max_concurrent_runs.max(1);
        Self {
            db,
            settings,
            launcher,
            http,
            active_runs: Arc::new(DashMap::new()),
            max_concurrent_runs,
            run_slots: Arc::new(Semaphore::new(max_concurrent_runs)),
        }
    }

    /// Start a run in the background and track it until it finishes.
    ///
    /// A slot is reserved before anything is spawned and released when the
    /// task ends, even by panic. A panicking run is marked Failed.
    pub fn spawn_run(&self, run_id: &str, site: Site, pages: Option<Vec<String>>) -> Result<(), AuditError> {
        let permit = self.run_slots.clone().try_acquire_owned().map_err(|_| {
            AuditError::InvalidState(format!("Maximum of {} concurrent runs reached", self.max_concurrent_runs))
        })?;
        let handle = Arc::new(RunHandle::new(run_id, &site.id));
        self.active_runs.insert(run_id.to_string(), handle.clone());
        let guard = ActiveRunGuard { active: self.active_runs.clone(), run_id: run_id.to_string() };

        let orchestrator = RunOrchestrator::new(
            self.settings.clone(),
            self.db.clone(),
            self.launcher.clone(),
            self.http.clone(),
        )
        .with_handle(handle);
        let db = self.db.clone();
        let run_id = run_id.to_string();

        tokio::spawn(async move {
            let _permit = permit;
            let _guard = guard;
            let run = async {
                match pages {
                    Some(pages) => orchestrator.execute_custom_run(&run_id, &site, &pages).await,
                    None => orchestrator.execute_run(&run_id, &site).await,
                }
            };
            match AssertUnwindSafe(run).catch_unwind().await {
                Ok(Ok(_)) => {}
                Ok(Err(e)) => warn!(run_id = %run_id, error = %e, "Background run ended with an error"),
                Err(panic) => {
                    error!(run_id = %run_id, panic = %panic_message(&*panic), "Run task panicked");
                    if let Err(e) = db.fail_run(&run_id, RUN_TASK_PANICKED) {
                        error!(run_id = %run_id, error = %e, "Failed to record run failure");
                    }
                }
            }
        });
        info!(active_runs = self.active_runs.len(), "Run dispatched");
        Ok(())
    }
}

pub fn create_app_state(
    settings: AuditSettings,
    launcher: Arc<dyn BrowserLauncher>,
    max_concurrent_runs: usize,
) -> Result<AppState, AuditError> {
    let db = Database::new(&settings.output.database)?;
    let http = crate::http::build_client(&settings)?;
    Ok(AppState::new(db, Arc::new(settings), launcher, http, max_concurrent_runs))
}

pub fn build_router(state: AppState) -> Router {
    Router::new()
        .route("/api/health", get(routes::health::health_check))
        .route("/api/sites", post(routes::sites::create_site).get(routes::sites::list_sites))
        .route("/api/sites/:id/baselines", get(routes::baselines::list_baselines))
        .route("/api/runs", post(routes::runs::create_run).get(routes::runs::list_runs))
        .route("/api/runs/custom", post(routes::runs::create_custom_run))
        .route("/api/runs/:id", get(routes::runs::get_run))
        .route("/api/runs/:id/issues", get(routes::runs::get_issues))
        .route("/api/runs/:id/diffs", get(routes::runs::get_diffs))
        .route("/api/runs/:id/stop", post(routes::runs::stop_run))
        .route("/api/baselines", post(routes::baselines::create_baseline))
        .route("/api/baselines/:id/deactivate", post(routes::baselines::deactivate_baseline))
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
        .with_state(state)
}
