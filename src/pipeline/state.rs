use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;
use chrono::{DateTime, Utc};
use dashmap::DashMap;
use serde::Serialize;
use tokio_util::sync::CancellationToken;
use tracing::info;
use crate::db::Database;
use crate::errors::AuditError;
use crate::models::Run;

pub const STOPPED_BY_USER: &str = "Stopped by user";

/// In-process handle of a run that is currently executing.
#[derive(Debug)]
pub struct RunHandle {
    pub run_id: String,
    pub site_id: String,
    pub started_at: DateTime<Utc>,
    cancel_token: CancellationToken,
    pages_processed: AtomicU32,
    issues_created: AtomicU32,
}

impl RunHandle {
    pub fn new(run_id: &str, site_id: &str) -> Self {
        Self {
            run_id: run_id.to_string(),
            site_id: site_id.to_string(),
            started_at: Utc::now(),
            cancel_token: CancellationToken::new(),
            pages_processed: AtomicU32::new(0),
            issues_created: AtomicU32::new(0),
        }
    }

    pub fn cancel_token(&self) -> CancellationToken {
        self.cancel_token.clone()
    }

    pub fn cancel(&self) {
        self.cancel_token.cancel();
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancel_token.is_cancelled()
    }

    pub fn record_progress(&self, pages_processed: u32, issues_created: u32) {
        self.pages_processed.store(pages_processed, Ordering::Relaxed);
        self.issues_created.store(issues_created, Ordering::Relaxed);
    }

    pub fn snapshot(&self) -> RunSnapshot {
        RunSnapshot {
            run_id: self.run_id.clone(),
            site_id: self.site_id.clone(),
            started_at: self.started_at,
            pages_processed: self.pages_processed.load(Ordering::Relaxed),
            issues_created: self.issues_created.load(Ordering::Relaxed),
            cancelled: self.is_cancelled(),
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct RunSnapshot {
    pub run_id: String,
    pub site_id: String,
    pub started_at: DateTime<Utc>,
    pub pages_processed: u32,
    pub issues_created: u32,
    pub cancelled: bool,
}

/// Runs executing in this process, keyed by run id.
pub type ActiveRuns = Arc<DashMap<String, Arc<RunHandle>>>;

/// Totals of a finished run.
#[derive(Debug, Clone, Serialize)]
pub struct RunSummary {
    pub run_id: String,
    pub pages_processed: u32,
    pub issues_created: u32,
    pub failed_pages: u32,
    pub duration_ms: u64,
}

/// Stop a Pending or Running run.
///
/// The run is marked Failed right away. If it executes in this process its
/// token is cancelled; the page in flight finishes before the loop halts.
pub fn stop_run(db: &Database, active: &DashMap<String, Arc<RunHandle>>, run_id: &str) -> Result<Run, AuditError> {
    let run = db
        .get_run(run_id)?
        .ok_or_else(|| AuditError::NotFound(format!("Run {} not found", run_id)))?;
    if run.status.is_terminal() || !db.fail_run(run_id, STOPPED_BY_USER)? {
        return Err(AuditError::InvalidState("Run is not active".to_string()));
    }
    if let Some(handle) = active.get(run_id) {
        handle.cancel();
    }
    info!(run_id, "Run stopped by user");

    db.get_run(run_id)?
        .ok_or_else(|| AuditError::NotFound(format!("Run {} not found", run_id)))
}
