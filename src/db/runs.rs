use crate::errors::AuditError;
use crate::models::{Run, RunStatus};
use super::connection::{db_err, now, parse_opt_ts, parse_ts};
use super::Database;

const RUN_COLUMNS: &str =
    "id, site_id, status, pages_processed, issues_created, error_message, created_at, started_at, completed_at";

fn row_to_run(row: &rusqlite::Row) -> rusqlite::Result<Run> {
    let status: String = row.get(2)?;
    Ok(Run {
        id: row.get(0)?,
        site_id: row.get(1)?,
        status: RunStatus::parse(&status).ok_or_else(|| {
            rusqlite::Error::FromSqlConversionFailure(
                2,
                rusqlite::types::Type::Text,
                format!("unknown run status '{}'", status).into(),
            )
        })?,
        pages_processed: row.get(3)?,
        issues_created: row.get(4)?,
        error_message: row.get(5)?,
        created_at: parse_ts(6, row.get(6)?)?,
        started_at: parse_opt_ts(7, row.get(7)?)?,
        completed_at: parse_opt_ts(8, row.get(8)?)?,
    })
}

impl Database {
    pub fn create_run(&self, site_id: &str) -> Result<Run, AuditError> {
        let id = uuid::Uuid::new_v4().to_string();
        {
            let conn = self.lock()?;
            conn.execute(
                "INSERT INTO runs (id, site_id, status, created_at) VALUES (?1, ?2, 'pending', ?3)",
                rusqlite::params![id, site_id, now()],
            ).map_err(db_err("Failed to create run"))?;
        }
        self.get_run(&id)?
            .ok_or_else(|| AuditError::Database("Run vanished after insert".into()))
    }

    pub fn get_run(&self, id: &str) -> Result<Option<Run>, AuditError> {
        let conn = self.lock()?;
        let result = conn.query_row(
            &format!("SELECT {} FROM runs WHERE id = ?1", RUN_COLUMNS),
            rusqlite::params![id],
            row_to_run,
        );
        match result {
            Ok(run) => Ok(Some(run)),
            Err(rusqlite::Error::QueryReturnedNoRows) => Ok(None),
            Err(e) => Err(AuditError::Database(format!("Query error: {}", e))),
        }
    }

    pub fn list_runs(&self, site_id: Option<&str>, limit: usize, offset: usize) -> Result<Vec<Run>, AuditError> {
        let conn = self.lock()?;
        let mut stmt = conn.prepare(&format!(
            "SELECT {} FROM runs WHERE (?1 IS NULL OR site_id = ?1) ORDER BY created_at DESC LIMIT ?2 OFFSET ?3",
            RUN_COLUMNS
        )).map_err(db_err("Query failed"))?;
        let rows = stmt
            .query_map(rusqlite::params![site_id, limit as i64, offset as i64], row_to_run)
            .map_err(db_err("Query error"))?;
        rows.collect::<rusqlite::Result<Vec<_>>>().map_err(db_err("Row error"))
    }

    /// Pending → Running. Returns false when the run was not pending.
    pub fn mark_run_running(&self, id: &str) -> Result<bool, AuditError> {
        let conn = self.lock()?;
        let affected = conn.execute(
            "UPDATE runs SET status = 'running', started_at = ?2 WHERE id = ?1 AND status = 'pending'",
            rusqlite::params![id, now()],
        ).map_err(db_err("Update failed"))?;
        Ok(affected > 0)
    }

    /// Persist running counters while the run is still in progress.
    pub fn update_run_progress(&self, id: &str, pages_processed: u32, issues_created: u32) -> Result<(), AuditError> {
        let conn = self.lock()?;
        conn.execute(
            "UPDATE runs SET pages_processed = ?2, issues_created = ?3 WHERE id = ?1 AND status = 'running'",
            rusqlite::params![id, pages_processed, issues_created],
        ).map_err(db_err("Update failed"))?;
        Ok(())
    }

    /// Running → Completed with final counters. Returns false when the run
    /// had already left the running state (e.g. it was stopped).
    pub fn complete_run(&self, id: &str, pages_processed: u32, issues_created: u32) -> Result<bool, AuditError> {
        let conn = self.lock()?;
        let affected = conn.execute(
            "UPDATE runs SET status = 'completed', completed_at = ?2, pages_processed = ?3, issues_created = ?4 \
             WHERE id = ?1 AND status = 'running'",
            rusqlite::params![id, now(), pages_processed, issues_created],
        ).map_err(db_err("Update failed"))?;
        Ok(affected > 0)
    }

    /// Pending/Running → Failed. Terminal runs are left untouched and false is returned.
    pub fn fail_run(&self, id: &str, error_message: &str) -> Result<bool, AuditError> {
        let conn = self.lock()?;
        let affected = conn.execute(
            "UPDATE runs SET status = 'failed', completed_at = ?2, error_message = ?3 \
             WHERE id = ?1 AND status IN ('pending', 'running')",
            rusqlite::params![id, now(), error_message],
        ).map_err(db_err("Update failed"))?;
        Ok(affected > 0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn setup() -> (Database, String) {
        let db = Database::in_memory().unwrap();
        let site = db.create_site("Example", "https://example.test/", None).unwrap();
        (db, site.id)
    }

    #[test]
    fn test_create_run_is_pending() {
        let (db, site_id) = setup();
        let run = db.create_run(&site_id).unwrap();
        assert_eq!(run.status, RunStatus::Pending);
        assert_eq!(run.pages_processed, 0);
        assert!(run.started_at.is_none());
    }

    #[test]
    fn test_full_lifecycle() {
        let (db, site_id) = setup();
        let run = db.create_run(&site_id).unwrap();

        assert!(db.mark_run_running(&run.id).unwrap());
        let running = db.get_run(&run.id).unwrap().unwrap();
        assert_eq!(running.status, RunStatus::Running);
        assert!(running.started_at.is_some());

        db.update_run_progress(&run.id, 2, 3).unwrap();
        assert_eq!(db.get_run(&run.id).unwrap().unwrap().pages_processed, 2);

        assert!(db.complete_run(&run.id, 4, 7).unwrap());
        let done = db.get_run(&run.id).unwrap().unwrap();
        assert_eq!(done.status, RunStatus::Completed);
        assert_eq!(done.pages_processed, 4);
        assert_eq!(done.issues_created, 7);
        assert!(done.completed_at.is_some());
    }

    #[test]
    fn test_terminal_runs_are_not_reopened() {
        let (db, site_id) = setup();
        let run = db.create_run(&site_id).unwrap();
        db.mark_run_running(&run.id).unwrap();
        assert!(db.fail_run(&run.id, "Stopped by user").unwrap());

        assert!(!db.complete_run(&run.id, 1, 1).unwrap());
        assert!(!db.fail_run(&run.id, "again").unwrap());
        assert!(!db.mark_run_running(&run.id).unwrap());

        let run = db.get_run(&run.id).unwrap().unwrap();
        assert_eq!(run.status, RunStatus::Failed);
        assert_eq!(run.error_message.as_deref(), Some("Stopped by user"));
    }

    #[test]
    fn test_pending_run_can_fail() {
        let (db, site_id) = setup();
        let run = db.create_run(&site_id).unwrap();
        assert!(db.fail_run(&run.id, "Stopped by user").unwrap());
        assert!(db.get_run(&run.id).unwrap().unwrap().completed_at.is_some());
    }

    #[test]
    fn test_list_runs_filters_by_site() {
        let (db, site_id) = setup();
        let other = db.create_site("Other", "https://other.test/", None).unwrap();
        db.create_run(&site_id).unwrap();
        db.create_run(&site_id).unwrap();
        db.create_run(&other.id).unwrap();

        assert_eq!(db.list_runs(Some(&site_id), 10, 0).unwrap().len(), 2);
        assert_eq!(db.list_runs(None, 10, 0).unwrap().len(), 3);
        assert_eq!(db.list_runs(None, 2, 0).unwrap().len(), 2);
    }
}
