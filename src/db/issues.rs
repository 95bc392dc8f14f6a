use crate::errors::AuditError;
use crate::models::{Issue, NewIssue, Severity, NEW_ISSUE_STATUS};
use super::connection::{db_err, now, parse_ts};
use super::Database;

const ISSUE_COLUMNS: &str = "id, project_id, site_id, run_id, page_id, url, issue_type, title, description, \
     severity, screenshot_path, status, metadata, created_at";

fn row_to_issue(row: &rusqlite::Row) -> rusqlite::Result<Issue> {
    let severity: String = row.get(9)?;
    let metadata: Option<String> = row.get(12)?;
    Ok(Issue {
        id: row.get(0)?,
        project_id: row.get(1)?,
        site_id: row.get(2)?,
        run_id: row.get(3)?,
        page_id: row.get(4)?,
        url: row.get(5)?,
        issue_type: row.get(6)?,
        title: row.get(7)?,
        description: row.get(8)?,
        severity: Severity::parse(&severity).unwrap_or(Severity::Major),
        screenshot_path: row.get(10)?,
        status: row.get(11)?,
        metadata: metadata.and_then(|m| serde_json::from_str(&m).ok()),
        created_at: parse_ts(13, row.get(13)?)?,
    })
}

impl Database {
    pub fn create_issue(&self, issue: &NewIssue) -> Result<String, AuditError> {
        let id = uuid::Uuid::new_v4().to_string();
        let metadata = issue.metadata.as_ref().map(serde_json::to_string).transpose()?;
        let conn = self.lock()?;
        conn.execute(
            "INSERT INTO issues (id, project_id, site_id, run_id, page_id, url, issue_type, title, description, \
             severity, screenshot_path, status, metadata, created_at) \
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14)",
            rusqlite::params![
                id,
                issue.project_id,
                issue.site_id,
                issue.run_id,
                issue.page_id,
                issue.url,
                issue.category.label(),
                issue.title,
                issue.description,
                issue.severity.as_str(),
                issue.screenshot_path,
                NEW_ISSUE_STATUS,
                metadata,
                now(),
            ],
        ).map_err(db_err("Failed to create issue"))?;
        Ok(id)
    }

    pub fn list_issues_for_run(&self, run_id: &str) -> Result<Vec<Issue>, AuditError> {
        let conn = self.lock()?;
        let mut stmt = conn.prepare(&format!(
            "SELECT {} FROM issues WHERE run_id = ?1 ORDER BY created_at, rowid",
            ISSUE_COLUMNS
        )).map_err(db_err("Query failed"))?;
        let rows = stmt.query_map(rusqlite::params![run_id], row_to_issue).map_err(db_err("Query error"))?;
        rows.collect::<rusqlite::Result<Vec<_>>>().map_err(db_err("Row error"))
    }

    /// Issue counts per severity for one run, e.g. `{"Critical": 2, "Minor": 1}`.
    pub fn issue_severity_counts(&self, run_id: &str) -> Result<Vec<(String, i64)>, AuditError> {
        let conn = self.lock()?;
        let mut stmt = conn.prepare(
            "SELECT severity, COUNT(*) FROM issues WHERE run_id = ?1 GROUP BY severity"
        ).map_err(db_err("Query failed"))?;
        let rows = stmt
            .query_map(rusqlite::params![run_id], |row| Ok((row.get(0)?, row.get(1)?)))
            .map_err(db_err("Query error"))?;
        rows.collect::<rusqlite::Result<Vec<_>>>().map_err(db_err("Row error"))
    }
}
