use crate::errors::AuditError;
use crate::models::Site;
use super::connection::{db_err, now, parse_ts};
use super::Database;

fn row_to_site(row: &rusqlite::Row) -> rusqlite::Result<Site> {
    Ok(Site {
        id: row.get(0)?,
        project_id: row.get(1)?,
        name: row.get(2)?,
        base_url: row.get(3)?,
        created_at: parse_ts(4, row.get(4)?)?,
    })
}

impl Database {
    pub fn create_site(&self, name: &str, base_url: &str, project_id: Option<&str>) -> Result<Site, AuditError> {
        let id = uuid::Uuid::new_v4().to_string();
        {
            let conn = self.lock()?;
            conn.execute(
                "INSERT INTO sites (id, project_id, name, base_url, created_at) VALUES (?1, ?2, ?3, ?4, ?5)",
                rusqlite::params![id, project_id, name, base_url, now()],
            ).map_err(db_err("Failed to create site"))?;
        }
        self.get_site(&id)?
            .ok_or_else(|| AuditError::Database("Site vanished after insert".into()))
    }

    pub fn get_site(&self, id: &str) -> Result<Option<Site>, AuditError> {
        let conn = self.lock()?;
        let result = conn.query_row(
            "SELECT id, project_id, name, base_url, created_at FROM sites WHERE id = ?1",
            rusqlite::params![id],
            row_to_site,
        );
        match result {
            Ok(site) => Ok(Some(site)),
            Err(rusqlite::Error::QueryReturnedNoRows) => Ok(None),
            Err(e) => Err(AuditError::Database(format!("Query error: {}", e))),
        }
    }

    pub fn find_site_by_url(&self, base_url: &str) -> Result<Option<Site>, AuditError> {
        let conn = self.lock()?;
        let result = conn.query_row(
            "SELECT id, project_id, name, base_url, created_at FROM sites WHERE base_url = ?1 ORDER BY created_at LIMIT 1",
            rusqlite::params![base_url],
            row_to_site,
        );
        match result {
            Ok(site) => Ok(Some(site)),
            Err(rusqlite::Error::QueryReturnedNoRows) => Ok(None),
            Err(e) => Err(AuditError::Database(format!("Query error: {}", e))),
        }
    }

    pub fn list_sites(&self) -> Result<Vec<Site>, AuditError> {
        let conn = self.lock()?;
        let mut stmt = conn.prepare(
            "SELECT id, project_id, name, base_url, created_at FROM sites ORDER BY created_at"
        ).map_err(db_err("Query failed"))?;
        let rows = stmt.query_map([], row_to_site).map_err(db_err("Query error"))?;
        rows.collect::<rusqlite::Result<Vec<_>>>().map_err(db_err("Row error"))
    }
}
