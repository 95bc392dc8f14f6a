use crate::errors::AuditError;
use crate::models::{NewPage, Page};
use super::connection::{db_err, now, parse_ts};
use super::Database;

const PAGE_COLUMNS: &str =
    "id, run_id, url, status_code, screenshot_path, load_time_ms, render_failed, render_error, depth, created_at";

fn row_to_page(row: &rusqlite::Row) -> rusqlite::Result<Page> {
    Ok(Page {
        id: row.get(0)?,
        run_id: row.get(1)?,
        url: row.get(2)?,
        status_code: row.get(3)?,
        screenshot_path: row.get(4)?,
        load_time_ms: row.get::<_, Option<i64>>(5)?.map(|v| v.max(0) as u64),
        render_failed: row.get(6)?,
        render_error: row.get(7)?,
        depth: row.get(8)?,
        created_at: parse_ts(9, row.get(9)?)?,
    })
}

impl Database {
    pub fn create_page(&self, page: &NewPage) -> Result<Page, AuditError> {
        let id = uuid::Uuid::new_v4().to_string();
        {
            let conn = self.lock()?;
            conn.execute(
                "INSERT INTO pages (id, run_id, url, status_code, screenshot_path, load_time_ms, render_failed, render_error, depth, created_at) \
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10)",
                rusqlite::params![
                    id,
                    page.run_id,
                    page.url,
                    page.status_code,
                    page.screenshot_path,
                    page.load_time_ms.map(|v| v as i64),
                    page.render_failed,
                    page.render_error,
                    page.depth,
                    now(),
                ],
            ).map_err(db_err("Failed to create page"))?;
        }
        self.get_page(&id)?
            .ok_or_else(|| AuditError::Database("Page vanished after insert".into()))
    }

    pub fn get_page(&self, id: &str) -> Result<Option<Page>, AuditError> {
        let conn = self.lock()?;
        let result = conn.query_row(
            &format!("SELECT {} FROM pages WHERE id = ?1", PAGE_COLUMNS),
            rusqlite::params![id],
            row_to_page,
        );
        match result {
            Ok(page) => Ok(Some(page)),
            Err(rusqlite::Error::QueryReturnedNoRows) => Ok(None),
            Err(e) => Err(AuditError::Database(format!("Query error: {}", e))),
        }
    }

    /// Flag an already-created page as failed to render.
    pub fn mark_page_failed(&self, id: &str, render_error: &str) -> Result<(), AuditError> {
        let conn = self.lock()?;
        conn.execute(
            "UPDATE pages SET render_failed = 1, render_error = ?2 WHERE id = ?1",
            rusqlite::params![id, render_error],
        ).map_err(db_err("Update failed"))?;
        Ok(())
    }

    pub fn list_pages(&self, run_id: &str) -> Result<Vec<Page>, AuditError> {
        let conn = self.lock()?;
        let mut stmt = conn.prepare(&format!(
            "SELECT {} FROM pages WHERE run_id = ?1 ORDER BY created_at, rowid",
            PAGE_COLUMNS
        )).map_err(db_err("Query failed"))?;
        let rows = stmt.query_map(rusqlite::params![run_id], row_to_page).map_err(db_err("Query error"))?;
        rows.collect::<rusqlite::Result<Vec<_>>>().map_err(db_err("Row error"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn setup() -> (Database, String) {
        let db = Database::in_memory().unwrap();
        let site = db.create_site("Example", "https://example.test/", None).unwrap();
        let run = db.create_run(&site.id).unwrap();
        (db, run.id)
    }

    #[test]
    fn test_create_and_list_pages() {
        let (db, run_id) = setup();
        db.create_page(&NewPage {
            run_id: run_id.clone(),
            url: "https://example.test/".into(),
            status_code: Some(200),
            screenshot_path: Some("shots/home.png".into()),
            load_time_ms: Some(812),
            ..Default::default()
        }).unwrap();
        db.create_page(&NewPage {
            run_id: run_id.clone(),
            url: "https://example.test/contact".into(),
            depth: 1,
            ..Default::default()
        }).unwrap();

        let pages = db.list_pages(&run_id).unwrap();
        assert_eq!(pages.len(), 2);
        assert_eq!(pages[0].status_code, Some(200));
        assert_eq!(pages[0].load_time_ms, Some(812));
        assert_eq!(pages[1].depth, 1);
        assert!(!pages[1].render_failed);
    }

    #[test]
    fn test_mark_page_failed() {
        let (db, run_id) = setup();
        let page = db.create_page(&NewPage {
            run_id,
            url: "https://example.test/slow".into(),
            ..Default::default()
        }).unwrap();
        db.mark_page_failed(&page.id, "Timeout: 30000ms exceeded").unwrap();
        let page = db.get_page(&page.id).unwrap().unwrap();
        assert!(page.render_failed);
        assert_eq!(page.render_error.as_deref(), Some("Timeout: 30000ms exceeded"));
    }
}
