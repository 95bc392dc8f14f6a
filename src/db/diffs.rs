use crate::errors::AuditError;
use crate::models::VisualDiff;
use super::connection::{db_err, parse_ts};
use super::Database;

const DIFF_COLUMNS: &str = "id, run_id, page_id, baseline_id, current_screenshot_path, diff_screenshot_path, \
     difference_percentage, pixel_diff_count, threshold_percentage, created_at";

fn row_to_diff(row: &rusqlite::Row) -> rusqlite::Result<VisualDiff> {
    Ok(VisualDiff {
        id: row.get(0)?,
        run_id: row.get(1)?,
        page_id: row.get(2)?,
        baseline_id: row.get(3)?,
        current_screenshot_path: row.get(4)?,
        diff_screenshot_path: row.get(5)?,
        difference_percentage: row.get(6)?,
        pixel_diff_count: row.get::<_, i64>(7)?.max(0) as u64,
        threshold_percentage: row.get(8)?,
        created_at: parse_ts(9, row.get(9)?)?,
    })
}

impl Database {
    pub fn create_visual_diff(&self, diff: &VisualDiff) -> Result<(), AuditError> {
        let conn = self.lock()?;
        conn.execute(
            "INSERT INTO visual_diffs (id, run_id, page_id, baseline_id, current_screenshot_path, \
             diff_screenshot_path, difference_percentage, pixel_diff_count, passed, threshold_percentage, created_at) \
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11)",
            rusqlite::params![
                diff.id,
                diff.run_id,
                diff.page_id,
                diff.baseline_id,
                diff.current_screenshot_path,
                diff.diff_screenshot_path,
                diff.difference_percentage,
                diff.pixel_diff_count as i64,
                diff.passed(),
                diff.threshold_percentage,
                diff.created_at.to_rfc3339(),
            ],
        ).map_err(db_err("Failed to store visual diff"))?;
        Ok(())
    }

    pub fn list_diffs_for_run(&self, run_id: &str) -> Result<Vec<VisualDiff>, AuditError> {
        let conn = self.lock()?;
        let mut stmt = conn.prepare(&format!(
            "SELECT {} FROM visual_diffs WHERE run_id = ?1 ORDER BY created_at, rowid",
            DIFF_COLUMNS
        )).map_err(db_err("Query failed"))?;
        let rows = stmt.query_map(rusqlite::params![run_id], row_to_diff).map_err(db_err("Query error"))?;
        rows.collect::<rusqlite::Result<Vec<_>>>().map_err(db_err("Row error"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{BaselineSource, NewBaseline, NewPage};

    #[test]
    fn test_store_and_list_diff() {
        let db = Database::in_memory().unwrap();
        let site = db.create_site("Example", "https://example.test/", None).unwrap();
        let run = db.create_run(&site.id).unwrap();
        let page = db.create_page(&NewPage {
            run_id: run.id.clone(),
            url: "https://example.test/".into(),
            ..Default::default()
        }).unwrap();
        let baseline = db.create_baseline(&NewBaseline {
            site_id: site.id.clone(),
            page_url: page.url.clone(),
            source: BaselineSource::Screenshot,
            image_path: "base.png".into(),
            viewport_width: 1440,
            viewport_height: 900,
        }).unwrap();

        db.create_visual_diff(&VisualDiff {
            id: "diff-1".into(),
            run_id: run.id.clone(),
            page_id: page.id.clone(),
            baseline_id: baseline.id.clone(),
            current_screenshot_path: "current.png".into(),
            diff_screenshot_path: Some("diff.png".into()),
            difference_percentage: 2.5,
            pixel_diff_count: 32_400,
            threshold_percentage: 0.1,
            created_at: chrono::Utc::now(),
        }).unwrap();

        let diffs = db.list_diffs_for_run(&run.id).unwrap();
        assert_eq!(diffs.len(), 1);
        assert_eq!(diffs[0].pixel_diff_count, 32_400);
        assert!(!diffs[0].passed());
    }
}
