use crate::errors::AuditError;
use crate::models::{BaselineSource, NewBaseline, VisualBaseline};
use super::connection::{db_err, now, parse_ts};
use super::Database;

const BASELINE_COLUMNS: &str = "id, site_id, page_url, baseline_type, image_path, figma_file_key, \
     figma_node_id, figma_image_url, viewport_width, viewport_height, is_active, created_at";

fn row_to_baseline(row: &rusqlite::Row) -> rusqlite::Result<VisualBaseline> {
    let kind: String = row.get(3)?;
    let source = match kind.as_str() {
        "screenshot" => BaselineSource::Screenshot,
        "manual" => BaselineSource::Manual,
        "figma" => BaselineSource::Figma {
            file_key: row.get::<_, Option<String>>(5)?.unwrap_or_default(),
            node_id: row.get::<_, Option<String>>(6)?.unwrap_or_default(),
            image_url: row.get(7)?,
        },
        other => {
            return Err(rusqlite::Error::FromSqlConversionFailure(
                3,
                rusqlite::types::Type::Text,
                format!("unknown baseline type '{}'", other).into(),
            ))
        }
    };
    Ok(VisualBaseline {
        id: row.get(0)?,
        site_id: row.get(1)?,
        page_url: row.get(2)?,
        source,
        image_path: row.get(4)?,
        viewport_width: row.get(8)?,
        viewport_height: row.get(9)?,
        is_active: row.get(10)?,
        created_at: parse_ts(11, row.get(11)?)?,
    })
}

impl Database {
    pub fn create_baseline(&self, baseline: &NewBaseline) -> Result<VisualBaseline, AuditError> {
        let id = uuid::Uuid::new_v4().to_string();
        let (file_key, node_id, image_url) = match &baseline.source {
            BaselineSource::Figma { file_key, node_id, image_url } => {
                (Some(file_key.as_str()), Some(node_id.as_str()), image_url.as_deref())
            }
            _ => (None, None, None),
        };
        {
            let conn = self.lock()?;
            conn.execute(
                "INSERT INTO visual_baselines (id, site_id, page_url, baseline_type, image_path, figma_file_key, \
                 figma_node_id, figma_image_url, viewport_width, viewport_height, is_active, created_at) \
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, 1, ?11)",
                rusqlite::params![
                    id,
                    baseline.site_id,
                    baseline.page_url,
                    baseline.source.type_name(),
                    baseline.image_path,
                    file_key,
                    node_id,
                    image_url,
                    baseline.viewport_width,
                    baseline.viewport_height,
                    now(),
                ],
            ).map_err(db_err("Failed to create baseline"))?;
        }
        self.get_baseline(&id)?
            .ok_or_else(|| AuditError::Database("Baseline vanished after insert".into()))
    }

    pub fn get_baseline(&self, id: &str) -> Result<Option<VisualBaseline>, AuditError> {
        let conn = self.lock()?;
        let result = conn.query_row(
            &format!("SELECT {} FROM visual_baselines WHERE id = ?1", BASELINE_COLUMNS),
            rusqlite::params![id],
            row_to_baseline,
        );
        match result {
            Ok(b) => Ok(Some(b)),
            Err(rusqlite::Error::QueryReturnedNoRows) => Ok(None),
            Err(e) => Err(AuditError::Database(format!("Query error: {}", e))),
        }
    }

    /// Active baselines for an exact page URL, oldest first.
    pub fn active_baselines(&self, site_id: &str, page_url: &str) -> Result<Vec<VisualBaseline>, AuditError> {
        let conn = self.lock()?;
        let mut stmt = conn.prepare(&format!(
            "SELECT {} FROM visual_baselines WHERE site_id = ?1 AND page_url = ?2 AND is_active = 1 \
             ORDER BY created_at, rowid",
            BASELINE_COLUMNS
        )).map_err(db_err("Query failed"))?;
        let rows = stmt
            .query_map(rusqlite::params![site_id, page_url], row_to_baseline)
            .map_err(db_err("Query error"))?;
        rows.collect::<rusqlite::Result<Vec<_>>>().map_err(db_err("Row error"))
    }

    pub fn list_baselines(&self, site_id: &str, include_inactive: bool) -> Result<Vec<VisualBaseline>, AuditError> {
        let conn = self.lock()?;
        let filter = if include_inactive { "" } else { " AND is_active = 1" };
        let mut stmt = conn.prepare(&format!(
            "SELECT {} FROM visual_baselines WHERE site_id = ?1{} ORDER BY page_url, created_at, rowid",
            BASELINE_COLUMNS, filter
        )).map_err(db_err("Query failed"))?;
        let rows = stmt.query_map(rusqlite::params![site_id], row_to_baseline).map_err(db_err("Query error"))?;
        rows.collect::<rusqlite::Result<Vec<_>>>().map_err(db_err("Row error"))
    }

    /// Returns false when the baseline does not exist or was already inactive.
    pub fn deactivate_baseline(&self, id: &str) -> Result<bool, AuditError> {
        let conn = self.lock()?;
        let changed = conn.execute(
            "UPDATE visual_baselines SET is_active = 0 WHERE id = ?1 AND is_active = 1",
            rusqlite::params![id],
        ).map_err(db_err("Update failed"))?;
        Ok(changed > 0)
    }

    /// Point a baseline at a freshly downloaded image.
    pub fn update_baseline_image(
        &self,
        id: &str,
        image_path: &str,
        figma_image_url: Option<&str>,
    ) -> Result<(), AuditError> {
        let conn = self.lock()?;
        conn.execute(
            "UPDATE visual_baselines SET image_path = ?2, figma_image_url = COALESCE(?3, figma_image_url) WHERE id = ?1",
            rusqlite::params![id, image_path, figma_image_url],
        ).map_err(db_err("Update failed"))?;
        Ok(())
    }
}
