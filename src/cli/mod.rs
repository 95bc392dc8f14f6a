pub mod audit;
pub mod baseline;
pub mod commands;
pub mod compare;
pub mod discover;
pub mod serve;
pub mod stop;
pub mod validate;

use std::path::Path;
use crate::config::{parse_config, AuditSettings};
use crate::db::Database;
use crate::discovery::normalize_url;
use crate::errors::AuditError;
use crate::models::Site;

pub use commands::{Cli, Commands};

/// Settings from the optional config file, defaults otherwise.
pub async fn load_settings(config: Option<&str>) -> Result<AuditSettings, AuditError> {
    match config {
        Some(path) => Ok(AuditSettings::from_config(&parse_config(Path::new(path)).await?)),
        None => Ok(AuditSettings::default()),
    }
}

pub fn open_database(settings: &AuditSettings) -> Result<Database, AuditError> {
    if let Some(parent) = Path::new(&settings.output.database).parent() {
        if !parent.as_os_str().is_empty() {
            std::fs::create_dir_all(parent)?;
        }
    }
    Database::new(&settings.output.database)
}

/// Look a site up by base URL, creating it on first use.
pub fn site_for_url(db: &Database, base_url: &str, name: Option<&str>) -> Result<Site, AuditError> {
    let base = normalize_url(base_url)?;
    if let Some(site) = db.find_site_by_url(base.as_str())? {
        return Ok(site);
    }
    let default_name = base.host_str().unwrap_or(base.as_str()).to_string();
    db.create_site(name.unwrap_or(&default_name), base.as_str(), None)
}
