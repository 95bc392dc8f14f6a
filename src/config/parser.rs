use std::path::Path;
use crate::errors::AuditError;
use super::types::AuditConfig;
use super::schema::CONFIG_SCHEMA;
use tracing::warn;

pub async fn parse_config(path: &Path) -> Result<AuditConfig, AuditError> {
    if !path.exists() {
        return Err(AuditError::Config(format!("Config file not found: {}", path.display())));
    }

    let metadata = tokio::fs::metadata(path).await?;
    if metadata.len() > 1_048_576 {
        return Err(AuditError::Config("Config file exceeds 1MB limit".into()));
    }

    let content = tokio::fs::read_to_string(path).await?;
    parse_config_str(&content)
}

/// Parse configuration from YAML text: schema check (advisory), typed parse,
/// then semantic validation.
pub fn parse_config_str(content: &str) -> Result<AuditConfig, AuditError> {
    let yaml: serde_yaml::Value = serde_yaml::from_str(content)?;

    // An empty document is a valid, all-defaults config
    if yaml.is_null() {
        return Ok(AuditConfig::default());
    }

    validate_schema(&yaml)?;

    let config: AuditConfig = serde_yaml::from_value(yaml)?;

    validate_conflicts(&config)?;

    Ok(config)
}

/// Validate config against the JSON schema for structural correctness.
fn validate_schema(yaml: &serde_yaml::Value) -> Result<(), AuditError> {
    let json_value: serde_json::Value = serde_json::to_value(yaml)
        .map_err(|e| AuditError::Config(format!("Config conversion error: {}", e)))?;

    let compiled = jsonschema::JSONSchema::compile(&CONFIG_SCHEMA)
        .map_err(|e| AuditError::Config(format!("Schema compilation error: {}", e)))?;

    let result = compiled.validate(&json_value);
    if let Err(errors) = result {
        // Advisory: the typed parse and semantic checks below are authoritative
        for e in errors {
            warn!(validation_error = %format!("{} at {}", e, e.instance_path), "Config schema warning");
        }
    }

    Ok(())
}

/// Detect semantic conflicts in the parsed configuration.
fn validate_conflicts(config: &AuditConfig) -> Result<(), AuditError> {
    if let Some(crawl) = &config.crawl {
        if crawl.max_pages == Some(0) {
            return Err(AuditError::Config("crawl.max_pages must be at least 1".into()));
        }
    }

    if let Some(browser) = &config.browser {
        if browser.viewport_width == Some(0) || browser.viewport_height == Some(0) {
            return Err(AuditError::Config("browser viewport dimensions must be positive".into()));
        }
    }

    if let Some(visual) = &config.visual {
        if let Some(t) = visual.diff_threshold_percentage {
            if !(0.0..=100.0).contains(&t) {
                return Err(AuditError::Config(format!(
                    "visual.diff_threshold_percentage must be within 0..=100, got {}", t
                )));
            }
        }
        if let Some(t) = visual.pixel_threshold {
            if !(0.0..=1.0).contains(&t) {
                return Err(AuditError::Config(format!(
                    "visual.pixel_threshold must be within 0..=1, got {}", t
                )));
            }
        }
    }

    // A keyword on both lists would make every submission fail
    if let Some(forms) = &config.forms {
        if let (Some(success), Some(error)) = (&forms.success_keywords, &forms.error_keywords) {
            for s in success {
                if error.iter().any(|e| e.eq_ignore_ascii_case(s)) {
                    return Err(AuditError::Config(format!(
                        "Conflicting form keywords: '{}' appears in both success and error lists",
                        s
                    )));
                }
            }
        }
    }

    if let Some(figma) = &config.figma {
        if figma.access_token.as_deref().map_or(false, str::is_empty) {
            warn!("Figma section configured but access_token is empty");
        }
    }

    Ok(())
}
