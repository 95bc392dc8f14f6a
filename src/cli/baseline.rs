use std::sync::Arc;
use console::style;
use crate::cli::commands::{BaselineAddArgs, BaselineCommand, BaselineType};
use crate::config::{AuditSettings, Viewport};
use crate::errors::AuditError;
use crate::visual::{BaselineRequest, CreateBaseline, VisualRegressionEngine};

fn required(value: Option<String>, flag: &str) -> Result<String, AuditError> {
    value
        .filter(|v| !v.trim().is_empty())
        .ok_or_else(|| AuditError::Config(format!("--{} is required for this baseline type", flag)))
}

fn request_for(args: &BaselineAddArgs, settings: &AuditSettings) -> Result<BaselineRequest, AuditError> {
    Ok(match args.kind {
        BaselineType::Screenshot => BaselineRequest::Screenshot { image_path: required(args.image.clone(), "image")? },
        BaselineType::Manual => BaselineRequest::Manual { image_path: required(args.image.clone(), "image")? },
        BaselineType::Figma => BaselineRequest::Figma {
            file_key: required(args.file_key.clone(), "file-key")?,
            node_id: required(args.node_id.clone(), "node-id")?,
            access_token: required(
                args.token.clone().or_else(|| settings.figma.access_token.clone()),
                "token",
            )?,
        },
    })
}

pub async fn handle_baseline(command: BaselineCommand, settings: AuditSettings) -> Result<(), AuditError> {
    let db = super::open_database(&settings)?;
    let http = crate::http::build_client(&settings)?;
    let settings = Arc::new(settings);
    let engine = VisualRegressionEngine::new(db.clone(), settings.clone(), http);

    match command {
        BaselineCommand::Add(args) => {
            let site = super::site_for_url(&db, &args.site, None)?;
            let default = settings.browser.viewport;
            let baseline = engine
                .create_baseline(CreateBaseline {
                    site_id: site.id,
                    page_url: args.page_url.clone(),
                    viewport: Viewport::new(args.width.unwrap_or(default.width), args.height.unwrap_or(default.height)),
                    request: request_for(&args, &settings)?,
                })
                .await?;
            println!(
                "{} baseline {} ({}) for {}",
                style("Created").green(),
                baseline.id,
                baseline.source.type_name(),
                baseline.page_url
            );
        }
        BaselineCommand::List(args) => {
            let site = db
                .find_site_by_url(crate::discovery::normalize_url(&args.site)?.as_str())?
                .ok_or_else(|| AuditError::NotFound(format!("Site {} not found", args.site)))?;
            let baselines = engine.baselines_for_site(&site.id, args.all)?;
            if args.json {
                println!("{}", serde_json::to_string_pretty(&baselines)?);
                return Ok(());
            }
            if baselines.is_empty() {
                println!("No baselines for {}", site.base_url);
            }
            for b in &baselines {
                let state = if b.is_active { style("active").green() } else { style("inactive").dim() };
                println!(
                    "{}  {:<10} {}x{}  {}  {}",
                    b.id,
                    b.source.type_name(),
                    b.viewport_width,
                    b.viewport_height,
                    state,
                    b.page_url
                );
            }
        }
        BaselineCommand::Deactivate(args) => {
            let baseline = engine.deactivate_baseline(&args.id)?;
            println!("Baseline {} deactivated", baseline.id);
        }
    }
    Ok(())
}
