use std::path::Path;
use console::style;
use crate::cli::commands::ValidateArgs;
use crate::config::{parse_config, AuditSettings};
use crate::errors::AuditError;

pub async fn handle_validate(args: ValidateArgs) -> Result<(), AuditError> {
    let config = parse_config(Path::new(&args.config)).await?;
    let settings = AuditSettings::from_config(&config);
    println!("{} Configuration is valid: {}", style("✓").green(), args.config);
    println!(
        "  max_depth={} max_pages={} viewport={} diff_threshold={}%",
        settings.crawl.max_depth,
        settings.crawl.max_pages,
        settings.browser.viewport,
        settings.visual.diff_threshold_percentage,
    );
    if settings.figma.access_token.is_some() {
        println!("  figma token: configured");
    }
    Ok(())
}
