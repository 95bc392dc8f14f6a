use console::style;
use tracing::warn;
use crate::browser::{BrowserLauncher, PlaywrightLauncher};
use crate::cli::commands::DiscoverArgs;
use crate::config::AuditSettings;
use crate::discovery::PageDiscoveryEngine;
use crate::errors::AuditError;

pub async fn handle_discover(args: DiscoverArgs, settings: AuditSettings) -> Result<(), AuditError> {
    let http = crate::http::build_client(&settings)?;
    let engine = PageDiscoveryEngine::new(&settings, http);

    let browser = PlaywrightLauncher::new().launch(&settings.browser).await?;
    let result = engine.discover(browser.as_ref(), &args.url).await;
    if let Err(e) = browser.close().await {
        warn!(error = %e, "Failed to close browser");
    }
    let pages = result?;

    if args.json {
        println!("{}", serde_json::to_string_pretty(&pages)?);
        return Ok(());
    }
    println!("{} {} page(s)", style("Discovered").bold(), pages.len());
    for page in &pages {
        println!("  [{}] {}", page.depth, page.url);
    }
    Ok(())
}
