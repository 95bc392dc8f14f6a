use std::sync::Arc;
use console::style;
use serde_json::json;
use tokio::sync::mpsc;
use tracing::warn;
use crate::browser::PlaywrightLauncher;
use crate::cli::commands::AuditArgs;
use crate::config::AuditSettings;
use crate::errors::AuditError;
use crate::pipeline::progress::format_elapsed;
use crate::pipeline::{RunOrchestrator, RunProgress};

pub async fn handle_audit(args: AuditArgs, settings: AuditSettings) -> Result<(), AuditError> {
    let db = super::open_database(&settings)?;
    let site = super::site_for_url(&db, &args.url, args.name.as_deref())?;
    let run = db.create_run(&site.id)?;
    let http = crate::http::build_client(&settings)?;

    let (tx, mut rx) = mpsc::unbounded_channel();
    let orchestrator = RunOrchestrator::new(
        Arc::new(settings),
        db.clone(),
        Arc::new(PlaywrightLauncher::new()),
        http,
    )
    .with_event_channel(tx);

    let token = orchestrator.cancel_token();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            warn!("Interrupt received, stopping after the current page");
            token.cancel();
        }
    });

    let show_progress = !args.no_progress && !args.json;
    let progress_task = tokio::spawn(async move {
        let mut progress = show_progress.then(RunProgress::new);
        while let Some(event) = rx.recv().await {
            if let Some(p) = progress.as_mut() {
                p.handle_event(&event);
            }
        }
    });

    let result = if args.pages.is_empty() {
        orchestrator.execute_run(&run.id, &site).await
    } else {
        orchestrator.execute_custom_run(&run.id, &site, &args.pages).await
    };
    // Closes the event channel so the progress task drains and exits
    drop(orchestrator);
    let _ = progress_task.await;
    let summary = result?;

    let by_severity = db.issue_severity_counts(&run.id)?;
    let failed_diffs = db.list_diffs_for_run(&run.id)?.iter().filter(|d| !d.passed()).count();

    if args.json {
        let counts: serde_json::Map<String, serde_json::Value> =
            by_severity.iter().map(|(s, n)| (s.clone(), json!(n))).collect();
        let body = json!({
            "run_id": summary.run_id,
            "site": site.base_url,
            "pages_processed": summary.pages_processed,
            "failed_pages": summary.failed_pages,
            "issues_created": summary.issues_created,
            "failed_visual_diffs": failed_diffs,
            "by_severity": counts,
            "duration_ms": summary.duration_ms,
        });
        println!("{}", serde_json::to_string_pretty(&body)?);
        return Ok(());
    }

    println!();
    println!("{} {}", style("Audit complete:").bold(), site.base_url);
    println!("  Run:       {}", summary.run_id);
    println!(
        "  Pages:     {} ({} failed to render)",
        summary.pages_processed, summary.failed_pages
    );
    println!("  Issues:    {}", summary.issues_created);
    for (severity, count) in &by_severity {
        let label = match severity.as_str() {
            "Critical" => style(severity.as_str()).red().bold(),
            "Major" => style(severity.as_str()).yellow(),
            _ => style(severity.as_str()).dim(),
        };
        println!("    {:<10} {}", label, count);
    }
    if failed_diffs > 0 {
        println!("  Visual regressions: {}", failed_diffs);
    }
    println!("  Duration:  {}", format_elapsed(summary.duration_ms));
    Ok(())
}
