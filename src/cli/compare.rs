use std::path::Path;
use console::style;
use serde_json::json;
use crate::cli::commands::CompareArgs;
use crate::config::AuditSettings;
use crate::errors::AuditError;
use crate::visual::{compare_files, DiffOptions};

pub async fn handle_compare(args: CompareArgs, settings: AuditSettings) -> Result<(), AuditError> {
    let threshold = args.threshold.unwrap_or(settings.visual.diff_threshold_percentage);
    let opts = DiffOptions {
        threshold: args.pixel_threshold.unwrap_or(settings.visual.pixel_threshold),
        ..DiffOptions::default()
    };
    let outcome = compare_files(
        Path::new(&args.baseline),
        Path::new(&args.current),
        args.output.as_deref().map(Path::new),
        opts,
    )
    .await?;

    let pct = outcome.difference_percentage();
    let passed = pct <= threshold;
    if args.json {
        let body = json!({
            "width": outcome.width,
            "height": outcome.height,
            "pixel_diff_count": outcome.diff_pixels,
            "difference_percentage": pct,
            "threshold_percentage": threshold,
            "passed": passed,
            "diff_image": args.output,
        });
        println!("{}", serde_json::to_string_pretty(&body)?);
        return Ok(());
    }

    let verdict = if passed { style("PASSED").green().bold() } else { style("FAILED").red().bold() };
    println!(
        "{} {:.4}% different ({} of {} pixels, threshold {}%)",
        verdict,
        pct,
        outcome.diff_pixels,
        outcome.total_pixels(),
        threshold
    );
    if let Some(out) = &args.output {
        println!("  Diff image: {}", out);
    }
    Ok(())
}
