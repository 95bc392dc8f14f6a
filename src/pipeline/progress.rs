use std::time::{Duration, Instant};
use console::style;
use indicatif::{MultiProgress, ProgressBar, ProgressStyle};
use super::events::RunEvent;

/// Terminal progress display for a single run, driven by [`RunEvent`]s.
pub struct RunProgress {
    multi: MultiProgress,
    page_bar: Option<ProgressBar>,
    status_bar: ProgressBar,
    issues: usize,
    failed_pages: usize,
    start_time: Instant,
}

impl RunProgress {
    pub fn new() -> Self {
        let multi = MultiProgress::new();
        let status_bar = multi.add(ProgressBar::new_spinner());
        status_bar.set_style(
            ProgressStyle::default_spinner()
                .template("  {spinner:.cyan} {msg}")
                .unwrap_or_else(|_| ProgressStyle::default_spinner()),
        );
        status_bar.set_message("Starting audit...");
        status_bar.enable_steady_tick(Duration::from_millis(120));

        Self {
            multi,
            page_bar: None,
            status_bar,
            issues: 0,
            failed_pages: 0,
            start_time: Instant::now(),
        }
    }

    pub fn handle_event(&mut self, event: &RunEvent) {
        match event {
            RunEvent::RunStarted { base_url, .. } => {
                self.status_bar.set_message(format!("Discovering pages on {}", base_url));
            }
            RunEvent::PagesDiscovered { count } => {
                let bar = self.multi.insert_before(&self.status_bar, ProgressBar::new(*count as u64));
                bar.set_style(
                    ProgressStyle::default_bar()
                        .template("  {bar:30.cyan/dark_gray} {pos}/{len} pages | {msg}")
                        .unwrap_or_else(|_| ProgressStyle::default_bar())
                        .progress_chars("█▓░"),
                );
                self.page_bar = Some(bar);
                self.update_status();
            }
            RunEvent::PageStarted { url, .. } => {
                if let Some(bar) = &self.page_bar {
                    bar.set_message(url.clone());
                }
            }
            RunEvent::PageCompleted { issues, .. } => {
                self.issues += issues;
                if let Some(bar) = &self.page_bar {
                    bar.inc(1);
                }
                self.update_status();
            }
            RunEvent::PageFailed { url, error } => {
                self.failed_pages += 1;
                if let Some(bar) = &self.page_bar {
                    bar.inc(1);
                }
                let _ = self.multi.println(format!("  {} {} ({})", style("✗").red(), url, error));
                self.update_status();
            }
            RunEvent::RunCompleted { pages_processed, issues_created, duration_ms } => {
                if let Some(bar) = self.page_bar.take() {
                    bar.finish_with_message("All pages audited");
                }
                self.status_bar.finish_with_message(format!(
                    "Audit complete: {} pages | {} issues | {}",
                    pages_processed,
                    issues_created,
                    format_elapsed(*duration_ms),
                ));
            }
            RunEvent::RunFailed { error } => {
                if let Some(bar) = self.page_bar.take() {
                    bar.abandon_with_message("Failed");
                }
                self.status_bar.finish_with_message(format!("Audit failed: {}", error));
            }
        }
    }

    fn update_status(&self) {
        let elapsed = format_elapsed(self.start_time.elapsed().as_millis() as u64);
        self.status_bar.set_message(format!(
            "{} | {} issues | {} failed pages",
            elapsed, self.issues, self.failed_pages
        ));
    }
}

impl Default for RunProgress {
    fn default() -> Self {
        Self::new()
    }
}

pub fn format_elapsed(ms: u64) -> String {
    let secs = ms / 1000;
    let mins = secs / 60;
    if mins > 0 {
        format!("{}m{}s", mins, secs % 60)
    } else {
        format!("{}s", secs)
    }
}
