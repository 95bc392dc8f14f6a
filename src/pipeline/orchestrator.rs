use std::any::Any;
use std::collections::HashSet;
use std::panic::AssertUnwindSafe;
use std::path::Path;
use std::sync::Arc;
use std::time::Instant;
use futures::FutureExt;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};
use crate::browser::{Browser, BrowserLauncher, PageHandle, PageOptions};
use crate::checkers::{CheckContext, PageAuditPipeline};
use crate::config::AuditSettings;
use crate::db::Database;
use crate::discovery::{normalize_url, DiscoveredPage, PageDiscoveryEngine};
use crate::errors::{with_retry, AuditError, RetryConfig};
use crate::issues::{IssueAggregator, PageContext};
use crate::models::{NewPage, Site};
use crate::visual::{BaselineRequest, CreateBaseline, VisualRegressionEngine};
use super::events::RunEvent;
use super::state::{RunHandle, RunSummary, STOPPED_BY_USER};

const SCREENSHOT_NAME_CHARS: usize = 50;

/// `<unix-millis>-<url reduced to [a-z0-9_], first 50 chars>.png`
pub fn screenshot_file_name(url: &str) -> String {
    let slug: String = url
        .to_lowercase()
        .chars()
        .map(|c| if c.is_ascii_lowercase() || c.is_ascii_digit() { c } else { '_' })
        .take(SCREENSHOT_NAME_CHARS)
        .collect();
    format!("{}-{}.png", chrono::Utc::now().timestamp_millis(), slug)
}

/// Text of a caught panic payload.
pub fn panic_message(payload: &(dyn Any + Send)) -> String {
    payload
        .downcast_ref::<&str>()
        .map(|s| s.to_string())
        .or_else(|| payload.downcast_ref::<String>().cloned())
        .unwrap_or_else(|| "unknown panic".to_string())
}

/// Resolve an explicit page list against the site's base URL. Relative paths
/// are joined to the base; duplicates are dropped and the list is capped.
pub fn resolve_custom_pages(
    base_url: &str,
    pages: &[String],
    max_pages: usize,
) -> Result<Vec<DiscoveredPage>, AuditError> {
    let base = normalize_url(base_url)?;
    let mut seen = HashSet::new();
    let mut resolved = Vec::new();
    for raw in pages.iter().map(|p| p.trim()).filter(|p| !p.is_empty()) {
        let mut url = match base.join(raw) {
            Ok(url) => url,
            Err(e) => {
                warn!(page = raw, error = %e, "Skipping unparseable page");
                continue;
            }
        };
        url.set_fragment(None);
        if seen.insert(url.to_string()) {
            resolved.push(DiscoveredPage { url: url.to_string(), depth: 0 });
        }
        if resolved.len() >= max_pages {
            break;
        }
    }
    if resolved.is_empty() {
        return Err(AuditError::InvalidTarget("No valid pages to audit".to_string()));
    }
    Ok(resolved)
}

/// Drives one run from Pending to a terminal state: acquires the browser,
/// discovers pages, audits each one and persists the counters.
pub struct RunOrchestrator {
    settings: Arc<AuditSettings>,
    db: Database,
    launcher: Arc<dyn BrowserLauncher>,
    discovery: PageDiscoveryEngine,
    checkers: PageAuditPipeline,
    visual: VisualRegressionEngine,
    aggregator: IssueAggregator,
    cancel_token: CancellationToken,
    handle: Option<Arc<RunHandle>>,
    event_tx: Option<mpsc::UnboundedSender<RunEvent>>,
}

impl RunOrchestrator {
    pub fn new(
        settings: Arc<AuditSettings>,
        db: Database,
        launcher: Arc<dyn BrowserLauncher>,
        http: reqwest::Client,
    ) -> Self {
        Self {
            discovery: PageDiscoveryEngine::new(&settings, http.clone()),
            checkers: PageAuditPipeline::standard(&settings, http.clone()),
            visual: VisualRegressionEngine::new(db.clone(), settings.clone(), http),
            aggregator: IssueAggregator::new(db.clone()),
            settings,
            db,
            launcher,
            cancel_token: CancellationToken::new(),
            handle: None,
            event_tx: None,
        }
    }

    /// Replace the standard checker set.
    pub fn with_checkers(mut self, checkers: PageAuditPipeline) -> Self {
        self.checkers = checkers;
        self
    }

    /// Use an external token so that cancelling it stops the page loop.
    pub fn with_cancel_token(mut self, token: CancellationToken) -> Self {
        self.cancel_token = token;
        self
    }

    /// Track progress on an active-run handle and share its token.
    pub fn with_handle(mut self, handle: Arc<RunHandle>) -> Self {
        self.cancel_token = handle.cancel_token();
        self.handle = Some(handle);
        self
    }

    pub fn with_event_channel(mut self, tx: mpsc::UnboundedSender<RunEvent>) -> Self {
        self.event_tx = Some(tx);
        self
    }

    pub fn cancel_token(&self) -> CancellationToken {
        self.cancel_token.clone()
    }

    fn emit(&self, event: RunEvent) {
        if let Some(ref tx) = self.event_tx {
            let _ = tx.send(event);
        }
    }

    /// Discover the site's pages and audit each of them.
    pub async fn execute_run(&self, run_id: &str, site: &Site) -> Result<RunSummary, AuditError> {
        self.execute(run_id, site, None).await
    }

    /// Audit an explicit page list instead of discovering one.
    pub async fn execute_custom_run(
        &self,
        run_id: &str,
        site: &Site,
        pages: &[String],
    ) -> Result<RunSummary, AuditError> {
        self.execute(run_id, site, Some(pages)).await
    }

    async fn execute(&self, run_id: &str, site: &Site, pages: Option<&[String]>) -> Result<RunSummary, AuditError> {
        let started = Instant::now();
        if !self.db.mark_run_running(run_id)? {
            return Err(AuditError::InvalidState(format!("Run {} is not pending", run_id)));
        }
        info!(run_id, site = %site.base_url, "Run started");
        self.emit(RunEvent::RunStarted { run_id: run_id.to_string(), base_url: site.base_url.clone() });

        match self.run_to_completion(run_id, site, pages, started).await {
            Ok(summary) => {
                info!(
                    run_id,
                    pages = summary.pages_processed,
                    issues = summary.issues_created,
                    failed_pages = summary.failed_pages,
                    "Run completed"
                );
                self.emit(RunEvent::RunCompleted {
                    pages_processed: summary.pages_processed,
                    issues_created: summary.issues_created,
                    duration_ms: summary.duration_ms,
                });
                Ok(summary)
            }
            Err(e) => {
                let message = match &e {
                    AuditError::Cancelled(_) => STOPPED_BY_USER.to_string(),
                    other => other.to_string(),
                };
                if let Err(db_err) = self.db.fail_run(run_id, &message) {
                    error!(run_id, error = %db_err, "Failed to record run failure");
                }
                error!(run_id, error = %e, "Run failed");
                self.emit(RunEvent::RunFailed { error: message });
                Err(e)
            }
        }
    }

    async fn run_to_completion(
        &self,
        run_id: &str,
        site: &Site,
        pages: Option<&[String]>,
        started: Instant,
    ) -> Result<RunSummary, AuditError> {
        let browser = self.launcher.launch(&self.settings.browser).await?;
        let outcome = self.audit_site(run_id, site, browser.as_ref(), pages).await;
        if let Err(e) = browser.close().await {
            warn!(run_id, error = %e, "Failed to close browser");
        }
        let (pages_processed, issues_created, failed_pages) = outcome?;

        if !self.db.complete_run(run_id, pages_processed, issues_created)? {
            // Stopped while the last page was in flight
            return Err(AuditError::Cancelled(format!("Run {} was stopped", run_id)));
        }
        Ok(RunSummary {
            run_id: run_id.to_string(),
            pages_processed,
            issues_created,
            failed_pages,
            duration_ms: started.elapsed().as_millis() as u64,
        })
    }

    async fn audit_site(
        &self,
        run_id: &str,
        site: &Site,
        browser: &dyn Browser,
        pages: Option<&[String]>,
    ) -> Result<(u32, u32, u32), AuditError> {
        tokio::fs::create_dir_all(self.settings.run_dir(run_id)).await?;
        let targets = match pages {
            Some(list) => resolve_custom_pages(&site.base_url, list, self.settings.crawl.max_pages)?,
            None => self.discovery.discover(browser, &site.base_url).await?,
        };
        info!(run_id, pages = targets.len(), "Pages to audit");
        self.emit(RunEvent::PagesDiscovered { count: targets.len() });

        let (mut processed, mut issues, mut failed) = (0u32, 0u32, 0u32);
        for (index, target) in targets.iter().enumerate() {
            if self.cancel_token.is_cancelled() || self.stopped_elsewhere(run_id) {
                info!(run_id, processed, "Run cancelled between pages");
                return Err(AuditError::Cancelled(format!("Run {} was stopped", run_id)));
            }
            self.emit(RunEvent::PageStarted { url: target.url.clone(), index, total: targets.len() });

            match self.process_page(run_id, site, browser, target).await {
                Ok(created) => {
                    issues += created as u32;
                    self.emit(RunEvent::PageCompleted { url: target.url.clone(), issues: created });
                }
                Err(e) => {
                    failed += 1;
                    warn!(run_id, url = %target.url, error = %e, "Page audit failed");
                    self.emit(RunEvent::PageFailed { url: target.url.clone(), error: e.to_string() });
                }
            }
            processed += 1;
            self.db.update_run_progress(run_id, processed, issues)?;
            if let Some(handle) = &self.handle {
                handle.record_progress(processed, issues);
            }
        }
        Ok((processed, issues, failed))
    }

    /// A stop issued by another process only shows up in the database.
    fn stopped_elsewhere(&self, run_id: &str) -> bool {
        matches!(self.db.get_run(run_id), Ok(Some(run)) if run.status.is_terminal())
    }

    /// Audit one page. Any failure, a panic included, is recorded on the page
    /// row before it is returned; the page context is always closed.
    async fn process_page(
        &self,
        run_id: &str,
        site: &Site,
        browser: &dyn Browser,
        target: &DiscoveredPage,
    ) -> Result<usize, AuditError> {
        let page = match browser.new_page(&PageOptions::desktop(self.settings.browser.viewport)).await {
            Ok(page) => page,
            Err(e) => {
                self.record_failure(run_id, target, None, &e);
                return Err(e);
            }
        };

        let mut page_id = None;
        let outcome = AssertUnwindSafe(self.audit_page(run_id, site, browser, page.as_ref(), target, &mut page_id))
            .catch_unwind()
            .await
            .unwrap_or_else(|panic| Err(AuditError::Internal(format!("Page audit panicked: {}", panic_message(&*panic)))));
        if let Err(e) = page.close().await {
            warn!(url = %target.url, error = %e, "Failed to close page");
        }
        if let Err(e) = &outcome {
            self.record_failure(run_id, target, page_id.as_deref(), e);
        }
        outcome
    }

    async fn audit_page(
        &self,
        run_id: &str,
        site: &Site,
        browser: &dyn Browser,
        page: &dyn PageHandle,
        target: &DiscoveredPage,
        page_id: &mut Option<String>,
    ) -> Result<usize, AuditError> {
        let retry = RetryConfig { max_retries: self.settings.browser.retry_attempts, ..RetryConfig::default() };
        let timeout = self.settings.browser.page_timeout;

        let load_started = Instant::now();
        let status = with_retry("navigate", &retry, || page.goto(&target.url, timeout)).await?;
        let load_time_ms = load_started.elapsed().as_millis() as u64;
        tokio::time::sleep(self.settings.browser.idle_settle).await;

        let run_dir = self.settings.run_dir(run_id);
        let screenshot = run_dir.join(screenshot_file_name(&target.url));
        page.screenshot(&screenshot, true).await?;
        let screenshot_path = screenshot.to_string_lossy().into_owned();

        let record = self.db.create_page(&NewPage {
            run_id: run_id.to_string(),
            url: target.url.clone(),
            status_code: status,
            screenshot_path: Some(screenshot_path.clone()),
            load_time_ms: Some(load_time_ms),
            render_failed: false,
            render_error: None,
            depth: target.depth,
        })?;
        *page_id = Some(record.id.clone());

        let ctx = CheckContext { page, browser, url: &target.url, run_dir: &run_dir };
        let mut findings = self.checkers.audit(&ctx).await;

        let diffs = match self
            .visual
            .compare_screenshots(run_id, &record.id, &target.url, &screenshot, &site.id)
            .await
        {
            Ok(diffs) => diffs,
            Err(e) => {
                warn!(url = %target.url, error = %e, "Visual comparison failed");
                Vec::new()
            }
        };
        findings.extend(diffs.iter().map(|d| d.to_finding()));
        if diffs.is_empty() {
            self.auto_baseline(site, &target.url, &screenshot).await;
        }

        let created = self.aggregator.aggregate(
            &PageContext {
                project_id: site.project_id.clone(),
                site_id: site.id.clone(),
                run_id: run_id.to_string(),
                page_id: record.id,
                url: target.url.clone(),
                screenshot_path: Some(screenshot_path),
            },
            &findings,
        )?;
        info!(url = %target.url, findings = findings.len(), issues = created, "Page audited");
        Ok(created)
    }

    /// Promote the screenshot to a baseline when the page has none yet.
    async fn auto_baseline(&self, site: &Site, url: &str, screenshot: &Path) {
        if !self.settings.visual.auto_baseline {
            return;
        }
        match self.db.active_baselines(&site.id, url) {
            Ok(existing) if existing.is_empty() => {}
            Ok(_) => return,
            Err(e) => {
                warn!(url, error = %e, "Failed to look up baselines");
                return;
            }
        }
        let request = CreateBaseline {
            site_id: site.id.clone(),
            page_url: url.to_string(),
            viewport: self.settings.browser.viewport,
            request: BaselineRequest::Screenshot { image_path: screenshot.to_string_lossy().into_owned() },
        };
        if let Err(e) = self.visual.create_baseline(request).await {
            warn!(url, error = %e, "Failed to create automatic baseline");
        }
    }

    fn record_failure(&self, run_id: &str, target: &DiscoveredPage, page_id: Option<&str>, err: &AuditError) {
        let message = err.to_string();
        let result = match page_id {
            Some(id) => self.db.mark_page_failed(id, &message),
            None => self
                .db
                .create_page(&NewPage {
                    run_id: run_id.to_string(),
                    url: target.url.clone(),
                    render_failed: true,
                    render_error: Some(message),
                    depth: target.depth,
                    ..NewPage::default()
                })
                .map(|_| ()),
        };
        if let Err(e) = result {
            error!(url = %target.url, error = %e, "Failed to record page failure");
        }
    }
}
