mod common;

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use async_trait::async_trait;
use axum::http::StatusCode;
use dashmap::DashMap;
use serde_json::json;
use tokio_util::sync::CancellationToken;
use siteaudit::browser::{BrowserLauncher, PageOptions};
use siteaudit::checkers::{CheckContext, Checker, JsErrorChecker, MobileChecker, PageAuditPipeline, SeoChecker};
use siteaudit::config::{AuditSettings, Viewport};
use siteaudit::db::Database;
use siteaudit::discovery::{DiscoveredPage, PageDiscoveryEngine};
use siteaudit::errors::AuditError;
use siteaudit::models::{Finding, FindingCategory, RunStatus, Site};
use siteaudit::pipeline::{stop_run, ActiveRuns, RunHandle, RunOrchestrator, STOPPED_BY_USER};
use common::{test_settings, ScriptedLauncher, ScriptedSite};

// Port 1 refuses connections, so the sitemap probe fails fast.
const BASE: &str = "http://127.0.0.1:1/";

fn scripted_site() -> ScriptedSite {
    ScriptedSite::default()
        .with_links(BASE, &["/about", "/login", "http://other.test/x", "/about#team", "/brochure.pdf"])
        .with_links("http://127.0.0.1:1/about", &["/contact", "/"])
        .with_probe("og:title", json!({ "url": "https://example.test/" }))
        .with_js_errors(&["Uncaught TypeError: widget is undefined"])
}

fn checkers() -> PageAuditPipeline {
    PageAuditPipeline::new(vec![Box::new(SeoChecker), Box::new(JsErrorChecker::new(Duration::ZERO))])
}

struct Fixture {
    _dir: tempfile::TempDir,
    settings: Arc<AuditSettings>,
    db: Database,
    site: Site,
}

fn fixture() -> Fixture {
    let dir = tempfile::tempdir().unwrap();
    let settings = Arc::new(test_settings(dir.path()));
    let db = Database::in_memory().unwrap();
    let site = db.create_site("Acme", BASE, Some("project-1")).unwrap();
    Fixture { _dir: dir, settings, db, site }
}

fn orchestrator(f: &Fixture, launcher: &Arc<ScriptedLauncher>) -> RunOrchestrator {
    RunOrchestrator::new(f.settings.clone(), f.db.clone(), launcher.clone(), reqwest::Client::new())
        .with_checkers(checkers())
}

#[tokio::test]
async fn test_discovery_follows_same_site_links() {
    let f = fixture();
    let launcher = ScriptedLauncher::new(scripted_site());
    let browser = launcher.launch(&f.settings.browser).await.unwrap();

    let engine = PageDiscoveryEngine::new(&f.settings, reqwest::Client::new());
    let pages = engine.discover(browser.as_ref(), BASE).await.unwrap();

    let found: Vec<(&str, u32)> = pages.iter().map(|p| (p.url.as_str(), p.depth)).collect();
    assert_eq!(found, vec![
        ("http://127.0.0.1:1/", 0),
        ("http://127.0.0.1:1/about", 1),
        ("http://127.0.0.1:1/contact", 2),
    ]);
    // Depth-2 pages are recorded but not loaded.
    assert!(!launcher.log.visits().contains(&"http://127.0.0.1:1/contact".to_string()));
    assert_eq!(launcher.log.open_pages(), 0);
}

#[tokio::test]
async fn test_discovery_respects_page_cap() {
    let dir = tempfile::tempdir().unwrap();
    let mut settings = test_settings(dir.path());
    settings.crawl.max_pages = 2;
    let launcher = ScriptedLauncher::new(scripted_site());
    let browser = launcher.launch(&settings.browser).await.unwrap();

    let pages = PageDiscoveryEngine::new(&settings, reqwest::Client::new())
        .discover(browser.as_ref(), BASE)
        .await
        .unwrap();
    assert_eq!(pages.len(), 2);
    assert_eq!(pages[0].url, BASE);
}

#[tokio::test]
async fn test_full_run_creates_issues_and_baselines() {
    let f = fixture();
    let launcher = Arc::new(ScriptedLauncher::new(scripted_site()));
    let run = f.db.create_run(&f.site.id).unwrap();

    let summary = orchestrator(&f, &launcher).execute_run(&run.id, &f.site).await.unwrap();
    assert_eq!(summary.pages_processed, 3);
    assert_eq!(summary.failed_pages, 0);
    // One SEO and one JavaScript issue per page.
    assert_eq!(summary.issues_created, 6);

    let stored = f.db.get_run(&run.id).unwrap().unwrap();
    assert_eq!(stored.status, RunStatus::Completed);
    assert_eq!((stored.pages_processed, stored.issues_created), (3, 6));
    assert!(stored.started_at.is_some() && stored.completed_at.is_some());

    let issues = f.db.list_issues_for_run(&run.id).unwrap();
    let titles: Vec<&str> = issues.iter().map(|i| i.title.as_str()).collect();
    assert!(titles.contains(&"7 SEO Issue(s) on Homepage"));
    assert!(titles.contains(&"1 JavaScript Error(s) on About"));
    assert!(issues.iter().all(|i| i.project_id.as_deref() == Some("project-1")));
    assert!(issues.iter().all(|i| i.screenshot_path.is_some()));

    let pages = f.db.list_pages(&run.id).unwrap();
    assert_eq!(pages.len(), 3);
    for page in &pages {
        assert!(!page.render_failed);
        let shot = page.screenshot_path.as_deref().unwrap();
        assert!(std::path::Path::new(shot).exists());
        assert_eq!(f.db.active_baselines(&f.site.id, &page.url).unwrap().len(), 1);
    }
    assert!(f.db.list_diffs_for_run(&run.id).unwrap().is_empty());

    assert_eq!(launcher.log.open_pages(), 0);
    assert_eq!(launcher.log.browser_closed.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn test_changed_page_raises_visual_regression() {
    let f = fixture();
    let launcher = Arc::new(ScriptedLauncher::new(scripted_site()));

    let first = f.db.create_run(&f.site.id).unwrap();
    orchestrator(&f, &launcher).execute_run(&first.id, &f.site).await.unwrap();

    launcher.site.altered_screenshots.store(true, Ordering::SeqCst);
    let second = f.db.create_run(&f.site.id).unwrap();
    let summary = orchestrator(&f, &launcher).execute_run(&second.id, &f.site).await.unwrap();
    assert_eq!(summary.issues_created, 9);

    let diffs = f.db.list_diffs_for_run(&second.id).unwrap();
    assert_eq!(diffs.len(), 3);
    assert!(diffs.iter().all(|d| !d.passed()));
    assert!(diffs.iter().all(|d| (d.difference_percentage - 1.0).abs() < 1e-9));

    let issues = f.db.list_issues_for_run(&second.id).unwrap();
    let regression = issues
        .iter()
        .find(|i| i.title == "Visual Regression: 1 Baseline(s) Failed on Homepage")
        .unwrap();
    assert!(regression.description.contains("1.00%"));

    // Existing baselines are kept, not replaced.
    assert_eq!(f.db.active_baselines(&f.site.id, BASE).unwrap().len(), 1);
}

#[tokio::test]
async fn test_navigation_failure_is_recorded_and_run_continues() {
    let f = fixture();
    let site = ScriptedSite::default()
        .with_links(BASE, &["/about", "/contact"])
        .with_broken("http://127.0.0.1:1/about");
    let launcher = Arc::new(ScriptedLauncher::new(site));
    let run = f.db.create_run(&f.site.id).unwrap();

    let summary = orchestrator(&f, &launcher).execute_run(&run.id, &f.site).await.unwrap();
    assert_eq!(summary.pages_processed, 3);
    assert_eq!(summary.failed_pages, 1);

    let pages = f.db.list_pages(&run.id).unwrap();
    let failed = pages.iter().find(|p| p.url == "http://127.0.0.1:1/about").unwrap();
    assert!(failed.render_failed);
    assert!(failed.render_error.as_deref().unwrap().contains("ERR_CONNECTION_REFUSED"));
    assert!(failed.screenshot_path.is_none());

    assert_eq!(f.db.get_run(&run.id).unwrap().unwrap().status, RunStatus::Completed);
    assert_eq!(launcher.log.open_pages(), 0);
}

#[tokio::test]
async fn test_launch_failure_fails_run() {
    let f = fixture();
    let launcher = Arc::new(ScriptedLauncher::failing());
    let run = f.db.create_run(&f.site.id).unwrap();

    let err = orchestrator(&f, &launcher).execute_run(&run.id, &f.site).await.unwrap_err();
    assert!(matches!(err, AuditError::Browser(_)));

    let stored = f.db.get_run(&run.id).unwrap().unwrap();
    assert_eq!(stored.status, RunStatus::Failed);
    assert!(stored.error_message.unwrap().contains("Failed to launch browser"));
    assert!(stored.completed_at.is_some());
}

#[tokio::test]
async fn test_cancelled_run_is_stopped_by_user() {
    let f = fixture();
    let launcher = Arc::new(ScriptedLauncher::new(scripted_site()));
    let run = f.db.create_run(&f.site.id).unwrap();
    let token = CancellationToken::new();
    token.cancel();

    let err = orchestrator(&f, &launcher)
        .with_cancel_token(token)
        .execute_run(&run.id, &f.site)
        .await
        .unwrap_err();
    assert!(matches!(err, AuditError::Cancelled(_)));

    let stored = f.db.get_run(&run.id).unwrap().unwrap();
    assert_eq!(stored.status, RunStatus::Failed);
    assert_eq!(stored.error_message.as_deref(), Some(STOPPED_BY_USER));
    assert!(f.db.list_pages(&run.id).unwrap().is_empty());
    assert_eq!(launcher.log.browser_closed.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn test_run_must_be_pending() {
    let f = fixture();
    let launcher = Arc::new(ScriptedLauncher::new(scripted_site()));
    let run = f.db.create_run(&f.site.id).unwrap();
    f.db.fail_run(&run.id, STOPPED_BY_USER).unwrap();

    let err = orchestrator(&f, &launcher).execute_run(&run.id, &f.site).await.unwrap_err();
    assert!(matches!(err, AuditError::InvalidState(_)));
    assert_eq!(launcher.log.launched.load(Ordering::SeqCst), 0);
    assert_eq!(f.db.get_run(&run.id).unwrap().unwrap().error_message.as_deref(), Some(STOPPED_BY_USER));
}

#[tokio::test]
async fn test_custom_run_audits_listed_pages_only() {
    let f = fixture();
    let launcher = Arc::new(ScriptedLauncher::new(scripted_site()));
    let run = f.db.create_run(&f.site.id).unwrap();
    let pages = vec!["/contact".to_string(), "contact".to_string(), "/pricing#plans".to_string()];

    let summary = orchestrator(&f, &launcher)
        .execute_custom_run(&run.id, &f.site, &pages)
        .await
        .unwrap();
    assert_eq!(summary.pages_processed, 2);
    assert_eq!(launcher.log.visits(), vec![
        "http://127.0.0.1:1/contact".to_string(),
        "http://127.0.0.1:1/pricing".to_string(),
    ]);
}

#[tokio::test]
async fn test_custom_run_without_pages_fails() {
    let f = fixture();
    let launcher = Arc::new(ScriptedLauncher::new(scripted_site()));
    let run = f.db.create_run(&f.site.id).unwrap();

    let err = orchestrator(&f, &launcher)
        .execute_custom_run(&run.id, &f.site, &[])
        .await
        .unwrap_err();
    assert!(matches!(err, AuditError::InvalidTarget(_)));
    assert_eq!(f.db.get_run(&run.id).unwrap().unwrap().status, RunStatus::Failed);
}

struct PanickingChecker;

#[async_trait]
impl Checker for PanickingChecker {
    fn name(&self) -> &'static str {
        "panicking"
    }

    fn category(&self) -> FindingCategory {
        FindingCategory::Visual
    }

    async fn check(&self, _ctx: &CheckContext<'_>) -> Result<Vec<Finding>, AuditError> {
        panic!("checker bug");
    }
}

#[tokio::test]
async fn test_panicking_checker_does_not_sink_page() {
    let f = fixture();
    let launcher = Arc::new(ScriptedLauncher::new(scripted_site()));
    let run = f.db.create_run(&f.site.id).unwrap();
    let pipeline = PageAuditPipeline::new(vec![Box::new(PanickingChecker), Box::new(SeoChecker)]);

    let summary = orchestrator(&f, &launcher)
        .with_checkers(pipeline)
        .execute_custom_run(&run.id, &f.site, &["/".to_string()])
        .await
        .unwrap();
    assert_eq!(summary.failed_pages, 0);
    assert_eq!(summary.issues_created, 1);

    let issues = f.db.list_issues_for_run(&run.id).unwrap();
    assert_eq!(issues[0].title, "7 SEO Issue(s) on Homepage");
}

/// Serve `/sitemap.xml` on a local port. `body` receives the base URL.
async fn serve_sitemap(status: StatusCode, body: impl FnOnce(&str) -> String) -> String {
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let base = format!("http://{}/", listener.local_addr().unwrap());
    let body = body(&base);
    let app = axum::Router::new().route(
        "/sitemap.xml",
        axum::routing::get(move || {
            let body = body.clone();
            async move { (status, body) }
        }),
    );
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });
    base
}

fn urlset(base: &str, paths: &[&str]) -> String {
    let urls: String = paths
        .iter()
        .map(|p| {
            let loc = if p.starts_with("http") { p.to_string() } else { format!("{}{}", base, p) };
            format!("  <url><loc>{}</loc></url>\n", loc)
        })
        .collect();
    format!("<?xml version=\"1.0\"?>\n<urlset xmlns=\"http://www.sitemaps.org/schemas/sitemap/0.9\">\n{}</urlset>", urls)
}

fn linked_site(base: &str) -> ScriptedSite {
    ScriptedSite::default()
        .with_links(base, &["/about", "/contact"])
        .with_links(&format!("{}about", base), &["/team"])
        .with_links(&format!("{}pricing", base), &["/secret"])
}

fn relative(pages: &[DiscoveredPage], base: &str) -> Vec<(String, u32)> {
    pages
        .iter()
        .map(|p| (p.url.trim_start_matches(base).to_string(), p.depth))
        .collect()
}

#[tokio::test]
async fn test_sitemap_entries_join_at_depth_one_without_crawling() {
    let base = serve_sitemap(StatusCode::OK, |base| {
        urlset(base, &["", "pricing", "login", "brochure.pdf", "http://other.test/x"])
    })
    .await;
    let dir = tempfile::tempdir().unwrap();
    let settings = test_settings(dir.path());
    let launcher = ScriptedLauncher::new(linked_site(&base));
    let browser = launcher.launch(&settings.browser).await.unwrap();

    let pages = PageDiscoveryEngine::new(&settings, reqwest::Client::new())
        .discover(browser.as_ref(), &base)
        .await
        .unwrap();

    let expected: Vec<(String, u32)> = vec![
        ("".into(), 0),
        ("pricing".into(), 1),
        ("about".into(), 1),
        ("contact".into(), 1),
        ("team".into(), 2),
    ];
    assert_eq!(relative(&pages, &base), expected);
    let visits = launcher.log.visits();
    assert!(!visits.contains(&format!("{}pricing", base)));
    assert!(visits.contains(&format!("{}about", base)));
}

#[tokio::test]
async fn test_sitemap_entries_count_against_page_cap() {
    let base = serve_sitemap(StatusCode::OK, |base| urlset(base, &["pricing", "blog", "careers"])).await;
    let dir = tempfile::tempdir().unwrap();
    let mut settings = test_settings(dir.path());
    settings.crawl.max_pages = 3;
    let launcher = ScriptedLauncher::new(linked_site(&base));
    let browser = launcher.launch(&settings.browser).await.unwrap();

    let pages = PageDiscoveryEngine::new(&settings, reqwest::Client::new())
        .discover(browser.as_ref(), &base)
        .await
        .unwrap();

    let expected: Vec<(String, u32)> = vec![("".into(), 0), ("pricing".into(), 1), ("blog".into(), 1)];
    assert_eq!(relative(&pages, &base), expected);
    // Full after the sitemap: no crawl page is opened
    assert_eq!(launcher.log.attempted_opens.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn test_unusable_sitemap_falls_back_to_crawl() {
    fn sitemap_index(base: &str) -> String {
        format!("<sitemapindex><sitemap><loc>{}pricing-sitemap.xml</loc></sitemap></sitemapindex>", base)
    }
    fn truncated_urlset(base: &str) -> String {
        let full = urlset(base, &["pricing", "blog"]);
        full[..full.len() - "</urlset>".len() - 20].to_string()
    }
    fn missing(base: &str) -> String {
        urlset(base, &["pricing"])
    }
    let responses: [(StatusCode, fn(&str) -> String); 3] = [
        (StatusCode::NOT_FOUND, missing),
        (StatusCode::OK, sitemap_index),
        (StatusCode::OK, truncated_urlset),
    ];
    for (status, body) in responses {
        let base = serve_sitemap(status, body).await;
        let dir = tempfile::tempdir().unwrap();
        let settings = test_settings(dir.path());
        let launcher = ScriptedLauncher::new(linked_site(&base));
        let browser = launcher.launch(&settings.browser).await.unwrap();

        let pages = PageDiscoveryEngine::new(&settings, reqwest::Client::new())
            .discover(browser.as_ref(), &base)
            .await
            .unwrap();

        let expected: Vec<(String, u32)> =
            vec![("".into(), 0), ("about".into(), 1), ("contact".into(), 1), ("team".into(), 2)];
        assert_eq!(relative(&pages, &base), expected, "sitemap answered {}", status);
    }
}

#[tokio::test]
async fn test_mobile_device_that_fails_to_open_is_skipped() {
    let dir = tempfile::tempdir().unwrap();
    // open #0 is the audited page, #1..#4 the devices; #2 is the iPhone 12 Pro
    let site = ScriptedSite::default()
        .with_probe("rightEdges", json!({ "scrollWidth": 900, "innerWidth": 375, "hasViewportMeta": true }))
        .with_failing_open(2);
    let launcher = ScriptedLauncher::new(site);
    let browser = launcher.launch(&test_settings(dir.path()).browser).await.unwrap();
    let page = browser.new_page(&PageOptions::desktop(Viewport::new(1440, 900))).await.unwrap();
    page.goto(BASE, Duration::from_secs(5)).await.unwrap();

    let ctx = CheckContext { page: page.as_ref(), browser: browser.as_ref(), url: BASE, run_dir: dir.path() };
    let findings = MobileChecker::new(Duration::from_secs(5)).check(&ctx).await.unwrap();

    let viewports: Vec<String> = findings
        .iter()
        .map(|f| match f {
            Finding::Mobile(m) => m.viewport.clone().unwrap_or_default(),
            other => panic!("unexpected finding {:?}", other),
        })
        .collect();
    assert_eq!(viewports, vec!["375x667", "768x1024", "360x800"]);
    // Only the audited page is still open
    assert_eq!(launcher.log.open_pages(), 1);
}

/// Issues a stop while the first page is being audited.
struct StopDuringAudit {
    db: Database,
    active: ActiveRuns,
    run_id: String,
    stopped: AtomicBool,
}

#[async_trait]
impl Checker for StopDuringAudit {
    fn name(&self) -> &'static str {
        "stop_during_audit"
    }

    fn category(&self) -> FindingCategory {
        FindingCategory::Seo
    }

    async fn check(&self, _ctx: &CheckContext<'_>) -> Result<Vec<Finding>, AuditError> {
        if !self.stopped.swap(true, Ordering::SeqCst) {
            stop_run(&self.db, &self.active, &self.run_id)?;
        }
        Ok(Vec::new())
    }
}

fn stopping_pipeline(f: &Fixture, active: &ActiveRuns, run_id: &str) -> PageAuditPipeline {
    PageAuditPipeline::new(vec![Box::new(StopDuringAudit {
        db: f.db.clone(),
        active: active.clone(),
        run_id: run_id.to_string(),
        stopped: AtomicBool::new(false),
    })])
}

#[tokio::test]
async fn test_stop_during_page_halts_before_next_page() {
    let f = fixture();
    let launcher = Arc::new(ScriptedLauncher::new(scripted_site()));
    let run = f.db.create_run(&f.site.id).unwrap();
    let active: ActiveRuns = Arc::new(DashMap::new());
    let handle = Arc::new(RunHandle::new(&run.id, &f.site.id));
    active.insert(run.id.clone(), handle.clone());

    let err = orchestrator(&f, &launcher)
        .with_checkers(stopping_pipeline(&f, &active, &run.id))
        .with_handle(handle.clone())
        .execute_custom_run(&run.id, &f.site, &["/".to_string(), "/about".to_string()])
        .await
        .unwrap_err();
    assert!(matches!(err, AuditError::Cancelled(_)));
    assert!(handle.is_cancelled());

    let stored = f.db.get_run(&run.id).unwrap().unwrap();
    assert_eq!(stored.status, RunStatus::Failed);
    assert_eq!(stored.error_message.as_deref(), Some(STOPPED_BY_USER));
    // The page in flight finishes; the next one is never loaded
    assert_eq!(launcher.log.visits(), vec![BASE.to_string()]);
    assert_eq!(f.db.list_pages(&run.id).unwrap().len(), 1);
    assert_eq!(launcher.log.open_pages(), 0);
}

#[tokio::test]
async fn test_stop_during_last_page_wins_over_completion() {
    let f = fixture();
    let launcher = Arc::new(ScriptedLauncher::new(scripted_site()));
    let run = f.db.create_run(&f.site.id).unwrap();
    // Stopped from elsewhere: nothing registered in this process
    let active: ActiveRuns = Arc::new(DashMap::new());

    let err = orchestrator(&f, &launcher)
        .with_checkers(stopping_pipeline(&f, &active, &run.id))
        .execute_custom_run(&run.id, &f.site, &["/".to_string()])
        .await
        .unwrap_err();
    assert!(matches!(err, AuditError::Cancelled(_)));

    let stored = f.db.get_run(&run.id).unwrap().unwrap();
    assert_eq!(stored.status, RunStatus::Failed);
    assert_eq!(stored.error_message.as_deref(), Some(STOPPED_BY_USER));
    assert!(stored.completed_at.is_some());
    assert!(!f.db.complete_run(&run.id, 1, 0).unwrap());
}

#[tokio::test]
async fn test_page_panic_is_recorded_and_page_closed() {
    let f = fixture();
    let boom = format!("{}boom", BASE);
    let launcher = Arc::new(ScriptedLauncher::new(scripted_site().with_panicking_screenshot(&boom)));
    let run = f.db.create_run(&f.site.id).unwrap();

    let summary = orchestrator(&f, &launcher)
        .execute_custom_run(&run.id, &f.site, &["/boom".to_string(), "/".to_string()])
        .await
        .unwrap();
    assert_eq!(summary.pages_processed, 2);
    assert_eq!(summary.failed_pages, 1);

    let pages = f.db.list_pages(&run.id).unwrap();
    let failed = pages.iter().find(|p| p.url == boom).unwrap();
    assert!(failed.render_failed);
    assert!(failed.render_error.as_deref().unwrap().contains("Page audit panicked: screenshot encoder crashed"));
    assert!(!pages.iter().find(|p| p.url == BASE).unwrap().render_failed);

    assert_eq!(f.db.get_run(&run.id).unwrap().unwrap().status, RunStatus::Completed);
    assert_eq!(launcher.log.open_pages(), 0);
}
