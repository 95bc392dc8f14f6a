use std::path::{Path, PathBuf};
use std::sync::Arc;
use image::RgbaImage;
use tracing::{info, warn};
use crate::config::credentials::redact_secret;
use crate::config::{AuditSettings, Viewport};
use crate::db::Database;
use crate::errors::AuditError;
use crate::models::{BaselineSource, NewBaseline, VisualBaseline, VisualDiff};
use super::figma::FigmaClient;
use super::pixel::{compare_images, DiffOptions, DiffOutcome};

/// How a new baseline image is obtained.
#[derive(Debug, Clone)]
pub enum BaselineRequest {
    /// A screenshot captured by a previous run.
    Screenshot { image_path: String },
    /// An image supplied by a user.
    Manual { image_path: String },
    /// A Figma frame, rendered and downloaded at creation time.
    Figma { file_key: String, node_id: String, access_token: String },
}

#[derive(Debug, Clone)]
pub struct CreateBaseline {
    pub site_id: String,
    pub page_url: String,
    pub viewport: Viewport,
    pub request: BaselineRequest,
}

fn load_rgba(path: &Path) -> Result<RgbaImage, AuditError> {
    image::open(path)
        .map(|img| img.to_rgba8())
        .map_err(|e| AuditError::Image(format!("{}: {}", path.display(), e)))
}

/// Load two image files, compare them, and optionally write the diff image.
pub async fn compare_files(
    baseline: &Path,
    current: &Path,
    diff_out: Option<&Path>,
    opts: DiffOptions,
) -> Result<DiffOutcome, AuditError> {
    let baseline = baseline.to_path_buf();
    let current = current.to_path_buf();
    let diff_out = diff_out.map(Path::to_path_buf);
    tokio::task::spawn_blocking(move || {
        let outcome = compare_images(load_rgba(&baseline)?, load_rgba(&current)?, &opts)?;
        if let Some(out) = diff_out {
            if let Some(parent) = out.parent() {
                std::fs::create_dir_all(parent)?;
            }
            outcome.diff_image.save(&out)?;
        }
        Ok(outcome)
    })
    .await
    .map_err(|e| AuditError::Internal(format!("Comparison task failed: {}", e)))?
}

/// Compares page screenshots against stored baselines and administers them.
#[derive(Clone)]
pub struct VisualRegressionEngine {
    db: Database,
    settings: Arc<AuditSettings>,
    figma: FigmaClient,
}

impl VisualRegressionEngine {
    pub fn new(db: Database, settings: Arc<AuditSettings>, http: reqwest::Client) -> Self {
        let figma = FigmaClient::new(http, &settings.figma.api_base);
        Self { db, settings, figma }
    }

    fn diff_options(&self) -> DiffOptions {
        DiffOptions { threshold: self.settings.visual.pixel_threshold, ..DiffOptions::default() }
    }

    /// Compare a page screenshot with every active baseline for the page.
    /// A baseline that cannot be compared is logged and skipped.
    pub async fn compare_screenshots(
        &self,
        run_id: &str,
        page_id: &str,
        page_url: &str,
        screenshot_path: &Path,
        site_id: &str,
    ) -> Result<Vec<VisualDiff>, AuditError> {
        let baselines = self.db.active_baselines(site_id, page_url)?;
        if baselines.is_empty() {
            info!(url = %page_url, "No baselines found");
            return Ok(Vec::new());
        }

        let mut diffs = Vec::with_capacity(baselines.len());
        for baseline in &baselines {
            match self.compare_one(run_id, page_id, screenshot_path, baseline).await {
                Ok(diff) => {
                    info!(
                        url = %page_url,
                        baseline_type = baseline.source.type_name(),
                        difference = format!("{:.2}%", diff.difference_percentage),
                        passed = diff.passed(),
                        "Visual comparison finished"
                    );
                    diffs.push(diff);
                }
                Err(e) => {
                    warn!(baseline_id = %baseline.id, url = %page_url, error = %e, "Failed to compare with baseline");
                }
            }
        }
        Ok(diffs)
    }

    async fn compare_one(
        &self,
        run_id: &str,
        page_id: &str,
        screenshot_path: &Path,
        baseline: &VisualBaseline,
    ) -> Result<VisualDiff, AuditError> {
        let diff_path = self.settings.diff_dir(run_id).join(format!(
            "diff-{}-{}-{}.png",
            page_id,
            baseline.id,
            chrono::Utc::now().timestamp_millis()
        ));
        let outcome = compare_files(
            Path::new(&baseline.image_path),
            screenshot_path,
            Some(&diff_path),
            self.diff_options(),
        )
        .await?;

        let diff = VisualDiff {
            id: uuid::Uuid::new_v4().to_string(),
            run_id: run_id.to_string(),
            page_id: page_id.to_string(),
            baseline_id: baseline.id.clone(),
            current_screenshot_path: screenshot_path.to_string_lossy().into_owned(),
            diff_screenshot_path: Some(diff_path.to_string_lossy().into_owned()),
            difference_percentage: outcome.difference_percentage(),
            pixel_diff_count: outcome.diff_pixels,
            threshold_percentage: self.settings.visual.diff_threshold_percentage,
            created_at: chrono::Utc::now(),
        };
        self.db.create_visual_diff(&diff)?;
        Ok(diff)
    }

    pub async fn create_baseline(&self, req: CreateBaseline) -> Result<VisualBaseline, AuditError> {
        let (source, image_path) = match req.request {
            BaselineRequest::Screenshot { image_path } => {
                ensure_image(&image_path).await?;
                (BaselineSource::Screenshot, image_path)
            }
            BaselineRequest::Manual { image_path } => {
                ensure_image(&image_path).await?;
                (BaselineSource::Manual, image_path)
            }
            BaselineRequest::Figma { file_key, node_id, access_token } => {
                let frame = self
                    .figma
                    .fetch_frame(&file_key, &node_id, &access_token, &self.settings.figma_dir())
                    .await
                    .map_err(|e| match e {
                        AuditError::Figma(msg) => AuditError::Figma(redact_secret(&msg, &access_token)),
                        other => other,
                    })?;
                let path = frame.image_path.to_string_lossy().into_owned();
                (BaselineSource::Figma { file_key, node_id, image_url: Some(frame.image_url) }, path)
            }
        };

        let baseline = self.db.create_baseline(&NewBaseline {
            site_id: req.site_id,
            page_url: req.page_url,
            source,
            image_path,
            viewport_width: req.viewport.width,
            viewport_height: req.viewport.height,
        })?;
        info!(baseline_id = %baseline.id, url = %baseline.page_url, kind = baseline.source.type_name(), "Created baseline");
        Ok(baseline)
    }

    pub fn baselines_for_site(&self, site_id: &str, include_inactive: bool) -> Result<Vec<VisualBaseline>, AuditError> {
        self.db.list_baselines(site_id, include_inactive)
    }

    pub fn deactivate_baseline(&self, baseline_id: &str) -> Result<VisualBaseline, AuditError> {
        let existing = self
            .db
            .get_baseline(baseline_id)?
            .ok_or_else(|| AuditError::NotFound(format!("Baseline {} not found", baseline_id)))?;
        if self.db.deactivate_baseline(baseline_id)? {
            info!(baseline_id, "Deactivated baseline");
        }
        Ok(VisualBaseline { is_active: false, ..existing })
    }

    pub fn visual_diffs_for_run(&self, run_id: &str) -> Result<Vec<VisualDiff>, AuditError> {
        self.db.list_diffs_for_run(run_id)
    }

    /// Re-download a Figma frame into a new baseline and retire the old one.
    pub async fn refresh_figma_baseline(&self, baseline_id: &str, access_token: &str) -> Result<VisualBaseline, AuditError> {
        let old = self
            .db
            .get_baseline(baseline_id)?
            .ok_or_else(|| AuditError::NotFound(format!("Baseline {} not found", baseline_id)))?;
        let BaselineSource::Figma { file_key, node_id, .. } = &old.source else {
            return Err(AuditError::InvalidState(format!("Baseline {} is not a Figma baseline", baseline_id)));
        };

        let fresh = self
            .create_baseline(CreateBaseline {
                site_id: old.site_id.clone(),
                page_url: old.page_url.clone(),
                viewport: Viewport::new(old.viewport_width, old.viewport_height),
                request: BaselineRequest::Figma {
                    file_key: file_key.clone(),
                    node_id: node_id.clone(),
                    access_token: access_token.to_string(),
                },
            })
            .await?;
        self.db.deactivate_baseline(&old.id)?;
        Ok(fresh)
    }
}

async fn ensure_image(path: &str) -> Result<(), AuditError> {
    let owned = PathBuf::from(path);
    tokio::task::spawn_blocking(move || image::image_dimensions(&owned))
        .await
        .map_err(|e| AuditError::Internal(format!("Image probe task failed: {}", e)))?
        .map(|_| ())
        .map_err(|e| AuditError::Image(format!("{}: {}", path, e)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::Rgba;

    fn engine(dir: &Path) -> (VisualRegressionEngine, Database) {
        let db = Database::in_memory().unwrap();
        let mut settings = AuditSettings::default();
        settings.output.screenshot_dir = dir.to_path_buf();
        (VisualRegressionEngine::new(db.clone(), Arc::new(settings), reqwest::Client::new()), db)
    }

    fn write_png(path: &Path, img: &RgbaImage) {
        img.save(path).unwrap();
    }

    #[tokio::test]
    async fn test_compare_against_each_active_baseline() {
        let dir = tempfile::tempdir().unwrap();
        let (engine, db) = engine(dir.path());
        let site = db.create_site("Example", "https://example.test/", None).unwrap();
        let run = db.create_run(&site.id).unwrap();
        let page = db.create_page(&crate::models::NewPage {
            run_id: run.id.clone(),
            url: "https://example.test/".into(),
            ..Default::default()
        }).unwrap();

        let white = RgbaImage::from_pixel(100, 100, Rgba([255, 255, 255, 255]));
        let mut square = white.clone();
        for x in 10..20 {
            for y in 10..20 {
                square.put_pixel(x, y, Rgba([0, 0, 0, 255]));
            }
        }
        let baseline_path = dir.path().join("baseline.png");
        let current_path = dir.path().join("current.png");
        write_png(&baseline_path, &white);
        write_png(&current_path, &square);

        engine.create_baseline(CreateBaseline {
            site_id: site.id.clone(),
            page_url: page.url.clone(),
            viewport: Viewport::new(100, 100),
            request: BaselineRequest::Manual { image_path: baseline_path.to_string_lossy().into_owned() },
        }).await.unwrap();
        // A broken baseline must not block the good one
        db.create_baseline(&NewBaseline {
            site_id: site.id.clone(),
            page_url: page.url.clone(),
            source: BaselineSource::Screenshot,
            image_path: dir.path().join("missing.png").to_string_lossy().into_owned(),
            viewport_width: 100,
            viewport_height: 100,
        }).unwrap();

        let diffs = engine
            .compare_screenshots(&run.id, &page.id, &page.url, &current_path, &site.id)
            .await
            .unwrap();
        assert_eq!(diffs.len(), 1);
        assert_eq!(diffs[0].pixel_diff_count, 100);
        assert!((diffs[0].difference_percentage - 1.0).abs() < 1e-9);
        assert!(!diffs[0].passed());
        assert!(Path::new(diffs[0].diff_screenshot_path.as_deref().unwrap()).exists());
        assert_eq!(engine.visual_diffs_for_run(&run.id).unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_no_baselines_yields_no_diffs() {
        let dir = tempfile::tempdir().unwrap();
        let (engine, db) = engine(dir.path());
        let site = db.create_site("Example", "https://example.test/", None).unwrap();
        let diffs = engine
            .compare_screenshots("run", "page", "https://example.test/", &dir.path().join("x.png"), &site.id)
            .await
            .unwrap();
        assert!(diffs.is_empty());
    }

    #[tokio::test]
    async fn test_baseline_requires_readable_image() {
        let dir = tempfile::tempdir().unwrap();
        let (engine, db) = engine(dir.path());
        let site = db.create_site("Example", "https://example.test/", None).unwrap();
        let result = engine.create_baseline(CreateBaseline {
            site_id: site.id,
            page_url: "https://example.test/".into(),
            viewport: Viewport::new(1440, 900),
            request: BaselineRequest::Manual { image_path: "/nonexistent/base.png".into() },
        }).await;
        assert!(matches!(result, Err(AuditError::Image(_))));
    }

    #[tokio::test]
    async fn test_deactivate_and_refresh_rules() {
        let dir = tempfile::tempdir().unwrap();
        let (engine, db) = engine(dir.path());
        let site = db.create_site("Example", "https://example.test/", None).unwrap();
        let path = dir.path().join("b.png");
        write_png(&path, &RgbaImage::from_pixel(4, 4, Rgba([1, 2, 3, 255])));
        let b = engine.create_baseline(CreateBaseline {
            site_id: site.id.clone(),
            page_url: "https://example.test/".into(),
            viewport: Viewport::new(4, 4),
            request: BaselineRequest::Screenshot { image_path: path.to_string_lossy().into_owned() },
        }).await.unwrap();

        let refreshed = engine.refresh_figma_baseline(&b.id, "token").await;
        assert!(matches!(refreshed, Err(AuditError::InvalidState(_))));

        assert!(!engine.deactivate_baseline(&b.id).unwrap().is_active);
        assert!(engine.baselines_for_site(&site.id, false).unwrap().is_empty());
        assert!(matches!(engine.deactivate_baseline("nope"), Err(AuditError::NotFound(_))));
    }
}
